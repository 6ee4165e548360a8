//! PostgreSQL 저장소.
//!
//! 스키마 레지스트리의 정의로 SQL을 만들어 실행합니다.
//!
//! # UPSERT
//!
//! 컬럼별 배열을 바인딩하는 UNNEST 패턴을 사용합니다. 바인드 파라미터 수가
//! 행 수가 아니라 컬럼 수에 비례하므로 5,000행 청크도 한 문장으로 처리됩니다.
//!
//! ```sql
//! INSERT INTO "per" ("stock_id", "date", "dividend_yield", "per", "pbr")
//! SELECT * FROM UNNEST($1::text[], $2::date[], $3::float8[], $4::float8[], $5::float8[])
//! ON CONFLICT ("stock_id", "date") DO UPDATE SET
//!     "dividend_yield" = EXCLUDED."dividend_yield", "per" = EXCLUDED."per", "pbr" = EXCLUDED."pbr"
//! ```

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgArguments, PgPool};
use sqlx::query::Query;
use sqlx::Postgres;
use tracing::{debug, info, instrument};

use super::DatasetStore;
use crate::error::{DataError, Result};
use crate::record::{FieldValue, Record};
use crate::schema::{quote_columns, DatasetKind, FieldType, TableSchema};

/// 컬럼 단위 배열 (UNNEST 바인딩용)
#[derive(Debug, PartialEq)]
enum ColumnArray {
    Text(Vec<Option<String>>),
    Integer(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Date(Vec<Option<NaiveDate>>),
}

/// PostgreSQL 저장소
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// `INSERT ... SELECT * FROM UNNEST(...)`
fn insert_sql(schema: &TableSchema) -> String {
    let casts: Vec<String> = schema
        .fields
        .iter()
        .enumerate()
        .map(|(i, f)| format!("${}::{}", i + 1, f.field_type.array_cast()))
        .collect();

    format!(
        "INSERT INTO \"{}\" ({}) SELECT * FROM UNNEST({})",
        schema.table,
        quote_columns(schema.fields.iter().map(|f| f.column)),
        casts.join(", ")
    )
}

/// 키 충돌 시 키가 아닌 모든 컬럼을 덮어쓰는 UPSERT
fn upsert_sql(schema: &TableSchema) -> String {
    let updates: Vec<String> = schema
        .update_columns()
        .map(|c| format!("\"{c}\" = EXCLUDED.\"{c}\""))
        .collect();

    let conflict = quote_columns(schema.merge_key.iter().copied());
    if updates.is_empty() {
        format!("{} ON CONFLICT ({}) DO NOTHING", insert_sql(schema), conflict)
    } else {
        format!(
            "{} ON CONFLICT ({}) DO UPDATE SET {}",
            insert_sql(schema),
            conflict,
            updates.join(", ")
        )
    }
}

/// 행 단위 레코드를 컬럼 단위 배열로 전치
fn column_arrays(schema: &TableSchema, records: &[Record]) -> Result<Vec<ColumnArray>> {
    let mut columns = Vec::with_capacity(schema.fields.len());

    for (i, spec) in schema.fields.iter().enumerate() {
        let values = records.iter().map(|r| r.values().get(i).unwrap_or(&FieldValue::Null));
        let mismatch = || {
            DataError::InsertError(format!(
                "{}.{} 컬럼 타입 불일치 ({:?} 기대)",
                schema.table, spec.column, spec.field_type
            ))
        };

        let column = match spec.field_type {
            FieldType::Text => ColumnArray::Text(
                values
                    .map(|v| match v {
                        FieldValue::Null => Ok(None),
                        FieldValue::Text(s) => Ok(Some(s.clone())),
                        _ => Err(mismatch()),
                    })
                    .collect::<Result<_>>()?,
            ),
            FieldType::Integer => ColumnArray::Integer(
                values
                    .map(|v| match v {
                        FieldValue::Null => Ok(None),
                        FieldValue::Integer(n) => Ok(Some(*n)),
                        _ => Err(mismatch()),
                    })
                    .collect::<Result<_>>()?,
            ),
            FieldType::Float => ColumnArray::Float(
                values
                    .map(|v| match v {
                        FieldValue::Null => Ok(None),
                        FieldValue::Float(f) => Ok(Some(*f)),
                        FieldValue::Integer(n) => Ok(Some(*n as f64)),
                        _ => Err(mismatch()),
                    })
                    .collect::<Result<_>>()?,
            ),
            FieldType::Date => ColumnArray::Date(
                values
                    .map(|v| match v {
                        FieldValue::Null => Ok(None),
                        FieldValue::Date(d) => Ok(Some(*d)),
                        _ => Err(mismatch()),
                    })
                    .collect::<Result<_>>()?,
            ),
        };
        columns.push(column);
    }

    Ok(columns)
}

/// 컬럼 배열을 순서대로 바인딩
fn bind_columns<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    columns: Vec<ColumnArray>,
) -> Query<'q, Postgres, PgArguments> {
    for column in columns {
        query = match column {
            ColumnArray::Text(v) => query.bind(v),
            ColumnArray::Integer(v) => query.bind(v),
            ColumnArray::Float(v) => query.bind(v),
            ColumnArray::Date(v) => query.bind(v),
        };
    }
    query
}

#[async_trait]
impl DatasetStore for PgStore {
    async fn ensure_schema(&self) -> Result<()> {
        for kind in DatasetKind::ALL {
            let schema = kind.schema();
            sqlx::query(&schema.create_table_sql())
                .execute(&self.pool)
                .await
                .map_err(|e| DataError::SchemaError {
                    table: schema.table.to_string(),
                    reason: e.to_string(),
                })?;
        }
        info!(tables = DatasetKind::ALL.len(), "테이블 확인 완료 (없으면 생성)");
        Ok(())
    }

    #[instrument(skip(self, schema), fields(table = schema.table))]
    async fn max_date(&self, schema: &TableSchema, stock_id: &str) -> Result<Option<NaiveDate>> {
        let sql = format!(
            "SELECT MAX(\"date\") FROM \"{}\" WHERE \"stock_id\" = $1",
            schema.table
        );

        let last: Option<NaiveDate> = sqlx::query_scalar(&sql)
            .bind(stock_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DataError::QueryError(e.to_string()))?;

        Ok(last)
    }

    #[instrument(skip(self, schema, records), fields(table = schema.table, rows = records.len()))]
    async fn upsert_chunk(&self, schema: &TableSchema, records: &[Record]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let sql = upsert_sql(schema);
        let columns = column_arrays(schema, records)?;

        let result = bind_columns(sqlx::query(&sql), columns)
            .execute(&self.pool)
            .await
            .map_err(|e| DataError::InsertError(e.to_string()))?;

        debug!(affected = result.rows_affected(), "청크 UPSERT 완료");
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, schema, records), fields(table = schema.table, rows = records.len()))]
    async fn replace_all(
        &self,
        schema: &TableSchema,
        records: &[Record],
        chunk_size: usize,
    ) -> Result<u64> {
        let sql = insert_sql(schema);
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("TRUNCATE TABLE \"{}\"", schema.table))
            .execute(&mut *tx)
            .await
            .map_err(|e| DataError::QueryError(e.to_string()))?;

        let mut inserted = 0u64;
        for chunk in records.chunks(chunk_size.max(1)) {
            let columns = column_arrays(schema, chunk)?;
            let result = bind_columns(sqlx::query(&sql), columns)
                .execute(&mut *tx)
                .await
                .map_err(|e| DataError::InsertError(e.to_string()))?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn stock_ids(&self) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT \"stock_id\" FROM \"{}\" ORDER BY \"stock_id\"",
            DatasetKind::Catalog.schema().table
        );

        let ids: Vec<String> = sqlx::query_scalar(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DataError::QueryError(e.to_string()))?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_sql_overwrites_non_key_columns() {
        let sql = upsert_sql(DatasetKind::ValuationRatio.schema());
        assert_eq!(
            sql,
            "INSERT INTO \"per\" (\"stock_id\", \"date\", \"dividend_yield\", \"per\", \"pbr\") \
             SELECT * FROM UNNEST($1::text[], $2::date[], $3::float8[], $4::float8[], $5::float8[]) \
             ON CONFLICT (\"stock_id\", \"date\") DO UPDATE SET \
             \"dividend_yield\" = EXCLUDED.\"dividend_yield\", \"per\" = EXCLUDED.\"per\", \"pbr\" = EXCLUDED.\"pbr\""
        );
    }

    #[test]
    fn test_upsert_sql_never_touches_identity() {
        for kind in DatasetKind::ALL {
            let sql = upsert_sql(kind.schema());
            assert!(!sql.contains("\"id\""), "{}", sql);
        }
    }

    #[test]
    fn test_insert_sql_has_one_parameter_per_column() {
        let schema = DatasetKind::MarginShort.schema();
        let sql = insert_sql(schema);
        assert!(sql.contains(&format!("${}::int8[]", schema.fields.len())));
        assert!(!sql.contains(&format!("${}", schema.fields.len() + 1)));
        assert!(!sql.contains("ON CONFLICT"));
    }

    #[test]
    fn test_column_arrays_transpose_rows() {
        let schema = DatasetKind::MarketIndex.schema();
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let records = vec![
            Record::new(vec![
                FieldValue::Text("TAIEX".into()),
                FieldValue::Date(date),
                FieldValue::Float(1.5),
            ]),
            Record::new(vec![
                FieldValue::Text("TPEx".into()),
                FieldValue::Date(date),
                FieldValue::Null,
            ]),
        ];

        let columns = column_arrays(schema, &records).unwrap();
        assert_eq!(
            columns,
            vec![
                ColumnArray::Text(vec![Some("TAIEX".into()), Some("TPEx".into())]),
                ColumnArray::Date(vec![Some(date), Some(date)]),
                ColumnArray::Float(vec![Some(1.5), None]),
            ]
        );
    }

    #[test]
    fn test_column_arrays_reject_type_mismatch() {
        let schema = DatasetKind::MarketIndex.schema();
        let records = vec![Record::new(vec![
            FieldValue::Integer(1),
            FieldValue::Null,
            FieldValue::Null,
        ])];
        assert!(matches!(
            column_arrays(schema, &records),
            Err(DataError::InsertError(_))
        ));
    }
}
