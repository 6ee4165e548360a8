//! 메모리 저장소.
//!
//! 테이블별로 병합 키 → 레코드 맵을 보관합니다. UNIQUE 제약과 같은 병합 규칙을 따르며
//! 청크 단위 호출 기록과 실패 주입을 지원하여 동기화 엔진 테스트에 사용합니다.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use super::DatasetStore;
use crate::error::{DataError, Result};
use crate::record::{MergeKey, Record};
use crate::schema::{DatasetKind, TableSchema};

/// 기록된 UPSERT 호출
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertCall {
    pub table: &'static str,
    pub rows: usize,
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<&'static str, BTreeMap<MergeKey, Record>>,
    upserts: Vec<UpsertCall>,
    /// 실패시킬 UPSERT 호출 순번 (0부터, 전체 테이블 공통)
    fail_upsert_at: Option<usize>,
    fail_replace: bool,
}

/// 테스트용 저장소
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 테이블에 레코드를 직접 넣음 (기존 데이터 준비용)
    pub async fn seed(&self, schema: &TableSchema, records: Vec<Record>) {
        let mut state = self.state.write().await;
        let table = state.tables.entry(schema.table).or_default();
        for record in records {
            table.insert(record.merge_key(schema), record);
        }
    }

    /// 테이블 전체 행 (병합 키 순)
    pub async fn rows(&self, schema: &TableSchema) -> Vec<Record> {
        self.state
            .read()
            .await
            .tables
            .get(schema.table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn row_count(&self, schema: &TableSchema) -> usize {
        self.state
            .read()
            .await
            .tables
            .get(schema.table)
            .map_or(0, BTreeMap::len)
    }

    /// 테이블의 UPSERT 청크 크기 목록 (호출 순)
    pub async fn upsert_batches(&self, schema: &TableSchema) -> Vec<usize> {
        self.state
            .read()
            .await
            .upserts
            .iter()
            .filter(|c| c.table == schema.table)
            .map(|c| c.rows)
            .collect()
    }

    /// 전체 UPSERT 호출 기록
    pub async fn upsert_calls(&self) -> Vec<UpsertCall> {
        self.state.read().await.upserts.clone()
    }

    /// `n`번째(0부터) UPSERT 호출을 실패하게 설정. 실패한 청크는 반영되지 않습니다.
    pub async fn fail_upsert_at(&self, n: usize) {
        self.state.write().await.fail_upsert_at = Some(n);
    }

    /// 전체 교체를 실패하게 설정. 기존 데이터는 유지됩니다.
    pub async fn fail_replace(&self) {
        self.state.write().await.fail_replace = true;
    }
}

#[async_trait]
impl DatasetStore for MemoryStore {
    async fn ensure_schema(&self) -> Result<()> {
        let mut state = self.state.write().await;
        for kind in DatasetKind::ALL {
            state.tables.entry(kind.schema().table).or_default();
        }
        Ok(())
    }

    async fn max_date(&self, schema: &TableSchema, stock_id: &str) -> Result<Option<NaiveDate>> {
        let state = self.state.read().await;
        let last = state.tables.get(schema.table).and_then(|table| {
            table
                .values()
                .filter(|r| {
                    r.get(schema, "stock_id").and_then(|v| v.as_text()) == Some(stock_id)
                })
                .filter_map(|r| r.date(schema))
                .max()
        });
        Ok(last)
    }

    async fn upsert_chunk(&self, schema: &TableSchema, records: &[Record]) -> Result<u64> {
        let mut state = self.state.write().await;
        let call_index = state.upserts.len();
        state.upserts.push(UpsertCall {
            table: schema.table,
            rows: records.len(),
        });

        if state.fail_upsert_at == Some(call_index) {
            return Err(DataError::InsertError(format!(
                "injected failure on upsert #{}",
                call_index
            )));
        }

        let table = state.tables.entry(schema.table).or_default();
        for record in records {
            table.insert(record.merge_key(schema), record.clone());
        }
        Ok(records.len() as u64)
    }

    async fn replace_all(
        &self,
        schema: &TableSchema,
        records: &[Record],
        _chunk_size: usize,
    ) -> Result<u64> {
        let mut state = self.state.write().await;
        if state.fail_replace {
            return Err(DataError::InsertError("injected replace failure".to_string()));
        }

        let replaced: BTreeMap<MergeKey, Record> = records
            .iter()
            .map(|r| (r.merge_key(schema), r.clone()))
            .collect();
        state.tables.insert(schema.table, replaced);
        Ok(records.len() as u64)
    }

    async fn stock_ids(&self) -> Result<Vec<String>> {
        let schema = DatasetKind::Catalog.schema();
        let state = self.state.read().await;
        let ids = state
            .tables
            .get(schema.table)
            .map(|t| {
                t.values()
                    .filter_map(|r| r.get(schema, "stock_id").and_then(|v| v.as_text()))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(ids)
    }
}
