//! 저장 레코드와 프로바이더 행 변환.
//!
//! FinMind 응답의 JSON 행을 스키마 순서의 타입 값(`FieldValue`)으로 변환합니다.
//! "값 없음"을 뜻하는 토큰은 변환 시 모두 NULL로 정규화됩니다.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde_json::Value;

use crate::error::{DataError, Result};
use crate::schema::{FieldSpec, FieldType, TableSchema};

/// 프로바이더 원본 행 (필드명 → JSON 값)
pub type RawRow = serde_json::Map<String, Value>;

/// NULL로 취급하는 문자열 토큰
pub const NULL_TOKENS: &[&str] = &["None", "none", "null", "NULL", "NaN", "nan", "N/A"];

/// 컬럼 값
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// 병합 키 비교용 문자열 (키 컬럼은 Text/Date만 사용)
    fn key_part(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Integer(v) => v.to_string(),
            FieldValue::Float(v) => v.to_string(),
            FieldValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

/// 병합 키 값 (merge_key 순서)
pub type MergeKey = Vec<String>;

/// 스키마 필드 순서를 따르는 한 행
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: Vec<FieldValue>,
}

impl Record {
    pub fn new(values: Vec<FieldValue>) -> Self {
        Self { values }
    }

    /// 프로바이더 행을 스키마에 맞춰 변환.
    ///
    /// 없는 필드와 NULL 토큰은 NULL이 되며, 병합 키가 NULL이면 에러입니다.
    pub fn from_raw(schema: &TableSchema, raw: &RawRow) -> Result<Self> {
        let mut values = Vec::with_capacity(schema.fields.len());
        for spec in schema.fields {
            let value = match raw.get(spec.source) {
                Some(v) => convert_value(spec, v)?,
                None => FieldValue::Null,
            };
            if value.is_null() && schema.is_key(spec.column) {
                return Err(DataError::DecodeError {
                    field: spec.source.to_string(),
                    reason: "병합 키 값 없음".to_string(),
                });
            }
            values.push(value);
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    /// 컬럼명으로 값 조회
    pub fn get(&self, schema: &TableSchema, column: &str) -> Option<&FieldValue> {
        schema.index_of(column).and_then(|i| self.values.get(i))
    }

    /// `date` 컬럼 값
    pub fn date(&self, schema: &TableSchema) -> Option<NaiveDate> {
        self.get(schema, "date").and_then(FieldValue::as_date)
    }

    /// 병합 키 값
    pub fn merge_key(&self, schema: &TableSchema) -> MergeKey {
        schema
            .key_indices()
            .into_iter()
            .map(|i| {
                self.values
                    .get(i)
                    .map(FieldValue::key_part)
                    .unwrap_or_default()
            })
            .collect()
    }
}

/// 프로바이더 행 목록을 레코드로 변환 (NULL 토큰 정규화 포함)
pub fn normalize_rows(schema: &TableSchema, rows: &[RawRow]) -> Result<Vec<Record>> {
    rows.iter().map(|row| Record::from_raw(schema, row)).collect()
}

/// 병합 키 중복 제거 (마지막 행 우선, 첫 등장 위치 유지).
///
/// 한 문장 안에서 같은 키가 두 번 나오면 PostgreSQL `ON CONFLICT`가 실패하므로
/// 청크로 나누기 전에 적용합니다.
pub fn dedup_by_key(schema: &TableSchema, records: Vec<Record>) -> Vec<Record> {
    let mut positions: HashMap<MergeKey, usize> = HashMap::with_capacity(records.len());
    let mut unique: Vec<Record> = Vec::with_capacity(records.len());

    for record in records {
        let key = record.merge_key(schema);
        match positions.get(&key) {
            Some(&i) => unique[i] = record,
            None => {
                positions.insert(key, unique.len());
                unique.push(record);
            }
        }
    }
    unique
}

/// 날짜 오름차순 정렬 (같은 날짜는 기존 순서 유지)
pub fn sort_by_date(schema: &TableSchema, records: &mut [Record]) {
    if let Some(i) = schema.date_index() {
        records.sort_by_key(|r| r.values.get(i).and_then(FieldValue::as_date));
    }
}

fn is_null_token(s: &str) -> bool {
    NULL_TOKENS.contains(&s.trim())
}

fn decode_error(spec: &FieldSpec, value: &Value, expected: &str) -> DataError {
    DataError::DecodeError {
        field: spec.source.to_string(),
        reason: format!("{} 기대, 입력값: {}", expected, value),
    }
}

/// JSON 값을 컬럼 타입으로 변환
fn convert_value(spec: &FieldSpec, value: &Value) -> Result<FieldValue> {
    if let Value::String(s) = value {
        if is_null_token(s) {
            return Ok(FieldValue::Null);
        }
    }

    match (spec.field_type, value) {
        (_, Value::Null) => Ok(FieldValue::Null),

        (FieldType::Text, Value::String(s)) => Ok(FieldValue::Text(s.clone())),
        (FieldType::Text, Value::Number(n)) => Ok(FieldValue::Text(n.to_string())),
        (FieldType::Text, Value::Bool(b)) => Ok(FieldValue::Text(b.to_string())),

        (FieldType::Integer, Value::Number(n)) => match n.as_i64() {
            Some(v) => Ok(FieldValue::Integer(v)),
            None => match n.as_f64() {
                Some(f) if f.is_finite() => Ok(FieldValue::Integer(f.round() as i64)),
                _ => Err(decode_error(spec, value, "정수")),
            },
        },
        (FieldType::Integer, Value::String(s)) => {
            let s = s.trim().replace(',', "");
            if s.is_empty() {
                return Ok(FieldValue::Null);
            }
            if let Ok(v) = s.parse::<i64>() {
                return Ok(FieldValue::Integer(v));
            }
            match s.parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(FieldValue::Integer(f.round() as i64)),
                _ => Err(decode_error(spec, value, "정수")),
            }
        }

        (FieldType::Float, Value::Number(n)) => match n.as_f64() {
            Some(f) if f.is_finite() => Ok(FieldValue::Float(f)),
            _ => Ok(FieldValue::Null),
        },
        (FieldType::Float, Value::String(s)) => {
            let s = s.trim().replace(',', "");
            if s.is_empty() {
                return Ok(FieldValue::Null);
            }
            match s.parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(FieldValue::Float(f)),
                Ok(_) => Ok(FieldValue::Null),
                Err(_) => Err(decode_error(spec, value, "실수")),
            }
        }

        (FieldType::Date, Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(FieldValue::Null);
            }
            // "2024-01-02" 또는 "2024-01-02 00:00:00"
            let day = s.get(..10).unwrap_or(s);
            NaiveDate::parse_from_str(day, "%Y-%m-%d")
                .map(FieldValue::Date)
                .map_err(|_| decode_error(spec, value, "YYYY-MM-DD 날짜"))
        }

        (FieldType::Integer, _) => Err(decode_error(spec, value, "정수")),
        (FieldType::Float, _) => Err(decode_error(spec, value, "실수")),
        (FieldType::Date, _) => Err(decode_error(spec, value, "날짜")),
        (FieldType::Text, _) => Err(decode_error(spec, value, "문자열")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DatasetKind;
    use serde_json::json;

    fn raw(value: Value) -> RawRow {
        match value {
            Value::Object(map) => map,
            _ => panic!("object expected"),
        }
    }

    #[test]
    fn test_price_row_is_mapped_to_schema_order() {
        let schema = DatasetKind::PriceDaily.schema();
        let row = raw(json!({
            "date": "2024-03-04",
            "stock_id": "2330",
            "Trading_Volume": 25_000_000,
            "Trading_money": 1.9e10,
            "open": 700.0,
            "max": 710.5,
            "min": 698.0,
            "close": 705.0,
            "spread": 5.0,
            "Trading_turnover": 31000
        }));

        let record = Record::from_raw(schema, &row).unwrap();
        assert_eq!(
            record.get(schema, "stock_id"),
            Some(&FieldValue::Text("2330".into()))
        );
        assert_eq!(
            record.date(schema),
            NaiveDate::from_ymd_opt(2024, 3, 4)
        );
        assert_eq!(record.get(schema, "high"), Some(&FieldValue::Float(710.5)));
        assert_eq!(
            record.get(schema, "trading_money").and_then(FieldValue::as_integer),
            Some(19_000_000_000)
        );
    }

    #[test]
    fn test_null_tokens_become_null() {
        let schema = DatasetKind::Catalog.schema();
        let row = raw(json!({
            "industry_category": "None",
            "stock_id": "2330",
            "stock_name": "台積電",
            "type": "twse",
            "date": "None"
        }));

        let record = Record::from_raw(schema, &row).unwrap();
        assert!(record.get(schema, "industry_category").unwrap().is_null());
        assert!(record.get(schema, "date").unwrap().is_null());
        assert_eq!(
            record.get(schema, "stock_name"),
            Some(&FieldValue::Text("台積電".into()))
        );
    }

    #[test]
    fn test_empty_string_is_kept_for_text_only() {
        let schema = DatasetKind::MarginShort.schema();
        let row = raw(json!({
            "stock_id": "2330",
            "date": "2024-03-04",
            "Note": "",
            "ShortSaleBuy": "",
            "MarginPurchaseBuy": "1,234"
        }));

        let record = Record::from_raw(schema, &row).unwrap();
        assert_eq!(record.get(schema, "note"), Some(&FieldValue::Text(String::new())));
        assert!(record.get(schema, "short_sale_buy").unwrap().is_null());
        assert_eq!(
            record.get(schema, "margin_purchase_buy").and_then(FieldValue::as_integer),
            Some(1234)
        );
        // 응답에 없는 필드
        assert!(record.get(schema, "short_sale_limit").unwrap().is_null());
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let schema = DatasetKind::InstitutionalTrade.schema();
        let row = raw(json!({ "stock_id": "2330", "date": "2024-03-04", "buy": 1 }));

        let err = Record::from_raw(schema, &row).unwrap_err();
        assert!(matches!(err, DataError::DecodeError { ref field, .. } if field == "name"));
    }

    #[test]
    fn test_bad_date_is_rejected() {
        let schema = DatasetKind::MarketIndex.schema();
        let row = raw(json!({ "stock_id": "TAIEX", "date": "03/04/2024", "price": 1.0 }));
        assert!(Record::from_raw(schema, &row).is_err());
    }

    #[test]
    fn test_dedup_keeps_last_value() {
        let schema = DatasetKind::ValuationRatio.schema();
        let rows = vec![
            raw(json!({ "stock_id": "2330", "date": "2024-03-04", "PER": 10.0 })),
            raw(json!({ "stock_id": "2330", "date": "2024-03-05", "PER": 11.0 })),
            raw(json!({ "stock_id": "2330", "date": "2024-03-04", "PER": 12.0 })),
        ];

        let records = dedup_by_key(schema, normalize_rows(schema, &rows).unwrap());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get(schema, "per"), Some(&FieldValue::Float(12.0)));
        assert_eq!(records[1].get(schema, "per"), Some(&FieldValue::Float(11.0)));
    }

    #[test]
    fn test_sort_by_date() {
        let schema = DatasetKind::MarketIndex.schema();
        let rows = vec![
            raw(json!({ "stock_id": "TAIEX", "date": "2024-03-05", "price": 2.0 })),
            raw(json!({ "stock_id": "TAIEX", "date": "2024-03-01", "price": 1.0 })),
        ];
        let mut records = normalize_rows(schema, &rows).unwrap();
        sort_by_date(schema, &mut records);
        assert_eq!(records[0].date(schema), NaiveDate::from_ymd_opt(2024, 3, 1));
    }
}
