//! 에러 타입 정의.

use std::fmt;

use chrono::NaiveDate;
use twstock_data::{DataError, DatasetKind};

/// Collector 에러 타입
#[derive(Debug)]
pub enum CollectorError {
    /// 설정 에러
    Config(String),
    /// 데이터 계층 에러 (DB, 스키마, 토큰 확인)
    Data(DataError),
    /// 데이터 소스 조회 또는 응답 변환 실패
    DataSource {
        stock_id: String,
        dataset: DatasetKind,
        start: NaiveDate,
        source: DataError,
    },
    /// 청크 저장 실패. `committed_rows`는 앞선 청크에서 이미 반영된 행 수
    Upsert {
        stock_id: String,
        dataset: DatasetKind,
        start: NaiveDate,
        chunk: usize,
        committed_rows: u64,
        source: DataError,
    },
}

impl fmt::Display for CollectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::Data(e) => write!(f, "Data error: {}", e),
            Self::DataSource {
                stock_id,
                dataset,
                start,
                source,
            } => write!(
                f,
                "Data source error [{} {} from {}]: {}",
                dataset, stock_id, start, source
            ),
            Self::Upsert {
                stock_id,
                dataset,
                start,
                chunk,
                committed_rows,
                source,
            } => write!(
                f,
                "Upsert error [{} {} from {} chunk #{}, {} rows committed]: {}",
                dataset, stock_id, start, chunk, committed_rows, source
            ),
        }
    }
}

impl std::error::Error for CollectorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Data(e) => Some(e),
            Self::DataSource { source, .. } | Self::Upsert { source, .. } => Some(source),
            Self::Config(_) => None,
        }
    }
}

impl From<DataError> for CollectorError {
    fn from(err: DataError) -> Self {
        Self::Data(err)
    }
}

impl From<config::ConfigError> for CollectorError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, CollectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_error_names_unit_and_range() {
        let err = CollectorError::Upsert {
            stock_id: "2330".to_string(),
            dataset: DatasetKind::InstitutionalTrade,
            start: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            chunk: 1,
            committed_rows: 3,
            source: DataError::InsertError("boom".to_string()),
        };

        let message = err.to_string();
        assert!(message.contains("institutional_trades 2330 from 2024-01-02 chunk #1"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
