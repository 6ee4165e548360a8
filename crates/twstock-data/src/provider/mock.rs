//! Mock 데이터 소스.
//!
//! 미리 넣어 둔 행을 돌려주는 `DataSource` 구현입니다.
//! 실제 FinMind처럼 `start_date` 이후 행만 반환하고, 호출 기록을 남깁니다.
//! 동기화 엔진과 워크플로우 테스트에서 사용합니다.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use super::DataSource;
use crate::error::{DataError, Result};
use crate::record::RawRow;
use crate::schema::DatasetKind;

/// 기록된 호출
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub kind: DatasetKind,
    /// 종목 목록 조회는 빈 문자열
    pub stock_id: String,
    /// 종목 목록 조회는 None
    pub start_date: Option<NaiveDate>,
}

#[derive(Default)]
struct MockState {
    catalog: Vec<RawRow>,
    catalog_fails: bool,
    datasets: HashMap<(DatasetKind, String), Vec<RawRow>>,
    failures: HashSet<(DatasetKind, String)>,
    calls: Vec<FetchCall>,
}

/// 테스트용 데이터 소스
#[derive(Default)]
pub struct MockDataSource {
    state: RwLock<MockState>,
}

impl MockDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// 종목 목록 응답 설정
    pub async fn set_catalog(&self, rows: Vec<RawRow>) {
        self.state.write().await.catalog = rows;
    }

    /// 종목 목록 조회를 실패하게 설정
    pub async fn fail_catalog(&self) {
        self.state.write().await.catalog_fails = true;
    }

    /// 데이터셋 응답 교체
    pub async fn set_dataset(&self, kind: DatasetKind, stock_id: &str, rows: Vec<RawRow>) {
        self.state
            .write()
            .await
            .datasets
            .insert((kind, stock_id.to_string()), rows);
    }

    /// 데이터셋에 새 행 추가 (신규 거래일 시뮬레이션)
    pub async fn push_rows(&self, kind: DatasetKind, stock_id: &str, rows: Vec<RawRow>) {
        self.state
            .write()
            .await
            .datasets
            .entry((kind, stock_id.to_string()))
            .or_default()
            .extend(rows);
    }

    /// 특정 (데이터셋, 종목) 조회를 실패하게 설정
    pub async fn fail_dataset(&self, kind: DatasetKind, stock_id: &str) {
        self.state
            .write()
            .await
            .failures
            .insert((kind, stock_id.to_string()));
    }

    /// 지금까지의 호출 기록
    pub async fn calls(&self) -> Vec<FetchCall> {
        self.state.read().await.calls.clone()
    }

    /// 호출 횟수
    pub async fn call_count(&self) -> usize {
        self.state.read().await.calls.len()
    }
}

/// 행의 `date` 필드
fn row_date(row: &RawRow) -> Option<NaiveDate> {
    row.get("date")
        .and_then(|v| v.as_str())
        .and_then(|s| NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d").ok())
}

#[async_trait]
impl DataSource for MockDataSource {
    async fn fetch_catalog(&self) -> Result<Vec<RawRow>> {
        let mut state = self.state.write().await;
        state.calls.push(FetchCall {
            kind: DatasetKind::Catalog,
            stock_id: String::new(),
            start_date: None,
        });

        if state.catalog_fails {
            return Err(DataError::ApiError {
                status: 500,
                message: "mock catalog failure".to_string(),
            });
        }
        Ok(state.catalog.clone())
    }

    async fn fetch_dataset(
        &self,
        kind: DatasetKind,
        stock_id: &str,
        start_date: NaiveDate,
    ) -> Result<Vec<RawRow>> {
        let mut state = self.state.write().await;
        state.calls.push(FetchCall {
            kind,
            stock_id: stock_id.to_string(),
            start_date: Some(start_date),
        });

        let key = (kind, stock_id.to_string());
        if state.failures.contains(&key) {
            return Err(DataError::ApiError {
                status: 500,
                message: format!("mock failure: {} {}", kind, stock_id),
            });
        }

        let rows = state
            .datasets
            .get(&key)
            .map(|rows| {
                rows.iter()
                    .filter(|r| row_date(r).map_or(true, |d| d >= start_date))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }
}
