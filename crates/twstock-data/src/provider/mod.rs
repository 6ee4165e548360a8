//! 데이터 Provider 모듈.
//!
//! ## FinMind
//! - `FinMindClient`: FinMind REST API v4 클라이언트 (토큰 필요)
//! - 종목 목록(TaiwanStockInfo), 종목별 데이터셋 조회
//!
//! ## Mock
//! - `MockDataSource`: 고정 응답을 돌려주는 테스트용 Provider

pub mod finmind;
pub mod mock;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::record::RawRow;
use crate::schema::DatasetKind;

pub use finmind::{FinMindClient, FinMindConfig};
pub use mock::{FetchCall, MockDataSource};

/// 데이터 소스 trait.
///
/// 호출 1회당 외부 요청 1회. 결과가 없으면 빈 Vec을 반환하며 에러가 아닙니다.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// 전체 종목 목록 조회
    async fn fetch_catalog(&self) -> Result<Vec<RawRow>>;

    /// 종목의 데이터셋을 `start_date`(포함)부터 조회.
    ///
    /// 종료일은 프로바이더가 정합니다 (오늘까지).
    async fn fetch_dataset(
        &self,
        kind: DatasetKind,
        stock_id: &str,
        start_date: NaiveDate,
    ) -> Result<Vec<RawRow>>;
}
