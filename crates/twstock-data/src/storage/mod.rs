//! 저장소 모듈.
//!
//! - `PgStore`: PostgreSQL 저장소 (UNNEST 일괄 UPSERT)
//! - `MemoryStore`: 메모리 저장소 (테스트용, UNIQUE 키 병합 동작 동일)

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::record::Record;
use crate::schema::TableSchema;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// 데이터셋 저장소 trait.
///
/// 모든 연산은 호출 단위로 커넥션을 얻고 반환합니다.
#[async_trait]
pub trait DatasetStore: Send + Sync {
    /// 전체 테이블 생성 (이미 있으면 건너뜀)
    async fn ensure_schema(&self) -> Result<()>;

    /// 종목의 저장된 최신 날짜. 행이 없으면 `None`.
    async fn max_date(&self, schema: &TableSchema, stock_id: &str) -> Result<Option<NaiveDate>>;

    /// 한 청크 UPSERT.
    ///
    /// 단일 문장으로 실행되어 전부 반영되거나 전부 반영되지 않습니다.
    /// 키 충돌 시 키가 아닌 모든 컬럼을 새 값으로 덮어씁니다.
    async fn upsert_chunk(&self, schema: &TableSchema, records: &[Record]) -> Result<u64>;

    /// 테이블 전체 교체 (비우기 + 일괄 삽입, 하나의 트랜잭션)
    async fn replace_all(
        &self,
        schema: &TableSchema,
        records: &[Record],
        chunk_size: usize,
    ) -> Result<u64>;

    /// 종목 목록 테이블의 전체 종목 코드 (정렬됨)
    async fn stock_ids(&self) -> Result<Vec<String>>;
}
