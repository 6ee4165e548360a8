//! 대만 주식 데이터셋 계층.
//!
//! - [`schema`]: 데이터셋별 테이블 정의와 병합 키
//! - [`record`]: 프로바이더 행 → 타입이 있는 레코드 변환
//! - [`provider`]: FinMind 클라이언트와 `DataSource` trait
//! - [`storage`]: PostgreSQL UPSERT 저장소와 `DatasetStore` trait

pub mod database;
pub mod error;
pub mod provider;
pub mod record;
pub mod schema;
pub mod storage;

pub use database::{Database, DatabaseConfig};
pub use error::{DataError, Result};
pub use provider::{DataSource, FinMindClient, FinMindConfig, MockDataSource};
pub use record::{dedup_by_key, normalize_rows, sort_by_date, FieldValue, RawRow, Record};
pub use schema::{DatasetKind, FieldType, TableSchema};
pub use storage::{DatasetStore, MemoryStore, PgStore};
