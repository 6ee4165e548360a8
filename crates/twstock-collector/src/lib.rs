//! FinMind → PostgreSQL 증분 수집기.
//!
//! 종목 목록을 갱신한 뒤 종목별 데이터셋을 저장된 최신 날짜 이후만 받아 병합합니다.

pub mod config;
pub mod error;
pub mod modules;
pub mod stats;

pub use config::CollectorConfig;
pub use error::{CollectorError, Result};
pub use stats::CollectionStats;
