//! 데이터 수집 모듈.

pub mod catalog_sync;
pub mod dataset_sync;
pub mod pacing;
pub mod watermark;
pub mod workflow;

pub use catalog_sync::{refresh_catalog, CatalogOutcome};
pub use dataset_sync::{sync_dataset, Clock, SyncContext, SyncOptions, SyncOutcome};
pub use pacing::{Paced, RateGate};
pub use watermark::SyncWindow;
pub use workflow::{run_all, run_datasets, target_stocks, RunSummary};
