//! 전체 수집 워크플로우.
//!
//! 종목 목록 갱신 → 종목별 데이터셋 8종 → 시장 지수 순서로 실행합니다.
//! 단위 실패는 로그와 통계에 남기고 다음 단위로 진행합니다.
//! 종목 목록 조회(DB) 실패만 실행 전체를 중단합니다.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};
use twstock_data::DatasetKind;

use super::catalog_sync::{refresh_catalog, CatalogOutcome};
use super::dataset_sync::{sync_dataset, SyncContext, SyncOutcome};
use crate::{CollectionStats, CollectorError, Result};

/// 실행 결과 요약
#[derive(Debug, Default)]
pub struct RunSummary {
    /// 종목 목록 갱신 결과 (실행하지 않았거나 실패하면 None)
    pub catalog: Option<CatalogOutcome>,
    /// 처리 대상 종목 수
    pub instruments: usize,
    /// 데이터셋별 통계
    pub datasets: BTreeMap<DatasetKind, CollectionStats>,
    /// 종료 요청으로 중단되었는지
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    /// 전체 합계
    pub fn totals(&self) -> CollectionStats {
        let mut totals = CollectionStats::new();
        for stats in self.datasets.values() {
            totals.merge(stats);
        }
        totals.elapsed = self.elapsed;
        totals
    }

    fn absorb(&mut self, other: RunSummary) {
        for (kind, stats) in other.datasets {
            self.datasets.entry(kind).or_default().merge(&stats);
        }
        self.interrupted |= other.interrupted;
    }

    /// 데이터셋별 + 전체 요약 로그
    pub fn log_summary(&self, operation: &str) {
        for (kind, stats) in &self.datasets {
            stats.log_summary(&format!("{} / {}", operation, kind));
        }
        self.totals().log_summary(operation);
        if self.interrupted {
            warn!(operation, "종료 요청으로 중단된 실행");
        }
    }
}

/// 진행률 로그 (10종목마다 또는 1분마다)
struct ProgressTracker {
    started: Instant,
    last_log: Instant,
    completed: usize,
    total: usize,
}

impl ProgressTracker {
    fn new(total: usize) -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last_log: now,
            completed: 0,
            total,
        }
    }

    fn record(&mut self, stock_id: &str) {
        self.completed += 1;
        if self.completed % 10 == 0
            || self.completed == self.total
            || self.last_log.elapsed() >= Duration::from_secs(60)
        {
            self.last_log = Instant::now();
            let percent = if self.total > 0 {
                self.completed * 100 / self.total
            } else {
                0
            };
            info!(
                "[{}/{}] ({}%) | 경과: {}s | 현재: {}",
                self.completed,
                self.total,
                percent,
                self.started.elapsed().as_secs(),
                stock_id
            );
        }
    }
}

/// 처리 대상 종목.
///
/// 지정 목록이 있으면 그대로 사용하고, 없으면 종목 목록 테이블 전체를 사용합니다.
pub async fn target_stocks(ctx: &SyncContext<'_>, filter: Option<&[String]>) -> Result<Vec<String>> {
    match filter {
        Some(ids) if !ids.is_empty() => Ok(ids.to_vec()),
        _ => Ok(ctx.store.stock_ids().await?),
    }
}

/// 한 단위 실행 후 통계 반영. 중단되었으면 `true`
async fn run_unit(
    ctx: &SyncContext<'_>,
    kind: DatasetKind,
    stock_id: &str,
    stats: &mut CollectionStats,
) -> bool {
    match sync_dataset(ctx, kind, stock_id).await {
        Ok(outcome) => {
            stats.record(&outcome);
            matches!(outcome, SyncOutcome::Interrupted { .. })
        }
        Err(e) => {
            let committed = match &e {
                CollectorError::Upsert { committed_rows, .. } => *committed_rows,
                _ => 0,
            };
            error!(stock_id, dataset = %kind, error = %e, "동기화 실패");
            stats.record_error(committed);
            false
        }
    }
}

/// 종목 × 데이터셋 실행 (종목 순서 → 데이터셋 순서)
pub async fn run_datasets(
    ctx: &SyncContext<'_>,
    kinds: &[DatasetKind],
    stock_ids: &[String],
) -> RunSummary {
    let started = Instant::now();
    let mut summary = RunSummary {
        instruments: stock_ids.len(),
        ..Default::default()
    };
    let mut progress = ProgressTracker::new(stock_ids.len());

    'stocks: for stock_id in stock_ids {
        for &kind in kinds {
            if ctx.shutdown.is_cancelled() {
                summary.interrupted = true;
                break 'stocks;
            }

            let stats = summary.datasets.entry(kind).or_default();
            if run_unit(ctx, kind, stock_id, stats).await {
                summary.interrupted = true;
                break 'stocks;
            }
        }
        progress.record(stock_id);
    }

    summary.elapsed = started.elapsed();
    for stats in summary.datasets.values_mut() {
        stats.elapsed = summary.elapsed;
    }
    summary
}

/// 전체 워크플로우.
///
/// 1. 종목 목록 갱신 (실패하거나 비어 있으면 기존 목록으로 계속)
/// 2. 종목별 데이터셋 (`DatasetKind::PER_STOCK` 순서)
/// 3. 시장 지수 (`index_ids`)
pub async fn run_all(
    ctx: &SyncContext<'_>,
    filter: Option<&[String]>,
    index_ids: &[String],
) -> Result<RunSummary> {
    let started = Instant::now();
    info!("=== 전체 워크플로우 시작 ===");

    info!("Step 1/3: 종목 목록 갱신");
    let catalog = match refresh_catalog(ctx).await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            error!(error = %e, "종목 목록 갱신 실패, 기존 목록으로 진행");
            None
        }
    };

    let stock_ids = target_stocks(ctx, filter).await?;
    info!(count = stock_ids.len(), "Step 2/3: 종목별 데이터셋 동기화");

    let mut summary = run_datasets(ctx, &DatasetKind::PER_STOCK, &stock_ids).await;
    summary.catalog = catalog;

    if !summary.interrupted {
        info!(count = index_ids.len(), "Step 3/3: 시장 지수 동기화");
        let indices = run_datasets(ctx, &[DatasetKind::MarketIndex], index_ids).await;
        summary.absorb(indices);
    }

    summary.elapsed = started.elapsed();
    if summary.interrupted {
        warn!("=== 전체 워크플로우 중단 ===");
    } else {
        info!("=== 전체 워크플로우 완료 ===");
    }
    Ok(summary)
}
