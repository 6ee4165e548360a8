//! 프로바이더 호출 간격 제어.
//!
//! FinMind는 토큰당 시간당 호출 수를 제한합니다. `RateGate`는 단조 시계 기준으로
//! 직전 호출 시작 시점부터 최소 간격이 지나야 다음 호출을 허용합니다.
//! 조회를 건너뛰는 단위는 게이트를 거치지 않으므로 대기하지 않습니다.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;
use twstock_data::{DataError, DataSource, DatasetKind, RawRow};

/// 최소 호출 간격 게이트
pub struct RateGate {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// 다음 호출이 허용될 때까지 대기.
    ///
    /// 대기 중 종료 요청이 오면 `false`를 반환하며 호출 시점은 기록하지 않습니다.
    pub async fn acquire(&self, shutdown: &CancellationToken) -> bool {
        let mut last = self.last.lock().await;

        if let Some(previous) = *last {
            let ready_at = previous + self.interval;
            let now = Instant::now();
            if ready_at > now {
                trace!(wait_ms = (ready_at - now).as_millis() as u64, "호출 간격 대기");
                tokio::select! {
                    _ = tokio::time::sleep_until(ready_at) => {}
                    _ = shutdown.cancelled() => return false,
                }
            }
        }

        *last = Some(Instant::now());
        true
    }
}

/// 호출마다 `RateGate`를 거치는 `DataSource` 래퍼
pub struct Paced<S> {
    inner: S,
    gate: RateGate,
    shutdown: CancellationToken,
}

impl<S: DataSource> Paced<S> {
    pub fn new(inner: S, interval: Duration, shutdown: CancellationToken) -> Self {
        Self {
            inner,
            gate: RateGate::new(interval),
            shutdown,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: DataSource> DataSource for Paced<S> {
    async fn fetch_catalog(&self) -> Result<Vec<RawRow>, DataError> {
        if !self.gate.acquire(&self.shutdown).await {
            return Err(DataError::Cancelled);
        }
        self.inner.fetch_catalog().await
    }

    async fn fetch_dataset(
        &self,
        kind: DatasetKind,
        stock_id: &str,
        start_date: NaiveDate,
    ) -> Result<Vec<RawRow>, DataError> {
        if !self.gate.acquire(&self.shutdown).await {
            return Err(DataError::Cancelled);
        }
        self.inner.fetch_dataset(kind, stock_id, start_date).await
    }
}
