//! 수집 통계 구조체.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::modules::SyncOutcome;

/// 수집 작업 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionStats {
    /// 총 처리 단위 수 (종목 × 데이터셋)
    pub total: usize,
    /// 병합 성공 횟수
    pub success: usize,
    /// 에러 횟수
    pub errors: usize,
    /// 건너뛴 횟수 (이미 최신 데이터)
    pub skipped: usize,
    /// 빈 데이터 (조회 성공, 데이터 없음)
    pub empty: usize,
    /// 저장된 총 행 수
    pub total_rows: usize,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl CollectionStats {
    /// 새 통계 객체 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 한 단위의 결과 반영
    pub fn record(&mut self, outcome: &SyncOutcome) {
        self.total += 1;
        match outcome {
            SyncOutcome::Current { .. } => self.skipped += 1,
            SyncOutcome::Empty { .. } => self.empty += 1,
            SyncOutcome::Merged { rows, .. } => {
                self.success += 1;
                self.total_rows += rows;
            }
            SyncOutcome::Interrupted { rows, .. } => self.total_rows += rows,
        }
    }

    /// 실패한 단위 반영. `committed_rows`는 실패 전에 반영된 행 수
    pub fn record_error(&mut self, committed_rows: u64) {
        self.total += 1;
        self.errors += 1;
        self.total_rows += committed_rows as usize;
    }

    /// 다른 통계 합산
    pub fn merge(&mut self, other: &CollectionStats) {
        self.total += other.total;
        self.success += other.success;
        self.errors += other.errors;
        self.skipped += other.skipped;
        self.empty += other.empty;
        self.total_rows += other.total_rows;
        self.elapsed += other.elapsed;
    }

    /// 성공률 계산 (%)
    ///
    /// skipped(이미 최신)는 분모에서 제외.
    pub fn success_rate(&self) -> f64 {
        let attempted = self.total.saturating_sub(self.skipped);
        if attempted == 0 {
            0.0
        } else {
            ((self.success + self.empty) as f64 / attempted as f64) * 100.0
        }
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            total = self.total,
            success = self.success,
            errors = self.errors,
            skipped = self.skipped,
            empty = self.empty,
            total_rows = self.total_rows,
            success_rate = format!("{:.1}%", self.success_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "수집 완료"
        );
    }
}
