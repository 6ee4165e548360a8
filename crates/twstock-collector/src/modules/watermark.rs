//! 워터마크 판정.
//!
//! 저장된 최신 날짜로 다음 조회 시작일을 결정합니다.

use chrono::{Days, NaiveDate};

/// 조회 구간 판정 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncWindow {
    /// `start`(포함)부터 조회 필요
    Fetch { start: NaiveDate },
    /// 이미 최신. 조회하지 않음
    Current { last: NaiveDate },
}

/// 워터마크 판정.
///
/// - 이력 없음 → `floor`부터
/// - 최신 날짜가 오늘 이후 → 조회 생략
/// - 그 외 → 최신 날짜 다음 날부터
pub fn resolve(last: Option<NaiveDate>, today: NaiveDate, floor: NaiveDate) -> SyncWindow {
    match last {
        None => SyncWindow::Fetch { start: floor },
        Some(last) if last >= today => SyncWindow::Current { last },
        Some(last) => SyncWindow::Fetch {
            start: last.checked_add_days(Days::new(1)).unwrap_or(last),
        },
    }
}
