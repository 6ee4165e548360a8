//! 증분 동기화 엔진.
//!
//! (데이터셋, 종목) 한 단위를 처리합니다.
//!
//! 1. 저장된 최신 날짜 조회 → 워터마크 판정
//! 2. 이미 최신이면 프로바이더 호출 없이 종료
//! 3. 시작일부터 조회 → NULL 토큰 정규화 → 병합 키 중복 제거 → 날짜순 정렬
//! 4. 최대 `chunk_size` 행씩, 날짜 경계에서 잘라 UPSERT (청크마다 독립 커밋)
//!
//! 청크 N이 실패해도 1..N-1은 유지되며, 커밋된 행은 항상 완결된 날짜들의
//! 앞부분입니다. 다음 실행은 커밋된 최신 날짜 다음 날부터 다시 조회합니다.
//! 한 날짜의 행이 `chunk_size`보다 많을 때만 날짜 중간에서 자릅니다.

use chrono::{Local, NaiveDate, Utc};
use chrono_tz::Tz;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use twstock_data::{
    dedup_by_key, normalize_rows, sort_by_date, DataError, DataSource, DatasetKind, DatasetStore,
    Record, TableSchema,
};

use super::watermark::{self, SyncWindow};
use crate::config::SyncConfig;
use crate::{CollectorError, Result};

/// "오늘" 기준
#[derive(Debug, Clone, Copy)]
pub enum Clock {
    /// 시스템 시계. 시간대가 없으면 프로세스 로컬 시간
    System(Option<Tz>),
    /// 고정 날짜 (테스트용)
    Fixed(NaiveDate),
}

impl Clock {
    pub fn today(&self) -> NaiveDate {
        match self {
            Clock::System(None) => Local::now().date_naive(),
            Clock::System(Some(tz)) => Utc::now().with_timezone(tz).date_naive(),
            Clock::Fixed(date) => *date,
        }
    }
}

/// 동기화 옵션
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// 이력이 없을 때의 시작일
    pub floor_date: NaiveDate,
    /// UPSERT 청크 크기
    pub chunk_size: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        SyncOptions::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            floor_date: config.floor_date,
            chunk_size: config.chunk_size.max(1),
        }
    }
}

/// 동기화 실행 컨텍스트
pub struct SyncContext<'a> {
    pub store: &'a dyn DatasetStore,
    pub source: &'a dyn DataSource,
    pub clock: Clock,
    pub options: SyncOptions,
    /// 종료 요청 토큰. 청크 사이와 단위 사이에서 확인
    pub shutdown: CancellationToken,
}

/// 한 단위의 처리 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// 이미 최신 (프로바이더 호출 없음)
    Current { last: NaiveDate },
    /// 조회했으나 데이터 없음
    Empty { start: NaiveDate },
    /// 병합 완료
    Merged {
        start: NaiveDate,
        rows: usize,
        chunks: usize,
    },
    /// 종료 요청으로 중단. `rows`는 중단 전까지 커밋된 행 수
    Interrupted {
        start: NaiveDate,
        rows: usize,
        chunks: usize,
    },
}

impl SyncOutcome {
    /// 프로바이더 호출 여부
    pub fn fetched(&self) -> bool {
        !matches!(self, SyncOutcome::Current { .. })
    }
}

/// 날짜순 정렬된 레코드를 청크로 분할.
///
/// 각 청크는 `chunk_size` 이하이며 범위 안의 마지막 날짜 경계에서 끝납니다.
/// 경계가 없으면 (한 날짜가 `chunk_size`보다 많거나 날짜 컬럼이 없음) 그대로 자릅니다.
fn date_aligned_chunks<'r>(
    schema: &TableSchema,
    records: &'r [Record],
    chunk_size: usize,
) -> Vec<&'r [Record]> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::with_capacity(records.len() / chunk_size + 1);
    let mut rest = records;

    while !rest.is_empty() {
        let mut end = chunk_size.min(rest.len());
        if end < rest.len() {
            if let Some(boundary) = (1..=end)
                .rev()
                .find(|&i| rest[i - 1].date(schema) != rest[i].date(schema))
            {
                end = boundary;
            }
        }
        let (head, tail) = rest.split_at(end);
        chunks.push(head);
        rest = tail;
    }

    chunks
}

/// (데이터셋, 종목) 증분 동기화
#[instrument(skip(ctx, kind), fields(dataset = %kind))]
pub async fn sync_dataset(
    ctx: &SyncContext<'_>,
    kind: DatasetKind,
    stock_id: &str,
) -> Result<SyncOutcome> {
    let schema = kind.schema();

    let last = ctx.store.max_date(schema, stock_id).await?;
    let start = match watermark::resolve(last, ctx.clock.today(), ctx.options.floor_date) {
        SyncWindow::Current { last } => {
            debug!(%last, "이미 최신 데이터, 건너뜀");
            return Ok(SyncOutcome::Current { last });
        }
        SyncWindow::Fetch { start } => start,
    };

    let source_error = |source: DataError| CollectorError::DataSource {
        stock_id: stock_id.to_string(),
        dataset: kind,
        start,
        source,
    };

    let rows = match ctx.source.fetch_dataset(kind, stock_id, start).await {
        Ok(rows) => rows,
        Err(DataError::Cancelled) => {
            return Ok(SyncOutcome::Interrupted {
                start,
                rows: 0,
                chunks: 0,
            })
        }
        Err(e) => return Err(source_error(e)),
    };

    if rows.is_empty() {
        debug!(%start, "조회 결과 없음");
        return Ok(SyncOutcome::Empty { start });
    }

    let fetched = rows.len();
    let records = normalize_rows(schema, &rows).map_err(source_error)?;
    let mut records = dedup_by_key(schema, records);
    sort_by_date(schema, &mut records);

    if records.len() < fetched {
        debug!(
            fetched,
            unique = records.len(),
            "병합 키 중복 행 제거"
        );
    }

    let mut committed = 0usize;
    let mut chunks = 0usize;
    for (index, chunk) in date_aligned_chunks(schema, &records, ctx.options.chunk_size)
        .into_iter()
        .enumerate()
    {
        if ctx.shutdown.is_cancelled() {
            warn!(rows = committed, chunks, "종료 요청으로 청크 저장 중단");
            return Ok(SyncOutcome::Interrupted {
                start,
                rows: committed,
                chunks,
            });
        }

        ctx.store
            .upsert_chunk(schema, chunk)
            .await
            .map_err(|source| CollectorError::Upsert {
                stock_id: stock_id.to_string(),
                dataset: kind,
                start,
                chunk: index,
                committed_rows: committed as u64,
                source,
            })?;

        committed += chunk.len();
        chunks += 1;
    }

    info!(%start, rows = committed, chunks, "병합 완료");
    Ok(SyncOutcome::Merged {
        start,
        rows: committed,
        chunks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use twstock_data::{FieldValue, MemoryStore, MockDataSource, RawRow};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn per_row(day: u32, per: serde_json::Value) -> RawRow {
        json!({
            "stock_id": "2330",
            "date": format!("2024-01-{:02}", day),
            "dividend_yield": 1.5,
            "PER": per,
            "PBR": 4.2,
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn context<'a>(store: &'a MemoryStore, source: &'a MockDataSource) -> SyncContext<'a> {
        SyncContext {
            store,
            source,
            clock: Clock::Fixed(date(2024, 1, 10)),
            options: SyncOptions {
                floor_date: date(2024, 1, 1),
                chunk_size: 2,
            },
            shutdown: CancellationToken::new(),
        }
    }

    fn index_record(id: &str, day: u32) -> Record {
        Record::new(vec![
            FieldValue::Text(id.to_string()),
            FieldValue::Date(date(2024, 1, day)),
            FieldValue::Float(1.0),
        ])
    }

    fn sizes(chunks: &[&[Record]]) -> Vec<usize> {
        chunks.iter().map(|c| c.len()).collect()
    }

    #[test]
    fn test_chunks_end_on_date_boundary() {
        let schema = DatasetKind::MarketIndex.schema();
        // 2일 3행, 3일 3행, 4일 1행
        let records = vec![
            index_record("A", 2),
            index_record("B", 2),
            index_record("C", 2),
            index_record("A", 3),
            index_record("B", 3),
            index_record("C", 3),
            index_record("A", 4),
        ];

        let chunks = date_aligned_chunks(schema, &records, 4);
        assert_eq!(sizes(&chunks), vec![3, 4]);
        assert!(chunks[0].iter().all(|r| r.date(schema) == Some(date(2024, 1, 2))));

        let chunks = date_aligned_chunks(schema, &records, 7);
        assert_eq!(sizes(&chunks), vec![7]);
    }

    #[test]
    fn test_oversized_date_is_cut_plainly() {
        let schema = DatasetKind::MarketIndex.schema();
        let records: Vec<Record> = ["A", "B", "C", "D", "E"]
            .iter()
            .map(|id| index_record(id, 2))
            .chain([index_record("A", 3), index_record("B", 3)])
            .collect();

        // 2일 5행은 3행 청크에 맞지 않으므로 날짜 중간에서 자르고, 나머지는 경계를 따름
        let chunks = date_aligned_chunks(schema, &records, 3);
        assert_eq!(sizes(&chunks), vec![3, 2, 2]);
    }

    #[test]
    fn test_distinct_dates_fill_chunks() {
        let schema = DatasetKind::MarketIndex.schema();
        let records: Vec<Record> = (1..=28).map(|day| index_record("TAIEX", day)).collect();

        let chunks = date_aligned_chunks(schema, &records, 10);
        assert_eq!(sizes(&chunks), vec![10, 10, 8]);
        assert!(date_aligned_chunks(schema, &[], 10).is_empty());
    }

    #[tokio::test]
    async fn test_first_run_fetches_from_floor() {
        let store = MemoryStore::new();
        let source = MockDataSource::new();
        source
            .set_dataset(
                DatasetKind::ValuationRatio,
                "2330",
                vec![per_row(2, json!(20.1)), per_row(3, json!(20.5)), per_row(4, json!("NaN"))],
            )
            .await;

        let ctx = context(&store, &source);
        let outcome = sync_dataset(&ctx, DatasetKind::ValuationRatio, "2330")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Merged {
                start: date(2024, 1, 1),
                rows: 3,
                chunks: 2
            }
        );
        assert!(outcome.fetched());
        assert_eq!(
            store
                .upsert_batches(DatasetKind::ValuationRatio.schema())
                .await,
            vec![2, 1]
        );
    }

    #[tokio::test]
    async fn test_current_does_not_call_provider() {
        let store = MemoryStore::new();
        let source = MockDataSource::new();
        let schema = DatasetKind::ValuationRatio.schema();
        let seeded = normalize_rows(schema, &[per_row(10, json!(19.0))]).unwrap();
        store.seed(schema, seeded).await;

        let ctx = context(&store, &source);
        let outcome = sync_dataset(&ctx, DatasetKind::ValuationRatio, "2330")
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Current { last: date(2024, 1, 10) });
        assert!(!outcome.fetched());
        assert_eq!(source.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_empty_result() {
        let store = MemoryStore::new();
        let source = MockDataSource::new();

        let ctx = context(&store, &source);
        let outcome = sync_dataset(&ctx, DatasetKind::MonthlyRevenue, "9999")
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Empty { start: date(2024, 1, 1) });
        assert_eq!(source.call_count().await, 1);
    }

    #[tokio::test]
    async fn test_provider_failure_carries_unit_context() {
        let store = MemoryStore::new();
        let source = MockDataSource::new();
        source.fail_dataset(DatasetKind::PriceDaily, "2330").await;

        let ctx = context(&store, &source);
        let err = sync_dataset(&ctx, DatasetKind::PriceDaily, "2330")
            .await
            .unwrap_err();

        match err {
            CollectorError::DataSource {
                stock_id,
                dataset,
                start,
                ..
            } => {
                assert_eq!(stock_id, "2330");
                assert_eq!(dataset, DatasetKind::PriceDaily);
                assert_eq!(start, date(2024, 1, 1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_row_fails_unit() {
        let store = MemoryStore::new();
        let source = MockDataSource::new();
        let mut bad = per_row(2, json!(20.0));
        bad.remove("stock_id");
        source
            .set_dataset(DatasetKind::ValuationRatio, "2330", vec![bad])
            .await;

        let ctx = context(&store, &source);
        let result = sync_dataset(&ctx, DatasetKind::ValuationRatio, "2330").await;

        assert!(matches!(result, Err(CollectorError::DataSource { .. })));
        assert_eq!(store.row_count(DatasetKind::ValuationRatio.schema()).await, 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_chunk() {
        let store = MemoryStore::new();
        let source = MockDataSource::new();
        source
            .set_dataset(
                DatasetKind::ValuationRatio,
                "2330",
                vec![per_row(2, json!(20.1))],
            )
            .await;

        let ctx = context(&store, &source);
        ctx.shutdown.cancel();
        let outcome = sync_dataset(&ctx, DatasetKind::ValuationRatio, "2330")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Interrupted {
                start: date(2024, 1, 1),
                rows: 0,
                chunks: 0
            }
        );
        assert!(store.upsert_calls().await.is_empty());
    }
}
