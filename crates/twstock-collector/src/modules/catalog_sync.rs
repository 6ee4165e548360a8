//! 종목 목록 갱신.
//!
//! 다른 데이터셋과 달리 증분 병합이 아니라 전체 교체입니다.
//! 교체는 하나의 트랜잭션이므로 실패하면 기존 목록이 그대로 남습니다.

use tracing::{info, warn};
use twstock_data::{dedup_by_key, normalize_rows, DatasetKind};

use super::dataset_sync::SyncContext;
use crate::Result;

/// 종목 목록 갱신 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogOutcome {
    /// 프로바이더가 빈 목록을 반환. 기존 목록 유지
    Empty,
    /// 교체 완료
    Replaced { rows: usize },
}

/// 종목 목록 전체 교체
pub async fn refresh_catalog(ctx: &SyncContext<'_>) -> Result<CatalogOutcome> {
    let schema = DatasetKind::Catalog.schema();

    let rows = ctx.source.fetch_catalog().await?;
    if rows.is_empty() {
        warn!("종목 목록이 비어 있음, 기존 목록 유지");
        return Ok(CatalogOutcome::Empty);
    }

    // 산업 분류별로 같은 종목이 여러 번 나오므로 stock_id 기준 중복 제거
    let fetched = rows.len();
    let records = dedup_by_key(schema, normalize_rows(schema, &rows)?);

    let inserted = ctx
        .store
        .replace_all(schema, &records, ctx.options.chunk_size)
        .await?;

    info!(
        fetched,
        rows = records.len(),
        inserted,
        "종목 목록 교체 완료"
    );
    Ok(CatalogOutcome::Replaced {
        rows: records.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::dataset_sync::{Clock, SyncOptions};
    use chrono::NaiveDate;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;
    use twstock_data::{DatasetStore, MemoryStore, MockDataSource, RawRow};

    fn info_row(id: &str, industry: &str) -> RawRow {
        json!({
            "industry_category": industry,
            "stock_id": id,
            "stock_name": format!("name-{id}"),
            "type": "twse",
            "date": "None",
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn context<'a>(store: &'a MemoryStore, source: &'a MockDataSource) -> SyncContext<'a> {
        SyncContext {
            store,
            source,
            clock: Clock::Fixed(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()),
            options: SyncOptions::default(),
            shutdown: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_listings_collapse() {
        let store = MemoryStore::new();
        let source = MockDataSource::new();
        source
            .set_catalog(vec![
                info_row("2330", "半導體業"),
                info_row("2330", "電子工業"),
                info_row("2317", "其他電子業"),
            ])
            .await;

        let outcome = refresh_catalog(&context(&store, &source)).await.unwrap();

        assert_eq!(outcome, CatalogOutcome::Replaced { rows: 2 });
        assert_eq!(store.stock_ids().await.unwrap(), vec!["2317", "2330"]);
    }

    #[tokio::test]
    async fn test_empty_catalog_keeps_existing() {
        let store = MemoryStore::new();
        let source = MockDataSource::new();
        let schema = DatasetKind::Catalog.schema();
        store
            .seed(schema, normalize_rows(schema, &[info_row("1101", "水泥工業")]).unwrap())
            .await;

        let outcome = refresh_catalog(&context(&store, &source)).await.unwrap();

        assert_eq!(outcome, CatalogOutcome::Empty);
        assert_eq!(store.stock_ids().await.unwrap(), vec!["1101"]);
    }

    #[tokio::test]
    async fn test_failed_replace_keeps_existing() {
        let store = MemoryStore::new();
        let source = MockDataSource::new();
        let schema = DatasetKind::Catalog.schema();
        store
            .seed(schema, normalize_rows(schema, &[info_row("1101", "水泥工業")]).unwrap())
            .await;
        store.fail_replace().await;
        source
            .set_catalog(vec![info_row("2330", "半導體業"), info_row("2317", "其他電子業")])
            .await;

        let result = refresh_catalog(&context(&store, &source)).await;

        assert!(result.is_err());
        assert_eq!(store.stock_ids().await.unwrap(), vec!["1101"]);
    }
}
