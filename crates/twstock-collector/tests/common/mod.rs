#![allow(dead_code)]

use chrono::{Days, NaiveDate};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use twstock_collector::modules::{Clock, SyncContext, SyncOptions};
use twstock_data::{DataSource, DatasetStore, RawRow};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn row(value: Value) -> RawRow {
    value.as_object().cloned().unwrap()
}

pub fn price_row(stock_id: &str, day: NaiveDate, close: f64) -> RawRow {
    row(json!({
        "date": day.format("%Y-%m-%d").to_string(),
        "stock_id": stock_id,
        "Trading_Volume": 1_000,
        "Trading_money": 500_000,
        "open": close - 1.0,
        "max": close + 1.0,
        "min": close - 2.0,
        "close": close,
        "spread": 0.5,
        "Trading_turnover": 42,
    }))
}

/// `first`부터 하루씩 증가하는 `count`개의 가격 행
pub fn price_rows(stock_id: &str, first: NaiveDate, count: usize) -> Vec<RawRow> {
    (0..count)
        .map(|i| {
            let day = first.checked_add_days(Days::new(i as u64)).unwrap();
            price_row(stock_id, day, 100.0 + i as f64)
        })
        .collect()
}

pub fn info_row(stock_id: &str, industry: &str) -> RawRow {
    row(json!({
        "industry_category": industry,
        "stock_id": stock_id,
        "stock_name": format!("name-{stock_id}"),
        "type": "twse",
        "date": "2020-01-02",
    }))
}

pub fn index_row(index_id: &str, day: NaiveDate, price: f64) -> RawRow {
    row(json!({
        "date": day.format("%Y-%m-%d").to_string(),
        "stock_id": index_id,
        "price": price,
    }))
}

pub fn context<'a>(
    store: &'a dyn DatasetStore,
    source: &'a dyn DataSource,
    today: NaiveDate,
    floor: NaiveDate,
    chunk_size: usize,
) -> SyncContext<'a> {
    SyncContext {
        store,
        source,
        clock: Clock::Fixed(today),
        options: SyncOptions {
            floor_date: floor,
            chunk_size,
        },
        shutdown: CancellationToken::new(),
    }
}
