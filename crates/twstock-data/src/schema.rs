//! 데이터셋 스키마 레지스트리.
//!
//! 수집 대상 데이터셋마다 저장 테이블, 필드 목록(프로바이더 필드명 → 컬럼명, 타입),
//! 병합 키(UNIQUE 제약)와 FinMind 데이터셋 이름을 정적으로 정의합니다.
//!
//! ```rust,ignore
//! use twstock_data::DatasetKind;
//!
//! let kind: DatasetKind = "stock_prices".parse()?;
//! assert_eq!(kind.provider_dataset(), "TaiwanStockPrice");
//! println!("{}", kind.schema().create_table_sql());
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::DataError;

/// 컬럼 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// 문자열
    Text,
    /// 64비트 정수
    Integer,
    /// 64비트 실수
    Float,
    /// 날짜 (YYYY-MM-DD)
    Date,
}

impl FieldType {
    /// PostgreSQL 컬럼 타입
    pub fn sql_type(self) -> &'static str {
        match self {
            FieldType::Text => "TEXT",
            FieldType::Integer => "BIGINT",
            FieldType::Float => "DOUBLE PRECISION",
            FieldType::Date => "DATE",
        }
    }

    /// UNNEST 바인딩용 배열 캐스트
    pub fn array_cast(self) -> &'static str {
        match self {
            FieldType::Text => "text[]",
            FieldType::Integer => "int8[]",
            FieldType::Float => "float8[]",
            FieldType::Date => "date[]",
        }
    }
}

/// 필드 정의 (프로바이더 필드 → DB 컬럼)
#[derive(Debug)]
pub struct FieldSpec {
    /// FinMind 응답의 필드명
    pub source: &'static str,
    /// 저장 컬럼명
    pub column: &'static str,
    /// 컬럼 타입
    pub field_type: FieldType,
}

const fn field(source: &'static str, column: &'static str, field_type: FieldType) -> FieldSpec {
    FieldSpec {
        source,
        column,
        field_type,
    }
}

/// 테이블 스키마
#[derive(Debug)]
pub struct TableSchema {
    /// 테이블명
    pub table: &'static str,
    /// 필드 목록 (저장 순서)
    pub fields: &'static [FieldSpec],
    /// 병합 키 컬럼 (UNIQUE 제약)
    pub merge_key: &'static [&'static str],
    /// UNIQUE 제약 이름
    pub unique_name: &'static str,
}

impl TableSchema {
    /// 컬럼 위치 조회
    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.column == column)
    }

    /// 병합 키 여부
    pub fn is_key(&self, column: &str) -> bool {
        self.merge_key.contains(&column)
    }

    /// 병합 키 컬럼의 위치 목록 (merge_key 순서)
    pub fn key_indices(&self) -> Vec<usize> {
        self.merge_key
            .iter()
            .filter_map(|k| self.index_of(k))
            .collect()
    }

    /// `date` 컬럼 위치
    pub fn date_index(&self) -> Option<usize> {
        self.index_of("date")
    }

    /// 충돌 시 덮어쓸 컬럼 (키가 아닌 모든 컬럼)
    pub fn update_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields
            .iter()
            .map(|f| f.column)
            .filter(move |c| !self.is_key(c))
    }

    /// `CREATE TABLE IF NOT EXISTS` DDL.
    ///
    /// `id`는 식별 컬럼으로만 쓰이며 수집기가 값을 쓰거나 덮어쓰지 않습니다.
    pub fn create_table_sql(&self) -> String {
        let mut columns = vec!["id BIGSERIAL PRIMARY KEY".to_string()];
        for f in self.fields {
            let not_null = if self.is_key(f.column) { " NOT NULL" } else { "" };
            columns.push(format!(
                "\"{}\" {}{}",
                f.column,
                f.field_type.sql_type(),
                not_null
            ));
        }
        columns.push(format!(
            "CONSTRAINT \"{}\" UNIQUE ({})",
            self.unique_name,
            quote_columns(self.merge_key.iter().copied())
        ));

        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (\n    {}\n)",
            self.table,
            columns.join(",\n    ")
        )
    }
}

/// 컬럼명 목록을 `"a", "b"` 형태로 연결
pub fn quote_columns<'a>(columns: impl Iterator<Item = &'a str>) -> String {
    columns
        .map(|c| format!("\"{}\"", c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// 데이터셋 정의 (스키마 + 프로바이더 쿼리 이름)
#[derive(Debug)]
pub struct DatasetDescriptor {
    pub kind: DatasetKind,
    /// FinMind `dataset` 파라미터
    pub provider_dataset: &'static str,
    pub schema: TableSchema,
}

/// 수집 데이터셋 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DatasetKind {
    /// 일별 시세
    PriceDaily,
    /// 융자/대주 (신용거래)
    MarginShort,
    /// 3대 법인 매매동향
    InstitutionalTrade,
    /// 월 매출
    MonthlyRevenue,
    /// PER / PBR / 배당수익률
    ValuationRatio,
    /// 손익계산서
    IncomeStatement,
    /// 재무상태표
    BalanceSheet,
    /// 현금흐름표
    CashFlow,
    /// 총수익 지수 (TAIEX, TPEx)
    MarketIndex,
    /// 종목 목록
    Catalog,
}

impl DatasetKind {
    /// 전체 데이터셋 (스키마 생성 순서)
    pub const ALL: [DatasetKind; 10] = [
        DatasetKind::Catalog,
        DatasetKind::PriceDaily,
        DatasetKind::MarketIndex,
        DatasetKind::MarginShort,
        DatasetKind::InstitutionalTrade,
        DatasetKind::MonthlyRevenue,
        DatasetKind::ValuationRatio,
        DatasetKind::IncomeStatement,
        DatasetKind::BalanceSheet,
        DatasetKind::CashFlow,
    ];

    /// 종목별로 증분 수집하는 데이터셋 (실행 순서)
    pub const PER_STOCK: [DatasetKind; 8] = [
        DatasetKind::PriceDaily,
        DatasetKind::MarginShort,
        DatasetKind::InstitutionalTrade,
        DatasetKind::MonthlyRevenue,
        DatasetKind::ValuationRatio,
        DatasetKind::IncomeStatement,
        DatasetKind::BalanceSheet,
        DatasetKind::CashFlow,
    ];

    /// 정적 정의 조회
    pub fn descriptor(self) -> &'static DatasetDescriptor {
        match self {
            DatasetKind::PriceDaily => &PRICE_DAILY,
            DatasetKind::MarginShort => &MARGIN_SHORT,
            DatasetKind::InstitutionalTrade => &INSTITUTIONAL_TRADE,
            DatasetKind::MonthlyRevenue => &MONTHLY_REVENUE,
            DatasetKind::ValuationRatio => &VALUATION_RATIO,
            DatasetKind::IncomeStatement => &INCOME_STATEMENT,
            DatasetKind::BalanceSheet => &BALANCE_SHEET,
            DatasetKind::CashFlow => &CASH_FLOW,
            DatasetKind::MarketIndex => &MARKET_INDEX,
            DatasetKind::Catalog => &CATALOG,
        }
    }

    pub fn schema(self) -> &'static TableSchema {
        &self.descriptor().schema
    }

    pub fn provider_dataset(self) -> &'static str {
        self.descriptor().provider_dataset
    }

    /// 데이터셋 이름 (= 테이블명)
    pub fn name(self) -> &'static str {
        self.schema().table
    }

    /// 워터마크 기반 증분 수집 대상 여부 (종목 목록은 전체 교체)
    pub fn is_incremental(self) -> bool {
        self != DatasetKind::Catalog
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DatasetKind {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "stock_prices" | "price_daily" => Ok(DatasetKind::PriceDaily),
            "margin_short" => Ok(DatasetKind::MarginShort),
            "institutional_trades" | "institutional_trade" => Ok(DatasetKind::InstitutionalTrade),
            "month_revenue" | "monthly_revenue" => Ok(DatasetKind::MonthlyRevenue),
            "per" | "valuation_ratio" => Ok(DatasetKind::ValuationRatio),
            "financial_statements" | "income_statement" => Ok(DatasetKind::IncomeStatement),
            "balance_sheet" => Ok(DatasetKind::BalanceSheet),
            "cash_flow" => Ok(DatasetKind::CashFlow),
            "tw_index" | "market_index" | "TAIEX" | "TPEx" => Ok(DatasetKind::MarketIndex),
            "stock_codes" | "catalog" => Ok(DatasetKind::Catalog),
            other => Err(DataError::UnknownDataset(other.to_string())),
        }
    }
}

// ============================================================================
// 정적 정의
// ============================================================================

use FieldType::{Date, Float, Integer, Text};

static CATALOG: DatasetDescriptor = DatasetDescriptor {
    kind: DatasetKind::Catalog,
    provider_dataset: "TaiwanStockInfo",
    schema: TableSchema {
        table: "stock_codes",
        fields: &[
            field("industry_category", "industry_category", Text),
            field("stock_id", "stock_id", Text),
            field("stock_name", "stock_name", Text),
            field("type", "type", Text),
            field("date", "date", Date),
        ],
        merge_key: &["stock_id"],
        unique_name: "stock_codes_stock_id_key",
    },
};

static PRICE_DAILY: DatasetDescriptor = DatasetDescriptor {
    kind: DatasetKind::PriceDaily,
    provider_dataset: "TaiwanStockPrice",
    schema: TableSchema {
        table: "stock_prices",
        fields: &[
            field("stock_id", "stock_id", Text),
            field("date", "date", Date),
            field("open", "open", Float),
            field("max", "high", Float),
            field("min", "low", Float),
            field("close", "close", Float),
            field("Trading_Volume", "trading_volume", Integer),
            field("Trading_money", "trading_money", Integer),
            field("spread", "spread", Float),
            field("Trading_turnover", "trading_turnover", Integer),
        ],
        merge_key: &["stock_id", "date"],
        unique_name: "stock_prices_stock_id_date_key",
    },
};

static MARKET_INDEX: DatasetDescriptor = DatasetDescriptor {
    kind: DatasetKind::MarketIndex,
    provider_dataset: "TaiwanStockTotalReturnIndex",
    schema: TableSchema {
        table: "tw_index",
        fields: &[
            field("stock_id", "stock_id", Text),
            field("date", "date", Date),
            field("price", "price", Float),
        ],
        merge_key: &["stock_id", "date"],
        unique_name: "tw_index_stock_id_date_key",
    },
};

static MARGIN_SHORT: DatasetDescriptor = DatasetDescriptor {
    kind: DatasetKind::MarginShort,
    provider_dataset: "TaiwanStockMarginPurchaseShortSale",
    schema: TableSchema {
        table: "margin_short",
        fields: &[
            field("stock_id", "stock_id", Text),
            field("date", "date", Date),
            field("MarginPurchaseBuy", "margin_purchase_buy", Integer),
            field(
                "MarginPurchaseCashRepayment",
                "margin_purchase_cash_repayment",
                Integer,
            ),
            field("MarginPurchaseLimit", "margin_purchase_limit", Integer),
            field("MarginPurchaseSell", "margin_purchase_sell", Integer),
            field(
                "MarginPurchaseTodayBalance",
                "margin_purchase_today_balance",
                Integer,
            ),
            field(
                "MarginPurchaseYesterdayBalance",
                "margin_purchase_yesterday_balance",
                Integer,
            ),
            field("Note", "note", Text),
            field("OffsetLoanAndShort", "offset_loan_and_short", Integer),
            field("ShortSaleBuy", "short_sale_buy", Integer),
            field("ShortSaleCashRepayment", "short_sale_cash_repayment", Integer),
            field("ShortSaleLimit", "short_sale_limit", Integer),
            field("ShortSaleSell", "short_sale_sell", Integer),
            field("ShortSaleTodayBalance", "short_sale_today_balance", Integer),
            field(
                "ShortSaleYesterdayBalance",
                "short_sale_yesterday_balance",
                Integer,
            ),
        ],
        merge_key: &["stock_id", "date"],
        unique_name: "margin_short_stock_id_date_key",
    },
};

static INSTITUTIONAL_TRADE: DatasetDescriptor = DatasetDescriptor {
    kind: DatasetKind::InstitutionalTrade,
    provider_dataset: "TaiwanStockInstitutionalInvestorsBuySell",
    schema: TableSchema {
        table: "institutional_trades",
        fields: &[
            field("stock_id", "stock_id", Text),
            field("date", "date", Date),
            field("name", "name", Text),
            field("buy", "buy", Integer),
            field("sell", "sell", Integer),
        ],
        merge_key: &["stock_id", "date", "name"],
        unique_name: "institutional_trades_stock_id_date_name_key",
    },
};

static MONTHLY_REVENUE: DatasetDescriptor = DatasetDescriptor {
    kind: DatasetKind::MonthlyRevenue,
    provider_dataset: "TaiwanStockMonthRevenue",
    schema: TableSchema {
        table: "month_revenue",
        fields: &[
            field("stock_id", "stock_id", Text),
            field("date", "date", Date),
            field("country", "country", Text),
            field("revenue", "revenue", Integer),
            field("revenue_month", "revenue_month", Integer),
            field("revenue_year", "revenue_year", Integer),
        ],
        merge_key: &["stock_id", "date"],
        unique_name: "month_revenue_stock_id_date_key",
    },
};

static VALUATION_RATIO: DatasetDescriptor = DatasetDescriptor {
    kind: DatasetKind::ValuationRatio,
    provider_dataset: "TaiwanStockPER",
    schema: TableSchema {
        table: "per",
        fields: &[
            field("stock_id", "stock_id", Text),
            field("date", "date", Date),
            field("dividend_yield", "dividend_yield", Float),
            field("PER", "per", Float),
            field("PBR", "pbr", Float),
        ],
        merge_key: &["stock_id", "date"],
        unique_name: "per_stock_id_date_key",
    },
};

/// 재무제표 3종 공통 필드
const STATEMENT_FIELDS: &[FieldSpec] = &[
    field("stock_id", "stock_id", Text),
    field("date", "date", Date),
    field("type", "type", Text),
    field("value", "value", Float),
    field("origin_name", "origin_name", Text),
];

const STATEMENT_KEY: &[&str] = &["stock_id", "type", "date"];

static INCOME_STATEMENT: DatasetDescriptor = DatasetDescriptor {
    kind: DatasetKind::IncomeStatement,
    provider_dataset: "TaiwanStockFinancialStatements",
    schema: TableSchema {
        table: "financial_statements",
        fields: STATEMENT_FIELDS,
        merge_key: STATEMENT_KEY,
        unique_name: "financial_statements_stock_id_type_date_key",
    },
};

static BALANCE_SHEET: DatasetDescriptor = DatasetDescriptor {
    kind: DatasetKind::BalanceSheet,
    provider_dataset: "TaiwanStockBalanceSheet",
    schema: TableSchema {
        table: "balance_sheet",
        fields: STATEMENT_FIELDS,
        merge_key: STATEMENT_KEY,
        unique_name: "balance_sheet_stock_id_type_date_key",
    },
};

static CASH_FLOW: DatasetDescriptor = DatasetDescriptor {
    kind: DatasetKind::CashFlow,
    provider_dataset: "TaiwanStockCashFlowsStatement",
    schema: TableSchema {
        table: "cash_flow",
        fields: STATEMENT_FIELDS,
        merge_key: STATEMENT_KEY,
        unique_name: "cash_flow_stock_id_type_date_key",
    },
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_resolves_its_own_descriptor() {
        for kind in DatasetKind::ALL {
            assert_eq!(kind.descriptor().kind, kind);
            assert_eq!(kind.name().parse::<DatasetKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_merge_keys_are_declared_fields() {
        for kind in DatasetKind::ALL {
            let schema = kind.schema();
            assert_eq!(
                schema.key_indices().len(),
                schema.merge_key.len(),
                "{} 병합 키가 필드 목록에 없음",
                kind
            );
            if kind.is_incremental() {
                assert!(schema.is_key("stock_id"));
                assert!(schema.is_key("date"));
            }
        }
    }

    #[test]
    fn test_table_names_are_unique() {
        let mut tables: Vec<&str> = DatasetKind::ALL.iter().map(|k| k.name()).collect();
        tables.sort_unstable();
        tables.dedup();
        assert_eq!(tables.len(), DatasetKind::ALL.len());
    }

    #[test]
    fn test_index_aliases_map_to_one_kind() {
        assert_eq!(
            "TAIEX".parse::<DatasetKind>().unwrap(),
            DatasetKind::MarketIndex
        );
        assert_eq!(
            "TPEx".parse::<DatasetKind>().unwrap(),
            DatasetKind::MarketIndex
        );
        assert!(matches!(
            "unknown".parse::<DatasetKind>(),
            Err(DataError::UnknownDataset(_))
        ));
    }

    #[test]
    fn test_create_table_sql() {
        let sql = DatasetKind::InstitutionalTrade.schema().create_table_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"institutional_trades\""));
        assert!(sql.contains("id BIGSERIAL PRIMARY KEY"));
        assert!(sql.contains("\"name\" TEXT NOT NULL"));
        assert!(sql.contains("\"buy\" BIGINT,"));
        assert!(sql.contains(
            "CONSTRAINT \"institutional_trades_stock_id_date_name_key\" UNIQUE (\"stock_id\", \"date\", \"name\")"
        ));
    }

    #[test]
    fn test_update_columns_exclude_key() {
        let cols: Vec<&str> = DatasetKind::CashFlow.schema().update_columns().collect();
        assert_eq!(cols, vec!["value", "origin_name"]);
    }

    #[test]
    fn test_price_fields_are_renamed() {
        let schema = DatasetKind::PriceDaily.schema();
        let high = &schema.fields[schema.index_of("high").unwrap()];
        assert_eq!(high.source, "max");
        assert_eq!(high.field_type, FieldType::Float);
    }
}
