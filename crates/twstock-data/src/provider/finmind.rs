//! FinMind API 클라이언트.
//!
//! FinMind REST API v4(`/api/v4/data`)로 대만 시장 데이터셋을 조회합니다.
//! 인증 토큰은 `Authorization: Bearer` 헤더로 전달합니다.
//!
//! # 응답 형식
//!
//! ```json
//! {"msg": "success", "status": 200, "data": [{"date": "2024-01-02", "stock_id": "2330", ...}]}
//! ```
//!
//! # 사용 예제
//!
//! ```rust,ignore
//! use twstock_data::provider::{DataSource, FinMindClient, FinMindConfig};
//!
//! let client = FinMindClient::new(token, FinMindConfig::default())?;
//! client.verify_token().await?;
//! let rows = client
//!     .fetch_dataset(DatasetKind::PriceDaily, "2330", start_date)
//!     .await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, instrument};

use super::DataSource;
use crate::error::{DataError, Result};
use crate::record::RawRow;
use crate::schema::DatasetKind;

/// FinMind 데이터 API 기본 URL
pub const DEFAULT_BASE_URL: &str = "https://api.finmindtrade.com";

/// FinMind 계정 API 기본 URL (토큰 확인용)
pub const DEFAULT_AUTH_URL: &str = "https://api.web.finmindtrade.com";

/// 클라이언트 설정
#[derive(Debug, Clone)]
pub struct FinMindConfig {
    /// 데이터 API URL
    pub base_url: String,
    /// 계정 API URL
    pub auth_url: String,
    /// 요청 타임아웃
    pub timeout: Duration,
}

impl Default for FinMindConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// API 응답 래퍼
#[derive(Debug, Deserialize)]
struct DataResponse {
    #[serde(default)]
    msg: String,
    #[serde(default = "default_status")]
    status: u16,
    #[serde(default)]
    data: Vec<RawRow>,
}

/// 계정 정보 응답
#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    #[serde(default)]
    msg: String,
    #[serde(default = "default_status")]
    status: u16,
    #[serde(default)]
    user_count: Option<u64>,
    #[serde(default)]
    api_request_limit: Option<u64>,
}

fn default_status() -> u16 {
    200
}

/// 토큰 확인 결과 (호출 사용량)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaInfo {
    /// 현재 주기 사용 횟수
    pub used: Option<u64>,
    /// 주기당 허용 횟수
    pub limit: Option<u64>,
}

/// FinMind API 클라이언트
pub struct FinMindClient {
    client: reqwest::Client,
    token: SecretString,
    base_url: String,
    auth_url: String,
}

impl FinMindClient {
    /// 새 클라이언트 생성
    pub fn new(token: SecretString, config: FinMindConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            token,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_url: config.auth_url.trim_end_matches('/').to_string(),
        })
    }

    /// 토큰 유효성 확인.
    ///
    /// 잘못된 토큰이면 `AuthError`를 반환합니다. 시작 시 한 번 호출합니다.
    pub async fn verify_token(&self) -> Result<QuotaInfo> {
        let url = format!("{}/v2/user_info", self.auth_url);

        let response = self
            .client
            .get(&url)
            .query(&[("token", self.token.expose_secret())])
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), body));
        }

        let info: UserInfoResponse = response.json().await?;
        if info.status != StatusCode::OK.as_u16() {
            return Err(status_error(info.status, info.msg));
        }

        let quota = QuotaInfo {
            used: info.user_count,
            limit: info.api_request_limit,
        };
        info!(used = ?quota.used, limit = ?quota.limit, "FinMind 토큰 확인 완료");
        Ok(quota)
    }

    /// `/api/v4/data` 요청 실행
    async fn request(&self, params: &[(&str, &str)]) -> Result<Vec<RawRow>> {
        let url = format!("{}/api/v4/data", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(params)
            .bearer_auth(self.token.expose_secret())
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), body));
        }

        let payload: DataResponse = response.json().await?;
        if payload.status != StatusCode::OK.as_u16() {
            return Err(status_error(payload.status, payload.msg));
        }

        Ok(payload.data)
    }
}

/// 상태 코드 → 에러 분류
fn status_error(status: u16, message: String) -> DataError {
    match status {
        401 | 403 => DataError::AuthError(message),
        402 | 429 => DataError::RateLimited(message),
        _ => DataError::ApiError { status, message },
    }
}

#[async_trait]
impl DataSource for FinMindClient {
    async fn fetch_catalog(&self) -> Result<Vec<RawRow>> {
        let dataset = DatasetKind::Catalog.provider_dataset();
        debug!(dataset, "FinMind 종목 목록 요청");

        let rows = self.request(&[("dataset", dataset)]).await?;
        info!(count = rows.len(), "종목 목록 조회 완료");
        Ok(rows)
    }

    #[instrument(skip(self), fields(dataset = %kind))]
    async fn fetch_dataset(
        &self,
        kind: DatasetKind,
        stock_id: &str,
        start_date: NaiveDate,
    ) -> Result<Vec<RawRow>> {
        let start = start_date.format("%Y-%m-%d").to_string();
        let params = [
            ("dataset", kind.provider_dataset()),
            ("data_id", stock_id),
            ("start_date", start.as_str()),
        ];

        let rows = self.request(&params).await?;
        debug!(count = rows.len(), "FinMind 데이터 조회 완료");
        Ok(rows)
    }
}
