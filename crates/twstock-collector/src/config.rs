//! 설정 모듈.
//!
//! 설정 파일(`config.toml`, 확장자로 형식 판별)을 읽고 `TWSTOCK_` 접두사 환경변수로
//! 덮어씁니다. 중첩 키는 `__`로 구분합니다.
//!
//! ```text
//! TWSTOCK_PROVIDER__TOKEN=...
//! TWSTOCK_DATABASE__PASSWORD=...
//! TWSTOCK_SYNC__INDEX_IDS=TAIEX,TPEx
//! ```

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;
use chrono_tz::Tz;
use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use twstock_data::provider::finmind::{DEFAULT_AUTH_URL, DEFAULT_BASE_URL};
use twstock_data::{DatabaseConfig, FinMindConfig};

use crate::{CollectorError, Result};

/// 기본 설정 파일 경로
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// 환경변수 접두사
const ENV_PREFIX: &str = "TWSTOCK";

/// Collector 전체 설정
#[derive(Debug, Deserialize)]
pub struct CollectorConfig {
    /// 데이터 프로바이더 설정
    pub provider: ProviderConfig,
    /// 데이터베이스 설정
    #[serde(default)]
    pub database: DatabaseSection,
    /// 동기화 설정
    #[serde(default)]
    pub sync: SyncConfig,
    /// 데몬 모드 설정
    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// FinMind 설정
#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    /// API 토큰
    #[serde(deserialize_with = "deserialize_secret")]
    pub token: SecretString,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    /// 요청 타임아웃 (초)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// 시작 시 토큰 확인 여부
    #[serde(default = "default_true")]
    pub verify_token: bool,
}

/// 데이터베이스 설정
#[derive(Debug, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default = "empty_secret", deserialize_with = "deserialize_secret")]
    pub password: SecretString,
    #[serde(default = "default_db_name")]
    pub name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

/// 동기화 설정
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// 프로바이더 호출 최소 간격 (밀리초)
    /// 기본값: 6000ms (시간당 600회 한도)
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,
    /// UPSERT 청크 크기
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// 이력이 없을 때의 수집 시작일
    #[serde(default = "default_floor_date")]
    pub floor_date: NaiveDate,
    /// "오늘" 판단 기준 시간대 (IANA 이름, 예: "Asia/Taipei").
    /// 없으면 프로세스 로컬 시간
    #[serde(default)]
    pub timezone: Option<String>,
    /// 수집할 지수 ID
    #[serde(default = "default_index_ids")]
    pub index_ids: Vec<String>,
}

/// 데몬 모드 설정
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// 워크플로우 실행 주기 (분 단위)
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_auth_url() -> String {
    DEFAULT_AUTH_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_user() -> String {
    "postgres".to_string()
}

fn default_db_name() -> String {
    "twstock".to_string()
}

fn default_max_connections() -> u32 {
    4
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

fn default_request_interval_ms() -> u64 {
    6_000
}

fn default_chunk_size() -> usize {
    5_000
}

fn default_floor_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2010, 1, 1).unwrap_or_default()
}

fn default_index_ids() -> Vec<String> {
    vec!["TAIEX".to_string(), "TPEx".to_string()]
}

fn default_interval_minutes() -> u64 {
    24 * 60
}

/// 실행 주기 상한 (1년)
const MAX_INTERVAL_MINUTES: u64 = 366 * 24 * 60;

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            user: default_db_user(),
            password: empty_secret(),
            name: default_db_name(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_interval_ms: default_request_interval_ms(),
            chunk_size: default_chunk_size(),
            floor_date: default_floor_date(),
            timezone: None,
            index_ids: default_index_ids(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
        }
    }
}

impl CollectorConfig {
    /// 설정 파일 + 환경변수에서 로드.
    ///
    /// `path`가 없으면 `config.toml`을 찾고, 파일이 없어도 환경변수만으로 구성할 수 있습니다.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // .env는 선택 사항
        let _ = dotenvy::dotenv();

        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::from(Path::new(DEFAULT_CONFIG_PATH)).required(false),
        };

        Self::from_builder(config::Config::builder().add_source(file).add_source(env_source()))
    }

    /// 소스 조합에서 설정 생성 및 검증
    pub(crate) fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.provider.token.expose_secret().trim().is_empty() {
            return Err(CollectorError::Config(
                "provider.token이 비어 있습니다 (TWSTOCK_PROVIDER__TOKEN)".to_string(),
            ));
        }
        if self.sync.chunk_size == 0 {
            return Err(CollectorError::Config(
                "sync.chunk_size는 1 이상이어야 합니다".to_string(),
            ));
        }
        if !(1..=MAX_INTERVAL_MINUTES).contains(&self.daemon.interval_minutes) {
            return Err(CollectorError::Config(format!(
                "daemon.interval_minutes는 1 이상 {} 이하여야 합니다",
                MAX_INTERVAL_MINUTES
            )));
        }
        self.sync.timezone()?;
        Ok(())
    }
}

/// `TWSTOCK_` 환경변수 소스
pub(crate) fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("sync.index_ids")
}

impl ProviderConfig {
    /// FinMind 클라이언트 설정
    pub fn client_config(&self) -> FinMindConfig {
        FinMindConfig {
            base_url: self.base_url.clone(),
            auth_url: self.auth_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

impl DatabaseSection {
    /// 연결 풀 설정
    pub fn pool_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: SecretString::from(self.password.expose_secret().to_string()),
            name: self.name.clone(),
            max_connections: self.max_connections,
            acquire_timeout: Duration::from_secs(self.acquire_timeout_secs),
        }
    }
}

impl SyncConfig {
    /// 프로바이더 호출 최소 간격
    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    /// 설정된 시간대. 이름이 잘못되면 설정 에러
    pub fn timezone(&self) -> Result<Option<Tz>> {
        self.timezone
            .as_deref()
            .map(|name| {
                Tz::from_str(name).map_err(|e| {
                    CollectorError::Config(format!("잘못된 sync.timezone '{}': {}", name, e))
                })
            })
            .transpose()
    }
}

impl DaemonConfig {
    /// 워크플로우 실행 주기를 Duration으로 반환
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }
}
