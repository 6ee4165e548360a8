//! PostgreSQL 연결 풀.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::info;

use crate::error::{DataError, Result};

/// 데이터베이스 설정
#[derive(Debug)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
    /// 데이터베이스 이름
    pub name: String,
    /// 최대 커넥션 수
    pub max_connections: u32,
    /// 커넥션 획득 타임아웃
    pub acquire_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: SecretString::from(String::new()),
            name: "twstock".to_string(),
            max_connections: 4,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl DatabaseConfig {
    /// 로그용 접속 정보 (비밀번호 제외)
    pub fn masked(&self) -> String {
        format!(
            "postgres://{}:****@{}:{}/{}",
            self.user, self.host, self.port, self.name
        )
    }

    fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(self.password.expose_secret())
            .database(&self.name)
    }
}

/// 데이터베이스 핸들
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 커넥션 풀 생성 및 연결 확인
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(config.connect_options())
            .await
            .map_err(|e| DataError::ConnectionError(format!("{}: {}", config.masked(), e)))?;

        info!(database = %config.masked(), "데이터베이스 연결 완료");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
