//! 데이터 계층 에러 타입.

use thiserror::Error;

/// 데이터 계층 에러
#[derive(Debug, Error)]
pub enum DataError {
    /// DB 연결 실패
    #[error("DB 연결 실패: {0}")]
    ConnectionError(String),

    /// 조회 쿼리 실패
    #[error("쿼리 실패: {0}")]
    QueryError(String),

    /// INSERT / UPSERT 실패
    #[error("저장 실패: {0}")]
    InsertError(String),

    /// 스키마 생성 실패
    #[error("스키마 생성 실패 [{table}]: {reason}")]
    SchemaError { table: String, reason: String },

    /// 알 수 없는 데이터셋 이름
    #[error("알 수 없는 데이터셋: {0}")]
    UnknownDataset(String),

    /// 프로바이더 응답 필드 변환 실패
    #[error("필드 변환 실패 [{field}]: {reason}")]
    DecodeError { field: String, reason: String },

    /// HTTP 전송 실패 (네트워크, 타임아웃)
    #[error("HTTP 요청 실패: {0}")]
    HttpError(#[from] reqwest::Error),

    /// 인증 실패 (토큰 오류)
    #[error("인증 실패: {0}")]
    AuthError(String),

    /// 호출 한도 초과
    #[error("Rate limit 초과: {0}")]
    RateLimited(String),

    /// 프로바이더가 실패 상태를 반환
    #[error("API 오류 [{status}]: {message}")]
    ApiError { status: u16, message: String },

    /// 종료 요청으로 호출 전에 취소됨
    #[error("요청 취소됨")]
    Cancelled,
}

impl From<sqlx::Error> for DataError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DataError::ConnectionError(err.to_string())
            }
            other => DataError::QueryError(other.to_string()),
        }
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, DataError>;
