//! エラー型定義
//!
//! 統一エラー型（thiserror使用）
//!
//! `GatewayError` はHTTPステータスとクライアント向けメッセージを持ち、
//! APIレイヤーで `{"error": message}` として返される。

use thiserror::Error;

/// Common layer error type
#[derive(Debug, Error)]
pub enum CommonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// gateway error type
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Common layer error
    #[error(transparent)]
    Common(#[from] CommonError),

    /// Model is not present in the merged catalogue
    #[error("Model '{0}' was not found")]
    ModelNotFound(String),

    /// Backend index out of range
    #[error("Backend {0} not found")]
    BackendNotFound(usize),

    /// Model is known but every backend serving it is disabled
    #[error("No enabled backend serves model '{0}'")]
    NoBackendsAvailable(String),

    /// No enabled backend answered
    #[error("Docker Model Runner not found")]
    RunnerNotFound,

    /// Error reported by a backend (status is passed through)
    #[error("{message}")]
    Upstream {
        /// Backend status code
        status: u16,
        /// Message reported by the backend
        message: String,
    },

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// HTTP client error
    #[error("Docker Model Runner: {0}")]
    Http(String),

    /// Timeout error
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Authentication error
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Authorization error
    #[error("Authorization error: {0}")]
    Authorization(String),
}

impl GatewayError {
    /// Returns the message sent to clients.
    ///
    /// Backend and routing errors are returned verbatim so callers can act on
    /// them. Database and internal errors are masked; the full text is only
    /// logged.
    pub fn external_message(&self) -> String {
        match self {
            Self::Common(CommonError::Validation(msg)) => msg.clone(),
            Self::Common(CommonError::Serialization(err)) => err.to_string(),
            Self::Common(CommonError::Config(_)) => "Configuration error".to_string(),
            Self::Database(_) => "Database error".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
            Self::Authentication(_) => "Authentication failed".to_string(),
            Self::Authorization(_) => "Access denied".to_string(),
            other => other.to_string(),
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Common(CommonError::Config(_)) => 500,
            Self::Common(_) => 400,
            Self::ModelNotFound(_) => 400,
            Self::BackendNotFound(_) => 404,
            Self::NoBackendsAvailable(_) => 503,
            Self::RunnerNotFound => 500,
            Self::Upstream { status, .. } => *status,
            Self::Database(_) => 500,
            Self::Http(_) => 500,
            Self::Timeout(_) => 504,
            Self::Internal(_) => 500,
            Self::Authentication(_) => 401,
            Self::Authorization(_) => 403,
        }
    }

    /// Shorthand for a validation failure
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Common(CommonError::Validation(message.into()))
    }
}

/// Result alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;
