// Error taxonomy for the integration API.
//
// Every failure surfaced to a partner maps to an `ErrorCode` + HTTP status;
// internal failures use `ConnectError`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error codes returned by the integration API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthorized,
    AppNotFound,
    UserNotFound,
    CodeNotFound,
    CodeExpired,
    CodeAlreadyRedeemed,
    IdentityConflict,
    NotLinked,
    ValidationError,
    WebhookSignatureInvalid,
    InternalServerError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::Unauthorized => "Unauthorized",
            Self::AppNotFound => "Integration app not found",
            Self::UserNotFound => "User not found",
            Self::CodeNotFound => "Access code not found",
            Self::CodeExpired => "Access code expired",
            Self::CodeAlreadyRedeemed => "Access code already redeemed",
            Self::IdentityConflict => "External user is linked to a different account",
            Self::NotLinked => "No identity link exists for this external user",
            Self::ValidationError => "Invalid request payload",
            Self::WebhookSignatureInvalid => "Webhook signature verification failed",
            Self::InternalServerError => "Internal server error",
        };
        write!(f, "{msg}")
    }
}

impl ErrorCode {
    /// The HTTP status this code is surfaced with.
    pub fn status(&self) -> HttpStatus {
        match self {
            Self::Unauthorized | Self::WebhookSignatureInvalid => HttpStatus::Unauthorized,
            Self::AppNotFound | Self::UserNotFound | Self::CodeNotFound => HttpStatus::NotFound,
            Self::CodeExpired => HttpStatus::Gone,
            Self::CodeAlreadyRedeemed | Self::IdentityConflict | Self::NotLinked => {
                HttpStatus::Conflict
            }
            Self::ValidationError => HttpStatus::BadRequest,
            Self::InternalServerError => HttpStatus::InternalServerError,
        }
    }
}

/// HTTP status codes used by the API error system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpStatus {
    Ok = 200,
    Found = 302,
    BadRequest = 400,
    Unauthorized = 401,
    Forbidden = 403,
    NotFound = 404,
    Conflict = 409,
    Gone = 410,
    UnprocessableEntity = 422,
    InternalServerError = 500,
}

impl HttpStatus {
    pub fn status_code(&self) -> u16 {
        *self as u16
    }
}

impl fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status_code())
    }
}

/// API error — an HTTP status, an error code, and a human-readable message.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{status} {code}: {message}")]
pub struct ApiError {
    pub status: HttpStatus,
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    /// Build an error with the code's default status and message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            status: code.status(),
            code,
            message: code.to_string(),
        }
    }

    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status(),
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::from_code(ErrorCode::Unauthorized)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::ValidationError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InternalServerError, message)
    }

    /// Build the JSON body for the error response.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        })
    }
}

/// Internal (non-HTTP) error for configuration, storage and crypto failures.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Unified result type for integration operations.
pub type Result<T> = std::result::Result<T, ConnectError>;
