// Client-side error type, mapped from HTTP status codes.

/// Errors returned by [`crate::ConnectClient`] calls.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Bad request: {message}")]
    BadRequest { code: String, message: String },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Conflict ({code}): {message}")]
    Conflict { code: String, message: String },

    #[error("Gone: {message}")]
    Gone { message: String },

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl ClientError {
    pub fn network(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}
