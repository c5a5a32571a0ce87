use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Request rejected: {status} {message}")]
    Api { status: u16, message: String },

    #[error("Throttled - retry after {retry_after:?}")]
    Throttled { retry_after: Duration },

    #[error("Action denied: {0}")]
    Denied(String),

    #[error("Invalid response payload: {0}")]
    InvalidPayload(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
