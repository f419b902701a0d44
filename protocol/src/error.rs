//! Protocol error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Record is not a JSON object")]
    NotAnObject,

    #[error("Record has no `ds` timestamp field")]
    MissingTimestamp,

    #[error("Invalid `ds` timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Datagram too large: maximum {max}, got {actual}")]
    DatagramTooLarge { max: usize, actual: usize },
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Json(err.to_string())
    }
}
