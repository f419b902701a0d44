//! Engine error types

use protocol::ProtocolError;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Rule store not found: {0:?}")]
    ConfigNotFound(PathBuf),

    #[error("Rule store {path:?} is malformed: {reason}")]
    ConfigParse { path: PathBuf, reason: String },

    #[error("Invalid rule patch: {0}")]
    InvalidPatch(String),

    #[error("Alert {0} not found")]
    NotFound(Uuid),

    #[error("Failed to read {target}: {reason}")]
    StorageRead { target: String, reason: String },

    #[error("Failed to write {target}: {reason}")]
    StorageWrite { target: String, reason: String },

    #[error("Stream decode error: {0}")]
    Decode(#[from] ProtocolError),
}

impl EngineError {
    pub fn read(target: impl Into<String>, reason: impl ToString) -> Self {
        EngineError::StorageRead {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn write(target: impl Into<String>, reason: impl ToString) -> Self {
        EngineError::StorageWrite {
            target: target.into(),
            reason: reason.to_string(),
        }
    }
}
