//! Admin datagram protocol
//!
//! Every request and response is a single JSON document in one UDP datagram.
//! Push messages for subscribed channels travel as [`AdminResponse::Message`].

use crate::constants::{Channel, MAX_DATAGRAM_SIZE};
use crate::error::ProtocolError;
use crate::event::FeedMessage;
use crate::models::{AlertLogEntry, Rule, RulePatchSet};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AdminRequest {
    ListAlerts,
    DeleteAlert { id: Uuid },
    DeleteAllAlerts,
    GetRules,
    UpdateRules { patch: RulePatchSet },
    Subscribe { channel: Channel },
    Unsubscribe { channel: Channel },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminResponse {
    Alerts { entries: Vec<AlertLogEntry> },
    Deleted { count: usize },
    NotFound { id: Uuid },
    Rules { rules: Vec<Rule> },
    Subscribed { channel: Channel, timeout_secs: u64 },
    Unsubscribed { channel: Channel, existed: bool },
    Message { channel: Channel, message: FeedMessage },
    Error { message: String },
}

impl AdminRequest {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl AdminResponse {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn error(message: impl Into<String>) -> Self {
        AdminResponse::Error {
            message: message.into(),
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    let bytes = serde_json::to_vec(value)?;
    if bytes.len() > MAX_DATAGRAM_SIZE {
        return Err(ProtocolError::DatagramTooLarge {
            max: MAX_DATAGRAM_SIZE,
            actual: bytes.len(),
        });
    }
    Ok(bytes)
}
