//! Solarwatch Protocol Library
//!
//! Shared definitions for the Solarwatch server and CLI: telemetry records,
//! alert rules and log entries, channel messages and the admin datagram
//! protocol.

pub mod admin;
pub mod constants;
pub mod error;
pub mod event;
pub mod models;
pub mod records;

pub use admin::{AdminRequest, AdminResponse};
pub use constants::*;
pub use error::ProtocolError;
pub use event::{AlertEvent, FeedMessage};
pub use models::{
    AlertLogEntry, Rule, RulePatch, RulePatchSet, Threshold, VariableViolation, ViolationReport,
};
pub use records::{Numeric, Snapshot};
