//! Messages carried on the publish/subscribe channels

use crate::constants::{Channel, Source};
use crate::models::{VariableViolation, ViolationReport};
use crate::records::{Numeric, Snapshot};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Payload of a fired alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// `ds` of the triggering record
    pub timestamp: String,
    pub title: String,
    pub description: String,
    pub out_of_range_variables: IndexMap<String, VariableViolation>,
}

impl AlertEvent {
    pub fn from_report(report: &ViolationReport, timestamp: &str) -> Self {
        Self {
            timestamp: timestamp.to_string(),
            title: report.rule_title.clone(),
            description: report.rule_description.clone(),
            out_of_range_variables: report.variables.clone(),
        }
    }
}

/// Anything published on a channel, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    Reading {
        source: Source,
        ds: String,
        values: IndexMap<String, Numeric>,
    },
    Alert(AlertEvent),
}

impl FeedMessage {
    pub fn reading(source: Source, snapshot: &Snapshot) -> Self {
        FeedMessage::Reading {
            source,
            ds: snapshot.ds.clone(),
            values: snapshot.values.clone(),
        }
    }

    /// Channel this message belongs on
    pub fn channel(&self) -> Channel {
        match self {
            FeedMessage::Reading { source, .. } => source.channel(),
            FeedMessage::Alert(_) => Channel::Alerts,
        }
    }
}
