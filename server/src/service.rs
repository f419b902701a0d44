//! Alerting service: owns the rule set, the stream join, the alert log and
//! the broadcaster, and runs the per-record pipeline
//!
//! record -> join -> evaluate -> append -> publish

use crate::alert_log::AlertLog;
use crate::broadcast::Broadcaster;
use crate::engine::{self, Observation, StreamJoiner};
use crate::error::EngineError;
use crate::rules::RuleStore;
use protocol::{AlertEvent, AlertLogEntry, FeedMessage, Rule, RulePatchSet, Snapshot, Source};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Outcome of ingesting one record
#[derive(Debug, Default, PartialEq)]
pub struct IngestOutcome {
    /// False when the record was rejected as stale
    pub accepted: bool,
    /// Number of violated rules
    pub violations: usize,
    /// Entries written to the alert log
    pub logged: Vec<AlertLogEntry>,
}

pub struct AlertService {
    rules: RuleStore,
    joiner: Mutex<StreamJoiner>,
    log: AlertLog,
    broadcaster: Arc<Broadcaster>,
}

impl AlertService {
    pub fn new(
        rules: RuleStore,
        joiner: StreamJoiner,
        log: AlertLog,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            rules,
            joiner: Mutex::new(joiner),
            log,
            broadcaster,
        }
    }

    pub fn broadcaster(&self) -> Arc<Broadcaster> {
        self.broadcaster.clone()
    }

    /// Feed one record through the pipeline
    pub async fn ingest(&self, source: Source, snapshot: Snapshot) -> IngestOutcome {
        let raw = FeedMessage::reading(source, &snapshot);

        let combined = {
            let mut joiner = match self.joiner.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if joiner.observe(source, snapshot) == Observation::Stale {
                return IngestOutcome::default();
            }
            joiner.try_combine().ok_or_else(|| {
                Source::ALL
                    .into_iter()
                    .find(|s| joiner.latest(*s).is_none())
                    .unwrap_or(source)
            })
        };

        let reached = self.broadcaster.publish(source.channel(), raw);
        debug!(channel = %source.channel(), subscribers = reached, "Reading published");

        let combined = match combined {
            Ok(combined) => combined,
            Err(missing) => {
                debug!(source = %source, waiting_for = %missing, "No evaluation until both streams are seen");
                return IngestOutcome {
                    accepted: true,
                    ..Default::default()
                };
            }
        };

        let rules = self.rules.snapshot().await;
        let reports = engine::evaluate(&combined, &rules);
        if reports.is_empty() {
            return IngestOutcome {
                accepted: true,
                ..Default::default()
            };
        }

        for report in &reports {
            warn!(
                rule = %report.rule_title,
                ds = %combined.ds,
                violations = ?report.report_lines(),
                "Threshold alert"
            );
        }

        let logged = match self.log.append(&reports, &combined.ds).await {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, alerts = reports.len(), "Failed to log alerts");
                Vec::new()
            }
        };

        // Live listeners are told even if the log write failed
        for report in &reports {
            let event = AlertEvent::from_report(report, &combined.ds);
            self.broadcaster.publish(protocol::Channel::Alerts, FeedMessage::Alert(event));
        }

        IngestOutcome {
            accepted: true,
            violations: reports.len(),
            logged,
        }
    }

    pub async fn list_alerts(&self) -> Result<Vec<AlertLogEntry>, EngineError> {
        self.log.list().await
    }

    pub async fn delete_alert(&self, id: Uuid) -> Result<(), EngineError> {
        self.log.delete(id).await
    }

    pub async fn delete_all_alerts(&self) -> Result<usize, EngineError> {
        self.log.delete_all().await
    }

    pub async fn rules(&self) -> Arc<Vec<Rule>> {
        self.rules.snapshot().await
    }

    pub async fn update_rules(&self, patch: &RulePatchSet) -> Result<Arc<Vec<Rule>>, EngineError> {
        self.rules.update(patch).await
    }

    /// Let any in-flight log rewrite finish
    pub async fn shutdown(&self) {
        self.log.close().await;
    }
}
