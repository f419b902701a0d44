//! Bounded alert history
//!
//! Every mutation is a read-modify-write of the whole store, serialised by a
//! single async mutex and run on the blocking pool. Stores must make
//! `replace_all` atomic: a failed write leaves the previous contents visible.

mod csv_store;
mod sqlite_store;

pub use csv_store::CsvAlertStore;
pub use sqlite_store::SqliteAlertStore;

use crate::config::{AlertBackend, AlertsConfig};
use crate::error::EngineError;
use crate::persist;
use chrono::{SubsecRound, Utc};
use protocol::{AlertLogEntry, ViolationReport};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Durable backing for the alert log, oldest entry first
pub trait AlertStore: Send {
    fn read_all(&self) -> Result<Vec<AlertLogEntry>, EngineError>;

    /// Atomically replace every stored row with `entries`
    fn replace_all(&mut self, entries: &[AlertLogEntry]) -> Result<(), EngineError>;

    fn describe(&self) -> String;
}

pub struct AlertLog {
    store: Arc<Mutex<Box<dyn AlertStore>>>,
    cap: usize,
}

impl AlertLog {
    pub fn new(store: Box<dyn AlertStore>, cap: usize) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            cap: cap.max(1),
        }
    }

    pub fn open(config: &AlertsConfig) -> Result<Self, EngineError> {
        let store: Box<dyn AlertStore> = match config.backend {
            AlertBackend::Csv => Box::new(CsvAlertStore::new(&config.log_path)),
            AlertBackend::Sqlite => Box::new(SqliteAlertStore::open(&config.log_path)?),
        };
        info!("Alert log: {} (cap {})", store.describe(), config.cap);
        Ok(Self::new(store, config.cap))
    }

    /// Turn `batch` into entries and store them, evicting the oldest entries
    /// so the log never holds more than `cap`.
    ///
    /// Returns the entries actually written.
    pub async fn append(
        &self,
        batch: &[ViolationReport],
        data_timestamp: &str,
    ) -> Result<Vec<AlertLogEntry>, EngineError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        // Millisecond precision matches what the stores persist
        let logged_at = Utc::now().trunc_subsecs(3);
        let incoming: Vec<AlertLogEntry> = batch
            .iter()
            .map(|report| AlertLogEntry::from_report(report, data_timestamp, logged_at))
            .collect();

        let cap = self.cap;
        let written = batch.len().min(cap);

        self.with_store(move |store| {
            let existing = store.read_all()?;
            let existing_len = existing.len();

            let entries = retain_for_append(existing, incoming, cap);
            write(store, &entries)?;

            let evicted = existing_len + written - entries.len();
            if evicted > 0 {
                debug!(evicted, cap, "Evicted oldest alerts");
            }

            Ok(entries[entries.len() - written..].to_vec())
        })
        .await
    }

    /// All entries, oldest first
    pub async fn list(&self) -> Result<Vec<AlertLogEntry>, EngineError> {
        self.with_store(|store| store.read_all()).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), EngineError> {
        self.with_store(move |store| {
            let mut entries = store.read_all()?;

            let position = entries
                .iter()
                .position(|e| e.id == id)
                .ok_or(EngineError::NotFound(id))?;
            entries.remove(position);

            write(store, &entries)
        })
        .await
    }

    /// Empty the log; returns how many entries were removed
    pub async fn delete_all(&self) -> Result<usize, EngineError> {
        self.with_store(|store| {
            let removed = match store.read_all() {
                Ok(entries) => entries.len(),
                Err(e) => {
                    warn!(store = %store.describe(), error = %e, "Unreadable alert log cleared");
                    0
                }
            };
            write(store, &[])?;
            Ok(removed)
        })
        .await
    }

    /// Run `op` against the store on the blocking pool, holding the lock
    /// across the whole read-modify-write
    async fn with_store<T, F>(&self, op: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn AlertStore) -> Result<T, EngineError> + Send + 'static,
    {
        let mut store = self.store.clone().lock_owned().await;
        tokio::task::spawn_blocking(move || op(&mut **store))
            .await
            .map_err(|e| EngineError::write("alert log", e))?
    }

    /// Wait for any in-flight rewrite to finish
    pub async fn close(&self) {
        let store = self.store.lock().await;
        info!("Alert log closed: {}", store.describe());
    }
}

fn write(store: &mut dyn AlertStore, entries: &[AlertLogEntry]) -> Result<(), EngineError> {
    let name = store.describe();
    persist::retry_once(&name, || store.replace_all(entries))
}

/// `[newest cap - incoming existing..., incoming...]`, or only the newest
/// `cap` incoming when the batch alone exceeds the cap
pub fn retain_for_append<T>(existing: Vec<T>, incoming: Vec<T>, cap: usize) -> Vec<T> {
    if incoming.len() >= cap {
        let skip = incoming.len() - cap;
        return incoming.into_iter().skip(skip).collect();
    }

    let keep = cap - incoming.len();
    let skip = existing.len().saturating_sub(keep);
    existing.into_iter().skip(skip).chain(incoming).collect()
}
