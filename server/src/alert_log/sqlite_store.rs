//! SQLite alert store

use super::AlertStore;
use crate::error::EngineError;
use chrono::{DateTime, SecondsFormat, Utc};
use protocol::AlertLogEntry;
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

pub struct SqliteAlertStore {
    conn: Connection,
    path: PathBuf,
}

/// Row as stored, before id/timestamp/report parsing
struct RawRow {
    id: String,
    logged_at: String,
    data_timestamp: String,
    title: String,
    description: String,
    variables: String,
}

impl SqliteAlertStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let path = path.as_ref().to_path_buf();
        let target = path.display().to_string();

        let conn = Connection::open(&path).map_err(|e| EngineError::read(&target, e))?;

        // WAL keeps readers off the writer's lock
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| EngineError::read(&target, e))?;
        conn.pragma_update(None, "busy_timeout", "5000")
            .map_err(|e| EngineError::read(&target, e))?;

        let store = Self { conn, path };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> Result<(), EngineError> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS alert_log (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    logged_at TEXT NOT NULL,
                    data_timestamp TEXT NOT NULL,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL,
                    variables TEXT NOT NULL
                )",
                [],
            )
            .map_err(|e| EngineError::write(self.target(), e))?;

        info!("Alert log schema ready at {:?}", self.path);
        Ok(())
    }

    fn target(&self) -> String {
        self.path.display().to_string()
    }
}

impl AlertStore for SqliteAlertStore {
    fn read_all(&self) -> Result<Vec<AlertLogEntry>, EngineError> {
        let read_err = |e: rusqlite::Error| EngineError::read(self.target(), e);

        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, logged_at, data_timestamp, title, description, variables
                 FROM alert_log
                 ORDER BY seq ASC",
            )
            .map_err(read_err)?;

        let rows = stmt
            .query_map([], |row| {
                Ok(RawRow {
                    id: row.get(0)?,
                    logged_at: row.get(1)?,
                    data_timestamp: row.get(2)?,
                    title: row.get(3)?,
                    description: row.get(4)?,
                    variables: row.get(5)?,
                })
            })
            .map_err(read_err)?;

        let mut entries = Vec::new();
        for row in rows {
            let row = row.map_err(read_err)?;
            let entry = parse_row(row).map_err(|reason| EngineError::read(self.target(), reason))?;
            entries.push(entry);
        }
        Ok(entries)
    }

    fn replace_all(&mut self, entries: &[AlertLogEntry]) -> Result<(), EngineError> {
        let target = self.target();
        let write_err = |e: rusqlite::Error| EngineError::write(&target, e);

        let tx = self.conn.transaction().map_err(write_err)?;
        tx.execute("DELETE FROM alert_log", []).map_err(write_err)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO alert_log (id, logged_at, data_timestamp, title, description, variables)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(write_err)?;

            for entry in entries {
                let variables = serde_json::to_string(&entry.variables)
                    .map_err(|e| EngineError::write(&target, e))?;
                stmt.execute(params![
                    entry.id.to_string(),
                    entry.logged_at.to_rfc3339_opts(SecondsFormat::Millis, true),
                    &entry.data_timestamp,
                    &entry.title,
                    &entry.description,
                    variables,
                ])
                .map_err(write_err)?;
            }
        }
        // Dropping an uncommitted transaction rolls back
        tx.commit().map_err(write_err)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}

fn parse_row(row: RawRow) -> Result<AlertLogEntry, String> {
    let id = Uuid::parse_str(&row.id).map_err(|e| format!("invalid id {}: {}", row.id, e))?;
    let logged_at = DateTime::parse_from_rfc3339(&row.logged_at)
        .map_err(|e| format!("invalid logged_at for {}: {}", id, e))?
        .with_timezone(&Utc);
    let variables: Vec<String> = serde_json::from_str(&row.variables)
        .map_err(|e| format!("invalid variables for {}: {}", id, e))?;

    Ok(AlertLogEntry {
        id,
        logged_at,
        data_timestamp: row.data_timestamp,
        title: row.title,
        description: row.description,
        variables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(title: &str) -> AlertLogEntry {
        AlertLogEntry {
            id: Uuid::new_v4(),
            logged_at: DateTime::parse_from_rfc3339("2024-05-01T12:00:00.500Z")
                .unwrap()
                .with_timezone(&Utc),
            data_timestamp: "2024-05-01 11:59:00".to_string(),
            title: title.to_string(),
            description: "desc".to_string(),
            variables: vec!["temp: 95 (expected 0 - 80)".to_string()],
        }
    }

    #[test]
    fn test_replace_and_read_in_order() {
        let dir = TempDir::new().unwrap();
        let mut store = SqliteAlertStore::open(dir.path().join("alerts.db")).unwrap();
        assert!(store.read_all().unwrap().is_empty());

        let first = vec![entry("a"), entry("b"), entry("c")];
        store.replace_all(&first).unwrap();
        assert_eq!(store.read_all().unwrap(), first);

        let second = vec![first[2].clone(), entry("d")];
        store.replace_all(&second).unwrap();
        assert_eq!(store.read_all().unwrap(), second);
    }

    #[test]
    fn test_failed_replace_rolls_back() {
        let dir = TempDir::new().unwrap();
        let mut store = SqliteAlertStore::open(dir.path().join("alerts.db")).unwrap();
        let kept = vec![entry("kept")];
        store.replace_all(&kept).unwrap();

        // Duplicate ids violate the UNIQUE constraint mid-transaction
        let dup = entry("dup");
        assert!(store.replace_all(&[dup.clone(), dup]).is_err());

        assert_eq!(store.read_all().unwrap(), kept);
    }

    #[test]
    fn test_reopen_sees_persisted_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alerts.db");
        let rows = vec![entry("persisted")];
        {
            let mut store = SqliteAlertStore::open(&path).unwrap();
            store.replace_all(&rows).unwrap();
        }
        let store = SqliteAlertStore::open(&path).unwrap();
        assert_eq!(store.read_all().unwrap(), rows);
    }
}
