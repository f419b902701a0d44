//! Flat CSV alert store
//!
//! Headerless rows: `id, logged_at, data_timestamp, title, description,
//! variable_report...`; rows are as wide as their violation count.

use super::AlertStore;
use crate::error::EngineError;
use crate::persist;
use chrono::{DateTime, SecondsFormat, Utc};
use protocol::AlertLogEntry;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const FIXED_COLUMNS: usize = 5;

pub struct CsvAlertStore {
    path: PathBuf,
}

impl CsvAlertStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn target(&self) -> String {
        self.path.display().to_string()
    }
}

impl AlertStore for CsvAlertStore {
    fn read_all(&self) -> Result<Vec<AlertLogEntry>, EngineError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EngineError::read(self.target(), e)),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes.as_slice());

        let mut entries = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|e| EngineError::read(self.target(), e))?;
            let entry = parse_row(&record)
                .map_err(|reason| EngineError::read(self.target(), format!("row {}: {}", line + 1, reason)))?;
            entries.push(entry);
        }
        Ok(entries)
    }

    fn replace_all(&mut self, entries: &[AlertLogEntry]) -> Result<(), EngineError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(Vec::new());

        for entry in entries {
            writer
                .write_record(to_row(entry))
                .map_err(|e| EngineError::write(self.target(), e))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| EngineError::write(self.target(), e))?;

        persist::write_atomic(&self.path, &bytes)
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }
}

fn to_row(entry: &AlertLogEntry) -> Vec<String> {
    let mut row = Vec::with_capacity(FIXED_COLUMNS + entry.variables.len());
    row.push(entry.id.to_string());
    row.push(entry.logged_at.to_rfc3339_opts(SecondsFormat::Millis, true));
    row.push(entry.data_timestamp.clone());
    row.push(entry.title.clone());
    row.push(entry.description.clone());
    row.extend(entry.variables.iter().cloned());
    row
}

fn parse_row(record: &csv::StringRecord) -> Result<AlertLogEntry, String> {
    if record.len() < FIXED_COLUMNS {
        return Err(format!("expected at least {} columns, got {}", FIXED_COLUMNS, record.len()));
    }

    let id = Uuid::parse_str(&record[0]).map_err(|e| format!("invalid id: {}", e))?;
    let logged_at = DateTime::parse_from_rfc3339(&record[1])
        .map_err(|e| format!("invalid logged_at: {}", e))?
        .with_timezone(&Utc);

    Ok(AlertLogEntry {
        id,
        logged_at,
        data_timestamp: record[2].to_string(),
        title: record[3].to_string(),
        description: record[4].to_string(),
        variables: record.iter().skip(FIXED_COLUMNS).map(str::to_string).collect(),
    })
}
