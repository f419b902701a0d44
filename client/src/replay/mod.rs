//! Replay recorded telemetry into a running server

use crate::admin::StreamSender;
use anyhow::{Context, Result};
use std::io::BufRead;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Send every non-empty line of `path` as one record; returns the number sent
pub fn replay_file(sender: &StreamSender, path: &Path, interval: Duration) -> Result<usize> {
    let file = std::fs::File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    replay_lines(sender, std::io::BufReader::new(file), interval)
}

pub fn replay_lines<R: BufRead>(sender: &StreamSender, reader: R, interval: Duration) -> Result<usize> {
    let mut sent = 0;

    for (number, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", number + 1))?;
        let record = line.trim();
        if record.is_empty() {
            continue;
        }

        if sent > 0 && !interval.is_zero() {
            std::thread::sleep(interval);
        }

        match sender.send(record.as_bytes()) {
            Ok(()) => {
                sent += 1;
                debug!("Sent line {}", number + 1);
            }
            Err(e) => warn!("Skipping line {}: {}", number + 1, e),
        }
    }

    Ok(sent)
}
