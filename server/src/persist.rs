//! Crash-safe file rewrites

use crate::error::EngineError;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

/// Sibling temp path: `alerts.csv` -> `alerts.csv.tmp`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replace `path` with `contents` via write-to-temp, fsync, rename.
///
/// Readers see either the old file or the new one, never a partial write.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), EngineError> {
    let target = path.display().to_string();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| EngineError::write(&target, e))?;
        }
    }

    let tmp = temp_path(path);
    if let Err(e) = write_then_rename(&tmp, path, contents) {
        let _ = fs::remove_file(&tmp);
        return Err(EngineError::write(target, e));
    }
    Ok(())
}

fn write_then_rename(tmp: &Path, path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(tmp)?;
    file.write_all(contents)?;
    file.sync_all()?;
    fs::rename(tmp, path)
}

/// Run a storage write, retrying once before giving up
pub fn retry_once<T>(
    what: &str,
    mut op: impl FnMut() -> Result<T, EngineError>,
) -> Result<T, EngineError> {
    match op() {
        Ok(value) => Ok(value),
        Err(first) => {
            warn!(target_store = what, error = %first, "write failed, retrying once");
            op().map_err(|second| {
                error!(target_store = what, error = %second, "write failed after retry");
                second
            })
        }
    }
}
