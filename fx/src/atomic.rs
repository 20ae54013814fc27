//! Whole-file JSON persistence with atomic replacement.
//!
//! Writers serialise to a temporary file next to the target, flush it to disk,
//! and rename it over the target. Readers therefore see either the previous
//! complete file or the new complete file.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use ratekeeper_common::{RateError, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Atomically replace `path` with the pretty-printed JSON of `value`.
///
/// On failure the temporary file is removed and `path` is left untouched.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| RateError::persistence(dir, e))?;

    let prefix = format!(
        ".{}.",
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    );
    let mut tmp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| RateError::persistence(dir, e))?;

    let written: io::Result<()> = tmp
        .write_all(&bytes)
        .and_then(|_| tmp.as_file().sync_all());
    if let Err(e) = written {
        // Dropping `tmp` deletes it.
        return Err(RateError::persistence(tmp.path(), e));
    }

    tmp.persist(path)
        .map_err(|e| RateError::persistence(path, e.error))?;

    debug!(path = %path.display(), bytes = bytes.len(), "Wrote file");
    Ok(())
}

/// Read a JSON document.
///
/// A missing file yields `None`. So does an unreadable or corrupt one, which
/// is logged and otherwise treated as absent.
pub fn read_json(path: &Path) -> Option<Value> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read file, treating as empty");
            return None;
        }
    };

    match serde_json::from_slice(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt file, treating as empty");
            None
        }
    }
}
