//! Restore result file
//!
//! The result file is the only channel back to the supervisor that restarts
//! Home Assistant after a restore. It is written once per attempt and never
//! read by the restore itself.
//!
//! JSON format:
//! ```json
//! {
//!   "success": false,
//!   "error": "Backup file /config/backups/abc.tar does not exist",
//!   "error_type": "ValueError"
//! }
//! ```

use crate::error::ErrorType;
use crate::RESTORE_BACKUP_RESULT_FILE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Outcome of a restore attempt as seen by the supervisor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreResult {
    pub success: bool,
    pub error: Option<String>,
    pub error_type: Option<String>,
}

impl RestoreResult {
    /// A successful attempt
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
            error_type: None,
        }
    }

    /// A failed attempt, described by the error that ended it
    pub fn failure<E: ErrorType + ?Sized>(err: &E) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            error_type: Some(err.error_type().to_string()),
        }
    }

    /// Read the result file left by the last attempt, if any
    pub fn load(config_dir: impl AsRef<Path>) -> io::Result<Option<Self>> {
        let path = result_file_path(config_dir.as_ref());
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }
}

/// Path of the result file inside a configuration directory
pub fn result_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(RESTORE_BACKUP_RESULT_FILE)
}

/// Write the result file, replacing any previous one
///
/// Writes to a temp file first and renames it into place, so the supervisor
/// never sees a partial file.
pub fn write_result(config_dir: impl AsRef<Path>, result: &RestoreResult) -> io::Result<()> {
    let path = result_file_path(config_dir.as_ref());
    let temp_path = path.with_extension("tmp");

    let content = serde_json::to_string(result)?;
    fs::write(&temp_path, content)?;
    fs::rename(&temp_path, &path)?;

    debug!(
        "Wrote restore result: success={} error_type={:?}",
        result.success, result.error_type
    );
    Ok(())
}
