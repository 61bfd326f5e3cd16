//! Restore instruction file
//!
//! The backup integration requests a restore by writing `.HA_RESTORE` into
//! the configuration directory and restarting. The file is consumed at the
//! next start, whatever its content.
//!
//! JSON format:
//! ```json
//! {
//!   "path": "/config/backups/abc123.tar",
//!   "password": null,
//!   "remove_after_restore": false,
//!   "restore_database": true,
//!   "restore_homeassistant": true
//! }
//! ```

use crate::error::InstructionError;
use crate::result::{write_result, RestoreResult};
use crate::RESTORE_BACKUP_FILE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Keys the instruction file must contain, in the order they are checked
const REQUIRED_KEYS: [&str; 5] = [
    "path",
    "password",
    "remove_after_restore",
    "restore_database",
    "restore_homeassistant",
];

/// A pending restore request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreInstruction {
    /// Archive to restore from
    #[serde(rename = "path")]
    pub backup_file_path: PathBuf,
    /// Password the archive payload is encrypted with
    pub password: Option<String>,
    /// Delete the archive once the restore succeeded
    pub remove_after_restore: bool,
    /// Restore `home-assistant_v2.db` and its WAL
    pub restore_database: bool,
    /// Restore the rest of the configuration directory
    pub restore_homeassistant: bool,
}

impl RestoreInstruction {
    /// Write this instruction so it is picked up on the next start
    pub fn save(&self, config_dir: impl AsRef<Path>) -> io::Result<()> {
        let path = instruction_file_path(config_dir.as_ref());
        fs::write(&path, serde_json::to_string(self)?)?;
        debug!("Wrote restore instruction: {:?}", path);
        Ok(())
    }
}

/// Path of the instruction file inside a configuration directory
pub fn instruction_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(RESTORE_BACKUP_FILE)
}

/// Read and consume the pending restore instruction
///
/// Returns `Ok(None)` when no restore is pending. The instruction file is
/// removed whenever it existed, including when it could not be parsed, so a
/// broken instruction is never retried. Parse failures are recorded in the
/// result file before they are returned.
pub fn restore_backup_file_content(
    config_dir: impl AsRef<Path>,
) -> Result<Option<RestoreInstruction>, InstructionError> {
    let config_dir = config_dir.as_ref();
    let path = instruction_file_path(config_dir);

    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            let err = InstructionError::Read {
                path: path.clone(),
                source: e,
            };
            discard(config_dir, &path, &err);
            return Err(err);
        }
    };

    match parse_instruction(&content) {
        Ok(instruction) => {
            remove_instruction_file(&path);
            Ok(Some(instruction))
        }
        Err(err) => {
            discard(config_dir, &path, &err);
            Err(err)
        }
    }
}

fn parse_instruction(content: &str) -> Result<RestoreInstruction, InstructionError> {
    let value: serde_json::Value = serde_json::from_str(content).map_err(InstructionError::Json)?;

    let object = value
        .as_object()
        .ok_or_else(|| InstructionError::InvalidValue {
            reason: "instruction must be a JSON object".to_string(),
        })?;

    // Optional fields would default silently in serde, so presence is checked first
    if let Some(key) = REQUIRED_KEYS
        .iter()
        .copied()
        .find(|key| !object.contains_key(*key))
    {
        return Err(InstructionError::MissingKey { key });
    }

    serde_json::from_value(value).map_err(|e| InstructionError::InvalidValue {
        reason: e.to_string(),
    })
}

fn discard(config_dir: &Path, path: &Path, err: &InstructionError) {
    warn!("Discarding invalid restore instruction {:?}: {}", path, err);
    remove_instruction_file(path);
    if let Err(e) = write_result(config_dir, &RestoreResult::failure(err)) {
        error!("Failed to write restore result: {}", e);
    }
}

fn remove_instruction_file(path: &Path) {
    // A directory in place of the file would otherwise trigger on every start
    let removed = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        _ => fs::remove_file(path),
    };
    match removed {
        Ok(()) => debug!("Removed restore instruction: {:?}", path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => error!("Failed to remove restore instruction {:?}: {}", path, e),
    }
}
