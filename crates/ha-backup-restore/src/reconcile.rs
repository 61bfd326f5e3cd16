//! Configuration directory cleanup before extraction
//!
//! Restoring the configuration replaces the whole directory, except the
//! backup directories. Restoring only the database replaces just the
//! database files.

use crate::error::{BackupResult, RestoreError};
use crate::instruction::RestoreInstruction;
use crate::{KEEP_BACKUPS, KEEP_DATABASE};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Remove what the restore is about to replace
///
/// Returns the removed top-level entries. Stops at the first failure.
pub fn reconcile_config_dir(
    config_dir: &Path,
    instruction: &RestoreInstruction,
) -> BackupResult<Vec<PathBuf>> {
    if instruction.restore_homeassistant {
        let mut keep: Vec<OsString> = KEEP_BACKUPS.iter().map(OsString::from).collect();
        if let Some(entry) = top_level_entry(config_dir, &instruction.backup_file_path) {
            // The archive being restored must survive the sweep
            keep.push(entry);
        }
        clear_configuration_directory(config_dir, &keep)
    } else if instruction.restore_database {
        remove_database_files(config_dir)
    } else {
        Ok(Vec::new())
    }
}

/// Remove every top-level entry not named in `keep`
pub fn clear_configuration_directory(
    config_dir: &Path,
    keep: &[OsString],
) -> BackupResult<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(config_dir)
        .map_err(|e| RestoreError::io(config_dir, e))?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<_, _>>()
        .map_err(|e| RestoreError::io(config_dir, e))?;
    entries.retain(|path| {
        path.file_name()
            .map(|name| !keep.iter().any(|kept| kept == name))
            .unwrap_or(false)
    });
    entries.sort();

    for path in &entries {
        remove_entry(path)?;
    }
    Ok(entries)
}

/// Remove the database and its write-ahead log, if present
pub fn remove_database_files(config_dir: &Path) -> BackupResult<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for name in KEEP_DATABASE {
        let path = config_dir.join(name);
        if fs::symlink_metadata(&path).is_err() {
            continue;
        }
        fs::remove_file(&path).map_err(|e| RestoreError::io(&path, e))?;
        debug!("Removed {:?}", path);
        removed.push(path);
    }
    Ok(removed)
}

fn remove_entry(path: &Path) -> BackupResult<()> {
    let metadata = fs::symlink_metadata(path).map_err(|e| RestoreError::io(path, e))?;
    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| RestoreError::io(path, e))?;
    debug!("Removed {:?}", path);
    Ok(())
}

/// Name of the top-level entry of `config_dir` containing `path`, if any
fn top_level_entry(config_dir: &Path, path: &Path) -> Option<OsString> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        config_dir.join(path)
    };
    let config_dir = config_dir.canonicalize().ok()?;
    let path = path.canonicalize().ok()?;
    path.strip_prefix(&config_dir)
        .ok()?
        .components()
        .next()
        .map(|c| c.as_os_str().to_os_string())
}
