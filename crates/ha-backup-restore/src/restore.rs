//! Restore orchestration
//!
//! Runs once at startup, before anything else touches the configuration
//! directory: instruction, version check, payload check, cleanup, extraction,
//! result.

use crate::archive::{
    extract_payload, read_descriptor, verify_payload, ExtractionReport, RestoreSelection,
};
use crate::error::{BackupResult, RestoreError};
use crate::instruction::{restore_backup_file_content, RestoreInstruction};
use crate::reconcile::reconcile_config_dir;
use crate::result::{write_result, RestoreResult};
use crate::version::check_backup_version;
use crate::HA_VERSION;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// What a restore run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// No instruction file was present
    NothingPending,
    /// The instruction file was unusable and has been discarded
    InvalidInstruction,
    /// The backup was restored
    Restored(ExtractionReport),
}

/// Restores a pending backup into a configuration directory
#[derive(Debug, Clone)]
pub struct Restorer {
    config_dir: PathBuf,
    running_version: String,
}

impl Restorer {
    /// Create a restorer for the given config directory
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            running_version: HA_VERSION.to_string(),
        }
    }

    /// Compare backups against another running version
    pub fn with_running_version(mut self, version: impl Into<String>) -> Self {
        self.running_version = version.into();
        self
    }

    /// Get the config directory
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Restore the pending backup, if any
    ///
    /// Failures after the instruction was read are recorded in the result
    /// file and returned.
    pub fn run(&self) -> BackupResult<RestoreOutcome> {
        let instruction = match restore_backup_file_content(&self.config_dir) {
            Ok(Some(instruction)) => instruction,
            Ok(None) => return Ok(RestoreOutcome::NothingPending),
            // Already recorded while reading
            Err(_) => return Ok(RestoreOutcome::InvalidInstruction),
        };

        let backup_file = self.backup_file_path(&instruction);
        info!("Restoring {}", backup_file.display());

        let report = match self.apply(&instruction, &backup_file) {
            Ok(report) => report,
            Err(err) => {
                self.record(&RestoreResult::failure(&err));
                return Err(err);
            }
        };

        if instruction.remove_after_restore {
            match fs::remove_file(&backup_file) {
                Ok(()) => info!("Removed backup file {}", backup_file.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    let err = RestoreError::io(&backup_file, e);
                    self.record(&RestoreResult::failure(&err));
                    return Err(err);
                }
            }
        }

        write_result(&self.config_dir, &RestoreResult::success())
            .map_err(|e| RestoreError::io(&self.config_dir, e))?;
        info!("Restore complete, restarting");
        Ok(RestoreOutcome::Restored(report))
    }

    fn apply(
        &self,
        instruction: &RestoreInstruction,
        backup_file: &Path,
    ) -> BackupResult<ExtractionReport> {
        let descriptor = read_descriptor(backup_file)?;
        check_backup_version(&descriptor.homeassistant.version, &self.running_version)?;

        let password = instruction.password.as_deref();
        let selection = RestoreSelection::for_instruction(instruction);
        verify_payload(backup_file, &descriptor, password, &selection)?;

        reconcile_config_dir(&self.config_dir, instruction)?;

        extract_payload(&self.config_dir, backup_file, &descriptor, password, &selection)
    }

    /// Relative archive paths are taken from the config directory
    fn backup_file_path(&self, instruction: &RestoreInstruction) -> PathBuf {
        if instruction.backup_file_path.is_absolute() {
            instruction.backup_file_path.clone()
        } else {
            self.config_dir.join(&instruction.backup_file_path)
        }
    }

    fn record(&self, result: &RestoreResult) {
        if let Err(e) = write_result(&self.config_dir, result) {
            error!("Failed to write restore result: {}", e);
        }
    }
}

/// Restore a pending backup into `config_dir`
///
/// Returns `true` when nothing was pending or the restore succeeded, `false`
/// when the instruction file was unusable. Restore failures are returned as
/// errors after being recorded.
pub fn restore_backup(config_dir: impl AsRef<Path>) -> BackupResult<bool> {
    let outcome = Restorer::new(config_dir.as_ref()).run()?;
    Ok(outcome != RestoreOutcome::InvalidInstruction)
}
