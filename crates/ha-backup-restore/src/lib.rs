//! Backup restore for Home Assistant
//!
//! Restoring a backup is requested by writing `.HA_RESTORE` into the
//! configuration directory and restarting. At the next start, before the
//! event loop or any integration runs, [`restore_backup`]:
//!
//! 1. reads and deletes the instruction file
//! 2. refuses backups made by a newer Home Assistant or with an unreadable
//!    payload
//! 3. clears what the restore replaces from the configuration directory
//! 4. streams the payload out of the backup archive, decrypting it when a
//!    password was given and skipping members that would land outside the
//!    configuration directory
//! 5. writes `.HA_RESTORE_RESULT` for the supervisor
//!
//! # Example
//!
//! ```ignore
//! use ha_backup_restore::{restore_backup, Restorer, RestoreOutcome};
//!
//! // Simple form
//! let ok = restore_backup("/config")?;
//!
//! // Or use the restorer directly for more control
//! match Restorer::new("/config").run()? {
//!     RestoreOutcome::Restored(_) => std::process::exit(ha_backup_restore::RESTART_EXIT_CODE.into()),
//!     _ => {}
//! }
//! ```

mod archive;
mod error;
mod instruction;
mod reconcile;
mod restore;
mod result;
mod securetar;
mod version;

pub use archive::{
    extract_payload, is_safe_member_path, read_descriptor, verify_payload, BackupDescriptor,
    ExtractionReport, HomeAssistantInfo, RestoreSelection, DESCRIPTOR_MEMBER,
};
pub use error::{BackupResult, ErrorType, InstructionError, RestoreError};
pub use instruction::{instruction_file_path, restore_backup_file_content, RestoreInstruction};
pub use reconcile::{clear_configuration_directory, reconcile_config_dir, remove_database_files};
pub use restore::{restore_backup, RestoreOutcome, Restorer};
pub use result::{result_file_path, write_result, RestoreResult};
pub use securetar::{
    password_to_key, SecureTarKey, SecureTarReader, SecureTarWriter, SECURETAR_MAGIC,
};
pub use version::{check_backup_version, HaVersion};

/// Version of this Home Assistant build
pub const HA_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Instruction file requesting a restore
pub const RESTORE_BACKUP_FILE: &str = ".HA_RESTORE";

/// Result file read by the supervisor after a restore
pub const RESTORE_BACKUP_RESULT_FILE: &str = ".HA_RESTORE_RESULT";

/// Directories that survive a full restore
pub const KEEP_BACKUPS: [&str; 2] = ["backups", "tmp_backups"];

/// Database files, restored only on request
pub const KEEP_DATABASE: [&str; 2] = ["home-assistant_v2.db", "home-assistant_v2.db-wal"];

/// Exit code asking the supervisor to start Home Assistant again
pub const RESTART_EXIT_CODE: u8 = 100;
