//! Backup archive reading and payload extraction
//!
//! A backup is an uncompressed tar holding:
//! - `backup.json` - descriptor with the Home Assistant version that made it
//! - `homeassistant.tar.gz` - the configuration directory under `data/`,
//!   gzip compressed and optionally SecureTar encrypted
//!
//! The payload is streamed straight from the outer archive into the
//! configuration directory: outer entry, decryptor, gzip decoder, inner tar,
//! member filter, writer. Nothing is staged in a temporary directory.

use crate::error::{BackupResult, RestoreError};
use crate::instruction::RestoreInstruction;
use crate::securetar::{password_to_key, SecureTarReader};
use crate::{KEEP_BACKUPS, KEEP_DATABASE};
use flate2::read::GzDecoder;
use serde::Deserialize;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tracing::{debug, warn};

/// Descriptor member of the outer archive
pub const DESCRIPTOR_MEMBER: &str = "backup.json";

/// Prefix of configuration files inside the payload
const DATA_PREFIX: &str = "data";

/// Contents of `backup.json` needed to restore
#[derive(Debug, Clone, Deserialize)]
pub struct BackupDescriptor {
    pub homeassistant: HomeAssistantInfo,
    /// Whether the payload is gzip compressed
    #[serde(default = "default_compressed")]
    pub compressed: bool,
    /// Whether the payload is encrypted
    #[serde(default)]
    pub protected: bool,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// The `homeassistant` section of `backup.json`
#[derive(Debug, Clone, Deserialize)]
pub struct HomeAssistantInfo {
    /// Version that created the backup, the minimum needed to restore it
    pub version: String,
}

fn default_compressed() -> bool {
    true
}

impl BackupDescriptor {
    /// Name of the payload member in the outer archive
    pub fn payload_member(&self) -> &'static str {
        if self.compressed {
            "homeassistant.tar.gz"
        } else {
            "homeassistant.tar"
        }
    }
}

/// Which payload members are written to the configuration directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreSelection {
    /// Everything except the listed top-level names
    Everything { excluded: Vec<&'static str> },
    /// Only the database files
    DatabaseOnly,
    /// Nothing at all
    Nothing,
}

impl RestoreSelection {
    /// Selection requested by a restore instruction
    pub fn for_instruction(instruction: &RestoreInstruction) -> Self {
        match (instruction.restore_homeassistant, instruction.restore_database) {
            (true, restore_database) => {
                let mut excluded = KEEP_BACKUPS.to_vec();
                if !restore_database {
                    excluded.extend_from_slice(&KEEP_DATABASE);
                }
                Self::Everything { excluded }
            }
            (false, true) => Self::DatabaseOnly,
            (false, false) => Self::Nothing,
        }
    }

    /// Whether a payload path, relative to `data/`, is restored
    pub fn includes(&self, relative: &Path) -> bool {
        let mut components = relative.components();
        let Some(Component::Normal(top)) = components.next() else {
            return false;
        };

        match self {
            Self::Everything { excluded } => !excluded.iter().any(|name| top == OsStr::new(name)),
            Self::DatabaseOnly => {
                components.next().is_none()
                    && KEEP_DATABASE.iter().any(|name| top == OsStr::new(name))
            }
            Self::Nothing => false,
        }
    }
}

/// What the extractor did with the payload members
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    /// Paths written, relative to the configuration directory
    pub extracted: Vec<PathBuf>,
    /// Member names refused because they point outside the configuration directory
    pub rejected: Vec<PathBuf>,
}

/// Whether an archive member name stays inside the extraction root
///
/// Absolute names and names with `..` segments are refused.
pub fn is_safe_member_path(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Member name without `./` segments
fn normalized(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

fn open_backup(backup_file: &Path) -> BackupResult<Archive<BufReader<File>>> {
    let file = File::open(backup_file).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => RestoreError::BackupNotFound {
            path: backup_file.to_path_buf(),
        },
        _ => RestoreError::io(backup_file, e),
    })?;
    Ok(Archive::new(BufReader::new(file)))
}

/// Read `backup.json` from a backup file
pub fn read_descriptor(backup_file: &Path) -> BackupResult<BackupDescriptor> {
    let read_err = |e| RestoreError::archive(backup_file, e);
    let mut archive = open_backup(backup_file)?;

    for entry in archive.entries().map_err(read_err)? {
        let mut entry = entry.map_err(read_err)?;
        if normalized(&entry.path().map_err(read_err)?) != Path::new(DESCRIPTOR_MEMBER) {
            continue;
        }

        let mut content = String::new();
        entry.read_to_string(&mut content).map_err(read_err)?;
        let descriptor: BackupDescriptor =
            serde_json::from_str(&content).map_err(|source| RestoreError::Descriptor {
                path: backup_file.to_path_buf(),
                source,
            })?;

        debug!(
            "Backup {:?} ({:?}) made by Home Assistant {}",
            descriptor.name, descriptor.slug, descriptor.homeassistant.version
        );
        return Ok(descriptor);
    }

    Err(RestoreError::MissingMember {
        path: backup_file.to_path_buf(),
        member: DESCRIPTOR_MEMBER.to_string(),
    })
}

/// Open the payload member of the outer archive and layer decryption and
/// decompression over it
fn open_payload<'a>(
    archive: &'a mut Archive<BufReader<File>>,
    backup_file: &Path,
    descriptor: &BackupDescriptor,
    password: Option<&str>,
) -> BackupResult<Box<dyn Read + 'a>> {
    let read_err = |e| RestoreError::archive(backup_file, e);
    let member = descriptor.payload_member();

    for entry in archive.entries().map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        if normalized(&entry.path().map_err(read_err)?) != Path::new(member) {
            continue;
        }

        let mut payload: Box<dyn Read + 'a> = Box::new(entry);
        if let Some(password) = password {
            let key = password_to_key(password);
            payload = Box::new(SecureTarReader::new(payload, &key).map_err(read_err)?);
        }
        if descriptor.compressed {
            payload = Box::new(GzDecoder::new(payload));
        }
        return Ok(payload);
    }

    Err(RestoreError::MissingMember {
        path: backup_file.to_path_buf(),
        member: member.to_string(),
    })
}

/// Check that the payload can be read before anything is removed
///
/// Opens the payload member and reads the first inner tar header through the
/// decryptor and gzip decoder. A missing member, a wrong or missing password
/// and a corrupt stream all fail here.
pub fn verify_payload(
    backup_file: &Path,
    descriptor: &BackupDescriptor,
    password: Option<&str>,
    selection: &RestoreSelection,
) -> BackupResult<()> {
    if *selection == RestoreSelection::Nothing {
        return Ok(());
    }

    if descriptor.protected && password.is_none() {
        warn!("Backup is marked as protected but no password was given");
    }

    let read_err = |e| RestoreError::archive(backup_file, e);
    let mut archive = open_backup(backup_file)?;
    let mut payload = Archive::new(open_payload(&mut archive, backup_file, descriptor, password)?);

    if let Some(first) = payload.entries().map_err(read_err)?.next() {
        let first = first.map_err(read_err)?;
        first.path().map_err(read_err)?;
    }
    debug!("Payload {} is readable", descriptor.payload_member());
    Ok(())
}

/// Stream the selected payload members into the configuration directory
///
/// Call [`verify_payload`] before clearing the directory, extraction fails
/// halfway on an unreadable payload.
pub fn extract_payload(
    config_dir: &Path,
    backup_file: &Path,
    descriptor: &BackupDescriptor,
    password: Option<&str>,
    selection: &RestoreSelection,
) -> BackupResult<ExtractionReport> {
    if *selection == RestoreSelection::Nothing {
        debug!("Nothing selected for restore, skipping extraction");
        return Ok(ExtractionReport::default());
    }

    let mut archive = open_backup(backup_file)?;
    let payload = open_payload(&mut archive, backup_file, descriptor, password)?;
    unpack_payload(Archive::new(payload), config_dir, backup_file, selection)
}

fn unpack_payload<R: Read>(
    mut payload: Archive<R>,
    config_dir: &Path,
    backup_file: &Path,
    selection: &RestoreSelection,
) -> BackupResult<ExtractionReport> {
    let read_err = |e| RestoreError::archive(backup_file, e);
    let root = config_dir
        .canonicalize()
        .map_err(|e| RestoreError::io(config_dir, e))?;
    let mut report = ExtractionReport::default();

    for entry in payload.entries().map_err(read_err)? {
        let mut entry = entry.map_err(read_err)?;
        let name = entry.path().map_err(read_err)?.into_owned();

        if !is_safe_member_path(&name) {
            warn!("Found issue with file {:?}, skipping", name);
            report.rejected.push(name);
            continue;
        }

        let Ok(relative) = normalized(&name).strip_prefix(DATA_PREFIX).map(Path::to_path_buf)
        else {
            continue;
        };
        if !selection.includes(&relative) {
            continue;
        }

        if entry.header().entry_type().is_hard_link() {
            warn!("Skipping hard link {:?}", name);
            continue;
        }

        let target = root.join(&relative);
        if !resolves_inside(&root, &target).map_err(|e| RestoreError::io(&target, e))? {
            warn!("Found issue with file {:?}, target leaves {:?}", name, root);
            report.rejected.push(name);
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| RestoreError::io(parent, e))?;
        }
        entry
            .unpack(&target)
            .map_err(|e| RestoreError::io(&target, e))?;

        debug!("Restored {:?}", relative);
        report.extracted.push(relative);
    }

    Ok(report)
}

/// Whether `target` stays under `root` once existing symlinks are followed
///
/// Only the deepest existing ancestor can be a symlink; directories created
/// below it by the extractor are real directories.
fn resolves_inside(root: &Path, target: &Path) -> io::Result<bool> {
    let mut existing = target.parent();
    while let Some(dir) = existing {
        if dir.exists() {
            return Ok(dir.canonicalize()?.starts_with(root));
        }
        existing = dir.parent();
    }
    Ok(false)
}
