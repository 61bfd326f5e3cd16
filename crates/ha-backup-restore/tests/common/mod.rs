//! Backup fixtures for restore tests
//!
//! Builds backup files the way the backup integration writes them: an outer
//! tar with `backup.json` and `homeassistant.tar.gz`, the payload rooted at
//! `data/` and optionally encrypted.

#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use ha_backup_restore::{password_to_key, RestoreInstruction, SecureTarWriter};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tar::{Builder, EntryType, Header};

const SALT: [u8; 16] = [3u8; 16];

/// Builder for backup files
pub struct BackupFixture {
    version: String,
    compressed: bool,
    password: Option<String>,
    descriptor: bool,
    payload: bool,
    files: Vec<(String, Vec<u8>)>,
    raw_members: Vec<(Vec<u8>, Vec<u8>)>,
}

impl BackupFixture {
    pub fn new() -> Self {
        Self {
            version: "2026.1.0".to_string(),
            compressed: true,
            password: None,
            descriptor: true,
            payload: true,
            files: Vec::new(),
            raw_members: Vec::new(),
        }
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn uncompressed(mut self) -> Self {
        self.compressed = false;
        self
    }

    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn without_descriptor(mut self) -> Self {
        self.descriptor = false;
        self
    }

    pub fn without_payload(mut self) -> Self {
        self.payload = false;
        self
    }

    /// Add a configuration file, path relative to the config directory
    pub fn file(mut self, path: &str, content: &str) -> Self {
        self.files.push((path.to_string(), content.as_bytes().to_vec()));
        self
    }

    /// Add a payload member with a name the tar builder would refuse
    pub fn raw_member(mut self, name: &str, content: &str) -> Self {
        self.raw_members
            .push((name.as_bytes().to_vec(), content.as_bytes().to_vec()));
        self
    }

    fn payload(&self) -> Vec<u8> {
        let mut builder = Builder::new(Vec::new());

        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Directory);
        header.set_mode(0o755);
        header.set_size(0);
        builder
            .append_data(&mut header, "data", std::io::empty())
            .unwrap();

        for (path, content) in &self.files {
            let mut header = Header::new_gnu();
            header.set_entry_type(EntryType::Regular);
            header.set_mode(0o644);
            header.set_size(content.len() as u64);
            builder
                .append_data(&mut header, format!("data/{path}"), content.as_slice())
                .unwrap();
        }

        for (name, content) in &self.raw_members {
            let mut header = Header::new_old();
            header.as_old_mut().name[..name.len()].copy_from_slice(name);
            header.set_entry_type(EntryType::Regular);
            header.set_mode(0o644);
            header.set_size(content.len() as u64);
            header.set_cksum();
            builder.append(&header, content.as_slice()).unwrap();
        }

        let mut payload = builder.into_inner().unwrap();

        if self.compressed {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&payload).unwrap();
            payload = encoder.finish().unwrap();
        }

        if let Some(password) = &self.password {
            let mut writer =
                SecureTarWriter::new(Vec::new(), &password_to_key(password), SALT).unwrap();
            writer.write_all(&payload).unwrap();
            payload = writer.finish().unwrap();
        }

        payload
    }

    /// Write the backup file
    pub fn write(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut builder = Builder::new(fs::File::create(path).unwrap());

        if self.descriptor {
            let descriptor = serde_json::json!({
                "slug": "abc123",
                "name": "Test backup",
                "date": "2026-01-05T10:00:00+00:00",
                "compressed": self.compressed,
                "protected": self.password.is_some(),
                "homeassistant": {"version": self.version},
            });
            append_bytes(
                &mut builder,
                "backup.json",
                descriptor.to_string().as_bytes(),
            );
        }

        if self.payload {
            let member = if self.compressed {
                "homeassistant.tar.gz"
            } else {
                "homeassistant.tar"
            };
            append_bytes(&mut builder, member, &self.payload());
        }

        builder.finish().unwrap();
    }
}

fn append_bytes<W: Write>(builder: &mut Builder<W>, name: &str, content: &[u8]) {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_mode(0o644);
    header.set_size(content.len() as u64);
    builder.append_data(&mut header, name, content).unwrap();
}

/// A configuration directory as Home Assistant leaves it
pub fn populate_config_dir(config_dir: &Path) {
    fs::create_dir_all(config_dir).unwrap();
    fs::write(config_dir.join("configuration.yaml"), "old: config\n").unwrap();
    fs::write(config_dir.join(".HA_VERSION"), "2025.12.0").unwrap();
    fs::write(config_dir.join("home-assistant_v2.db"), "old database").unwrap();
    fs::write(config_dir.join("home-assistant_v2.db-wal"), "old wal").unwrap();
    fs::create_dir_all(config_dir.join("www")).unwrap();
    fs::write(config_dir.join("www").join("image.png"), "png").unwrap();
    fs::create_dir_all(config_dir.join("backups")).unwrap();
    fs::create_dir_all(config_dir.join("tmp_backups")).unwrap();
    fs::write(config_dir.join("tmp_backups").join("partial.tar"), "partial").unwrap();
}

/// Write a restore instruction and return it
pub fn request_restore(
    config_dir: &Path,
    backup_file: PathBuf,
    restore_homeassistant: bool,
    restore_database: bool,
) -> RestoreInstruction {
    let instruction = RestoreInstruction {
        backup_file_path: backup_file,
        password: None,
        remove_after_restore: false,
        restore_database,
        restore_homeassistant,
    };
    instruction.save(config_dir).unwrap();
    instruction
}

/// Sorted top-level names of a directory
pub fn list_dir(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

pub fn read(path: impl AsRef<Path>) -> String {
    fs::read_to_string(path).unwrap()
}
