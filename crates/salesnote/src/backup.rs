//! Online database backups.
//!
//! Each backup is a full copy of the database taken with `SQLite`'s online
//! backup API, next to a JSON manifest carrying its BLAKE3 checksum. The
//! live database stays open while the copy runs.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::backup::Backup;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::storage::{migrations, Storage};

const BACKUP_PREFIX: &str = "salesnote-";
const BACKUP_EXTENSION: &str = "db";
const MANIFEST_EXTENSION: &str = "json";

/// Pages copied per backup step.
const PAGES_PER_STEP: std::ffi::c_int = 256;

/// Metadata stored beside a backup file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    /// Backup file name, relative to the backup directory.
    pub file: String,
    /// When the backup was taken.
    pub created_at: DateTime<Utc>,
    /// Database the backup was taken from.
    pub source: PathBuf,
    /// Size of the backup file.
    pub size_bytes: u64,
    /// BLAKE3 hash of the backup file, hex encoded.
    pub blake3: String,
    /// Schema version of the copied database.
    pub schema_version: i32,
}

/// A directory of backups.
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    /// Backups kept under `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The backup directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `storage` into a new backup file.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the copy
    /// fails.
    pub fn create(&self, storage: &Storage, now: DateTime<Utc>) -> Result<BackupManifest> {
        fs::create_dir_all(&self.dir).map_err(|source| Error::DirectoryCreate {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.next_path(now);
        debug!("Backing up {} to {}", storage.path().display(), path.display());
        {
            let mut dest = Connection::open(&path)?;
            let backup = Backup::new(storage.conn(), &mut dest)?;
            backup
                .run_to_completion(PAGES_PER_STEP, std::time::Duration::ZERO, None)
                .map_err(|e| Error::backup(&path, e.to_string()))?;
        }

        let manifest = BackupManifest {
            file: file_name(&path)?,
            created_at: now,
            source: storage.path().to_path_buf(),
            size_bytes: fs::metadata(&path)?.len(),
            blake3: hash_file(&path)?,
            schema_version: migrations::get_schema_version(storage.conn())?,
        };
        fs::write(
            path.with_extension(MANIFEST_EXTENSION),
            serde_json::to_string_pretty(&manifest)?,
        )?;

        info!(
            "Backup {} created ({} bytes)",
            manifest.file, manifest.size_bytes
        );
        Ok(manifest)
    }

    /// Every backup with a readable manifest, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn list(&self) -> Result<Vec<BackupManifest>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut manifests = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(MANIFEST_EXTENSION) {
                continue;
            }
            match read_manifest(&path) {
                Ok(manifest) => manifests.push(manifest),
                Err(e) => warn!("Skipping manifest {}: {e}", path.display()),
            }
        }

        manifests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.file.cmp(&a.file)));
        Ok(manifests)
    }

    /// Check a backup against its manifest and run `SQLite`'s integrity
    /// check on it.
    ///
    /// `name` is a file name in the backup directory or a path.
    ///
    /// # Errors
    ///
    /// Returns a backup error if the file is missing, its checksum differs,
    /// or the database is corrupt.
    pub fn verify(&self, name: &str) -> Result<BackupManifest> {
        let path = self.resolve(name);
        if !path.exists() {
            return Err(Error::backup(&path, "backup file not found"));
        }
        let manifest = read_manifest(&path.with_extension(MANIFEST_EXTENSION))
            .map_err(|e| Error::backup(&path, format!("unreadable manifest: {e}")))?;

        let actual = hash_file(&path)?;
        if actual != manifest.blake3 {
            return Err(Error::backup(
                &path,
                format!("checksum mismatch: expected {}, found {actual}", manifest.blake3),
            ));
        }

        let conn = Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(Error::backup(&path, format!("integrity check: {integrity}")));
        }

        debug!("Backup {} verified", manifest.file);
        Ok(manifest)
    }

    /// Delete all but the `keep` newest backups.
    ///
    /// Returns the removed file names.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be removed.
    pub fn prune(&self, keep: usize) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for manifest in self.list()?.into_iter().skip(keep) {
            let path = self.dir.join(&manifest.file);
            if path.exists() {
                fs::remove_file(&path)?;
            }
            fs::remove_file(path.with_extension(MANIFEST_EXTENSION))?;
            removed.push(manifest.file);
        }

        if !removed.is_empty() {
            info!("Pruned {} backups, kept {keep}", removed.len());
        }
        Ok(removed)
    }

    fn next_path(&self, now: DateTime<Utc>) -> PathBuf {
        let stem = format!("{BACKUP_PREFIX}{}", now.format("%Y%m%d-%H%M%S"));
        let mut path = self.dir.join(format!("{stem}.{BACKUP_EXTENSION}"));
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{stem}-{n}.{BACKUP_EXTENSION}"));
            n += 1;
        }
        path
    }

    fn resolve(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        if path.components().count() > 1 {
            path.to_path_buf()
        } else {
            self.dir.join(path)
        }
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::backup(path, "backup path has no file name"))
}

fn hash_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

fn read_manifest(path: &Path) -> Result<BackupManifest> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}
