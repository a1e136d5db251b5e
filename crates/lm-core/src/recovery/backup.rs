//! Backup sets taken before destructive steps.
//!
//! One set per run lives under `<backup_root>/<component>-<timestamp>-<run_id>`:
//!
//! ```text
//! manifest.json
//! config/<file name>      copies of each config file
//! packages/<file name>    installer and package archives
//! ```
//!
//! Config files are also copied to `<file>.bk` beside the original. A restore
//! uses whichever copy still matches the manifest checksum, the stored one
//! first.

use crate::host::HostOps;
use crate::logging::events::event_names;
use chrono::{DateTime, Utc};
use lm_common::{Error, OsKey, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const CONFIG_BACKUP_SUFFIX: &str = ".bk";

/// One file held in a backup set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEntry {
    /// Where the file came from.
    pub original: PathBuf,
    /// Copy inside the set.
    pub stored: PathBuf,
    /// SHA-256 of the contents, lowercase hex.
    pub sha256: String,
    pub size_bytes: u64,
}

/// Stored alongside each backup set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub component_id: String,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    /// Version installed when the set was taken.
    pub previous_version: Option<String>,
    #[serde(default)]
    pub config_files: Vec<BackupEntry>,
    #[serde(default)]
    pub packages: Vec<BackupEntry>,
}

/// A backup set on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSet {
    pub root: PathBuf,
    pub manifest: BackupManifest,
}

impl BackupSet {
    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.root.join("packages")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// Archived native package file for `package` (`<package>-<digit>...rpm`).
    pub fn package_file(&self, package: &str) -> Option<&Path> {
        self.manifest
            .packages
            .iter()
            .map(|e| e.stored.as_path())
            .find(|p| {
                p.file_name()
                    .map(|n| crate::driver::matches_package(&n.to_string_lossy(), package))
                    .unwrap_or(false)
            })
    }

    /// Archived installer for the platform, if one was taken.
    pub fn installer(&self, os_key: &OsKey) -> Option<&Path> {
        let ext = os_key.installer_extension()?;
        self.manifest
            .packages
            .iter()
            .map(|e| e.stored.as_path())
            .find(|p| p.to_string_lossy().to_ascii_lowercase().ends_with(ext))
    }
}

/// What to put into a new backup set.
#[derive(Debug, Clone, Default)]
pub struct BackupRequest<'a> {
    pub component_id: &'a str,
    pub run_id: &'a str,
    pub previous_version: Option<&'a str>,
    pub config_files: &'a [PathBuf],
    pub packages: &'a [PathBuf],
}

/// Creates, checks, and discards backup sets through a [`HostOps`].
pub struct BackupManager<'h> {
    host: &'h dyn HostOps,
    root: PathBuf,
}

impl<'h> BackupManager<'h> {
    pub fn new(host: &'h dyn HostOps, root: impl Into<PathBuf>) -> Self {
        BackupManager {
            host,
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Compute SHA-256 checksum of a file.
    pub fn compute_checksum(&self, path: &Path) -> io::Result<String> {
        let data = self.host.read(path)?;
        Ok(hex::encode(Sha256::digest(&data)))
    }

    /// Take a backup set. Config files that do not exist are skipped; a
    /// package file that cannot be read fails the whole backup.
    pub fn create(&self, request: &BackupRequest<'_>) -> Result<BackupSet> {
        let created_at = Utc::now();
        let name = format!(
            "{}-{}-{}",
            request.component_id,
            created_at.format("%Y%m%dT%H%M%SZ"),
            request.run_id
        );
        let mut set = BackupSet {
            root: self.root.join(name),
            manifest: BackupManifest {
                component_id: request.component_id.to_string(),
                run_id: request.run_id.to_string(),
                created_at,
                previous_version: request.previous_version.map(str::to_string),
                config_files: Vec::new(),
                packages: Vec::new(),
            },
        };
        self.host.create_dir_all(&set.root)?;

        for original in request.config_files {
            if !self.host.exists(original) {
                debug!(path = %original.display(), "config file absent, not backed up");
                continue;
            }
            let beside = with_suffix(original, CONFIG_BACKUP_SUFFIX);
            self.host.copy_file(original, &beside)?;
            let entry = self.store(original, &set.config_dir())?;
            set.manifest.config_files.push(entry);
        }

        for original in request.packages {
            let entry = self.store(original, &set.packages_dir())?;
            set.manifest.packages.push(entry);
        }

        let manifest = serde_json::to_vec_pretty(&set.manifest)?;
        self.host.write_file(&set.manifest_path(), &manifest)?;

        info!(
            target: event_names::BACKUP_CREATED,
            path = %set.root.display(),
            config_files = set.manifest.config_files.len(),
            packages = set.manifest.packages.len(),
            previous_version = request.previous_version.unwrap_or("-"),
            "backup set created"
        );
        Ok(set)
    }

    fn store(&self, original: &Path, dir: &Path) -> Result<BackupEntry> {
        let file_name = original.file_name().ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no file name", original.display()),
            ))
        })?;
        let stored = dir.join(file_name);
        let data = self.host.read(original)?;
        self.host.copy_file(original, &stored)?;
        Ok(BackupEntry {
            original: original.to_path_buf(),
            stored,
            sha256: hex::encode(Sha256::digest(&data)),
            size_bytes: data.len() as u64,
        })
    }

    /// Entries whose stored copy is missing or no longer matches its
    /// checksum.
    pub fn corrupted(&self, set: &BackupSet) -> Vec<PathBuf> {
        set.manifest
            .config_files
            .iter()
            .chain(&set.manifest.packages)
            .filter(|entry| match self.compute_checksum(&entry.stored) {
                Ok(sum) => sum != entry.sha256,
                Err(_) => true,
            })
            .map(|entry| entry.stored.clone())
            .collect()
    }

    /// Put config files back from the stored copy, or from `<file>.bk` when
    /// the stored copy is gone or damaged. A copy is only used if it matches
    /// the manifest checksum. Returns the files that could not be restored.
    pub fn restore_config(&self, set: &BackupSet) -> Vec<PathBuf> {
        let mut failed = Vec::new();
        for entry in &set.manifest.config_files {
            let beside = with_suffix(&entry.original, CONFIG_BACKUP_SUFFIX);
            let source = [&entry.stored, &beside].into_iter().find(|candidate| {
                match self.compute_checksum(candidate) {
                    Ok(sum) => sum == entry.sha256,
                    Err(_) => false,
                }
            });
            let Some(source) = source else {
                warn!(
                    path = %entry.original.display(),
                    "no copy matches the recorded checksum, config file not restored"
                );
                failed.push(entry.original.clone());
                continue;
            };
            debug!(path = %entry.original.display(), source = %source.display(), "restoring config file");
            if let Err(e) = self.host.copy_file(source, &entry.original) {
                warn!(
                    path = %entry.original.display(),
                    error = %e,
                    "config file not restored"
                );
                failed.push(entry.original.clone());
            }
        }
        failed
    }

    /// Remove the set and the `<file>.bk` copies it made.
    pub fn discard(&self, set: &BackupSet) -> io::Result<()> {
        for entry in &set.manifest.config_files {
            let beside = with_suffix(&entry.original, CONFIG_BACKUP_SUFFIX);
            if self.host.exists(&beside) {
                self.host.remove_file(&beside)?;
            }
        }
        self.host.remove_tree(&set.root)?;
        info!(
            target: event_names::BACKUP_DISCARDED,
            path = %set.root.display(),
            "backup set discarded"
        );
        Ok(())
    }

    pub fn load(&self, dir: &Path) -> Result<BackupSet> {
        let text = self.host.read_to_string(&dir.join(MANIFEST_FILE))?;
        Ok(BackupSet {
            root: dir.to_path_buf(),
            manifest: serde_json::from_str(&text)?,
        })
    }

    /// Sets kept for a component, newest first. Unreadable sets are skipped.
    pub fn list(&self, component_id: &str) -> Vec<BackupSet> {
        let Ok(entries) = self.host.list_dir(&self.root) else {
            return Vec::new();
        };
        let prefix = format!("{}-", component_id);
        let mut sets: Vec<BackupSet> = entries
            .into_iter()
            .filter(|e| !e.is_file && e.name.starts_with(&prefix))
            .filter_map(|e| match self.load(&e.path) {
                Ok(set) if set.manifest.component_id == component_id => Some(set),
                Ok(_) => None,
                Err(err) => {
                    debug!(path = %e.path.display(), error = %err, "skipping unreadable backup set");
                    None
                }
            })
            .collect();
        sets.sort_by(|a, b| b.manifest.created_at.cmp(&a.manifest.created_at));
        sets
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{FakeHost, Mutation};

    const OPT: &str = "/opt/tivoli/tsm/client/ba/bin/dsm.opt";
    const SYS: &str = "/opt/tivoli/tsm/client/ba/bin/dsm.sys";

    fn request<'a>(configs: &'a [PathBuf], packages: &'a [PathBuf]) -> BackupRequest<'a> {
        BackupRequest {
            component_id: "client",
            run_id: "run-0123456789ab",
            previous_version: Some("8.1.19.0"),
            config_files: configs,
            packages,
        }
    }

    #[test]
    fn test_create_backs_up_configs_and_packages() {
        let host = FakeHost::rhel();
        host.add_file(OPT, b"SERVERNAME main\n");
        host.add_file("/art/extracted/TIVsm-BA-8.1.19-0.x86_64.rpm", b"rpm-bytes");
        let configs = vec![PathBuf::from(OPT), PathBuf::from(SYS)];
        let packages = vec![PathBuf::from("/art/extracted/TIVsm-BA-8.1.19-0.x86_64.rpm")];

        let manager = BackupManager::new(&host, "/var/backups");
        let set = manager.create(&request(&configs, &packages)).unwrap();

        assert!(set.root.starts_with("/var/backups"));
        let dir_name = set.root.file_name().unwrap().to_string_lossy().into_owned();
        assert!(dir_name.starts_with("client-"));
        assert!(dir_name.ends_with("-run-0123456789ab"));

        // dsm.sys is absent and skipped
        assert_eq!(set.manifest.config_files.len(), 1);
        assert_eq!(set.manifest.config_files[0].sha256.len(), 64);
        assert_eq!(host.file(format!("{OPT}.bk")).unwrap(), b"SERVERNAME main\n");
        assert_eq!(
            set.package_file("TIVsm-BA").map(Path::to_path_buf),
            Some(set.packages_dir().join("TIVsm-BA-8.1.19-0.x86_64.rpm"))
        );
        assert_eq!(set.package_file("TIVsm-BAcit"), None);

        let loaded = manager.load(&set.root).unwrap();
        assert_eq!(loaded.manifest, set.manifest);
        assert!(manager.corrupted(&set).is_empty());
    }

    #[test]
    fn test_corruption_detected() {
        let host = FakeHost::rhel();
        host.add_file("/pkgs/gskssl64-8.0.55-0.x86_64.rpm", b"original");
        let packages = vec![PathBuf::from("/pkgs/gskssl64-8.0.55-0.x86_64.rpm")];
        let manager = BackupManager::new(&host, "/b");
        let set = manager.create(&request(&[], &packages)).unwrap();

        let stored = set.manifest.packages[0].stored.clone();
        host.add_file(&stored, b"tampered");
        assert_eq!(manager.corrupted(&set), vec![stored]);
    }

    #[test]
    fn test_restore_config_uses_stored_copy() {
        let host = FakeHost::rhel();
        host.add_file(OPT, b"v1");
        let configs = vec![PathBuf::from(OPT)];
        let manager = BackupManager::new(&host, "/b");
        let set = manager.create(&request(&configs, &[])).unwrap();

        host.add_file(OPT, b"clobbered by installer");
        host.add_file(format!("{OPT}.bk"), b"edited after the backup");
        assert!(manager.restore_config(&set).is_empty());
        assert_eq!(host.file(OPT).unwrap(), b"v1");
    }

    #[test]
    fn test_restore_config_falls_back_to_bk_copy() {
        let host = FakeHost::rhel();
        host.add_file(OPT, b"v1");
        let configs = vec![PathBuf::from(OPT)];
        let manager = BackupManager::new(&host, "/b");
        let set = manager.create(&request(&configs, &[])).unwrap();

        host.add_file(&set.manifest.config_files[0].stored, b"bit rot");
        host.add_file(OPT, b"clobbered by installer");
        assert!(manager.restore_config(&set).is_empty());
        assert_eq!(host.file(OPT).unwrap(), b"v1");
    }

    #[test]
    fn test_restore_config_refuses_unverified_copies() {
        let host = FakeHost::rhel();
        host.add_file(OPT, b"v1");
        let configs = vec![PathBuf::from(OPT)];
        let manager = BackupManager::new(&host, "/b");
        let set = manager.create(&request(&configs, &[])).unwrap();

        host.add_file(&set.manifest.config_files[0].stored, b"bit rot");
        host.add_file(format!("{OPT}.bk"), b"edited after the backup");
        host.add_file(OPT, b"current");
        assert_eq!(manager.restore_config(&set), vec![PathBuf::from(OPT)]);
        assert_eq!(host.file(OPT).unwrap(), b"current");
    }

    #[test]
    fn test_discard_removes_set_and_bk_files() {
        let host = FakeHost::rhel();
        host.add_file(OPT, b"v1");
        let configs = vec![PathBuf::from(OPT)];
        let manager = BackupManager::new(&host, "/b");
        let set = manager.create(&request(&configs, &[])).unwrap();

        manager.discard(&set).unwrap();
        assert!(!host.exists(&set.root));
        assert!(!host.exists(Path::new(&format!("{OPT}.bk"))));
        assert!(host.exists(Path::new(OPT)));
        assert!(host
            .mutations()
            .contains(&Mutation::RemoveTree(set.root.clone())));
    }

    #[test]
    fn test_list_newest_first() {
        let host = FakeHost::rhel();
        let manager = BackupManager::new(&host, "/b");
        let first = manager.create(&request(&[], &[])).unwrap();
        let mut older = first.manifest.clone();
        older.created_at = first.manifest.created_at - chrono::Duration::hours(1);
        older.run_id = "run-older".into();
        host.add_file(
            "/b/client-old-run-older/manifest.json",
            &serde_json::to_vec(&older).unwrap(),
        );
        host.add_file("/b/server-x/manifest.json", b"{}");

        let sets = manager.list("client");
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].manifest.run_id, "run-0123456789ab");
        assert_eq!(sets[1].manifest.run_id, "run-older");
    }

    #[test]
    fn test_installer_lookup_by_extension() {
        let host = FakeHost::linux();
        host.add_file("/art/8.1.19-server-linux.bin", b"installer");
        let packages = vec![PathBuf::from("/art/8.1.19-server-linux.bin")];
        let manager = BackupManager::new(&host, "/b");
        let set = manager.create(&request(&[], &packages)).unwrap();
        assert!(set.installer(&OsKey::Linux).is_some());
        assert!(set.installer(&OsKey::Windows).is_none());
    }
}
