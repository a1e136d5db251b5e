//! Top-level lifecycle configuration.

use crate::component::ComponentSpec;
use crate::validate::{ConfigError, ConfigResult};
use lm_common::OsKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Prefix for per-OS install dir overrides (`LM_INSTALL_DIR_RHEL`, ...).
pub const ENV_INSTALL_DIR_PREFIX: &str = "LM_INSTALL_DIR_";

/// What Install does when the component exists at another version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallConflictPolicy {
    /// Fail with a version-conflict error and change nothing.
    #[default]
    Fail,
    /// Hand the run to the Upgrade flow.
    Upgrade,
}

/// What Uninstall does after a partial removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialUninstallPolicy {
    /// Leave the host as-is with the backup set kept for the operator.
    #[default]
    Preserve,
    /// Reinstall the removed packages from the backup set.
    Rollback,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySettings {
    #[serde(default)]
    pub install_on_different_version: InstallConflictPolicy,
    #[serde(default)]
    pub partial_uninstall: PartialUninstallPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSettings {
    /// Match the installer extension case-insensitively.
    #[serde(default = "default_true")]
    pub case_insensitive: bool,
    /// Directory name, under the artifacts dir, that installers extract into.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        ArtifactSettings {
            case_insensitive: true,
            staging_dir: default_staging_dir(),
        }
    }
}

/// Where to find the vendor installation manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallationManagerSettings {
    /// Explicit location; overrides both the default and the registry.
    pub location: Option<PathBuf>,
    pub registry_key: String,
    pub registry_value: String,
}

impl Default for InstallationManagerSettings {
    fn default() -> Self {
        InstallationManagerSettings {
            location: None,
            registry_key: r"HKLM\SOFTWARE\IBM\Installation Manager".to_string(),
            registry_value: "location".to_string(),
        }
    }
}

impl InstallationManagerSettings {
    /// Fixed default location for the platform.
    pub fn default_location(os_key: &OsKey) -> PathBuf {
        if os_key.is_windows() {
            PathBuf::from(r"C:\Program Files\IBM\Installation Manager")
        } else {
            PathBuf::from("/opt/IBM/InstallationManager")
        }
    }
}

/// Complete lifecycle configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Default install directory per platform key.
    #[serde(default = "default_install_dirs")]
    pub install_dirs: BTreeMap<String, PathBuf>,

    /// Minimum free space at the install volume for install/upgrade.
    #[serde(default = "default_min_free_mb")]
    pub min_free_mb: u64,

    #[serde(default = "default_architectures")]
    pub supported_architectures: Vec<String>,

    #[serde(default = "default_true")]
    pub require_privileges: bool,

    /// Root for per-run backup sets. Empty means the cache dir default.
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,

    /// Per-command timeout; 0 waits forever.
    #[serde(default = "default_timeout")]
    pub command_timeout_secs: u64,

    #[serde(default)]
    pub artifacts: ArtifactSettings,

    #[serde(default)]
    pub installation_manager: InstallationManagerSettings,

    #[serde(default)]
    pub policy: PolicySettings,

    #[serde(default = "default_components")]
    pub components: BTreeMap<String, ComponentSpec>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        LifecycleConfig {
            install_dirs: default_install_dirs(),
            min_free_mb: default_min_free_mb(),
            supported_architectures: default_architectures(),
            require_privileges: true,
            backup_dir: None,
            command_timeout_secs: default_timeout(),
            artifacts: ArtifactSettings::default(),
            installation_manager: InstallationManagerSettings::default(),
            policy: PolicySettings::default(),
            components: default_components(),
        }
    }
}

impl LifecycleConfig {
    /// Load and validate a JSON config file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> ConfigResult<Self> {
        let config: LifecycleConfig =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn component(&self, id: &str) -> Option<&ComponentSpec> {
        self.components.get(id)
    }

    /// Install dir for a platform, honoring `LM_INSTALL_DIR_<KEY>`.
    pub fn install_dir_for(&self, os_key: &OsKey) -> Option<PathBuf> {
        self.install_dir_with_env(os_key, |name| std::env::var(name).ok())
    }

    /// Same as [`install_dir_for`](Self::install_dir_for) with an injectable
    /// environment lookup.
    pub fn install_dir_with_env<F>(&self, os_key: &OsKey, env: F) -> Option<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = format!(
            "{}{}",
            ENV_INSTALL_DIR_PREFIX,
            os_key.as_str().to_ascii_uppercase()
        );
        if let Some(dir) = env(&var).filter(|v| !v.trim().is_empty()) {
            return Some(PathBuf::from(dir));
        }
        self.install_dirs.get(os_key.as_str()).cloned()
    }

    /// Root directory for backup sets.
    pub fn backup_root(&self) -> PathBuf {
        self.backup_dir.clone().unwrap_or_else(default_backup_root)
    }

    /// Minimum free space in bytes.
    pub fn min_free_bytes(&self) -> u64 {
        self.min_free_mb.saturating_mul(1024 * 1024)
    }

    pub fn command_timeout(&self) -> Option<std::time::Duration> {
        (self.command_timeout_secs > 0)
            .then(|| std::time::Duration::from_secs(self.command_timeout_secs))
    }

    pub fn architecture_supported(&self, arch: &str) -> bool {
        self.supported_architectures.is_empty()
            || self
                .supported_architectures
                .iter()
                .any(|a| a.eq_ignore_ascii_case(arch))
    }
}

/// Default backup root under the user cache directory.
pub fn default_backup_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("lifecycle")
        .join("backups")
}

fn default_install_dirs() -> BTreeMap<String, PathBuf> {
    let mut dirs = BTreeMap::new();
    dirs.insert(
        "windows".to_string(),
        PathBuf::from(r"C:\Program Files\BA Server"),
    );
    for key in ["linux", "rhel", "aix"] {
        dirs.insert(key.to_string(), PathBuf::from("/opt/ba-server"));
    }
    dirs
}

fn default_components() -> BTreeMap<String, ComponentSpec> {
    let mut components = BTreeMap::new();
    components.insert("server".to_string(), ComponentSpec::builtin_server());
    components.insert("client".to_string(), ComponentSpec::builtin_client());
    components
}

fn default_architectures() -> Vec<String> {
    ["x86_64", "amd64", "ppc64le", "s390x"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_min_free_mb() -> u64 {
    7500
}

fn default_timeout() -> u64 {
    3600
}

fn default_staging_dir() -> String {
    "extracted".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = LifecycleConfig::default();
        assert_eq!(cfg.min_free_mb, 7500);
        assert_eq!(cfg.min_free_bytes(), 7500 * 1024 * 1024);
        assert!(cfg.component("server").is_some());
        assert!(cfg.component("client").is_some());
        assert_eq!(cfg.policy.install_on_different_version, InstallConflictPolicy::Fail);
        assert_eq!(cfg.policy.partial_uninstall, PartialUninstallPolicy::Preserve);
        assert_eq!(
            cfg.command_timeout(),
            Some(std::time::Duration::from_secs(3600))
        );
        cfg.validate().unwrap();
    }

    #[test]
    fn test_install_dir_env_override() {
        let cfg = LifecycleConfig::default();
        let env = |name: &str| (name == "LM_INSTALL_DIR_RHEL").then(|| "/srv/ba".to_string());
        assert_eq!(
            cfg.install_dir_with_env(&OsKey::Rhel, env),
            Some(PathBuf::from("/srv/ba"))
        );
        assert_eq!(
            cfg.install_dir_with_env(&OsKey::Linux, env),
            Some(PathBuf::from("/opt/ba-server"))
        );
        assert_eq!(cfg.install_dir_with_env(&OsKey::Unknown, env), None);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let cfg = LifecycleConfig::from_json(
            r#"{"min_free_mb": 100, "policy": {"partial_uninstall": "rollback"}}"#,
        )
        .unwrap();
        assert_eq!(cfg.min_free_mb, 100);
        assert_eq!(cfg.policy.partial_uninstall, PartialUninstallPolicy::Rollback);
        assert_eq!(cfg.policy.install_on_different_version, InstallConflictPolicy::Fail);
        assert_eq!(cfg.components.len(), 2);
    }

    #[test]
    fn test_zero_timeout_disables() {
        let cfg = LifecycleConfig {
            command_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(cfg.command_timeout(), None);
    }

    #[test]
    fn test_architecture_match_ignores_case() {
        let cfg = LifecycleConfig::default();
        assert!(cfg.architecture_supported("AMD64"));
        assert!(!cfg.architecture_supported("sparc"));
    }
}
