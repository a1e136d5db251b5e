//! Component catalog types.
//!
//! A component is one manageable product on the host. Its package lists,
//! tracker, config files, and services live here instead of in code so
//! tests can substitute fixtures.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// How the host tracks what is installed for a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerKind {
    /// Vendor installation manager (`imcl`) with offerings.
    InstallationManager,
    /// Native package database (RPM on Linux, registry/setup.exe on Windows).
    NativePackages,
}

impl std::fmt::Display for TrackerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerKind::InstallationManager => write!(f, "installation_manager"),
            TrackerKind::NativePackages => write!(f, "native_packages"),
        }
    }
}

/// One installation-manager offering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offering {
    pub id: String,
    pub profile: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default = "default_install_fixes")]
    pub install_fixes: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Offering {
    fn new(id: &str, profile: &str, features: &[&str]) -> Self {
        Offering {
            id: id.to_string(),
            profile: profile.to_string(),
            features: features.iter().map(|f| f.to_string()).collect(),
            install_fixes: default_install_fixes(),
            enabled: true,
        }
    }
}

/// A registry value holding the installed version on Windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryValue {
    pub key: String,
    pub value: String,
}

/// Values written into the installer response file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSettings {
    pub profile_id: String,
    #[serde(default)]
    pub license: String,
    pub secure_port: u16,
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub preferences: BTreeMap<String, String>,
}

impl Default for ResponseSettings {
    fn default() -> Self {
        let preferences = [
            ("com.ibm.cic.common.core.preferences.connectTimeout", "30"),
            ("com.ibm.cic.common.core.preferences.readTimeout", "45"),
            ("com.ibm.cic.common.core.preferences.downloadAutoRetryCount", "0"),
            ("offering.service.repositories.areUsed", "false"),
            ("com.ibm.cic.common.core.preferences.ssl.nonsecureMode", "false"),
            (
                "com.ibm.cic.common.core.preferences.preserveDownloadedArtifacts",
                "false",
            ),
            ("com.ibm.cic.common.core.preferences.keepFetchedFiles", "false"),
            ("com.ibm.cic.common.core.preferences.searchForUpdates", "false"),
            ("PassportAdvantageIsEnabled", "false"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        ResponseSettings {
            profile_id: "IBM Storage Protect".to_string(),
            license: String::new(),
            secure_port: 11090,
            repository: "repository".to_string(),
            preferences,
        }
    }
}

/// Everything the lifecycle manager needs to know about a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSpec {
    /// Identifier scanned for in tracker listings.
    pub package_id: String,

    pub tracker: TrackerKind,

    #[serde(default)]
    pub offerings: Vec<Offering>,

    /// Removal sequence: add-ons first, core next, shared libraries last.
    /// Install order is the reverse.
    #[serde(default)]
    pub removal_order: Vec<String>,

    #[serde(default)]
    pub config_files: Vec<PathBuf>,

    #[serde(default)]
    pub services: Vec<String>,

    #[serde(default)]
    pub processes: Vec<String>,

    /// Compare the installed version after deploy, not just presence.
    #[serde(default = "default_true")]
    pub verify_version: bool,

    /// Install and upgrade need the installer password.
    #[serde(default)]
    pub requires_secret: bool,

    #[serde(default)]
    pub windows_registry: Option<RegistryValue>,

    /// Product display name used to uninstall on Windows.
    #[serde(default)]
    pub windows_product: Option<String>,

    #[serde(default)]
    pub response: Option<ResponseSettings>,
}

impl ComponentSpec {
    /// Packages in install order (reverse of removal order).
    pub fn install_order(&self) -> Vec<String> {
        self.removal_order.iter().rev().cloned().collect()
    }

    /// Offerings flagged for installation.
    pub fn enabled_offerings(&self) -> impl Iterator<Item = &Offering> {
        self.offerings.iter().filter(|o| o.enabled)
    }

    /// Built-in server component managed through the installation manager.
    pub fn builtin_server() -> Self {
        let spectrum = "IBM Spectrum Protect";
        let offerings = vec![
            Offering::new(
                "com.tivoli.dsm.server",
                "IBM Storage Protect",
                &[
                    "com.tivoli.dsm.server.main",
                    "com.tivoli.dsm.gskit",
                    "com.tivoli.dsm.clientapi",
                    "com.ibm.java.jre",
                ],
            ),
            Offering::new(
                "com.tivoli.dsm.stagent",
                spectrum,
                &["com.tivoli.dsm.stagent.main", "com.tivoli.dsm.gskit"],
            ),
            Offering::new(
                "com.tivoli.dsm.devices",
                spectrum,
                &["com.tivoli.dsm.devices.main"],
            ),
            Offering::new(
                "com.tivoli.dsm.gui.offering",
                spectrum,
                &["com.tivoli.dsm.gui.main_asm", "com.ibm.java.jre"],
            ),
            Offering::new(
                "com.tivoli.dsm.ossm",
                spectrum,
                &["com.tivoli.dsm.ossm.main", "com.tivoli.dsm.gskit"],
            ),
            Offering::new(
                "com.tivoli.dsm.license",
                spectrum,
                &["com.tivoli.dsm.license.main"],
            ),
        ];

        ComponentSpec {
            package_id: "com.tivoli.dsm.server".to_string(),
            tracker: TrackerKind::InstallationManager,
            offerings,
            removal_order: [
                "com.tivoli.dsm.ossm",
                "com.tivoli.dsm.gui.offering",
                "com.tivoli.dsm.devices",
                "com.tivoli.dsm.stagent",
                "com.tivoli.dsm.license",
                "com.tivoli.dsm.server",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            config_files: Vec::new(),
            services: Vec::new(),
            processes: Vec::new(),
            verify_version: true,
            requires_secret: true,
            windows_registry: None,
            windows_product: None,
            response: Some(ResponseSettings::default()),
        }
    }

    /// Built-in backup-archive client managed as native packages.
    pub fn builtin_client() -> Self {
        ComponentSpec {
            package_id: "TIVsm-BA".to_string(),
            tracker: TrackerKind::NativePackages,
            offerings: Vec::new(),
            removal_order: [
                "TIVsm-BAcit",
                "TIVsm-BAhdw",
                "TIVsm-WEBGUI",
                "TIVsm-JBB",
                "TIVsm-BA",
                "TIVsm-APIcit",
                "TIVsm-API64",
                "gskssl64",
                "gskcrypt64",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            config_files: vec![
                PathBuf::from("/opt/tivoli/tsm/client/ba/bin/dsm.opt"),
                PathBuf::from("/opt/tivoli/tsm/client/ba/bin/dsm.sys"),
            ],
            services: vec!["dsmcad".to_string()],
            processes: vec!["dsmc".to_string()],
            verify_version: true,
            requires_secret: false,
            windows_registry: Some(RegistryValue {
                key: r"HKLM\SOFTWARE\IBM\ADSM\CurrentVersion".to_string(),
                value: "PTF".to_string(),
            }),
            windows_product: Some("IBM Spectrum Protect Client".to_string()),
            response: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_install_fixes() -> String {
    "none".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_order_is_reverse_of_removal() {
        let client = ComponentSpec::builtin_client();
        let install = client.install_order();
        assert_eq!(install.first().map(String::as_str), Some("gskcrypt64"));
        assert_eq!(install.last().map(String::as_str), Some("TIVsm-BAcit"));
        assert_eq!(install.len(), client.removal_order.len());
    }

    #[test]
    fn test_server_offerings_have_features() {
        let server = ComponentSpec::builtin_server();
        assert_eq!(server.enabled_offerings().count(), 6);
        assert!(server
            .offerings
            .iter()
            .all(|o| !o.features.is_empty() && o.install_fixes == "none"));
        assert_eq!(server.removal_order.last().unwrap(), &server.package_id);
    }

    #[test]
    fn test_offering_defaults_when_deserialized() {
        let o: Offering =
            serde_json::from_str(r#"{"id":"x","profile":"p"}"#).unwrap();
        assert!(o.enabled);
        assert_eq!(o.install_fixes, "none");
        assert!(o.features.is_empty());
    }
}
