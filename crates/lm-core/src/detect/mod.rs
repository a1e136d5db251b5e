//! Installed-state detection.
//!
//! Asks the component's tracking mechanism what is installed. A missing
//! tracker or unreadable output means "nothing installed by this mechanism",
//! never an error.

pub mod parse;

use crate::host::HostOps;
use crate::logging::events::event_names;
use crate::runner::{CommandRunner, CommandSpec};
use lm_common::{OsKey, Version};
use lm_config::{ComponentSpec, InstallationManagerSettings, LifecycleConfig, TrackerKind};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What the tracker reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detection {
    pub status: bool,
    pub message: String,
    /// Package or offering id to version.
    pub installed_packages: BTreeMap<String, String>,
    pub tracker: TrackerKind,
    /// Version of the component's main package, when listed.
    pub version: Option<String>,
}

impl Detection {
    fn absent(tracker: TrackerKind, message: impl Into<String>) -> Self {
        Detection {
            status: false,
            message: message.into(),
            installed_packages: BTreeMap::new(),
            tracker,
            version: None,
        }
    }

    fn from_packages(
        tracker: TrackerKind,
        component: &ComponentSpec,
        installed_packages: BTreeMap<String, String>,
    ) -> Self {
        // Presence follows the main package alone. Shared libraries and
        // add-ons are listed but do not make the component installed.
        let version = installed_packages.get(&component.package_id).cloned();
        let status = version.is_some();
        let message = match &version {
            Some(v) => format!(
                "{} at {} ({} tracked package(s) listed)",
                component.package_id,
                v,
                installed_packages.len()
            ),
            None if installed_packages.is_empty() => {
                format!("{} is not installed", component.package_id)
            }
            None => format!(
                "{} is not installed ({} related package(s) present: {})",
                component.package_id,
                installed_packages.len(),
                installed_packages.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
        };
        Detection {
            status,
            message,
            installed_packages,
            tracker,
            version,
        }
    }

    /// Numeric prefix of the main package version.
    pub fn parsed_version(&self) -> Option<Version> {
        self.version.as_deref().and_then(Version::parse_lenient)
    }

    pub fn has_package(&self, id: &str) -> bool {
        self.installed_packages.contains_key(id)
    }

    /// Whether any listed package carries `version`. Build suffixes on the
    /// listed side are ignored: `8.1.20.0-1` lists `8.1.20`.
    pub fn lists_version(&self, version: &str) -> bool {
        let wanted = Version::parse_lenient(version);
        self.installed_packages.values().any(|listed| {
            listed == version
                || match (&wanted, Version::parse_lenient(listed)) {
                    (Some(w), Some(l)) => l.satisfies(w),
                    _ => false,
                }
        })
    }
}

/// Directory of the vendor installation manager.
///
/// Config override first, then the fixed default, then (Windows only) the
/// registry when the default holds no `imcl`.
pub fn installation_manager_dir(host: &dyn HostOps, config: &LifecycleConfig, os_key: &OsKey) -> PathBuf {
    let settings = &config.installation_manager;
    if let Some(location) = &settings.location {
        return location.clone();
    }
    let default = InstallationManagerSettings::default_location(os_key);
    if os_key.is_windows() && !host.exists(&imcl_path(&default, os_key)) {
        if let Some(location) = host.registry_value(&settings.registry_key, &settings.registry_value) {
            debug!(location = %location, "installation manager location from registry");
            return PathBuf::from(location);
        }
    }
    default
}

/// `imcl` binary under an installation manager directory.
pub fn imcl_path(im_dir: &Path, os_key: &OsKey) -> PathBuf {
    let bin = if os_key.is_windows() { "imcl.exe" } else { "imcl" };
    im_dir.join("eclipse").join("tools").join(bin)
}

pub struct Detector<'a> {
    host: &'a dyn HostOps,
    runner: &'a CommandRunner<'a>,
    config: &'a LifecycleConfig,
}

impl<'a> Detector<'a> {
    /// `runner` should be a read-only probe runner: detection must see the
    /// real host even in a dry run.
    pub fn new(host: &'a dyn HostOps, runner: &'a CommandRunner<'a>, config: &'a LifecycleConfig) -> Self {
        Detector {
            host,
            runner,
            config,
        }
    }

    pub fn detect(&self, component: &ComponentSpec) -> Detection {
        let detection = match component.tracker {
            TrackerKind::InstallationManager => self.detect_installation_manager(component),
            TrackerKind::NativePackages if self.runner.os_key().is_windows() => {
                self.detect_registry(component)
            }
            TrackerKind::NativePackages => self.detect_rpm(component),
        };
        info!(
            target: event_names::DETECT_RESULT,
            tracker = %detection.tracker,
            installed = detection.status,
            version = detection.version.as_deref().unwrap_or("-"),
            packages = detection.installed_packages.len(),
            "{}",
            detection.message
        );
        detection
    }

    fn detect_installation_manager(&self, component: &ComponentSpec) -> Detection {
        let tracker = TrackerKind::InstallationManager;
        let os_key = self.runner.os_key();
        let imcl = imcl_path(&installation_manager_dir(self.host, self.config, os_key), os_key);
        if !self.host.exists(&imcl) {
            return Detection::absent(
                tracker,
                format!("installation manager not found at {}, treating as not installed", imcl.display()),
            );
        }

        let result = self.runner.run(&CommandSpec::argv([
            imcl.to_string_lossy().into_owned(),
            "listInstalledPackages".to_string(),
        ]));
        if !result.success() {
            return Detection::absent(
                tracker,
                format!("listing installed packages failed: {}", result.error_text()),
            );
        }
        let packages = parse::parse_listing(
            &result.stdout,
            &tracked_ids(component),
            '_',
            Some(parse::normalize_im_version),
        );
        Detection::from_packages(tracker, component, packages)
    }

    fn detect_rpm(&self, component: &ComponentSpec) -> Detection {
        let tracker = TrackerKind::NativePackages;
        let result = self.runner.run(&CommandSpec::argv(["rpm", "-qa"]));
        if !result.success() {
            return Detection::absent(
                tracker,
                format!("package query failed: {}", result.error_text()),
            );
        }
        let packages = parse::parse_listing(
            &result.stdout,
            &tracked_ids(component),
            '-',
            Some(parse::normalize_rpm_version),
        );
        Detection::from_packages(tracker, component, packages)
    }

    fn detect_registry(&self, component: &ComponentSpec) -> Detection {
        let tracker = TrackerKind::NativePackages;
        let Some(reg) = &component.windows_registry else {
            return Detection::absent(tracker, "no registry location configured for this component");
        };
        match self.host.registry_value(&reg.key, &reg.value) {
            Some(version) => {
                let mut packages = BTreeMap::new();
                packages.insert(component.package_id.clone(), version);
                Detection::from_packages(tracker, component, packages)
            }
            None => Detection::absent(
                tracker,
                format!("{} not found in registry", component.package_id),
            ),
        }
    }
}

/// Main package id plus everything in the removal order, without duplicates.
fn tracked_ids(component: &ComponentSpec) -> Vec<String> {
    let mut ids = vec![component.package_id.clone()];
    for id in &component.removal_order {
        if !ids.contains(id) {
            ids.push(id.clone());
        }
    }
    ids
}
