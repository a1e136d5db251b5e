//! Error types for the lifecycle manager.
//!
//! Every error carries:
//! - A stable numeric code for machine parsing
//! - A category that mirrors the operational failure taxonomy
//! - A recoverability hint for automation
//! - A remediation line for humans
//!
//! Errors serialize to structured JSON:
//! ```json
//! {
//!   "code": 20,
//!   "category": "precondition",
//!   "message": "insufficient disk space at /: 1200 MB free, 7500 MB required",
//!   "recoverable": true,
//!   "context": { "path": "/", "free_mb": 1200, "required_mb": 7500 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration file or argument errors.
    Config,
    /// Host does not meet requirements; nothing was changed.
    Precondition,
    /// Installer artifact discovery errors.
    Artifact,
    /// Installer invocation failed.
    Deploy,
    /// Post-deploy state did not match expectations.
    Verify,
    /// Package removal errors.
    Uninstall,
    /// Platform compatibility errors.
    Platform,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Precondition => write!(f, "precondition"),
            ErrorCategory::Artifact => write!(f, "artifact"),
            ErrorCategory::Deploy => write!(f, "deploy"),
            ErrorCategory::Verify => write!(f, "verify"),
            ErrorCategory::Uninstall => write!(f, "uninstall"),
            ErrorCategory::Platform => write!(f, "platform"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for lifecycle operations.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown component '{0}'")]
    UnknownComponent(String),

    #[error("invalid version '{0}'")]
    InvalidVersion(String),

    // Precondition errors (20-29)
    #[error("insufficient disk space at {}: {free_mb} MB free, {required_mb} MB required", .path.display())]
    InsufficientDiskSpace {
        path: PathBuf,
        free_mb: u64,
        required_mb: u64,
    },

    #[error("administrative privileges are required")]
    MissingPrivileges,

    #[error("unsupported architecture '{0}'")]
    UnsupportedArchitecture(String),

    #[error("installer password is required for {0}")]
    MissingSecret(String),

    #[error("component is not installed; {0} requires an existing installation")]
    NotInstalled(String),

    #[error("component installed at version {installed}, requested {requested}")]
    VersionConflict { installed: String, requested: String },

    // Artifact errors (30-39)
    #[error("artifact directory does not exist: {}", .0.display())]
    ArtifactDirectoryMissing(PathBuf),

    #[error("no files with extension '{extension}' found in {}", .dir.display())]
    NoArtifactCandidates { dir: PathBuf, extension: String },

    #[error("no installer found for version '{0}'")]
    ArtifactVersionNotFound(String),

    // Deploy/verify errors (40-49)
    #[error("deploy failed: {0}")]
    DeployFailed(String),

    #[error("verification failed: {0}")]
    VerifyFailed(String),

    // Uninstall errors (50-59)
    #[error("uninstall incomplete: removed [{}], failed [{}]", .removed.join(", "), .failed.join(", "))]
    PartialUninstall {
        removed: Vec<String>,
        failed: Vec<String>,
    },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Platform errors (70-79)
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Precondition errors
    /// - 30-39: Artifact errors
    /// - 40-49: Deploy and verify errors
    /// - 50-59: Uninstall errors
    /// - 60-69: I/O errors
    /// - 70-79: Platform errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::UnknownComponent(_) => 11,
            Error::InvalidVersion(_) => 12,

            Error::InsufficientDiskSpace { .. } => 20,
            Error::MissingPrivileges => 21,
            Error::UnsupportedArchitecture(_) => 22,
            Error::MissingSecret(_) => 23,
            Error::NotInstalled(_) => 24,
            Error::VersionConflict { .. } => 25,

            Error::ArtifactDirectoryMissing(_) => 30,
            Error::NoArtifactCandidates { .. } => 31,
            Error::ArtifactVersionNotFound(_) => 32,

            Error::DeployFailed(_) => 40,
            Error::VerifyFailed(_) => 41,

            Error::PartialUninstall { .. } => 50,

            Error::Io(_) => 60,
            Error::Json(_) => 61,

            Error::UnsupportedPlatform(_) => 70,
        }
    }

    /// Returns the category for this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::UnknownComponent(_) | Error::InvalidVersion(_) => {
                ErrorCategory::Config
            }

            Error::InsufficientDiskSpace { .. }
            | Error::MissingPrivileges
            | Error::UnsupportedArchitecture(_)
            | Error::MissingSecret(_)
            | Error::NotInstalled(_)
            | Error::VersionConflict { .. } => ErrorCategory::Precondition,

            Error::ArtifactDirectoryMissing(_)
            | Error::NoArtifactCandidates { .. }
            | Error::ArtifactVersionNotFound(_) => ErrorCategory::Artifact,

            Error::DeployFailed(_) => ErrorCategory::Deploy,
            Error::VerifyFailed(_) => ErrorCategory::Verify,
            Error::PartialUninstall { .. } => ErrorCategory::Uninstall,

            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,

            Error::UnsupportedPlatform(_) => ErrorCategory::Platform,
        }
    }

    /// Returns whether a retry after operator action can succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Config(_) | Error::UnknownComponent(_) | Error::InvalidVersion(_) => true,

            // Precondition failures leave the host untouched.
            Error::InsufficientDiskSpace { .. }
            | Error::MissingPrivileges
            | Error::MissingSecret(_)
            | Error::NotInstalled(_)
            | Error::VersionConflict { .. } => true,
            Error::UnsupportedArchitecture(_) | Error::UnsupportedPlatform(_) => false,

            Error::ArtifactDirectoryMissing(_)
            | Error::NoArtifactCandidates { .. }
            | Error::ArtifactVersionNotFound(_) => true,

            Error::DeployFailed(_) | Error::VerifyFailed(_) => true,

            // The backup set is preserved for manual recovery.
            Error::PartialUninstall { .. } => true,

            Error::Io(_) => true,
            Error::Json(_) => false,
        }
    }

    /// Returns a remediation hint for humans.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => "Run 'lm-core config show' to inspect the resolved configuration.",
            Error::UnknownComponent(_) => {
                "Pass a component id defined in the configuration catalog."
            }
            Error::InvalidVersion(_) => "Use a dotted numeric version such as 8.1.20.",

            Error::InsufficientDiskSpace { .. } => {
                "Free space on the install volume or lower min_free_mb in the configuration."
            }
            Error::MissingPrivileges => "Re-run as root or from an elevated Administrator shell.",
            Error::UnsupportedArchitecture(_) => {
                "Run on a supported architecture or extend supported_architectures."
            }
            Error::MissingSecret(_) => {
                "Set LM_INSTALLER_PASSWORD or pass --installer-password."
            }
            Error::NotInstalled(_) => "Use '--mode install' for a first installation.",
            Error::VersionConflict { .. } => {
                "Use '--mode upgrade', or set policy.install_on_different_version to 'upgrade'."
            }

            Error::ArtifactDirectoryMissing(_) => {
                "Check --artifacts-dir points at the directory holding installer files."
            }
            Error::NoArtifactCandidates { .. } => {
                "Copy an installer for this platform into the artifacts directory."
            }
            Error::ArtifactVersionNotFound(_) => {
                "Check the requested version or add '<version>-...' installer to the artifacts directory."
            }

            Error::DeployFailed(_) => "Inspect the installer log; the previous state was rolled back.",
            Error::VerifyFailed(_) => {
                "Inspect the installed package listing; the previous state was rolled back."
            }

            Error::PartialUninstall { .. } => {
                "The backup set was kept. Reinstall from it or remove the remaining packages manually."
            }

            Error::Io(_) => "Check disk space and permissions on the paths involved, then retry.",
            Error::Json(_) => "A manifest or configuration file is corrupted; restore it from backup.",

            Error::UnsupportedPlatform(_) => "This host platform has no installer mapping.",
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::UnknownComponent(_) => "Unknown Component",
            Error::InvalidVersion(_) => "Invalid Version",
            Error::InsufficientDiskSpace { .. } => "Insufficient Disk Space",
            Error::MissingPrivileges => "Missing Privileges",
            Error::UnsupportedArchitecture(_) => "Unsupported Architecture",
            Error::MissingSecret(_) => "Missing Installer Password",
            Error::NotInstalled(_) => "Not Installed",
            Error::VersionConflict { .. } => "Version Conflict",
            Error::ArtifactDirectoryMissing(_) => "Artifact Directory Missing",
            Error::NoArtifactCandidates { .. } => "No Installer Found",
            Error::ArtifactVersionNotFound(_) => "Installer Version Not Found",
            Error::DeployFailed(_) => "Deploy Failed",
            Error::VerifyFailed(_) => "Verification Failed",
            Error::PartialUninstall { .. } => "Partial Uninstall",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
            Error::UnsupportedPlatform(_) => "Unsupported Platform",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Additional structured context (e.g., path, package lists).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::InsufficientDiskSpace {
                path,
                free_mb,
                required_mb,
            } => {
                context.insert("path".to_string(), serde_json::json!(path));
                context.insert("free_mb".to_string(), serde_json::json!(free_mb));
                context.insert("required_mb".to_string(), serde_json::json!(required_mb));
            }
            Error::PartialUninstall { removed, failed } => {
                context.insert("removed".to_string(), serde_json::json!(removed));
                context.insert("failed".to_string(), serde_json::json!(failed));
            }
            Error::VersionConflict {
                installed,
                requested,
            } => {
                context.insert("installed".to_string(), serde_json::json!(installed));
                context.insert("requested".to_string(), serde_json::json!(requested));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            context,
        }
    }
}

impl StructuredError {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

/// Format an error for human-readable stderr output.
///
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        headline = err.headline(),
        message = err,
        remediation = err.remediation(),
    )
}
