//! Configuration errors and semantic validation.

use crate::component::TrackerKind;
use crate::settings::LifecycleConfig;
use std::collections::HashSet;
use thiserror::Error;

/// Configuration result type.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ConfigError::Io(_) => 60,
            ConfigError::Parse(_) => 61,
            ConfigError::MissingField(_) => 64,
            ConfigError::InvalidValue { .. } => 65,
        }
    }
}

impl From<ConfigError> for lm_common::Error {
    fn from(err: ConfigError) -> Self {
        lm_common::Error::Config(err.to_string())
    }
}

impl LifecycleConfig {
    /// Check semantic constraints that serde cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.min_free_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "min_free_mb".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if self.artifacts.staging_dir.trim().is_empty()
            || self.artifacts.staging_dir.contains(['/', '\\'])
        {
            return Err(ConfigError::InvalidValue {
                field: "artifacts.staging_dir".to_string(),
                message: "must be a plain directory name".to_string(),
            });
        }

        for (name, component) in &self.components {
            if component.package_id.trim().is_empty() {
                return Err(ConfigError::MissingField(format!(
                    "components.{name}.package_id"
                )));
            }

            if component.tracker == TrackerKind::NativePackages
                && component.removal_order.is_empty()
            {
                return Err(ConfigError::InvalidValue {
                    field: format!("components.{name}.removal_order"),
                    message: "native package components need a removal order".to_string(),
                });
            }

            if component.tracker == TrackerKind::InstallationManager
                && component.offerings.is_empty()
            {
                return Err(ConfigError::InvalidValue {
                    field: format!("components.{name}.offerings"),
                    message: "installation manager components need at least one offering"
                        .to_string(),
                });
            }

            let mut seen = HashSet::new();
            for pkg in &component.removal_order {
                if !seen.insert(pkg.to_ascii_lowercase()) {
                    return Err(ConfigError::InvalidValue {
                        field: format!("components.{name}.removal_order"),
                        message: format!("duplicate package '{pkg}'"),
                    });
                }
            }
        }

        Ok(())
    }
}
