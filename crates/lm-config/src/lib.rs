//! Lifecycle manager configuration loading and validation.
//!
//! This crate provides:
//! - Typed structs for the lifecycle configuration and component catalog
//! - Config resolution (CLI → env → XDG → system → defaults)
//! - Semantic validation

pub mod component;
pub mod resolve;
pub mod settings;
pub mod validate;

pub use component::{ComponentSpec, Offering, RegistryValue, ResponseSettings, TrackerKind};
pub use resolve::{load_config, resolve_config_path, ConfigSource, ResolvedConfig};
pub use settings::{
    ArtifactSettings, InstallConflictPolicy, InstallationManagerSettings, LifecycleConfig,
    PartialUninstallPolicy, PolicySettings,
};
pub use validate::{ConfigError, ConfigResult};
