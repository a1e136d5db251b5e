//! Configuration resolution and path discovery.
//!
//! Resolution order: CLI argument → environment variable → XDG path →
//! system path → built-in defaults.

use crate::settings::LifecycleConfig;
use crate::validate::ConfigResult;
use std::path::{Path, PathBuf};

/// Where the configuration came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Found in /etc/lifecycle/.
    SystemConfig,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::SystemConfig => write!(f, "system config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// Environment variable naming an explicit config file.
pub const ENV_CONFIG_PATH: &str = "LM_CONFIG";

/// Standard config file name.
const CONFIG_FILENAME: &str = "config.json";

/// Application name for XDG and system directories.
const APP_NAME: &str = "lifecycle";

/// A loaded configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: LifecycleConfig,
    pub path: Option<PathBuf>,
    pub source: ConfigSource,
}

/// Find the config file path using the standard resolution order.
///
/// An explicit CLI path is returned even when it does not exist so that the
/// subsequent load reports the mistake instead of silently falling back.
pub fn resolve_config_path(cli_path: Option<&Path>) -> (Option<PathBuf>, ConfigSource) {
    resolve_with(
        cli_path,
        std::env::var(ENV_CONFIG_PATH).ok().map(PathBuf::from),
        dirs::config_dir(),
        PathBuf::from("/etc"),
    )
}

fn resolve_with(
    cli_path: Option<&Path>,
    env_path: Option<PathBuf>,
    xdg_root: Option<PathBuf>,
    system_root: PathBuf,
) -> (Option<PathBuf>, ConfigSource) {
    // 1. CLI argument
    if let Some(path) = cli_path {
        return (Some(path.to_path_buf()), ConfigSource::CliArgument);
    }

    // 2. Environment variable
    if let Some(path) = env_path.filter(|p| p.exists()) {
        return (Some(path), ConfigSource::Environment);
    }

    // 3. XDG config directory
    if let Some(xdg) = xdg_root {
        let path = xdg.join(APP_NAME).join(CONFIG_FILENAME);
        if path.exists() {
            return (Some(path), ConfigSource::XdgConfig);
        }
    }

    // 4. System config
    let system_path = system_root.join(APP_NAME).join(CONFIG_FILENAME);
    if system_path.exists() {
        return (Some(system_path), ConfigSource::SystemConfig);
    }

    // 5. Built-in defaults
    (None, ConfigSource::BuiltinDefault)
}

/// Resolve and load the configuration.
pub fn load_config(cli_path: Option<&Path>) -> ConfigResult<ResolvedConfig> {
    let (path, source) = resolve_config_path(cli_path);
    let config = match &path {
        Some(p) => LifecycleConfig::load(p)?,
        None => LifecycleConfig::default(),
    };
    Ok(ResolvedConfig {
        config,
        path,
        source,
    })
}

/// Get the XDG config directory for the lifecycle manager.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_source_display() {
        assert_eq!(format!("{}", ConfigSource::CliArgument), "CLI argument");
        assert_eq!(
            format!("{}", ConfigSource::Environment),
            "environment variable"
        );
        assert_eq!(format!("{}", ConfigSource::BuiltinDefault), "builtin default");
    }

    #[test]
    fn test_cli_wins_even_if_missing() {
        let (path, source) = resolve_with(
            Some(Path::new("/nonexistent/config.json")),
            None,
            None,
            PathBuf::from("/nonexistent"),
        );
        assert_eq!(source, ConfigSource::CliArgument);
        assert_eq!(path, Some(PathBuf::from("/nonexistent/config.json")));
    }

    #[test]
    fn test_env_then_xdg_then_system() {
        let tmp = TempDir::new().unwrap();
        let xdg = tmp.path().join("xdg");
        let sys = tmp.path().join("etc");
        std::fs::create_dir_all(xdg.join(APP_NAME)).unwrap();
        std::fs::create_dir_all(sys.join(APP_NAME)).unwrap();
        std::fs::write(sys.join(APP_NAME).join(CONFIG_FILENAME), "{}").unwrap();

        let (_, source) = resolve_with(None, None, Some(xdg.clone()), sys.clone());
        assert_eq!(source, ConfigSource::SystemConfig);

        std::fs::write(xdg.join(APP_NAME).join(CONFIG_FILENAME), "{}").unwrap();
        let (_, source) = resolve_with(None, None, Some(xdg.clone()), sys.clone());
        assert_eq!(source, ConfigSource::XdgConfig);

        let env_file = tmp.path().join("env.json");
        std::fs::write(&env_file, "{}").unwrap();
        let (path, source) = resolve_with(None, Some(env_file.clone()), Some(xdg), sys);
        assert_eq!(source, ConfigSource::Environment);
        assert_eq!(path, Some(env_file));
    }

    #[test]
    fn test_defaults_when_nothing_found() {
        let tmp = TempDir::new().unwrap();
        let (path, source) = resolve_with(None, None, None, tmp.path().to_path_buf());
        assert!(path.is_none());
        assert_eq!(source, ConfigSource::BuiltinDefault);
    }

    #[test]
    fn test_load_reports_parse_error() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("bad.json");
        std::fs::write(&file, "{ not json").unwrap();
        let err = load_config(Some(&file)).unwrap_err();
        assert_eq!(err.code(), 61);
    }
}
