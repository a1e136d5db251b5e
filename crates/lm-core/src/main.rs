//! Component Lifecycle Core - install, upgrade, and uninstall with rollback
//!
//! The main entry point for lm-core, handling:
//! - Lifecycle runs (install / upgrade / uninstall)
//! - Installed-state and backup inspection
//! - Artifact resolution previews
//! - Precondition checks and configuration display

use clap::{Args, Parser, Subcommand};
use lm_common::{format_error_human, Error, Mode, OperationContext, OperationResult, OsKey, OutputFormat, Secret};
use lm_config::{load_config, ConfigError, ResolvedConfig};
use lm_core::artifact::ArtifactResolver;
use lm_core::exit_codes::ExitCode;
use lm_core::host::SystemHost;
use lm_core::logging::{generate_run_id, init_logging, LogConfig, LogFormat, LogLevel};
use lm_core::platform::resolve_os_key;
use lm_core::recovery::BackupManager;
use lm_core::Orchestrator;
use std::io::IsTerminal;
use std::path::PathBuf;

/// Environment variables checked, in order, for the installer password.
const SECRET_ENV_VARS: [&str; 2] = ["LM_INSTALLER_PASSWORD", "SP_BA_SERVER_PASSWORD"];

/// Component Lifecycle Core - install, upgrade, and uninstall with rollback
#[derive(Parser)]
#[command(name = "lm-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Config file (overrides LM_CONFIG and the standard locations)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "human")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Log format
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Simulate without changing the host
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install, upgrade, or uninstall a component
    #[command(disable_version_flag = true)]
    Run(RunArgs),

    /// Show installed state, version marker, and kept backup sets
    Status(ComponentArgs),

    /// Preview which installer artifact would be chosen
    #[command(disable_version_flag = true)]
    Resolve(ResolveArgs),

    /// Run precondition checks without acting on them
    Check(ComponentArgs),

    /// Configuration management
    Config(ConfigArgs),
}

// ============================================================================
// Command argument structs
// ============================================================================

#[derive(Args, Debug)]
struct RunArgs {
    /// Lifecycle operation
    #[arg(long, value_enum)]
    mode: Mode,

    /// Component id from the catalog (e.g. server, client)
    #[arg(long)]
    component: String,

    /// Desired version; newest available when omitted
    #[arg(long = "version")]
    desired_version: Option<String>,

    /// Directory holding installer artifacts
    #[arg(long, default_value = ".")]
    artifacts_dir: PathBuf,

    /// Install directory; platform default when omitted
    #[arg(long)]
    install_dir: Option<PathBuf>,

    /// Installer password (LM_INSTALLER_PASSWORD and SP_BA_SERVER_PASSWORD are checked first)
    #[arg(long)]
    installer_password: Option<String>,
}

#[derive(Args, Debug)]
struct ComponentArgs {
    /// Component id from the catalog
    #[arg(long)]
    component: String,

    /// Install directory; platform default when omitted
    #[arg(long)]
    install_dir: Option<PathBuf>,

    /// Directory holding installer artifacts
    #[arg(long, default_value = ".")]
    artifacts_dir: PathBuf,

    /// Installer password, for the secret check
    #[arg(long)]
    installer_password: Option<String>,
}

#[derive(Args, Debug)]
struct ResolveArgs {
    /// Directory holding installer artifacts
    #[arg(long)]
    artifacts_dir: PathBuf,

    /// Exact version to look for; newest when omitted
    #[arg(long = "version")]
    desired_version: Option<String>,

    /// Platform key to resolve for; this host's when omitted
    #[arg(long)]
    os_key: Option<OsKey>,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the resolved configuration
    Show,
}

fn main() {
    let cli = Cli::parse();

    let cli_level = if cli.global.quiet {
        Some(LogLevel::Error)
    } else {
        match cli.global.verbose {
            0 => None,
            1 => Some(LogLevel::Debug),
            _ => Some(LogLevel::Trace),
        }
    };
    let log_config =
        LogConfig::from_env(cli_level, cli.global.log_format).with_file(cli.global.log_file.clone());
    if let Err(e) = init_logging(&log_config) {
        eprintln!("lm-core: cannot open log file: {}", e);
        std::process::exit(ExitCode::IoError.as_i32());
    }

    let exit_code = match load_config(cli.global.config.as_deref()) {
        Err(e) => output_config_error(&cli.global, &e),
        Ok(resolved) => {
            tracing::debug!(
                target: lm_core::logging::event_names::CONFIG_LOADED,
                source = %resolved.source,
                path = ?resolved.path,
                "configuration loaded"
            );
            match &cli.command {
                Commands::Run(args) => run_lifecycle(&cli.global, &resolved, args),
                Commands::Status(args) => run_status(&cli.global, &resolved, args),
                Commands::Resolve(args) => run_resolve(&cli.global, &resolved, args),
                Commands::Check(args) => run_check(&cli.global, &resolved, args),
                Commands::Config(args) => match args.command {
                    ConfigCommands::Show => run_config_show(&cli.global, &resolved),
                },
            }
        }
    };

    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// Command implementations
// ============================================================================

fn run_lifecycle(global: &GlobalOpts, resolved: &ResolvedConfig, args: &RunArgs) -> ExitCode {
    let ctx = OperationContext::new(args.mode, &args.component)
        .with_run_id(generate_run_id())
        .with_artifacts_dir(&args.artifacts_dir)
        .with_install_dir(args.install_dir.clone().unwrap_or_default())
        .with_secret(resolve_secret(args.installer_password.as_deref(), |name| {
            std::env::var(name).ok()
        }))
        .with_dry_run(global.dry_run);
    let ctx = match args.desired_version.as_deref().filter(|v| !v.trim().is_empty()) {
        Some(v) => ctx.with_desired_version(v),
        None => ctx,
    };

    let host = SystemHost::new();
    let result = Orchestrator::new(&host, &resolved.config).run(&ctx);
    print_result(global, &result);
    ExitCode::for_result(&result)
}

fn run_status(global: &GlobalOpts, resolved: &ResolvedConfig, args: &ComponentArgs) -> ExitCode {
    let host = SystemHost::new();
    let ctx = component_context(Mode::Install, args, global);
    let (detection, marker) = match Orchestrator::new(&host, &resolved.config).status(&ctx) {
        Ok(state) => state,
        Err(e) => return output_error(global, &e),
    };
    let backups = BackupManager::new(&host, resolved.config.backup_root()).list(&args.component);

    match global.format {
        OutputFormat::Json => {
            let manifests: Vec<_> = backups
                .iter()
                .map(|b| {
                    serde_json::json!({
                        "path": b.root,
                        "manifest": b.manifest,
                    })
                })
                .collect();
            print_json(&serde_json::json!({
                "component": args.component,
                "installed": detection.status,
                "version": detection.version,
                "packages": detection.installed_packages,
                "marker": marker,
                "message": detection.message,
                "backups": manifests,
            }));
        }
        OutputFormat::Human => {
            println!("{}: {}", args.component, detection.message);
            for (package, version) in &detection.installed_packages {
                println!("  {:<24} {}", package, version);
            }
            println!("  version marker: {}", marker.as_deref().unwrap_or("none"));
            if backups.is_empty() {
                println!("  backup sets: none");
            }
            for set in &backups {
                println!(
                    "  backup set {} (previous version {}, {} package archive(s))",
                    set.root.display(),
                    set.manifest.previous_version.as_deref().unwrap_or("unknown"),
                    set.manifest.packages.len()
                );
            }
        }
    }
    ExitCode::Success
}

fn run_resolve(global: &GlobalOpts, resolved: &ResolvedConfig, args: &ResolveArgs) -> ExitCode {
    let host = SystemHost::new();
    let os_key = args
        .os_key
        .clone()
        .unwrap_or_else(|| resolve_os_key(&host).1);
    let resolver = ArtifactResolver::new(&host).case_insensitive(resolved.config.artifacts.case_insensitive);

    match resolver.find_best(&os_key, &args.artifacts_dir, args.desired_version.as_deref()) {
        Ok(resolution) => {
            match global.format {
                OutputFormat::Json => print_json(&resolution),
                OutputFormat::Human => {
                    println!(
                        "{} (version {}, {:?})",
                        resolution.artifact.path.display(),
                        resolution.artifact.version_label,
                        resolution.selection
                    );
                    for alternate in &resolution.alternates {
                        println!("  also matched: {}", alternate.display());
                    }
                }
            }
            ExitCode::Success
        }
        Err(e) => output_error(global, &Error::from(e)),
    }
}

fn run_check(global: &GlobalOpts, resolved: &ResolvedConfig, args: &ComponentArgs) -> ExitCode {
    let host = SystemHost::new();
    let ctx = component_context(Mode::Install, args, global);
    let report = match Orchestrator::new(&host, &resolved.config).preflight(&ctx) {
        Ok(report) => report,
        Err(e) => return output_error(global, &e),
    };

    match global.format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Human => {
            for check in &report.checks {
                let mark = if check.passed { "ok  " } else { "FAIL" };
                println!("[{}] {:<14} {}", mark, check.name, check.detail);
            }
        }
    }
    if report.passed() {
        ExitCode::Success
    } else {
        ExitCode::PreconditionFailed
    }
}

fn run_config_show(global: &GlobalOpts, resolved: &ResolvedConfig) -> ExitCode {
    let source = match &resolved.path {
        Some(path) => format!("{} ({})", resolved.source, path.display()),
        None => resolved.source.to_string(),
    };
    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "source": source,
            "config": resolved.config,
        })),
        OutputFormat::Human => {
            println!("# source: {}", source);
            print_json(&resolved.config);
        }
    }
    ExitCode::Success
}

// ============================================================================
// Helpers
// ============================================================================

/// Installer password from the environment first, then the flag. Empty
/// values count as unset.
fn resolve_secret<F>(flag: Option<&str>, env: F) -> Option<Secret>
where
    F: Fn(&str) -> Option<String>,
{
    SECRET_ENV_VARS
        .iter()
        .find_map(|name| env(name).filter(|v| !v.is_empty()))
        .or_else(|| flag.map(str::to_string))
        .map(Secret::new)
        .filter(|s| !s.is_empty())
}

fn component_context(mode: Mode, args: &ComponentArgs, global: &GlobalOpts) -> OperationContext {
    OperationContext::new(mode, &args.component)
        .with_run_id(generate_run_id())
        .with_artifacts_dir(&args.artifacts_dir)
        .with_install_dir(args.install_dir.clone().unwrap_or_default())
        .with_secret(resolve_secret(args.installer_password.as_deref(), |name| {
            std::env::var(name).ok()
        }))
        .with_dry_run(global.dry_run)
}

fn print_result(global: &GlobalOpts, result: &OperationResult) {
    match global.format {
        OutputFormat::Json => {
            print_json(result);
            // stdout carries the payload alone
            eprintln!("{}", result.status_line());
        }
        OutputFormat::Human => {
            if let Some(prev) = &result.previous_version {
                println!("  previous version: {}", prev);
            }
            if let Some(new) = &result.new_version {
                println!("  new version:      {}", new);
            }
            if !result.removed_packages.is_empty() {
                println!("  removed:          {}", result.removed_packages.join(", "));
            }
            if !result.failed_packages.is_empty() {
                println!("  failed:           {}", result.failed_packages.join(", "));
            }
            if let Some(report) = &result.rollback {
                println!("  rollback:         {} ({})", report.status, report.message);
                for step in report.packages.iter().filter(|s| !s.ok()) {
                    println!("    {} {} rc={} {}", step.action, step.package, step.rc, step.stderr);
                }
            }
            println!("{}", result.status_line());
        }
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("lm-core: cannot serialize output: {}", e),
    }
}

fn output_error(global: &GlobalOpts, err: &Error) -> ExitCode {
    match global.format {
        OutputFormat::Json => {
            let structured = lm_common::StructuredError::from(err);
            println!("{}", structured.to_json());
        }
        OutputFormat::Human => {
            eprintln!("{}", format_error_human(err, std::io::stderr().is_terminal()));
        }
    }
    ExitCode::for_error(err)
}

fn output_config_error(global: &GlobalOpts, error: &ConfigError) -> ExitCode {
    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "error": {
                "code": error.code(),
                "message": error.to_string(),
            }
        })),
        OutputFormat::Human => eprintln!("lm-core: configuration error: {}", error),
    }
    ExitCode::ConfigError
}
