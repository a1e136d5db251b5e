//! Component Lifecycle Core Library
//!
//! This library drives install, upgrade, and uninstall of the backup server
//! and client components:
//! - Platform key resolution and the [`host::HostOps`] seam
//! - Command running with dry-run support
//! - Artifact resolution and installed-state detection
//! - The lifecycle orchestrator with backup and rollback
//!
//! The binary entry point is in `main.rs`.

pub mod artifact;
pub mod detect;
pub mod driver;
pub mod env;
pub mod exit_codes;
pub mod host;
pub mod logging;
pub mod marker;
pub mod orchestrator;
pub mod platform;
pub mod recovery;
pub mod runner;
pub mod services;

pub use orchestrator::Orchestrator;
