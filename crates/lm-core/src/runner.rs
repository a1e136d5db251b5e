//! Command runner.
//!
//! Every external command the orchestrator issues goes through
//! [`CommandRunner::run`]. It never fails: spawn errors, timeouts, and signals
//! all come back as a [`CommandResult`] with a non-zero rc, so callers treat
//! every invocation the same way.

use crate::host::{HostOps, Invocation};
use crate::logging::events::event_names;
use lm_common::OsKey;
use std::time::Duration;
use tracing::{info, warn};

/// rc reported when the process could not be started.
pub const RC_NOT_STARTED: i32 = 127;
/// rc reported when the process hit the runner timeout.
pub const RC_TIMEOUT: i32 = 124;
/// rc reported when the process died from a signal.
pub const RC_KILLED: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
enum CommandLine {
    Line(String),
    Argv(Vec<String>),
}

/// A command to run, as a single line or an argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    line: CommandLine,
    display: Option<String>,
}

impl CommandSpec {
    /// A full command line. Quoted paths are honored when tokenizing.
    pub fn line(line: impl Into<String>) -> Self {
        CommandSpec {
            line: CommandLine::Line(line.into()),
            display: None,
        }
    }

    pub fn argv<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec {
            line: CommandLine::Argv(args.into_iter().map(Into::into).collect()),
            display: None,
        }
    }

    /// Log `display` instead of the real command (for secrets).
    pub fn redacted(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    /// What gets logged.
    pub fn rendered(&self) -> String {
        if let Some(display) = &self.display {
            return display.clone();
        }
        match &self.line {
            CommandLine::Line(line) => line.clone(),
            CommandLine::Argv(args) => join_quoted(args),
        }
    }

    /// Platform-appropriate invocation. `None` when a Unix line cannot be
    /// tokenized (unbalanced quotes) or is empty.
    fn invocation(&self, os_key: &OsKey) -> Option<Invocation> {
        if os_key.is_windows() {
            // cmd parses its own command line; hand it over whole.
            let line = match &self.line {
                CommandLine::Line(line) => line.clone(),
                CommandLine::Argv(args) => join_quoted(args),
            };
            return (!line.trim().is_empty()).then_some(Invocation::Shell(line));
        }
        let mut tokens = match &self.line {
            CommandLine::Line(line) => shlex::split(line)?,
            CommandLine::Argv(args) => args.clone(),
        };
        if tokens.is_empty() {
            return None;
        }
        let program = tokens.remove(0);
        Some(Invocation::Argv {
            program,
            args: tokens,
        })
    }
}

fn join_quoted(args: &[String]) -> String {
    args.iter()
        .map(|a| {
            let already_quoted = a.len() >= 2 && a.starts_with('"') && a.ends_with('"');
            if !already_quoted && (a.is_empty() || a.contains(char::is_whitespace)) {
                format!("\"{}\"", a)
            } else {
                a.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Outcome of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub rc: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.rc == 0
    }

    fn not_started(message: String) -> Self {
        CommandResult {
            rc: RC_NOT_STARTED,
            stderr: message,
            ..Default::default()
        }
    }

    /// Short failure description for messages: stderr, else stdout, else rc.
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.lines().last().unwrap_or(stdout).to_string();
        }
        if self.timed_out {
            "timed out".to_string()
        } else {
            format!("exit code {}", self.rc)
        }
    }
}

/// Runs commands on a host with the run's platform dialect and dry-run flag.
pub struct CommandRunner<'h> {
    host: &'h dyn HostOps,
    os_key: OsKey,
    dry_run: bool,
    timeout: Option<Duration>,
}

impl<'h> CommandRunner<'h> {
    pub fn new(host: &'h dyn HostOps, os_key: OsKey) -> Self {
        CommandRunner {
            host,
            os_key,
            dry_run: false,
            timeout: None,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn os_key(&self) -> &OsKey {
        &self.os_key
    }

    pub fn run(&self, spec: &CommandSpec) -> CommandResult {
        let rendered = spec.rendered();

        if self.dry_run {
            info!(
                target: event_names::EXEC_DRY_RUN,
                command = %rendered,
                "[DRY-RUN] Would run: {}",
                rendered
            );
            return CommandResult::default();
        }

        let result = match spec.invocation(&self.os_key) {
            None => CommandResult::not_started(format!("cannot parse command line: {}", rendered)),
            Some(invocation) => match self.host.execute(&invocation, self.timeout) {
                Ok(out) => CommandResult {
                    rc: if out.timed_out {
                        RC_TIMEOUT
                    } else {
                        out.rc.unwrap_or(RC_KILLED)
                    },
                    stdout: out.stdout,
                    stderr: out.stderr,
                    timed_out: out.timed_out,
                },
                Err(e) => CommandResult::not_started(e.to_string()),
            },
        };

        if result.success() {
            info!(
                target: event_names::EXEC_OK,
                command = %rendered,
                rc = result.rc,
                "Exec OK: {}",
                rendered
            );
        } else {
            warn!(
                target: event_names::EXEC_FAILED,
                command = %rendered,
                rc = result.rc,
                timed_out = result.timed_out,
                stderr = %result.stderr.trim(),
                "Exec failed (rc={}): {}",
                result.rc,
                rendered
            );
        }
        result
    }

    /// Run and return stdout only when rc is 0.
    pub fn output(&self, spec: &CommandSpec) -> Option<String> {
        let result = self.run(spec);
        result.success().then_some(result.stdout)
    }
}
