//! Best-effort service and process control.
//!
//! Failures are logged as warnings and returned for the caller to report;
//! none of them abort a run.

use crate::logging::events::event_names;
use crate::runner::{CommandRunner, CommandSpec};
use lm_config::ComponentSpec;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Stop,
    Start,
}

impl Action {
    fn verb(self) -> &'static str {
        match self {
            Action::Stop => "stop",
            Action::Start => "start",
        }
    }
}

fn service_command(runner: &CommandRunner<'_>, action: Action, service: &str) -> CommandSpec {
    if runner.os_key().is_windows() {
        CommandSpec::argv(["sc", action.verb(), service])
    } else {
        CommandSpec::argv(["systemctl", action.verb(), service])
    }
}

fn kill_command(runner: &CommandRunner<'_>, process: &str) -> CommandSpec {
    if runner.os_key().is_windows() {
        let image = if process.to_ascii_lowercase().ends_with(".exe") {
            process.to_string()
        } else {
            format!("{}.exe", process)
        };
        CommandSpec::argv(["taskkill".to_string(), "/F".into(), "/IM".into(), image])
    } else {
        CommandSpec::argv(["killall", process])
    }
}

fn control(runner: &CommandRunner<'_>, what: &str, spec: CommandSpec) -> Option<String> {
    let result = runner.run(&spec);
    if result.success() {
        info!(target: event_names::SERVICE_CONTROL, what, "{} done", what);
        None
    } else {
        let warning = format!("{} failed: {}", what, result.error_text());
        warn!(target: event_names::SERVICE_CONTROL, what, rc = result.rc, "{}", warning);
        Some(warning)
    }
}

/// Stop services and terminate processes. Returns warnings.
pub fn stop_all(runner: &CommandRunner<'_>, component: &ComponentSpec) -> Vec<String> {
    let services = component.services.iter().filter_map(|svc| {
        control(
            runner,
            &format!("stop service {}", svc),
            service_command(runner, Action::Stop, svc),
        )
    });
    let processes = component.processes.iter().filter_map(|p| {
        control(runner, &format!("terminate {}", p), kill_command(runner, p))
    });
    services.chain(processes).collect()
}

/// Start services after a deploy. Returns warnings.
pub fn start_all(runner: &CommandRunner<'_>, component: &ComponentSpec) -> Vec<String> {
    component
        .services
        .iter()
        .filter_map(|svc| {
            control(
                runner,
                &format!("start service {}", svc),
                service_command(runner, Action::Start, svc),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ExecOutput, FakeHost};
    use lm_common::OsKey;

    #[test]
    fn test_stop_linux() {
        let host = FakeHost::rhel();
        host.respond("killall", ExecOutput::failed(1, "dsmc: no process found"));
        let runner = CommandRunner::new(&host, OsKey::Rhel);
        let warnings = stop_all(&runner, &ComponentSpec::builtin_client());
        assert_eq!(
            host.commands(),
            vec!["systemctl stop dsmcad".to_string(), "killall dsmc".to_string()]
        );
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("no process found"));
    }

    #[test]
    fn test_stop_and_start_windows() {
        let host = FakeHost::windows();
        let runner = CommandRunner::new(&host, OsKey::Windows);
        let client = ComponentSpec::builtin_client();
        assert!(stop_all(&runner, &client).is_empty());
        assert!(start_all(&runner, &client).is_empty());
        assert_eq!(
            host.commands(),
            vec![
                "sc stop dsmcad".to_string(),
                "taskkill /F /IM dsmc.exe".to_string(),
                "sc start dsmcad".to_string(),
            ]
        );
    }

    #[test]
    fn test_no_services_no_commands() {
        let host = FakeHost::linux();
        let runner = CommandRunner::new(&host, OsKey::Linux);
        assert!(stop_all(&runner, &ComponentSpec::builtin_server()).is_empty());
        assert!(host.commands().is_empty());
    }
}
