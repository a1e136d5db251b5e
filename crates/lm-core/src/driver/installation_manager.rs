//! Driver for components installed through the vendor installation manager.

use super::response_file::{ResponseFile, RESPONSE_FILE_NAME};
use super::{extract, previous_installer, steps_for, PackageDriver};
use crate::detect::{imcl_path, installation_manager_dir, Detection};
use crate::env::RunEnv;
use crate::logging::events::event_names;
use crate::recovery::BackupSet;
use crate::runner::{CommandResult, CommandSpec, RC_NOT_STARTED};
use lm_common::{Artifact, Error, PackageStep, Result, Secret};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct InstallationManagerDriver;

impl InstallationManagerDriver {
    fn imcl(&self, env: &RunEnv<'_>) -> PathBuf {
        let dir = installation_manager_dir(env.probe_host, env.config, &env.os_key);
        imcl_path(&dir, &env.os_key)
    }

    fn uninstall_command(&self, env: &RunEnv<'_>, offering: &str) -> CommandSpec {
        CommandSpec::argv([
            self.imcl(env).to_string_lossy().into_owned(),
            "uninstall".to_string(),
            offering.to_string(),
            "-installationDirectory".to_string(),
            env.ctx.install_dir.to_string_lossy().into_owned(),
            "-s".to_string(),
        ])
    }

    fn run_installer(&self, env: &RunEnv<'_>, staging: &Path, response: &Path) -> CommandResult {
        if env.os_key.is_windows() {
            let script = staging.join("install.bat");
            return env.runner.run(&CommandSpec::line(format!(
                "\"{}\" -s -input \"{}\" -acceptLicense",
                script.display(),
                response.display()
            )));
        }

        let script = staging.join("install.sh");
        if env.os_key.is_linux() {
            let fixed = env.runner.run(&CommandSpec::argv([
                "dos2unix".to_string(),
                script.to_string_lossy().into_owned(),
            ]));
            if !fixed.success() {
                debug!(error = %fixed.error_text(), "dos2unix skipped");
            }
        }
        env.runner.run(&CommandSpec::argv([
            script.to_string_lossy().into_owned(),
            "-s".to_string(),
            "-input".to_string(),
            response.to_string_lossy().into_owned(),
            "-acceptLicense".to_string(),
        ]))
    }
}

impl PackageDriver for InstallationManagerDriver {
    fn deploy(&self, env: &RunEnv<'_>, artifact: &Artifact) -> Result<()> {
        if !env.host.exists(&artifact.path) {
            return Err(Error::DeployFailed(format!(
                "installer {} does not exist",
                artifact.path.display()
            )));
        }
        info!(
            target: event_names::DEPLOY_STARTED,
            artifact = %artifact.file_name(),
            install_dir = %env.ctx.install_dir.display(),
            "deploying through the installation manager"
        );

        let staging = env.staging_dir();
        extract(env, &artifact.path, &staging)?;

        let settings = env.component.response.clone().unwrap_or_default();
        let repository = {
            let configured = Path::new(&settings.repository);
            if configured.is_absolute() {
                configured.to_path_buf()
            } else {
                staging.join(configured)
            }
        };
        let document = ResponseFile {
            settings: &settings,
            offerings: env.component.enabled_offerings().collect(),
            install_dir: &env.ctx.install_dir,
            repository: &repository,
            password: env.ctx.secret.as_ref().map(Secret::expose).unwrap_or(""),
        }
        .render();

        let input_dir = staging.join("input");
        let response = input_dir.join(RESPONSE_FILE_NAME);
        env.host.create_dir_all(&input_dir)?;
        env.host.write_file(&response, document.as_bytes())?;

        let result = self.run_installer(env, &staging, &response);

        // The response file holds the installer password.
        if let Err(e) = env.host.remove_file(&response) {
            warn!(path = %response.display(), error = %e, "could not remove response file");
        }

        if !result.success() {
            return Err(Error::DeployFailed(format!(
                "installer exited with rc {}: {}",
                result.rc,
                result.error_text()
            )));
        }
        Ok(())
    }

    fn archive_sources(&self, env: &RunEnv<'_>, installed_version: Option<&str>) -> Vec<PathBuf> {
        previous_installer(env, None, installed_version)
            .map(|a| vec![a.path])
            .unwrap_or_default()
    }

    fn is_present(&self, _env: &RunEnv<'_>, package: &str, detection: &Detection) -> bool {
        detection.has_package(package)
    }

    fn remove(&self, env: &RunEnv<'_>, package: &str) -> CommandResult {
        env.runner.run(&self.uninstall_command(env, package))
    }

    fn force_remove(&self, env: &RunEnv<'_>, package: &str) -> CommandResult {
        // imcl has no forced mode; a silent uninstall is the strongest it does.
        env.runner.run(&self.uninstall_command(env, package))
    }

    fn restore(
        &self,
        env: &RunEnv<'_>,
        backup: Option<&BackupSet>,
        packages: &[String],
        previous_version: Option<&str>,
    ) -> Vec<PackageStep> {
        let Some(installer) = previous_installer(env, backup, previous_version) else {
            return packages
                .iter()
                .map(|package| PackageStep {
                    package: package.clone(),
                    action: "reinstall".to_string(),
                    rc: RC_NOT_STARTED,
                    stderr: "no installer available to reinstall from".to_string(),
                })
                .collect();
        };
        let outcome = env
            .host
            .create_dir_all(&env.ctx.install_dir)
            .map_err(Error::from)
            .and_then(|_| self.deploy(env, &installer));
        if let Err(e) = &outcome {
            warn!(installer = %installer.file_name(), error = %e, "reinstall failed");
        }
        steps_for(packages, "reinstall", &outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::artifact_at;
    use crate::env::TestBed;
    use crate::host::{ExecOutput, FakeHost, Mutation};
    use lm_common::{Mode, OsKey};

    const ARTIFACT: &str = "/art/8.1.20-server-linux.bin";

    fn bed() -> TestBed {
        let mut bed = TestBed::new("server", Mode::Install);
        bed.ctx.secret = Some(Secret::new("s3cr3t"));
        bed
    }

    #[test]
    fn test_deploy_linux_sequence() {
        let host = FakeHost::linux();
        host.add_file(ARTIFACT, b"");
        let bed = bed();
        let env = bed.env(&host);

        InstallationManagerDriver
            .deploy(&env, &artifact_at(&OsKey::Linux, Path::new(ARTIFACT)))
            .unwrap();

        assert_eq!(
            host.commands(),
            vec![
                format!("{ARTIFACT} -q -d /art/extracted"),
                "dos2unix /art/extracted/install.sh".to_string(),
                "/art/extracted/install.sh -s -input /art/extracted/input/install_response.xml -acceptLicense"
                    .to_string(),
            ]
        );
        let response = PathBuf::from("/art/extracted/input/install_response.xml");
        assert!(host.mutations().contains(&Mutation::Write(response.clone())));
        assert!(host.mutations().contains(&Mutation::RemoveFile(response.clone())));
        assert!(host.file(&response).is_none());
        assert!(host.commands().iter().all(|c| !c.contains("s3cr3t")));
    }

    #[test]
    fn test_deploy_failure_still_removes_response() {
        let host = FakeHost::linux();
        host.add_file(ARTIFACT, b"");
        host.respond("install.sh -s", ExecOutput::failed(3, "CRIMA1217E offering missing"));
        let bed = bed();
        let env = bed.env(&host);

        let err = InstallationManagerDriver
            .deploy(&env, &artifact_at(&OsKey::Linux, Path::new(ARTIFACT)))
            .unwrap_err();
        assert!(matches!(err, Error::DeployFailed(_)));
        assert!(err.to_string().contains("CRIMA1217E"));
        assert!(host
            .file("/art/extracted/input/install_response.xml")
            .is_none());
    }

    #[test]
    fn test_dos2unix_failure_is_ignored() {
        let host = FakeHost::linux();
        host.add_file(ARTIFACT, b"");
        host.fail_spawn("dos2unix");
        let bed = bed();
        let env = bed.env(&host);
        InstallationManagerDriver
            .deploy(&env, &artifact_at(&OsKey::Linux, Path::new(ARTIFACT)))
            .unwrap();
    }

    #[test]
    fn test_deploy_missing_artifact() {
        let host = FakeHost::linux();
        let bed = bed();
        let env = bed.env(&host);
        let err = InstallationManagerDriver
            .deploy(&env, &artifact_at(&OsKey::Linux, Path::new(ARTIFACT)))
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
        assert!(host.commands().is_empty());
    }

    #[test]
    fn test_windows_deploy_uses_whole_lines() {
        let host = FakeHost::windows();
        let artifact = r"C:\art\8.1.20-server-win.exe";
        host.add_file(artifact, b"");
        let mut bed = bed();
        bed.ctx.artifacts_base_dir = PathBuf::from(r"C:\art");
        let env = bed.env(&host);

        InstallationManagerDriver
            .deploy(&env, &artifact_at(&OsKey::Windows, Path::new(artifact)))
            .unwrap();
        let commands = host.commands();
        assert_eq!(commands.len(), 2);
        assert!(commands[0].starts_with(&format!("\"{artifact}\" -q -d \"")));
        assert!(commands[1].contains("install.bat\" -s -input \""));
        assert!(commands[1].ends_with("-acceptLicense"));
    }

    #[test]
    fn test_remove_uses_imcl_uninstall() {
        let host = FakeHost::linux();
        let bed = bed();
        let env = bed.env(&host);
        let result = InstallationManagerDriver.remove(&env, "com.tivoli.dsm.ossm");
        assert!(result.success());
        assert_eq!(
            host.commands(),
            vec![
                "/opt/IBM/InstallationManager/eclipse/tools/imcl uninstall com.tivoli.dsm.ossm \
                 -installationDirectory /opt/ba-server -s"
                    .to_string()
            ]
        );
    }

    #[test]
    fn test_restore_without_installer_reports_each_package() {
        let host = FakeHost::linux();
        host.add_dir("/art");
        let bed = bed();
        let env = bed.env(&host);
        let packages = vec!["com.tivoli.dsm.server".to_string(), "com.tivoli.dsm.ossm".to_string()];
        let steps = InstallationManagerDriver.restore(&env, None, &packages, Some("8.1.19"));
        assert_eq!(steps.len(), 2);
        assert!(steps.iter().all(|s| s.rc == RC_NOT_STARTED));
        assert!(host.commands().is_empty());
    }

    #[test]
    fn test_restore_from_earlier_artifact() {
        let host = FakeHost::linux();
        host.add_file("/art/8.1.19-server-linux.bin", b"");
        host.add_file("/art/8.1.20-server-linux.bin", b"");
        let bed = bed();
        let env = bed.env(&host);
        let packages = vec!["com.tivoli.dsm.server".to_string()];
        let steps =
            InstallationManagerDriver.restore(&env, None, &packages, Some("8.1.19.0_20230101"));
        assert_eq!(steps.len(), 1);
        assert!(steps[0].ok());
        assert_eq!(
            host.commands()[0],
            "/art/8.1.19-server-linux.bin -q -d /art/extracted"
        );
    }
}
