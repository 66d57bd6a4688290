/// Install/update pass run once before the server starts listening.
///
/// Missing artifacts trigger an interactive install; a present install is
/// checked against the remote version string and optionally replaced.
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use htmc_ws_shared::config::Config;
use htmc_ws_shared::errors::{PermissionError, SyncError};
use htmc_ws_shared::prompt::Confirm;

use crate::artifacts::{Artifact, ArtifactKind, ArtifactSet};
use crate::fetch::Fetcher;
use crate::perms::mark_executable;
use crate::version::{UpdateCheck, VersionProbe, VERSION_TIMEOUT};

pub const MANUAL_STEPS: [&str; 6] = [
    "Go to <https://github.com/Alessandro-Salerno/htmc> and download the latest release or latest-linux-bundle branch files",
    "Place the htmc executable (htmc or htmc.exe) in the bin/ directory",
    "Place the libhtmc.a file in the bin/ directory",
    "Copy the include/ directory in the working directory",
    "Make sure that include/libhtmc/libhtmc.h exists and is the libhtmc header file",
    "Make sure that GCC and GNU ld are installed",
];

pub fn print_manual_steps() {
    println!("To install htmc manually:");
    for (i, step) in MANUAL_STEPS.iter().enumerate() {
        println!("\t{}. {}", i + 1, step);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Installed,
    /// Operator refused the install; nothing was downloaded.
    InstallDeclined,
    UpToDate,
    Updated,
    UpdateDeclined,
    /// Version could not be determined; existing files are kept.
    UpdateCheckFailed,
    /// Some replacements failed; each listed file still holds its old version.
    UpdateIncomplete { failed: Vec<PathBuf> },
}

impl SyncOutcome {
    pub fn should_serve(&self) -> bool {
        !matches!(self, SyncOutcome::InstallDeclined)
    }

    /// Nothing is known to be pending: "All up to date" is printed.
    ///
    /// A failed check counts, since no update was found. A declined or
    /// partial update does not.
    pub fn is_current(&self) -> bool {
        matches!(
            self,
            SyncOutcome::Installed
                | SyncOutcome::UpToDate
                | SyncOutcome::Updated
                | SyncOutcome::UpdateCheckFailed
        )
    }
}

type MarkExecutable = fn(&Path) -> Result<(), PermissionError>;

pub struct Synchronizer<'a> {
    artifacts: ArtifactSet,
    probe: VersionProbe,
    fetcher: Fetcher,
    confirm: &'a dyn Confirm,
    mark_executable: MarkExecutable,
}

impl<'a> Synchronizer<'a> {
    pub fn new(config: &Config, confirm: &'a dyn Confirm) -> Result<Self, SyncError> {
        let layout = &config.layout;
        Ok(Self {
            artifacts: ArtifactSet::new(layout, &config.remote.base_url),
            probe: VersionProbe {
                exec: layout.exec_path(),
                workdir: layout.root().to_path_buf(),
                version_url: config.remote.version_url.clone(),
                timeout: VERSION_TIMEOUT,
            },
            fetcher: Fetcher::new(config.remote.http_timeout)?,
            confirm,
            mark_executable,
        })
    }

    #[cfg(test)]
    fn with_mark_executable(mut self, mark: MarkExecutable) -> Self {
        self.mark_executable = mark;
        self
    }

    pub fn artifacts(&self) -> &ArtifactSet {
        &self.artifacts
    }

    pub async fn run(&self) -> Result<SyncOutcome, SyncError> {
        if self.artifacts.is_installed() {
            self.update().await
        } else {
            self.install().await
        }
    }

    /// Download whatever is missing, plus the example page.
    pub async fn install(&self) -> Result<SyncOutcome, SyncError> {
        println!("Missing files:");
        for artifact in self.artifacts.missing() {
            println!("\t{}", artifact.path.display());
        }
        println!();

        if !self
            .confirm
            .confirm("You're missing some important htmc files, proceed with the download?")
        {
            info!("Installation declined");
            print_manual_steps();
            return Ok(SyncOutcome::InstallDeclined);
        }

        let failed = self.fetch_all(&self.artifacts.install_set(), false).await;
        let (example_failed, core_failed): (Vec<_>, Vec<_>) = failed
            .into_iter()
            .partition(|a| a.kind == ArtifactKind::Example);

        if let Some(example) = example_failed.first() {
            warn!("Example page {} was not installed", example.path.display());
        }

        if !core_failed.is_empty() {
            for artifact in &core_failed {
                error!("Required {} {} is missing", artifact.kind, artifact.path.display());
            }
            print_manual_steps();
            return Err(SyncError::Incomplete {
                failed: core_failed.into_iter().map(|a| a.path.clone()).collect(),
            });
        }

        (self.mark_executable)(&self.artifacts.executable.path)?;
        info!("htmc installed");
        Ok(SyncOutcome::Installed)
    }

    /// Replace all three core files if the remote version differs.
    pub async fn update(&self) -> Result<SyncOutcome, SyncError> {
        let check = self.probe.check(&self.fetcher).await;
        if let UpdateCheck::Unknown(_) = check {
            return Ok(SyncOutcome::UpdateCheckFailed);
        }
        if !check.is_available() {
            return Ok(SyncOutcome::UpToDate);
        }

        println!();
        println!("Files to be updated:");
        for artifact in self.artifacts.core() {
            println!("\t{}", artifact.path.display());
        }
        println!();

        if !self.confirm.confirm(":: Proceed with the installation?") {
            info!("Update declined, serving installed files");
            return Ok(SyncOutcome::UpdateDeclined);
        }

        let failed = self.fetch_all(&self.artifacts.core(), true).await;
        (self.mark_executable)(&self.artifacts.executable.path)?;

        if !failed.is_empty() {
            for artifact in &failed {
                error!(
                    "{} was not updated and may not match the other htmc files",
                    artifact.path.display()
                );
            }
            return Ok(SyncOutcome::UpdateIncomplete {
                failed: failed.into_iter().map(|a| a.path.clone()).collect(),
            });
        }

        info!("htmc updated");
        Ok(SyncOutcome::Updated)
    }

    /// One at a time, in order. Returns the artifacts that failed.
    async fn fetch_all<'s>(&self, artifacts: &[&'s Artifact], force: bool) -> Vec<&'s Artifact> {
        let mut failed = Vec::new();
        for &artifact in artifacts {
            if let Err(e) = self.fetcher.download(force, &artifact.path, &artifact.url).await {
                error!("Download of {} failed: {}", artifact.kind, e);
                failed.push(artifact);
            }
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FixtureServer, ScriptedConfirm};
    use std::time::Duration;
    use tempfile::TempDir;

    fn config_for(tmp: &TempDir, server: &FixtureServer) -> Config {
        let mut config = Config::for_root(tmp.path());
        config.remote.base_url = server.base_url();
        config.remote.version_url = server.url("/.htmc-version");
        config.remote.http_timeout = Duration::from_secs(5);
        config.layout.prepare().unwrap();
        config
    }

    fn deny(path: &Path) -> Result<(), PermissionError> {
        Err(PermissionError {
            path: path.to_path_buf(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        })
    }

    async fn release_server() -> FixtureServer {
        FixtureServer::builder()
            .route("/bin/htmc", 200, "#!/bin/sh\necho htmc\n")
            .route("/bin/libhtmc.a", 200, "!<arch>\n")
            .route("/include/libhtmc/libhtmc.h", 200, "#pragma once\n")
            .route("/examples/index.htmc", 200, "<html></html>\n")
            .spawn()
            .await
    }

    #[tokio::test]
    async fn test_fresh_install_on_yes() {
        let server = release_server().await;
        let tmp = TempDir::new().unwrap();
        let config = config_for(&tmp, &server);
        let confirm = ScriptedConfirm::new(&[true]);

        let sync = Synchronizer::new(&config, &confirm).unwrap();
        let outcome = sync.run().await.unwrap();

        assert_eq!(outcome, SyncOutcome::Installed);
        assert!(outcome.should_serve());
        assert_eq!(confirm.prompts().len(), 1);
        assert_eq!(server.hits("/.htmc-version"), 0);

        let set = sync.artifacts();
        assert_eq!(std::fs::read(&set.executable.path).unwrap(), b"#!/bin/sh\necho htmc\n");
        assert_eq!(std::fs::read(&set.library.path).unwrap(), b"!<arch>\n");
        assert_eq!(std::fs::read(&set.header.path).unwrap(), b"#pragma once\n");
        assert_eq!(std::fs::read(&set.example.path).unwrap(), b"<html></html>\n");
        assert!(set.is_installed());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&set.executable.path).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[tokio::test]
    async fn test_fresh_install_declined() {
        let server = release_server().await;
        let tmp = TempDir::new().unwrap();
        let config = config_for(&tmp, &server);
        let confirm = ScriptedConfirm::new(&[false]);

        let sync = Synchronizer::new(&config, &confirm).unwrap();
        let outcome = sync.run().await.unwrap();

        assert_eq!(outcome, SyncOutcome::InstallDeclined);
        assert!(!outcome.should_serve());
        assert_eq!(server.total_hits(), 0);
        assert!(sync.artifacts().install_set().iter().all(|a| !a.exists()));
    }

    #[tokio::test]
    async fn test_install_keeps_existing_files() {
        let server = release_server().await;
        let tmp = TempDir::new().unwrap();
        let config = config_for(&tmp, &server);
        std::fs::write(config.layout.library_path(), b"local build").unwrap();
        let confirm = ScriptedConfirm::new(&[true]);

        let outcome = Synchronizer::new(&config, &confirm).unwrap().run().await.unwrap();

        assert_eq!(outcome, SyncOutcome::Installed);
        assert_eq!(server.hits("/bin/libhtmc.a"), 0);
        assert_eq!(std::fs::read(config.layout.library_path()).unwrap(), b"local build");
    }

    #[tokio::test]
    async fn test_install_core_failure_is_fatal() {
        let server = FixtureServer::builder()
            .route("/bin/htmc", 200, "#!/bin/sh\n")
            .route("/bin/libhtmc.a", 200, "!<arch>\n")
            .route("/include/libhtmc/libhtmc.h", 404, "")
            .route("/examples/index.htmc", 200, "<html></html>\n")
            .spawn()
            .await;
        let tmp = TempDir::new().unwrap();
        let config = config_for(&tmp, &server);
        let confirm = ScriptedConfirm::new(&[true]);

        let err = Synchronizer::new(&config, &confirm).unwrap().run().await.unwrap_err();

        match err {
            SyncError::Incomplete { failed } => {
                assert_eq!(failed, vec![config.layout.header_path()]);
            }
            other => panic!("Expected Incomplete, got {:?}", other),
        }
        assert!(config.layout.library_path().exists());
    }

    #[tokio::test]
    async fn test_install_without_example_still_serves() {
        let server = FixtureServer::builder()
            .route("/bin/htmc", 200, "#!/bin/sh\n")
            .route("/bin/libhtmc.a", 200, "!<arch>\n")
            .route("/include/libhtmc/libhtmc.h", 200, "#pragma once\n")
            .spawn()
            .await;
        let tmp = TempDir::new().unwrap();
        let config = config_for(&tmp, &server);
        let confirm = ScriptedConfirm::new(&[true]);

        let outcome = Synchronizer::new(&config, &confirm).unwrap().run().await.unwrap();
        assert_eq!(outcome, SyncOutcome::Installed);
        assert!(!config.layout.example_path().exists());
    }

    #[tokio::test]
    async fn test_install_permission_failure_is_fatal() {
        let server = release_server().await;
        let tmp = TempDir::new().unwrap();
        let config = config_for(&tmp, &server);
        let confirm = ScriptedConfirm::new(&[true]);

        let err = Synchronizer::new(&config, &confirm)
            .unwrap()
            .with_mark_executable(deny)
            .run()
            .await
            .unwrap_err();

        match err {
            SyncError::Permission(e) => assert_eq!(e.path, config.layout.exec_path()),
            other => panic!("Expected Permission, got {:?}", other),
        }
    }

    #[test]
    fn test_outcome_flags() {
        use SyncOutcome::*;
        for outcome in [Installed, UpToDate, Updated, UpdateCheckFailed] {
            assert!(outcome.is_current(), "{:?}", outcome);
            assert!(outcome.should_serve());
        }
        for outcome in [UpdateDeclined, UpdateIncomplete { failed: vec![] }] {
            assert!(!outcome.is_current(), "{:?}", outcome);
            assert!(outcome.should_serve());
        }
        assert!(!InstallDeclined.should_serve());
        assert!(!InstallDeclined.is_current());
    }

    #[cfg(unix)]
    mod update {
        use super::*;
        use crate::version::installed_version;
        use std::os::unix::fs::PermissionsExt;

        fn htmc_script(version: &str) -> String {
            format!("#!/bin/sh\necho \"{}\"\n", version)
        }

        fn install_local(config: &Config, version: &str) {
            let exec = config.layout.exec_path();
            std::fs::write(&exec, htmc_script(version)).unwrap();
            std::fs::set_permissions(&exec, std::fs::Permissions::from_mode(0o755)).unwrap();
            std::fs::write(config.layout.library_path(), b"lib v1").unwrap();
            std::fs::write(config.layout.header_path(), b"header v1").unwrap();
        }

        async fn update_server(latest: &str, library_status: u16) -> FixtureServer {
            FixtureServer::builder()
                .route("/.htmc-version", 200, format!("{}\n", latest))
                .route("/bin/htmc", 200, htmc_script(latest))
                .route("/bin/libhtmc.a", library_status, "lib v2")
                .route("/include/libhtmc/libhtmc.h", 200, "header v2")
                .spawn()
                .await
        }

        #[tokio::test]
        async fn test_update_on_yes() {
            let server = update_server("htmc 0.3.2", 200).await;
            let tmp = TempDir::new().unwrap();
            let config = config_for(&tmp, &server);
            install_local(&config, "htmc 0.3.1");
            let confirm = ScriptedConfirm::new(&[true]);

            let outcome = Synchronizer::new(&config, &confirm).unwrap().run().await.unwrap();

            assert_eq!(outcome, SyncOutcome::Updated);
            assert_eq!(confirm.prompts(), vec![":: Proceed with the installation?".to_string()]);
            assert_eq!(std::fs::read(config.layout.library_path()).unwrap(), b"lib v2");
            assert_eq!(std::fs::read(config.layout.header_path()).unwrap(), b"header v2");

            let version = installed_version(
                &config.layout.exec_path(),
                config.layout.root(),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
            assert_eq!(version, "htmc 0.3.2\n");
        }

        #[tokio::test]
        async fn test_update_permission_failure_is_fatal() {
            let server = update_server("htmc 0.3.2", 200).await;
            let tmp = TempDir::new().unwrap();
            let config = config_for(&tmp, &server);
            install_local(&config, "htmc 0.3.1");
            let confirm = ScriptedConfirm::new(&[true]);

            let err = Synchronizer::new(&config, &confirm)
                .unwrap()
                .with_mark_executable(deny)
                .run()
                .await
                .unwrap_err();

            assert!(matches!(err, SyncError::Permission(_)));
        }

        #[tokio::test]
        async fn test_update_declined_keeps_files() {
            let server = update_server("htmc 0.3.2", 200).await;
            let tmp = TempDir::new().unwrap();
            let config = config_for(&tmp, &server);
            install_local(&config, "htmc 0.3.1");
            let confirm = ScriptedConfirm::new(&[false]);

            let outcome = Synchronizer::new(&config, &confirm).unwrap().run().await.unwrap();

            assert_eq!(outcome, SyncOutcome::UpdateDeclined);
            assert!(outcome.should_serve());
            assert_eq!(server.total_hits(), 1);
            assert_eq!(std::fs::read(config.layout.library_path()).unwrap(), b"lib v1");
        }

        #[tokio::test]
        async fn test_up_to_date_does_not_prompt() {
            let server = update_server("htmc 0.3.1", 200).await;
            let tmp = TempDir::new().unwrap();
            let config = config_for(&tmp, &server);
            install_local(&config, "htmc 0.3.1");
            let confirm = ScriptedConfirm::new(&[]);

            let outcome = Synchronizer::new(&config, &confirm).unwrap().run().await.unwrap();

            assert_eq!(outcome, SyncOutcome::UpToDate);
            assert!(confirm.prompts().is_empty());
            assert_eq!(server.hits("/bin/htmc"), 0);
        }

        #[tokio::test]
        async fn test_check_failure_serves_existing() {
            let server = FixtureServer::builder()
                .route("/.htmc-version", 500, "")
                .spawn()
                .await;
            let tmp = TempDir::new().unwrap();
            let config = config_for(&tmp, &server);
            install_local(&config, "htmc 0.3.1");
            let confirm = ScriptedConfirm::new(&[]);

            let outcome = Synchronizer::new(&config, &confirm).unwrap().run().await.unwrap();

            assert_eq!(outcome, SyncOutcome::UpdateCheckFailed);
            assert!(outcome.should_serve());
            assert!(outcome.is_current());
        }

        #[tokio::test]
        async fn test_partial_update_is_reported() {
            let server = update_server("htmc 0.3.2", 500).await;
            let tmp = TempDir::new().unwrap();
            let config = config_for(&tmp, &server);
            install_local(&config, "htmc 0.3.1");
            let confirm = ScriptedConfirm::new(&[true]);

            let outcome = Synchronizer::new(&config, &confirm).unwrap().run().await.unwrap();

            assert_eq!(
                outcome,
                SyncOutcome::UpdateIncomplete {
                    failed: vec![config.layout.library_path()]
                }
            );
            assert_eq!(std::fs::read(config.layout.library_path()).unwrap(), b"lib v1");
            assert_eq!(std::fs::read(config.layout.header_path()).unwrap(), b"header v2");
            let mode = std::fs::metadata(config.layout.exec_path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }
}
