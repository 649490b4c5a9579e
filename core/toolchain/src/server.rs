//! Supervision of the ZLS language server process.
//!
//! ZLS is started with a generated configuration file that points it at the
//! selected Zig. [`LanguageServer::watch`] restarts a running server when
//! either provider switches versions.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::paths::write_atomic;
use crate::provider::{ToolchainChanged, ToolchainProvider};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How the server's standard streams are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStdio {
    /// Shares the parent's streams, so an editor can talk to ZLS directly.
    Inherit,
    Null,
}

impl ServerStdio {
    fn stdio(self) -> Stdio {
        match self {
            ServerStdio::Inherit => Stdio::inherit(),
            ServerStdio::Null => Stdio::null(),
        }
    }
}

#[derive(Debug)]
pub struct LanguageServer {
    zig: Arc<ToolchainProvider>,
    zls: Arc<ToolchainProvider>,
    config_file: PathBuf,
    stdio: ServerStdio,
    child: Mutex<Option<Child>>,
}

impl LanguageServer {
    #[must_use]
    pub fn new(
        zig: Arc<ToolchainProvider>,
        zls: Arc<ToolchainProvider>,
        config_file: PathBuf,
        stdio: ServerStdio,
    ) -> Self {
        Self {
            zig,
            zls,
            config_file,
            stdio,
            child: Mutex::new(None),
        }
    }

    /// Starts ZLS unless it is already running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no ZLS is selected, or an error if the
    /// configuration file cannot be written or the process fails to spawn.
    pub async fn start(&self) -> Result<()> {
        let mut child = self.child.lock().await;
        self.start_locked(&mut child)
    }

    /// Kills the server if it is running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Process`] if the process cannot be killed.
    pub async fn stop(&self) -> Result<()> {
        let mut child = self.child.lock().await;
        stop_locked(&mut child).await
    }

    /// Stops and starts the server.
    ///
    /// The process slot stays locked throughout, so [`LanguageServer::wait`]
    /// never sees the gap between the two processes.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`LanguageServer::stop`] and
    /// [`LanguageServer::start`].
    pub async fn restart(&self) -> Result<()> {
        let mut child = self.child.lock().await;
        stop_locked(&mut child).await?;
        self.start_locked(&mut child)
    }

    fn start_locked(&self, child: &mut Option<Child>) -> Result<()> {
        if let Some(running) = child.as_mut()
            && running.try_wait().ok().flatten().is_none()
        {
            debug!("language server already running");
            return Ok(());
        }

        let zls = self
            .zls
            .get()
            .ok_or_else(|| Error::config("no ZLS executable is selected"))?;
        self.write_config()?;

        let spawned = Command::new(&zls.path)
            .arg("--config-path")
            .arg(&self.config_file)
            .stdin(self.stdio.stdio())
            .stdout(self.stdio.stdio())
            .stderr(self.stdio.stdio())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Process {
                program: zls.path.clone(),
                message: format!("failed to start: {e}"),
            })?;
        info!(path = %zls.path.display(), version = %zls.version, "language server started");
        *child = Some(spawned);
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        let mut child = self.child.lock().await;
        match child.as_mut() {
            Some(running) => matches!(running.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Waits until the server exits, across restarts.
    ///
    /// Returns `None` once no server process is held.
    pub async fn wait(&self) -> Option<ExitStatus> {
        loop {
            {
                let mut child = self.child.lock().await;
                let running = child.as_mut()?;
                match running.try_wait() {
                    Ok(Some(status)) => {
                        child.take();
                        return Some(status);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, "cannot poll language server");
                        child.take();
                        return None;
                    }
                }
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }
    }

    /// Restarts a running server whenever either provider changes.
    ///
    /// The task runs until it is aborted.
    pub fn watch(self: &Arc<Self>) -> JoinHandle<()> {
        let server = Arc::clone(self);
        let mut zig_events = self.zig.subscribe();
        let mut zls_events = self.zls.subscribe();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    event = zig_events.recv() => event,
                    event = zls_events.recv() => event,
                };
                match event {
                    Ok(ToolchainChanged { exe_name, .. }) => {
                        if !server.is_running().await {
                            continue;
                        }
                        info!(exe = %exe_name, "toolchain changed, restarting language server");
                        if let Err(e) = server.restart().await {
                            warn!(error = %e, "language server restart failed");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "missed toolchain events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn write_config(&self) -> Result<()> {
        let zig_path = self.zig.get().map(|zig| zig.path);
        let config = json!({ "zig_exe_path": zig_path });
        let body = serde_json::to_vec_pretty(&config)
            .map_err(|e| Error::format("ZLS configuration", e))?;
        write_atomic(&self.config_file, &body)
    }
}

async fn stop_locked(child: &mut Option<Child>) -> Result<()> {
    let Some(mut running) = child.take() else {
        return Ok(());
    };
    running.kill().await.map_err(|e| Error::Process {
        program: PathBuf::from("zls"),
        message: format!("failed to stop: {e}"),
    })?;
    info!("language server stopped");
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::process::VERSION_QUERY_TIMEOUT;
    use crate::provider::{PersistedPath, ToolchainState};
    use crate::settings::SettingsStore;
    use crate::test_support::write_script;
    use semver::Version;
    use serial_test::serial;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        zig: Arc<ToolchainProvider>,
        zls: Arc<ToolchainProvider>,
        server: Arc<LanguageServer>,
    }

    fn fixture(zls_body: &str) -> Fixture {
        let temp = tempfile::tempdir().expect("Should create temp dir");
        let settings = Arc::new(
            SettingsStore::load(temp.path().join("config.toml"), None).expect("Should load"),
        );
        let provider = |exe: &str, setting| {
            Arc::new(ToolchainProvider::new(
                exe,
                Vec::new(),
                setting,
                Arc::clone(&settings),
                VERSION_QUERY_TIMEOUT,
            ))
        };
        let zig = provider("zig", PersistedPath::ZigPath);
        let zls = provider("zls", PersistedPath::ZlsPath);
        zig.set(Some(ToolchainState {
            path: temp.path().join("zig"),
            version: Version::new(0, 13, 0),
        }));
        zls.set(Some(ToolchainState {
            path: write_script(temp.path(), "zls", zls_body),
            version: Version::new(0, 13, 0),
        }));
        let server = Arc::new(LanguageServer::new(
            Arc::clone(&zig),
            Arc::clone(&zls),
            temp.path().join("zls.json"),
            ServerStdio::Null,
        ));
        Fixture {
            temp,
            zig,
            zls,
            server,
        }
    }

    #[tokio::test]
    #[serial]
    async fn start_writes_config_and_runs_zls() {
        let fixture = fixture("sleep 30\n");

        fixture.server.start().await.expect("Should start");

        assert!(fixture.server.is_running().await);
        let config: serde_json::Value = serde_json::from_slice(
            &std::fs::read(fixture.temp.path().join("zls.json")).expect("Should read config"),
        )
        .expect("Should parse config");
        assert_eq!(
            config["zig_exe_path"],
            json!(fixture.temp.path().join("zig"))
        );

        fixture.server.stop().await.expect("Should stop");
        assert!(!fixture.server.is_running().await);
    }

    #[tokio::test]
    #[serial]
    async fn wait_reports_exit_status() {
        let fixture = fixture("exit 3\n");
        fixture.server.start().await.expect("Should start");

        let status = fixture.server.wait().await.expect("Should exit");
        assert_eq!(status.code(), Some(3));
        assert_eq!(fixture.server.wait().await, None);
    }

    #[tokio::test]
    #[serial]
    async fn wait_keeps_waiting_across_restarts() {
        let fixture = fixture("sleep 30\n");
        fixture.server.start().await.expect("Should start");
        let server = Arc::clone(&fixture.server);
        let waiter = tokio::spawn(async move { server.wait().await });

        for _ in 0..10 {
            fixture.server.restart().await.expect("Should restart");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(EXIT_POLL_INTERVAL * 2).await;
        assert!(!waiter.is_finished(), "wait returned while the server was running");
        assert!(fixture.server.is_running().await);

        fixture.server.stop().await.expect("Should stop");
        let outcome = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("Should finish after stop")
            .expect("Should join");
        assert_eq!(outcome, None);
    }

    #[tokio::test]
    #[serial]
    async fn start_without_zls_is_config_error() {
        let fixture = fixture("sleep 30\n");
        fixture.zls.set(None);

        let err = fixture.server.start().await.expect_err("Should fail");
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    #[serial]
    async fn watch_restarts_on_zig_change() {
        let fixture = fixture("echo started >> \"$(dirname \"$0\")/starts.log\"\nsleep 30\n");
        fixture.server.start().await.expect("Should start");
        let watcher = fixture.server.watch();

        fixture.zig.set(Some(ToolchainState {
            path: fixture.temp.path().join("zig"),
            version: Version::new(0, 14, 0),
        }));

        let log = fixture.temp.path().join("starts.log");
        let mut starts = 0;
        for _ in 0..50 {
            starts = std::fs::read_to_string(&log)
                .map(|s| s.lines().count())
                .unwrap_or(0);
            if starts >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(starts, 2);

        watcher.abort();
        fixture.server.stop().await.expect("Should stop");
    }
}
