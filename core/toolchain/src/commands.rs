//! User-facing actions with results reported through a [`Notifier`].
//!
//! These are the operations an editor binds to commands. None of them
//! return errors; outcomes are shown to the user instead.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::context::{ToolchainContext, VersionRequest};
use crate::install::InstallOptions;
use crate::server::LanguageServer;

/// Follow-up offered alongside an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyAction {
    Retry,
    OpenSettings,
    PickPath,
}

/// Presents messages to the user.
pub trait Notifier: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str, actions: &[NotifyAction]);
}

pub struct Commands {
    context: Arc<ToolchainContext>,
    server: Arc<LanguageServer>,
    notifier: Arc<dyn Notifier>,
}

impl Commands {
    #[must_use]
    pub fn new(
        context: Arc<ToolchainContext>,
        server: Arc<LanguageServer>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            context,
            server,
            notifier,
        }
    }

    /// Installs a Zig version and the matching ZLS.
    pub async fn install_version(&self, request: &VersionRequest, options: &InstallOptions) {
        let zig = match self.context.install_zig(request, options).await {
            Ok(zig) => zig,
            Err(e) => {
                self.notifier.error(
                    &format!("Failed to install Zig: {e}"),
                    &[NotifyAction::Retry, NotifyAction::PickPath],
                );
                return;
            }
        };
        self.notifier
            .info(&format!("Zig {} installed at {}", zig.version, zig.path.display()));

        if !self.context.settings().effective().zls_enabled() {
            return;
        }
        match self.context.install_zls_for(&zig.version, options).await {
            Ok(zls) => {
                self.context.zls().set(Some(zls.clone()));
                self.notifier.info(&format!("ZLS {} installed", zls.version));
            }
            Err(e) => self.notifier.warn(&format!("ZLS was not installed: {e}")),
        }
    }

    /// Selects an existing executable for Zig (or ZLS when `zls` is set)
    /// and saves the choice.
    pub async fn select_path(&self, path: &Path, zls: bool) {
        let provider = if zls {
            self.context.zls()
        } else {
            self.context.zig()
        };
        match provider.set_and_persist(path).await {
            Ok(state) => self.notifier.info(&format!(
                "Using {} {} from {}",
                provider.exe_name(),
                state.version,
                state.path.display()
            )),
            Err(e) => self.notifier.error(
                &format!("Cannot use {}: {e}", path.display()),
                &[NotifyAction::PickPath, NotifyAction::OpenSettings],
            ),
        }
    }

    /// Points the user at the settings file.
    pub fn open_settings(&self) {
        let path = self.context.settings().path();
        debug!(file = %path.display(), "opening settings");
        self.notifier
            .info(&format!("Settings are stored in {}", path.display()));
    }

    pub async fn start_server(&self) {
        match self.server.start().await {
            Ok(()) => self.notifier.info("ZLS started"),
            Err(e) => self.notifier.error(
                &format!("Failed to start ZLS: {e}"),
                &[NotifyAction::Retry, NotifyAction::OpenSettings],
            ),
        }
    }

    pub async fn stop_server(&self) {
        match self.server.stop().await {
            Ok(()) => self.notifier.info("ZLS stopped"),
            Err(e) => self
                .notifier
                .error(&format!("Failed to stop ZLS: {e}"), &[NotifyAction::Retry]),
        }
    }

    pub async fn restart_server(&self) {
        match self.server.restart().await {
            Ok(()) => self.notifier.info("ZLS restarted"),
            Err(e) => self.notifier.error(
                &format!("Failed to restart ZLS: {e}"),
                &[NotifyAction::Retry, NotifyAction::OpenSettings],
            ),
        }
    }
}
