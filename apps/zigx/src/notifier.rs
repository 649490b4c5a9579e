//! A [`Notifier`] that writes to stderr.

use zigx_toolchain::{NotifyAction, Notifier};

pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn info(&self, message: &str) {
        eprintln!("{message}");
    }

    fn warn(&self, message: &str) {
        eprintln!("warning: {message}");
    }

    fn error(&self, message: &str, actions: &[NotifyAction]) {
        eprintln!("error: {message}");
        for action in actions {
            eprintln!("  hint: {}", hint(*action));
        }
    }
}

fn hint(action: NotifyAction) -> &'static str {
    match action {
        NotifyAction::Retry => "run the command again",
        NotifyAction::OpenSettings => "check the settings with `zigx config show`",
        NotifyAction::PickPath => "select an executable with `zigx use <PATH>`",
    }
}
