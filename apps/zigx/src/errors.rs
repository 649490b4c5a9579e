//! Error types for the zigx CLI.
//!
//! Most failures travel as `anyhow::Error` with context. The variants here
//! are the ones `main` handles specially or that commands match on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZigxError {
    /// No Zig version could be determined for the workspace.
    #[error("no Zig version could be determined; add a .zigversion file or run `zigx install`")]
    Unresolved,

    /// The language server exited with a non-zero code.
    ///
    /// The code is propagated as the exit code of `zigx` without printing
    /// anything else.
    #[error("process exited with code {code}")]
    ProcessExitCode {
        /// The exit code of the language server.
        code: i32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_exit_code_displays_code() {
        let err = ZigxError::ProcessExitCode { code: 42 };
        assert_eq!(err.to_string(), "process exited with code 42");
    }

    #[test]
    fn unresolved_suggests_a_fix() {
        assert!(ZigxError::Unresolved.to_string().contains("zigx install"));
    }
}
