//! Error types for the renderer module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while rendering one input combination.
#[derive(Debug, Error)]
pub enum RendererError {
    /// Renderer executable not found.
    #[error("renderer not found at path: {path}")]
    ProgramNotFound { path: PathBuf },

    /// Input file not found.
    #[error("input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// The script failed to execute.
    #[error("script failed: {reason}")]
    ScriptFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// The renderer exited successfully without writing the output.
    #[error("no output written to {path}")]
    MissingOutput { path: PathBuf },

    /// Rendering timed out.
    #[error("render timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// I/O error while rendering.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RendererError {
    /// Creates a new script failed error with stderr output.
    pub fn script_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::ScriptFailed {
            reason: reason.into(),
            stderr,
        }
    }

    /// Message recorded against the output file in a batch report.
    ///
    /// Includes the renderer's own diagnostics when there are any.
    pub fn report_message(&self) -> String {
        match self {
            Self::ScriptFailed {
                stderr: Some(stderr),
                ..
            } if !stderr.trim().is_empty() => format!("{}: {}", self, stderr.trim()),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_message_includes_stderr() {
        let err = RendererError::script_failed(
            "exit code 1",
            Some("ERROR: unknown function blurr\n".to_string()),
        );
        assert_eq!(
            err.report_message(),
            "script failed: exit code 1: ERROR: unknown function blurr"
        );
    }

    #[test]
    fn test_report_message_without_stderr() {
        let err = RendererError::Timeout { timeout_secs: 5 };
        assert_eq!(err.report_message(), "render timed out after 5 seconds");

        let err = RendererError::script_failed("exit code 2", Some("  ".to_string()));
        assert_eq!(err.report_message(), "script failed: exit code 2");
    }
}
