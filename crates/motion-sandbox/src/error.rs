//! Render errors

use crate::state::ExecutionState;
use motion_ledger::JobId;
use std::path::PathBuf;

/// Failure while executing scene source
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Workspace or source file I/O
    #[error("workspace I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Renderer binary could not be started
    #[error("failed to spawn renderer `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Renderer exited non-zero
    #[error("renderer exited with status {}", exit_status.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    ProcessFailed {
        /// `None` when terminated by a signal
        exit_status: Option<i32>,
        captured_stderr: String,
    },

    /// Renderer exited zero but no artifact was found
    #[error("no output produced (searched {})", searched.display())]
    NoOutput { searched: PathBuf },

    /// Renderer exceeded the configured wall-clock limit and was killed
    #[error("renderer timed out after {secs}s")]
    TimedOut { secs: u64 },

    /// Another execution already holds this job's workspace
    #[error("job {0} is already running")]
    Busy(JobId),

    #[error("invalid execution transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: ExecutionState,
        to: ExecutionState,
    },
}

impl RenderError {
    /// Diagnostic suitable for the job record
    #[must_use]
    pub fn diagnostic(&self) -> String {
        match self {
            Self::ProcessFailed {
                captured_stderr, ..
            } if !captured_stderr.trim().is_empty() => {
                format!("{self}\n{}", captured_stderr.trim_end())
            }
            _ => self.to_string(),
        }
    }
}
