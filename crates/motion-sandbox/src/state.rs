//! Execution state machine
//!
//! `Pending -> Running -> {Succeeded, Failed}`. No retries at this layer.

use crate::error::RenderError;
use serde::{Deserialize, Serialize};

/// Lifecycle of one renderer invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl ExecutionState {
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// States reachable from `self`
    #[must_use]
    pub fn allowed_transitions(&self) -> &'static [ExecutionState] {
        match self {
            Self::Pending => &[Self::Running],
            Self::Running => &[Self::Succeeded, Self::Failed],
            Self::Succeeded | Self::Failed => &[],
        }
    }

    /// Move to `next`
    ///
    /// # Errors
    /// Returns `InvalidTransition` if `next` is not reachable
    pub fn advance(&mut self, next: ExecutionState) -> Result<(), RenderError> {
        if !self.allowed_transitions().contains(&next) {
            return Err(RenderError::InvalidTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let mut state = ExecutionState::Pending;
        state.advance(ExecutionState::Running).unwrap();
        state.advance(ExecutionState::Succeeded).unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn terminal_states_are_final() {
        let mut state = ExecutionState::Failed;
        assert!(state.advance(ExecutionState::Running).is_err());
        assert_eq!(state, ExecutionState::Failed);
    }

    #[test]
    fn cannot_skip_running() {
        let mut state = ExecutionState::Pending;
        assert!(matches!(
            state.advance(ExecutionState::Succeeded),
            Err(RenderError::InvalidTransition { .. })
        ));
    }
}
