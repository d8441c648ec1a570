//! Orchestrator lifecycle states

use crate::error::{PipelineError, Result};

/// Orchestrator state; advances strictly in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum OrchestratorState {
    #[default]
    Idle,
    /// Resolving configuration and computing the address plan
    Configuring,
    /// Spawning workers in launch order
    Launching,
    /// All workers launched, none exited, no interrupt yet
    Running,
    /// Interrupted or a worker exited; joining the rest
    Draining,
    Terminated,
}

impl OrchestratorState {
    /// The only state this one may move to
    pub fn next(self) -> Option<Self> {
        use OrchestratorState::*;
        match self {
            Idle => Some(Configuring),
            Configuring => Some(Launching),
            Launching => Some(Running),
            Running => Some(Draining),
            Draining => Some(Terminated),
            Terminated => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrchestratorState::Idle => "idle",
            OrchestratorState::Configuring => "configuring",
            OrchestratorState::Launching => "launching",
            OrchestratorState::Running => "running",
            OrchestratorState::Draining => "draining",
            OrchestratorState::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Current state plus the path taken to reach it
#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    state: OrchestratorState,
    history: Vec<OrchestratorState>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: OrchestratorState::Idle,
            history: vec![OrchestratorState::Idle],
        }
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// Every state entered so far, starting with `Idle`
    pub fn history(&self) -> &[OrchestratorState] {
        &self.history
    }

    /// Move to `to`; anything but the immediate successor is rejected
    pub fn advance(&mut self, to: OrchestratorState) -> Result<()> {
        if self.state.next() != Some(to) {
            return Err(PipelineError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        tracing::debug!("Orchestrator {} -> {}", self.state, to);
        self.state = to;
        self.history.push(to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrchestratorState::*;

    #[test]
    fn test_full_path() {
        let mut machine = StateMachine::new();
        for state in [Configuring, Launching, Running, Draining, Terminated] {
            machine.advance(state).unwrap();
        }
        assert_eq!(
            machine.history(),
            &[Idle, Configuring, Launching, Running, Draining, Terminated]
        );
        assert_eq!(machine.state().next(), None);
    }

    #[test]
    fn test_no_skipping() {
        let mut machine = StateMachine::new();
        machine.advance(Configuring).unwrap();
        assert!(machine.advance(Running).is_err());
        assert_eq!(machine.state(), Configuring);
    }

    #[test]
    fn test_no_going_back() {
        let mut machine = StateMachine::new();
        machine.advance(Configuring).unwrap();
        assert!(machine.advance(Idle).is_err());
        assert!(machine.advance(Configuring).is_err());
    }
}
