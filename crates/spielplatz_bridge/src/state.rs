//! Lifecycle state machine of an execution context.

use thiserror::Error;

/// Where an execution context is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ContextState {
    /// Created, not started.
    #[default]
    Uninitialized,
    /// Loading the engine.
    Initializing,
    /// Waiting for a run request.
    Ready,
    /// Executing a run request.
    Running,
    /// Shut down. Absorbing.
    Terminated,
}

/// Events that move a context between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// The context was started.
    Start,
    /// The engine finished loading.
    Loaded,
    /// The engine failed to load.
    Failed,
    /// A run request arrived.
    RunRequested,
    /// The running program produced output.
    Output,
    /// The engine call returned or failed.
    Completed,
    /// The host terminated the context.
    Terminate,
}

/// A transition that is not allowed from the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid transition {transition:?} from state {state:?}")]
pub struct InvalidTransition {
    /// State the context was in.
    pub state: ContextState,
    /// Rejected event.
    pub transition: Transition,
}

impl ContextState {
    /// Returns the state after `transition`, or an error if the event is
    /// not valid here.
    pub fn apply(self, transition: Transition) -> Result<Self, InvalidTransition> {
        use ContextState::*;
        use Transition::*;

        match (self, transition) {
            (_, Terminate) => Ok(Terminated),
            (Uninitialized, Start) => Ok(Initializing),
            (Initializing, Loaded) => Ok(Ready),
            (Initializing, Failed) => Ok(Terminated),
            (Ready, RunRequested) => Ok(Running),
            (Running, Output) => Ok(Running),
            (Running, Completed) => Ok(Ready),
            (state, transition) => Err(InvalidTransition { state, transition }),
        }
    }

    /// Advances in place.
    pub fn advance(&mut self, transition: Transition) -> Result<(), InvalidTransition> {
        *self = self.apply(transition)?;
        Ok(())
    }

    /// Returns true once the context can never be used again.
    pub fn is_terminated(self) -> bool {
        self == ContextState::Terminated
    }

    /// Returns true if a run request would be accepted.
    pub fn is_ready(self) -> bool {
        self == ContextState::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::ContextState::*;
    use super::Transition::*;
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(Uninitialized, Start, Initializing)]
    #[case(Initializing, Loaded, Ready)]
    #[case(Initializing, Failed, Terminated)]
    #[case(Ready, RunRequested, Running)]
    #[case(Running, Output, Running)]
    #[case(Running, Completed, Ready)]
    fn test_valid_transitions(
        #[case] from: ContextState,
        #[case] transition: Transition,
        #[case] to: ContextState,
    ) {
        assert_eq!(from.apply(transition), Ok(to));
    }

    #[rstest]
    fn test_terminate_from_any_state(
        #[values(Uninitialized, Initializing, Ready, Running, Terminated)] from: ContextState,
    ) {
        assert_eq!(from.apply(Terminate), Ok(Terminated));
    }

    #[rstest]
    fn test_terminated_is_absorbing(
        #[values(Start, Loaded, Failed, RunRequested, Output, Completed)] transition: Transition,
    ) {
        assert!(Terminated.apply(transition).is_err());
    }

    #[rstest]
    #[case::run_before_ready(Initializing, RunRequested)]
    #[case::run_while_running(Running, RunRequested)]
    #[case::output_while_idle(Ready, Output)]
    #[case::second_ready(Ready, Loaded)]
    #[case::completed_while_idle(Ready, Completed)]
    #[case::restart(Ready, Start)]
    fn test_invalid_transitions(#[case] from: ContextState, #[case] transition: Transition) {
        let err = from.apply(transition).unwrap_err();
        assert_eq!(err, InvalidTransition { state: from, transition });
    }

    #[test]
    fn test_advance_keeps_state_on_error() {
        let mut state = Ready;
        assert!(state.advance(Output).is_err());
        assert_eq!(state, Ready);
    }
}
