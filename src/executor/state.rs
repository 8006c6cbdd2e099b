//! Lifecycle of one logical operation.

/// State of a logical operation inside the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    /// Created, breaker not yet consulted.
    Pending,
    /// An attempt is in flight.
    Executing,
    /// Sleeping before the next attempt.
    Waiting,
    /// Finished with a response.
    Succeeded,
    /// Finished with an error.
    FailedTerminal,
    /// Aborted through the cancellation token.
    Cancelled,
}

impl OperationState {
    /// Returns true for states an operation never leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationState::Succeeded | OperationState::FailedTerminal | OperationState::Cancelled
        )
    }

    /// Returns true if `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: OperationState) -> bool {
        use OperationState::*;

        matches!(
            (self, next),
            (Pending, Executing)
                | (Pending, FailedTerminal)
                | (Pending, Cancelled)
                | (Executing, Succeeded)
                | (Executing, Waiting)
                | (Executing, FailedTerminal)
                | (Executing, Cancelled)
                | (Waiting, Executing)
                | (Waiting, Cancelled)
        )
    }
}

/// Tracks the state of one operation and logs its transitions.
#[derive(Debug)]
pub(crate) struct Operation {
    state: OperationState,
}

impl Operation {
    pub(crate) fn new() -> Self {
        Self {
            state: OperationState::Pending,
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> OperationState {
        self.state
    }

    pub(crate) fn transition(&mut self, next: OperationState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal operation transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::trace!(from = ?self.state, to = ?next, "Operation state change");
        self.state = next;
    }
}
