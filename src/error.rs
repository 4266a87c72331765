use crate::gateway::GatewayError;

/// Rejected locally before anything reaches a collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("target word is empty")]
    EmptyWord,

    #[error("elapsed time must not be negative (got {0} ms)")]
    NegativeElapsed(i64),
}

/// Errors surfaced to the UI by the session controller
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("no word is waiting for input")]
    NotAwaitingInput,

    #[error("there is no finished result set waiting to be saved")]
    NotFinishing,

    #[error("pattern analysis failed: {0}")]
    Analysis(GatewayError),

    #[error("targeted word batch failed: {0}")]
    TargetedBatch(GatewayError),

    #[error("saving the session failed: {0}")]
    Persistence(GatewayError),

    #[error("session has already ended")]
    Terminated,
}

impl SessionError {
    /// Only a failed save can be retried in place; everything else needs a new event.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Persistence(_))
    }
}
