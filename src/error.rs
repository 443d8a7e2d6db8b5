//! Domain-specific error types for pbl-coach.

use thiserror::Error;

use crate::client::CompletionError;

/// Errors produced by the conversation store and the stage sequencer.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// An operation required a prior turn that does not exist.
    #[error("conversation has no matching prior turn")]
    EmptyHistory,

    /// Internal invariant violation: the intake scan found no pending
    /// question even though not every key has an answer.
    #[error("no pending intake question while only {answered} of {total} answers are recorded")]
    PendingQuestionMissing { answered: usize, total: usize },

    /// A turn was appended with empty text.
    #[error("turn text must not be empty")]
    EmptyTurn,

    /// The external completion call failed or returned empty text.
    /// The stage does not advance; the caller may retry by resubmitting.
    #[error("completion failed: {0}")]
    Completion(#[from] CompletionError),

    /// A stage needed an artifact (idea, driving questions) that an
    /// earlier stage should have produced.
    #[error("{0} is missing but required by the current stage")]
    MissingArtifact(&'static str),
}

/// Result type alias for workflow operations.
pub type Result<T> = std::result::Result<T, WorkflowError>;
