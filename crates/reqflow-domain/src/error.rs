//! Failure causes carried by request result slots.

use thiserror::Error;

/// Why a request did not produce a value.
///
/// Domain failures stay local to the entry that produced them. Interruption
/// is kept as its own case so that cached results poisoned by cancellation
/// can be told apart from real answers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Cause<E> {
    /// The resolver answered the request with a typed failure.
    #[error("request failed: {0}")]
    Fail(E),

    /// The computation driving the request was cancelled before it answered.
    #[error("request interrupted")]
    Interrupted,

    /// The resolver broke its contract (for example, it never answered).
    #[error("defect: {message}")]
    Die { message: String },
}

impl<E> Cause<E> {
    /// Creates a defect with the given message.
    pub fn die(message: impl Into<String>) -> Self {
        Cause::Die {
            message: message.into(),
        }
    }

    /// Returns true when the only reason for the failure is interruption.
    pub fn is_interrupted_only(&self) -> bool {
        matches!(self, Cause::Interrupted)
    }

    /// Returns the typed failure, if this is one.
    pub fn failure(&self) -> Option<&E> {
        match self {
            Cause::Fail(e) => Some(e),
            Cause::Interrupted | Cause::Die { .. } => None,
        }
    }

    /// Maps the typed failure, leaving interruption and defects untouched.
    pub fn map<E2>(self, f: impl FnOnce(E) -> E2) -> Cause<E2> {
        match self {
            Cause::Fail(e) => Cause::Fail(f(e)),
            Cause::Interrupted => Cause::Interrupted,
            Cause::Die { message } => Cause::Die { message },
        }
    }
}

/// Outcome of a request or query.
pub type Exit<A, E> = Result<A, Cause<E>>;

/// Returns true when the exit is a failure caused only by interruption.
pub fn is_interrupted_only<A, E>(exit: &Exit<A, E>) -> bool {
    matches!(exit, Err(cause) if cause.is_interrupted_only())
}
