//! Error types for Hookline.

/// A specialized Result type for Hookline operations.
pub type Result<T> = std::result::Result<T, CallbackError>;

/// Errors raised by the callback dispatch machinery.
///
/// Only [`CallbackError::CallLimitReached`] and [`CallbackError::LoopSpawn`]
/// ever reach a caller. The remaining variants describe handler failures;
/// they are reported through the host and logged at the invoker boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallbackError {
    /// The pending-call ceiling was reached and the dispatch was dropped.
    #[error("pending callback ceiling reached ({pending} pending, limit {limit})")]
    CallLimitReached {
        /// Calls queued or in flight when the request arrived.
        pending: usize,
        /// The configured ceiling.
        limit: usize,
    },

    /// The handler object cannot be called.
    #[error("{0} not callable")]
    NotCallable(&'static str),

    /// The host could not report how many parameters the handler declares.
    #[error("handler parameter count is unavailable")]
    ArityUnavailable,

    /// The handler raised while being called.
    #[error("handler call failed: {0}")]
    CallFailed(String),

    /// The execution loop thread could not be started.
    #[error("failed to spawn callback execution thread: {0}")]
    LoopSpawn(String),
}

impl CallbackError {
    /// Whether this error describes a broken handler rather than the
    /// dispatch machinery itself.
    pub fn is_handler_failure(&self) -> bool {
        matches!(
            self,
            Self::NotCallable(_) | Self::ArityUnavailable | Self::CallFailed(_)
        )
    }
}
