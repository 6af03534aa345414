// SPDX-License-Identifier: MIT
// Crate error type.

use thiserror::Error;

/// Errors surfaced by the completion pipeline.
///
/// `Cancelled` is expected flow control, not a failure: the coordinator
/// discards cancelled work silently, while `Generation` failures are logged
/// and reduced to an empty suggestion at the boundary.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The request's cancellation token fired before the result was applied.
    #[error("completion request cancelled")]
    Cancelled,

    /// The generation function failed (network or model error).
    #[error("generation failed: {0}")]
    Generation(#[source] anyhow::Error),

    /// The coordinator was disposed while the request was in flight.
    #[error("coordinator disposed")]
    Disposed,
}

impl CompletionError {
    /// True for cancellation-induced rejections, which are expected and are
    /// never logged as errors.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CompletionError::Cancelled | CompletionError::Disposed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_is_distinguished_from_failure() {
        assert!(CompletionError::Cancelled.is_cancelled());
        assert!(CompletionError::Disposed.is_cancelled());
        assert!(!CompletionError::Generation(anyhow::anyhow!("boom")).is_cancelled());
    }
}
