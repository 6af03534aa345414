// SPDX-License-Identifier: MIT
// Pending request registry.
//
// Tracks in-flight generations keyed by originating context. At most one
// live generation represents real outstanding model work per family of
// mutually-compatible contexts: new requests reuse a compatible pending one,
// and requests whose context has diverged are cancelled rather than left to
// complete into a stale cache write.

use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::multicast::MulticastStream;
use crate::provider::GenerationEvent;

/// An in-flight generation and the context it was dispatched for.
///
/// Cheaply cloneable; all clones share the stream and token.
#[derive(Clone)]
pub struct PendingRequest {
    pub id: Uuid,
    pub prefix: String,
    pub suffix: String,
    /// Multicast over the generation's event stream, so several logical
    /// consumers can await the same call.
    pub stream: MulticastStream<GenerationEvent>,
    /// Token threaded through the provider call; checked cooperatively.
    pub cancel_token: CancellationToken,
}

impl PendingRequest {
    pub fn new(
        prefix: impl Into<String>,
        suffix: impl Into<String>,
        stream: MulticastStream<GenerationEvent>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            prefix: prefix.into(),
            suffix: suffix.into(),
            stream,
            cancel_token,
        }
    }

    /// Abort the underlying generation (best-effort) and end the stream.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
        self.stream.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The current set of in-flight generations.
///
/// Thread-safety: wrap in a `Mutex` for shared use.
#[derive(Default)]
pub struct PendingRequestRegistry {
    requests: Vec<PendingRequest>,
}

impl PendingRequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, request: PendingRequest) {
        debug!(id = %request.id, "pending request added");
        self.requests.push(request);
    }

    pub fn remove(&mut self, id: Uuid) {
        self.requests.retain(|r| r.id != id);
    }

    /// Find a pending generation the query context can reuse.
    ///
    /// An exact context match is preferred; failing that, a request whose
    /// suffix matches and whose prefix the query extends (the user typed
    /// further, compatibly).
    pub fn find_reusable(&self, prefix: &str, suffix: &str) -> Option<PendingRequest> {
        if let Some(exact) = self
            .requests
            .iter()
            .find(|r| r.prefix == prefix && r.suffix == suffix)
        {
            return Some(exact.clone());
        }
        self.requests
            .iter()
            .find(|r| r.suffix == suffix && prefix.starts_with(&r.prefix))
            .cloned()
    }

    /// Cancel and remove every request that can no longer serve the query
    /// context: different suffix, or a prefix that has diverged (neither a
    /// prefix nor an extension of the queried one).
    ///
    /// Requests with a *longer* prefix than the query survive — the user may
    /// have backspaced and will retype into them.
    pub fn cancel_obsolete(&mut self, prefix: &str, suffix: &str) -> usize {
        let mut cancelled = 0;
        self.requests.retain(|r| {
            let reusable = r.suffix == suffix
                && (prefix.starts_with(&r.prefix) || r.prefix.starts_with(prefix));
            if !reusable {
                debug!(id = %r.id, "cancelling obsolete pending request");
                r.cancel();
                cancelled += 1;
            }
            reusable
        });
        cancelled
    }

    /// Cancel and drop everything.
    pub fn clear(&mut self) {
        for request in self.requests.drain(..) {
            request.cancel();
        }
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use futures_util::StreamExt;

    fn pending(prefix: &str, suffix: &str) -> PendingRequest {
        let producer = stream::iter(Vec::<anyhow::Result<GenerationEvent>>::new()).boxed();
        PendingRequest::new(
            prefix,
            suffix,
            MulticastStream::new(producer),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn exact_match_preferred_over_typed_ahead() {
        let mut registry = PendingRequestRegistry::new();
        registry.add(pending("let x = ", ";"));
        let exact = pending("let x = val", ";");
        let exact_id = exact.id;
        registry.add(exact);

        let found = registry.find_reusable("let x = val", ";").unwrap();
        assert_eq!(found.id, exact_id);
    }

    #[tokio::test]
    async fn typed_ahead_request_is_reusable() {
        let mut registry = PendingRequestRegistry::new();
        registry.add(pending("let x = ", ";"));

        // The user typed further past the pending request's prefix.
        assert!(registry.find_reusable("let x = va", ";").is_some());
        // A different suffix is never reusable.
        assert!(registry.find_reusable("let x = va", "}").is_none());
    }

    #[tokio::test]
    async fn shorter_pending_prefix_not_returned_for_backspace() {
        let mut registry = PendingRequestRegistry::new();
        registry.add(pending("let x = val", ";"));

        // find_reusable only reuses exact or typed-ahead contexts.
        assert!(registry.find_reusable("let x = ", ";").is_none());
    }

    #[tokio::test]
    async fn cancel_obsolete_spares_backspace_case() {
        let mut registry = PendingRequestRegistry::new();
        registry.add(pending("let x = val", ";"));

        // Backspaced to a shorter prefix: the longer pending request stays.
        let cancelled = registry.cancel_obsolete("let x = ", ";");
        assert_eq!(cancelled, 0);
        assert_eq!(registry.len(), 1);
        assert!(!registry.requests[0].is_cancelled());
    }

    #[tokio::test]
    async fn cancel_obsolete_removes_diverged_contexts() {
        let mut registry = PendingRequestRegistry::new();
        registry.add(pending("let x = foo", ";"));
        registry.add(pending("let x = ", "}"));
        let kept = pending("let x = ", ";");
        let kept_id = kept.id;
        registry.add(kept);

        // "let x = bar" diverges from "let x = foo" and from suffix "}".
        let cancelled = registry.cancel_obsolete("let x = bar", ";");
        assert_eq!(cancelled, 2);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.requests[0].id, kept_id);
    }

    #[tokio::test]
    async fn clear_cancels_everything() {
        let mut registry = PendingRequestRegistry::new();
        let a = pending("a", "");
        let b = pending("b", "");
        let (ta, tb) = (a.cancel_token.clone(), b.cancel_token.clone());
        registry.add(a);
        registry.add(b);

        registry.clear();
        assert!(registry.is_empty());
        assert!(ta.is_cancelled());
        assert!(tb.is_cancelled());
    }
}
