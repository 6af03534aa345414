// SPDX-License-Identifier: MIT
// Completion coordinator.
//
// The per-session state machine tying the pieces together. For every request:
// cache lookup first (adjuster, then the multi-strategy matcher), then the
// debounced generation pipeline — reuse a compatible in-flight generation
// when one exists, otherwise cancel obsolete work and dispatch a fresh model
// call behind a multicast stream. Results are applied in completion order; a
// cancellation check guards every point where a result would touch shared
// state, so a slow stale response can never overwrite a newer one.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adjust;
use crate::config::{CoordinatorConfig, MatcherConfig};
use crate::debounce::RequestDebouncer;
use crate::error::CompletionError;
use crate::history::SuggestionHistory;
use crate::matcher::EnhancedCacheMatcher;
use crate::model::{
    CompletionContext, CompletionRequest, CostReport, Suggestion, Trigger, UsageRecord,
};
use crate::multicast::{MulticastStream, StreamEvent};
use crate::pending::{PendingRequest, PendingRequestRegistry};
use crate::postprocess;
use crate::provider::{
    AlwaysEnabled, CompletionProvider, CostCallback, GenerationEvent, TriggerSettings,
};

/// Cache lookup counters for one coordinator instance.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Hit rate as a value 0.0–1.0. Returns 0.0 if no lookups yet.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Construction options for [`CompletionCoordinator`].
pub struct CoordinatorOptions {
    pub settings: Arc<dyn TriggerSettings>,
    pub config: CoordinatorConfig,
    pub matcher_config: MatcherConfig,
    /// Invoked once per completed generation with its cost accounting.
    pub cost_callback: Option<CostCallback>,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            settings: Arc::new(AlwaysEnabled),
            config: CoordinatorConfig::default(),
            matcher_config: MatcherConfig::default(),
            cost_callback: None,
        }
    }
}

struct CoordinatorInner {
    config: RwLock<CoordinatorConfig>,
    matcher: EnhancedCacheMatcher,
    history: Mutex<SuggestionHistory>,
    registry: Mutex<PendingRequestRegistry>,
    debouncer: RequestDebouncer<CompletionContext>,
    provider: Arc<dyn CompletionProvider>,
    settings: Arc<dyn TriggerSettings>,
    cost_callback: Option<CostCallback>,
    hits: AtomicU64,
    misses: AtomicU64,
    /// Parent of every per-request token; fires on dispose.
    session_token: CancellationToken,
    disposed: AtomicBool,
}

/// Per-editing-session completion coordinator.
///
/// Explicitly constructed and caller-owned: one instance per open
/// document/session, fully initialised by [`new`](Self::new) and shut down by
/// [`dispose`](Self::dispose). Cheaply cloneable — all clones share the same
/// internal state via `Arc`.
#[derive(Clone)]
pub struct CompletionCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl CompletionCoordinator {
    /// Create a coordinator with default options.
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self::with_options(provider, CoordinatorOptions::default())
    }

    pub fn with_options(provider: Arc<dyn CompletionProvider>, options: CoordinatorOptions) -> Self {
        let history = SuggestionHistory::new(options.config.history_capacity);
        Self {
            inner: Arc::new(CoordinatorInner {
                config: RwLock::new(options.config),
                matcher: EnhancedCacheMatcher::new(options.matcher_config),
                history: Mutex::new(history),
                registry: Mutex::new(PendingRequestRegistry::new()),
                debouncer: RequestDebouncer::new(),
                provider,
                settings: options.settings,
                cost_callback: options.cost_callback,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                session_token: CancellationToken::new(),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Run the full pipeline for one request and return the suggestion that
    /// is available for its context once the debounce window settles.
    ///
    /// A cache hit returns immediately with no generation work. Otherwise the
    /// generation is debounced; when several requests land in one window only
    /// the most recent one's generation runs, and every caller is answered
    /// from the refreshed cache.
    pub async fn suggest(
        &self,
        request: CompletionRequest,
    ) -> Result<Option<Suggestion>, CompletionError> {
        let inner = &self.inner;
        if inner.disposed.load(Ordering::SeqCst) {
            return Err(CompletionError::Disposed);
        }
        let context = CompletionContext::new(request.prefix, request.suffix);

        if let Some(text) = self.check_cache(&context.prefix, &context.suffix) {
            inner.hits.fetch_add(1, Ordering::Relaxed);
            debug!(chars = text.len(), "serving completion from cache");
            return Ok(Some(Suggestion::new(text, context.prefix, context.suffix)));
        }
        inner.misses.fetch_add(1, Ordering::Relaxed);

        if request.trigger == Trigger::Automatic && !inner.settings.automatic_enabled() {
            debug!("automatic triggering disabled, skipping generation");
            return Ok(None);
        }

        let delay = Duration::from_millis(inner.config.read().expect("config lock").debounce_ms);
        let coordinator = self.clone();
        let exec_context = context.clone();
        let flush_context = context.clone();
        inner
            .debouncer
            .debounce_with_flush(
                context.clone(),
                delay,
                // A pending request whose context has diverged from ours is
                // flushed immediately so its partial value is still captured.
                move |pending| !pending.is_compatible_with(&flush_context),
                move || async move {
                    coordinator.run_generation(exec_context).await;
                    Ok(())
                },
            )
            .await;

        if inner.disposed.load(Ordering::SeqCst) {
            return Err(CompletionError::Disposed);
        }

        // The window settled. The execution that ran may have been scheduled
        // by a later, compatible request; serve this caller whatever the
        // cache now holds for its own context.
        Ok(self
            .check_cache(&context.prefix, &context.suffix)
            .map(|text| Suggestion::new(text, context.prefix, context.suffix)))
    }

    /// Synchronously return the best currently-available suggestion text for
    /// the context (empty when none), while kicking off background work that
    /// will populate the cache for a subsequent query at the same or an
    /// extended context.
    ///
    /// Hit/miss accounting happens in the background pipeline, once per query.
    pub fn query(&self, prefix: &str, suffix: &str) -> String {
        let inner = &self.inner;
        if inner.disposed.load(Ordering::SeqCst) {
            return String::new();
        }

        let cached = self.check_cache(prefix, suffix);

        let coordinator = self.clone();
        let request = CompletionRequest::automatic(prefix, suffix);
        tokio::spawn(async move {
            if let Err(err) = coordinator.suggest(request).await {
                if !err.is_cancelled() {
                    warn!(error = %err, "background completion failed");
                }
            }
        });

        cached.unwrap_or_default()
    }

    /// Shut the session down: cancel every in-flight generation, discard the
    /// pending debounce window, and drop the history. Subsequent requests
    /// fail with [`CompletionError::Disposed`].
    pub fn dispose(&self) {
        let inner = &self.inner;
        if inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("completion coordinator disposed");
        inner.session_token.cancel();
        inner.debouncer.clear();
        inner.registry.lock().expect("registry lock").clear();
        inner.history.lock().expect("history lock").clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Cache lookup counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
        }
    }

    /// Snapshot of the coordinator configuration.
    pub fn config(&self) -> CoordinatorConfig {
        self.inner.config.read().expect("config lock").clone()
    }

    /// Replace the coordinator configuration.
    ///
    /// Applies to subsequent requests; the history capacity is fixed at
    /// construction.
    pub fn update_config(&self, config: CoordinatorConfig) {
        *self.inner.config.write().expect("config lock") = config;
    }

    pub fn matcher_config(&self) -> MatcherConfig {
        self.inner.matcher.config()
    }

    pub fn update_matcher_config(&self, config: MatcherConfig) {
        self.inner.matcher.update_config(config);
    }

    /// Number of generations currently in flight.
    pub fn pending_count(&self) -> usize {
        self.inner.registry.lock().expect("registry lock").len()
    }

    // ─── Internals ────────────────────────────────────────────────────────────

    /// Cheap adjuster lookup first, then the multi-strategy matcher.
    fn check_cache(&self, prefix: &str, suffix: &str) -> Option<String> {
        let history = self.inner.history.lock().expect("history lock");
        if let Some(text) = adjust::find_in_history(prefix, suffix, &history) {
            if !text.is_empty() {
                return Some(text);
            }
        }
        self.inner
            .matcher
            .find_best_match(prefix, suffix, &history)
            .map(|result| result.text)
    }

    /// Debounced execution body: classify the outcome, never propagate.
    async fn run_generation(&self, context: CompletionContext) {
        match self.generate_and_cache(context).await {
            Ok(_) => {}
            Err(err) if err.is_cancelled() => {
                debug!("generation result discarded: {err}");
            }
            Err(err) => {
                // Treated as an empty suggestion; no cache entry is written
                // and nothing surfaces to the caller.
                warn!(error = %err, "completion generation failed");
            }
        }
    }

    /// Dedup-or-create, then drive the generation to completion and cache
    /// the post-processed suggestion.
    async fn generate_and_cache(
        &self,
        context: CompletionContext,
    ) -> Result<Option<Suggestion>, CompletionError> {
        let inner = &self.inner;
        if inner.disposed.load(Ordering::SeqCst) {
            return Err(CompletionError::Disposed);
        }

        let reusable = {
            let registry = inner.registry.lock().expect("registry lock");
            registry.find_reusable(&context.prefix, &context.suffix)
        };
        if let Some(pending) = reusable {
            debug!(id = %pending.id, "reusing in-flight generation");
            return self.await_pending(pending, context).await;
        }

        // Nothing reusable: whatever else is in flight is stale for the text
        // the user is looking at now.
        {
            let mut registry = inner.registry.lock().expect("registry lock");
            let cancelled = registry.cancel_obsolete(&context.prefix, &context.suffix);
            if cancelled > 0 {
                debug!(cancelled, "cancelled obsolete pending requests");
            }
        }

        let token = inner.session_token.child_token();
        let (window_prefix, window_suffix) = {
            let config = inner.config.read().expect("config lock");
            (
                postprocess::truncate_prefix(&context.prefix, config.max_prefix_chars).to_string(),
                postprocess::truncate_suffix(&context.suffix, config.max_suffix_chars).to_string(),
            )
        };

        let stream = inner
            .provider
            .generate(&window_prefix, &window_suffix, token.clone())
            .await
            .map_err(CompletionError::Generation)?;
        if token.is_cancelled() {
            return Err(CompletionError::Cancelled);
        }

        let multicast = MulticastStream::new(stream);
        let pending = PendingRequest::new(
            context.prefix.clone(),
            context.suffix.clone(),
            multicast.clone(),
            token.clone(),
        );
        let pending_id = pending.id;
        debug!(id = %pending_id, "generation dispatched");
        inner.registry.lock().expect("registry lock").add(pending);

        let outcome = self.consume(&multicast, &token).await;
        inner
            .registry
            .lock()
            .expect("registry lock")
            .remove(pending_id);
        let (raw, usage) = outcome?;

        if token.is_cancelled() {
            return Err(CompletionError::Cancelled);
        }

        let single_line = inner.config.read().expect("config lock").single_line;
        let text = postprocess::post_process(
            &raw,
            &context.prefix,
            &context.suffix,
            inner.provider.mode(),
            single_line,
        );

        // The model call completed, so its cost was incurred whether or not
        // the text survives the usefulness filters.
        if let (Some(callback), Some(usage)) = (inner.cost_callback.as_ref(), usage) {
            callback(CostReport::from(usage));
        }

        if text.is_empty() {
            debug!("generation produced no useful suggestion");
            return Ok(None);
        }

        let suggestion = Suggestion::new(text, context.prefix, context.suffix);
        if token.is_cancelled() {
            return Err(CompletionError::Cancelled);
        }
        inner
            .history
            .lock()
            .expect("history lock")
            .push(suggestion.clone());
        debug!(chars = suggestion.text.len(), "suggestion cached");
        Ok(Some(suggestion))
    }

    /// Await a reused in-flight generation and adjust its suggestion to this
    /// request's context. The cost callback stays with the request that
    /// created the generation.
    async fn await_pending(
        &self,
        pending: PendingRequest,
        context: CompletionContext,
    ) -> Result<Option<Suggestion>, CompletionError> {
        let (raw, _usage) = self.consume(&pending.stream, &pending.cancel_token).await?;

        let single_line = self.inner.config.read().expect("config lock").single_line;
        let text = postprocess::post_process(
            &raw,
            &pending.prefix,
            &pending.suffix,
            self.inner.provider.mode(),
            single_line,
        );
        if text.is_empty() {
            return Ok(None);
        }

        // Cache under the originating context; the history de-duplicates
        // against the creator's own insert.
        let suggestion = Suggestion::new(text, pending.prefix.clone(), pending.suffix.clone());
        if pending.cancel_token.is_cancelled() {
            return Err(CompletionError::Cancelled);
        }
        self.inner
            .history
            .lock()
            .expect("history lock")
            .push(suggestion.clone());

        Ok(
            adjust::adjust(&suggestion, &context.prefix, &context.suffix)
                .filter(|text| !text.is_empty())
                .map(|text| Suggestion::new(text, context.prefix, context.suffix)),
        )
    }

    /// Drain one subscription to its end, accumulating text and the usage
    /// record, with a cancellation check at every resume point.
    async fn consume(
        &self,
        stream: &MulticastStream<GenerationEvent>,
        token: &CancellationToken,
    ) -> Result<(String, Option<UsageRecord>), CompletionError> {
        let mut rx = stream.subscribe();
        let mut text = String::new();
        let mut usage = None;

        while let Some(event) = rx.recv().await {
            if token.is_cancelled() {
                return Err(CompletionError::Cancelled);
            }
            match event {
                StreamEvent::Item(GenerationEvent::Text(chunk)) => text.push_str(&chunk),
                StreamEvent::Item(GenerationEvent::Usage(record)) => usage = Some(record),
                StreamEvent::Ended => break,
            }
        }

        if let Some(message) = stream.error() {
            return Err(CompletionError::Generation(anyhow::anyhow!(message)));
        }
        if stream.is_cancelled() || token.is_cancelled() {
            return Err(CompletionError::Cancelled);
        }
        Ok((text, usage))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{GenerationMode, GenerationStream};
    use async_trait::async_trait;
    use futures_util::{stream, StreamExt};
    use std::sync::atomic::AtomicUsize;

    /// Provider that returns a fixed completion and counts its calls.
    struct FixedProvider {
        text: &'static str,
        calls: AtomicUsize,
    }

    impl FixedProvider {
        fn new(text: &'static str) -> Arc<Self> {
            Arc::new(Self {
                text,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CompletionProvider for FixedProvider {
        fn mode(&self) -> GenerationMode {
            GenerationMode::FillInMiddle
        }

        async fn generate(
            &self,
            _prefix: &str,
            _suffix: &str,
            _cancel: CancellationToken,
        ) -> anyhow::Result<GenerationStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let events = vec![
                Ok(GenerationEvent::Text(self.text.to_string())),
                Ok(GenerationEvent::Usage(UsageRecord {
                    input_tokens: 10,
                    output_tokens: 5,
                    cost: 0.001,
                })),
            ];
            Ok(stream::iter(events).boxed())
        }
    }

    fn fast_options() -> CoordinatorOptions {
        CoordinatorOptions {
            config: CoordinatorConfig {
                debounce_ms: 10,
                ..CoordinatorConfig::default()
            },
            ..CoordinatorOptions::default()
        }
    }

    #[tokio::test]
    async fn generation_result_is_cached_and_served() {
        let provider = FixedProvider::new("completion");
        let coordinator =
            CompletionCoordinator::with_options(provider.clone(), fast_options());

        let first = coordinator
            .suggest(CompletionRequest::automatic("let x = ", ";"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.text, "completion");

        // Second identical request is a pure cache hit.
        let second = coordinator
            .suggest(CompletionRequest::automatic("let x = ", ";"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.text, "completion");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.stats().hits, 1);
    }

    #[tokio::test]
    async fn automatic_trigger_gated_by_settings() {
        struct Disabled;
        impl TriggerSettings for Disabled {
            fn automatic_enabled(&self) -> bool {
                false
            }
        }

        let provider = FixedProvider::new("unused");
        let coordinator = CompletionCoordinator::with_options(
            provider.clone(),
            CoordinatorOptions {
                settings: Arc::new(Disabled),
                ..fast_options()
            },
        );

        let result = coordinator
            .suggest(CompletionRequest::automatic("let x = ", ";"))
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);

        // Manual triggers bypass the gate.
        let result = coordinator
            .suggest(CompletionRequest::manual("let x = ", ";"))
            .await
            .unwrap();
        assert_eq!(result.unwrap().text, "completion");
    }

    #[tokio::test]
    async fn disposed_coordinator_rejects_requests() {
        let provider = FixedProvider::new("unused");
        let coordinator = CompletionCoordinator::with_options(provider, fast_options());
        coordinator.dispose();

        let err = coordinator
            .suggest(CompletionRequest::automatic("a", "b"))
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Disposed));
        assert!(coordinator.is_disposed());
    }

    #[tokio::test]
    async fn cost_callback_fires_once_per_generation() {
        let reports: Arc<Mutex<Vec<CostReport>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        let provider = FixedProvider::new("completion");
        let coordinator = CompletionCoordinator::with_options(
            provider,
            CoordinatorOptions {
                cost_callback: Some(Box::new(move |report| {
                    sink.lock().unwrap().push(report);
                })),
                ..fast_options()
            },
        );

        coordinator
            .suggest(CompletionRequest::automatic("let x = ", ";"))
            .await
            .unwrap();

        let reports = reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].input_tokens, 10);
        assert_eq!(reports[0].output_tokens, 5);
        assert!((reports[0].cost - 0.001).abs() < 1e-9);
    }

    #[tokio::test]
    async fn failed_generation_reduces_to_no_suggestion() {
        struct FailingProvider;

        #[async_trait]
        impl CompletionProvider for FailingProvider {
            fn mode(&self) -> GenerationMode {
                GenerationMode::FillInMiddle
            }
            async fn generate(
                &self,
                _prefix: &str,
                _suffix: &str,
                _cancel: CancellationToken,
            ) -> anyhow::Result<GenerationStream> {
                anyhow::bail!("model unreachable")
            }
        }

        let coordinator =
            CompletionCoordinator::with_options(Arc::new(FailingProvider), fast_options());
        let result = coordinator
            .suggest(CompletionRequest::automatic("let x = ", ";"))
            .await
            .unwrap();
        assert!(result.is_none());
        // No cache entry was written for the failed context.
        assert_eq!(coordinator.stats().hits, 0);
    }

    #[tokio::test]
    async fn chat_mode_reply_is_tag_extracted() {
        struct ChatProvider;

        #[async_trait]
        impl CompletionProvider for ChatProvider {
            fn mode(&self) -> GenerationMode {
                GenerationMode::ChatInstruct
            }
            async fn generate(
                &self,
                _prefix: &str,
                _suffix: &str,
                _cancel: CancellationToken,
            ) -> anyhow::Result<GenerationStream> {
                let events = vec![Ok(GenerationEvent::Text(
                    "Here is the code:\n<completion>answer()</completion>".to_string(),
                ))];
                Ok(stream::iter(events).boxed())
            }
        }

        let coordinator =
            CompletionCoordinator::with_options(Arc::new(ChatProvider), fast_options());
        let result = coordinator
            .suggest(CompletionRequest::automatic("let x = ", ";"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.text, "answer()");
    }

    #[tokio::test]
    async fn query_returns_cached_text_synchronously() {
        let provider = FixedProvider::new("completion");
        let coordinator =
            CompletionCoordinator::with_options(provider.clone(), fast_options());

        // Cold query: nothing cached yet, background work kicks off.
        assert_eq!(coordinator.query("let x = ", ";"), "");

        // Give the background pipeline time to settle.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(coordinator.query("let x = ", ";"), "completion");
        // Typed ahead: the cached suggestion is adjusted, not regenerated.
        assert_eq!(coordinator.query("let x = comp", ";"), "letion");
    }
}
