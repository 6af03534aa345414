// SPDX-License-Identifier: MIT
// Generation boundary.
//
// The coordinator consumes a provider through this narrow interface: one
// async call per generation, yielding text chunks terminated by a usage
// record. Providers are not restartable — a new call is required per
// generation — and this layer never retries; retry/backoff policy belongs to
// the embedder that supplies the provider.

use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::model::{CostReport, UsageRecord};

/// How the model consumes the cursor context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    /// The model accepts prefix and suffix directly and produces only the
    /// missing middle text.
    FillInMiddle,
    /// Chat-style fallback: the provider wraps the context in a delimited
    /// instruction and the coordinator parses a tagged region back out of
    /// the reply.
    ChatInstruct,
}

/// One element of a generation stream.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    /// A chunk of completion text, in arrival order.
    Text(String),
    /// Terminal record: token counts and cost for the whole call.
    Usage(UsageRecord),
}

/// The finite event sequence produced by one generation call.
pub type GenerationStream = BoxStream<'static, Result<GenerationEvent>>;

/// Common interface for completion providers.
///
/// The cancellation token is advisory: the provider should abort the
/// underlying call when it fires, best-effort.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Which prompt shape this provider's model understands.
    fn mode(&self) -> GenerationMode;

    /// Start one generation for the given context window.
    async fn generate(
        &self,
        prefix: &str,
        suffix: &str,
        cancel: CancellationToken,
    ) -> Result<GenerationStream>;
}

/// Settings accessor consumed by the coordinator: whether automatic
/// (non-manual) triggering is currently enabled.
pub trait TriggerSettings: Send + Sync {
    fn automatic_enabled(&self) -> bool;
}

/// Default settings: automatic triggering always on.
pub struct AlwaysEnabled;

impl TriggerSettings for AlwaysEnabled {
    fn automatic_enabled(&self) -> bool {
        true
    }
}

/// Invoked once per completed generation with its cost accounting.
pub type CostCallback = Box<dyn Fn(CostReport) + Send + Sync>;
