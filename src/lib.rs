// SPDX-License-Identifier: MIT
//! Inline completion coordinator.
//!
//! On every cursor movement or edit, the coordinator decides within a
//! sub-second budget whether to serve a cached suggestion, reuse an
//! in-flight generation, start a new one, or discard stale work — while a
//! remote model asynchronously produces completion text. The pieces:
//!
//! - [`adjust`] — does a prior suggestion still apply at the new cursor
//!   context, and what remains once the user has typed ahead into it.
//! - [`matcher`] — multi-strategy search over the suggestion history.
//! - [`multicast`] — one generation stream, many independent readers.
//! - [`debounce`] — collapse bursts of triggers into one execution.
//! - [`pending`] — dedup and cancellation of in-flight generations.
//! - [`coordinator`] — the per-session state machine tying them together.
//!
//! The coordinator is a short-lived, in-memory layer rebuilt per editing
//! session; it performs no retries and persists nothing.

pub mod adjust;
pub mod config;
pub mod coordinator;
pub mod debounce;
pub mod error;
pub mod history;
pub mod matcher;
pub mod model;
pub mod multicast;
pub mod pending;
pub mod postprocess;
pub mod provider;

pub use config::{CoordinatorConfig, MatcherConfig};
pub use coordinator::{CacheStats, CompletionCoordinator, CoordinatorOptions};
pub use error::CompletionError;
pub use history::SuggestionHistory;
pub use model::{
    CompletionContext, CompletionRequest, CostReport, MatchKind, MatchResult, Suggestion,
    Trigger, UsageRecord,
};
pub use multicast::{MulticastStream, StreamEvent};
pub use provider::{
    CompletionProvider, CostCallback, GenerationEvent, GenerationMode, GenerationStream,
    TriggerSettings,
};
