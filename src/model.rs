// SPDX-License-Identifier: MIT
// Inline completion coordinator — data model.

use serde::{Deserialize, Serialize};

/// The cursor context a completion request is addressed by.
///
/// The cursor position splits the visible document into a *prefix*
/// (everything before the cursor, right-truncated to a bounded window) and a
/// *suffix* (everything after the cursor, left-truncated). Two contexts are
/// *compatible* when their suffixes are equal and one prefix is a string
/// prefix of the other — i.e. the user has only typed or deleted at the
/// cursor since the other context was captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionContext {
    /// Text immediately before the cursor.
    pub prefix: String,
    /// Text immediately after the cursor.
    pub suffix: String,
}

impl CompletionContext {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    /// True when one context extends the other: equal suffixes and one
    /// prefix is a string prefix of the other.
    pub fn is_compatible_with(&self, other: &CompletionContext) -> bool {
        self.suffix == other.suffix
            && (self.prefix.starts_with(&other.prefix) || other.prefix.starts_with(&self.prefix))
    }
}

/// How a completion request was initiated.
///
/// Automatic triggers (cursor movement, typing) are gated by the embedder's
/// settings; manual triggers (an explicit keybinding) bypass that gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Automatic,
    Manual,
}

/// Input parameters for a completion request.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionRequest {
    /// Text immediately before the cursor.
    pub prefix: String,
    /// Text immediately after the cursor.
    pub suffix: String,
    /// How the request was initiated.
    #[serde(default = "Trigger::automatic")]
    pub trigger: Trigger,
}

impl Trigger {
    fn automatic() -> Self {
        Trigger::Automatic
    }
}

impl CompletionRequest {
    pub fn automatic(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
            trigger: Trigger::Automatic,
        }
    }

    pub fn manual(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
            trigger: Trigger::Manual,
        }
    }
}

/// A completion generated for exactly one cursor context.
///
/// Immutable once created — the history only ever replaces or evicts entries,
/// never edits them in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    /// The generated completion text.
    pub text: String,
    /// The prefix the completion was generated for.
    pub prefix: String,
    /// The suffix the completion was generated for.
    pub suffix: String,
}

impl Suggestion {
    pub fn new(
        text: impl Into<String>,
        prefix: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }
}

/// Which cache-matching strategy produced a [`MatchResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Identical prefix and suffix.
    Exact,
    /// The user typed ahead into the cached suggestion.
    PartialTyping,
    /// The user deleted characters backwards from a cached context.
    BackwardDeletion,
    /// Prefixes within a bounded edit distance of each other.
    Fuzzy,
    /// Multi-line contexts with similar line structure.
    MultiLine,
    /// General token-overlap similarity between contexts.
    ContextSimilar,
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchKind::Exact => write!(f, "exact"),
            MatchKind::PartialTyping => write!(f, "partial_typing"),
            MatchKind::BackwardDeletion => write!(f, "backward_deletion"),
            MatchKind::Fuzzy => write!(f, "fuzzy"),
            MatchKind::MultiLine => write!(f, "multi_line"),
            MatchKind::ContextSimilar => write!(f, "context_similar"),
        }
    }
}

/// A usable cache match found by the matcher.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    /// The completion text to show, already adjusted to the current context.
    pub text: String,
    /// The strategy that produced this match.
    #[serde(rename = "matchType")]
    pub kind: MatchKind,
    /// Confidence in [0.0, 1.0]. Higher wins; ties prefer cheaper strategies.
    pub confidence: f64,
}

/// Terminal record of a generation stream — token counts and cost for the
/// single model call that produced the chunks before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    #[serde(rename = "inputTokens")]
    pub input_tokens: u64,
    #[serde(rename = "outputTokens")]
    pub output_tokens: u64,
    /// Cost in USD as reported by the provider.
    pub cost: f64,
}

/// Payload handed to the cost callback once per completed generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CostReport {
    pub cost: f64,
    #[serde(rename = "inputTokens")]
    pub input_tokens: u64,
    #[serde(rename = "outputTokens")]
    pub output_tokens: u64,
    #[serde(rename = "cacheWriteTokens")]
    pub cache_write_tokens: u64,
    #[serde(rename = "cacheReadTokens")]
    pub cache_read_tokens: u64,
}

impl From<UsageRecord> for CostReport {
    fn from(usage: UsageRecord) -> Self {
        Self {
            cost: usage.cost,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cache_write_tokens: 0,
            cache_read_tokens: 0,
        }
    }
}
