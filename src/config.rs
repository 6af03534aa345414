// SPDX-License-Identifier: MIT
// Coordinator and matcher configuration.

use serde::{Deserialize, Serialize};

const DEFAULT_DEBOUNCE_MS: u64 = 300;
const DEFAULT_HISTORY_CAPACITY: usize = 20;
const DEFAULT_MAX_PREFIX_CHARS: usize = 4000;
const DEFAULT_MAX_SUFFIX_CHARS: usize = 2000;

// ─── CoordinatorConfig ────────────────────────────────────────────────────────

/// Tunables for the completion coordinator.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Quiet period before a scheduled generation fires (default: 300 ms).
    #[serde(rename = "debounceMs")]
    pub debounce_ms: u64,
    /// Maximum number of suggestions retained in history (default: 20).
    #[serde(rename = "historyCapacity")]
    pub history_capacity: usize,
    /// Truncate generated suggestions to their first line. Default: false.
    #[serde(rename = "singleLine")]
    pub single_line: bool,
    /// Right-anchored prefix window sent to the provider (default: 4000 chars).
    #[serde(rename = "maxPrefixChars")]
    pub max_prefix_chars: usize,
    /// Left-anchored suffix window sent to the provider (default: 2000 chars).
    #[serde(rename = "maxSuffixChars")]
    pub max_suffix_chars: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            single_line: false,
            max_prefix_chars: DEFAULT_MAX_PREFIX_CHARS,
            max_suffix_chars: DEFAULT_MAX_SUFFIX_CHARS,
        }
    }
}

// ─── MatcherConfig ────────────────────────────────────────────────────────────

/// Tunables for the enhanced cache matcher.
///
/// Mutable at runtime via [`crate::matcher::EnhancedCacheMatcher::update_config`];
/// changes apply to subsequent lookups only and never re-evaluate existing
/// history entries.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Matches scoring below this confidence are discarded (default: 0.7).
    #[serde(rename = "minConfidence")]
    pub min_confidence: f64,
    /// Maximum Levenshtein distance between prefixes for a fuzzy match
    /// (default: 2).
    #[serde(rename = "maxEditDistance")]
    pub max_edit_distance: usize,
    /// Enable the fuzzy (edit-distance) strategy. Opt-in: a one-character
    /// rename ("x" → "z") is an edit distance of 1 but addresses a different
    /// statement, so fuzzy reuse is off unless the embedder asks for it.
    /// Default: false.
    #[serde(rename = "enableFuzzyMatching")]
    pub enable_fuzzy_matching: bool,
    /// Enable the multi-line structure strategy. Default: true.
    #[serde(rename = "enableMultiLineMatching")]
    pub enable_multi_line_matching: bool,
    /// Enable the context-similarity strategy. Default: true.
    #[serde(rename = "enableContextScoring")]
    pub enable_context_scoring: bool,
    /// Minimum line-structure similarity for a multi-line match
    /// (default: 0.8).
    #[serde(rename = "multiLineSimilarityThreshold")]
    pub multi_line_similarity_threshold: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.7,
            max_edit_distance: 2,
            enable_fuzzy_matching: false,
            enable_multi_line_matching: true,
            enable_context_scoring: true,
            multi_line_similarity_threshold: 0.8,
        }
    }
}
