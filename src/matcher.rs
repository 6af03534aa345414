// SPDX-License-Identifier: MIT
// Enhanced cache matcher.
//
// Searches the suggestion history with a ladder of strategies, cheapest and
// most certain first: exact, partial typing, backward deletion, fuzzy edit
// distance, multi-line structure, and general context similarity. The
// highest-confidence usable result above the configured minimum wins; ties
// prefer the earlier strategy. Below-threshold and empty-text candidates are
// discarded.

use std::sync::RwLock;

use tracing::debug;

use crate::adjust;
use crate::config::MatcherConfig;
use crate::history::SuggestionHistory;
use crate::model::{MatchKind, MatchResult, Suggestion};

/// Window of trailing prefix characters compared by the fuzzy strategy.
///
/// Prefixes can be thousands of characters; edits near the cursor are the
/// only ones a fuzzy reuse can tolerate, so the distance is computed on the
/// tail window only.
const FUZZY_WINDOW_CHARS: usize = 64;

/// Window of trailing prefix / leading suffix characters tokenised by the
/// context-similarity strategy.
const SIMILARITY_WINDOW_CHARS: usize = 256;

/// Minimum distinct tokens per context before similarity scoring is
/// meaningful; tiny contexts score a degenerate 1.0 against anything that
/// shares a keyword.
const MIN_CONTEXT_TOKENS: usize = 4;

/// Characters that mark a natural completion trigger point when the prefix
/// ends with one of them.
const TRIGGER_CHARS: [char; 6] = ['{', '(', '[', '=', ':', ','];

/// Multi-strategy matcher over the suggestion history.
///
/// Configuration is mutable at runtime; changes apply to subsequent lookups
/// only and never re-evaluate existing history entries.
pub struct EnhancedCacheMatcher {
    config: RwLock<MatcherConfig>,
}

impl EnhancedCacheMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> MatcherConfig {
        self.config.read().expect("matcher config lock poisoned").clone()
    }

    /// Replace the configuration for subsequent lookups.
    pub fn update_config(&self, config: MatcherConfig) {
        *self.config.write().expect("matcher config lock poisoned") = config;
    }

    /// Find the best usable match for the current context, or `None` when
    /// nothing in the history clears the confidence threshold.
    pub fn find_best_match(
        &self,
        prefix: &str,
        suffix: &str,
        history: &SuggestionHistory,
    ) -> Option<MatchResult> {
        let config = self.config();
        let mut best: Option<MatchResult> = None;

        // Strategies run in fixed order; a later candidate replaces the best
        // only on strictly greater confidence, so ties keep the cheaper one.
        for entry in history.iter_newest_first() {
            for candidate in [
                exact_match(entry, prefix, suffix),
                partial_typing_match(entry, prefix, suffix),
                backward_deletion_match(entry, prefix, suffix),
                fuzzy_match(entry, prefix, suffix, &config),
                multi_line_match(entry, prefix, suffix, &config),
                context_similar_match(entry, prefix, suffix, &config),
            ]
            .into_iter()
            .flatten()
            {
                if candidate.text.is_empty() || candidate.confidence < config.min_confidence {
                    continue;
                }
                if best
                    .as_ref()
                    .map(|b| candidate.confidence > b.confidence)
                    .unwrap_or(true)
                {
                    best = Some(candidate);
                }
            }
        }

        if let Some(ref result) = best {
            debug!(
                kind = %result.kind,
                confidence = result.confidence,
                "cache matcher found usable suggestion"
            );
        }
        best
    }
}

impl Default for EnhancedCacheMatcher {
    fn default() -> Self {
        Self::new(MatcherConfig::default())
    }
}

// ─── Strategies ───────────────────────────────────────────────────────────────

fn exact_match(entry: &Suggestion, prefix: &str, suffix: &str) -> Option<MatchResult> {
    if entry.prefix == prefix && entry.suffix == suffix {
        return Some(MatchResult {
            text: entry.text.clone(),
            kind: MatchKind::Exact,
            confidence: 1.0,
        });
    }
    None
}

/// The user typed ahead into the cached suggestion: reuse the adjuster's
/// typed-ahead logic and scale confidence by how much of the suggestion
/// remains unconsumed.
fn partial_typing_match(entry: &Suggestion, prefix: &str, suffix: &str) -> Option<MatchResult> {
    if entry.prefix == prefix && entry.suffix == suffix {
        return None; // exact strategy already covers this
    }
    let remainder = adjust::adjust(entry, prefix, suffix)?;
    if remainder.is_empty() {
        return None;
    }
    let remaining_frac = remainder.len() as f64 / entry.text.len().max(1) as f64;
    Some(MatchResult {
        text: remainder,
        kind: MatchKind::PartialTyping,
        confidence: 0.92 + 0.07 * remaining_frac,
    })
}

/// The user deleted characters backwards: the current prefix is a proper
/// prefix of the cached one with the suffix unchanged. Reconstruct by
/// prepending the deleted span back onto the cached text.
fn backward_deletion_match(entry: &Suggestion, prefix: &str, suffix: &str) -> Option<MatchResult> {
    if entry.suffix != suffix || entry.prefix.len() <= prefix.len() {
        return None;
    }
    let deleted = entry.prefix.strip_prefix(prefix)?;
    Some(MatchResult {
        text: format!("{deleted}{}", entry.text),
        kind: MatchKind::BackwardDeletion,
        confidence: 0.87,
    })
}

/// Prefix tails within a bounded Levenshtein distance of each other, suffix
/// unchanged.
fn fuzzy_match(
    entry: &Suggestion,
    prefix: &str,
    suffix: &str,
    config: &MatcherConfig,
) -> Option<MatchResult> {
    if !config.enable_fuzzy_matching || entry.suffix != suffix || entry.prefix == prefix {
        return None;
    }
    let a = tail_chars(prefix, FUZZY_WINDOW_CHARS);
    let b = tail_chars(&entry.prefix, FUZZY_WINDOW_CHARS);
    // Length difference is a lower bound on the distance.
    if a.chars().count().abs_diff(b.chars().count()) > config.max_edit_distance {
        return None;
    }
    let distance = strsim::levenshtein(a, b);
    if distance == 0 || distance > config.max_edit_distance {
        return None;
    }
    Some(MatchResult {
        text: entry.text.clone(),
        kind: MatchKind::Fuzzy,
        confidence: 0.85 - 0.05 * distance as f64,
    })
}

/// Both contexts span multiple lines and their line structure (indentation
/// plus leading token per line) is similar even where the exact text differs.
fn multi_line_match(
    entry: &Suggestion,
    prefix: &str,
    suffix: &str,
    config: &MatcherConfig,
) -> Option<MatchResult> {
    if !config.enable_multi_line_matching {
        return None;
    }
    if !is_multi_line(prefix) || !is_multi_line(&entry.prefix) {
        return None;
    }
    if entry.prefix == prefix && entry.suffix == suffix {
        return None;
    }
    let prefix_sim = line_shape_similarity(prefix, &entry.prefix);
    let suffix_sim = line_shape_similarity(suffix, &entry.suffix);
    let similarity = 0.5 * prefix_sim + 0.5 * suffix_sim;
    if similarity < config.multi_line_similarity_threshold {
        return None;
    }
    Some(MatchResult {
        text: entry.text.clone(),
        kind: MatchKind::MultiLine,
        confidence: 0.75,
    })
}

/// General token-overlap similarity between the current and cached context,
/// independent of prefix containment, boosted when the cursor sits at a
/// natural trigger point such as immediately after an opening brace.
fn context_similar_match(
    entry: &Suggestion,
    prefix: &str,
    suffix: &str,
    config: &MatcherConfig,
) -> Option<MatchResult> {
    if !config.enable_context_scoring {
        return None;
    }
    if entry.prefix == prefix && entry.suffix == suffix {
        return None;
    }
    let current = context_tokens(prefix, suffix);
    let cached = context_tokens(&entry.prefix, &entry.suffix);
    if current.len() < MIN_CONTEXT_TOKENS || cached.len() < MIN_CONTEXT_TOKENS {
        return None;
    }
    let overlap = current.iter().filter(|t| cached.contains(*t)).count();
    let union = current.len() + cached.len() - overlap;
    let mut similarity = overlap as f64 / union.max(1) as f64;
    if at_trigger_point(prefix) {
        similarity += 0.05;
    }
    Some(MatchResult {
        text: entry.text.clone(),
        kind: MatchKind::ContextSimilar,
        confidence: similarity.min(1.0),
    })
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// Last `max` characters of `s`, on a char boundary.
fn tail_chars(s: &str, max: usize) -> &str {
    let char_count = s.chars().count();
    if char_count <= max {
        return s;
    }
    let skip = char_count - max;
    let (idx, _) = s.char_indices().nth(skip).expect("skip < char count");
    &s[idx..]
}

/// First `max` characters of `s`, on a char boundary.
fn head_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn is_multi_line(s: &str) -> bool {
    s.lines().count() > 1
}

/// Fraction of positionally matching line shapes between the two texts.
///
/// A line's shape is its leading whitespace width plus its first
/// non-whitespace token — enough to recognise the same code structure with
/// different identifiers or literals.
fn line_shape_similarity(a: &str, b: &str) -> f64 {
    let shapes_a: Vec<(usize, &str)> = a.lines().map(line_shape).collect();
    let shapes_b: Vec<(usize, &str)> = b.lines().map(line_shape).collect();
    let longest = shapes_a.len().max(shapes_b.len());
    if longest == 0 {
        return 1.0;
    }
    let matching = shapes_a
        .iter()
        .zip(shapes_b.iter())
        .filter(|(x, y)| x == y)
        .count();
    matching as f64 / longest as f64
}

fn line_shape(line: &str) -> (usize, &str) {
    let indent = line.len() - line.trim_start().len();
    let first_token = line
        .trim_start()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .next()
        .unwrap_or("");
    (indent, first_token)
}

/// Identifier-ish tokens from the window of text around the cursor.
fn context_tokens(prefix: &str, suffix: &str) -> Vec<String> {
    let window = format!(
        "{} {}",
        tail_chars(prefix, SIMILARITY_WINDOW_CHARS),
        head_chars(suffix, SIMILARITY_WINDOW_CHARS)
    );
    let mut tokens: Vec<String> = window
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.len() > 1)
        .map(|t| t.to_string())
        .collect();
    tokens.sort();
    tokens.dedup();
    tokens
}

fn at_trigger_point(prefix: &str) -> bool {
    prefix
        .trim_end()
        .chars()
        .next_back()
        .map(|c| TRIGGER_CHARS.contains(&c))
        .unwrap_or(false)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
