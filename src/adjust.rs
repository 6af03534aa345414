// SPDX-License-Identifier: MIT
// Suggestion adjustment.
//
// Pure functions that decide whether a previously generated suggestion still
// applies at the current cursor context, and compute the remaining text when
// the user has typed ahead into it. Used by both the coordinator and the
// pending-request registry to test context compatibility, so this must stay
// deterministic and side-effect free.

use crate::history::SuggestionHistory;
use crate::model::Suggestion;

/// Adjust a suggestion to the current cursor context.
///
/// Returns the text to show, or `None` when the suggestion no longer applies:
///
/// - Identical context → the original text, unchanged.
/// - Same suffix and the current prefix extends the suggestion's prefix by
///   text the suggestion itself predicted → the remainder after stripping
///   what the user already typed. The remainder may be empty, meaning the
///   user typed the entire suggestion.
/// - Anything else → `None`.
pub fn adjust(suggestion: &Suggestion, current_prefix: &str, current_suffix: &str) -> Option<String> {
    if current_prefix == suggestion.prefix && current_suffix == suggestion.suffix {
        return Some(suggestion.text.clone());
    }

    if !suggestion.text.is_empty()
        && current_suffix == suggestion.suffix
        && current_prefix.starts_with(&suggestion.prefix)
    {
        let typed_ahead = &current_prefix[suggestion.prefix.len()..];
        if let Some(remainder) = suggestion.text.strip_prefix(typed_ahead) {
            return Some(remainder.to_string());
        }
    }

    None
}

/// Scan the history newest-first for the first adjustable suggestion.
///
/// This is the cheap exact/typed-ahead lookup tried before the richer
/// multi-strategy matcher.
pub fn find_in_history(
    prefix: &str,
    suffix: &str,
    history: &SuggestionHistory,
) -> Option<String> {
    history
        .iter_newest_first()
        .find_map(|suggestion| adjust(suggestion, prefix, suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cached() -> Suggestion {
        Suggestion::new("function test() {}", "const x = ", "\nconst y = 2")
    }

    #[test]
    fn exact_context_returns_text_unchanged() {
        let adjusted = adjust(&cached(), "const x = ", "\nconst y = 2");
        assert_eq!(adjusted.as_deref(), Some("function test() {}"));
    }

    #[test]
    fn typed_ahead_strips_what_was_typed() {
        let adjusted = adjust(&cached(), "const x = fun", "\nconst y = 2");
        assert_eq!(adjusted.as_deref(), Some("ction test() {}"));
    }

    #[test]
    fn fully_typed_suggestion_adjusts_to_empty() {
        let adjusted = adjust(&cached(), "const x = function test() {}", "\nconst y = 2");
        assert_eq!(adjusted.as_deref(), Some(""));
    }

    #[test]
    fn typed_text_outside_suggestion_does_not_apply() {
        // "var" is not a prefix of "function test() {}".
        assert!(adjust(&cached(), "const x = var", "\nconst y = 2").is_none());
    }

    #[test]
    fn changed_suffix_does_not_apply() {
        assert!(adjust(&cached(), "const x = ", "\nconst z = 3").is_none());
    }

    #[test]
    fn diverged_prefix_does_not_apply() {
        assert!(adjust(&cached(), "const z = ", "\nconst y = 2").is_none());
    }

    #[test]
    fn empty_suggestion_text_only_matches_exactly() {
        let empty = Suggestion::new("", "const x = ", "\n");
        assert_eq!(adjust(&empty, "const x = ", "\n").as_deref(), Some(""));
        assert!(adjust(&empty, "const x = f", "\n").is_none());
    }

    #[test]
    fn history_scan_prefers_newest_match() {
        let mut history = SuggestionHistory::new(4);
        history.push(Suggestion::new("old()", "let a = ", ";"));
        history.push(Suggestion::new("new()", "let a = ", ";"));
        assert_eq!(
            find_in_history("let a = ", ";", &history).as_deref(),
            Some("new()")
        );
    }

    #[test]
    fn history_scan_returns_none_without_match() {
        let mut history = SuggestionHistory::new(4);
        history.push(cached());
        assert!(find_in_history("unrelated", "\n", &history).is_none());
    }
}
