// SPDX-License-Identifier: MIT
// Property tests for the suggestion history and adjuster invariants.

use proptest::prelude::*;

use ghostline::adjust;
use ghostline::{Suggestion, SuggestionHistory};

proptest! {
    /// The history never exceeds its capacity and never holds two entries
    /// with the same (text, prefix, suffix) triple, no matter the insertion
    /// order.
    #[test]
    fn history_stays_bounded_and_deduplicated(
        entries in prop::collection::vec(("[a-z]{0,6}", "[a-z]{0,6}", "[a-z]{0,4}"), 0..60),
        capacity in 1usize..30,
    ) {
        let mut history = SuggestionHistory::new(capacity);
        for (text, prefix, suffix) in &entries {
            history.push(Suggestion::new(text.clone(), prefix.clone(), suffix.clone()));
        }

        prop_assert!(history.len() <= capacity);

        let collected: Vec<&Suggestion> = history.iter_newest_first().collect();
        for (i, a) in collected.iter().enumerate() {
            for b in &collected[i + 1..] {
                prop_assert!(
                    a.text != b.text || a.prefix != b.prefix || a.suffix != b.suffix,
                    "duplicate triple survived insertion"
                );
            }
        }
    }

    /// Typing any prefix of a suggestion's text always adjusts to the exact
    /// remainder, and appending the remainder to what was typed reproduces
    /// the original text.
    #[test]
    fn typed_ahead_adjustment_is_consistent(
        prefix in "[ -~]{0,12}",
        suffix in "[ -~]{0,8}",
        text in "[ -~]{1,16}",
        split in 0usize..16,
    ) {
        let suggestion = Suggestion::new(text.clone(), prefix.clone(), suffix.clone());

        let boundary = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .take(split + 1)
            .last()
            .unwrap();
        let typed = &text[..boundary];
        let current_prefix = format!("{prefix}{typed}");

        let adjusted = adjust::adjust(&suggestion, &current_prefix, &suffix);

        // An adjustment may legitimately come out differently when the typed
        // span is ambiguous (e.g. typing "a" against text "aa"), but it must
        // exist and splice back into the full text.
        let remainder = adjusted.expect("typed-ahead prefix of the text must adjust");
        prop_assert_eq!(format!("{}{}", typed, remainder), text);
    }

    /// A suffix change never adjusts.
    #[test]
    fn changed_suffix_never_adjusts(
        prefix in "[a-z]{0,8}",
        suffix in "[a-z]{1,6}",
        text in "[a-z]{1,10}",
        extra in "[a-z]{1,4}",
    ) {
        let suggestion = Suggestion::new(text, prefix.clone(), suffix.clone());
        let changed = format!("{suffix}{extra}");
        prop_assert!(adjust::adjust(&suggestion, &prefix, &changed).is_none());
    }
}
