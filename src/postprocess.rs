// SPDX-License-Identifier: MIT
// Completion post-processing.
//
// Raw provider output passes through here before it is cached or shown:
// chat-mode tag extraction, markdown fence stripping, suppression of text
// that only repeats what is already around the cursor, and optional
// single-line truncation. Degenerate input never panics; it reduces to an
// empty suggestion.

use std::sync::OnceLock;

use regex::Regex;

use crate::provider::GenerationMode;

/// Longest run of characters considered when looking for text that echoes
/// the prefix tail or suffix head.
const ECHO_WINDOW_BYTES: usize = 256;

/// Run raw generated text through the full post-processing chain for the
/// context it was generated at.
pub fn post_process(
    raw: &str,
    prefix: &str,
    suffix: &str,
    mode: GenerationMode,
    single_line: bool,
) -> String {
    let text = match mode {
        GenerationMode::FillInMiddle => raw.to_string(),
        GenerationMode::ChatInstruct => extract_tagged(raw),
    };
    let text = extract_completion_text(&text);
    let text = strip_context_echo(&text, prefix, suffix);
    let text = if single_line {
        first_line(&text).to_string()
    } else {
        text
    };
    if text.trim().is_empty() {
        String::new()
    } else {
        text
    }
}

/// Extract the `<completion>…</completion>` region from a chat-style reply.
///
/// Chat models wrap the middle text in tags so it can be told apart from
/// preamble; replies missing the tags are taken as-is.
pub fn extract_tagged(raw: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?s)<completion>(.*?)</completion>").expect("completion tag regex is valid")
    });
    match re.captures(raw) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or("").to_string(),
        None => raw.to_string(),
    }
}

/// Strip markdown code fences from a provider response, if present.
pub fn extract_completion_text(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(after_fence) = trimmed.strip_prefix("```") {
        let body = if let Some(nl) = after_fence.find('\n') {
            &after_fence[nl + 1..]
        } else {
            after_fence
        };
        let stripped = if let Some(end) = body.rfind("\n```") {
            &body[..end]
        } else {
            body.strip_suffix("```").unwrap_or(body)
        };
        return stripped.to_string();
    }
    trimmed.to_string()
}

/// Remove a leading run that repeats the end of the prefix and a trailing
/// run that repeats the start of the suffix.
///
/// Models frequently re-emit the line the cursor sits on, or close a bracket
/// the suffix already closes; such text would be duplicated on insert. May
/// reduce the whole text to empty when it only repeats its surroundings.
pub fn strip_context_echo(text: &str, prefix: &str, suffix: &str) -> String {
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();

    // Longest leading run already present at the end of the prefix.
    let mut start = 0;
    for &b in &boundaries {
        if b > ECHO_WINDOW_BYTES {
            break;
        }
        if b > 0 && prefix.ends_with(&text[..b]) {
            start = b;
        }
    }

    // Longest trailing run already present at the start of the suffix —
    // the first boundary whose remainder the suffix starts with.
    let mut end = text.len();
    for &b in &boundaries {
        if b < start || text.len() - b > ECHO_WINDOW_BYTES {
            continue;
        }
        if b < text.len() && suffix.starts_with(&text[b..]) {
            end = b;
            break;
        }
    }

    text[start..end.max(start)].to_string()
}

/// First line of the text, without its line break.
pub fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

/// Right-anchored prefix window: keep at most `max_chars` trailing characters.
pub fn truncate_prefix(prefix: &str, max_chars: usize) -> &str {
    let count = prefix.chars().count();
    if count <= max_chars {
        return prefix;
    }
    let skip = count - max_chars;
    match prefix.char_indices().nth(skip) {
        Some((idx, _)) => &prefix[idx..],
        None => prefix,
    }
}

/// Left-anchored suffix window: keep at most `max_chars` leading characters.
pub fn truncate_suffix(suffix: &str, max_chars: usize) -> &str {
    match suffix.char_indices().nth(max_chars) {
        Some((idx, _)) => &suffix[..idx],
        None => suffix,
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
