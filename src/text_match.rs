//! Fuzzy text helpers used to compare provider tracks with library entries.
//!
//! Comparison is deliberately exact on a normalized form rather than
//! distance-based: featuring credits, case, diacritics and punctuation are
//! ignored, but any remaining word difference ("(remastered)", "live", a
//! different title) keeps two strings apart.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

const FEATURING_MARKERS: [&str; 4] = ["featuring", "feat.", "feat", "ft."];

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_featuring_clause(inner: &str) -> bool {
    let lowered = inner.trim().to_lowercase();
    FEATURING_MARKERS
        .iter()
        .any(|marker| lowered.starts_with(&format!("{marker} ")))
        || lowered.starts_with("ft ")
        || lowered.starts_with("with ")
}

/// Byte offset in `value` of the first occurrence of the lowercase ASCII
/// `needle`, ignoring ASCII case. Always a char boundary of `value`.
fn find_ascii_case_insensitive(value: &str, needle: &str) -> Option<usize> {
    value.char_indices().map(|(index, _)| index).find(|&index| {
        let mut chars = value[index..].chars();
        needle
            .chars()
            .all(|expected| chars.next().is_some_and(|ch| ch.to_ascii_lowercase() == expected))
    })
}

/// Removes "(feat. X)", "[with X]" groups and trailing " feat. X" clauses.
pub fn strip_featuring(value: &str) -> String {
    let mut without_groups = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(open_index) = rest.find(['(', '[']) {
        let close = if rest[open_index..].starts_with('(') { ')' } else { ']' };
        let Some(close_offset) = rest[open_index + 1..].find(close) else {
            break;
        };
        let close_index = open_index + 1 + close_offset;
        let inner = &rest[open_index + 1..close_index];
        without_groups.push_str(&rest[..open_index]);
        if !is_featuring_clause(inner) {
            without_groups.push_str(&rest[open_index..=close_index]);
        }
        rest = &rest[close_index + 1..];
    }
    without_groups.push_str(rest);

    let mut cut_at: Option<usize> = None;
    for marker in FEATURING_MARKERS.iter().copied().chain(["ft"]) {
        let needle = format!(" {marker} ");
        if let Some(index) = find_ascii_case_insensitive(&without_groups, &needle) {
            cut_at = Some(cut_at.map_or(index, |current| current.min(index)));
        }
    }
    let stripped = match cut_at {
        Some(index) if index > 0 => {
            let tail = &without_groups[index..];
            let resume = tail
                .find(['(', '['])
                .or_else(|| tail.find(" - "))
                .map(|offset| &tail[offset..])
                .unwrap_or("");
            format!("{} {}", &without_groups[..index], resume)
        }
        _ => without_groups,
    };
    collapse_whitespace(&stripped)
}

/// Lower-cases, folds diacritics, strips punctuation and collapses whitespace.
pub fn normalize_text(value: &str) -> String {
    let mut normalized = String::with_capacity(value.len());
    for ch in value.nfkd().filter(|ch| !is_combining_mark(*ch)) {
        if ch.is_alphanumeric() {
            normalized.extend(ch.to_lowercase());
        } else if ch == '\'' || ch == '\u{2019}' {
            // don't -> dont
        } else {
            normalized.push(' ');
        }
    }
    collapse_whitespace(&normalized)
}

/// Normalized comparison key: featuring credits removed, then [`normalize_text`].
pub fn comparison_key(value: &str) -> String {
    normalize_text(&strip_featuring(value))
}

/// Fuzzy equality used for artist, title and album comparison.
pub fn compare_strings(left: &str, right: &str) -> bool {
    let left_key = comparison_key(left);
    let right_key = comparison_key(right);
    if left_key.is_empty() || right_key.is_empty() {
        let left_trimmed = left.trim().to_lowercase();
        return !left_trimmed.is_empty() && left_trimmed == right.trim().to_lowercase();
    }
    left_key == right_key
}

fn contains_phrase(haystack: &[&str], phrase: &[&str]) -> bool {
    !phrase.is_empty()
        && haystack.len() >= phrase.len()
        && haystack
            .windows(phrase.len())
            .any(|window| window == phrase)
}

/// Returns the first exclusion word found as a whole word or phrase in `value`.
pub fn find_excluded_word<'a>(value: &str, excluded_words: &'a [String]) -> Option<&'a str> {
    let normalized_value = normalize_text(value);
    let value_tokens: Vec<&str> = normalized_value.split_whitespace().collect();
    excluded_words.iter().map(String::as_str).find(|word| {
        let normalized_word = normalize_text(word);
        let word_tokens: Vec<&str> = normalized_word.split_whitespace().collect();
        contains_phrase(&value_tokens, &word_tokens)
    })
}

/// Builds the distinct search strings issued for one free-text query.
pub fn search_variants(text: &str) -> Vec<String> {
    let trimmed = collapse_whitespace(text);
    let candidates = [
        trimmed.clone(),
        trimmed.to_lowercase(),
        normalize_text(&trimmed),
        comparison_key(&trimmed),
    ];
    let mut variants: Vec<String> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !candidate.is_empty() && !variants.contains(&candidate) {
            variants.push(candidate);
        }
    }
    variants
}

/// Canonical form of a recording code: uppercase without separators.
pub fn normalize_code(code: &str) -> String {
    code.chars()
        .filter(|ch| !ch.is_whitespace() && *ch != '-')
        .flat_map(char::to_uppercase)
        .collect()
}
