//! # Similarity Engine
//!
//! ## Purpose
//! Normalized string and content similarity scoring used by every other
//! pipeline stage, at three granularities:
//! - short tokens (section numbers, marginal definitions)
//! - medium names (statute titles after stripping legal suffixes and
//!   parenthetical qualifiers)
//! - long bodies (full section/preamble text)
//!
//! ## Contract
//! Every scoring function returns a value in `[0, 1]`, is symmetric in its
//! arguments, scores identical inputs as `1.0`, and is fully deterministic.
//! Downstream thresholds assume scores are monotonic with intuitive textual
//! closeness.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

/// Legal suffix tokens stripped when deriving a statute's base name
const SUFFIX_TOKENS: &[&str] = &[
    "act",
    "acts",
    "ordinance",
    "ordinances",
    "law",
    "laws",
    "rule",
    "rules",
    "order",
    "orders",
    "regulation",
    "regulations",
    "code",
    "amendment",
    "bill",
];

fn parenthetical_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\([^)]*\)").unwrap())
}

fn year_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(1[5-9]\d{2}|20\d{2})\b").unwrap())
}

/// Normalize text for comparison: NFKC fold, lowercase, strip punctuation,
/// collapse whitespace
pub fn normalize_text(text: &str) -> String {
    let folded: String = text.nfkc().collect::<String>().to_lowercase();
    let cleaned: String = folded
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove parenthetical qualifiers such as "(Amendment)" from a title
pub fn strip_qualifiers(name: &str) -> String {
    parenthetical_regex().replace_all(name, " ").into_owned()
}

/// Derive the grouping base name: qualifiers, legal suffix tokens, and year
/// tokens stripped, then normalized
///
/// Falls back to the normalized full name when stripping would leave nothing
/// (e.g. a statute literally titled "The Act").
pub fn derive_base_name(name: &str) -> String {
    let without_qualifiers = strip_qualifiers(name);
    let without_years = year_regex().replace_all(&without_qualifiers, " ");
    let normalized = normalize_text(&without_years);

    let kept: Vec<&str> = normalized
        .split_whitespace()
        .filter(|token| !SUFFIX_TOKENS.contains(token))
        .collect();

    if kept.is_empty() {
        normalize_text(name)
    } else {
        kept.join(" ")
    }
}

/// Normalize a statute name for duplicate comparison: lowercase, punctuation
/// stripped, legal suffix tokens removed, year tokens kept
///
/// Unlike [`derive_base_name`] this preserves years — "Income Tax Act 1922"
/// and "Income Tax Act 2001" are different documents, not duplicates.
pub fn normalize_name(name: &str) -> String {
    let normalized = normalize_text(name);
    let kept: Vec<&str> = normalized
        .split_whitespace()
        .filter(|token| !SUFFIX_TOKENS.contains(token))
        .collect();
    if kept.is_empty() {
        normalized
    } else {
        kept.join(" ")
    }
}

/// Levenshtein distance over characters, two-row dynamic program
fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr: Vec<usize> = vec![0; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Normalized edit-distance similarity in `[0, 1]`
///
/// Both inputs are normalized first; two empty strings are identical (`1.0`).
pub fn edit_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = normalize_text(a).chars().collect();
    let b: Vec<char> = normalize_text(b).chars().collect();
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / max_len as f64
}

/// Dice coefficient over normalized word sets in `[0, 1]`
pub fn token_overlap(a: &str, b: &str) -> f64 {
    let set_a: HashSet<&str> = a.split_whitespace().collect();
    let set_b: HashSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let shared = set_a.intersection(&set_b).count();
    2.0 * shared as f64 / (set_a.len() + set_b.len()) as f64
}

/// Similarity for short tokens such as section numbers and definitions
pub fn token_similarity(a: &str, b: &str) -> f64 {
    edit_similarity(a, b)
}

/// Similarity for statute titles
///
/// Compares derived base names (suffixes, qualifiers, and years stripped) and
/// takes the better of edit distance and token overlap so word reordering in
/// amendment titles does not depress the score.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let base_a = derive_base_name(a);
    let base_b = derive_base_name(b);
    let edit = edit_similarity(&base_a, &base_b);
    let overlap = token_overlap(&base_a, &base_b);
    edit.max(overlap)
}

/// Similarity for long bodies (section text, preambles)
///
/// Token-overlap based; edit distance over long bodies is quadratic and adds
/// nothing at this granularity.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    token_overlap(&normalize_text(a), &normalize_text(b))
}
