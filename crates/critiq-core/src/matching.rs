//! Title normalization and the multi-metric fuzzy-match decision procedure.
//!
//! All scores are scaled to 0..=100. rapidfuzz ships only the base
//! `fuzz::ratio`; the partial, token-sort, and token-set variants are layered
//! over it here.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Acceptance threshold when the winning metric is ratio, partial-ratio, or
/// token-sort-ratio.
pub const BASE_THRESHOLD: f64 = 78.0;
/// Acceptance threshold when the winning metric is token-set-ratio. Token-set
/// already ignores word order and duplicates, so a high token-set score alone
/// is weaker evidence and needs a higher bar.
pub const TOKEN_SET_THRESHOLD: f64 = 88.0;
/// Added when a candidate author surname appears in the normalized raw
/// reference text.
pub const AUTHOR_BONUS: f64 = 6.0;
/// Added when the candidate's publication year matches the extracted year
/// exactly.
pub const YEAR_BONUS: f64 = 6.0;
/// Minimum normalized length of the shorter title for the substring
/// containment rule.
pub const MIN_CONTAINMENT_LEN: usize = 10;

/// Normalize a title for comparison: HTML entities unescaped, NFKD
/// decomposition, non-ASCII stripped, punctuation replaced by spaces,
/// whitespace collapsed, lowercased. Word boundaries survive so the token
/// metrics can operate on the result.
pub fn normalize_title(title: &str) -> String {
    let title = title
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'");

    let ascii: String = title.nfkd().filter(|c| c.is_ascii()).collect();

    static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9]+").unwrap());
    let spaced = NON_ALNUM.replace_all(&ascii, " ");
    spaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Identity key for deduplication: [`normalize_title`] with the spaces
/// removed as well. Two titles with the same key are the same work.
pub fn dedup_key(title: &str) -> String {
    normalize_title(title).replace(' ', "")
}

/// Which similarity metric produced a score. The acceptance threshold
/// depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMetric {
    Ratio,
    PartialRatio,
    TokenSortRatio,
    TokenSetRatio,
}

/// A similarity score (0..=100) tagged with the metric that achieved it.
#[derive(Debug, Clone, Copy)]
pub struct TitleScore {
    pub score: f64,
    pub metric: MatchMetric,
}

fn ratio_chars(a: &[char], b: &[char]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 100.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    rapidfuzz::fuzz::ratio(a.iter().copied(), b.iter().copied()) * 100.0
}

/// Indel ratio over whole strings.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    ratio_chars(&a, &b)
}

/// Best ratio of the shorter string against any equal-length window of the
/// longer one. Handles one title embedding the other.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (shorter, longer) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };

    if shorter.is_empty() {
        return if longer.is_empty() { 100.0 } else { 0.0 };
    }
    if shorter.len() == longer.len() {
        return ratio_chars(shorter, longer);
    }

    let mut best = 0.0f64;
    for start in 0..=(longer.len() - shorter.len()) {
        let window = &longer[start..start + shorter.len()];
        let score = ratio_chars(shorter, window);
        if score > best {
            best = score;
        }
        if best >= 100.0 {
            break;
        }
    }
    best
}

fn sorted_tokens(s: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens
}

/// Ratio over whitespace tokens sorted alphabetically; insensitive to word
/// order.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a).join(" "), &sorted_tokens(b).join(" "))
}

/// Ratio over token set intersections and differences; insensitive to word
/// order and duplicated words.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    use std::collections::BTreeSet;

    let set_a: BTreeSet<&str> = a.split_whitespace().collect();
    let set_b: BTreeSet<&str> = b.split_whitespace().collect();

    if set_a.is_empty() && set_b.is_empty() {
        return 100.0;
    }
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let intersection: Vec<&str> = set_a.intersection(&set_b).copied().collect();
    let diff_ab: Vec<&str> = set_a.difference(&set_b).copied().collect();
    let diff_ba: Vec<&str> = set_b.difference(&set_a).copied().collect();

    let sect = intersection.join(" ");
    let combined_ab = join_nonempty(&sect, &diff_ab.join(" "));
    let combined_ba = join_nonempty(&sect, &diff_ba.join(" "));

    ratio(&sect, &combined_ab)
        .max(ratio(&sect, &combined_ba))
        .max(ratio(&combined_ab, &combined_ba))
}

fn join_nonempty(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (_, true) => a.to_string(),
        _ => format!("{} {}", a, b),
    }
}

/// Score a candidate title against one or more reference strings (the raw
/// reference block and/or the extracted title), taking the maximum across
/// all four metrics and all references. Inputs are normalized internally.
pub fn score_candidate(candidate: &str, references: &[&str]) -> TitleScore {
    let cand_norm = normalize_title(candidate);
    let mut best = TitleScore {
        score: 0.0,
        metric: MatchMetric::Ratio,
    };

    for reference in references {
        let ref_norm = normalize_title(reference);
        if ref_norm.is_empty() || cand_norm.is_empty() {
            continue;
        }

        let scores = [
            (ratio(&cand_norm, &ref_norm), MatchMetric::Ratio),
            (
                partial_ratio(&cand_norm, &ref_norm),
                MatchMetric::PartialRatio,
            ),
            (
                token_sort_ratio(&cand_norm, &ref_norm),
                MatchMetric::TokenSortRatio,
            ),
            (
                token_set_ratio(&cand_norm, &ref_norm),
                MatchMetric::TokenSetRatio,
            ),
        ];

        for (score, metric) in scores {
            if score > best.score {
                best = TitleScore { score, metric };
            }
        }
    }

    best
}

/// Whether `score` (base similarity plus any bonuses) clears the acceptance
/// threshold for the metric that produced it.
pub fn meets_threshold(metric: MatchMetric, score: f64) -> bool {
    match metric {
        MatchMetric::TokenSetRatio => score >= TOKEN_SET_THRESHOLD,
        _ => score >= BASE_THRESHOLD,
    }
}

/// Substring containment acceptance: one normalized title contains the
/// other and the shorter side is longer than 10 characters. Handles heavy
/// truncation by either the extractor or the authority.
pub fn substring_containment(a: &str, b: &str) -> bool {
    let key_a = dedup_key(a);
    let key_b = dedup_key(b);
    let (shorter, longer) = if key_a.len() <= key_b.len() {
        (&key_a, &key_b)
    } else {
        (&key_b, &key_a)
    };
    shorter.len() > MIN_CONTAINMENT_LEN && longer.contains(shorter.as_str())
}
