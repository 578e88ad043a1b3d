use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// DOI token: `10.` + 4-9 digit registrant code + `/` + suffix. The suffix
/// charset follows the CrossRef recommendation and includes parentheses,
/// which legacy Elsevier DOIs use (`10.1016/0021-9681(87)90171-8`).
static DOI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b10\.\d{4,9}/[-._;()/:a-z0-9]+").unwrap());

/// Strip trailing punctuation and unbalanced closing parens/brackets from a
/// DOI candidate. Sentence-final periods and wrapping parentheses are not
/// part of the identifier.
fn clean_doi(doi: &str) -> String {
    let mut doi = doi.trim_end_matches(['.', ',', ';', ':']);

    loop {
        if doi.ends_with(')') && doi.matches(')').count() > doi.matches('(').count() {
            doi = &doi[..doi.len() - 1];
            doi = doi.trim_end_matches(['.', ',', ';', ':']);
        } else {
            break;
        }
    }

    doi.to_string()
}

/// Extract every DOI-looking token from `text`, in order of appearance,
/// deduplicated case-insensitively.
///
/// Handles bare DOIs, `doi:`/`doi=` prefixes, and `https://doi.org/...`
/// URLs (the prefix is simply not part of the match). Pure function; returns
/// an empty vector when nothing matches.
pub fn extract_dois(text: &str) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut dois = Vec::new();

    for m in DOI_RE.find_iter(text) {
        let doi = clean_doi(m.as_str());
        if doi.is_empty() {
            continue;
        }
        if seen.insert(doi.to_lowercase()) {
            dois.push(doi);
        }
    }

    dois
}

/// Common words to skip when building search queries.
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "the", "of", "and", "or", "for", "to", "in", "on", "with", "by",
    ]
    .into_iter()
    .collect()
});

/// Extract up to `n` significant words from a title for building authority
/// search queries.
///
/// Skips stop words and very short words, but keeps short alphanumeric
/// technical terms like "L2", "3D", "5G".
pub fn get_query_words(title: &str, n: usize) -> Vec<String> {
    static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-zA-Z0-9]+").unwrap());

    let all_words: Vec<&str> = WORD_RE.find_iter(title).map(|m| m.as_str()).collect();

    let significant: Vec<&str> = all_words
        .iter()
        .copied()
        .filter(|w| is_significant(w))
        .collect();

    if significant.len() >= 3 {
        significant.into_iter().take(n).map(String::from).collect()
    } else {
        all_words.into_iter().take(n).map(String::from).collect()
    }
}

fn is_significant(w: &str) -> bool {
    if STOP_WORDS.contains(w.to_lowercase().as_str()) {
        return false;
    }
    if w.len() >= 3 {
        return true;
    }
    let has_letter = w.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = w.chars().any(|c| c.is_ascii_digit());
    has_letter && has_digit
}
