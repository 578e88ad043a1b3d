use once_cell::sync::Lazy;
use regex::Regex;

/// Heading tokens that introduce a bibliography, in priority order.
/// The first heading that matches anywhere in the document wins.
static HEADING_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bReferences\b",
        r"(?i)\bBibliography\b",
        r"(?i)\bWorks\s+Cited\b",
        r"(?i)\bLiterature\s+Cited\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Sections that commonly follow the bibliography; anything after one of
/// these markers is trimmed off.
static END_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\n\s*(?:Appendix|Acknowledgments|Acknowledgements|Supplementary|Ethics\s+Statement|Broader\s+Impact)")
        .unwrap()
});

/// Fraction of the document kept when no heading is found (trailing 30%).
const FALLBACK_CUTOFF: f64 = 0.7;

/// Locate the portion of `text` most likely to contain the bibliography.
///
/// Searches for a heading token from the priority list (`References`,
/// `Bibliography`, `Works Cited`, `Literature Cited`) and returns everything
/// after the first match, trimmed at a trailing-section marker (Appendix,
/// Acknowledgments, ...). If no heading matches, falls back to the trailing
/// 30% of the document. Never fails: non-empty input yields non-empty output.
pub fn locate_references(text: &str) -> String {
    for re in HEADING_RES.iter() {
        if let Some(m) = re.find(text) {
            let rest = &text[m.end()..];
            let end = END_RE.find(rest).map(|em| em.start()).unwrap_or(rest.len());
            let section = &rest[..end];
            if !section.trim().is_empty() {
                return section.to_string();
            }
        }
    }

    // Fallback: trailing 30% of the document. Don't split in the middle of a
    // UTF-8 codepoint.
    let cutoff = (text.len() as f64 * FALLBACK_CUTOFF) as usize;
    let cutoff = text
        .char_indices()
        .map(|(i, _)| i)
        .find(|&i| i >= cutoff)
        .unwrap_or(cutoff.min(text.len()));
    text[cutoff..].to_string()
}

/// Leading numeric marker: `12.`, `12)`, or bracketed `[12]`.
static NUMERIC_START_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:\[\d{1,3}\]|\d{1,3}[.)])\s*").unwrap());

/// Lines that are nothing but a page number.
static PURE_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());

/// A parenthesized 4-digit year, optionally suffixed `a`/`b` for same-year
/// disambiguation.
static YEAR_PAREN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((?:19|20)\d{2}[ab]?\)").unwrap());

/// Assembled blocks shorter than this are whitespace artifacts, not
/// references.
const MIN_BLOCK_LEN: usize = 10;

/// Split a located reference section into individual reference blocks, in
/// source order.
///
/// Walks non-blank lines deciding whether each one starts a new reference:
/// a leading numeric marker, or a capitalized author token with a
/// parenthesized year, or (fallback) no reference being open yet. Other lines
/// are joined onto the open block, which is how wrapped lines from
/// PDF-extracted text are reassembled. Whitespace inside a block is collapsed
/// to single spaces, and blocks shorter than 10 characters are dropped.
///
/// A document with no discernible structure degrades to one large block;
/// that is accepted approximate behavior.
pub fn segment_references(section_text: &str) -> Vec<String> {
    let mut blocks: Vec<String> = Vec::new();
    let mut current: Option<String> = None;

    for line in section_text.lines() {
        let line = line.trim();
        if line.is_empty() || PURE_NUMBER_RE.is_match(line) {
            continue;
        }

        if starts_new_reference(line, current.is_some()) {
            if let Some(block) = current.take() {
                push_block(&mut blocks, block);
            }
            current = Some(collapse_whitespace(strip_numeric_marker(line)));
        } else if let Some(block) = current.as_mut() {
            // Wrapped continuation. A trailing hyphen means the word itself
            // was broken across lines.
            if block.ends_with('-') {
                block.push_str(&collapse_whitespace(line));
            } else {
                block.push(' ');
                block.push_str(&collapse_whitespace(line));
            }
        }
    }

    if let Some(block) = current {
        push_block(&mut blocks, block);
    }

    blocks
}

fn starts_new_reference(line: &str, has_open_block: bool) -> bool {
    if NUMERIC_START_RE.is_match(line) {
        return true;
    }
    if line.starts_with(|c: char| c.is_uppercase()) && YEAR_PAREN_RE.is_match(line) {
        return true;
    }
    // No block open yet: the first non-blank line starts one.
    !has_open_block
}

fn strip_numeric_marker(line: &str) -> &str {
    match NUMERIC_START_RE.find(line) {
        Some(m) => &line[m.end()..],
        None => line,
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn push_block(blocks: &mut Vec<String>, block: String) {
    let block = block.trim().to_string();
    if block.len() >= MIN_BLOCK_LEN {
        blocks.push(block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_basic() {
        let text = "Body text here.\n\nReferences\n\n1. First ref.\n2. Second ref.\n";
        let section = locate_references(text);
        assert!(section.contains("First ref."));
        assert!(section.contains("Second ref."));
        assert!(!section.contains("Body text"));
    }

    #[test]
    fn test_locate_bibliography_heading() {
        let text = "Body.\n\nBibliography\n\nSome refs here.\n";
        let section = locate_references(text);
        assert!(section.contains("Some refs here."));
    }

    #[test]
    fn test_locate_priority_order() {
        // "References" wins over "Bibliography" even when it appears later.
        let text = "Intro Bibliography mention.\n\nReferences\n\n1. Only real ref here.\n";
        let section = locate_references(text);
        assert!(section.contains("Only real ref here."));
        // "Bibliography" would have matched earlier in the text
        assert!(!section.contains("Intro"));
    }

    #[test]
    fn test_locate_trims_appendix() {
        let text = "Body.\n\nReferences\n\n1. Ref one here.\n\nAppendix A\n\nExtra stuff.";
        let section = locate_references(text);
        assert!(section.contains("Ref one here."));
        assert!(!section.contains("Extra stuff"));
    }

    #[test]
    fn test_locate_fallback_trailing_fraction() {
        let text = "AAAA ".repeat(100);
        let section = locate_references(&text);
        assert!(!section.is_empty());
        assert!(section.len() <= text.len() * 3 / 10 + 8);
    }

    #[test]
    fn test_locate_case_insensitive() {
        let text = "Body.\n\nREFERENCES\n\n1. Shouty heading ref.\n";
        let section = locate_references(text);
        assert!(section.contains("Shouty heading ref."));
    }

    #[test]
    fn test_segment_numbered_dot() {
        let text = "1. Smith, J. (2020) A Study of Things. Journal of Stuff, 12(3), 1-10.\n2. Doe, A., Lee, B. (2019) Another Work.\n";
        let refs = segment_references(text);
        assert_eq!(refs.len(), 2);
        assert!(refs[0].starts_with("Smith"));
        assert!(refs[1].starts_with("Doe"));
    }

    #[test]
    fn test_segment_numbered_paren() {
        let text = "1) First reference body text.\n2) Second reference body text.\n3) Third reference body text.\n";
        let refs = segment_references(text);
        assert_eq!(refs.len(), 3);
        assert!(refs[0].starts_with("First"));
    }

    #[test]
    fn test_segment_bracketed() {
        let text = "[1] First reference body text.\n[2] Second reference body text.\n";
        let refs = segment_references(text);
        assert_eq!(refs.len(), 2);
        assert!(refs[1].starts_with("Second"));
    }

    #[test]
    fn test_segment_author_year() {
        let text = "Smith, J. (2020) A Study of Things. Journal of Stuff.\nDoe, A. (2019a) Another Work Entirely. Some Venue.\n";
        let refs = segment_references(text);
        assert_eq!(refs.len(), 2);
        assert!(refs[1].contains("(2019a)"));
    }

    #[test]
    fn test_segment_joins_wrapped_lines() {
        let text = "1. Smith, J. (2020) A Study of\nThings Spanning Lines. Journal.\n2. Doe, A. (2019) Second.\n";
        let refs = segment_references(text);
        assert_eq!(refs.len(), 2);
        assert!(refs[0].contains("A Study of Things Spanning Lines"));
    }

    #[test]
    fn test_segment_joins_hyphenated_break() {
        let text = "1. Smith, J. (2020) Under-\nstanding Things. Journal.\n2. Doe, A. (2019) Second entry.\n";
        let refs = segment_references(text);
        assert_eq!(refs.len(), 2);
        assert!(refs[0].contains("Under-standing Things"));
    }

    #[test]
    fn test_segment_first_ref_without_marker() {
        // No number, no year marker: fallback still opens a block.
        let text = "An unmarked first reference with enough text.\nwrapped continuation line.\n";
        let refs = segment_references(text);
        assert_eq!(refs.len(), 1);
        assert!(refs[0].contains("unmarked first reference"));
        assert!(refs[0].contains("wrapped continuation"));
    }

    #[test]
    fn test_segment_drops_short_artifacts() {
        let text = "1. Real reference with plenty of content.\n2. x\n3. Another real reference entry.\n";
        let refs = segment_references(text);
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn test_segment_skips_page_numbers() {
        let text = "1. First reference body text.\n42\n2. Second reference body text.\n";
        let refs = segment_references(text);
        assert_eq!(refs.len(), 2);
        assert!(!refs[0].contains("42"));
    }

    #[test]
    fn test_segment_empty_input() {
        assert!(segment_references("").is_empty());
        assert!(segment_references("   \n  \n").is_empty());
    }

    // Property from the pipeline contract: segmentation only re-groups
    // content, it never invents it.
    #[test]
    fn test_segment_output_is_subsequence_of_input() {
        let text = "1. Smith, J. (2020) A Study of\nThings. Journal of Stuff, 12(3).\n2. Doe, A. (2019) Another Work.\n";
        let refs = segment_references(text);
        let joined: String = refs.join(" ").split_whitespace().collect::<Vec<_>>().join(" ");
        let input: String = text.split_whitespace().collect::<Vec<_>>().join(" ");

        // Every char of the output appears in the input, in order.
        let mut input_chars = input.chars();
        for c in joined.chars() {
            if c == ' ' {
                continue;
            }
            assert!(
                input_chars.any(|ic| ic == c),
                "output char {c:?} not found in input order"
            );
        }
    }
}
