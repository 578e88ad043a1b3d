//! Citation Structurer: one deterministic completion call that converts the
//! raw reference section into structured, unverified [`CitationRecord`]s.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::decode::decode_lenient;
use crate::llm::CompletionBackend;
use crate::{AnalysisError, CitationRecord};

/// Character budget for the reference section handed to the model, so one
/// completion stays inside context limits.
pub const MAX_SECTION_CHARS: usize = 50_000;

const EXTRACTION_SYSTEM_PROMPT: &str = "\
You are a bibliographic reference parser. The user will give you the \
References section of an academic paper. Extract every reference entry.

Output a single JSON object with exactly one key, \"citations\", an array of \
objects with exactly these fields:
- \"title\": string (the title of the cited work; empty string if unparseable)
- \"authors\": array of strings, each \"Surname, Given\" where derivable. \
Strip editorial role annotations such as \"(Eds.)\" or \"(Trans.)\".
- \"published\": array containing the single publication year as an integer, \
or null if unknown
- \"sequence_id\": integer position of the entry in the list, starting at 1
- \"authority_link\": null
- \"verified\": false

Output JSON only. No prose, no markdown fences.";

#[derive(Debug, Deserialize)]
struct ExtractionEnvelope {
    #[serde(default)]
    citations: Vec<RawExtractedCitation>,
}

/// What the model actually sends back; every field is optional so one
/// sloppy entry doesn't sink the whole parse.
#[derive(Debug, Deserialize)]
struct RawExtractedCitation {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    authors: Option<Vec<String>>,
    #[serde(default)]
    published: Option<Vec<i32>>,
}

/// Editorial/role annotations that leak into author strings.
static ROLE_ANNOTATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*\((?:eds?\.?|editors?|trans\.?|translators?)\)\s*").unwrap());

/// Truncate to the character budget without splitting a codepoint.
pub fn truncate_section(section: &str, max_chars: usize) -> &str {
    match section.char_indices().nth(max_chars) {
        Some((idx, _)) => &section[..idx],
        None => section,
    }
}

/// Convert a reference section into structured records via a temperature-0
/// completion with a strict JSON contract.
///
/// Records come back with `verified=false`, `authority_link=None`, and
/// `sequence_id` reassigned 1..N in document order regardless of what the
/// model emitted. A completion that yields no parseable JSON is a hard
/// [`AnalysisError::ExtractionFormat`] for the request.
pub async fn structure_references(
    llm: &dyn CompletionBackend,
    section_text: &str,
    max_section_chars: usize,
) -> Result<Vec<CitationRecord>, AnalysisError> {
    let section = truncate_section(section_text, max_section_chars);

    let raw = llm
        .complete(EXTRACTION_SYSTEM_PROMPT, &[], section, 0.0)
        .await
        .map_err(AnalysisError::Completion)?;

    let mut records =
        parse_citation_payload(&raw).map_err(AnalysisError::ExtractionFormat)?;
    for (i, record) in records.iter_mut().enumerate() {
        record.sequence_id = Some(i as u32 + 1);
    }

    Ok(records)
}

/// Parse a model completion carrying the `{"citations": [...]}` contract
/// into unverified records. Shared by the structurer and the supplementary
/// suggester; callers decide how to treat a parse failure.
pub(crate) fn parse_citation_payload(raw: &str) -> Result<Vec<CitationRecord>, String> {
    let value = decode_lenient(raw)?;
    let envelope: ExtractionEnvelope =
        serde_json::from_value(value).map_err(|e| e.to_string())?;

    Ok(envelope
        .citations
        .into_iter()
        .map(|raw| {
            let authors = raw
                .authors
                .unwrap_or_default()
                .into_iter()
                .map(|a| ROLE_ANNOTATION_RE.replace_all(&a, "").trim().to_string())
                .filter(|a| !a.is_empty())
                .collect();

            CitationRecord::unverified(
                raw.title.unwrap_or_default().trim().to_string(),
                authors,
                raw.published.as_ref().and_then(|p| p.first().copied()),
            )
        })
        .collect())
}

/// Pair each structured record with the raw block text the verifier will
/// search with.
///
/// Blocks and records are aligned positionally (same index = same
/// reference). When the model emitted fewer or more records than there were
/// blocks, unmatched records fall back to a synthetic raw text rebuilt from
/// the structured fields.
pub fn align_blocks(records: &[CitationRecord], blocks: &[String]) -> Vec<String> {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| match blocks.get(i) {
            Some(block) => block.clone(),
            None => synthetic_raw_text(record),
        })
        .collect()
}

/// Reconstruct a plausible raw reference string from structured fields:
/// `authors (year) title`.
pub fn synthetic_raw_text(record: &CitationRecord) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !record.authors.is_empty() {
        parts.push(record.authors.join("; "));
    }
    if let Some(year) = record.year() {
        parts.push(format!("({year})"));
    }
    if !record.title.is_empty() {
        parts.push(record.title.clone());
    }
    parts.join(" ")
}
