//! Supplementary citation suggestions: related published works the document
//! did not cite, proposed by the model and merged (deduplicated) into the
//! citation list after re-verification.

use crate::llm::CompletionBackend;
use crate::structurer::parse_citation_payload;
use crate::CitationRecord;

/// Upper bound on suggestions requested per analysis.
pub const MAX_SUGGESTIONS: usize = 5;

const SUGGEST_SYSTEM_PROMPT: &str = "\
You are a research librarian. The user will give you the abstract or opening \
of an academic paper together with the works it already cites. Suggest up to \
5 additional published works a reader of this paper should also consult. \
Only suggest works you are confident actually exist; never invent titles.

Output a single JSON object with exactly one key, \"citations\", an array of \
objects with exactly these fields:
- \"title\": string
- \"authors\": array of strings, each \"Surname, Given\" where derivable
- \"published\": array containing the single publication year as an integer, \
or null if unknown
- \"sequence_id\": null
- \"authority_link\": null
- \"verified\": false

Do not repeat any work from the cited list. Output JSON only. No prose, no \
markdown fences.";

/// Ask the model for supplementary reading suggestions.
///
/// Unlike structuring, a malformed or failed completion here is not fatal:
/// the suggestions are an enrichment, so failures degrade to a warning and
/// an empty list.
pub async fn suggest_supplementary(
    llm: &dyn CompletionBackend,
    document_excerpt: &str,
    primary: &[CitationRecord],
) -> Vec<CitationRecord> {
    let cited: Vec<&str> = primary
        .iter()
        .map(|r| r.title.as_str())
        .filter(|t| !t.is_empty())
        .collect();

    let user_content = format!(
        "Paper excerpt:\n{}\n\nAlready cited:\n{}",
        document_excerpt,
        cited.join("\n")
    );

    let raw = match llm
        .complete(SUGGEST_SYSTEM_PROMPT, &[], &user_content, 0.0)
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "supplementary suggestion request failed");
            return vec![];
        }
    };

    match parse_citation_payload(&raw) {
        Ok(records) => records
            .into_iter()
            .filter(|r| !r.title.is_empty())
            .take(MAX_SUGGESTIONS)
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, "supplementary suggestions were malformed");
            vec![]
        }
    }
}
