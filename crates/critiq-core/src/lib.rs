use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod authority;
pub mod config_file;
pub mod decode;
pub mod doi;
pub mod llm;
pub mod matching;
pub mod merger;
pub mod orchestrator;
pub mod persona;
pub mod rate_limit;
pub mod structurer;
pub mod supplement;
pub mod verifier;

// Re-export for convenience
pub use llm::{ChatMessage, CompletionBackend, OpenAiCompletion};
pub use merger::merge_citations;
pub use orchestrator::{AnalysisReport, Orchestrator, PersonaResult};
pub use persona::{PersonaResolver, StaticPersonaCatalog};
pub use verifier::{ClaimedWorks, Verifier};

/// The canonical citation unit flowing through the pipeline.
///
/// Created fresh per analysis invocation; lives only for one
/// request/response cycle and is serialized into the response payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationRecord {
    /// May be empty when the reference was unparseable.
    pub title: String,
    /// "Surname, Given" form where derivable.
    pub authors: Vec<String>,
    /// Single-element publication year, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<Vec<i32>>,
    /// 1-based order of appearance in the source document. Supplementary
    /// records carry no sequence id; they live outside the document's
    /// numbering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_id: Option<u32>,
    /// The single "proof" reference: a DOI URL or an authority record URL.
    pub authority_link: Option<String>,
    /// True only when an external authority corroborated this work.
    /// `verified == true` implies `authority_link.is_some()`.
    pub verified: bool,
    /// True when the record was suggested as additional reading rather than
    /// parsed from the document's own bibliography.
    #[serde(default)]
    pub is_supplementary: bool,
}

impl CitationRecord {
    /// An unverified record as produced by the structurer.
    pub fn unverified(title: String, authors: Vec<String>, year: Option<i32>) -> Self {
        Self {
            title,
            authors,
            published: year.map(|y| vec![y]),
            sequence_id: None,
            authority_link: None,
            verified: false,
            is_supplementary: false,
        }
    }

    /// The publication year, if known.
    pub fn year(&self) -> Option<i32> {
        self.published.as_ref().and_then(|p| p.first().copied())
    }
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The structurer's completion did not yield parseable JSON after
    /// fence-stripping and balanced-brace recovery. Fatal for the request:
    /// an empty citation list would be indistinguishable from "no
    /// bibliography found", which is a different condition.
    #[error("citation extraction returned malformed output: {0}")]
    ExtractionFormat(String),
    #[error("completion request failed: {0}")]
    Completion(String),
    #[error("persona '{0}' not found")]
    PersonaNotFound(String),
    #[error("no requested persona could be resolved")]
    NoPersonasResolved,
    #[error("analysis was cancelled")]
    Cancelled,
}

/// Configuration for the authority verification pass.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    /// Timeout for each authority HTTP call. A timed-out call is abandoned,
    /// never retried.
    pub authority_timeout_secs: u64,
    /// Candidates retrieved per title-search backend.
    pub max_candidates: usize,
    /// Authority names to skip (case-insensitive).
    pub disabled_authorities: Vec<String>,
    /// Contact email appended to CrossRef requests (polite pool).
    pub crossref_mailto: Option<String>,
    /// Semantic Scholar API key.
    pub s2_api_key: Option<String>,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            authority_timeout_secs: 8,
            max_candidates: 5,
            disabled_authorities: vec![],
            crossref_mailto: None,
            s2_api_key: None,
        }
    }
}

/// Configuration for a full analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub verify: VerifyConfig,
    /// Character budget for the reference section handed to the structurer.
    pub max_section_chars: usize,
    /// Sampling temperature for persona critique completions. Structuring
    /// always runs at temperature 0.
    pub critique_temperature: f32,
    /// Whether to ask the model for supplementary related-reading
    /// suggestions and merge them (deduplicated) into the citation list.
    pub suggest_supplementary: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            verify: VerifyConfig::default(),
            max_section_chars: structurer::MAX_SECTION_CHARS,
            critique_temperature: 0.7,
            suggest_supplementary: true,
        }
    }
}
