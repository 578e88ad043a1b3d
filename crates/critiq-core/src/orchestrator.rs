//! Analysis Orchestrator: drives the citation pipeline once per document
//! and fans persona critiques out concurrently.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use critiq_parsing::{locate_references, segment_references};

use crate::llm::CompletionBackend;
use crate::merger::merge_citations;
use crate::persona::{PersonaResolver, PersonaUsageTracker, UsageState};
use crate::structurer::{align_blocks, structure_references, synthetic_raw_text, truncate_section};
use crate::supplement::suggest_supplementary;
use crate::verifier::{ClaimedWorks, Verifier};
use crate::{AnalysisConfig, AnalysisError, CitationRecord};

/// Character budget for the document excerpt handed to the supplementary
/// suggester. The opening of a paper carries the topic; the full text is
/// wasted context here.
const SUGGEST_EXCERPT_CHARS: usize = 2_000;

/// One persona's slot in the response: either a critique or an error,
/// never both.
#[derive(Debug, Clone, Serialize)]
pub struct PersonaResult {
    pub persona: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The full analysis payload: per-persona critiques in request order plus
/// the citation list computed once for the document.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub results: Vec<PersonaResult>,
    pub citations: Vec<CitationRecord>,
}

pub struct Orchestrator {
    llm: Arc<dyn CompletionBackend>,
    resolver: Arc<dyn PersonaResolver>,
    verifier: Verifier,
    usage: Arc<PersonaUsageTracker>,
    config: AnalysisConfig,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn CompletionBackend>,
        resolver: Arc<dyn PersonaResolver>,
        verifier: Verifier,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            llm,
            resolver,
            verifier,
            usage: Arc::new(PersonaUsageTracker::new(3)),
            config,
        }
    }

    /// Share a usage tracker across orchestrators.
    pub fn with_usage_tracker(mut self, usage: Arc<PersonaUsageTracker>) -> Self {
        self.usage = usage;
        self
    }

    /// Run the citation pipeline alone: locate, segment, structure, verify,
    /// and merge in supplementary suggestions.
    pub async fn extract_citations(
        &self,
        document: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<CitationRecord>, AnalysisError> {
        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }

        let section = locate_references(document);
        let blocks = segment_references(&section);
        tracing::info!(blocks = blocks.len(), "segmented reference section");

        let records =
            structure_references(self.llm.as_ref(), &section, self.config.max_section_chars)
                .await?;
        tracing::info!(records = records.len(), "structured citation records");

        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }

        let raws = align_blocks(&records, &blocks);
        let mut claims = ClaimedWorks::new();
        let mut citations = self
            .verifier
            .verify_all_claimed(records, &raws, &mut claims)
            .await;
        tracing::info!(
            verified = citations.iter().filter(|c| c.verified).count(),
            total = citations.len(),
            "authority verification complete"
        );

        if self.config.suggest_supplementary {
            if cancel.is_cancelled() {
                return Err(AnalysisError::Cancelled);
            }
            let excerpt = truncate_section(document, SUGGEST_EXCERPT_CHARS);
            let suggestions =
                suggest_supplementary(self.llm.as_ref(), excerpt, &citations).await;
            if !suggestions.is_empty() {
                // Suggestions are model output; they only join the list
                // after surviving the same verification pass. The claim set
                // carries over, so a suggestion cannot take an authority
                // record a primary citation already holds the link for.
                let raws: Vec<String> = suggestions.iter().map(synthetic_raw_text).collect();
                let verified = self
                    .verifier
                    .verify_all_claimed(suggestions, &raws, &mut claims)
                    .await;
                citations = merge_citations(citations, verified);
            }
        }

        Ok(citations)
    }

    /// Analyze a document under one or more personas.
    ///
    /// Citations are computed once and shared by every persona's result.
    /// Critique completions run concurrently; a failure in one persona's
    /// call (or an unknown persona name) fills that slot's `error` field
    /// and never disturbs the others. Result order matches request order.
    pub async fn analyze(
        &self,
        document: &str,
        personas: &[String],
        cancel: CancellationToken,
    ) -> Result<AnalysisReport, AnalysisError> {
        let resolved: Vec<(String, Option<String>)> = personas
            .iter()
            .map(|name| (name.clone(), self.resolver.resolve(name)))
            .collect();

        if resolved.iter().all(|(_, prompt)| prompt.is_none()) {
            return Err(AnalysisError::NoPersonasResolved);
        }

        let citations = self.extract_citations(document, &cancel).await?;

        let document: Arc<str> = Arc::from(document);
        let mut slots: Vec<Option<PersonaResult>> = resolved.iter().map(|_| None).collect();
        let mut set = JoinSet::new();

        for (i, (name, prompt)) in resolved.into_iter().enumerate() {
            let Some(prompt) = prompt else {
                slots[i] = Some(PersonaResult {
                    persona: name.clone(),
                    analysis: None,
                    error: Some(AnalysisError::PersonaNotFound(name.clone()).to_string()),
                });
                continue;
            };

            if self.usage.record_use(&name) == UsageState::Persisted {
                tracing::info!(persona = %name, "persona crossed usage threshold");
            }

            let llm = Arc::clone(&self.llm);
            let doc = Arc::clone(&document);
            let temperature = self.config.critique_temperature;
            let cancel = cancel.clone();
            set.spawn(async move {
                let result = tokio::select! {
                    _ = cancel.cancelled() => Err("cancelled".to_string()),
                    r = llm.complete(&prompt, &[], &doc, temperature) => r,
                };
                (i, name, result)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((i, persona, Ok(analysis))) => {
                    slots[i] = Some(PersonaResult {
                        persona,
                        analysis: Some(analysis),
                        error: None,
                    });
                }
                Ok((i, persona, Err(e))) => {
                    tracing::warn!(persona = %persona, error = %e, "persona critique failed");
                    slots[i] = Some(PersonaResult {
                        persona,
                        analysis: None,
                        error: Some(e),
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "persona critique task panicked");
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }

        let results = slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.unwrap_or_else(|| PersonaResult {
                    persona: personas[i].clone(),
                    analysis: None,
                    error: Some("analysis task failed".to_string()),
                })
            })
            .collect();

        Ok(AnalysisReport { results, citations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockCompletion;
    use crate::persona::StaticPersonaCatalog;
    use crate::VerifyConfig;

    const DOC: &str = "A paper about things.\n\nReferences\n\
        1. Smith, J. (2020) A Study of Things. Journal of Stuff, 12(3), 1-10.\n\
        2. Doe, A., Lee, B. (2019) Another Work.";

    fn extraction_json() -> &'static str {
        r#"{"citations": [
            {"title": "A Study of Things", "authors": ["Smith, J."], "published": [2020]},
            {"title": "Another Work", "authors": ["Doe, A.", "Lee, B."], "published": [2019]}
        ]}"#
    }

    /// Dispatch on the system prompt: extraction, suggestion, or critique.
    fn scripted_llm(fail_persona: Option<&'static str>) -> MockCompletion {
        MockCompletion::new(move |system, _user| {
            if system.contains("bibliographic reference parser") {
                Ok(extraction_json().to_string())
            } else if system.contains("research librarian") {
                Ok(r#"{"citations": []}"#.to_string())
            } else if fail_persona.is_some_and(|marker| system.contains(marker)) {
                Err("completion exploded".to_string())
            } else {
                Ok(format!("Critique under: {}", &system[..20.min(system.len())]))
            }
        })
    }

    fn orchestrator(llm: Arc<MockCompletion>) -> Orchestrator {
        let resolver = StaticPersonaCatalog::new()
            .with_persona("a", "PERSONA-A voice")
            .with_persona("b", "PERSONA-B voice")
            .with_persona("c", "PERSONA-C voice");
        let verifier = Verifier::with_backends(
            vec![],
            Arc::new(crate::authority::mock::MockDoiResolver::new()),
            VerifyConfig::default(),
            reqwest::Client::new(),
        );
        Orchestrator::new(
            llm,
            Arc::new(resolver),
            verifier,
            AnalysisConfig::default(),
        )
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_failed_persona_isolated_and_citations_shared() {
        let orch = orchestrator(Arc::new(scripted_llm(Some("PERSONA-B"))));
        let report = orch
            .analyze(DOC, &names(&["a", "b", "c"]), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.results.len(), 3);
        assert_eq!(report.results[0].persona, "a");
        assert!(report.results[0].analysis.is_some());
        assert!(report.results[1].error.is_some());
        assert!(report.results[1].analysis.is_none());
        assert!(report.results[2].analysis.is_some());

        assert_eq!(report.citations.len(), 2);
        assert_eq!(report.citations[0].sequence_id, Some(1));
        assert_eq!(report.citations[1].sequence_id, Some(2));
    }

    #[tokio::test]
    async fn test_citations_computed_once() {
        let llm = Arc::new(scripted_llm(None));
        let orch = orchestrator(Arc::clone(&llm));
        let report = orch
            .analyze(DOC, &names(&["a", "b", "c"]), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.results.len(), 3);
        for result in &report.results {
            assert!(result.analysis.is_some());
        }
        // One extraction + one suggestion + three critiques.
        assert_eq!(llm.call_count(), 5);
    }

    #[tokio::test]
    async fn test_unknown_persona_gets_error_slot() {
        let orch = orchestrator(Arc::new(scripted_llm(None)));
        let report = orch
            .analyze(DOC, &names(&["a", "ghost"]), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.results.len(), 2);
        assert!(report.results[0].analysis.is_some());
        let err = report.results[1].error.as_deref().unwrap();
        assert!(err.contains("ghost"));
    }

    #[tokio::test]
    async fn test_no_resolvable_personas_is_fatal() {
        let orch = orchestrator(Arc::new(scripted_llm(None)));
        let err = orch
            .analyze(DOC, &names(&["ghost", "phantom"]), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::NoPersonasResolved));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let orch = orchestrator(Arc::new(scripted_llm(None)));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = orch
            .analyze(DOC, &names(&["a"]), cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Cancelled));
    }

    #[tokio::test]
    async fn test_extraction_failure_aborts_request() {
        let llm = MockCompletion::new(|system, _| {
            if system.contains("bibliographic reference parser") {
                Ok("not json at all".to_string())
            } else {
                Ok("unused".to_string())
            }
        });
        let orch = orchestrator(Arc::new(llm));
        let err = orch
            .analyze(DOC, &names(&["a"]), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::ExtractionFormat(_)));
    }

    #[tokio::test]
    async fn test_supplement_cannot_reclaim_primary_match() {
        use crate::authority::mock::{MockAuthority, MockSearchResponse};
        use crate::authority::AuthorityRecord;

        let llm = MockCompletion::new(|system, _| {
            if system.contains("bibliographic reference parser") {
                Ok(r#"{"citations": [
                    {"title": "A Study of Things", "authors": ["Smith, J."], "published": [2020]}
                ]}"#
                .to_string())
            } else if system.contains("research librarian") {
                Ok(r#"{"citations": [{"title": "A Study of Things Extended Overview"}]}"#
                    .to_string())
            } else {
                Ok("critique".to_string())
            }
        });
        let authority = Arc::new(MockAuthority::new(
            "Mock",
            MockSearchResponse::Found(vec![AuthorityRecord {
                title: "A Study of Things".into(),
                authors: vec!["Smith, Jane".into()],
                year: Some(2020),
                doi: Some("10.1234/x".into()),
                url: Some("https://example.org/the-work".into()),
            }]),
        ));
        let verifier = Verifier::with_backends(
            vec![authority],
            Arc::new(crate::authority::mock::MockDoiResolver::new()),
            VerifyConfig::default(),
            reqwest::Client::new(),
        );
        let orch = Orchestrator::new(
            Arc::new(llm),
            Arc::new(StaticPersonaCatalog::new()),
            verifier,
            AnalysisConfig::default(),
        );

        let citations = orch
            .extract_citations(DOC, &CancellationToken::new())
            .await
            .unwrap();

        // The primary citation holds the work's only proof link; the
        // retitled suggestion survives only as an unverified supplement.
        let linked: Vec<_> = citations
            .iter()
            .filter(|c| c.authority_link.as_deref() == Some("https://example.org/the-work"))
            .collect();
        assert_eq!(linked.len(), 1);
        assert!(!linked[0].is_supplementary);

        let supp = citations.iter().find(|c| c.is_supplementary).unwrap();
        assert!(!supp.verified);
        assert!(supp.authority_link.is_none());
    }

    #[tokio::test]
    async fn test_extract_citations_merges_supplements() {
        let llm = MockCompletion::new(|system, _| {
            if system.contains("bibliographic reference parser") {
                Ok(extraction_json().to_string())
            } else if system.contains("research librarian") {
                Ok(r#"{"citations": [
                    {"title": "a study of things."},
                    {"title": "Fresh Related Work", "published": [2021]}
                ]}"#
                .to_string())
            } else {
                Ok("critique".to_string())
            }
        });
        let orch = orchestrator(Arc::new(llm));
        let citations = orch
            .extract_citations(DOC, &CancellationToken::new())
            .await
            .unwrap();

        // The duplicate of a primary title is dropped; the new work joins
        // the list as a supplement without a sequence id.
        assert_eq!(citations.len(), 3);
        assert!(!citations[0].is_supplementary);
        assert!(citations[2].is_supplementary);
        assert_eq!(citations[2].title, "Fresh Related Work");
        assert_eq!(citations[2].sequence_id, None);
        assert!(!citations[2].verified);
    }
}
