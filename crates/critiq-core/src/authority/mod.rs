//! Bibliographic authority backends: external services queried to
//! corroborate a citation by title search.

pub mod crossref;
pub mod mock;
pub mod pubmed;
pub mod semantic_scholar;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::VerifyConfig;

/// A candidate work returned by an authority.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorityRecord {
    pub title: String,
    /// "Surname, Given" or the authority's native form.
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub doi: Option<String>,
    pub url: Option<String>,
}

impl AuthorityRecord {
    /// The link used as citation proof: the record URL, or a DOI URL.
    pub fn proof_link(&self) -> Option<String> {
        self.url.clone().or_else(|| {
            self.doi
                .as_ref()
                .map(|d| format!("https://doi.org/{}", d))
        })
    }
}

/// An authority that can search for works by free-text title, returning up
/// to a handful of candidates for the verifier to score.
pub trait AuthorityBackend: Send + Sync {
    /// The canonical name of this authority (e.g. "CrossRef").
    fn name(&self) -> &str;

    /// Search for candidate works matching the query text.
    fn search<'a>(
        &'a self,
        query: &'a str,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AuthorityRecord>, String>> + Send + 'a>>;
}

/// Build the authority list from config, honoring disabled names.
pub fn build_authority_list(config: &VerifyConfig) -> Vec<Arc<dyn AuthorityBackend>> {
    let enabled = |name: &str| {
        !config
            .disabled_authorities
            .iter()
            .any(|d| d.eq_ignore_ascii_case(name))
    };

    let mut authorities: Vec<Arc<dyn AuthorityBackend>> = Vec::new();

    if enabled("CrossRef") {
        authorities.push(Arc::new(crossref::CrossRef {
            mailto: config.crossref_mailto.clone(),
            max_results: config.max_candidates,
        }));
    }
    if enabled("Semantic Scholar") {
        authorities.push(Arc::new(semantic_scholar::SemanticScholar {
            api_key: config.s2_api_key.clone(),
            max_results: config.max_candidates,
        }));
    }
    if enabled("PubMed") {
        authorities.push(Arc::new(pubmed::PubMed {
            max_results: config.max_candidates,
        }));
    }

    authorities
}
