//! Authority verification: corroborate extracted citations against
//! bibliographic authorities.
//!
//! Each record runs through a fallback chain: DOI-direct resolution first
//! (a resolving DOI is ground truth and skips fuzzy scoring entirely), then
//! concurrent title search across all enabled authorities with multi-metric
//! fuzzy scoring, and finally the strict fallback that leaves the record
//! unverified. Verification is sequential across records so that the claim
//! set enforces one authority match per work, and the claim set can be
//! shared across passes.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::authority::{build_authority_list, AuthorityBackend, AuthorityRecord};
use crate::doi::{DoiOrg, DoiResolver};
use crate::matching::{
    dedup_key, meets_threshold, normalize_title, score_candidate, substring_containment,
    TitleScore, AUTHOR_BONUS, YEAR_BONUS,
};
use crate::rate_limit::AuthorityLimiters;
use crate::{CitationRecord, VerifyConfig};

/// Authority works already claimed by a verification pass, keyed by
/// lowercased DOI and by normalized title. Sharing one claim set across
/// passes keeps a single authority record from backing two different
/// citation records.
#[derive(Debug, Default)]
pub struct ClaimedWorks {
    dois: HashSet<String>,
    titles: HashSet<String>,
}

impl ClaimedWorks {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Verifies citation records against external authorities.
pub struct Verifier {
    authorities: Vec<Arc<dyn AuthorityBackend>>,
    doi_resolver: Arc<dyn DoiResolver>,
    client: reqwest::Client,
    config: VerifyConfig,
    limiters: Arc<AuthorityLimiters>,
}

impl Verifier {
    pub fn new(config: VerifyConfig, client: reqwest::Client) -> Self {
        let authorities = build_authority_list(&config);
        Self::with_backends(authorities, Arc::new(DoiOrg), config, client)
    }

    /// Construct with explicit backends. Tests use this with mocks.
    pub fn with_backends(
        authorities: Vec<Arc<dyn AuthorityBackend>>,
        doi_resolver: Arc<dyn DoiResolver>,
        config: VerifyConfig,
        client: reqwest::Client,
    ) -> Self {
        Self {
            authorities,
            doi_resolver,
            client,
            config,
            limiters: Arc::new(AuthorityLimiters::new()),
        }
    }

    /// Verify every record in order. `raw_blocks[i]` is the raw reference
    /// text the i-th record was extracted from; a missing block degrades to
    /// title-only matching.
    ///
    /// Records are processed sequentially: an authority match claimed by an
    /// earlier record (by DOI or by normalized title) is not offered to
    /// later ones, so duplicate references cannot share one proof link.
    pub async fn verify_all(
        &self,
        records: Vec<CitationRecord>,
        raw_blocks: &[String],
    ) -> Vec<CitationRecord> {
        let mut claims = ClaimedWorks::new();
        self.verify_all_claimed(records, raw_blocks, &mut claims)
            .await
    }

    /// Like [`verify_all`], but claiming against (and extending) an
    /// existing claim set. A later pass over supplementary records shares
    /// the primary pass's claims so it cannot re-verify a work a primary
    /// citation already owns.
    pub async fn verify_all_claimed(
        &self,
        records: Vec<CitationRecord>,
        raw_blocks: &[String],
        claims: &mut ClaimedWorks,
    ) -> Vec<CitationRecord> {
        let mut out = Vec::with_capacity(records.len());
        for (i, record) in records.into_iter().enumerate() {
            let raw = raw_blocks.get(i).map(String::as_str).unwrap_or("");
            out.push(self.verify_one(record, raw, claims).await);
        }
        out
    }

    async fn verify_one(
        &self,
        mut record: CitationRecord,
        raw: &str,
        claims: &mut ClaimedWorks,
    ) -> CitationRecord {
        let timeout = Duration::from_secs(self.config.authority_timeout_secs);

        // Step 1: DOI-direct resolution.
        for doi in critiq_parsing::extract_dois(raw) {
            let doi_key = doi.to_lowercase();
            if claims.dois.contains(&doi_key) {
                continue;
            }
            self.limiters.until_ready("doi.org").await;
            match self.doi_resolver.resolve(&doi, &self.client, timeout).await {
                Ok(Some(found)) if !found.title.is_empty() => {
                    let title_key = dedup_key(&found.title);
                    if claims.titles.contains(&title_key) {
                        continue;
                    }
                    if let Some(link) = found.proof_link() {
                        claims.dois.insert(doi_key);
                        claims.titles.insert(title_key);
                        backfill(&mut record, &found);
                        record.authority_link = Some(link);
                        record.verified = true;
                        return record;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(doi = %doi, error = %e, "DOI resolution failed");
                }
            }
        }

        // Step 2: fuzzy title search across all authorities.
        let query = if raw.chars().count() >= record.title.chars().count() {
            raw
        } else {
            record.title.as_str()
        };
        if query.trim().is_empty() {
            return record;
        }

        let candidates = self.search_all(query, timeout).await;

        let mut references: Vec<&str> = vec![raw];
        if !record.title.trim().is_empty() {
            references.push(record.title.as_str());
        }
        let raw_norm = normalize_title(raw);

        let mut best: Option<(f64, &AuthorityRecord)> = None;
        for cand in &candidates {
            if cand.title.is_empty() || cand.proof_link().is_none() {
                continue;
            }
            if let Some(d) = &cand.doi {
                if claims.dois.contains(&d.to_lowercase()) {
                    continue;
                }
            }
            if claims.titles.contains(&dedup_key(&cand.title)) {
                continue;
            }

            let base = score_candidate(&cand.title, &references);
            let author_hit = author_in_text(cand, &raw_norm);
            let year_hit = match (cand.year, record.year()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            };
            let (score, ok) = decide(base, author_hit, year_hit);

            let contained =
                !record.title.is_empty() && substring_containment(&cand.title, &record.title);

            if (ok || contained) && best.map_or(true, |(s, _)| score > s) {
                best = Some((score, cand));
            }
        }

        if let Some((_, cand)) = best {
            if let Some(d) = &cand.doi {
                claims.dois.insert(d.to_lowercase());
            }
            claims.titles.insert(dedup_key(&cand.title));
            backfill(&mut record, cand);
            record.authority_link = cand.proof_link();
            record.verified = true;
            return record;
        }

        // Step 3: strict fallback. No authority match means unverified, and
        // no courtesy link is fabricated.
        record
    }

    /// Fan the query out to every authority concurrently, flattening the
    /// candidate lists. A failing authority is logged and contributes
    /// nothing.
    async fn search_all(&self, query: &str, timeout: Duration) -> Vec<AuthorityRecord> {
        let mut set = JoinSet::new();
        for authority in &self.authorities {
            let authority = Arc::clone(authority);
            let limiters = Arc::clone(&self.limiters);
            let client = self.client.clone();
            let query = query.to_string();
            set.spawn(async move {
                limiters.until_ready(authority.name()).await;
                let result = authority.search(&query, &client, timeout).await;
                (authority.name().to_string(), result)
            });
        }

        let mut candidates = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(records))) => candidates.extend(records),
                Ok((name, Err(e))) => {
                    tracing::warn!(authority = %name, error = %e, "authority search failed");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "authority search task panicked");
                }
            }
        }
        candidates
    }
}

/// Apply author and year bonuses to a base score and test it against the
/// metric-specific threshold.
fn decide(base: TitleScore, author_hit: bool, year_hit: bool) -> (f64, bool) {
    let mut score = base.score;
    if author_hit {
        score += AUTHOR_BONUS;
    }
    if year_hit {
        score += YEAR_BONUS;
    }
    (score, meets_threshold(base.metric, score))
}

/// Whether any candidate author name token appears as a word in the
/// normalized raw reference text. Tokens under 3 characters (initials) are
/// ignored.
fn author_in_text(cand: &AuthorityRecord, raw_norm: &str) -> bool {
    if raw_norm.is_empty() {
        return false;
    }
    for author in &cand.authors {
        for token in normalize_title(author).split_whitespace() {
            if token.len() >= 3 && raw_norm.split_whitespace().any(|w| w == token) {
                return true;
            }
        }
    }
    false
}

/// Fill in fields the extractor left empty from the authority's record.
/// Extracted values are never overwritten.
fn backfill(record: &mut CitationRecord, found: &AuthorityRecord) {
    if record.title.is_empty() && !found.title.is_empty() {
        record.title = found.title.clone();
    }
    if record.authors.is_empty() && !found.authors.is_empty() {
        record.authors = found.authors.clone();
    }
    if record.published.is_none() {
        record.published = found.year.map(|y| vec![y]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::mock::{MockAuthority, MockDoiResolver, MockSearchResponse};
    use crate::matching::MatchMetric;

    fn record(title: &str, year: Option<i32>) -> CitationRecord {
        CitationRecord::unverified(title.to_string(), vec![], year)
    }

    fn authority_record(title: &str, year: Option<i32>, url: &str) -> AuthorityRecord {
        AuthorityRecord {
            title: title.to_string(),
            authors: vec!["Smith, Jane".to_string()],
            year,
            doi: None,
            url: Some(url.to_string()),
        }
    }

    fn verifier_with(
        authorities: Vec<Arc<dyn AuthorityBackend>>,
        resolver: MockDoiResolver,
    ) -> Verifier {
        Verifier::with_backends(
            authorities,
            Arc::new(resolver),
            VerifyConfig::default(),
            reqwest::Client::new(),
        )
    }

    #[tokio::test]
    async fn test_doi_path_short_circuits_title_search() {
        let authority = Arc::new(MockAuthority::new(
            "Mock",
            MockSearchResponse::Found(vec![authority_record(
                "Deep Learning",
                Some(2015),
                "https://example.org/1",
            )]),
        ));
        let resolver = MockDoiResolver::new().with_record(
            "10.1038/nature14539",
            AuthorityRecord {
                title: "Deep Learning".into(),
                authors: vec!["LeCun, Yann".into()],
                year: Some(2015),
                doi: Some("10.1038/nature14539".into()),
                url: Some("https://doi.org/10.1038/nature14539".into()),
            },
        );
        let verifier = verifier_with(vec![authority.clone()], resolver);

        let raws = vec!["LeCun et al. Deep Learning. doi:10.1038/nature14539".to_string()];
        let out = verifier
            .verify_all(vec![record("Deep Learning", Some(2015))], &raws)
            .await;

        assert!(out[0].verified);
        assert_eq!(
            out[0].authority_link.as_deref(),
            Some("https://doi.org/10.1038/nature14539")
        );
        assert_eq!(authority.call_count(), 0);
    }

    #[tokio::test]
    async fn test_doi_backfills_missing_fields() {
        let resolver = MockDoiResolver::new().with_record(
            "10.1234/x",
            AuthorityRecord {
                title: "A Study of Things".into(),
                authors: vec!["Smith, Jane".into()],
                year: Some(2020),
                doi: Some("10.1234/x".into()),
                url: Some("https://doi.org/10.1234/x".into()),
            },
        );
        let verifier = verifier_with(vec![], resolver);

        let raws = vec!["Smith 2020, https://doi.org/10.1234/x".to_string()];
        let out = verifier.verify_all(vec![record("", None)], &raws).await;

        assert!(out[0].verified);
        assert_eq!(out[0].title, "A Study of Things");
        assert_eq!(out[0].authors, vec!["Smith, Jane"]);
        assert_eq!(out[0].year(), Some(2020));
    }

    #[tokio::test]
    async fn test_duplicate_doi_not_reused() {
        let resolver = MockDoiResolver::new().with_record(
            "10.1234/x",
            AuthorityRecord {
                title: "A Study of Things".into(),
                authors: vec![],
                year: None,
                doi: Some("10.1234/x".into()),
                url: Some("https://doi.org/10.1234/x".into()),
            },
        );
        let verifier = verifier_with(
            vec![Arc::new(MockAuthority::new("Mock", MockSearchResponse::NotFound))],
            resolver,
        );

        let raws = vec![
            "First ref doi:10.1234/x".to_string(),
            "Second ref doi:10.1234/x".to_string(),
        ];
        let out = verifier
            .verify_all(
                vec![record("A Study of Things", None), record("Other Title Entirely", None)],
                &raws,
            )
            .await;

        assert!(out[0].verified);
        assert!(!out[1].verified);
        assert!(out[1].authority_link.is_none());
    }

    #[tokio::test]
    async fn test_title_search_exact_match_verifies() {
        let authority = Arc::new(MockAuthority::new(
            "Mock",
            MockSearchResponse::Found(vec![authority_record(
                "Attention Is All You Need",
                Some(2017),
                "https://example.org/attn",
            )]),
        ));
        let verifier = verifier_with(vec![authority], MockDoiResolver::new());

        let raws = vec!["Vaswani et al. (2017). Attention Is All You Need.".to_string()];
        let out = verifier
            .verify_all(vec![record("Attention Is All You Need", Some(2017))], &raws)
            .await;

        assert!(out[0].verified);
        assert_eq!(out[0].authority_link.as_deref(), Some("https://example.org/attn"));
    }

    #[tokio::test]
    async fn test_title_search_unrelated_candidate_rejected() {
        let authority = Arc::new(MockAuthority::new(
            "Mock",
            MockSearchResponse::Found(vec![authority_record(
                "Completely Different Work About Cats",
                Some(1999),
                "https://example.org/cats",
            )]),
        ));
        let verifier = verifier_with(vec![authority], MockDoiResolver::new());

        let raws = vec!["Vaswani et al. (2017). Attention Is All You Need.".to_string()];
        let out = verifier
            .verify_all(vec![record("Attention Is All You Need", Some(2017))], &raws)
            .await;

        assert!(!out[0].verified);
        assert!(out[0].authority_link.is_none());
    }

    #[tokio::test]
    async fn test_candidate_without_link_skipped() {
        let mut cand = authority_record("Attention Is All You Need", Some(2017), "");
        cand.url = None;
        cand.doi = None;
        let authority = Arc::new(MockAuthority::new(
            "Mock",
            MockSearchResponse::Found(vec![cand]),
        ));
        let verifier = verifier_with(vec![authority], MockDoiResolver::new());

        let raws = vec!["Attention Is All You Need".to_string()];
        let out = verifier
            .verify_all(vec![record("Attention Is All You Need", Some(2017))], &raws)
            .await;

        assert!(!out[0].verified);
    }

    #[tokio::test]
    async fn test_failing_authority_does_not_block_others() {
        let bad = Arc::new(MockAuthority::new(
            "Bad",
            MockSearchResponse::Error("HTTP 500".into()),
        ));
        let good = Arc::new(MockAuthority::new(
            "Good",
            MockSearchResponse::Found(vec![authority_record(
                "A Study of Things",
                Some(2020),
                "https://example.org/things",
            )]),
        ));
        let verifier = verifier_with(vec![bad, good], MockDoiResolver::new());

        let raws = vec!["Smith, Jane (2020). A Study of Things.".to_string()];
        let out = verifier
            .verify_all(vec![record("A Study of Things", Some(2020))], &raws)
            .await;

        assert!(out[0].verified);
    }

    #[tokio::test]
    async fn test_claims_carry_across_passes() {
        let authority = Arc::new(MockAuthority::new(
            "Mock",
            MockSearchResponse::Found(vec![AuthorityRecord {
                title: "A Study of Things".into(),
                authors: vec![],
                year: Some(2020),
                doi: Some("10.1234/x".into()),
                url: Some("https://example.org/things".into()),
            }]),
        ));
        let verifier = verifier_with(vec![authority], MockDoiResolver::new());

        let mut claims = ClaimedWorks::new();
        let first = verifier
            .verify_all_claimed(
                vec![record("A Study of Things", Some(2020))],
                &["Smith (2020). A Study of Things.".to_string()],
                &mut claims,
            )
            .await;
        assert!(first[0].verified);

        // A retitled variant in a later pass cannot take the same work.
        let second = verifier
            .verify_all_claimed(
                vec![record("A Study of Things Extended Overview", None)],
                &["A Study of Things Extended Overview".to_string()],
                &mut claims,
            )
            .await;
        assert!(!second[0].verified);
        assert!(second[0].authority_link.is_none());
    }

    // PDF extraction sometimes letter-spaces a title. Every fuzzy metric
    // scores low against the spaced-out form, but the spaceless keys match
    // exactly and the containment rule accepts it.
    #[tokio::test]
    async fn test_containment_accepts_letter_spaced_title() {
        let spaced = "H I G H T H R O U G H P U T S E Q U E N C I N G";
        let base = score_candidate("High-Throughput Sequencing", &[spaced]);
        assert!(!meets_threshold(base.metric, base.score));

        let authority = Arc::new(MockAuthority::new(
            "Mock",
            MockSearchResponse::Found(vec![authority_record(
                "High-Throughput Sequencing",
                None,
                "https://example.org/hts",
            )]),
        ));
        let verifier = verifier_with(vec![authority], MockDoiResolver::new());

        let out = verifier
            .verify_all(vec![record(spaced, None)], &[String::new()])
            .await;
        assert!(out[0].verified);
        assert_eq!(
            out[0].authority_link.as_deref(),
            Some("https://example.org/hts")
        );
    }

    #[tokio::test]
    async fn test_slow_authority_still_contributes() {
        let fast = Arc::new(MockAuthority::new("Fast", MockSearchResponse::NotFound));
        let slow = Arc::new(
            MockAuthority::new(
                "Slow",
                MockSearchResponse::Found(vec![authority_record(
                    "A Study of Things",
                    Some(2020),
                    "https://example.org/things",
                )]),
            )
            .with_delay(Duration::from_millis(25)),
        );
        let verifier = verifier_with(vec![fast, slow], MockDoiResolver::new());

        let raws = vec!["Smith, Jane (2020). A Study of Things.".to_string()];
        let out = verifier
            .verify_all(vec![record("A Study of Things", Some(2020))], &raws)
            .await;
        assert!(out[0].verified);
    }

    #[tokio::test]
    async fn test_duplicate_title_not_reused() {
        let authority = Arc::new(MockAuthority::new(
            "Mock",
            MockSearchResponse::Found(vec![authority_record(
                "A Study of Things",
                Some(2020),
                "https://example.org/things",
            )]),
        ));
        let verifier = verifier_with(vec![authority], MockDoiResolver::new());

        let raws = vec![
            "Smith (2020). A Study of Things.".to_string(),
            "Smith (2020). A Study of Things.".to_string(),
        ];
        let out = verifier
            .verify_all(
                vec![
                    record("A Study of Things", Some(2020)),
                    record("A Study of Things", Some(2020)),
                ],
                &raws,
            )
            .await;

        assert!(out[0].verified);
        assert!(!out[1].verified);
    }

    #[test]
    fn test_decide_token_set_needs_bonus_at_85() {
        let base = TitleScore {
            score: 85.0,
            metric: MatchMetric::TokenSetRatio,
        };
        let (_, ok) = decide(base, false, false);
        assert!(!ok);
        let (score, ok) = decide(base, false, true);
        assert_eq!(score, 91.0);
        assert!(ok);
    }

    #[test]
    fn test_decide_base_metric_at_threshold() {
        let base = TitleScore {
            score: 78.0,
            metric: MatchMetric::Ratio,
        };
        assert!(decide(base, false, false).1);
        let low = TitleScore {
            score: 70.0,
            metric: MatchMetric::Ratio,
        };
        assert!(!decide(low, false, false).1);
        assert!(decide(low, true, true).1);
    }

    #[test]
    fn test_author_in_text_ignores_initials() {
        let cand = AuthorityRecord {
            title: "T".into(),
            authors: vec!["Smith J".into()],
            year: None,
            doi: None,
            url: None,
        };
        assert!(author_in_text(&cand, "smith j 2020 a study of things"));
        let initials_only = AuthorityRecord {
            title: "T".into(),
            authors: vec!["J K".into()],
            year: None,
            doi: None,
            url: None,
        };
        assert!(!author_in_text(&initials_only, "smith j k 2020"));
    }

    #[test]
    fn test_backfill_never_overwrites() {
        let mut rec = record("Kept Title", Some(2001));
        rec.authors = vec!["Original, Author".into()];
        let found = AuthorityRecord {
            title: "Authority Title".into(),
            authors: vec!["Other, Person".into()],
            year: Some(1999),
            doi: None,
            url: None,
        };
        backfill(&mut rec, &found);
        assert_eq!(rec.title, "Kept Title");
        assert_eq!(rec.authors, vec!["Original, Author"]);
        assert_eq!(rec.year(), Some(2001));
    }
}
