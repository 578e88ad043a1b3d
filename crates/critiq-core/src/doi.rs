//! DOI resolution against doi.org content negotiation.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::authority::AuthorityRecord;

/// Resolves a DOI to bibliographic metadata. Object-safe so tests can
/// substitute a scripted resolver.
pub trait DoiResolver: Send + Sync {
    fn resolve<'a>(
        &'a self,
        doi: &'a str,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<AuthorityRecord>, String>> + Send + 'a>>;
}

/// The real resolver: doi.org content negotiation.
pub struct DoiOrg;

impl DoiResolver for DoiOrg {
    fn resolve<'a>(
        &'a self,
        doi: &'a str,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<AuthorityRecord>, String>> + Send + 'a>> {
        Box::pin(resolve_doi(doi, client, timeout))
    }
}

/// Resolve a DOI to bibliographic metadata via doi.org (CSL JSON).
///
/// Returns `Ok(None)` for an unknown DOI (404) and `Err` for transport or
/// format failures; callers treat both as "no match from this source".
pub async fn resolve_doi(
    doi: &str,
    client: &reqwest::Client,
    timeout: Duration,
) -> Result<Option<AuthorityRecord>, String> {
    if doi.is_empty() {
        return Ok(None);
    }

    let url = format!("https://doi.org/{}", doi);
    let resp = client
        .get(&url)
        .header("Accept", "application/vnd.citationstyles.csl+json")
        .header("User-Agent", "critiq/0.1")
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| e.to_string())?;

    if resp.status().as_u16() == 404 {
        return Ok(None);
    }
    if !resp.status().is_success() {
        return Err(format!("DOI lookup failed: HTTP {}", resp.status()));
    }

    let data: serde_json::Value = resp.json().await.map_err(|e| e.to_string())?;
    Ok(Some(record_from_csl(doi, &data)))
}

/// Build an [`AuthorityRecord`] from a CSL JSON payload.
fn record_from_csl(doi: &str, data: &serde_json::Value) -> AuthorityRecord {
    let title = match &data["title"] {
        serde_json::Value::Array(arr) => arr
            .first()
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        serde_json::Value::String(s) => s.clone(),
        _ => String::new(),
    };

    let authors: Vec<String> = data["author"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|a| {
                    if let Some(family) = a["family"].as_str() {
                        let given = a["given"].as_str().unwrap_or("");
                        if given.is_empty() {
                            Some(family.to_string())
                        } else {
                            Some(format!("{}, {}", family, given))
                        }
                    } else {
                        a["literal"].as_str().map(String::from)
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    let year = data["issued"]["date-parts"][0][0]
        .as_i64()
        .map(|y| y as i32);

    AuthorityRecord {
        title,
        authors,
        year,
        doi: Some(doi.to_string()),
        url: Some(format!("https://doi.org/{}", doi)),
    }
}
