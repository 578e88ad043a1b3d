use super::{AuthorityBackend, AuthorityRecord};
use critiq_parsing::get_query_words;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub struct PubMed {
    pub max_results: usize,
}

impl AuthorityBackend for PubMed {
    fn name(&self) -> &str {
        "PubMed"
    }

    fn search<'a>(
        &'a self,
        query: &'a str,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AuthorityRecord>, String>> + Send + 'a>> {
        Box::pin(async move {
            let words = get_query_words(query, 8);
            let term = format!("{}[Title]", words.join(" "));
            let retmax = self.max_results.to_string();

            // Step 1: search for matching article ids
            let search_url = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi";
            let resp = client
                .get(search_url)
                .query(&[
                    ("db", "pubmed"),
                    ("term", &term),
                    ("retmode", "json"),
                    ("retmax", &retmax),
                ])
                .header("User-Agent", "critiq/0.1")
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| e.to_string())?;

            if !resp.status().is_success() {
                return Err(format!("HTTP {}", resp.status()));
            }

            let data: serde_json::Value = resp.json().await.map_err(|e| e.to_string())?;
            let id_list: Vec<String> = data["esearchresult"]["idlist"]
                .as_array()
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();

            if id_list.is_empty() {
                return Ok(vec![]);
            }

            // Step 2: fetch summaries
            let fetch_url = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esummary.fcgi";
            let ids = id_list.join(",");
            let resp = client
                .get(fetch_url)
                .query(&[("db", "pubmed"), ("id", ids.as_str()), ("retmode", "json")])
                .header("User-Agent", "critiq/0.1")
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| e.to_string())?;

            if !resp.status().is_success() {
                return Err(format!("HTTP {} on fetch", resp.status()));
            }

            let data: serde_json::Value = resp.json().await.map_err(|e| e.to_string())?;
            let results = &data["result"];

            let mut records = Vec::new();
            for pmid in id_list.iter().take(self.max_results) {
                let item = &results[pmid.as_str()];
                let title = item["title"].as_str().unwrap_or("");
                if title.is_empty() {
                    continue;
                }

                let authors: Vec<String> = item["authors"]
                    .as_array()
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|a| a["name"].as_str().map(String::from))
                            .collect()
                    })
                    .unwrap_or_default();

                // "pubdate" looks like "2020 Mar 15"
                let year = item["pubdate"]
                    .as_str()
                    .and_then(|d| d.split_whitespace().next())
                    .and_then(|y| y.parse().ok());

                let doi = item["elocationid"]
                    .as_str()
                    .filter(|e| e.starts_with("doi: "))
                    .map(|e| e.trim_start_matches("doi: ").to_string());

                records.push(AuthorityRecord {
                    title: title.to_string(),
                    authors,
                    year,
                    doi,
                    url: Some(format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid)),
                });
            }

            Ok(records)
        })
    }
}
