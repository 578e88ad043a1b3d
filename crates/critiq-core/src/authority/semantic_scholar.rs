use super::{AuthorityBackend, AuthorityRecord};
use critiq_parsing::get_query_words;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub struct SemanticScholar {
    pub api_key: Option<String>,
    pub max_results: usize,
}

impl AuthorityBackend for SemanticScholar {
    fn name(&self) -> &str {
        "Semantic Scholar"
    }

    fn search<'a>(
        &'a self,
        query: &'a str,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AuthorityRecord>, String>> + Send + 'a>> {
        Box::pin(async move {
            let words = get_query_words(query, 8);
            let query = words.join(" ");
            let url = format!(
                "https://api.semanticscholar.org/graph/v1/paper/search?query={}&limit={}&fields=title,authors,year,externalIds,url",
                urlencoding::encode(&query),
                self.max_results
            );

            let mut req = client
                .get(&url)
                .header("User-Agent", "critiq/0.1")
                .timeout(timeout);
            if let Some(ref key) = self.api_key {
                req = req.header("x-api-key", key);
            }

            let resp = req.send().await.map_err(|e| e.to_string())?;

            let status = resp.status();
            if status.as_u16() == 429 {
                return Err("Rate limited (429)".into());
            }
            if !status.is_success() {
                return Err(format!("HTTP {}", status));
            }

            let data: serde_json::Value = resp.json().await.map_err(|e| e.to_string())?;
            let items = data["data"].as_array().cloned().unwrap_or_default();

            let mut records = Vec::new();
            for item in items.iter().take(self.max_results) {
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

                records.push(AuthorityRecord {
                    title: title.to_string(),
                    authors,
                    year: item["year"].as_i64().map(|y| y as i32),
                    doi: item["externalIds"]["DOI"].as_str().map(String::from),
                    url: item["url"].as_str().map(String::from),
                });
            }

            Ok(records)
        })
    }
}
