use super::{AuthorityBackend, AuthorityRecord};
use critiq_parsing::get_query_words;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub struct CrossRef {
    pub mailto: Option<String>,
    pub max_results: usize,
}

impl AuthorityBackend for CrossRef {
    fn name(&self) -> &str {
        "CrossRef"
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
            let mut url = format!(
                "https://api.crossref.org/works?query.title={}&rows={}",
                urlencoding::encode(&query),
                self.max_results
            );

            let user_agent = if let Some(ref email) = self.mailto {
                url.push_str(&format!("&mailto={}", urlencoding::encode(email)));
                format!("critiq/0.1 (mailto:{})", email)
            } else {
                "critiq/0.1".to_string()
            };

            let resp = client
                .get(&url)
                .header("User-Agent", user_agent)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| e.to_string())?;

            let status = resp.status();
            if !status.is_success() {
                return Err(format!("HTTP {}", status));
            }

            let data: serde_json::Value = resp.json().await.map_err(|e| e.to_string())?;
            let items = data["message"]["items"]
                .as_array()
                .cloned()
                .unwrap_or_default();

            let mut records = Vec::new();
            for item in items.iter().take(self.max_results) {
                let title = item["title"]
                    .as_array()
                    .and_then(|a| a.first())
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                if title.is_empty() {
                    continue;
                }

                let authors: Vec<String> = item["author"]
                    .as_array()
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|a| {
                                let family = a["family"].as_str()?;
                                let given = a["given"].as_str().unwrap_or("");
                                Some(if given.is_empty() {
                                    family.to_string()
                                } else {
                                    format!("{}, {}", family, given)
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                // Year lives under whichever publication date CrossRef has.
                let year = ["published-print", "published-online", "issued"]
                    .iter()
                    .find_map(|k| item[k]["date-parts"][0][0].as_i64())
                    .map(|y| y as i32);

                let doi = item["DOI"].as_str().map(String::from);
                let url = doi.as_ref().map(|d| format!("https://doi.org/{}", d));

                records.push(AuthorityRecord {
                    title: title.to_string(),
                    authors,
                    year,
                    doi,
                    url,
                });
            }

            Ok(records)
        })
    }
}
