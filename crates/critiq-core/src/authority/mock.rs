//! Mock authority backend and DOI resolver for testing.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{AuthorityBackend, AuthorityRecord};
use crate::doi::DoiResolver;

/// A configurable mock response for [`MockAuthority`].
#[derive(Clone, Debug)]
pub enum MockSearchResponse {
    /// Return these candidates.
    Found(Vec<AuthorityRecord>),
    /// Empty result set.
    NotFound,
    /// Simulate a transport error.
    Error(String),
}

/// A hand-rolled mock implementing [`AuthorityBackend`] for tests.
pub struct MockAuthority {
    name: &'static str,
    response: MockSearchResponse,
    delay: Option<Duration>,
    call_count: AtomicUsize,
}

impl MockAuthority {
    pub fn new(name: &'static str, response: MockSearchResponse) -> Self {
        Self {
            name,
            response,
            delay: None,
            call_count: AtomicUsize::new(0),
        }
    }

    /// Set simulated network latency per call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// How many times `search()` has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl AuthorityBackend for MockAuthority {
    fn name(&self) -> &str {
        self.name
    }

    fn search<'a>(
        &'a self,
        _query: &'a str,
        _client: &'a reqwest::Client,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AuthorityRecord>, String>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let response = self.response.clone();
        let delay = self.delay;

        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }

            match response {
                MockSearchResponse::Found(records) => Ok(records),
                MockSearchResponse::NotFound => Ok(vec![]),
                MockSearchResponse::Error(msg) => Err(msg),
            }
        })
    }
}

/// Scripted DOI resolver: resolves only the DOIs it was seeded with.
#[derive(Default)]
pub struct MockDoiResolver {
    records: HashMap<String, AuthorityRecord>,
    call_count: AtomicUsize,
}

impl MockDoiResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, doi: &str, record: AuthorityRecord) -> Self {
        self.records.insert(doi.to_lowercase(), record);
        self
    }

    /// How many times `resolve()` has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl DoiResolver for MockDoiResolver {
    fn resolve<'a>(
        &'a self,
        doi: &'a str,
        _client: &'a reqwest::Client,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<AuthorityRecord>, String>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let found = self.records.get(&doi.to_lowercase()).cloned();
        Box::pin(async move { Ok(found) })
    }
}
