//! Language-model completion backend trait and implementations.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Serialize;

/// One turn of conversation history.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// A completion service: system prompt + history + user content in,
/// generated text out. Implementations must be safe to call concurrently.
pub trait CompletionBackend: Send + Sync {
    /// Human-readable name for logs.
    fn name(&self) -> &str;

    /// Run one completion.
    fn complete<'a>(
        &'a self,
        system_prompt: &'a str,
        history: &'a [ChatMessage],
        user_content: &'a str,
        temperature: f32,
    ) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>>;
}

/// OpenAI-compatible chat-completions client.
pub struct OpenAiCompletion {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl OpenAiCompletion {
    pub fn new(api_key: String, model: String, client: reqwest::Client) -> Self {
        Self {
            api_key,
            model,
            base_url: "https://api.openai.com/v1".into(),
            client,
            timeout: Duration::from_secs(120),
        }
    }

    /// Point at a different OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl CompletionBackend for OpenAiCompletion {
    fn name(&self) -> &str {
        "openai"
    }

    fn complete<'a>(
        &'a self,
        system_prompt: &'a str,
        history: &'a [ChatMessage],
        user_content: &'a str,
        temperature: f32,
    ) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>> {
        Box::pin(async move {
            let mut messages = Vec::with_capacity(history.len() + 2);
            messages.push(ChatMessage::system(system_prompt));
            messages.extend(history.iter().cloned());
            messages.push(ChatMessage::user(user_content));

            let body = serde_json::json!({
                "model": self.model,
                "messages": messages,
                "temperature": temperature,
            });

            let url = format!("{}/chat/completions", self.base_url);
            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| e.to_string())?;

            let status = resp.status();
            if !status.is_success() {
                let detail = resp.text().await.unwrap_or_default();
                let detail: String = detail.chars().take(200).collect();
                return Err(format!("HTTP {status}: {detail}"));
            }

            let data: serde_json::Value = resp.json().await.map_err(|e| e.to_string())?;
            data["choices"][0]["message"]["content"]
                .as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| "completion response had no message content".into())
        })
    }
}

/// A scripted completion backend for tests: a handler inspects the system
/// prompt and user content and decides the response.
pub struct MockCompletion {
    name: &'static str,
    handler: Box<dyn Fn(&str, &str) -> Result<String, String> + Send + Sync>,
    call_count: std::sync::atomic::AtomicUsize,
}

impl MockCompletion {
    pub fn new(
        handler: impl Fn(&str, &str) -> Result<String, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: "mock",
            handler: Box::new(handler),
            call_count: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Always return the same text.
    pub fn fixed(response: impl Into<String>) -> Self {
        let response = response.into();
        Self::new(move |_, _| Ok(response.clone()))
    }

    /// How many times `complete()` has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl CompletionBackend for MockCompletion {
    fn name(&self) -> &str {
        self.name
    }

    fn complete<'a>(
        &'a self,
        system_prompt: &'a str,
        _history: &'a [ChatMessage],
        user_content: &'a str,
        _temperature: f32,
    ) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>> {
        self.call_count
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let result = (self.handler)(system_prompt, user_content);
        Box::pin(async move { result })
    }
}
