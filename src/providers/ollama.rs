use anyhow::{Context, Result, anyhow};
use futures_util::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::retry::{RetryPolicy, is_retryable, retry_after, wait_with_backoff};
use super::{
    BackendFuture, TextContext, TranslateFailure, TranslateRequest, TranslationBackend,
    TranslationOutcome,
};
use crate::translations;

pub(crate) const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Clone)]
pub struct Ollama {
    base_url: String,
    client: Client,
    document_timeout: Duration,
    ocr_timeout: Duration,
    retry: RetryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

impl Ollama {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let base_url = if base_url.trim().is_empty() {
            DEFAULT_BASE_URL.to_string()
        } else {
            base_url.trim().trim_end_matches('/').to_string()
        };
        Self {
            base_url,
            client: Client::new(),
            document_timeout: Duration::from_secs(120),
            ocr_timeout: Duration::from_secs(300),
            retry: RetryPolicy::new(3),
        }
    }

    pub fn with_timeouts(mut self, document: Duration, ocr: Duration) -> Self {
        self.document_timeout = document;
        self.ocr_timeout = ocr;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.retry = RetryPolicy::new(max_retries);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn timeout_for(&self, context: TextContext) -> Duration {
        match context {
            TextContext::Document => self.document_timeout,
            TextContext::Ocr => self.ocr_timeout,
        }
    }

    async fn chat(
        &self,
        request: &TranslateRequest,
        system: String,
        user: String,
    ) -> Result<String, TranslateFailure> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model: &request.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system,
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user,
                },
            ],
            stream: false,
            options: ChatOptions { temperature: 0.1 },
        };
        let timeout = self.timeout_for(request.context);
        let mut delay = self.retry.base_delay;
        let mut attempt = 0usize;
        loop {
            let response = self
                .client
                .post(&url)
                .timeout(timeout)
                .json(&body)
                .send()
                .await
                .map_err(|err| TranslateFailure::Http(err.to_string()))?;
            let status = response.status();
            let headers = response.headers().clone();
            let text = response
                .text()
                .await
                .map_err(|err| TranslateFailure::Http(err.to_string()))?;
            if status.is_success() {
                let parsed: ChatResponse = serde_json::from_str(&text)
                    .map_err(|err| TranslateFailure::Parse(err.to_string()))?;
                return Ok(parsed.message.content);
            }
            if is_retryable(status, &text) && attempt < self.retry.max_retries {
                attempt += 1;
                delay = wait_with_backoff(
                    "ollama",
                    self.retry,
                    attempt,
                    delay,
                    retry_after(&headers),
                )
                .await;
                continue;
            }
            warn!("ollama: {} {}", status, text.trim());
            return Err(TranslateFailure::Status(status.as_u16()));
        }
    }

    async fn translate_text(&self, text: String, request: TranslateRequest) -> TranslationOutcome {
        let system = match translations::render_system_prompt(&request) {
            Ok(prompt) => prompt,
            Err(err) => return TranslationOutcome::Failed(TranslateFailure::Parse(err.to_string())),
        };
        match self.chat(&request, system, text).await {
            Ok(reply) => TranslationOutcome::from_backend_text(translations::clean_response(&reply)),
            Err(failure) => TranslationOutcome::Failed(failure),
        }
    }

    async fn translate_texts(
        &self,
        texts: Vec<String>,
        request: TranslateRequest,
    ) -> Result<Vec<TranslationOutcome>, TranslateFailure> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let system = translations::render_batch_prompt(&request, texts.len())
            .map_err(|err| TranslateFailure::Parse(err.to_string()))?;
        let user =
            serde_json::to_string(&texts).map_err(|err| TranslateFailure::Parse(err.to_string()))?;
        let reply = self.chat(&request, system, user).await?;
        if let Some(items) = translations::parse_batch_response(&reply) {
            debug!("ollama: batch of {} answered with {}", texts.len(), items.len());
            return Ok(items
                .into_iter()
                .map(TranslationOutcome::from_backend_text)
                .collect());
        }
        warn!("ollama: batch reply was not a JSON array; translating one by one");
        self.translate_each(texts, request).await
    }

    async fn translate_each(
        &self,
        texts: Vec<String>,
        request: TranslateRequest,
    ) -> Result<Vec<TranslationOutcome>, TranslateFailure> {
        let mut outcomes = Vec::with_capacity(texts.len());
        for text in texts {
            if request.cancel.is_cancelled() {
                debug!("ollama: stopped after {} single translations", outcomes.len());
                return Err(TranslateFailure::Cancelled);
            }
            outcomes.push(self.translate_text(text, request.clone()).await);
        }
        Ok(outcomes)
    }
}

impl TranslationBackend for Ollama {
    fn name(&self) -> &str {
        "ollama"
    }

    fn translate_one(&self, text: String, request: TranslateRequest) -> BackendFuture<TranslationOutcome> {
        let this = self.clone();
        async move { this.translate_text(text, request).await }.boxed()
    }

    fn translate_batch(
        &self,
        texts: Vec<String>,
        request: TranslateRequest,
    ) -> BackendFuture<Result<Vec<TranslationOutcome>, TranslateFailure>> {
        let this = self.clone();
        async move { this.translate_texts(texts, request).await }.boxed()
    }
}

pub async fn list_models(base_url: &str) -> Result<Vec<String>> {
    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));
    let response = reqwest::get(&url)
        .await
        .with_context(|| format!("failed to reach {}", url))?;
    let status = response.status();
    if !status.is_success() {
        return Err(anyhow!("{} returned {}", url, status));
    }
    let tags: TagsResponse = response
        .json()
        .await
        .with_context(|| "failed to parse model list")?;
    Ok(tags.models.into_iter().map(|entry| entry.name).collect())
}
