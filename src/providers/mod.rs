use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::cancel::CancelToken;

mod ollama;
pub(crate) mod retry;

pub use ollama::{Ollama, list_models};

/// Legacy in-band failure text some backends still return as a "translation".
pub const ERROR_MARKER: &str = "[Translation Error]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextContext {
    Document,
    Ocr,
}

#[derive(Debug, Clone)]
pub struct TranslateRequest {
    pub source_lang: String,
    pub target_lang: String,
    pub model: String,
    pub context: TextContext,
    pub cancel: CancelToken,
}

impl TranslateRequest {
    pub fn with_context(&self, context: TextContext) -> Self {
        Self {
            context,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateFailure {
    #[error("request failed: {0}")]
    Http(String),
    #[error("backend returned status {0}")]
    Status(u16),
    #[error("unreadable backend reply: {0}")]
    Parse(String),
    #[error("backend returned an empty translation")]
    Empty,
    #[error("cancelled")]
    Cancelled,
    #[error("backend reported a translation error")]
    Marker,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationOutcome {
    Translated(String),
    Failed(TranslateFailure),
}

impl TranslationOutcome {
    pub fn from_backend_text(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.contains(ERROR_MARKER) {
            return Self::Failed(TranslateFailure::Marker);
        }
        if text.trim().is_empty() {
            return Self::Failed(TranslateFailure::Empty);
        }
        Self::Translated(text)
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Translated(text) if !text.trim().is_empty())
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Translated(text) => Some(text),
            Self::Failed(_) => None,
        }
    }
}

pub type BackendFuture<T> = BoxFuture<'static, T>;

/// `translate_batch` answers with one outcome per input.
pub trait TranslationBackend: Send + Sync {
    fn name(&self) -> &str;

    fn translate_one(&self, text: String, request: TranslateRequest) -> BackendFuture<TranslationOutcome>;

    fn translate_batch(
        &self,
        texts: Vec<String>,
        request: TranslateRequest,
    ) -> BackendFuture<Result<Vec<TranslationOutcome>, TranslateFailure>>;
}
