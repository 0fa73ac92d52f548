use tracing::debug;

use crate::cancel::CancelToken;
use crate::providers::{
    TextContext, TranslateFailure, TranslateRequest, TranslationBackend, TranslationOutcome,
};

#[derive(Debug, Clone)]
pub struct TranslateOptions {
    pub source_lang: String,
    pub target_lang: String,
    pub model: String,
}

impl TranslateOptions {
    fn request(&self, context: TextContext, cancel: &CancelToken) -> TranslateRequest {
        TranslateRequest {
            source_lang: self.source_lang.clone(),
            target_lang: self.target_lang.clone(),
            model: self.model.clone(),
            context,
            cancel: cancel.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Translator<B: TranslationBackend> {
    backend: B,
    options: TranslateOptions,
    cancel: CancelToken,
}

impl<B: TranslationBackend> Translator<B> {
    pub fn new(backend: B, options: TranslateOptions, cancel: CancelToken) -> Self {
        Self {
            backend,
            options,
            cancel,
        }
    }

    pub fn options(&self) -> &TranslateOptions {
        &self.options
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn translate(&self, text: &str, context: TextContext) -> TranslationOutcome {
        if self.cancel.is_cancelled() {
            return TranslationOutcome::Failed(TranslateFailure::Cancelled);
        }
        let outcome = self
            .backend
            .translate_one(text.to_string(), self.options.request(context, &self.cancel))
            .await;
        if let TranslationOutcome::Failed(failure) = &outcome {
            debug!("{}: translation failed: {}", self.backend.name(), failure);
        }
        outcome
    }

    pub async fn translate_batch(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<TranslationOutcome>, TranslateFailure> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if self.cancel.is_cancelled() {
            return Err(TranslateFailure::Cancelled);
        }
        self.backend
            .translate_batch(
                texts,
                self.options.request(TextContext::Document, &self.cancel),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::StubBackend;

    fn options() -> TranslateOptions {
        TranslateOptions {
            source_lang: "en".to_string(),
            target_lang: "ko".to_string(),
            model: "stub".to_string(),
        }
    }

    #[tokio::test]
    async fn cancelled_translator_makes_no_calls() {
        let backend = StubBackend::new().with("Hello", "안녕");
        let cancel = CancelToken::new();
        let translator = Translator::new(backend.clone(), options(), cancel.clone());
        assert_eq!(
            translator.translate("Hello", TextContext::Document).await,
            TranslationOutcome::Translated("안녕".to_string())
        );
        cancel.cancel();
        assert_eq!(
            translator.translate("Hello", TextContext::Document).await,
            TranslationOutcome::Failed(TranslateFailure::Cancelled)
        );
        assert_eq!(backend.single_calls(), 1);
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let backend = StubBackend::new();
        let translator = Translator::new(backend.clone(), options(), CancelToken::new());
        assert_eq!(translator.translate_batch(Vec::new()).await, Ok(Vec::new()));
        assert!(backend.batches().is_empty());
    }
}
