use anyhow::{Context, Result};
use tera::{Context as TeraContext, Tera};

use crate::providers::{TextContext, TranslateRequest};

const SYSTEM_PROMPT: &str = include_str!("prompts/system_prompt.tera");
const BATCH_PROMPT: &str = include_str!("prompts/batch_prompt.tera");

fn base_context(request: &TranslateRequest) -> TeraContext {
    let mut context = TeraContext::new();
    let source = request.source_lang.trim();
    let source = if source.eq_ignore_ascii_case("auto") { "" } else { source };
    context.insert("source_lang", source);
    context.insert("target_lang", request.target_lang.trim());
    context.insert("ocr", &(request.context == TextContext::Ocr));
    context
}

pub fn render_system_prompt(request: &TranslateRequest) -> Result<String> {
    let context = base_context(request);
    Tera::one_off(SYSTEM_PROMPT, &context, false).with_context(|| "failed to render system prompt")
}

pub fn render_batch_prompt(request: &TranslateRequest, count: usize) -> Result<String> {
    let mut context = base_context(request);
    context.insert("count", &count);
    Tera::one_off(BATCH_PROMPT, &context, false).with_context(|| "failed to render batch prompt")
}

pub fn clean_response(text: &str) -> String {
    let mut out = strip_fence(text.trim()).trim();
    for (open, close) in [('"', '"'), ('“', '”'), ('「', '」')] {
        if out.chars().count() >= 2 && out.starts_with(open) && out.ends_with(close) {
            let inner = &out[open.len_utf8()..out.len() - close.len_utf8()];
            if !inner.contains(open) && !inner.contains(close) {
                out = inner;
            }
        }
    }
    out.to_string()
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return text;
    };
    // drop an info string such as ```json
    match body.split_once('\n') {
        Some((first, tail)) if !first.trim().contains(' ') => tail,
        _ => body,
    }
}

/// A wrong-length array is returned as is.
pub fn parse_batch_response(text: &str) -> Option<Vec<String>> {
    let body = strip_fence(text.trim()).trim();
    let start = body.find('[')?;
    let end = body.rfind(']')?;
    if end < start {
        return None;
    }
    let values: Vec<serde_json::Value> = serde_json::from_str(&body[start..=end]).ok()?;
    Some(
        values
            .into_iter()
            .map(|value| match value {
                serde_json::Value::String(text) => text,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(context: TextContext) -> TranslateRequest {
        TranslateRequest {
            source_lang: "en".to_string(),
            target_lang: "ko".to_string(),
            model: "gemma3:12b".to_string(),
            context,
            cancel: crate::cancel::CancelToken::new(),
        }
    }

    #[test]
    fn prompts_mention_languages_and_ocr_hint() {
        let document = render_system_prompt(&request(TextContext::Document)).expect("render");
        assert!(document.contains("from en into ko"));
        assert!(!document.contains("recognised from an image"));
        let ocr = render_system_prompt(&request(TextContext::Ocr)).expect("render");
        assert!(ocr.contains("recognised from an image"));
        let batch = render_batch_prompt(&request(TextContext::Document), 3).expect("render");
        assert!(batch.contains("exactly 3 strings"));
    }

    #[test]
    fn auto_source_is_omitted() {
        let mut req = request(TextContext::Document);
        req.source_lang = "auto".to_string();
        let prompt = render_system_prompt(&req).expect("render");
        assert!(prompt.contains("text into ko"));
    }

    #[test]
    fn cleans_fences_and_quotes() {
        assert_eq!(clean_response("\"안녕 세상\""), "안녕 세상");
        assert_eq!(clean_response("```\n안녕\n세상\n```"), "안녕\n세상");
        assert_eq!(clean_response("  plain  "), "plain");
        assert_eq!(clean_response("\"a\" and \"b\""), "\"a\" and \"b\"");
    }

    #[test]
    fn parses_batch_arrays() {
        assert_eq!(
            parse_batch_response("```json\n[\"가\", \"나\"]\n```"),
            Some(vec!["가".to_string(), "나".to_string()])
        );
        assert_eq!(parse_batch_response("Sure! [\"x\"]"), Some(vec!["x".to_string()]));
        assert_eq!(parse_batch_response("no array here"), None);
    }
}
