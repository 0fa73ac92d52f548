use std::path::{Path, PathBuf};

const TRANSLATED_SUFFIX: &str = "_translated";
const STOPPED_SUFFIX: &str = "_stopped";

pub fn sanitize_lang(lang: &str) -> String {
    let out: String = lang
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if out.is_empty() { "lang".to_string() } else { out }
}

/// `<stem>_<lang>_translated[_stopped].pptx`
pub fn output_path(input: &Path, target_lang: &str, stopped: bool, out_dir: Option<&Path>) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|value| value.to_str())
        .filter(|value| !value.is_empty())
        .unwrap_or("presentation");
    let mut name = format!("{}_{}{}", stem, sanitize_lang(target_lang), TRANSLATED_SUFFIX);
    if stopped {
        name.push_str(STOPPED_SUFFIX);
    }
    name.push_str(".pptx");

    let dir = out_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(name)
}
