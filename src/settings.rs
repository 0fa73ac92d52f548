use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classify::ClassifierThresholds;
use crate::paths;
use crate::style::OverflowTemplate;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub backend_url: String,
    pub model: String,
    pub timeout: Duration,
    pub ocr_timeout: Duration,
    pub max_retries: usize,
    pub thresholds: ClassifierThresholds,
    pub overflow_template: OverflowTemplate,
    pub ocr_enabled: bool,
    pub ocr_languages: String,
    pub ocr_min_confidence: f32,
    pub ocr_font_path: Option<String>,
    pub ocr_fonts: HashMap<String, String>,
    pub history_enabled: bool,
    pub history_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:11434".to_string(),
            model: "gemma3:12b".to_string(),
            timeout: Duration::from_secs(120),
            ocr_timeout: Duration::from_secs(300),
            max_retries: 3,
            thresholds: ClassifierThresholds::default(),
            overflow_template: OverflowTemplate::Last,
            ocr_enabled: true,
            ocr_languages: "eng".to_string(),
            ocr_min_confidence: 0.5,
            ocr_font_path: None,
            ocr_fonts: HashMap::new(),
            history_enabled: true,
            history_limit: 50,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    backend: Option<BackendSettings>,
    classifier: Option<ClassifierSettings>,
    layout: Option<LayoutSettings>,
    ocr: Option<OcrSettings>,
    history: Option<HistorySettings>,
}

#[derive(Debug, Default, Deserialize)]
struct BackendSettings {
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    ocr_timeout_secs: Option<u64>,
    max_retries: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ClassifierSettings {
    text_threshold: Option<f32>,
    ocr_threshold: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct LayoutSettings {
    overflow_template: Option<OverflowTemplate>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrSettings {
    enabled: Option<bool>,
    languages: Option<String>,
    min_confidence: Option<f32>,
    font_path: Option<String>,
    fonts: Option<HashMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
struct HistorySettings {
    enabled: Option<bool>,
    limit: Option<usize>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    let defaults: SettingsFile =
        toml::from_str(DEFAULT_SETTINGS_TOML).with_context(|| "failed to parse built-in settings")?;
    settings.merge(defaults);
    ensure_home_settings_file()?;

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(home) = paths::base_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }
    Ok(settings)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(backend) = incoming.backend {
            if let Some(url) = non_empty(backend.base_url) {
                self.backend_url = url;
            }
            if let Some(model) = non_empty(backend.model) {
                self.model = model;
            }
            if let Some(secs) = backend.timeout_secs.filter(|s| *s > 0) {
                self.timeout = Duration::from_secs(secs);
            }
            if let Some(secs) = backend.ocr_timeout_secs.filter(|s| *s > 0) {
                self.ocr_timeout = Duration::from_secs(secs);
            }
            if let Some(retries) = backend.max_retries {
                self.max_retries = retries;
            }
        }
        if let Some(classifier) = incoming.classifier {
            if let Some(value) = classifier.text_threshold.filter(|v| (0.0..=1.0).contains(v)) {
                self.thresholds.text = value;
            }
            if let Some(value) = classifier.ocr_threshold.filter(|v| (0.0..=1.0).contains(v)) {
                self.thresholds.ocr = value;
            }
        }
        if let Some(policy) = incoming.layout.and_then(|layout| layout.overflow_template) {
            self.overflow_template = policy;
        }
        if let Some(ocr) = incoming.ocr {
            if let Some(enabled) = ocr.enabled {
                self.ocr_enabled = enabled;
            }
            if let Some(languages) = non_empty(ocr.languages) {
                self.ocr_languages = languages;
            }
            if let Some(value) = ocr.min_confidence.filter(|v| (0.0..=1.0).contains(v)) {
                self.ocr_min_confidence = value;
            }
            if let Some(path) = ocr.font_path {
                self.ocr_font_path = non_empty(Some(path));
            }
            if let Some(fonts) = ocr.fonts {
                for (lang, family) in fonts {
                    if !family.trim().is_empty() {
                        self.ocr_fonts.insert(lang.to_lowercase(), family);
                    }
                }
            }
        }
        if let Some(history) = incoming.history {
            if let Some(enabled) = history.enabled {
                self.history_enabled = enabled;
            }
            if let Some(limit) = history.limit.filter(|l| *l > 0) {
                self.history_limit = limit;
            }
        }
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = paths::base_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}
