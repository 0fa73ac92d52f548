use anyhow::{Context, Result, anyhow};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub mod cancel;
pub mod chart;
pub mod classify;
pub mod history;
pub mod logging;
pub mod ocr;
pub mod ooxml;
pub mod output;
mod paths;
pub mod pipeline;
pub mod providers;
pub mod settings;
pub mod style;
pub mod translations;
pub mod translator;

#[cfg(test)]
mod test_util;

pub use cancel::CancelToken;
pub use classify::ClassifierThresholds;
pub use ocr::{FontBook, OcrEngine, TesseractEngine, TextFitter};
pub use ooxml::Presentation;
pub use pipeline::{DocumentWalker, PassSummary, PictureTools, ProgressEvent, UnitStatus};
pub use providers::{Ollama, TranslationBackend, TranslationOutcome};
pub use style::OverflowTemplate;
pub use translator::{TranslateOptions, Translator};

use history::{History, HistoryEntry, HistoryStatus};

#[derive(Debug, Clone)]
pub struct Config {
    pub input: Option<PathBuf>,
    pub target_lang: String,
    pub source_lang: String,
    pub model: Option<String>,
    pub backend_url: Option<String>,
    pub no_ocr: bool,
    pub no_charts: bool,
    pub output_dir: Option<PathBuf>,
    pub settings_path: Option<String>,
    pub show_history: bool,
    pub show_models: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    /// Cancelled; the partial result was saved under the `_stopped` name.
    Stopped,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartStatus {
    NotRun,
    Completed,
    Stopped,
    /// The walker output was saved without chart changes.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub status: RunStatus,
    pub output: Option<PathBuf>,
    pub processed: usize,
    pub translated: usize,
    pub images_rewritten: usize,
    pub chart_strings: usize,
    pub chart_status: ChartStatus,
}

impl RunReport {
    fn failed(reason: String) -> Self {
        Self {
            status: RunStatus::Failed { reason },
            output: None,
            processed: 0,
            translated: 0,
            images_rewritten: 0,
            chart_strings: 0,
            chart_status: ChartStatus::NotRun,
        }
    }
}

pub struct Job {
    pub input: PathBuf,
    pub output_dir: Option<PathBuf>,
    pub thresholds: ClassifierThresholds,
    pub overflow: OverflowTemplate,
    pub charts: bool,
    pub pictures: Option<PictureTools>,
    pub history: Option<History>,
}

impl Job {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output_dir: None,
            thresholds: ClassifierThresholds::default(),
            overflow: OverflowTemplate::default(),
            charts: true,
            pictures: None,
            history: None,
        }
    }

    /// Errors only when the task log cannot record the start of the pass.
    pub async fn run<B, F>(&self, translator: &Translator<B>, progress: F) -> Result<RunReport>
    where
        B: TranslationBackend,
        F: FnMut(ProgressEvent),
    {
        let target_lang = translator.options().target_lang.clone();
        let entry = match &self.history {
            Some(history) => Some(
                history
                    .start(&self.input, &target_lang)
                    .with_context(|| "failed to record task in history")?,
            ),
            None => None,
        };

        let report = match self.execute(translator, progress).await {
            Ok(report) => report,
            Err(err) => {
                warn!("{}: {:#}", self.input.display(), err);
                RunReport::failed(format!("{:#}", err))
            }
        };

        if let (Some(history), Some(entry)) = (&self.history, entry)
            && let Err(err) = history.finish(finished_entry(entry, &report))
        {
            warn!("failed to update history: {:#}", err);
        }
        Ok(report)
    }

    async fn execute<B, F>(&self, translator: &Translator<B>, progress: F) -> Result<RunReport>
    where
        B: TranslationBackend,
        F: FnMut(ProgressEvent),
    {
        let mut presentation = Presentation::open(&self.input)
            .with_context(|| format!("failed to open {}", self.input.display()))?;

        let mut walker = DocumentWalker::new(translator, self.thresholds).with_overflow_template(self.overflow);
        if let Some(tools) = &self.pictures {
            walker = walker.with_pictures(tools.clone());
        }
        let summary = walker.run(&mut presentation, progress).await;
        let mut bytes = presentation.to_bytes()?;
        let mut stopped = summary.stopped || translator.is_cancelled();

        let mut chart_strings = 0;
        let mut chart_status = ChartStatus::NotRun;
        if self.charts && !stopped {
            match chart::translate_chart_texts(&bytes, translator, &self.thresholds).await {
                Ok(pass) => {
                    chart_strings = pass.report.unique_strings;
                    if pass.report.stopped {
                        stopped = true;
                        chart_status = ChartStatus::Stopped;
                    } else {
                        chart_status = ChartStatus::Completed;
                    }
                    bytes = pass.bytes;
                }
                Err(err) => {
                    warn!("chart pass failed, saving without chart changes: {}", err);
                    chart_status = ChartStatus::Failed {
                        reason: err.to_string(),
                    };
                }
            }
        }

        let output = output::output_path(
            &self.input,
            &translator.options().target_lang,
            stopped,
            self.output_dir.as_deref(),
        );
        if let Some(dir) = output.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create output dir: {}", dir.display()))?;
        }
        std::fs::write(&output, &bytes)
            .with_context(|| format!("failed to write {}", output.display()))?;
        info!("saved {}", output.display());

        Ok(RunReport {
            status: if stopped {
                RunStatus::Stopped
            } else {
                RunStatus::Completed
            },
            output: Some(output),
            processed: summary.processed,
            translated: summary.translated,
            images_rewritten: summary.images_rewritten,
            chart_strings,
            chart_status,
        })
    }
}

fn finished_entry(mut entry: HistoryEntry, report: &RunReport) -> HistoryEntry {
    entry.status = match report.status {
        RunStatus::Completed => HistoryStatus::Completed,
        RunStatus::Stopped => HistoryStatus::Stopped,
        RunStatus::Failed { .. } => HistoryStatus::Failed,
    };
    entry.output = report
        .output
        .as_ref()
        .map(|path| path.to_string_lossy().to_string());
    entry.processed = report.processed;
    entry.translated = report.translated;
    entry.images_rewritten = report.images_rewritten;
    entry.chart_strings = report.chart_strings;
    entry
}

pub async fn run(config: Config, cancel: CancelToken) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path)?;
    let backend_url = config
        .backend_url
        .clone()
        .unwrap_or_else(|| settings.backend_url.clone());

    if config.show_history {
        let history = History::new(settings.history_limit);
        return Ok(history::format_entries(&history.entries()?));
    }
    if config.show_models {
        let models = providers::list_models(&backend_url).await?;
        return Ok(models.join("\n"));
    }

    let input = config
        .input
        .clone()
        .ok_or_else(|| anyhow!("no input presentation given"))?;
    if !input.is_file() {
        return Err(anyhow!("input not found: {}", input.display()));
    }
    let target_lang = config.target_lang.trim().to_string();
    if target_lang.is_empty() {
        return Err(anyhow!("target language is empty"));
    }

    let backend = Ollama::new(backend_url)
        .with_timeouts(settings.timeout, settings.ocr_timeout)
        .with_max_retries(settings.max_retries);
    let options = TranslateOptions {
        source_lang: config.source_lang.trim().to_string(),
        target_lang,
        model: config.model.clone().unwrap_or_else(|| settings.model.clone()),
    };
    let translator = Translator::new(backend, options, cancel);

    let pictures = if settings.ocr_enabled && !config.no_ocr {
        picture_tools(&settings)
    } else {
        None
    };

    let job = Job {
        input,
        output_dir: config.output_dir.clone(),
        thresholds: settings.thresholds,
        overflow: settings.overflow_template,
        charts: !config.no_charts,
        pictures,
        history: settings
            .history_enabled
            .then(|| History::new(settings.history_limit)),
    };
    let report = job.run(&translator, print_progress).await?;
    if let RunStatus::Failed { reason } = &report.status {
        return Err(anyhow!("translation failed: {}", reason));
    }
    Ok(format_report(&report))
}

fn picture_tools(settings: &settings::Settings) -> Option<PictureTools> {
    let engine = match TesseractEngine::locate(&settings.ocr_languages, settings.ocr_min_confidence) {
        Ok(engine) => engine,
        Err(err) => {
            warn!("OCR disabled: {:#}", err);
            return None;
        }
    };
    let families: HashMap<String, String> = settings.ocr_fonts.clone();
    let fonts = FontBook::new(families, settings.ocr_font_path.as_ref().map(PathBuf::from));
    Some(PictureTools {
        engine: Arc::new(engine),
        fitter: Arc::new(TextFitter::new(Arc::new(fonts))),
    })
}

fn print_progress(event: ProgressEvent) {
    eprintln!(
        "[{}/{}] slide {} {:?}: {:?}",
        event.processed,
        event.total,
        event.slide_index + 1,
        event.unit_kind,
        event.status
    );
}

pub fn format_report(report: &RunReport) -> String {
    let mut lines = Vec::new();
    let status = match &report.status {
        RunStatus::Completed => "completed".to_string(),
        RunStatus::Stopped => "stopped (partial output saved)".to_string(),
        RunStatus::Failed { reason } => format!("failed: {}", reason),
    };
    lines.push(format!("status: {}", status));
    if let Some(output) = &report.output {
        lines.push(format!("output: {}", output.display()));
    }
    lines.push(format!(
        "units: {} processed, {} translated",
        report.processed, report.translated
    ));
    lines.push(format!("images rewritten: {}", report.images_rewritten));
    let charts = match &report.chart_status {
        ChartStatus::NotRun => "not run".to_string(),
        ChartStatus::Completed => format!("{} string(s)", report.chart_strings),
        ChartStatus::Stopped => "stopped".to_string(),
        ChartStatus::Failed { reason } => format!("failed: {}", reason),
    };
    lines.push(format!("charts: {}", charts));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{StubBackend, sample_deck};
    use tempfile::tempdir;

    fn translator(backend: StubBackend) -> Translator<StubBackend> {
        let options = TranslateOptions {
            source_lang: "en".to_string(),
            target_lang: "ko".to_string(),
            model: "stub".to_string(),
        };
        Translator::new(backend, options, CancelToken::new())
    }

    #[tokio::test]
    async fn job_saves_translated_copy_and_records_history() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("deck.pptx");
        std::fs::write(&input, sample_deck()).expect("write deck");
        let history = History::at(dir.path().join("history.json"), 5);

        let mut job = Job::new(&input);
        job.history = Some(history.clone());
        let report = job
            .run(&translator(StubBackend::new().with_prefix("KO:")), |_| {})
            .await
            .expect("run");

        assert_eq!(report.status, RunStatus::Completed);
        let output = report.output.clone().expect("output");
        assert_eq!(output, dir.path().join("deck_ko_translated.pptx"));
        assert!(output.exists());
        assert_eq!(report.chart_status, ChartStatus::Completed);
        assert_eq!(report.chart_strings, 0);

        let entries = history.entries().expect("entries");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, HistoryStatus::Completed);
        assert_eq!(entries[0].translated, report.translated);
    }

    #[tokio::test]
    async fn unreadable_input_reports_failure_without_output() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("broken.pptx");
        std::fs::write(&input, b"not a zip").expect("write");
        let history = History::at(dir.path().join("history.json"), 5);

        let mut job = Job::new(&input);
        job.history = Some(history.clone());
        let report = job.run(&translator(StubBackend::new()), |_| {}).await.expect("run");

        assert!(matches!(report.status, RunStatus::Failed { .. }));
        assert!(report.output.is_none());
        assert_eq!(history.entries().expect("entries")[0].status, HistoryStatus::Failed);
    }

    #[tokio::test]
    async fn history_start_failure_aborts_before_any_work() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("deck.pptx");
        std::fs::write(&input, sample_deck()).expect("write deck");
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").expect("write");
        let backend = StubBackend::new();

        let mut job = Job::new(&input);
        job.history = Some(History::at(blocker.join("history.json"), 5));
        assert!(job.run(&translator(backend.clone()), |_| {}).await.is_err());
        assert_eq!(backend.single_calls(), 0);
        assert!(!dir.path().join("deck_ko_translated.pptx").exists());
    }

    #[test]
    fn formats_stopped_report() {
        let report = RunReport {
            status: RunStatus::Stopped,
            output: Some(PathBuf::from("deck_ko_translated_stopped.pptx")),
            processed: 2,
            translated: 1,
            images_rewritten: 0,
            chart_strings: 0,
            chart_status: ChartStatus::NotRun,
        };
        insta::assert_snapshot!(format_report(&report), @r"
        status: stopped (partial output saved)
        output: deck_ko_translated_stopped.pptx
        units: 2 processed, 1 translated
        images rewritten: 0
        charts: not run
        ");
    }
}
