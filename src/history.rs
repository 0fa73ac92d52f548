use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use time::{OffsetDateTime, format_description};

use crate::paths;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    Running,
    Completed,
    Stopped,
    Failed,
}

impl HistoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub input: String,
    #[serde(default)]
    pub output: Option<String>,
    pub target_lang: String,
    pub status: HistoryStatus,
    #[serde(default)]
    pub processed: usize,
    #[serde(default)]
    pub translated: usize,
    #[serde(default)]
    pub images_rewritten: usize,
    #[serde(default)]
    pub chart_strings: usize,
    pub started_at: u64,
    #[serde(default)]
    pub finished_at: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct HistoryFile {
    entries: Vec<HistoryEntry>,
}

#[derive(Debug, Clone)]
pub struct History {
    path: PathBuf,
    limit: usize,
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self::at(paths::history_path(), limit)
    }

    pub fn at(path: PathBuf, limit: usize) -> Self {
        Self {
            path,
            limit: limit.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn start(&self, input: &Path, target_lang: &str) -> Result<HistoryEntry> {
        let now = now_unix();
        let id_seed = format!("{}:{}", now, input.display());
        let entry = HistoryEntry {
            id: format!("{:x}", md5::compute(id_seed.as_bytes())),
            input: input.to_string_lossy().to_string(),
            output: None,
            target_lang: target_lang.to_string(),
            status: HistoryStatus::Running,
            processed: 0,
            translated: 0,
            images_rewritten: 0,
            chart_strings: 0,
            started_at: now,
            finished_at: None,
        };
        let mut file = self.read()?;
        file.entries.push(entry.clone());
        self.prune(&mut file);
        self.write(&file)?;
        Ok(entry)
    }

    pub fn finish(&self, mut entry: HistoryEntry) -> Result<()> {
        entry.finished_at = Some(now_unix());
        let mut file = self.read()?;
        match file.entries.iter_mut().find(|item| item.id == entry.id) {
            Some(slot) => *slot = entry,
            None => file.entries.push(entry),
        }
        self.prune(&mut file);
        self.write(&file)
    }

    pub fn entries(&self) -> Result<Vec<HistoryEntry>> {
        Ok(self.read()?.entries)
    }

    fn prune(&self, file: &mut HistoryFile) {
        if file.entries.len() > self.limit {
            let excess = file.entries.len() - self.limit;
            file.entries.drain(..excess);
        }
    }

    fn read(&self) -> Result<HistoryFile> {
        if !self.path.exists() {
            return Ok(HistoryFile::default());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read history: {}", self.path.display()))?;
        let file = serde_json::from_str(&content).with_context(|| "failed to parse history")?;
        Ok(file)
    }

    fn write(&self, file: &HistoryFile) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create history dir: {}", dir.display()))?;
        }
        let content = serde_json::to_string_pretty(file)?;
        fs::write(&self.path, content)
            .with_context(|| format!("failed to write history: {}", self.path.display()))?;
        Ok(())
    }
}

pub fn format_entries(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return "no history".to_string();
    }
    entries
        .iter()
        .rev()
        .map(|entry| {
            format!(
                "{}\t{}\t{}\t{} -> {}\t{}/{} translated, {} image(s), {} chart string(s)",
                format_timestamp(entry.started_at),
                entry.status.as_str(),
                entry.target_lang,
                entry.input,
                entry.output.as_deref().unwrap_or("-"),
                entry.translated,
                entry.processed,
                entry.images_rewritten,
                entry.chart_strings
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_timestamp(secs: u64) -> String {
    let Ok(dt) = OffsetDateTime::from_unix_timestamp(secs as i64) else {
        return "unknown".to_string();
    };
    let format = format_description::parse("[year]-[month]-[day] [hour]:[minute]");
    if let Ok(format) = format
        && let Ok(rendered) = dt.format(&format)
    {
        return rendered;
    }
    dt.date().to_string()
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
