pub mod dialect;

use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::classify::ClassifierThresholds;
use crate::ooxml::{Package, XmlDocument};
use crate::providers::{TranslateFailure, TranslationBackend};
use crate::translator::Translator;

pub use dialect::{ChartDialect, ExtendedChart, StandardChart};

#[derive(Debug, Error)]
pub enum ChartPassError {
    #[error("chart batch returned {actual} translations for {expected} strings")]
    BatchLengthMismatch { expected: usize, actual: usize },
    #[error("chart batch failed: {0}")]
    Backend(TranslateFailure),
    #[error("chart archive error: {0}")]
    Archive(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChartPassReport {
    pub chart_parts: usize,
    pub skipped_parts: usize,
    pub unique_strings: usize,
    pub replaced_nodes: usize,
    pub stopped: bool,
}

/// `bytes` is the input unchanged when nothing was replaced.
#[derive(Debug)]
pub struct ChartPassOutput {
    pub bytes: Vec<u8>,
    pub report: ChartPassReport,
}

pub fn chart_part_names(package: &Package) -> Vec<String> {
    let mut names: Vec<String> = package
        .part_names()
        .filter(|name| {
            name.ends_with(".xml")
                && !name.contains("/_rels/")
                && name
                    .rsplit('/')
                    .next()
                    .map(|file| file.starts_with("chart"))
                    .unwrap_or(false)
                && name.contains("/charts/")
        })
        .map(str::to_string)
        .collect();
    names.sort();
    names
}

/// Ordered set of unique trimmed strings; the order fixes batch indexes.
#[derive(Debug, Default)]
struct StringSet {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl StringSet {
    fn insert(&mut self, key: &str) {
        if self.seen.insert(key.to_string()) {
            self.order.push(key.to_string());
        }
    }
}

pub async fn translate_chart_texts<B: TranslationBackend>(
    archive: &[u8],
    translator: &Translator<B>,
    thresholds: &ClassifierThresholds,
) -> Result<ChartPassOutput, ChartPassError> {
    let mut package = Package::from_bytes(archive)?;
    let parts = chart_part_names(&package);
    let mut report = ChartPassReport {
        chart_parts: parts.len(),
        ..ChartPassReport::default()
    };
    let unchanged = |report: ChartPassReport| ChartPassOutput {
        bytes: archive.to_vec(),
        report,
    };
    if parts.is_empty() {
        return Ok(unchanged(report));
    }

    // collect
    let mut strings = StringSet::default();
    let mut usable_parts = Vec::new();
    for name in &parts {
        if translator.is_cancelled() {
            report.stopped = true;
            return Ok(unchanged(report));
        }
        let Some(doc) = parse_chart(&package, name) else {
            report.skipped_parts += 1;
            continue;
        };
        let Some(dialect) = dialect::detect(&doc) else {
            debug!("chart: {} uses an unknown schema", name);
            report.skipped_parts += 1;
            continue;
        };
        for node in dialect.text_nodes(&doc) {
            let text = doc.text_content(node);
            let key = text.trim();
            if !thresholds.should_skip(key) {
                strings.insert(key);
            }
        }
        usable_parts.push(name.clone());
    }
    report.unique_strings = strings.order.len();
    if strings.order.is_empty() {
        return Ok(unchanged(report));
    }

    // batch translate
    if translator.is_cancelled() {
        report.stopped = true;
        return Ok(unchanged(report));
    }
    info!("chart: translating {} unique strings", strings.order.len());
    let expected = strings.order.len();
    let outcomes = match translator.translate_batch(strings.order.clone()).await {
        Ok(outcomes) => outcomes,
        Err(TranslateFailure::Cancelled) => {
            report.stopped = true;
            return Ok(unchanged(report));
        }
        Err(failure) => return Err(ChartPassError::Backend(failure)),
    };
    if outcomes.len() != expected {
        return Err(ChartPassError::BatchLengthMismatch {
            expected,
            actual: outcomes.len(),
        });
    }
    let map: HashMap<String, String> = strings
        .order
        .into_iter()
        .zip(outcomes)
        .filter_map(|(source, outcome)| {
            let translated = outcome.text()?.trim().to_string();
            if !outcome.is_usable() || translated == source {
                return None;
            }
            Some((source, translated))
        })
        .collect();

    // apply
    let mut touched = Vec::new();
    for name in &usable_parts {
        if translator.is_cancelled() {
            report.stopped = true;
            return Ok(unchanged(report));
        }
        let Some(mut doc) = parse_chart(&package, name) else {
            continue;
        };
        let Some(dialect) = dialect::detect(&doc) else {
            continue;
        };
        let replaced = apply_translations(&mut doc, dialect.as_ref(), &map);
        if replaced == 0 {
            continue;
        }
        report.replaced_nodes += replaced;
        touched.push((name.clone(), doc.to_bytes()?));
    }
    if touched.is_empty() {
        return Ok(unchanged(report));
    }

    // repack
    for (name, bytes) in touched {
        package.set_part(&name, bytes);
    }
    Ok(ChartPassOutput {
        bytes: package.to_bytes()?,
        report,
    })
}

fn parse_chart(package: &Package, name: &str) -> Option<XmlDocument> {
    let data = package.part(name)?;
    match XmlDocument::parse(data) {
        Ok(doc) => Some(doc),
        Err(err) => {
            warn!("chart: skipping unparsable part {}: {}", name, err);
            None
        }
    }
}

fn apply_translations(
    doc: &mut XmlDocument,
    dialect: &dyn ChartDialect,
    map: &HashMap<String, String>,
) -> usize {
    let mut replaced = 0;
    for node in dialect.text_nodes(doc) {
        let text = doc.text_content(node);
        let key = text.trim();
        let Some(translated) = map.get(key) else {
            continue;
        };
        let start = text.len() - text.trim_start().len();
        let end = text.trim_end().len();
        let updated = format!("{}{}{}", &text[..start], translated, &text[end..]);
        if updated != text {
            doc.set_text(node, &updated);
            replaced += 1;
        }
    }
    replaced
}
