use anyhow::{Context, Result, anyhow};
use image::DynamicImage;
use std::collections::BTreeMap;
use std::io::Write;
use std::process::Command;
use tracing::{debug, warn};

use super::{OcrDetection, OcrEngine};

/// Sparse text: slide pictures rarely hold a single uniform block.
const PAGE_SEGMENTATION: u32 = 11;
const MIN_CONTRAST: u8 = 48;
const MIN_TEXT_PX: u32 = 8;

#[derive(Debug, Clone)]
pub struct TesseractEngine {
    languages: String,
    min_confidence: f32,
}

impl TesseractEngine {
    pub fn locate(languages: &str, min_confidence: f32) -> Result<Self> {
        let available = list_tesseract_languages()?;
        let languages = choose_languages(languages, &available)?;
        debug!("tesseract: using languages {}", languages);
        Ok(Self {
            languages,
            min_confidence: min_confidence.clamp(0.0, 1.0),
        })
    }

    pub fn languages(&self) -> &str {
        &self.languages
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn detect(&self, image: &DynamicImage) -> Result<Vec<OcrDetection>> {
        let mut tmp = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .with_context(|| "failed to create temp file for OCR")?;
        image
            .write_to(&mut tmp, image::ImageFormat::Png)
            .with_context(|| "failed to write temp image for OCR")?;
        tmp.flush().ok();

        let tsv = run_tesseract_tsv(tmp.path(), &self.languages, PAGE_SEGMENTATION)?;
        let detections: Vec<OcrDetection> = parse_tsv_lines(&tsv)
            .into_iter()
            .filter(|detection| detection.confidence >= self.min_confidence)
            .collect();
        debug!("tesseract: {} line(s) above confidence", detections.len());
        Ok(detections)
    }

    fn has_text(&self, image_bytes: &[u8]) -> bool {
        let image = match image::load_from_memory(image_bytes) {
            Ok(image) => image,
            Err(err) => {
                debug!("tesseract: undecodable image: {}", err);
                return false;
            }
        };
        has_luminance_contrast(&image)
    }
}

fn has_luminance_contrast(image: &DynamicImage) -> bool {
    let gray = image.to_luma8();
    let (width, height) = gray.dimensions();
    if width < MIN_TEXT_PX || height < MIN_TEXT_PX {
        return false;
    }
    let stride = ((width as u64 * height as u64) / 4096).max(1) as usize;
    let (mut lo, mut hi) = (u8::MAX, u8::MIN);
    for pixel in gray.as_raw().iter().step_by(stride) {
        lo = lo.min(*pixel);
        hi = hi.max(*pixel);
    }
    hi.saturating_sub(lo) >= MIN_CONTRAST
}

pub fn list_tesseract_languages() -> Result<Vec<String>> {
    let output = Command::new("tesseract")
        .arg("--list-langs")
        .output()
        .with_context(|| "failed to run tesseract --list-langs (is it installed?)")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract --list-langs failed: {}", stderr.trim()));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect())
}

fn choose_languages(requested: &str, available: &[String]) -> Result<String> {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("ocr languages is empty"));
    }
    if available.is_empty() {
        return Ok(trimmed.to_string());
    }
    let mut chosen = Vec::new();
    let mut missing = Vec::new();
    for raw in trimmed.split(['+', ',', ' ']) {
        let lang = raw.trim();
        if lang.is_empty() {
            continue;
        }
        if available.iter().any(|value| value == lang) {
            chosen.push(lang.to_string());
        } else {
            missing.push(lang.to_string());
        }
    }
    if chosen.is_empty() {
        return Err(anyhow!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        ));
    }
    if !missing.is_empty() {
        warn!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        );
    }
    Ok(chosen.join("+"))
}

fn run_tesseract_tsv(path: &std::path::Path, languages: &str, psm: u32) -> Result<String> {
    let output = Command::new("tesseract")
        .arg(path)
        .arg("stdout")
        .arg("-l")
        .arg(languages)
        .arg("--oem")
        .arg("1")
        .arg("--psm")
        .arg(psm.to_string())
        .arg("tsv")
        .output()
        .with_context(|| "failed to run tesseract (is it installed?)")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract failed: {}", stderr.trim()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

struct Word {
    text: String,
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
    conf: f32,
}

fn parse_tsv_lines(tsv: &str) -> Vec<OcrDetection> {
    let mut lines: BTreeMap<(i32, i32, i32, i32), Vec<Word>> = BTreeMap::new();
    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }
        if cols[0].parse::<i32>().unwrap_or(0) != 5 {
            continue;
        }
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || conf < 0.0 {
            continue;
        }
        let number = |idx: usize| cols[idx].parse::<f32>().unwrap_or(0.0);
        let key = (
            cols[1].parse().unwrap_or(0),
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        let (left, top) = (number(6), number(7));
        lines.entry(key).or_default().push(Word {
            text: text.to_string(),
            left,
            top,
            right: left + number(8),
            bottom: top + number(9),
            conf,
        });
    }
    lines.into_values().filter_map(build_line).collect()
}

fn build_line(mut words: Vec<Word>) -> Option<OcrDetection> {
    words.sort_by(|a, b| a.left.total_cmp(&b.left));
    let mut text = String::new();
    let mut previous: Option<&str> = None;
    for word in &words {
        if let Some(last) = previous
            && needs_space(last, &word.text)
        {
            text.push(' ');
        }
        text.push_str(&word.text);
        previous = Some(word.text.as_str());
    }
    let text = text.trim().to_string();
    if text.is_empty() {
        return None;
    }

    let left = words.iter().map(|w| w.left).fold(f32::MAX, f32::min);
    let top = words.iter().map(|w| w.top).fold(f32::MAX, f32::min);
    let right = words.iter().map(|w| w.right).fold(f32::MIN, f32::max);
    let bottom = words.iter().map(|w| w.bottom).fold(f32::MIN, f32::max);

    let mut weighted = 0.0;
    let mut total = 0.0;
    for word in &words {
        let weight = word.text.chars().count().max(1) as f32;
        weighted += word.conf * weight;
        total += weight;
    }
    let confidence = if total > 0.0 { weighted / total / 100.0 } else { 0.0 };

    Some(OcrDetection {
        quad: [[left, top], [right, top], [right, bottom], [left, bottom]],
        text,
        confidence: confidence.clamp(0.0, 1.0),
        angle: None,
    })
}

fn needs_space(left: &str, right: &str) -> bool {
    let last = left.chars().rev().find(|ch| !ch.is_whitespace());
    let first = right.chars().find(|ch| !ch.is_whitespace());
    match (last, first) {
        (Some(a), Some(b)) => {
            (a.is_ascii_alphanumeric() && b.is_ascii_alphanumeric())
                || (a.is_alphabetic() && b.is_alphabetic() && (a.is_ascii() || b.is_ascii()))
                || (matches!(a, ',' | '.' | ';' | ':' | '!' | '?') && b.is_alphanumeric())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t
4\t1\t1\t1\t1\t0\t10\t20\t200\t30\t-1\t
5\t1\t1\t1\t1\t1\t10\t20\t80\t30\t96.5\tSales
5\t1\t1\t1\t1\t2\t100\t22\t110\t28\t90.0\tgrowth,
5\t1\t1\t1\t1\t3\t215\t21\t60\t29\t93\t2024
5\t1\t2\t1\t1\t1\t40\t300\t30\t20\t-1\t
5\t1\t2\t1\t1\t2\t80\t300\t60\t24\t45\t東京
";

    #[test]
    fn groups_words_into_lines_with_normalized_confidence() {
        let lines = parse_tsv_lines(TSV);
        assert_eq!(lines.len(), 2);

        let first = &lines[0];
        assert_eq!(first.text, "Sales growth, 2024");
        assert_eq!(first.quad[0], [10.0, 20.0]);
        assert_eq!(first.quad[2], [275.0, 50.0]);
        assert!(first.confidence > 0.9 && first.confidence < 0.97);
        assert_eq!(first.angle, None);

        let second = &lines[1];
        assert_eq!(second.text, "東京");
        assert!((second.confidence - 0.45).abs() < 0.001);
    }

    #[test]
    fn spacing_between_tokens() {
        assert!(needs_space("Sales", "growth"));
        assert!(needs_space("growth,", "2024"));
        assert!(!needs_space("東", "京"));
        assert!(!needs_space("(", "x"));
    }

    #[test]
    fn narrows_languages_to_installed_models() {
        let available = vec!["eng".to_string(), "kor".to_string()];
        assert_eq!(choose_languages("eng+jpn+kor", &available).expect("langs"), "eng+kor");
        assert!(choose_languages("jpn", &available).is_err());
        assert!(choose_languages("  ", &available).is_err());
        assert_eq!(choose_languages("jpn", &[]).expect("unchecked"), "jpn");
    }

    #[test]
    fn contrast_prefilter_rejects_flat_images() {
        use image::{GrayImage, Luma};

        let flat = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 32, Luma([200])));
        assert!(!has_luminance_contrast(&flat));

        let mut inked = GrayImage::from_pixel(64, 32, Luma([250]));
        for x in 0..64 {
            inked.put_pixel(x, 16, Luma([20]));
        }
        assert!(has_luminance_contrast(&DynamicImage::ImageLuma8(inked)));

        let tiny = DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([0])));
        assert!(!has_luminance_contrast(&tiny));
    }
}
