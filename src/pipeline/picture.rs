use anyhow::{Context, Result, anyhow};
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::classify::ClassifierThresholds;
use crate::ocr::{OcrDetection, OcrEngine, TextFitter};
use crate::ooxml::Presentation;
use crate::providers::{TextContext, TranslationBackend, TranslationOutcome};
use crate::translator::Translator;

use super::units::TranslationUnit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureOutcome {
    Rewritten { detections: usize, rendered: usize },
    Untouched { detections: usize },
    NoText,
}

#[derive(Clone)]
pub struct PictureTools {
    pub engine: Arc<dyn OcrEngine>,
    pub fitter: Arc<TextFitter>,
}

pub(super) struct PictureJob<'a, B: TranslationBackend> {
    pub tools: &'a PictureTools,
    pub translator: &'a Translator<B>,
    pub thresholds: ClassifierThresholds,
    pub font_code: &'a str,
}

impl<B: TranslationBackend> PictureJob<'_, B> {
    pub async fn run(
        &self,
        presentation: &mut Presentation,
        unit: &TranslationUnit,
    ) -> Result<(PictureOutcome, bool)> {
        let part = presentation
            .picture_part(unit.slide, unit.shape)
            .ok_or_else(|| anyhow!("picture '{}' has no embedded media", unit.label))?;
        let bytes = presentation
            .part(&part)
            .ok_or_else(|| anyhow!("media part missing: {}", part))?
            .to_vec();

        if !self.tools.engine.has_text(&bytes) {
            debug!("slide {}: {} has no text-like content", unit.slide + 1, part);
            return Ok((PictureOutcome::NoText, false));
        }

        let engine = self.tools.engine.clone();
        let source = bytes.clone();
        let (image, detections) = tokio::task::spawn_blocking(move || -> Result<_> {
            let image = image::load_from_memory(&source).with_context(|| "failed to decode picture")?;
            let detections = engine.detect(&image)?;
            Ok((image, detections))
        })
        .await
        .with_context(|| "OCR task panicked")??;

        let digest = md5::compute(image.to_rgb8().as_raw());
        debug!(
            "slide {}: {} ({}x{}, rgb {:x}) has {} detection(s)",
            unit.slide + 1,
            part,
            image.width(),
            image.height(),
            digest,
            detections.len()
        );

        let mut working = image.to_rgba8();
        let mut rendered = 0usize;
        let mut stopped = false;
        for detection in &detections {
            if self.translator.is_cancelled() {
                stopped = true;
                break;
            }
            if self.render_detection(&mut working, detection).await {
                rendered += 1;
            }
        }

        if rendered == 0 {
            return Ok((
                PictureOutcome::Untouched {
                    detections: detections.len(),
                },
                stopped,
            ));
        }

        let (format, ext, mime) = output_format(&bytes);
        let encoded = encode(working, format)?;
        presentation
            .replace_picture(unit.slide, unit.shape, encoded, ext, mime)
            .with_context(|| format!("failed to replace picture '{}'", unit.label))?;
        info!(
            "slide {}: rewrote {} ({} of {} region(s))",
            unit.slide + 1,
            unit.label,
            rendered,
            detections.len()
        );
        Ok((
            PictureOutcome::Rewritten {
                detections: detections.len(),
                rendered,
            },
            stopped,
        ))
    }

    async fn render_detection(&self, working: &mut RgbaImage, detection: &OcrDetection) -> bool {
        let source = detection.text.trim();
        if !self.thresholds.is_ocr_valid(source) {
            debug!("ocr: skipping '{}'", source);
            return false;
        }
        let translated = match self.translator.translate(source, TextContext::Ocr).await {
            TranslationOutcome::Translated(text) if !text.trim().is_empty() => text,
            TranslationOutcome::Translated(_) => return false,
            TranslationOutcome::Failed(failure) => {
                warn!("ocr: translation of '{}' failed: {}", source, failure);
                return false;
            }
        };
        if translated.trim() == source {
            return false;
        }
        match self.tools.fitter.render(
            working,
            &detection.quad,
            detection.angle,
            translated.trim(),
            self.font_code,
        ) {
            Ok(outcome) => outcome.is_rendered(),
            Err(err) => {
                warn!("ocr: failed to draw '{}': {:#}", translated, err);
                false
            }
        }
    }
}

pub(crate) fn output_format(bytes: &[u8]) -> (ImageFormat, &'static str, &'static str) {
    let mime = infer::get(bytes).map(|kind| kind.mime_type()).unwrap_or_default();
    match mime {
        "image/jpeg" => (ImageFormat::Jpeg, "jpeg", "image/jpeg"),
        "image/gif" => (ImageFormat::Gif, "gif", "image/gif"),
        "image/bmp" => (ImageFormat::Bmp, "bmp", "image/bmp"),
        "image/tiff" => (ImageFormat::Tiff, "tiff", "image/tiff"),
        _ => (ImageFormat::Png, "png", "image/png"),
    }
}

fn encode(image: RgbaImage, format: ImageFormat) -> Result<Vec<u8>> {
    let image = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(image).to_rgb8()),
        _ => DynamicImage::ImageRgba8(image),
    };
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), format)
        .with_context(|| format!("failed to encode {:?}", format))?;
    Ok(bytes)
}
