mod picture;
mod rebuild;
mod units;

use anyhow::{Result, anyhow};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::classify::ClassifierThresholds;
use crate::ooxml::{Presentation, text};
use crate::providers::{TextContext, TranslationBackend, TranslationOutcome};
use crate::style::{OverflowTemplate, StyleSnapshot};
use crate::translator::Translator;

pub use picture::{PictureOutcome, PictureTools};
pub use rebuild::{rebuild_text_body, split_lines};
pub use units::{TranslationUnit, UnitKind, enumerate_units};

use picture::PictureJob;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Translated,
    Skipped,
    Unchanged,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub processed: usize,
    pub total: usize,
    pub translated: usize,
    pub slide_index: usize,
    pub unit_kind: UnitKind,
    pub status: UnitStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub total: usize,
    pub processed: usize,
    pub translated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub images_rewritten: usize,
    pub stopped: bool,
}

pub struct DocumentWalker<'a, B: TranslationBackend> {
    translator: &'a Translator<B>,
    thresholds: ClassifierThresholds,
    overflow: OverflowTemplate,
    pictures: Option<PictureTools>,
}

impl<'a, B: TranslationBackend> DocumentWalker<'a, B> {
    pub fn new(translator: &'a Translator<B>, thresholds: ClassifierThresholds) -> Self {
        Self {
            translator,
            thresholds,
            overflow: OverflowTemplate::default(),
            pictures: None,
        }
    }

    pub fn with_overflow_template(mut self, overflow: OverflowTemplate) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn with_pictures(mut self, tools: PictureTools) -> Self {
        self.pictures = Some(tools);
        self
    }

    pub async fn run<F>(&self, presentation: &mut Presentation, mut progress: F) -> PassSummary
    where
        F: FnMut(ProgressEvent),
    {
        let units = enumerate_units(presentation, self.pictures.is_some());
        let mut summary = PassSummary {
            total: units.len(),
            ..PassSummary::default()
        };
        info!("document: {} unit(s) on {} slide(s)", units.len(), presentation.slides().len());

        let mut snapshots: HashMap<usize, StyleSnapshot> = HashMap::new();
        for unit in &units {
            if self.translator.is_cancelled() {
                summary.stopped = true;
                break;
            }

            let result = match unit.kind {
                UnitKind::Text | UnitKind::TableCell => {
                    self.process_text(presentation, unit, &mut snapshots).await
                }
                UnitKind::Picture => self.process_picture(presentation, unit, &mut summary).await,
            };
            let status = match result {
                Ok(status) => status,
                Err(err) => {
                    warn!(
                        "slide {} unit {} ({}): {:#}",
                        unit.slide + 1,
                        unit.index,
                        unit.label,
                        err
                    );
                    UnitStatus::Failed
                }
            };
            snapshots.remove(&unit.index);

            summary.processed += 1;
            match status {
                UnitStatus::Translated => summary.translated += 1,
                UnitStatus::Skipped | UnitStatus::Unchanged => summary.skipped += 1,
                UnitStatus::Failed => summary.failed += 1,
            }
            progress(ProgressEvent {
                processed: summary.processed,
                total: summary.total,
                translated: summary.translated,
                slide_index: unit.slide,
                unit_kind: unit.kind,
                status,
            });
        }
        if summary.stopped {
            info!("document: stopped after {} of {} unit(s)", summary.processed, summary.total);
        }
        summary
    }

    async fn process_text(
        &self,
        presentation: &mut Presentation,
        unit: &TranslationUnit,
        snapshots: &mut HashMap<usize, StyleSnapshot>,
    ) -> Result<UnitStatus> {
        let body = unit
            .body
            .ok_or_else(|| anyhow!("text unit without a text body"))?;
        let slide = presentation
            .slide(unit.slide)
            .ok_or_else(|| anyhow!("slide {} out of range", unit.slide))?;

        snapshots.insert(unit.index, StyleSnapshot::capture(&slide.xml, &slide.rels, body));
        let source = text::frame_text(&slide.xml, body);
        if source.trim().is_empty() || self.thresholds.should_skip(&source) {
            debug!("slide {}: skipping '{}'", unit.slide + 1, source.trim());
            return Ok(UnitStatus::Skipped);
        }

        let translated = match self.translator.translate(&source, TextContext::Document).await {
            TranslationOutcome::Translated(value) => value,
            TranslationOutcome::Failed(failure) => {
                warn!(
                    "slide {} unit {} ({}): translation failed: {}",
                    unit.slide + 1,
                    unit.index,
                    unit.label,
                    failure
                );
                return Ok(UnitStatus::Failed);
            }
        };
        if translated == source {
            return Ok(UnitStatus::Unchanged);
        }

        let snapshot = snapshots.remove(&unit.index).unwrap_or_default();
        let slide = presentation
            .slide_mut(unit.slide)
            .ok_or_else(|| anyhow!("slide {} out of range", unit.slide))?;
        let failures = rebuild_text_body(
            &mut slide.xml,
            &mut slide.rels,
            body,
            &snapshot,
            &translated,
            self.overflow,
        );
        slide.mark_dirty();
        if failures > 0 {
            warn!(
                "slide {} unit {}: {} style field(s) not reapplied",
                unit.slide + 1,
                unit.index,
                failures
            );
        }
        Ok(UnitStatus::Translated)
    }

    async fn process_picture(
        &self,
        presentation: &mut Presentation,
        unit: &TranslationUnit,
        summary: &mut PassSummary,
    ) -> Result<UnitStatus> {
        let tools = self
            .pictures
            .as_ref()
            .ok_or_else(|| anyhow!("picture unit without an OCR engine"))?;
        let job = PictureJob {
            tools,
            translator: self.translator,
            thresholds: self.thresholds,
            font_code: &self.translator.options().target_lang,
        };
        let (outcome, stopped) = job.run(presentation, unit).await?;
        if stopped {
            summary.stopped = true;
        }
        Ok(match outcome {
            PictureOutcome::Rewritten { .. } => {
                summary.images_rewritten += 1;
                UnitStatus::Translated
            }
            PictureOutcome::Untouched { .. } => UnitStatus::Unchanged,
            PictureOutcome::NoText => UnitStatus::Skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::ocr::{FontBook, OcrDetection, OcrEngine, TextFitter};
    use crate::ooxml::ShapeKind;
    use crate::test_util::{StubBackend, build_deck, picture_shape, sample_deck, text_shape};
    use crate::translator::TranslateOptions;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::sync::Arc;

    struct ScriptedOcr {
        text: &'static str,
    }

    impl OcrEngine for ScriptedOcr {
        fn name(&self) -> &str {
            "scripted"
        }

        fn detect(&self, _image: &DynamicImage) -> anyhow::Result<Vec<OcrDetection>> {
            Ok(vec![OcrDetection {
                quad: [[4.0, 4.0], [56.0, 4.0], [56.0, 26.0], [4.0, 26.0]],
                text: self.text.to_string(),
                confidence: 0.9,
                angle: None,
            }])
        }

        fn has_text(&self, _image_bytes: &[u8]) -> bool {
            true
        }
    }

    const IMAGE_REL: &str = r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="../media/image1.png"/>"#;

    fn line_png() -> Vec<u8> {
        let mut image = RgbaImage::from_pixel(60, 30, Rgba([255, 255, 255, 255]));
        for x in 10..50 {
            image.put_pixel(x, 15, Rgba([0, 0, 0, 255]));
        }
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(image)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .expect("png");
        png
    }

    fn picture_deck() -> Vec<u8> {
        build_deck(
            &[(picture_shape(5, "Picture 4", "rId2"), IMAGE_REL.to_string())],
            &[("image1.png", line_png())],
        )
    }

    fn tools(text: &'static str) -> PictureTools {
        PictureTools {
            engine: Arc::new(ScriptedOcr { text }),
            fitter: Arc::new(TextFitter::new(Arc::new(FontBook::new(HashMap::new(), None)))),
        }
    }

    fn translator(backend: StubBackend, cancel: CancelToken) -> Translator<StubBackend> {
        let options = TranslateOptions {
            source_lang: "en".to_string(),
            target_lang: "ko".to_string(),
            model: "stub".to_string(),
        };
        Translator::new(backend, options, cancel)
    }

    #[tokio::test]
    async fn translates_text_and_table_cells_and_reports_progress() {
        let backend = StubBackend::new().with_prefix("KO:");
        let translator = translator(backend.clone(), CancelToken::new());
        let mut presentation = Presentation::from_bytes(&sample_deck()).expect("deck");
        let mut events = Vec::new();

        let summary = DocumentWalker::new(&translator, ClassifierThresholds::default())
            .run(&mut presentation, |event| events.push(event))
            .await;

        assert_eq!(summary.total, 5);
        assert_eq!(summary.processed, 5);
        // "42" and the blank cell are skipped.
        assert_eq!(summary.translated, 3);
        assert_eq!(summary.skipped, 2);
        assert!(!summary.stopped);
        assert_eq!(events.len(), 5);
        assert_eq!(events.last().map(|e| e.processed), Some(5));
        assert_eq!(backend.single_calls(), 3);

        let slide = presentation.slide(0).expect("slide");
        let units = enumerate_units(&presentation, false);
        let title = units[0].body.expect("body");
        assert_eq!(text::frame_text(&slide.xml, title), "KO:Hello world");
    }

    #[tokio::test]
    async fn failed_translation_leaves_unit_untouched() {
        let backend = StubBackend::new().failing("Hello world");
        let translator = translator(backend, CancelToken::new());
        let mut presentation = Presentation::from_bytes(&sample_deck()).expect("deck");
        let before = presentation.slide(0).expect("slide").xml.to_bytes().expect("xml");

        let summary = DocumentWalker::new(&translator, ClassifierThresholds::default())
            .run(&mut presentation, |_| {})
            .await;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.processed, 5);
        let units = enumerate_units(&presentation, false);
        let slide = presentation.slide(0).expect("slide");
        assert_eq!(text::frame_text(&slide.xml, units[0].body.expect("body")), "Hello world");
        // Echoing stub leaves every other unit unchanged too.
        assert_eq!(slide.xml.to_bytes().expect("xml"), before);
    }

    #[tokio::test]
    async fn cancellation_stops_between_units() {
        let cancel = CancelToken::new();
        let translator = translator(StubBackend::new().with_prefix("KO:"), cancel.clone());
        let mut presentation = Presentation::from_bytes(&sample_deck()).expect("deck");

        let summary = DocumentWalker::new(&translator, ClassifierThresholds::default())
            .run(&mut presentation, |event| {
                if event.processed == 2 {
                    cancel.cancel();
                }
            })
            .await;

        assert!(summary.stopped);
        assert_eq!(summary.processed, 2);
        // Second unit is the numeric label, which is skipped.
        assert_eq!(summary.translated, 1);
    }

    #[tokio::test]
    async fn picture_with_translated_text_is_replaced() {
        let translator = translator(StubBackend::new().with("Sales", "매출"), CancelToken::new());
        let mut presentation = Presentation::from_bytes(&picture_deck()).expect("deck");

        let summary = DocumentWalker::new(&translator, ClassifierThresholds::default())
            .with_pictures(tools("Sales"))
            .run(&mut presentation, |_| {})
            .await;

        assert_eq!(summary.images_rewritten, 1);
        assert_eq!(summary.translated, 1);
        let picture = presentation
            .shapes(0)
            .into_iter()
            .find(|shape| shape.kind == ShapeKind::Picture)
            .expect("picture");
        let part = presentation.picture_part(0, picture.node).expect("media");
        assert_eq!(part, "ppt/media/image_translated1.png");
        let bytes = presentation.part(&part).expect("bytes");
        assert!(image::load_from_memory(bytes).is_ok());
        assert!(presentation.slide(0).expect("slide").rels.get("rId2").is_none());
        assert!(presentation.part("ppt/media/image1.png").is_none());
    }

    #[tokio::test]
    async fn shapes_inside_a_group_are_translated_in_place() {
        let group = format!(
            r#"<p:grpSp><p:nvGrpSpPr><p:cNvPr id="10" name="Group 9"/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>{}{}</p:grpSp>"#,
            text_shape(
                11,
                "Caption 10",
                r#"<a:p><a:r><a:rPr lang="en-US" sz="1800"/><a:t>Quarterly sales</a:t></a:r></a:p>"#,
            ),
            picture_shape(12, "Picture 11", "rId2"),
        );
        let deck = build_deck(&[(group, IMAGE_REL.to_string())], &[("image1.png", line_png())]);
        let translator = translator(StubBackend::new().with_prefix("KO:"), CancelToken::new());
        let mut presentation = Presentation::from_bytes(&deck).expect("deck");

        let summary = DocumentWalker::new(&translator, ClassifierThresholds::default())
            .with_pictures(tools("Sales"))
            .run(&mut presentation, |_| {})
            .await;

        assert_eq!(summary.total, 2);
        assert_eq!(summary.translated, 2);
        assert_eq!(summary.images_rewritten, 1);

        let shapes = presentation.shapes(0);
        let slide = presentation.slide(0).expect("slide");
        let caption = shapes
            .iter()
            .find(|shape| shape.kind == ShapeKind::Text)
            .expect("caption");
        let body = slide.xml.first_child_named(caption.node, "txBody").expect("body");
        assert_eq!(text::frame_text(&slide.xml, body), "KO:Quarterly sales");

        let picture = shapes
            .iter()
            .find(|shape| shape.kind == ShapeKind::Picture)
            .expect("picture");
        let group = slide.xml.parent(picture.node).expect("group");
        assert_eq!(slide.xml.local_name(group), "grpSp");
        // nvGrpSpPr, grpSpPr, the caption, then the picture.
        assert_eq!(slide.xml.index_in_parent(picture.node), Some(3));
        assert_eq!(
            presentation.picture_part(0, picture.node).as_deref(),
            Some("ppt/media/image_translated1.png")
        );
    }

    #[tokio::test]
    async fn picture_with_only_noise_is_left_alone() {
        let backend = StubBackend::new().with_prefix("KO:");
        let translator = translator(backend.clone(), CancelToken::new());
        let mut presentation = Presentation::from_bytes(&picture_deck()).expect("deck");

        let summary = DocumentWalker::new(&translator, ClassifierThresholds::default())
            .with_pictures(tools("|| -- ||"))
            .run(&mut presentation, |_| {})
            .await;

        assert_eq!(summary.images_rewritten, 0);
        assert_eq!(backend.single_calls(), 0);
        let picture = presentation.shapes(0)[0].node;
        assert_eq!(
            presentation.picture_part(0, picture).as_deref(),
            Some("ppt/media/image1.png")
        );
    }

    #[tokio::test]
    async fn pictures_are_not_units_without_ocr() {
        let translator = translator(StubBackend::new(), CancelToken::new());
        let mut presentation = Presentation::from_bytes(&picture_deck()).expect("deck");
        let summary = DocumentWalker::new(&translator, ClassifierThresholds::default())
            .run(&mut presentation, |_| {})
            .await;
        assert_eq!(summary.total, 0);
    }
}
