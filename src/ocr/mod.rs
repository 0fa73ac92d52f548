mod fit;
mod font;
mod palette;
mod render;
mod tesseract;

use anyhow::Result;
use image::DynamicImage;

pub use fit::{LayoutPlan, MIN_FONT_PX, PixelRect, clipped_rect, plan_layout, skew_factor};
pub use font::{FontBook, FontMetrics, ResolvedFont, measure_text_width_px};
pub use palette::{contrast_color, estimate_background};
pub use render::{FitOutcome, TextFitter};
pub use tesseract::{TesseractEngine, list_tesseract_languages};

/// Four corners in image pixels, clockwise from top-left.
pub type Quad = [[f32; 2]; 4];

#[derive(Debug, Clone, PartialEq)]
pub struct OcrDetection {
    pub quad: Quad,
    pub text: String,
    pub confidence: f32,
    /// Degrees from horizontal, when the engine reports one.
    pub angle: Option<f32>,
}

pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    fn detect(&self, image: &DynamicImage) -> Result<Vec<OcrDetection>>;

    fn has_text(&self, image_bytes: &[u8]) -> bool;
}
