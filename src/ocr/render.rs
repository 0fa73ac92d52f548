use anyhow::{Context, Result, anyhow};
use image::{Rgba, RgbaImage};
use resvg::render;
use std::sync::Arc;
use tiny_skia::Pixmap;
use tracing::{debug, warn};
use usvg::{Options, Tree};

use super::Quad;
use super::fit::{PixelRect, clipped_rect, plan_layout, quad_extent, skew_factor};
use super::font::{FontBook, measure_text_width_px};
use super::palette::{contrast_color, estimate_background};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitOutcome {
    Rejected,
    Rendered { font_size: f32, overflow: bool },
}

impl FitOutcome {
    pub fn is_rendered(&self) -> bool {
        matches!(self, Self::Rendered { .. })
    }
}

pub struct TextFitter {
    fonts: Arc<FontBook>,
}

impl TextFitter {
    pub fn new(fonts: Arc<FontBook>) -> Self {
        Self { fonts }
    }

    pub fn render(
        &self,
        image: &mut RgbaImage,
        quad: &Quad,
        angle: Option<f32>,
        translated: &str,
        font_code: &str,
    ) -> Result<FitOutcome> {
        let (width, height) = image.dimensions();
        let Some(rect) = clipped_rect(quad, width, height) else {
            return Ok(FitOutcome::Rejected);
        };

        let background = estimate_background(image, rect);
        fill_rect(image, rect, background);
        let foreground = contrast_color(background);

        let usable = rect.padded();
        let (min_x, min_y, max_x, max_y) = quad_extent(quad);
        let skew = skew_factor(angle, max_x - min_x, max_y - min_y);
        let font = self.fonts.resolve(font_code);
        let metrics = font.as_ref().map(|resolved| &resolved.metrics);
        let plan = plan_layout(translated, usable.w as f32, usable.h as f32, skew, |text, size| {
            measure_text_width_px(text, size, metrics)
        });
        if plan.overflow {
            warn!(
                "fit: '{}' overflows {}x{} at {}px; clipping",
                translated, usable.w, usable.h, plan.font_size
            );
        }

        let mut svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = usable.w,
            h = usable.h
        );
        let family = font
            .as_ref()
            .map(|resolved| format!(r#" font-family="{}""#, escape_xml(&resolved.family)))
            .unwrap_or_default();
        svg.push_str(&format!(
            r#"<text x="{x}" y="{y}" font-size="{size}" fill="rgb({r},{g},{b})"{family}>"#,
            x = plan.offset_x,
            y = plan.offset_y + plan.font_size,
            size = plan.font_size,
            r = foreground[0],
            g = foreground[1],
            b = foreground[2],
            family = family
        ));
        for (idx, line) in plan.lines.iter().enumerate() {
            let dy = if idx == 0 { 0.0 } else { plan.line_height };
            svg.push_str(&format!(
                r#"<tspan x="{x}" dy="{dy}">{text}</tspan>"#,
                x = plan.offset_x,
                dy = dy,
                text = escape_xml(line)
            ));
        }
        svg.push_str("</text></svg>");

        let layer = self.rasterize(&svg)?;
        image::imageops::overlay(image, &layer, usable.x as i64, usable.y as i64);
        debug!(
            "fit: {} line(s) at {}px into {:?}",
            plan.lines.len(),
            plan.font_size,
            rect
        );
        Ok(FitOutcome::Rendered {
            font_size: plan.font_size,
            overflow: plan.overflow,
        })
    }

    fn rasterize(&self, svg: &str) -> Result<RgbaImage> {
        let options = Options {
            fontdb: self.fonts.database(),
            ..Options::default()
        };
        let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse text SVG")?;
        let size = tree.size().to_int_size();
        let mut pixmap =
            Pixmap::new(size.width(), size.height()).ok_or_else(|| anyhow!("empty SVG size"))?;
        render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());
        let mut data = Vec::with_capacity(pixmap.pixels().len() * 4);
        for pixel in pixmap.pixels() {
            let color = pixel.demultiply();
            data.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
        }
        RgbaImage::from_raw(size.width(), size.height(), data)
            .ok_or_else(|| anyhow!("failed to build image buffer from SVG"))
    }
}

fn fill_rect(image: &mut RgbaImage, rect: PixelRect, color: [u8; 3]) {
    let (width, height) = image.dimensions();
    let [r, g, b] = color;
    for y in rect.y..(rect.y + rect.h).min(height) {
        for x in rect.x..(rect.x + rect.w).min(width) {
            image.put_pixel(x, y, Rgba([r, g, b, 255]));
        }
    }
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
