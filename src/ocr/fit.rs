use super::Quad;

pub const MIN_FONT_PX: f32 = 8.0;
pub const LINE_HEIGHT: f32 = 1.2;

const SKEW_FLOOR: f32 = 0.6;
const ASPECT_SHRINK: f32 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl PixelRect {
    pub fn padded(&self) -> PixelRect {
        let pad_x = ((self.w as f32 * 0.03).round() as u32).max(1);
        let pad_y = ((self.h as f32 * 0.03).round() as u32).max(1);
        PixelRect {
            x: self.x + pad_x,
            y: self.y + pad_y,
            w: self.w.saturating_sub(pad_x * 2).max(1),
            h: self.h.saturating_sub(pad_y * 2).max(1),
        }
    }
}

pub fn quad_extent(quad: &Quad) -> (f32, f32, f32, f32) {
    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    for [x, y] in quad {
        min_x = min_x.min(*x);
        min_y = min_y.min(*y);
        max_x = max_x.max(*x);
        max_y = max_y.max(*y);
    }
    (min_x, min_y, max_x, max_y)
}

pub fn clipped_rect(quad: &Quad, width: u32, height: u32) -> Option<PixelRect> {
    let (min_x, min_y, max_x, max_y) = quad_extent(quad);
    if !(min_x.is_finite() && min_y.is_finite() && max_x.is_finite() && max_y.is_finite()) {
        return None;
    }
    let left = min_x.floor().clamp(0.0, width as f32) as u32;
    let top = min_y.floor().clamp(0.0, height as f32) as u32;
    let right = max_x.ceil().clamp(0.0, width as f32) as u32;
    let bottom = max_y.ceil().clamp(0.0, height as f32) as u32;
    if right <= left || bottom <= top {
        return None;
    }
    Some(PixelRect {
        x: left,
        y: top,
        w: right - left,
        h: bottom - top,
    })
}

pub fn skew_factor(angle: Option<f32>, box_w: f32, box_h: f32) -> f32 {
    if let Some(angle) = angle.filter(|value| value.is_finite()) {
        let normalized = angle.rem_euclid(180.0);
        let off_axis = (5.0..=85.0).contains(&normalized) || (95.0..=175.0).contains(&normalized);
        if off_axis {
            let within = normalized % 90.0;
            let deviation = within.min(90.0 - within);
            return (1.0 - (deviation / 45.0) * 0.4).max(SKEW_FLOOR);
        }
    }
    if box_w > 0.0 && box_h > 0.0 {
        let ratio = box_w / box_h;
        if !(0.5..=2.0).contains(&ratio) {
            return ASPECT_SHRINK;
        }
    }
    1.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutPlan {
    pub font_size: f32,
    pub line_height: f32,
    pub lines: Vec<String>,
    pub block_w: f32,
    pub block_h: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub overflow: bool,
}

/// Steps down from the skew-scaled height estimate to the first size that fits.
pub fn plan_layout<M>(text: &str, usable_w: f32, usable_h: f32, skew: f32, measure: M) -> LayoutPlan
where
    M: Fn(&str, f32) -> f32,
{
    let usable_w = usable_w.max(1.0);
    let usable_h = usable_h.max(1.0);
    let start = initial_font_size(usable_h, skew);

    let mut size = start;
    let mut fitted = None;
    while size >= MIN_FONT_PX {
        let (_, block_w, block_h) = wrap_block(text, size, usable_w, &measure);
        if block_w <= usable_w && block_h <= usable_h {
            fitted = Some(size);
            break;
        }
        size -= 1.0;
    }
    let font_size = fitted.unwrap_or(MIN_FONT_PX);

    let (lines, block_w, block_h) = wrap_block(text, font_size, usable_w, &measure);
    let overflow = fitted.is_none() || block_w > usable_w || block_h > usable_h;
    LayoutPlan {
        font_size,
        line_height: font_size * LINE_HEIGHT,
        lines,
        block_w,
        block_h,
        offset_x: ((usable_w - block_w) / 2.0).max(0.0),
        offset_y: ((usable_h - block_h) / 2.0).max(0.0),
        overflow,
    }
}

pub fn initial_font_size(usable_h: f32, skew: f32) -> f32 {
    (usable_h / LINE_HEIGHT * skew.clamp(SKEW_FLOOR, 1.0))
        .floor()
        .max(MIN_FONT_PX)
}

fn wrap_block<M>(text: &str, size: f32, usable_w: f32, measure: &M) -> (Vec<String>, f32, f32)
where
    M: Fn(&str, f32) -> f32,
{
    let per_line = chars_per_line(text, size, usable_w, measure);
    let lines = wrap_text(text, per_line);
    let block_w = lines
        .iter()
        .map(|line| measure(line, size))
        .fold(0.0, f32::max);
    let block_h = lines.len() as f32 * size * LINE_HEIGHT;
    (lines, block_w, block_h)
}

fn chars_per_line<M>(text: &str, size: f32, usable_w: f32, measure: &M) -> usize
where
    M: Fn(&str, f32) -> f32,
{
    let sample: String = text.chars().filter(|ch| !ch.is_whitespace()).collect();
    let count = sample.chars().count();
    if count == 0 {
        return usize::MAX;
    }
    let glyph = (measure(&sample, size) / count as f32).max(0.1);
    ((usable_w / glyph).floor() as usize).max(1)
}

/// Unspaced scripts and overlong words are split by character.
pub fn wrap_text(text: &str, per_line: usize) -> Vec<String> {
    let per_line = per_line.max(1);
    let mut out = Vec::new();
    for paragraph in text.split('\n') {
        let paragraph = paragraph.trim_end_matches('\r');
        let mut current = String::new();
        let mut current_len = 0usize;
        for word in paragraph.split_whitespace() {
            let word_len = word.chars().count();
            if word_len > per_line {
                if current_len > 0 {
                    out.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                let chars: Vec<char> = word.chars().collect();
                for chunk in chars.chunks(per_line) {
                    let piece: String = chunk.iter().collect();
                    if chunk.len() == per_line {
                        out.push(piece);
                    } else {
                        current = piece;
                        current_len = chunk.len();
                    }
                }
                continue;
            }
            let needed = if current_len == 0 {
                word_len
            } else {
                current_len + 1 + word_len
            };
            if needed > per_line && current_len > 0 {
                out.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.push_str(word);
            current_len += word_len;
        }
        if current_len > 0 || paragraph.trim().is_empty() {
            out.push(current);
        }
    }
    while out.len() > 1 && out.last().is_some_and(|line| line.is_empty()) {
        out.pop();
    }
    out
}
