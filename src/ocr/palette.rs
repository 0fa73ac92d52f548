use image::{Rgba, RgbaImage};

use super::fit::PixelRect;

const PALETTE_SIZE: usize = 5;
const MAX_ITERATIONS: usize = 10;
const MAX_SAMPLES: usize = 4096;

/// Largest of five k-means clusters, or the channel average.
pub fn estimate_background(image: &RgbaImage, rect: PixelRect) -> [u8; 3] {
    let samples = sample_region(image, rect);
    dominant_color(&samples, PALETTE_SIZE).unwrap_or_else(|| mean_color(&samples))
}

pub fn contrast_color(background: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = background;
    let luminance = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    if luminance >= 128.0 {
        [0, 0, 0]
    } else {
        [255, 255, 255]
    }
}

fn sample_region(image: &RgbaImage, rect: PixelRect) -> Vec<[f32; 3]> {
    let (width, height) = image.dimensions();
    let right = (rect.x + rect.w).min(width);
    let bottom = (rect.y + rect.h).min(height);
    if rect.x >= right || rect.y >= bottom {
        return Vec::new();
    }
    let area = ((right - rect.x) as usize) * ((bottom - rect.y) as usize);
    let stride = ((area as f32 / MAX_SAMPLES as f32).sqrt().ceil() as u32).max(1);

    let mut samples = Vec::new();
    let mut y = rect.y;
    while y < bottom {
        let mut x = rect.x;
        while x < right {
            samples.push(over_white(*image.get_pixel(x, y)));
            x += stride;
        }
        y += stride;
    }
    samples
}

fn over_white(pixel: Rgba<u8>) -> [f32; 3] {
    let [r, g, b, a] = pixel.0;
    let alpha = a as f32 / 255.0;
    let blend = |channel: u8| channel as f32 * alpha + 255.0 * (1.0 - alpha);
    [blend(r), blend(g), blend(b)]
}

fn dominant_color(points: &[[f32; 3]], k: usize) -> Option<[u8; 3]> {
    if points.is_empty() || k == 0 {
        return None;
    }
    let k = k.min(points.len());
    // Spread the initial centers across the sample instead of taking the first k.
    let mut centers: Vec<[f32; 3]> = (0..k).map(|idx| points[idx * points.len() / k]).collect();
    let mut labels = vec![0usize; points.len()];

    for iteration in 0..MAX_ITERATIONS {
        let mut changed = false;
        for (idx, point) in points.iter().enumerate() {
            let best = nearest(&centers, point);
            if labels[idx] != best {
                labels[idx] = best;
                changed = true;
            }
        }

        let mut sums = vec![([0.0f32; 3], 0usize); k];
        for (point, label) in points.iter().zip(&labels) {
            let (sum, count) = &mut sums[*label];
            for channel in 0..3 {
                sum[channel] += point[channel];
            }
            *count += 1;
        }
        for (center, (sum, count)) in centers.iter_mut().zip(&sums) {
            if *count > 0 {
                for channel in 0..3 {
                    center[channel] = sum[channel] / *count as f32;
                }
            }
        }

        if !changed && iteration > 0 {
            break;
        }
    }

    let mut counts = vec![0usize; k];
    for label in &labels {
        counts[*label] += 1;
    }
    let (winner, _) = counts
        .iter()
        .enumerate()
        .max_by_key(|(idx, count)| (**count, std::cmp::Reverse(*idx)))?;
    let center = centers[winner];
    if center.iter().any(|value| !value.is_finite()) {
        return None;
    }
    Some(center.map(|value| value.round().clamp(0.0, 255.0) as u8))
}

fn nearest(centers: &[[f32; 3]], point: &[f32; 3]) -> usize {
    let mut best_idx = 0usize;
    let mut best_dist = f32::MAX;
    for (idx, center) in centers.iter().enumerate() {
        let dist: f32 = (0..3).map(|c| (point[c] - center[c]).powi(2)).sum();
        if dist < best_dist {
            best_dist = dist;
            best_idx = idx;
        }
    }
    best_idx
}

fn mean_color(points: &[[f32; 3]]) -> [u8; 3] {
    if points.is_empty() {
        return [255, 255, 255];
    }
    let mut sum = [0.0f32; 3];
    for point in points {
        for channel in 0..3 {
            sum[channel] += point[channel];
        }
    }
    sum.map(|value| (value / points.len() as f32).round().clamp(0.0, 255.0) as u8)
}
