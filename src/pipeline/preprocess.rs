//! Light per-frame normalisation before inference.
//!
//! Three conditional steps in a fixed order, each gated on a fresh
//! measurement of the frame as modified by the previous step:
//!
//! 1. Deskew when the estimated skew magnitude exceeds 1.0°
//! 2. Upscale when the larger dimension is under 1024 px
//! 3. Mild contrast boost when the luma contrast ratio is under 0.2
//!
//! The transformation is pure and never fails: any estimation failure
//! (no edges, no candidate lines) degrades to "no adjustment" for that
//! step. The frame stays full colour throughout — no binarisation, no
//! desaturation; the downstream vision model consumes colour.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::edges::canny;
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use imageproc::hough::{detect_lines, LineDetectionOptions};
use tracing::debug;

/// Skew magnitudes at or below this many degrees are left alone.
const DESKEW_THRESHOLD_DEGREES: f32 = 1.0;

/// Frames whose larger dimension is below this are upscaled to exactly it.
const MIN_DIMENSION: u32 = 1024;

/// Contrast ratios at or above this need no boost.
const LOW_CONTRAST_RATIO: f32 = 0.2;

const CONTRAST_GAIN: f32 = 1.1;
const CONTRAST_OFFSET: f32 = 5.0;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Normalise one raster frame for inference.
pub fn preprocess(frame: RgbImage) -> RgbImage {
    let frame = deskew(frame);
    let frame = upscale(frame);
    boost_contrast(frame)
}

// ── Step 1: deskew ───────────────────────────────────────────────────────

/// Estimate the document skew in degrees.
///
/// Canny edges, then a Hough transform; only near-horizontal candidate
/// lines (direction magnitude < 45°, i.e. text lines) vote. The estimate
/// is the median of the surviving angles — robust against the occasional
/// vertical rule or border line. Returns 0.0 when nothing usable is found.
pub fn estimate_skew_degrees(frame: &RgbImage) -> f32 {
    if frame.width() < 16 || frame.height() < 16 {
        return 0.0;
    }

    let gray = imageops::grayscale(frame);
    let edges = canny(&gray, 50.0, 150.0);
    let lines = detect_lines(
        &edges,
        LineDetectionOptions {
            vote_threshold: 100,
            suppression_radius: 8,
        },
    );

    // A polar line's angle is that of its normal; the line itself runs at
    // normal − 90°, so near-horizontal text lines sit near normal = 90°.
    let mut angles: Vec<f32> = lines
        .iter()
        .filter_map(|line| {
            let direction = line.angle_in_degrees as f32 - 90.0;
            (direction.abs() < 45.0).then_some(direction)
        })
        .collect();

    if angles.is_empty() {
        return 0.0;
    }

    angles.sort_by(f32::total_cmp);
    let mid = angles.len() / 2;
    if angles.len() % 2 == 1 {
        angles[mid]
    } else {
        (angles[mid - 1] + angles[mid]) / 2.0
    }
}

fn deskew(frame: RgbImage) -> RgbImage {
    let angle = estimate_skew_degrees(&frame);
    if angle.abs() <= DESKEW_THRESHOLD_DEGREES {
        return frame;
    }
    debug!("Deskewing by {angle:.1} degrees");
    rotate_expanded(&frame, angle)
}

/// Rotate the frame about its centre so the median text-line direction
/// becomes horizontal, expanding the canvas to the rotated bounding box so
/// no content is cropped. New border area is white.
fn rotate_expanded(frame: &RgbImage, skew_degrees: f32) -> RgbImage {
    let theta = -skew_degrees.to_radians();
    let (w, h) = (frame.width() as f32, frame.height() as f32);

    let (sin, cos) = (theta.sin().abs(), theta.cos().abs());
    let new_w = (h * sin + w * cos).ceil() as u32;
    let new_h = (h * cos + w * sin).ceil() as u32;

    let mut out = RgbImage::from_pixel(new_w, new_h, WHITE);
    let projection = Projection::translate(new_w as f32 / 2.0, new_h as f32 / 2.0)
        * Projection::rotate(theta)
        * Projection::translate(-w / 2.0, -h / 2.0);
    warp_into(frame, &projection, Interpolation::Bilinear, WHITE, &mut out);
    out
}

// ── Step 2: upscale ──────────────────────────────────────────────────────

fn upscale(frame: RgbImage) -> RgbImage {
    let (w, h) = frame.dimensions();
    let larger = w.max(h);
    if larger >= MIN_DIMENSION {
        return frame;
    }

    let scale = MIN_DIMENSION as f32 / larger as f32;
    let (new_w, new_h) = if w >= h {
        (MIN_DIMENSION, scale_dim(h, scale))
    } else {
        (scale_dim(w, scale), MIN_DIMENSION)
    };
    debug!("Upscaling from {w}x{h} to {new_w}x{new_h}");
    imageops::resize(&frame, new_w, new_h, FilterType::CatmullRom)
}

fn scale_dim(dim: u32, scale: f32) -> u32 {
    ((dim as f32 * scale).round() as u32).max(1)
}

// ── Step 3: contrast ─────────────────────────────────────────────────────

/// Luma contrast ratio in `[0, 1]`: (max − min) / 255.
pub fn contrast_ratio(frame: &RgbImage) -> f32 {
    let gray = imageops::grayscale(frame);
    let mut min = u8::MAX;
    let mut max = u8::MIN;
    for pixel in gray.pixels() {
        let v = pixel.0[0];
        min = min.min(v);
        max = max.max(v);
    }
    if max < min {
        // Zero-pixel frame; nothing to adjust.
        return 1.0;
    }
    f32::from(max - min) / 255.0
}

fn boost_contrast(frame: RgbImage) -> RgbImage {
    if contrast_ratio(&frame) >= LOW_CONTRAST_RATIO {
        return frame;
    }
    debug!("Applying light contrast enhancement");
    let mut out = frame;
    for pixel in out.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = (f32::from(*channel) * CONTRAST_GAIN + CONTRAST_OFFSET)
                .clamp(0.0, 255.0) as u8;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// White frame with scattered single black pixels: plenty of contrast,
    /// no edges long enough for a Hough vote, nothing to upscale.
    fn quiet_frame(w: u32, h: u32) -> RgbImage {
        let mut img = RgbImage::from_pixel(w, h, WHITE);
        for i in 0..12 {
            let x = (i * 97 + 31) % w;
            let y = (i * 61 + 17) % h;
            img.put_pixel(x, y, Rgb([0, 0, 0]));
        }
        img
    }

    #[test]
    fn preprocess_is_identity_on_clean_large_frame() {
        let frame = quiet_frame(1100, 1050);
        let out = preprocess(frame.clone());
        assert_eq!(out, frame);
    }

    #[test]
    fn skew_estimate_zero_when_no_lines() {
        let frame = quiet_frame(200, 200);
        assert_eq!(estimate_skew_degrees(&frame), 0.0);
    }

    #[test]
    fn upscale_noop_when_larger_dim_at_least_1024() {
        let frame = quiet_frame(1024, 300);
        let out = upscale(frame.clone());
        assert_eq!(out.dimensions(), (1024, 300));
        assert_eq!(out, frame);
    }

    #[test]
    fn upscale_hits_exactly_1024_preserving_aspect() {
        let frame = quiet_frame(500, 250);
        let out = upscale(frame);
        assert_eq!(out.dimensions(), (1024, 512));

        let tall = quiet_frame(100, 400);
        let out = upscale(tall);
        assert_eq!(out.dimensions(), (256, 1024));
    }

    #[test]
    fn contrast_noop_when_ratio_sufficient() {
        let frame = quiet_frame(64, 64); // black on white: ratio 1.0
        let out = boost_contrast(frame.clone());
        assert_eq!(out, frame);
    }

    #[test]
    fn contrast_boost_on_flat_frame() {
        let frame = RgbImage::from_pixel(32, 32, Rgb([100, 100, 100]));
        assert!(contrast_ratio(&frame) < LOW_CONTRAST_RATIO);
        let out = boost_contrast(frame);
        // 100 * 1.1 + 5 = 115
        assert_eq!(out.get_pixel(0, 0).0, [115, 115, 115]);
    }

    #[test]
    fn contrast_boost_clamps_high_values() {
        let frame = RgbImage::from_pixel(8, 8, Rgb([250, 250, 250]));
        let out = boost_contrast(frame);
        assert_eq!(out.get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[test]
    fn rotation_expands_canvas_with_white_fill() {
        let frame = RgbImage::from_pixel(200, 100, Rgb([0, 0, 0]));
        let out = rotate_expanded(&frame, 10.0);
        assert!(out.width() > 200);
        assert!(out.height() > 100);
        // Corners are new border area.
        assert_eq!(*out.get_pixel(0, 0), WHITE);
        assert_eq!(*out.get_pixel(out.width() - 1, out.height() - 1), WHITE);
    }
}
