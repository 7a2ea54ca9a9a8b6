//! Band photograph collaborators.
//!
//! The photo of the dispersed band is used twice: a bright-vs-dark verdict
//! that steers mode selection, and a synthetic capture taken from its
//! brightest rows.

use std::path::Path;

use anyhow::{bail, Context, Result};
use image::{GrayImage, RgbImage};

use crate::analysis::mode::{BandHint, HintDirection};
use crate::analysis::stats;
use crate::data::model::{RawCapture, Signal};

const HINT_STRIP_ROWS: u32 = 50;
const CAPTURE_HALF_ROWS: u32 = 20;
const CAPTURE_PERCENTILE: f64 = 95.0;

// ---------------------------------------------------------------------------
// Mode hint
// ---------------------------------------------------------------------------

/// Emission/absorption hint for a band photo. An unreadable image gives no
/// hint rather than an error.
pub fn band_hint(path: &Path) -> BandHint {
    match image::open(path) {
        Ok(img) => hint_from_luma(&img.to_luma8()),
        Err(err) => {
            log::warn!("band image {} unreadable, no mode hint: {err}", path.display());
            BandHint::NONE
        }
    }
}

/// Classify a 50-row strip around the centre row.
pub fn hint_from_luma(img: &GrayImage) -> BandHint {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return BandHint::NONE;
    }
    let row = height / 2;
    let r0 = row.saturating_sub(HINT_STRIP_ROWS / 2);
    let r1 = (row + HINT_STRIP_ROWS / 2 + 1).min(height);
    let strip: Vec<f64> = (r0..r1)
        .flat_map(|y| (0..width).map(move |x| f64::from(img.get_pixel(x, y)[0])))
        .collect();
    let hint = classify_strip(&strip);
    log::debug!("band hint {hint:?} from rows {r0}..{r1}");
    hint
}

/// Bright-vs-dark heuristic on 8-bit gray levels.
///
/// Lines brighter than a dark median lean emission; lines darker than a
/// bright median lean absorption. A mostly black field with a few lit
/// columns is emission with at least 0.35 confidence.
pub fn classify_strip(strip: &[f64]) -> BandHint {
    if strip.is_empty() {
        return BandHint::NONE;
    }
    let sorted = stats::sorted(strip);
    let p5 = stats::percentile_sorted(&sorted, 5.0);
    let med = stats::percentile_sorted(&sorted, 50.0);
    let p95 = stats::percentile_sorted(&sorted, 95.0);

    let up = (p95 - med).max(0.0);
    let down = (med - p5).max(0.0);
    let n = strip.len() as f64;
    let fraction =
        |pred: &dyn Fn(f64) -> bool| strip.iter().filter(|&&v| pred(v)).count() as f64 / n;
    let hi_thr = med + 0.6 * up;
    let lo_thr = (med - 0.6 * down).max(0.0);
    let bright_frac = fraction(&|v: f64| v > hi_thr);
    let dark_frac = fraction(&|v: f64| v < lo_thr);

    if up > 1.8 * down && med <= p95 * 0.7 {
        let score =
            ((up / (down + 1e-6) - 1.8) / 1.5 + 0.5).min(1.0) * (1.0 - bright_frac.min(0.6));
        return BandHint::new(HintDirection::Emission, score.max(0.25));
    }
    if down > 1.8 * up && med >= p95 * 0.6 {
        let score = ((down / (up + 1e-6) - 1.8) / 1.5 + 0.5).min(1.0) * (1.0 - dark_frac.min(0.7));
        return BandHint::new(HintDirection::Absorption, score.max(0.25));
    }

    if med < 60.0 && p95 > 140.0 {
        let score = ((p95 - med) / 200.0).min(1.0) * (1.0 - bright_frac.min(0.6));
        return BandHint::new(HintDirection::Emission, score);
    }
    if med > 120.0 && p5 < 60.0 {
        let score = ((med - p5) / 200.0).min(1.0) * (1.0 - dark_frac.min(0.7));
        return BandHint::new(HintDirection::Absorption, score);
    }

    let lit = fraction(&|v: f64| v > p5 + 10.0);
    if med <= 5.0 && lit < 0.25 && (p95 - med) > 10.0 {
        let score = ((0.25 - lit) / 0.25).min(1.0) + ((p95 - med) / 80.0).min(0.5);
        return BandHint::new(HintDirection::Emission, score.min(1.0).max(0.35));
    }

    BandHint::NONE
}

// ---------------------------------------------------------------------------
// Capture from the photo
// ---------------------------------------------------------------------------

/// Read a band photo and turn it into a capture.
pub fn capture_from_band(path: &Path) -> Result<RawCapture> {
    let img = image::open(path)
        .with_context(|| format!("opening band image {}", path.display()))?
        .to_rgb8();
    capture_from_rgb(&img)
}

/// Per-column 95th percentile of R, G and B over the brightest row ±20.
///
/// Pixels are column indices; there is no wavelength column, so the
/// factory calibration applies.
pub fn capture_from_rgb(img: &RgbImage) -> Result<RawCapture> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        bail!("band image is empty");
    }

    let row_means: Vec<f64> = (0..height)
        .map(|y| {
            let sum: f64 = (0..width)
                .map(|x| {
                    let [r, g, b] = img.get_pixel(x, y).0;
                    f64::from(r) + f64::from(g) + f64::from(b)
                })
                .sum();
            sum / (3.0 * f64::from(width))
        })
        .collect();
    let brightest = stats::argmax(&row_means).unwrap_or(0) as u32;
    let y0 = brightest.saturating_sub(CAPTURE_HALF_ROWS);
    let y1 = (brightest + CAPTURE_HALF_ROWS + 1).min(height);

    let mut rgb = Vec::with_capacity(width as usize);
    for x in 0..width {
        let mut sample = [0.0; 3];
        for (c, slot) in sample.iter_mut().enumerate() {
            let column: Vec<f64> = (y0..y1)
                .map(|y| f64::from(img.get_pixel(x, y)[c]))
                .collect();
            *slot = stats::percentile(&column, CAPTURE_PERCENTILE);
        }
        rgb.push(sample);
    }
    log::debug!("band capture: {width} columns from rows {y0}..{y1}");

    Ok(RawCapture {
        pixel: (0..width).map(f64::from).collect(),
        wavelength: None,
        signal: Signal::Rgb(rgb),
    })
}
