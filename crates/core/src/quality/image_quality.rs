//! Brightness, contrast and sharpness of a grayscale buffer.
//!
//! All scores are in `[0, 1]` and depend only on the pixel values, so
//! repeated calls on the same buffer return identical results.

use ndarray::{s, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Laplacian variance at which sharpness reaches 0.5.
const SHARPNESS_HALF_POINT: f64 = 100.0;

/// Standard deviation that maps to full contrast.
const CONTRAST_FULL_SCALE: f64 = 127.5;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageQualityParams {
    pub brightness: f64,
    pub contrast: f64,
    pub sharpness: f64,
}

/// Sharpness score `v / (v + 100)` where `v` is the variance of the
/// 4-neighbour Laplacian over interior pixels.
pub fn sharpness(buffer: &[u8], width: usize, height: usize) -> Result<f64, EngineError> {
    let view = grayscale_view(buffer, width, height)?;
    Ok(sharpness_of(&view))
}

pub fn quality_params(
    buffer: &[u8],
    width: usize,
    height: usize,
) -> Result<ImageQualityParams, EngineError> {
    let view = grayscale_view(buffer, width, height)?;
    let n = (width * height) as f64;
    let mean = view.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = view
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;

    Ok(ImageQualityParams {
        brightness: mean / 255.0,
        contrast: (variance.sqrt() / CONTRAST_FULL_SCALE).clamp(0.0, 1.0),
        sharpness: sharpness_of(&view),
    })
}

/// Luma standard deviation, used by the detector's coarse pre-filter.
pub(crate) fn luma_std_dev(view: &ArrayView2<u8>) -> f64 {
    let n = view.len();
    if n == 0 {
        return 0.0;
    }
    let mean = view.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
    let variance = view
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / n as f64;
    variance.sqrt()
}

pub(crate) fn sharpness_of(view: &ArrayView2<u8>) -> f64 {
    let (h, w) = view.dim();
    if h < 3 || w < 3 {
        return 0.0;
    }
    let center = view.slice(s![1..h - 1, 1..w - 1]);
    let up = view.slice(s![0..h - 2, 1..w - 1]);
    let down = view.slice(s![2..h, 1..w - 1]);
    let left = view.slice(s![1..h - 1, 0..w - 2]);
    let right = view.slice(s![1..h - 1, 2..w]);

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    Zip::from(&center)
        .and(&up)
        .and(&down)
        .and(&left)
        .and(&right)
        .for_each(|&c, &u, &d, &l, &r| {
            let lap = 4.0 * c as f64 - u as f64 - d as f64 - l as f64 - r as f64;
            sum += lap;
            sum_sq += lap * lap;
        });

    let n = ((h - 2) * (w - 2)) as f64;
    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0);
    variance / (variance + SHARPNESS_HALF_POINT)
}

fn grayscale_view(buffer: &[u8], width: usize, height: usize) -> Result<ArrayView2<'_, u8>, EngineError> {
    if width == 0 || height == 0 {
        return Err(EngineError::sharpness(format!(
            "image dimensions must be non-zero, got {width}x{height}"
        )));
    }
    let required = width * height;
    if buffer.len() < required {
        return Err(EngineError::sharpness(format!(
            "buffer holds {} bytes, {required} required",
            buffer.len()
        )));
    }
    ArrayView2::from_shape((height, width), &buffer[..required])
        .map_err(|e| EngineError::sharpness(e.to_string()))
}
