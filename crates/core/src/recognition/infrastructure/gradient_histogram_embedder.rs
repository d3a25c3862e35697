//! Model-free descriptor for V16 templates.
//!
//! The aligned crop's luma is split into a 4×4 grid; each cell accumulates a
//! magnitude-weighted histogram of 8 gradient orientations, giving 128
//! values that are L2-normalized as a whole.

use std::f32::consts::PI;

use ndarray::Array3;

use crate::error::BackendError;
use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::recognition::domain::face_template::{l2_normalize, V16_DIMENSION};
use crate::shared::frame::Frame;

const GRID: usize = 4;
const BINS: usize = 8;

#[derive(Clone, Copy, Debug, Default)]
pub struct GradientHistogramEmbedder;

impl FaceEmbedder for GradientHistogramEmbedder {
    fn dimension(&self) -> usize {
        V16_DIMENSION
    }

    fn embed(&self, crop: &Frame) -> Result<Vec<f32>, BackendError> {
        let luma = crop.luma_array();
        let (h, w) = luma.dim();
        if h < 3 || w < 3 {
            return Err(format!("face crop {w}x{h} is too small for gradients").into());
        }

        let mut hist = Array3::<f32>::zeros((GRID, GRID, BINS));
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let gx = luma[[y, x + 1]] as f32 - luma[[y, x - 1]] as f32;
                let gy = luma[[y + 1, x]] as f32 - luma[[y - 1, x]] as f32;
                let magnitude = (gx * gx + gy * gy).sqrt();
                if magnitude == 0.0 {
                    continue;
                }
                let angle = gy.atan2(gx) + PI;
                let bin = ((angle / (2.0 * PI) * BINS as f32) as usize).min(BINS - 1);
                hist[[y * GRID / h, x * GRID / w, bin]] += magnitude;
            }
        }

        let mut values: Vec<f32> = hist.iter().copied().collect();
        if values.iter().all(|&v| v == 0.0) {
            return Err("face crop has no gradient energy".into());
        }
        l2_normalize(&mut values);
        Ok(values)
    }
}
