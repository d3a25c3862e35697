//! Normalized face crops fed to embedders and attribute classifiers.

use crate::detection::domain::face::Face;
use crate::shared::constants::RECOGNITION_INPUT_SIZE;
use crate::shared::frame::Frame;

/// Crop side relative to the larger side of the face bounds.
pub const CROP_PADDING: f64 = 1.25;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CropOptions {
    /// Rotate the crop so the eye line is level.
    pub align_roll: bool,
    pub equalize_histogram: bool,
}

/// Padded square crop around the face, resampled to the recognition size.
pub fn aligned_face_crop(frame: &Frame, face: &Face, options: &CropOptions) -> Frame {
    let bounds = face.bounds();
    let side = bounds.width.max(bounds.height) * CROP_PADDING;
    let roll = if options.align_roll {
        face.angle().roll
    } else {
        0.0
    };
    let crop = frame.sample_square(bounds.center(), side, roll, RECOGNITION_INPUT_SIZE);
    if options.equalize_histogram {
        equalize_histogram(&crop)
    } else {
        crop
    }
}

/// Histogram equalization driven by luma; the same lookup table is applied
/// to every channel.
pub fn equalize_histogram(frame: &Frame) -> Frame {
    let luma = frame.luma();
    let mut hist = [0usize; 256];
    for &v in &luma {
        hist[v as usize] += 1;
    }
    let total = luma.len();
    let mut cdf = [0usize; 256];
    let mut running = 0;
    for (i, count) in hist.iter().enumerate() {
        running += count;
        cdf[i] = running;
    }
    let cdf_min = cdf.iter().copied().find(|&c| c > 0).unwrap_or(0);
    if total == cdf_min {
        return frame.clone();
    }

    let denom = (total - cdf_min) as f64;
    let lut: Vec<u8> = cdf
        .iter()
        .map(|&c| ((c.saturating_sub(cdf_min)) as f64 / denom * 255.0).round() as u8)
        .collect();
    let data = frame.data().iter().map(|&v| lut[v as usize]).collect();
    Frame::new(data, frame.width(), frame.height(), frame.channels())
}
