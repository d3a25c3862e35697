//! Deterministic stand-ins for the ONNX backends, plus synthetic frames.

use std::collections::BTreeMap;
use std::path::Path;

use crate::detection::domain::face::FaceGeometry;
use crate::detection::domain::face_geometry_provider::{FaceGeometryProvider, SearchParams};
use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::error::BackendError;
use crate::recognition::domain::attribute_classifier::AttributeClassifier;
use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::shared::frame::Frame;
use crate::shared::region::Rect;

/// Gray RGB background with enough texture to pass the detection pre-filter.
///
/// Never produces marker pixels (see [`draw_face`]).
pub fn textured_frame(width: u32, height: u32) -> Frame {
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            let v = (60 + (x * 7 + y * 13) % 130) as u8;
            data.extend_from_slice(&[v, v, v]);
        }
    }
    Frame::new(data, width, height, 3)
}

/// Paints a synthetic face: a 2px border of marker pixels `(255, 0, blue)`
/// around a high-contrast checkerboard. [`MarkerFaceProvider`] finds it
/// with bounds exactly `rect` and confidence `blue / 255`.
pub fn draw_face(frame: &mut Frame, rect: Rect, blue: u8) {
    let (fw, fh) = (frame.width() as i64, frame.height() as i64);
    let c = frame.channels() as usize;
    let (x0, y0) = (rect.x as i64, rect.y as i64);
    let (x1, y1) = (x0 + rect.width as i64, y0 + rect.height as i64);
    let data = frame.data_mut();
    for y in y0.max(0)..y1.min(fh) {
        for x in x0.max(0)..x1.min(fw) {
            let border = x - x0 < 2 || y - y0 < 2 || x1 - 1 - x < 2 || y1 - 1 - y < 2;
            let px = if border {
                [255, 0, blue]
            } else if ((x - x0) / 4 + (y - y0) / 4) % 2 == 0 {
                [40, 40, 40]
            } else {
                [210, 210, 210]
            };
            let offset = (y * fw + x) as usize * c;
            data[offset..offset + 3].copy_from_slice(&px);
        }
    }
}

/// Finds faces painted by [`draw_face`], one per distinct blue value.
pub struct MarkerFaceProvider;

impl FaceGeometryProvider for MarkerFaceProvider {
    fn detect(
        &self,
        frame: &Frame,
        params: &SearchParams,
    ) -> Result<Vec<FaceGeometry>, BackendError> {
        if frame.channels() < 3 {
            return Err("marker provider needs a color frame".into());
        }
        let c = frame.channels() as usize;
        let w = frame.width() as usize;
        let mut boxes: BTreeMap<u8, [usize; 4]> = BTreeMap::new();
        for (i, px) in frame.data().chunks_exact(c).enumerate() {
            if px[0] != 255 || px[1] != 0 {
                continue;
            }
            let (x, y) = (i % w, i / w);
            boxes
                .entry(px[2])
                .and_modify(|b| {
                    b[0] = b[0].min(x);
                    b[1] = b[1].min(y);
                    b[2] = b[2].max(x);
                    b[3] = b[3].max(y);
                })
                .or_insert([x, y, x, y]);
        }

        Ok(boxes
            .into_iter()
            .map(|(blue, b)| {
                let bounds = Rect::from_corners([
                    b[0] as f64,
                    b[1] as f64,
                    (b[2] + 1) as f64,
                    (b[3] + 1) as f64,
                ]);
                FaceGeometry {
                    bounds,
                    confidence: blue as f64 / 255.0,
                    landmarks: params.detect_landmarks.then(|| canonical_landmarks(&bounds)),
                    angle: None,
                }
            })
            .filter(|g| g.bounds.short_side() >= params.min_face_size)
            .collect())
    }
}

/// Frontal, level landmarks proportioned to `bounds`.
pub fn canonical_landmarks(bounds: &Rect) -> FaceLandmarks {
    let at = |fx: f64, fy: f64| (bounds.x + fx * bounds.width, bounds.y + fy * bounds.height);
    FaceLandmarks::new([
        at(0.3, 0.4),
        at(0.7, 0.4),
        at(0.5, 0.62),
        at(0.35, 0.8),
        at(0.65, 0.8),
    ])
}

/// 512-dimensional embedder whose output depends only on the crop pixels.
pub struct FakeEmbedder;

impl FaceEmbedder for FakeEmbedder {
    fn dimension(&self) -> usize {
        512
    }

    fn embed(&self, crop: &Frame) -> Result<Vec<f32>, BackendError> {
        let luma = crop.luma();
        if luma.is_empty() {
            return Err("empty crop".into());
        }
        let mut values: Vec<f32> = (0..512)
            .map(|i| luma[(i * 7919) % luma.len()] as f32 / 255.0 + 0.01 * ((i % 5) + 1) as f32)
            .collect();
        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        values.iter_mut().for_each(|v| *v /= norm);
        Ok(values)
    }
}

/// Reports a fixed mask probability.
pub struct FakeClassifier(pub f64);

impl AttributeClassifier for FakeClassifier {
    fn mask_probability(&self, _crop: &Frame) -> Result<f64, BackendError> {
        Ok(self.0)
    }
}

/// Creates empty placeholder files named `names` in `dir`.
pub fn touch_models(dir: &Path, names: &[&str]) {
    for name in names {
        std::fs::write(dir.join(name), b"").unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_provider_finds_drawn_faces() {
        let mut frame = textured_frame(100, 100);
        draw_face(&mut frame, Rect::new(10.0, 12.0, 30.0, 34.0), 200);
        let params = SearchParams {
            min_face_size: 0.0,
            detect_landmarks: true,
        };
        let found = MarkerFaceProvider.detect(&frame, &params).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].bounds, Rect::new(10.0, 12.0, 30.0, 34.0));
        assert!(found[0].landmarks.is_some());
    }

    #[test]
    fn test_textured_frame_has_no_markers() {
        let params = SearchParams {
            min_face_size: 0.0,
            detect_landmarks: false,
        };
        let found = MarkerFaceProvider
            .detect(&textured_frame(64, 64), &params)
            .unwrap();
        assert!(found.is_empty());
    }
}
