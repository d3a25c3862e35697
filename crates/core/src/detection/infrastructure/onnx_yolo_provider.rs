/// YOLO-pose face geometry provider using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference, keypoint decoding and NMS.
use std::path::Path;
use std::sync::Mutex;

use crate::detection::domain::face::FaceGeometry;
use crate::detection::domain::face_geometry_provider::{FaceGeometryProvider, SearchParams};
use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::error::BackendError;
use crate::shared::frame::Frame;
use crate::shared::region::Rect;

use super::execution_provider::preferred_execution_providers;
use super::math::nms;

/// Fallback model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Candidates below this score are discarded before NMS.
const MIN_CANDIDATE_SCORE: f64 = 0.1;

const NMS_IOU_THRESH: f64 = 0.45;

/// 5 landmarks × (x, y, conf).
const NUM_KEYPOINT_VALUES: usize = 15;

/// Minimum keypoint confidence to treat a landmark as visible.
const KEYPOINT_CONF_THRESH: f64 = 0.5;

/// Gray fill for letterbox padding (YOLO convention).
const PAD_VALUE: f32 = 114.0 / 255.0;

pub struct OnnxYoloProvider {
    session: Mutex<ort::session::Session>,
    input_size: u32,
}

impl OnnxYoloProvider {
    /// Load a YOLO-pose ONNX model.
    ///
    /// The input resolution is read from the model's NCHW input shape,
    /// falling back to 640 when the shape is dynamic.
    pub fn new(model_path: &Path, multithreaded: bool) -> Result<Self, BackendError> {
        let intra_threads = if multithreaded {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            1
        };
        let session = ort::session::Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .with_execution_providers(preferred_execution_providers())?
            .commit_from_file(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| match input.dtype() {
                ort::value::ValueType::Tensor { shape, .. } if shape.len() >= 4 && shape[2] > 0 => {
                    Some(shape[2] as u32)
                }
                _ => None,
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);
        log::debug!(
            "loaded face detector {} (input {input_size}px)",
            model_path.display()
        );

        Ok(Self {
            session: Mutex::new(session),
            input_size,
        })
    }
}

impl FaceGeometryProvider for OnnxYoloProvider {
    fn detect(
        &self,
        frame: &Frame,
        params: &SearchParams,
    ) -> Result<Vec<FaceGeometry>, BackendError> {
        let (input_tensor, letterbox) = letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let mut session = self
            .session
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();
        if shape.len() != 3 {
            return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
        }
        // [1, features, detections] when transposed, else [1, detections, features]
        let transposed = shape[1] < shape[2];
        let (num_dets, num_feats) = if transposed {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };
        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;

        let mut candidates = Vec::new();
        for i in 0..num_dets {
            let row: Vec<f32> = if transposed {
                (0..num_feats).map(|f| data[f * num_dets + i]).collect()
            } else {
                data[i * num_feats..(i + 1) * num_feats].to_vec()
            };
            if let Some(geometry) = decode_row(&row, &letterbox, params) {
                candidates.push(geometry);
            }
        }
        drop(outputs);
        drop(session);

        let boxes: Vec<([f64; 4], f64)> = candidates
            .iter()
            .map(|g| (g.bounds.corners(), g.confidence))
            .collect();
        let kept = nms(&boxes, NMS_IOU_THRESH);
        Ok(kept.into_iter().map(|i| candidates[i].clone()).collect())
    }
}

/// Mapping from letterboxed model coordinates back to frame coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Letterbox {
    scale: f64,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn to_frame(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.pad_x as f64) / self.scale,
            (y - self.pad_y as f64) / self.scale,
        )
    }
}

/// Row layout: `[cx, cy, w, h, conf, kp0_x, kp0_y, kp0_conf, ...]`.
fn decode_row(row: &[f32], letterbox: &Letterbox, params: &SearchParams) -> Option<FaceGeometry> {
    if row.len() < 5 {
        return None;
    }
    let confidence = row[4] as f64;
    if confidence < MIN_CANDIDATE_SCORE {
        return None;
    }
    let (cx, cy, w, h) = (row[0] as f64, row[1] as f64, row[2] as f64, row[3] as f64);
    let (x1, y1) = letterbox.to_frame(cx - w / 2.0, cy - h / 2.0);
    let (x2, y2) = letterbox.to_frame(cx + w / 2.0, cy + h / 2.0);
    let bounds = Rect::from_corners([x1, y1, x2, y2]);
    if bounds.short_side() < params.min_face_size {
        return None;
    }

    let landmarks = (params.detect_landmarks && row.len() >= 5 + NUM_KEYPOINT_VALUES).then(|| {
        let mut pts = [(0.0f64, 0.0f64); 5];
        for (k, pt) in pts.iter_mut().enumerate() {
            let kconf = row[5 + k * 3 + 2] as f64;
            if kconf >= KEYPOINT_CONF_THRESH {
                *pt = letterbox.to_frame(row[5 + k * 3] as f64, row[5 + k * 3 + 1] as f64);
            }
            // else: stays (0, 0), treated as invisible by FaceLandmarks
        }
        FaceLandmarks::new(pts)
    });

    Some(FaceGeometry {
        bounds,
        confidence,
        landmarks,
        angle: None,
    })
}

/// Letterbox-resize a frame to `target_size` × `target_size`, NCHW float32.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, Letterbox) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    let mut tensor = ndarray::Array4::<f32>::from_elem(
        (1, 3, target_size as usize, target_size as usize),
        PAD_VALUE,
    );

    let src = frame.data();
    let src_w = frame.width() as usize;
    let src_h = frame.height() as usize;
    let c = frame.channels() as usize;

    // Nearest-neighbor resize into the padded region
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let offset = (src_y * src_w + src_x) * c;
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for ch in 0..3 {
                tensor[[0, ch, ty, tx]] = src[offset + ch.min(c - 1)] as f32 / 255.0;
            }
        }
    }

    (
        tensor,
        Letterbox {
            scale,
            pad_x,
            pad_y,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SearchParams {
        SearchParams {
            min_face_size: 0.0,
            detect_landmarks: true,
        }
    }

    #[test]
    fn test_letterbox_preserves_aspect_ratio() {
        // 200x100 → scale 3.2, content 640x320, pad_y 160
        let frame = Frame::new(vec![128u8; 200 * 100 * 3], 200, 100, 3);
        let (tensor, lb) = letterbox(&frame, 640);

        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert!((lb.scale - 3.2).abs() < 0.01);
        assert_eq!(lb.pad_x, 0);
        assert_eq!(lb.pad_y, 160);
    }

    #[test]
    fn test_letterbox_values_normalized() {
        let frame = Frame::new(vec![255u8; 100 * 50 * 3], 100, 50, 3);
        let (tensor, lb) = letterbox(&frame, 640);

        let y = lb.pad_y as usize + 1;
        let x = lb.pad_x as usize + 1;
        assert!((tensor[[0, 0, y, x]] - 1.0).abs() < 0.01);
        assert!((tensor[[0, 0, 0, 0]] - PAD_VALUE).abs() < 0.01);
    }

    #[test]
    fn test_decode_row_maps_back_to_frame() {
        let lb = Letterbox {
            scale: 2.0,
            pad_x: 0,
            pad_y: 100,
        };
        let row = [100.0, 300.0, 40.0, 60.0, 0.9];
        let geometry = decode_row(&row, &lb, &params()).unwrap();
        assert_eq!(geometry.bounds, Rect::new(40.0, 85.0, 20.0, 30.0));
        assert!((geometry.confidence - 0.9).abs() < 1e-6);
        assert!(geometry.landmarks.is_none());
    }

    #[test]
    fn test_decode_row_filters_low_scores_and_small_faces() {
        let lb = Letterbox {
            scale: 1.0,
            pad_x: 0,
            pad_y: 0,
        };
        assert!(decode_row(&[50.0, 50.0, 20.0, 20.0, 0.05], &lb, &params()).is_none());
        let strict = SearchParams {
            min_face_size: 30.0,
            ..params()
        };
        assert!(decode_row(&[50.0, 50.0, 20.0, 20.0, 0.9], &lb, &strict).is_none());
    }

    #[test]
    fn test_decode_row_hides_low_confidence_keypoints() {
        let lb = Letterbox {
            scale: 1.0,
            pad_x: 0,
            pad_y: 0,
        };
        let mut row = vec![50.0f32, 50.0, 20.0, 20.0, 0.9];
        for k in 0..5 {
            let conf = if k == 2 { 0.1 } else { 0.9 };
            row.extend_from_slice(&[40.0 + k as f32, 45.0, conf]);
        }
        let landmarks = decode_row(&row, &lb, &params()).unwrap().landmarks.unwrap();
        assert_eq!(landmarks.points()[0], (40.0, 45.0));
        assert_eq!(landmarks.points()[2], (0.0, 0.0));
    }
}
