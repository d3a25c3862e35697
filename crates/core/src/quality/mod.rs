pub mod image_quality;

pub use image_quality::{quality_params, sharpness, ImageQualityParams};
