pub mod flip_averaged_embedder;
pub mod gradient_histogram_embedder;
pub mod onnx_arcface_embedder;
pub mod onnx_mask_classifier;
