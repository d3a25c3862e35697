pub mod attribute_classifier;
pub mod face_embedder;
pub mod face_template;
pub mod recognizable;
