pub mod domain;
pub mod face_crop;
pub mod infrastructure;
pub mod template_comparator;
pub mod template_extractor;
pub mod template_generator;
