pub mod domain;
pub mod face_detector;
pub mod infrastructure;
