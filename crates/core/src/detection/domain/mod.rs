pub mod detection_options;
pub mod face;
pub mod face_geometry_provider;
pub mod face_landmarks;
