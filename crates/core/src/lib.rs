//! Face detection, single-face tracking and template recognition engine.
//!
//! The [`engine::Engine`] facade is the only entry point callers need: it
//! owns the loaded models and exposes detection, tracking, template
//! extraction, comparison and image quality operations over borrowed
//! [`shared::pixel_buffer::PixelBuffer`]s.

pub mod detection;
pub mod engine;
pub mod error;
pub mod quality;
pub mod recognition;
pub mod settings;
pub mod shared;
pub mod tracking;

#[cfg(test)]
pub(crate) mod test_support;

pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, ErrorKind};
pub use settings::Settings;
