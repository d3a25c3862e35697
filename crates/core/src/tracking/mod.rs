pub mod bounds_smoother;
pub mod tracking_session;

pub use tracking_session::{TrackerConfig, TrackingSession, TrackingState};
