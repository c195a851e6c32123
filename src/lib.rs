//! Multi-object tracking for cameras mounted on a moving platform.
//!
//! Detector output is associated frame to frame with a cascaded matcher that
//! fuses Kalman motion prediction, ReID appearance and IoU. The motion model
//! is extended with vehicle ego-motion controls (yaw rate, depth rate and
//! per-object depth) so that prediction stays accurate while the platform
//! itself turns and translates, and track states can additionally be warped
//! by an external camera global-motion estimate.

pub mod ego_tracker;
pub mod error;
mod lapjv;
pub mod object;
pub mod rect;
pub mod sensor;

pub use crate::ego_tracker::{EgoTracker, STrackState, TrackerConfig};
pub use crate::error::TrackError;
pub use crate::object::Object;
pub use crate::rect::Rect;
pub use crate::sensor::{
    CameraMotionEstimator, CameraTransform, DepthFrame, Feature, FeatureExtractor, Frame,
    OdometrySample,
};
