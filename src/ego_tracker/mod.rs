mod ego_motion;
#[allow(clippy::module_inception)]
mod ego_tracker;
mod kalman_filter;
pub mod matching;
mod motion_model;
mod strack;

pub use ego_motion::EgoMotionState;
pub use ego_tracker::{EgoTracker, TrackerConfig};
pub use motion_model::MotionModel;
pub use strack::{STrack, STrackState};
