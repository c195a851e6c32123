use crate::ego_tracker::ego_motion::EgoMotionState;
use crate::ego_tracker::kalman_filter::{
    ControlInput, DetectBox, KalmanFilter, StateCov, GATING_THRESHOLD, GATING_THRESHOLD_2D,
};
use crate::ego_tracker::strack::{STrack, STrackState};
use crate::rect::Rect;
use crate::sensor::{CameraTransform, DepthFrame};

/* -----------------------------------------------------------------------------
 * MotionModel
 * ----------------------------------------------------------------------------- */

/// Owns the Kalman filter and applies it to tracks: initiation, prediction
/// with ego-motion controls, measurement updates, camera-motion compensation
/// and gating.
#[derive(Debug, Clone)]
pub struct MotionModel {
    kf: KalmanFilter,
}

impl MotionModel {
    pub fn new(img_width: f32, img_height: f32, focal_length: f32) -> Self {
        Self {
            kf: KalmanFilter::new(img_width, img_height, focal_length),
        }
    }

    pub(crate) fn initiate(&self, track: &mut STrack) {
        let xywh = track.get_rect().get_xywh();
        let mut mean = track.mean;
        let mut covariance = track.covariance;
        self.kf.initiate(&mut mean, &mut covariance, &xywh);
        track.mean = mean;
        track.covariance = covariance;
    }

    pub(crate) fn update(&self, track: &mut STrack, rect: &Rect<f32>) {
        let xywh = rect.get_xywh();
        let mut mean = track.mean;
        let mut covariance = track.covariance;
        self.kf.update(&mut mean, &mut covariance, &xywh);
        track.mean = mean;
        track.covariance = covariance;
    }

    /// Predict a single track one frame ahead. Only the filtered yaw rate is
    /// applied here; the depth-rate terms belong to the batched path.
    pub fn predict(&self, track: &mut STrack, ego: &EgoMotionState) {
        let mut mean = track.mean;
        let mut covariance = track.covariance;
        if track.state != STrackState::Tracked {
            for i in 4..8 {
                mean[(0, i)] = 0.0;
            }
        }
        self.kf
            .predict(&mut mean, &mut covariance, ego.filtered_yaw_rate());
        track.mean = mean;
        track.covariance = covariance;
        track.update_rect();
    }

    /// Predict every track one frame ahead with the full control vector:
    /// filtered yaw rate, depth rate and the per-track estimated depth.
    /// Tracks that are not currently matched coast without learned velocity.
    pub fn predict_all(
        &self,
        tracks: &mut [STrack],
        ego: &EgoMotionState,
        depth: Option<&DepthFrame>,
    ) {
        if tracks.is_empty() {
            return;
        }
        let mut means = Vec::with_capacity(tracks.len());
        let mut covariances = Vec::with_capacity(tracks.len());
        let mut controls = Vec::with_capacity(tracks.len());
        for track in tracks.iter_mut() {
            let mut mean = track.mean;
            if track.state != STrackState::Tracked {
                for i in 4..8 {
                    mean[(0, i)] = 0.0;
                }
            }
            means.push(mean);
            covariances.push(track.covariance);
            controls.push(ControlInput::new(
                ego.filtered_yaw_rate(),
                ego.depth_rate(),
                track.estimated_depth(depth),
            ));
        }
        self.kf.multi_predict(&mut means, &mut covariances, &controls);
        for (i, track) in tracks.iter_mut().enumerate() {
            track.mean = means[i];
            track.covariance = covariances[i];
            track.update_rect();
        }
    }

    /// Warp every track state by the estimated camera transform `[R | t]`.
    /// The rotation block acts on all four (position, size) pairs of the
    /// state and congruence-transforms the covariance; the translation only
    /// moves the center.
    pub fn compensate_camera_motion(&self, tracks: &mut [STrack], transform: &CameraTransform) {
        let mut rot8 = StateCov::zeros();
        for b in 0..4 {
            for i in 0..2 {
                for j in 0..2 {
                    rot8[(2 * b + i, 2 * b + j)] = transform[(i, j)];
                }
            }
        }
        for track in tracks.iter_mut() {
            let mut mean = (rot8 * track.mean.transpose()).transpose();
            mean[(0, 0)] += transform[(0, 2)];
            mean[(0, 1)] += transform[(1, 2)];
            track.mean = mean;
            track.covariance = rot8 * track.covariance * rot8.transpose();
            track.update_rect();
        }
    }

    /// Squared Mahalanobis distance from one track to each detection box.
    pub(crate) fn gating_distance(
        &self,
        track: &STrack,
        measurements: &[DetectBox],
        only_position: bool,
    ) -> Vec<f32> {
        self.kf
            .gating_distance(&track.mean, &track.covariance, measurements, only_position)
    }

    pub(crate) fn gating_threshold(only_position: bool) -> f32 {
        if only_position {
            GATING_THRESHOLD_2D
        } else {
            GATING_THRESHOLD
        }
    }
}
