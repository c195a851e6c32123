use crate::sensor::OdometrySample;
use std::collections::VecDeque;
use std::f32::consts::PI;

/// Frames of yaw-rate smoothing.
const YAW_RATE_WINDOW: usize = 2;

/* -----------------------------------------------------------------------------
 * EgoMotionState
 * ----------------------------------------------------------------------------- */

/// Per-frame ego-motion estimate derived from platform odometry.
///
/// Holds the unwrapped yaw bearing, the smoothed per-frame yaw rate and the
/// per-frame depth rate (the component of linear twist along the camera
/// axis). All rates are expressed per frame, not per second; when no fresh
/// odometry arrives the previous estimate is reused unchanged.
#[derive(Debug, Clone)]
pub struct EgoMotionState {
    yaw: f32,
    yaw_rate: f32,
    yaw_rate_window: VecDeque<f32>,
    filtered_yaw_rate: f32,
    depth_rate: f32,
}

impl Default for EgoMotionState {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            yaw_rate: 0.0,
            yaw_rate_window: VecDeque::with_capacity(YAW_RATE_WINDOW),
            filtered_yaw_rate: 0.0,
            depth_rate: 0.0,
        }
    }
}

impl EgoMotionState {
    /// Fold one odometry sample into the estimate.
    ///
    /// # Arguments
    /// * `odom` - the fresh platform odometry reading.
    /// * `fps` - current frame rate, used to convert per-second twist rates
    ///   into per-frame rates.
    pub fn apply(&mut self, odom: &OdometrySample, fps: f32) {
        // Unwrap the incoming bearing onto the branch closest to the running
        // yaw so that frame-to-frame deltas stay continuous across +-pi.
        let mut yaw = odom.yaw;
        while yaw - self.yaw > PI {
            yaw -= 2.0 * PI;
        }
        while yaw - self.yaw < -PI {
            yaw += 2.0 * PI;
        }
        self.yaw = yaw;

        self.yaw_rate = odom.yaw_rate / fps;
        if self.yaw_rate_window.len() == YAW_RATE_WINDOW {
            self.yaw_rate_window.pop_front();
        }
        self.yaw_rate_window.push_back(self.yaw_rate);
        self.filtered_yaw_rate = self.yaw_rate_window.iter().sum::<f32>()
            / self.yaw_rate_window.len() as f32;

        // Project the platform-frame linear twist onto the camera axis.
        let forward_speed = odom.vx * self.yaw.cos() + odom.vy * self.yaw.sin();
        self.depth_rate = forward_speed / fps;
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    /// Raw per-frame yaw rate of the latest sample.
    pub fn yaw_rate(&self) -> f32 {
        self.yaw_rate
    }

    /// Windowed mean of the per-frame yaw rate.
    pub fn filtered_yaw_rate(&self) -> f32 {
        self.filtered_yaw_rate
    }

    /// Per-frame change in object depth induced by platform translation.
    pub fn depth_rate(&self) -> f32 {
        self.depth_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nearly_eq::assert_nearly_eq;

    fn sample(yaw: f32, vx: f32, vy: f32, yaw_rate: f32) -> OdometrySample {
        OdometrySample {
            stamp: 0.0,
            yaw,
            vx,
            vy,
            yaw_rate,
        }
    }

    #[test]
    fn test_yaw_unwrap_across_pi() {
        let mut ego = EgoMotionState::default();
        ego.apply(&sample(3.1, 0.0, 0.0, 0.0), 30.0);
        // Wrapped reading just past -pi unwraps to just past +pi.
        ego.apply(&sample(-3.1, 0.0, 0.0, 0.0), 30.0);
        assert_nearly_eq!(ego.yaw(), 2.0 * PI - 3.1, 1e-5);
    }

    #[test]
    fn test_filtered_yaw_rate_is_window_mean() {
        let mut ego = EgoMotionState::default();
        ego.apply(&sample(0.0, 0.0, 0.0, 0.3), 30.0);
        assert_nearly_eq!(ego.filtered_yaw_rate(), 0.01, 1e-6);
        ego.apply(&sample(0.0, 0.0, 0.0, 0.9), 30.0);
        // Mean of 0.01 and 0.03.
        assert_nearly_eq!(ego.filtered_yaw_rate(), 0.02, 1e-6);
        ego.apply(&sample(0.0, 0.0, 0.0, 0.9), 30.0);
        // Window capacity is two, the first sample dropped out.
        assert_nearly_eq!(ego.filtered_yaw_rate(), 0.03, 1e-6);
    }

    #[test]
    fn test_depth_rate_projects_twist_onto_heading() {
        let mut ego = EgoMotionState::default();
        // Heading +90 degrees: only vy contributes to forward speed.
        ego.apply(&sample(PI / 2.0, 5.0, 3.0, 0.0), 30.0);
        assert_nearly_eq!(ego.depth_rate(), 3.0 / 30.0, 1e-5);
    }

    #[test]
    fn test_default_is_at_rest() {
        let ego = EgoMotionState::default();
        assert_eq!(ego.yaw(), 0.0);
        assert_eq!(ego.filtered_yaw_rate(), 0.0);
        assert_eq!(ego.depth_rate(), 0.0);
    }
}
