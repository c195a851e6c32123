use nalgebra::SMatrix;

/* -----------------------------------------------------------------------------
 * Type aliases
 * ----------------------------------------------------------------------------- */
// 1x4: (cx, cy, w, h)
pub(crate) type DetectBox = SMatrix<f32, 1, 4>;
// 1x8: (cx, cy, w, h, vx, vy, vw, vh)
pub(crate) type StateMean = SMatrix<f32, 1, 8>;
// 8x8
pub(crate) type StateCov = SMatrix<f32, 8, 8>;
// 1x4
pub(crate) type StateHMean = SMatrix<f32, 1, 4>;
// 4x4
pub(crate) type StateHCov = SMatrix<f32, 4, 4>;
// 1x3: (yaw rate, depth rate, object depth)
pub(crate) type ControlInput = SMatrix<f32, 1, 3>;

/// Chi-square 95% bound for the 4-dof measurement space.
pub(crate) const GATING_THRESHOLD: f32 = 9.4877;
/// Chi-square 95% bound when gating on position only.
pub(crate) const GATING_THRESHOLD_2D: f32 = 5.9915;

/* -----------------------------------------------------------------------------
 * Kalman Filter
 * ----------------------------------------------------------------------------- */

/// Constant-velocity filter over (cx, cy, w, h) extended with ego-motion
/// control inputs.
///
/// The control vector carries the platform's per-frame yaw rate, the
/// per-frame translational depth rate and the object's estimated depth.
/// Camera yaw shifts every pixel by roughly `-focal * yaw_rate`; forward
/// translation makes objects loom, scaling their offset from the image
/// center and their size by `depth_rate / depth`.
///
/// The single-track `predict` and the batched `multi_predict` deliberately
/// take different control shapes (yaw only vs. full control); both call
/// sites exist upstream and must not be collapsed.
#[derive(Debug, Clone)]
pub(crate) struct KalmanFilter {
    std_weight_position: f32,
    std_weight_velocity: f32,
    motion_mat: StateCov,
    update_mat: SMatrix<f32, 4, 8>,
    img_width: f32,
    img_height: f32,
    focal_length: f32,
}

impl KalmanFilter {
    pub(crate) fn new(img_width: f32, img_height: f32, focal_length: f32) -> Self {
        let mut motion_mat = StateCov::identity();
        for i in 0..4 {
            motion_mat[(i, i + 4)] = 1.0;
        }

        let mut update_mat = SMatrix::<f32, 4, 8>::zeros();
        for i in 0..4 {
            update_mat[(i, i)] = 1.0;
        }

        Self {
            std_weight_position: 1.0 / 20.0,
            std_weight_velocity: 1.0 / 160.0,
            motion_mat,
            update_mat,
            img_width,
            img_height,
            focal_length,
        }
    }

    pub(crate) fn initiate(
        &self,
        mean: &mut StateMean,
        covariance: &mut StateCov,
        measurement: &DetectBox,
    ) {
        *mean = StateMean::zeros();
        for i in 0..4 {
            mean[(0, i)] = measurement[(0, i)];
        }

        let w = measurement[(0, 2)];
        let h = measurement[(0, 3)];
        let std = [
            2.0 * self.std_weight_position * w,
            2.0 * self.std_weight_position * h,
            2.0 * self.std_weight_position * w,
            2.0 * self.std_weight_position * h,
            10.0 * self.std_weight_velocity * w,
            10.0 * self.std_weight_velocity * h,
            10.0 * self.std_weight_velocity * w,
            10.0 * self.std_weight_velocity * h,
        ];
        *covariance = StateCov::zeros();
        for i in 0..8 {
            covariance[(i, i)] = std[i] * std[i];
        }
    }

    /// Additive mean shift induced by the ego-motion control inputs.
    fn control_shift(&self, mean: &StateMean, control: &ControlInput) -> StateMean {
        let mut shift = StateMean::zeros();
        shift[(0, 0)] = -self.focal_length * control[(0, 0)];

        let depth = control[(0, 2)];
        if depth > f32::EPSILON {
            let s = control[(0, 1)] / depth;
            shift[(0, 0)] += (mean[(0, 0)] - self.img_width / 2.0) * s;
            shift[(0, 1)] += (mean[(0, 1)] - self.img_height / 2.0) * s;
            shift[(0, 2)] += mean[(0, 2)] * s;
            shift[(0, 3)] += mean[(0, 3)] * s;
        }
        shift
    }

    fn motion_cov(&self, mean: &StateMean) -> StateCov {
        let w = mean[(0, 2)];
        let h = mean[(0, 3)];
        let std = [
            self.std_weight_position * w,
            self.std_weight_position * h,
            self.std_weight_position * w,
            self.std_weight_position * h,
            self.std_weight_velocity * w,
            self.std_weight_velocity * h,
            self.std_weight_velocity * w,
            self.std_weight_velocity * h,
        ];
        let mut q = StateCov::zeros();
        for i in 0..8 {
            q[(i, i)] = std[i] * std[i];
        }
        q
    }

    /// Single-track prediction; takes the filtered yaw rate only.
    pub(crate) fn predict(
        &self,
        mean: &mut StateMean,
        covariance: &mut StateCov,
        yaw_rate: f32,
    ) {
        let control = ControlInput::new(yaw_rate, 0.0, 0.0);
        self.predict_with_control(mean, covariance, &control);
    }

    /// Batched prediction with the full per-track control vector.
    pub(crate) fn multi_predict(
        &self,
        means: &mut [StateMean],
        covariances: &mut [StateCov],
        controls: &[ControlInput],
    ) {
        debug_assert!(means.len() == covariances.len());
        debug_assert!(means.len() == controls.len());
        for i in 0..means.len() {
            self.predict_with_control(&mut means[i], &mut covariances[i], &controls[i]);
        }
    }

    fn predict_with_control(
        &self,
        mean: &mut StateMean,
        covariance: &mut StateCov,
        control: &ControlInput,
    ) {
        let q = self.motion_cov(mean);
        let shift = self.control_shift(mean, control);
        *mean = (self.motion_mat * mean.transpose()).transpose() + shift;
        *covariance =
            self.motion_mat * *covariance * self.motion_mat.transpose() + q;
    }

    fn project(
        &self,
        mean: &StateMean,
        covariance: &StateCov,
    ) -> (StateHMean, StateHCov) {
        let w = mean[(0, 2)];
        let h = mean[(0, 3)];
        let std = [
            self.std_weight_position * w,
            self.std_weight_position * h,
            self.std_weight_position * w,
            self.std_weight_position * h,
        ];
        let mut innovation_cov = StateHCov::zeros();
        for i in 0..4 {
            innovation_cov[(i, i)] = std[i] * std[i];
        }

        let projected_mean = mean * self.update_mat.transpose();
        let projected_cov =
            self.update_mat * covariance * self.update_mat.transpose() + innovation_cov;
        (projected_mean, projected_cov)
    }

    pub(crate) fn update(
        &self,
        mean: &mut StateMean,
        covariance: &mut StateCov,
        measurement: &DetectBox,
    ) {
        let (projected_mean, projected_covariance) = self.project(mean, covariance);

        let b = (*covariance * self.update_mat.transpose()).transpose();
        let cholesky_factor = match projected_covariance.cholesky() {
            Some(c) => c,
            None => {
                log::warn!("singular innovation covariance, skipping measurement update");
                return;
            }
        };
        // kalman_gain holds K^T (4x8).
        let kalman_gain = cholesky_factor.solve(&b);
        let innovation = measurement - projected_mean;
        *mean += innovation * kalman_gain;

        // Joseph form is numerically more stable than P -= K S K^T in f32.
        let k = kalman_gain.transpose(); // 8x4
        let i_minus_kh = StateCov::identity() - k * self.update_mat;
        let innovation_cov = projected_covariance
            - self.update_mat * *covariance * self.update_mat.transpose();
        *covariance = i_minus_kh * *covariance * i_minus_kh.transpose()
            + k * innovation_cov * k.transpose();
    }

    /// Squared Mahalanobis distance from the projected state to each
    /// measurement. Non-invertible innovation covariance gates everything.
    pub(crate) fn gating_distance(
        &self,
        mean: &StateMean,
        covariance: &StateCov,
        measurements: &[DetectBox],
        only_position: bool,
    ) -> Vec<f32> {
        let (projected_mean, projected_cov) = self.project(mean, covariance);

        if only_position {
            let cov2 = projected_cov.fixed_view::<2, 2>(0, 0).into_owned();
            let cholesky = match cov2.cholesky() {
                Some(c) => c,
                None => return vec![f32::MAX; measurements.len()],
            };
            return measurements
                .iter()
                .map(|z| {
                    let d = SMatrix::<f32, 1, 2>::new(
                        z[(0, 0)] - projected_mean[(0, 0)],
                        z[(0, 1)] - projected_mean[(0, 1)],
                    );
                    (d * cholesky.solve(&d.transpose()))[(0, 0)]
                })
                .collect();
        }

        let cholesky = match projected_cov.cholesky() {
            Some(c) => c,
            None => return vec![f32::MAX; measurements.len()],
        };
        measurements
            .iter()
            .map(|z| {
                let d = z - projected_mean;
                (d * cholesky.solve(&d.transpose()))[(0, 0)]
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nearly_eq::assert_nearly_eq;

    fn filter() -> KalmanFilter {
        KalmanFilter::new(960.0, 540.0, 480.0)
    }

    fn initiated(kf: &KalmanFilter, cx: f32, cy: f32, w: f32, h: f32) -> (StateMean, StateCov) {
        let mut mean = StateMean::zeros();
        let mut cov = StateCov::zeros();
        kf.initiate(&mut mean, &mut cov, &DetectBox::new(cx, cy, w, h));
        (mean, cov)
    }

    #[test]
    fn test_initiate_copies_measurement() {
        let kf = filter();
        let (mean, cov) = initiated(&kf, 100.0, 200.0, 50.0, 80.0);
        assert_eq!(mean[(0, 0)], 100.0);
        assert_eq!(mean[(0, 1)], 200.0);
        assert_eq!(mean[(0, 2)], 50.0);
        assert_eq!(mean[(0, 3)], 80.0);
        for i in 4..8 {
            assert_eq!(mean[(0, i)], 0.0);
        }
        assert!(cov[(0, 0)] > 0.0);
    }

    #[test]
    fn test_predict_without_control_keeps_position() {
        let kf = filter();
        let (mut mean, mut cov) = initiated(&kf, 100.0, 200.0, 50.0, 80.0);
        kf.predict(&mut mean, &mut cov, 0.0);
        assert_nearly_eq!(mean[(0, 0)], 100.0, 1e-4);
        assert_nearly_eq!(mean[(0, 1)], 200.0, 1e-4);
    }

    #[test]
    fn test_predict_yaw_control_shifts_x() {
        let kf = filter();
        let (mut mean, mut cov) = initiated(&kf, 100.0, 200.0, 50.0, 80.0);
        kf.predict(&mut mean, &mut cov, 0.01);
        // dx = -focal * yaw_rate = -4.8 px
        assert_nearly_eq!(mean[(0, 0)], 100.0 - 4.8, 1e-3);
        assert_nearly_eq!(mean[(0, 1)], 200.0, 1e-4);
    }

    #[test]
    fn test_multi_predict_looming_grows_box() {
        let kf = filter();
        let (mut mean, mut cov) = initiated(&kf, 600.0, 300.0, 100.0, 100.0);
        let mut means = [mean];
        let mut covs = [cov];
        // Approaching at 1 unit/frame with the object 10 units away.
        let controls = [ControlInput::new(0.0, 1.0, 10.0)];
        kf.multi_predict(&mut means, &mut covs, &controls);
        mean = means[0];
        cov = covs[0];
        let _ = cov;
        // s = 0.1: width grows 10%, center offset from (480, 270) grows 10%.
        assert_nearly_eq!(mean[(0, 2)], 110.0, 1e-3);
        assert_nearly_eq!(mean[(0, 3)], 110.0, 1e-3);
        assert_nearly_eq!(mean[(0, 0)], 600.0 + 12.0, 1e-3);
        assert_nearly_eq!(mean[(0, 1)], 300.0 + 3.0, 1e-3);
    }

    #[test]
    fn test_update_pulls_mean_towards_measurement() {
        let kf = filter();
        let (mut mean, mut cov) = initiated(&kf, 100.0, 100.0, 50.0, 50.0);
        kf.predict(&mut mean, &mut cov, 0.0);
        kf.update(&mut mean, &mut cov, &DetectBox::new(110.0, 100.0, 50.0, 50.0));
        assert!(mean[(0, 0)] > 100.0);
        assert!(mean[(0, 0)] <= 110.0);
    }

    #[test]
    fn test_gating_distance_near_vs_far() {
        let kf = filter();
        let (mut mean, mut cov) = initiated(&kf, 100.0, 100.0, 50.0, 50.0);
        kf.predict(&mut mean, &mut cov, 0.0);
        let dists = kf.gating_distance(
            &mean,
            &cov,
            &[
                DetectBox::new(101.0, 100.0, 50.0, 50.0),
                DetectBox::new(500.0, 400.0, 50.0, 50.0),
            ],
            false,
        );
        assert!(dists[0] < GATING_THRESHOLD);
        assert!(dists[1] > GATING_THRESHOLD);
    }

    #[test]
    fn test_gating_distance_only_position() {
        let kf = filter();
        let (mut mean, mut cov) = initiated(&kf, 100.0, 100.0, 50.0, 50.0);
        kf.predict(&mut mean, &mut cov, 0.0);
        // Same position, wildly different size: position-only gate passes.
        let dists = kf.gating_distance(
            &mean,
            &cov,
            &[DetectBox::new(100.0, 100.0, 500.0, 500.0)],
            true,
        );
        assert!(dists[0] < GATING_THRESHOLD_2D);
    }
}
