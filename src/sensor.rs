//! Sensor-side data carriers and collaborator traits.
//!
//! The tracker consumes camera frames, depth maps and odometry samples, and
//! delegates ReID feature extraction and camera global-motion estimation to
//! external collaborators behind the traits defined here.

use crate::error::TrackError;
use crate::rect::Rect;
use nalgebra::{DVector, Matrix2x3};

/// Appearance embedding produced by a ReID backend.
pub type Feature = DVector<f32>;

/// Planar camera transform between consecutive frames: a 2x2 rotation block
/// and a 2x1 translation column, `[R | t]`.
pub type CameraTransform = Matrix2x3<f32>;

/// The identity transform (no apparent camera motion).
pub fn identity_transform() -> CameraTransform {
    Matrix2x3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0)
}

/*------------------------------------------------------------------------------
Frame
------------------------------------------------------------------------------*/

/// Owned grayscale camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: usize, height: usize) -> Result<Self, TrackError> {
        if data.len() != width * height {
            return Err(TrackError::InvalidInput(format!(
                "frame buffer is {} bytes, expected {}x{}",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Cut a clamped sub-image. Zero-area regions yield an empty 0x0 frame.
    pub fn crop(&self, rect: &Rect<f32>) -> Frame {
        let r = rect.clamped_to(self.width as f32, self.height as f32);
        let x1 = r.x() as usize;
        let y1 = r.y() as usize;
        let w = r.width() as usize;
        let h = r.height() as usize;
        let mut data = Vec::with_capacity(w * h);
        for row in y1..y1 + h {
            let start = row * self.width + x1;
            data.extend_from_slice(&self.data[start..start + w]);
        }
        Frame {
            data,
            width: w,
            height: h,
        }
    }
}

/*------------------------------------------------------------------------------
DepthFrame
------------------------------------------------------------------------------*/

/// Dense per-pixel depth aligned to the camera frame, already normalized to
/// metric units.
#[derive(Debug, Clone)]
pub struct DepthFrame {
    data: Vec<f32>,
    width: usize,
    height: usize,
}

impl DepthFrame {
    pub fn new(data: Vec<f32>, width: usize, height: usize) -> Result<Self, TrackError> {
        if data.len() != width * height {
            return Err(TrackError::InvalidInput(format!(
                "depth buffer is {} pixels, expected {}x{}",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Build from a raw sensor buffer, dividing every pixel by the sensor's
    /// fixed unit scale.
    pub fn from_raw_scaled(
        data: &[f32],
        width: usize,
        height: usize,
        scale: f32,
    ) -> Result<Self, TrackError> {
        Self::new(data.iter().map(|d| d / scale).collect(), width, height)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Median depth inside the clamped box, ignoring zero and NaN pixels.
    /// Returns `None` when no valid pixel remains.
    pub fn median_in(&self, rect: &Rect<f32>) -> Option<f32> {
        let r = rect.clamped_to(self.width as f32, self.height as f32);
        let x1 = r.x() as usize;
        let y1 = r.y() as usize;
        let x2 = x1 + r.width() as usize;
        let y2 = y1 + r.height() as usize;

        let mut values = Vec::new();
        for row in y1..y2 {
            for col in x1..x2 {
                let d = self.data[row * self.width + col];
                if d != 0.0 && !d.is_nan() {
                    values.push(d);
                }
            }
        }
        if values.is_empty() {
            return None;
        }
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mid = values.len() / 2;
        if values.len() % 2 == 1 {
            Some(values[mid])
        } else {
            Some((values[mid - 1] + values[mid]) / 2.0)
        }
    }
}

/*------------------------------------------------------------------------------
OdometrySample
------------------------------------------------------------------------------*/

/// One platform odometry reading: pose bearing plus linear/angular twist in
/// the platform frame.
#[derive(Debug, Clone, Copy)]
pub struct OdometrySample {
    /// Timestamp in seconds.
    pub stamp: f64,
    /// Yaw bearing in radians.
    pub yaw: f32,
    /// Linear twist x, platform frame.
    pub vx: f32,
    /// Linear twist y, platform frame.
    pub vy: f32,
    /// Angular twist around z.
    pub yaw_rate: f32,
}

/*------------------------------------------------------------------------------
Collaborator traits
------------------------------------------------------------------------------*/

/// ReID appearance embedding backend. Given N crops it returns N fixed-length
/// feature vectors; an empty slice of crops yields an empty result.
pub trait FeatureExtractor {
    fn extract(&mut self, crops: &[Frame]) -> Vec<Feature>;
}

/// Camera global-motion estimator. Given the current frame and detections it
/// returns the planar transform describing apparent camera motion since the
/// previous frame.
pub trait CameraMotionEstimator {
    fn estimate(&mut self, frame: &Frame, detections: &[Rect<f32>]) -> CameraTransform;
}
