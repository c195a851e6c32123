use nalgebra::{Matrix1x4, Scalar};
use num::Float;
use std::fmt::Debug;

/* ------------------------------------------------------------------------------
 * Type aliases
 * ------------------------------------------------------------------------------ */
pub type Xywh<T> = Matrix1x4<T>;

/* ------------------------------------------------------------------------------
 * Rect struct
 * ------------------------------------------------------------------------------ */
#[derive(Debug, Clone, PartialEq)]
pub struct Rect<T>
where
    T: Float + Scalar,
{
    tlwh: Matrix1x4<T>,
}

impl<T> Rect<T>
where
    T: Float + Scalar,
{
    pub fn new(x: T, y: T, width: T, height: T) -> Self {
        let tlwh = Matrix1x4::new(x, y, width, height);
        Self { tlwh }
    }

    #[inline(always)]
    pub fn x(&self) -> T {
        self.tlwh[(0, 0)]
    }

    #[inline(always)]
    pub fn set_x(&mut self, x: T) {
        self.tlwh[(0, 0)] = x;
    }

    #[inline(always)]
    pub fn y(&self) -> T {
        self.tlwh[(0, 1)]
    }

    #[inline(always)]
    pub fn set_y(&mut self, y: T) {
        self.tlwh[(0, 1)] = y;
    }

    #[inline(always)]
    pub fn width(&self) -> T {
        self.tlwh[(0, 2)]
    }

    #[inline(always)]
    pub fn set_width(&mut self, width: T) {
        self.tlwh[(0, 2)] = width;
    }

    #[inline(always)]
    pub fn height(&self) -> T {
        self.tlwh[(0, 3)]
    }

    #[inline(always)]
    pub fn set_height(&mut self, height: T) {
        self.tlwh[(0, 3)] = height;
    }

    pub fn area(&self) -> T {
        (self.tlwh[(0, 2)] + T::one()) * (self.tlwh[(0, 3)] + T::one())
    }

    pub fn calc_iou(&self, other: &Rect<T>) -> T {
        let box_area = other.area();
        let iw = (self.tlwh[(0, 0)] + self.tlwh[(0, 2)])
            .min(other.tlwh[(0, 0)] + other.tlwh[(0, 2)])
            - (self.tlwh[(0, 0)]).max(other.tlwh[(0, 0)])
            + T::one();

        let mut iou = T::zero();
        if iw > T::zero() {
            let ih = (self.tlwh[(0, 1)] + self.tlwh[(0, 3)])
                .min(other.tlwh[(0, 1)] + other.tlwh[(0, 3)])
                - (self.tlwh[(0, 1)]).max(other.tlwh[(0, 1)])
                + T::one();

            if ih > T::zero() {
                let ua = (self.tlwh[(0, 2)] + T::one())
                    * (self.tlwh[(0, 3)] + T::one())
                    + box_area
                    - iw * ih;
                iou = iw * ih / ua;
            }
        }
        iou
    }

    /// Get the box as `(center x, center y, width, height)`, the Kalman
    /// measurement format.
    pub fn get_xywh(&self) -> Xywh<T> {
        let two = T::from(2).unwrap();
        Matrix1x4::new(
            self.tlwh[(0, 0)] + self.tlwh[(0, 2)] / two,
            self.tlwh[(0, 1)] + self.tlwh[(0, 3)] / two,
            self.tlwh[(0, 2)],
            self.tlwh[(0, 3)],
        )
    }

    /// Get bounding box as [x1, y1, x2, y2] format
    pub fn get_xyxy(&self) -> [T; 4] {
        [
            self.tlwh[(0, 0)],
            self.tlwh[(0, 1)],
            self.tlwh[(0, 0)] + self.tlwh[(0, 2)],
            self.tlwh[(0, 1)] + self.tlwh[(0, 3)],
        ]
    }

    /// Create Rect from [x1, y1, x2, y2] format
    pub fn from_xyxy(x1: T, y1: T, x2: T, y2: T) -> Self {
        Self::new(x1, y1, x2 - x1, y2 - y1)
    }

    /// Create Rect from (center x, center y, width, height)
    pub fn from_xywh(cx: T, cy: T, w: T, h: T) -> Self {
        let two = T::from(2).unwrap();
        Self::new(cx - w / two, cy - h / two, w, h)
    }

    /// Clamp the box into `[0, width] x [0, height]`, scrubbing NaN and
    /// negative coordinates to zero first. Used before cutting image crops
    /// or depth regions.
    pub fn clamped_to(&self, width: T, height: T) -> Rect<T> {
        let scrub = |v: T| if v.is_nan() || v < T::zero() { T::zero() } else { v };
        let x1 = scrub(self.tlwh[(0, 0)]).min(width);
        let y1 = scrub(self.tlwh[(0, 1)]).min(height);
        let x2 = scrub(self.tlwh[(0, 0)] + self.tlwh[(0, 2)]).min(width);
        let y2 = scrub(self.tlwh[(0, 1)] + self.tlwh[(0, 3)]).min(height);
        Rect::new(x1, y1, (x2 - x1).max(T::zero()), (y2 - y1).max(T::zero()))
    }
}
