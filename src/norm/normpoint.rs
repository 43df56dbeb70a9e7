use serde::{
    Deserialize,
    Serialize
};

use crate::math::curve::point2d::Point2D;

/// Absolute per-coordinate tolerance used wherever two norm points are
/// compared for equality.
pub const POINT_TOLERANCE: f64 = 1e-9;

/// One empirical sample of a norm: expected specific consumption at a load.
///
/// Serialized as a `[load, energy]` pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct NormPoint {
    load: f64,
    energy: f64,
}

impl NormPoint {
    pub fn new(load: f64, energy: f64) -> NormPoint {
        NormPoint { load, energy }
    }

    pub fn load(&self) -> f64 {
        self.load
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }

    pub fn is_positive(&self) -> bool {
        self.load.is_finite() && self.energy.is_finite() && self.load > 0.0 && self.energy > 0.0
    }

    pub fn approx_eq(&self, other: &NormPoint) -> bool {
        (self.load - other.load).abs() <= POINT_TOLERANCE
            && (self.energy - other.energy).abs() <= POINT_TOLERANCE
    }
}

impl PartialEq for NormPoint {
    fn eq(&self, other: &NormPoint) -> bool {
        self.approx_eq(other)
    }
}

impl From<(f64, f64)> for NormPoint {
    fn from((load, energy): (f64, f64)) -> NormPoint {
        NormPoint::new(load, energy)
    }
}

impl From<NormPoint> for (f64, f64) {
    fn from(point: NormPoint) -> (f64, f64) {
        (point.load, point.energy)
    }
}

impl From<&NormPoint> for Point2D {
    fn from(point: &NormPoint) -> Point2D {
        Point2D::new(point.load, point.energy)
    }
}
