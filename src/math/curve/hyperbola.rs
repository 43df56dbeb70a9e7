use nalgebra::{
    Matrix2,
    Vector2
};
use thiserror::Error;

use crate::math::curve::curve::Curve;
use crate::math::curve::point2d::Point2D;

/// Normal equations with |det| below this are treated as singular.
pub const SINGULAR_DETERMINANT: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum HyperbolaFitError {
    #[error("normal equations are singular (determinant {determinant:e})")]
    Singular { determinant: f64 },
    #[error("fit produced non-finite coefficients")]
    NonFinite,
}

// ─────────────────────────────────────────────────────────────────────────────
// Hyperbola：y = A/x + B
// ─────────────────────────────────────────────────────────────────────────────
//
// 以 u = 1/x 線性化後即為 y = A·u + B，兩點可直接解，
// 三點以上用最小平方法解 2×2 normal equations：
//
//   [Σu²  Σu] [A]   [Σ(y·u)]
//   [Σu   n ] [B] = [Σy    ]

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hyperbola {
    a: f64,
    b: f64,
}

impl Hyperbola {
    pub fn new(a: f64, b: f64) -> Hyperbola {
        Hyperbola { a, b }
    }

    pub fn a(&self) -> f64 {
        self.a
    }

    pub fn b(&self) -> f64 {
        self.b
    }

    /// Exact hyperbola through two points. `None` when the solve does not
    /// yield finite coefficients (coincident or degenerate x).
    pub fn through(lhs_pt: &Point2D, rhs_pt: &Point2D) -> Option<Hyperbola> {
        let du = 1.0 / lhs_pt.x() - 1.0 / rhs_pt.x();
        let a = (lhs_pt.y() - rhs_pt.y()) / du;
        let b = lhs_pt.y() - a / lhs_pt.x();
        if a.is_finite() && b.is_finite() {
            Some(Hyperbola { a, b })
        } else {
            None
        }
    }

    pub fn least_squares(points: &[Point2D]) -> Result<Hyperbola, HyperbolaFitError> {
        let mut sum_u = 0.0;
        let mut sum_uu = 0.0;
        let mut sum_yu = 0.0;
        let mut sum_y = 0.0;
        for pt in points {
            let u = 1.0 / pt.x();
            sum_u += u;
            sum_uu += u * u;
            sum_yu += pt.y() * u;
            sum_y += pt.y();
        }
        let n = points.len() as f64;

        let normal = Matrix2::new(
            sum_uu, sum_u,
            sum_u,  n,
        );
        let rhs = Vector2::new(sum_yu, sum_y);

        let determinant = normal.determinant();
        if !determinant.is_finite() || determinant.abs() < SINGULAR_DETERMINANT {
            return Err(HyperbolaFitError::Singular { determinant });
        }

        let solution = normal
            .lu()
            .solve(&rhs)
            .ok_or(HyperbolaFitError::Singular { determinant })?;
        let (a, b) = (solution[0], solution[1]);
        if a.is_finite() && b.is_finite() {
            Ok(Hyperbola { a, b })
        } else {
            Err(HyperbolaFitError::NonFinite)
        }
    }
}

impl Curve for Hyperbola {
    fn value(&self, x: f64) -> f64 {
        self.a / x + self.b
    }
}
