use crate::math::curve::curve::Curve;
use crate::math::curve::point2d::Point2D;

// ─────────────────────────────────────────────
// Polynomial
// ─────────────────────────────────────────────
//
// Horner 形式，係數由高次到低次：
//   P(x) = c[0]*(x-x0)^n + ... + c[n-1]*(x-x0) + c[n]
//
// 只用於低階的退化情況（常數、兩點直線）。

#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    coefs: Vec<f64>,
    lhs_x: f64,
}

impl Polynomial {
    pub fn constant(value: f64) -> Polynomial {
        Polynomial { coefs: vec![value], lhs_x: 0.0 }
    }

    /// Straight line through two points with distinct x.
    pub fn linear_through(lhs_pt: &Point2D, rhs_pt: &Point2D) -> Polynomial {
        Polynomial {
            coefs: vec![Point2D::slope(lhs_pt, rhs_pt), lhs_pt.y()],
            lhs_x: lhs_pt.x(),
        }
    }

    pub fn order(&self) -> usize {
        self.coefs.len() - 1
    }

    pub fn is_finite(&self) -> bool {
        self.lhs_x.is_finite() && self.coefs.iter().all(|c| c.is_finite())
    }
}

impl Curve for Polynomial {
    fn value(&self, x: f64) -> f64 {
        let x_diff = x - self.lhs_x;
        let mut result = self.coefs[0];
        for &beta in &self.coefs[1..] {
            result = f64::mul_add(result, x_diff, beta);
        }
        result
    }
}
