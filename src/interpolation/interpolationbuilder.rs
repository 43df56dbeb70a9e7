use tracing::debug;

use crate::error::InterpolationError;
use crate::interpolation::interpolationfunction::{
    InterpolationFunction,
    InterpolationStrategy
};
use crate::math::curve::hyperbola::Hyperbola;
use crate::math::curve::point2d::Point2D;
use crate::math::curve::polynomial::Polynomial;
use crate::norm::normpoint::NormPoint;

/// Loads closer than this are treated as the same load by the two-point rule.
pub const COINCIDENT_LOAD_TOLERANCE: f64 = 1e-12;

// ─────────────────────────────────────────────────────────────────────────────
// 策略選擇（依點數 N）：
//
//   N = 0  → EmptyPointSet
//   N = 1  → 常數
//   N = 2  → 兩點精確雙曲線；同 load → 平均值；解不出 → 直線
//   N ≥ 3  → 最小平方雙曲線；失敗 → 最低兩點的雙曲線（標記為 degraded）
// ─────────────────────────────────────────────────────────────────────────────

/// Builds the norm function for a point set. Input order does not matter.
pub fn build(points: &[NormPoint]) -> Result<InterpolationFunction, InterpolationError> {
    let sorted = Point2D::sorted_by_x(points.iter().map(Point2D::from).collect());
    let sentinel = Point2D::min_y(&sorted).ok_or(InterpolationError::EmptyPointSet)?;

    if sorted.len() == 1 {
        return Ok(build_constant(&sorted[0], sentinel));
    }

    check_positive_loads(&sorted)?;

    let function = if sorted.len() == 2 {
        build_two_point(&sorted[0], &sorted[1], sentinel, 2)
    } else {
        build_least_squares(&sorted, sentinel)
    };
    debug!(
        strategy = %function.strategy(),
        points = sorted.len(),
        degraded = function.is_degraded(),
        "built norm function"
    );
    Ok(function)
}

fn check_positive_loads(sorted: &[Point2D]) -> Result<(), InterpolationError> {
    // sorted 以 total_cmp 排序，NaN 在最後、負值在最前
    for pt in [sorted.first(), sorted.last()].into_iter().flatten() {
        if !(pt.x() > 0.0) || !pt.x().is_finite() {
            return Err(InterpolationError::NonPositiveLoad { load: pt.x() });
        }
    }
    Ok(())
}

fn build_constant(pt: &Point2D, sentinel: f64) -> InterpolationFunction {
    InterpolationFunction::new(
        Box::new(Polynomial::constant(pt.y())),
        InterpolationStrategy::Constant,
        None,
        sentinel,
        (pt.x(), pt.x()),
        1,
    )
}

fn build_two_point(
    lhs_pt: &Point2D,
    rhs_pt: &Point2D,
    sentinel: f64,
    point_count: usize,
) -> InterpolationFunction {
    let load_range = (lhs_pt.x(), rhs_pt.x());

    if (rhs_pt.x() - lhs_pt.x()).abs() <= COINCIDENT_LOAD_TOLERANCE {
        let mean = (lhs_pt.y() + rhs_pt.y()) / 2.0;
        return InterpolationFunction::new(
            Box::new(Polynomial::constant(mean)),
            InterpolationStrategy::TwoPointMean,
            None,
            sentinel,
            load_range,
            point_count,
        );
    }

    match Hyperbola::through(lhs_pt, rhs_pt) {
        Some(hyperbola) => InterpolationFunction::new(
            Box::new(hyperbola),
            InterpolationStrategy::TwoPointHyperbola,
            Some((hyperbola.a(), hyperbola.b())),
            sentinel,
            load_range,
            point_count,
        ),
        None => InterpolationFunction::new(
            Box::new(Polynomial::linear_through(lhs_pt, rhs_pt)),
            InterpolationStrategy::TwoPointLinear,
            None,
            sentinel,
            load_range,
            point_count,
        ),
    }
}

fn build_least_squares(sorted: &[Point2D], sentinel: f64) -> InterpolationFunction {
    let load_range = (sorted[0].x(), sorted[sorted.len() - 1].x());

    match Hyperbola::least_squares(sorted) {
        Ok(hyperbola) => InterpolationFunction::new(
            Box::new(hyperbola),
            InterpolationStrategy::LeastSquaresHyperbola,
            Some((hyperbola.a(), hyperbola.b())),
            sentinel,
            load_range,
            sorted.len(),
        ),
        Err(fit_error) => {
            debug!(error = %fit_error, "least-squares fit failed, using two lowest-load points");
            let mut function = build_two_point(&sorted[0], &sorted[1], sentinel, sorted.len())
                .with_fallback_cause(InterpolationError::SingularFit(fit_error));
            function.widen_load_range(load_range);
            function
        }
    }
}
