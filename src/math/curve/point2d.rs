use std::cmp::Ordering;

/// Sample point of a one-dimensional curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2D {
    x: f64,
    y: f64
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Point2D {
        Point2D { x, y }
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn slope(lhs_pt: &Point2D, rhs_pt: &Point2D) -> f64 {
        (rhs_pt.y - lhs_pt.y) / (rhs_pt.x - lhs_pt.x)
    }

    /// Total order on x first, y second. NaN sorts after every number.
    pub fn cmp_by_x(lhs_pt: &Point2D, rhs_pt: &Point2D) -> Ordering {
        lhs_pt.x
            .total_cmp(&rhs_pt.x)
            .then_with(|| lhs_pt.y.total_cmp(&rhs_pt.y))
    }

    pub fn sorted_by_x(mut points: Vec<Point2D>) -> Vec<Point2D> {
        points.sort_by(Point2D::cmp_by_x);
        points
    }

    /// Smallest y over the slice, `None` for an empty slice.
    pub fn min_y(points: &[Point2D]) -> Option<f64> {
        points
            .iter()
            .map(|pt| pt.y)
            .min_by(|lhs, rhs| lhs.total_cmp(rhs))
    }
}

impl From<(f64, f64)> for Point2D {
    fn from((x, y): (f64, f64)) -> Point2D {
        Point2D::new(x, y)
    }
}
