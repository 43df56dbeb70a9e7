use std::fmt;

use serde::Serialize;

use crate::error::InterpolationError;
use crate::math::curve::curve::Curve;
use crate::norm::normpoint::NormPoint;

/// Which construction produced an [`InterpolationFunction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationStrategy {
    /// Single sample, returned for every load.
    Constant,
    /// Exact `A/x + B` through two samples.
    TwoPointHyperbola,
    /// Two samples at the same load; mean of their energies.
    TwoPointMean,
    /// Straight line between two samples after the hyperbola solve failed.
    TwoPointLinear,
    /// Least-squares `A/x + B` over three or more samples.
    LeastSquaresHyperbola,
    /// Two lowest-load samples after the least-squares fit failed.
    FallbackHyperbola,
}

impl InterpolationStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            InterpolationStrategy::Constant              => "constant",
            InterpolationStrategy::TwoPointHyperbola     => "two-point hyperbola",
            InterpolationStrategy::TwoPointMean          => "two-point mean",
            InterpolationStrategy::TwoPointLinear        => "two-point linear",
            InterpolationStrategy::LeastSquaresHyperbola => "least-squares hyperbola",
            InterpolationStrategy::FallbackHyperbola     => "fallback hyperbola",
        }
    }
}

impl fmt::Display for InterpolationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Continuous norm function built from a point set.
///
/// Total over `f64`: any load that is not strictly positive (NaN included)
/// evaluates to the sentinel, the lowest sampled energy.
pub struct InterpolationFunction {
    curve: Box<dyn Curve>,
    strategy: InterpolationStrategy,
    coefficients: Option<(f64, f64)>,
    sentinel: f64,
    load_range: (f64, f64),
    point_count: usize,
    fallback_cause: Option<InterpolationError>,
}

impl InterpolationFunction {
    pub(crate) fn new(
        curve: Box<dyn Curve>,
        strategy: InterpolationStrategy,
        coefficients: Option<(f64, f64)>,
        sentinel: f64,
        load_range: (f64, f64),
        point_count: usize,
    ) -> InterpolationFunction {
        InterpolationFunction {
            curve,
            strategy,
            coefficients,
            sentinel,
            load_range,
            point_count,
            fallback_cause: None,
        }
    }

    pub(crate) fn with_fallback_cause(mut self, cause: InterpolationError) -> InterpolationFunction {
        self.fallback_cause = Some(cause);
        if self.strategy == InterpolationStrategy::TwoPointHyperbola {
            self.strategy = InterpolationStrategy::FallbackHyperbola;
        }
        self
    }

    pub(crate) fn widen_load_range(&mut self, load_range: (f64, f64)) {
        self.load_range = (
            self.load_range.0.min(load_range.0),
            self.load_range.1.max(load_range.1),
        );
    }

    pub fn value(&self, load: f64) -> f64 {
        if !(load > 0.0) {
            return self.sentinel;
        }
        self.curve.value(load)
    }

    pub fn strategy(&self) -> InterpolationStrategy {
        self.strategy
    }

    /// `(A, B)` of `A/x + B` for the hyperbola strategies.
    pub fn coefficients(&self) -> Option<(f64, f64)> {
        self.coefficients
    }

    pub fn sentinel(&self) -> f64 {
        self.sentinel
    }

    pub fn load_range(&self) -> (f64, f64) {
        self.load_range
    }

    pub fn point_count(&self) -> usize {
        self.point_count
    }

    /// Why the preferred strategy was abandoned, if it was.
    pub fn fallback_cause(&self) -> Option<&InterpolationError> {
        self.fallback_cause.as_ref()
    }

    /// True when a fallback step produced this function.
    pub fn is_degraded(&self) -> bool {
        self.fallback_cause.is_some()
            || matches!(
                self.strategy,
                InterpolationStrategy::TwoPointMean
                    | InterpolationStrategy::TwoPointLinear
                    | InterpolationStrategy::FallbackHyperbola
            )
    }

    /// Root-mean-square residual against the given samples.
    pub fn residual_rms(&self, points: &[NormPoint]) -> Option<f64> {
        if points.is_empty() {
            return None;
        }
        let sum_sq: f64 = points
            .iter()
            .map(|pt| {
                let residual = self.value(pt.load()) - pt.energy();
                residual * residual
            })
            .sum();
        Some((sum_sq / points.len() as f64).sqrt())
    }
}

impl fmt::Debug for InterpolationFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterpolationFunction")
            .field("strategy", &self.strategy)
            .field("coefficients", &self.coefficients)
            .field("sentinel", &self.sentinel)
            .field("load_range", &self.load_range)
            .field("point_count", &self.point_count)
            .field("fallback_cause", &self.fallback_cause)
            .finish()
    }
}
