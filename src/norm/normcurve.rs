use std::hash::Hasher;

use fnv::FnvHasher;
use serde::Serialize;

use crate::math::curve::point2d::Point2D;
use crate::norm::normpoint::NormPoint;

/// Empirical norm curve: samples ordered by load plus descriptive metadata.
///
/// The interpolation function derived from the samples is not stored here;
/// see `InterpolationCache`, which keys it on [`NormCurve::fingerprint`]
/// and orders snapshots by [`NormCurve::generation`].
#[derive(Debug, Clone, Serialize)]
pub struct NormCurve {
    points: Vec<NormPoint>,
    norm_type: String,
    description: String,
    #[serde(skip)]
    generation: u64,
}

impl NormCurve {
    pub fn new(points: Vec<NormPoint>, norm_type: String, description: String) -> NormCurve {
        NormCurve {
            points: sort_points(points),
            norm_type,
            description,
            generation: 0,
        }
    }

    pub fn points(&self) -> &[NormPoint] {
        &self.points
    }

    pub fn norm_type(&self) -> &str {
        &self.norm_type
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Store-assigned revision of the sample set; 0 for curves built outside
    /// a store. A later point update always carries a larger value.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn load_range(&self) -> Option<(f64, f64)> {
        let first = self.points.first()?;
        let last = self.points.last()?;
        Some((first.load(), last.load()))
    }

    /// Multiset equality of the samples within `POINT_TOLERANCE`.
    pub fn same_points(&self, points: &[NormPoint]) -> bool {
        if self.points.len() != points.len() {
            return false;
        }
        // 逐點配對：load 差在容差內時排序不可靠，不能直接 zip
        let mut matched = vec![false; self.points.len()];
        points.iter().all(|incoming| {
            let found = self
                .points
                .iter()
                .enumerate()
                .position(|(index, stored)| !matched[index] && stored.approx_eq(incoming));
            match found {
                Some(index) => {
                    matched[index] = true;
                    true
                }
                None => false,
            }
        })
    }

    /// Content hash of the sample set. Two curves with bitwise identical
    /// samples share a fingerprint; metadata does not take part.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = FnvHasher::default();
        hasher.write_usize(self.points.len());
        for point in &self.points {
            hasher.write_u64(normalized_bits(point.load()));
            hasher.write_u64(normalized_bits(point.energy()));
        }
        hasher.finish()
    }

    pub(crate) fn with_metadata(&self, norm_type: String, description: String) -> NormCurve {
        NormCurve {
            points: self.points.clone(),
            norm_type,
            description,
            generation: self.generation,
        }
    }

    pub(crate) fn with_generation(mut self, generation: u64) -> NormCurve {
        self.generation = generation;
        self
    }
}

// generation 只是快照的版本號，不算內容
impl PartialEq for NormCurve {
    fn eq(&self, other: &Self) -> bool {
        self.points == other.points
            && self.norm_type == other.norm_type
            && self.description == other.description
    }
}

fn sort_points(points: Vec<NormPoint>) -> Vec<NormPoint> {
    let mut points = points;
    points.sort_by(|lhs, rhs| Point2D::cmp_by_x(&Point2D::from(lhs), &Point2D::from(rhs)));
    points
}

// -0.0 和 0.0 視為相同
fn normalized_bits(value: f64) -> u64 {
    if value == 0.0 { 0.0_f64.to_bits() } else { value.to_bits() }
}
