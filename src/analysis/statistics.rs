use std::collections::BTreeMap;

use serde::Serialize;

use crate::analysis::deviationclassifier::{
    DeviationBand,
    DeviationStatus
};
use crate::analysis::routesegment::AnalyzedSegment;

/// Flat summary of one analysis run.
///
/// Deviation figures only cover finite deviations; every status and band is
/// present in the count maps, with zero when absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisStatistics {
    pub total: usize,
    /// Segments with a finite deviation.
    pub processed: usize,
    pub status_counts: BTreeMap<DeviationStatus, usize>,
    pub band_counts: BTreeMap<DeviationBand, usize>,
    pub mean_deviation: Option<f64>,
    pub min_deviation: Option<f64>,
    pub max_deviation: Option<f64>,
}

impl AnalysisStatistics {
    pub fn count(&self, status: DeviationStatus) -> usize {
        self.status_counts.get(&status).copied().unwrap_or(0)
    }

    pub fn band_count(&self, band: DeviationBand) -> usize {
        self.band_counts.get(&band).copied().unwrap_or(0)
    }

    /// Share of `status` among all segments, in percent.
    pub fn share(&self, status: DeviationStatus) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.count(status) as f64 / self.total as f64 * 100.0
        }
    }
}

pub fn aggregate(segments: &[AnalyzedSegment]) -> AnalysisStatistics {
    let mut status_counts: BTreeMap<DeviationStatus, usize> =
        DeviationStatus::ALL.iter().map(|status| (*status, 0)).collect();
    let mut band_counts: BTreeMap<DeviationBand, usize> =
        DeviationBand::ALL.iter().map(|band| (*band, 0)).collect();

    for segment in segments {
        *status_counts.entry(segment.status).or_insert(0) += 1;
        *band_counts.entry(segment.status.band()).or_insert(0) += 1;
    }

    // 上游理論上不會給 NaN/∞，這裡仍一律濾掉
    let deviations: Vec<f64> = segments
        .iter()
        .filter_map(|segment| segment.deviation_percent)
        .filter(|deviation| deviation.is_finite())
        .collect();

    let (mean_deviation, min_deviation, max_deviation) = if deviations.is_empty() {
        (None, None, None)
    } else {
        let sum: f64 = deviations.iter().sum();
        let min = deviations.iter().copied().fold(f64::INFINITY, f64::min);
        let max = deviations.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (Some(sum / deviations.len() as f64), Some(min), Some(max))
    };

    AnalysisStatistics {
        total: segments.len(),
        processed: deviations.len(),
        status_counts,
        band_counts,
        mean_deviation,
        min_deviation,
        max_deviation,
    }
}
