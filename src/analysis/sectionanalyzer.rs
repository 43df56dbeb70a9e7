use std::collections::{
    BTreeMap,
    BTreeSet
};
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{
    debug,
    warn
};

use crate::analysis::deviationclassifier::{
    self,
    DeviationStatus
};
use crate::analysis::routesegment::{
    AnalyzedSegment,
    RouteSegment,
    SkippedSegment
};
use crate::error::NormError;
use crate::interpolation::interpolationfunction::InterpolationFunction;

/// Where the analyzer gets norm functions from.
pub trait NormFunctionSource {
    fn norm_function(&self, norm_id: &str) -> Result<Arc<InterpolationFunction>, NormError>;
}

/// Result of analyzing one section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionAnalysis {
    pub section_name: String,
    pub analyzed: Vec<AnalyzedSegment>,
    /// Segments that received a norm value.
    pub interpolated_count: usize,
    pub skipped_count: usize,
    pub skipped: Vec<SkippedSegment>,
    /// Norm ids that could not be resolved, with the reason.
    pub unresolved_norms: BTreeMap<String, String>,
}

pub struct SectionAnalyzer<'a, S: NormFunctionSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: NormFunctionSource + ?Sized> SectionAnalyzer<'a, S> {
    pub fn new(source: &'a S) -> SectionAnalyzer<'a, S> {
        SectionAnalyzer { source }
    }

    /// Analyzes the segments of `section_name`, optionally only those of one
    /// norm. Per-norm and per-segment problems never fail the batch.
    pub fn analyze(
        &self,
        section_name: &str,
        segments: &[RouteSegment],
        norm_id: Option<&str>,
    ) -> SectionAnalysis {
        let selected: Vec<(usize, &RouteSegment)> = segments
            .iter()
            .enumerate()
            .filter(|(_, segment)| segment.section_name == section_name)
            .filter(|(_, segment)| norm_id.is_none_or(|id| segment.norm_id == id))
            .collect();

        let norm_ids: BTreeSet<&str> = match norm_id {
            Some(id) => BTreeSet::from([id]),
            None => selected.iter().map(|(_, segment)| segment.norm_id.as_str()).collect(),
        };

        let mut functions: BTreeMap<&str, Arc<InterpolationFunction>> = BTreeMap::new();
        let mut unresolved_norms = BTreeMap::new();
        for id in norm_ids {
            match self.source.norm_function(id) {
                Ok(function) => {
                    functions.insert(id, function);
                }
                Err(error) => {
                    warn!(section = section_name, norm_id = id, %error, "norm unavailable");
                    unresolved_norms.insert(id.to_owned(), error.to_string());
                }
            }
        }

        let mut analysis = SectionAnalysis {
            section_name: section_name.to_owned(),
            analyzed: Vec::with_capacity(selected.len()),
            interpolated_count: 0,
            skipped_count: 0,
            skipped: Vec::new(),
            unresolved_norms,
        };

        for (index, segment) in selected {
            let Some(function) = functions.get(segment.norm_id.as_str()) else {
                analysis.analyzed.push(unclassified(segment));
                continue;
            };
            match evaluate_segment(segment, function) {
                Ok(analyzed) => {
                    analysis.interpolated_count += 1;
                    analysis.analyzed.push(analyzed);
                }
                Err(reason) => {
                    let skipped = SkippedSegment {
                        index,
                        norm_id: segment.norm_id.clone(),
                        reason,
                    };
                    warn!(section = section_name, index, "{}", skipped.message());
                    analysis.skipped.push(skipped);
                }
            }
        }
        analysis.skipped_count = analysis.skipped.len();

        debug!(
            section = section_name,
            interpolated = analysis.interpolated_count,
            skipped = analysis.skipped_count,
            unresolved = analysis.unresolved_norms.len(),
            "analyzed section"
        );
        analysis
    }
}

impl<'a, S: NormFunctionSource + Sync + ?Sized> SectionAnalyzer<'a, S> {
    /// Every section present in `segments`, analyzed in parallel and ordered
    /// by section name.
    pub fn analyze_all(&self, segments: &[RouteSegment]) -> Vec<SectionAnalysis> {
        section_names(segments)
            .par_iter()
            .map(|name| self.analyze(name, segments, None))
            .collect()
    }
}

/// Distinct section names, sorted.
pub fn section_names(segments: &[RouteSegment]) -> Vec<String> {
    segments
        .iter()
        .map(|segment| segment.section_name.as_str())
        .collect::<BTreeSet<&str>>()
        .into_iter()
        .map(str::to_owned)
        .collect()
}

fn evaluate_segment(
    segment: &RouteSegment,
    function: &InterpolationFunction,
) -> Result<AnalyzedSegment, String> {
    let load = segment.load.parse("load").map_err(|error| error.to_string())?;
    let actual = segment
        .actual_consumption
        .parse("actual consumption")
        .map_err(|error| error.to_string())?;

    let norm_value = function.value(load);
    if !norm_value.is_finite() {
        return Err(format!("norm evaluated to {norm_value} at load {load}"));
    }

    let deviation = deviationclassifier::deviation_percent(actual, norm_value);
    Ok(AnalyzedSegment {
        segment: segment.clone(),
        load: Some(load),
        actual_consumption: Some(actual),
        norm_value: Some(norm_value),
        deviation_percent: deviation,
        status: deviationclassifier::classify_optional(deviation),
    })
}

fn unclassified(segment: &RouteSegment) -> AnalyzedSegment {
    AnalyzedSegment {
        segment: segment.clone(),
        load: segment.load.parse("load").ok(),
        actual_consumption: segment.actual_consumption.parse("actual consumption").ok(),
        norm_value: None,
        deviation_percent: None,
        status: DeviationStatus::Unclassified,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::interpolation::interpolationbuilder;
    use crate::norm::normpoint::NormPoint;

    struct FixedSource {
        functions: HashMap<String, Arc<InterpolationFunction>>,
    }

    impl FixedSource {
        fn new(norms: &[(&str, &[(f64, f64)])]) -> FixedSource {
            let functions = norms
                .iter()
                .map(|(id, raw)| {
                    let points: Vec<NormPoint> = raw.iter().map(|&pt| NormPoint::from(pt)).collect();
                    (id.to_string(), Arc::new(interpolationbuilder::build(&points).unwrap()))
                })
                .collect();
            FixedSource { functions }
        }
    }

    impl NormFunctionSource for FixedSource {
        fn norm_function(&self, norm_id: &str) -> Result<Arc<InterpolationFunction>, NormError> {
            self.functions
                .get(norm_id)
                .cloned()
                .ok_or_else(|| NormError::NormNotFound(norm_id.to_owned()))
        }
    }

    const N1: &[(f64, f64)] = &[(10.0, 100.0), (20.0, 60.0), (30.0, 46.67)];

    #[test]
    fn test_segment_is_evaluated_and_classified() {
        let source = FixedSource::new(&[("N1", N1)]);
        let segments = vec![RouteSegment::new("A-B", "N1", 20.0, 66.0)];
        let analysis = SectionAnalyzer::new(&source).analyze("A-B", &segments, None);

        assert_eq!(analysis.interpolated_count, 1);
        assert_eq!(analysis.skipped_count, 0);
        let analyzed = &analysis.analyzed[0];
        assert!((analyzed.norm_value.unwrap() - 60.0).abs() < 0.01);
        assert!((analyzed.deviation_percent.unwrap() - 10.0).abs() < 0.05);
        assert_eq!(analyzed.status, DeviationStatus::WeakOverrun);
    }

    #[test]
    fn test_other_sections_are_ignored() {
        let source = FixedSource::new(&[("N1", N1)]);
        let segments = vec![
            RouteSegment::new("A-B", "N1", 20.0, 66.0),
            RouteSegment::new("B-C", "N1", 20.0, 66.0),
        ];
        let analysis = SectionAnalyzer::new(&source).analyze("B-C", &segments, None);
        assert_eq!(analysis.analyzed.len(), 1);
        assert_eq!(analysis.analyzed[0].segment.section_name, "B-C");
    }

    #[test]
    fn test_unknown_norm_marks_segments_unclassified() {
        let source = FixedSource::new(&[("N1", N1)]);
        let segments = vec![
            RouteSegment::new("A-B", "N1", 20.0, 60.0),
            RouteSegment::new("A-B", "N404", 20.0, 60.0),
        ];
        let analysis = SectionAnalyzer::new(&source).analyze("A-B", &segments, None);

        assert_eq!(analysis.analyzed.len(), 2);
        assert_eq!(analysis.interpolated_count, 1);
        assert_eq!(analysis.skipped_count, 0);
        let orphan = &analysis.analyzed[1];
        assert_eq!(orphan.status, DeviationStatus::Unclassified);
        assert_eq!(orphan.norm_value, None);
        assert_eq!(orphan.deviation_percent, None);
        assert_eq!(orphan.load, Some(20.0));
        assert!(analysis.unresolved_norms.contains_key("N404"));
    }

    #[test]
    fn test_unparseable_segments_are_skipped() {
        let source = FixedSource::new(&[("N1", N1)]);
        let segments = vec![
            RouteSegment::new("A-B", "N1", "abc", 60.0),
            RouteSegment::new("A-B", "N1", 20.0, "66,0"),
            RouteSegment {
                section_name: "A-B".to_owned(),
                norm_id: "N1".to_owned(),
                load: 20.0.into(),
                actual_consumption: Default::default(),
            },
        ];
        let analysis = SectionAnalyzer::new(&source).analyze("A-B", &segments, None);

        assert_eq!(analysis.interpolated_count, 1);
        assert_eq!(analysis.skipped_count, 2);
        assert_eq!(analysis.skipped[0].index, 0);
        assert_eq!(analysis.skipped[1].index, 2);
        assert!(analysis.skipped[0].message().starts_with("segment skipped: invalid numeric value for load"));
    }

    #[test]
    fn test_norm_filter() {
        let source = FixedSource::new(&[("N1", N1), ("N2", &[(10.0, 50.0)])]);
        let segments = vec![
            RouteSegment::new("A-B", "N1", 20.0, 66.0),
            RouteSegment::new("A-B", "N2", 20.0, 50.0),
        ];
        let analysis = SectionAnalyzer::new(&source).analyze("A-B", &segments, Some("N2"));
        assert_eq!(analysis.analyzed.len(), 1);
        assert_eq!(analysis.analyzed[0].status, DeviationStatus::Normal);
    }

    #[test]
    fn test_non_positive_load_uses_sentinel() {
        let source = FixedSource::new(&[("N1", N1)]);
        let segments = vec![RouteSegment::new("A-B", "N1", 0.0, 46.67)];
        let analysis = SectionAnalyzer::new(&source).analyze("A-B", &segments, None);
        let analyzed = &analysis.analyzed[0];
        assert_eq!(analyzed.norm_value, Some(46.67));
        assert_eq!(analyzed.status, DeviationStatus::Normal);
    }

    #[test]
    fn test_analyze_all_orders_sections() {
        let source = FixedSource::new(&[("N1", N1)]);
        let segments = vec![
            RouteSegment::new("C-D", "N1", 20.0, 66.0),
            RouteSegment::new("A-B", "N1", 20.0, 60.0),
            RouteSegment::new("C-D", "N1", 10.0, 100.0),
        ];
        let analyses = SectionAnalyzer::new(&source).analyze_all(&segments);
        let names: Vec<&str> = analyses.iter().map(|a| a.section_name.as_str()).collect();
        assert_eq!(names, vec!["A-B", "C-D"]);
        assert_eq!(analyses[1].analyzed.len(), 2);
    }
}
