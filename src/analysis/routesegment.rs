use serde::{
    Deserialize,
    Serialize
};

use crate::analysis::deviationclassifier::DeviationStatus;
use crate::error::{
    NormError,
    Result
};

/// Raw numeric field of a route segment as delivered by the extraction layer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SegmentValue {
    Number(f64),
    Text(String),
    #[default]
    Missing,
}

impl SegmentValue {
    /// Parses the field. Text accepts a decimal comma and embedded spaces
    /// (`"1 234,5"`); the result must be finite.
    pub fn parse(&self, field: &'static str) -> Result<f64> {
        let invalid = |raw: &str| NormError::InvalidNumericInput {
            field,
            raw: raw.to_owned(),
        };
        match self {
            SegmentValue::Number(value) if value.is_finite() => Ok(*value),
            SegmentValue::Number(value) => Err(invalid(&value.to_string())),
            SegmentValue::Text(text) => {
                let cleaned: String = text
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .map(|c| if c == ',' { '.' } else { c })
                    .collect();
                cleaned
                    .parse::<f64>()
                    .ok()
                    .filter(|value| value.is_finite())
                    .ok_or_else(|| invalid(text))
            }
            SegmentValue::Missing => Err(invalid("")),
        }
    }
}

impl From<f64> for SegmentValue {
    fn from(value: f64) -> SegmentValue {
        SegmentValue::Number(value)
    }
}

impl From<&str> for SegmentValue {
    fn from(text: &str) -> SegmentValue {
        SegmentValue::Text(text.to_owned())
    }
}

/// One already-deduplicated route segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSegment {
    pub section_name: String,
    pub norm_id: String,
    #[serde(default)]
    pub load: SegmentValue,
    #[serde(default)]
    pub actual_consumption: SegmentValue,
}

impl RouteSegment {
    pub fn new(
        section_name: &str,
        norm_id: &str,
        load: impl Into<SegmentValue>,
        actual_consumption: impl Into<SegmentValue>,
    ) -> RouteSegment {
        RouteSegment {
            section_name: section_name.to_owned(),
            norm_id: norm_id.to_owned(),
            load: load.into(),
            actual_consumption: actual_consumption.into(),
        }
    }
}

/// A segment evaluated against its norm.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzedSegment {
    pub segment: RouteSegment,
    pub load: Option<f64>,
    pub actual_consumption: Option<f64>,
    pub norm_value: Option<f64>,
    pub deviation_percent: Option<f64>,
    pub status: DeviationStatus,
}

/// A segment left out of the analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedSegment {
    /// Position in the input batch.
    pub index: usize,
    pub norm_id: String,
    pub reason: String,
}

impl SkippedSegment {
    pub fn message(&self) -> String {
        format!("segment skipped: {}", self.reason)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numbers_and_text() {
        assert_eq!(SegmentValue::from(12.5).parse("load").unwrap(), 12.5);
        assert_eq!(SegmentValue::from("46,67").parse("load").unwrap(), 46.67);
        assert_eq!(SegmentValue::from(" 1 234.5 ").parse("load").unwrap(), 1234.5);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for value in [
            SegmentValue::from("-"),
            SegmentValue::from(""),
            SegmentValue::from("abc"),
            SegmentValue::from("inf"),
            SegmentValue::Number(f64::NAN),
            SegmentValue::Missing,
        ] {
            let error = value.parse("actual consumption").unwrap_err();
            assert!(matches!(
                error,
                NormError::InvalidNumericInput { field: "actual consumption", .. }
            ));
        }
    }

    #[test]
    fn test_deserialize_mixed_fields() {
        let json = r#"[
            {"section_name": "A-B", "norm_id": "N1", "load": 20, "actual_consumption": "66,0"},
            {"section_name": "A-B", "norm_id": "N1", "load": null}
        ]"#;
        let segments: Vec<RouteSegment> = serde_json::from_str(json).unwrap();
        assert_eq!(segments[0].load, SegmentValue::Number(20.0));
        assert_eq!(segments[0].actual_consumption, SegmentValue::Text("66,0".to_owned()));
        assert_eq!(segments[1].load, SegmentValue::Missing);
        assert_eq!(segments[1].actual_consumption, SegmentValue::Missing);
    }
}
