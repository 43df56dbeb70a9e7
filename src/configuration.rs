use std::fs::File;
use std::io::BufReader;
use std::path::{
    Path,
    PathBuf
};

use serde::{
    Deserialize,
    Serialize
};

use crate::error::Result;
use crate::norm::normpointstore::{
    ValidationPolicy,
    MAX_RECOMMENDED_POINTS,
    POOR_FIT_THRESHOLD
};

/// Engine settings, read from a JSON file. Every field is optional.
///
/// ```json
/// {
///     "value_cache_capacity": 4096,
///     "max_recommended_points": 20,
///     "poor_fit_threshold": 0.1,
///     "norms_file": "norms.json"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfiguration {
    /// Entry cap of the value cache; `None` disables it.
    pub value_cache_capacity: Option<usize>,
    pub max_recommended_points: usize,
    pub poor_fit_threshold: f64,
    /// Norms loaded by `NormEngine::from_configuration`.
    pub norms_file: Option<PathBuf>,
}

impl Default for EngineConfiguration {
    fn default() -> Self {
        EngineConfiguration {
            value_cache_capacity: None,
            max_recommended_points: MAX_RECOMMENDED_POINTS,
            poor_fit_threshold: POOR_FIT_THRESHOLD,
            norms_file: None,
        }
    }
}

impl EngineConfiguration {
    pub fn from_reader(file_path: impl AsRef<Path>) -> Result<EngineConfiguration> {
        let file = File::open(file_path)?;
        let reader = BufReader::new(file);
        let configuration = serde_json::from_reader(reader)?;
        Ok(configuration)
    }

    pub fn from_json_str(json: &str) -> Result<EngineConfiguration> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn validation_policy(&self) -> ValidationPolicy {
        ValidationPolicy {
            max_recommended_points: self.max_recommended_points,
            poor_fit_threshold: self.poor_fit_threshold,
        }
    }
}
