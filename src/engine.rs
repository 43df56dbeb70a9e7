//! Entry point wiring the norm store, the function cache and the analyzers.

use std::sync::Arc;

use serde::Serialize;
use tracing::{
    info,
    warn
};

use crate::analysis::routesegment::{
    AnalyzedSegment,
    RouteSegment
};
use crate::analysis::sectionanalyzer::{
    NormFunctionSource,
    SectionAnalysis,
    SectionAnalyzer
};
use crate::analysis::statistics::{
    self,
    AnalysisStatistics
};
use crate::configuration::EngineConfiguration;
use crate::error::{
    NormError,
    Result
};
use crate::interpolation::interpolationcache::{
    CacheStats,
    InterpolationCache
};
use crate::interpolation::interpolationfunction::InterpolationFunction;
use crate::norm::normpersistence::{
    JsonFilePersistence,
    NormDocument,
    NormPersistence
};
use crate::norm::normpoint::NormPoint;
use crate::norm::normpointstore::{
    NormPointStore,
    UpsertOutcome,
    UpsertSummary
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid_ids: Vec<String>,
    pub invalid_reasons: Vec<String>,
    pub warnings: Vec<String>,
}

pub struct NormEngine {
    store: NormPointStore,
    cache: InterpolationCache,
    configuration: EngineConfiguration,
}

impl NormEngine {
    pub fn new() -> NormEngine {
        NormEngine::with_configuration(EngineConfiguration::default())
    }

    pub fn with_configuration(configuration: EngineConfiguration) -> NormEngine {
        let cache = match configuration.value_cache_capacity {
            Some(capacity) => InterpolationCache::with_value_cache(capacity),
            None => InterpolationCache::new(),
        };
        NormEngine {
            store: NormPointStore::with_policy(configuration.validation_policy()),
            cache,
            configuration,
        }
    }

    /// Builds the engine and loads `norms_file` when one is configured.
    pub fn from_configuration(configuration: EngineConfiguration) -> Result<NormEngine> {
        let norms_file = configuration.norms_file.clone();
        let engine = NormEngine::with_configuration(configuration);
        if let Some(path) = norms_file {
            engine.load_all(&JsonFilePersistence::new(path))?;
        }
        Ok(engine)
    }

    pub fn store(&self) -> &NormPointStore {
        &self.store
    }

    pub fn configuration(&self) -> &EngineConfiguration {
        &self.configuration
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // ── 寫入 ─────────────────────────────────────────────────────────────────

    pub fn upsert(
        &self,
        norm_id: &str,
        points: Vec<NormPoint>,
        norm_type: &str,
        description: &str,
    ) -> UpsertOutcome {
        let before = self.fingerprint(norm_id);
        let outcome = self.store.upsert(norm_id, points, norm_type, description);
        self.invalidate_if_changed(norm_id, before);
        outcome
    }

    pub fn bulk_upsert(&self, document: NormDocument) -> Result<UpsertSummary> {
        let before: Vec<(String, Option<u64>)> = document
            .keys()
            .map(|norm_id| (norm_id.clone(), self.fingerprint(norm_id)))
            .collect();
        let (summary, _) = self.store.bulk_upsert(document)?;
        for (norm_id, fingerprint) in before {
            self.invalidate_if_changed(&norm_id, fingerprint);
        }
        Ok(summary)
    }

    pub fn remove(&self, norm_id: &str) -> bool {
        let removed = self.store.remove(norm_id);
        self.cache.invalidate(norm_id);
        removed
    }

    pub fn load_all(&self, persistence: &dyn NormPersistence) -> Result<UpsertSummary> {
        self.bulk_upsert(persistence.load_all()?)
    }

    pub fn save_all(&self, persistence: &dyn NormPersistence) -> Result<()> {
        self.store.save_to(persistence)
    }

    // ── 查詢 ─────────────────────────────────────────────────────────────────

    pub fn function(&self, norm_id: &str) -> Result<Arc<InterpolationFunction>> {
        let curve = self
            .store
            .get(norm_id)
            .ok_or_else(|| NormError::NormNotFound(norm_id.to_owned()))?;
        self.cache
            .function(norm_id, &curve)
            .map_err(|source| NormError::interpolation(norm_id, source))
    }

    pub fn try_evaluate(&self, norm_id: &str, load: f64) -> Result<f64> {
        let curve = self
            .store
            .get(norm_id)
            .ok_or_else(|| NormError::NormNotFound(norm_id.to_owned()))?;
        self.cache
            .evaluate(norm_id, &curve, load)
            .map_err(|source| NormError::interpolation(norm_id, source))
    }

    /// Norm value at `load`; `None` when the norm is unknown or cannot be
    /// interpolated.
    pub fn evaluate(&self, norm_id: &str, load: f64) -> Option<f64> {
        match self.try_evaluate(norm_id, load) {
            Ok(value) => Some(value),
            Err(NormError::NormNotFound(_)) => None,
            Err(error) => {
                warn!(%error, "evaluation failed");
                None
            }
        }
    }

    // ── 分析 ─────────────────────────────────────────────────────────────────

    pub fn analyze_section(
        &self,
        section_name: &str,
        segments: &[RouteSegment],
        norm_id: Option<&str>,
    ) -> SectionAnalysis {
        SectionAnalyzer::new(self).analyze(section_name, segments, norm_id)
    }

    pub fn analyze_all_sections(&self, segments: &[RouteSegment]) -> Vec<SectionAnalysis> {
        SectionAnalyzer::new(self).analyze_all(segments)
    }

    pub fn statistics(&self, analyzed: &[AnalyzedSegment]) -> AnalysisStatistics {
        statistics::aggregate(analyzed)
    }

    pub fn validate_all(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        for norm_id in self.store.norm_ids() {
            let validation = self.store.validate(&norm_id);
            if validation.valid {
                report.valid_ids.push(norm_id.clone());
            }
            report.invalid_reasons.extend(
                validation.reasons.iter().map(|reason| format!("norm '{norm_id}': {reason}")),
            );
            report.warnings.extend(
                validation.warnings.iter().map(|warning| format!("norm '{norm_id}': {warning}")),
            );
        }
        info!(
            valid = report.valid_ids.len(),
            invalid = report.invalid_reasons.len(),
            warnings = report.warnings.len(),
            "validated norms"
        );
        report
    }

    fn fingerprint(&self, norm_id: &str) -> Option<u64> {
        self.store.get(norm_id).map(|curve| curve.fingerprint())
    }

    // 只丟掉比目前 generation 舊的函數；並發讀者可能已經 build 了新曲線
    fn invalidate_if_changed(&self, norm_id: &str, before: Option<u64>) {
        let Some(before) = before else {
            return;
        };
        if let Some(curve) = self.store.get(norm_id) {
            if curve.fingerprint() != before {
                self.cache.invalidate_before(norm_id, curve.generation());
            }
        }
    }
}

impl Default for NormEngine {
    fn default() -> Self {
        NormEngine::new()
    }
}

impl NormFunctionSource for NormEngine {
    fn norm_function(&self, norm_id: &str) -> Result<Arc<InterpolationFunction>> {
        self.function(norm_id)
    }
}
