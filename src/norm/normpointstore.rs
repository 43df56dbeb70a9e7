use std::collections::{
    BTreeMap,
    HashMap
};
use std::sync::atomic::{
    AtomicU64,
    Ordering
};
use std::sync::{
    Arc,
    PoisonError,
    RwLock,
    RwLockReadGuard,
    RwLockWriteGuard
};

use serde::Serialize;
use tracing::{
    info,
    warn
};

use crate::error::{
    NormError,
    Result
};
use crate::interpolation::interpolationbuilder;
use crate::norm::normcurve::NormCurve;
use crate::norm::normpersistence::{
    NormDocument,
    NormPersistence,
    NormRecord
};
use crate::norm::normpoint::NormPoint;

pub const MAX_RECOMMENDED_POINTS: usize = 20;

/// Relative RMS residual above which a fit is reported as poor.
pub const POOR_FIT_THRESHOLD: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpsertOutcome {
    New,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl UpsertSummary {
    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::New       => self.new += 1,
            UpsertOutcome::Updated   => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.new + self.updated + self.unchanged
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormValidation {
    pub valid: bool,
    pub reasons: Vec<String>,
    pub warnings: Vec<String>,
}

/// Thresholds for the non-fatal validation warnings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationPolicy {
    pub max_recommended_points: usize,
    pub poor_fit_threshold: f64,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        ValidationPolicy {
            max_recommended_points: MAX_RECOMMENDED_POINTS,
            poor_fit_threshold: POOR_FIT_THRESHOLD,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// NormPointStore
// ─────────────────────────────────────────────────────────────────────────────
//
// 每條曲線以 Arc<NormCurve> 存放，upsert 在寫鎖內整個替換 Arc，
// 讀者拿到的永遠是完整的一份快照。
// 點集每次改變都配一個新的 generation（全 store 單調遞增），
// cache 用它分辨新舊快照。

pub struct NormPointStore {
    curves: RwLock<HashMap<String, Arc<NormCurve>>>,
    generations: AtomicU64,
    policy: ValidationPolicy,
}

impl NormPointStore {
    pub fn new() -> NormPointStore {
        NormPointStore::with_policy(ValidationPolicy::default())
    }

    pub fn with_policy(policy: ValidationPolicy) -> NormPointStore {
        NormPointStore {
            curves: RwLock::new(HashMap::new()),
            generations: AtomicU64::new(0),
            policy,
        }
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Inserts or replaces a norm. Content equal to the stored one (points
    /// within tolerance, same type and description) leaves the store as is.
    pub fn upsert(
        &self,
        norm_id: &str,
        points: Vec<NormPoint>,
        norm_type: &str,
        description: &str,
    ) -> UpsertOutcome {
        let mut curves = self.write();
        match curves.get(norm_id).cloned() {
            None => {
                let curve = NormCurve::new(points, norm_type.to_owned(), description.to_owned())
                    .with_generation(self.next_generation());
                curves.insert(norm_id.to_owned(), Arc::new(curve));
                UpsertOutcome::New
            }
            Some(existing) if existing.same_points(&points) => {
                if existing.norm_type() == norm_type && existing.description() == description {
                    UpsertOutcome::Unchanged
                } else {
                    // 點相同只換 metadata：沿用舊點，fingerprint 不變
                    let curve = existing.with_metadata(norm_type.to_owned(), description.to_owned());
                    curves.insert(norm_id.to_owned(), Arc::new(curve));
                    UpsertOutcome::Updated
                }
            }
            Some(_) => {
                let curve = NormCurve::new(points, norm_type.to_owned(), description.to_owned())
                    .with_generation(self.next_generation());
                curves.insert(norm_id.to_owned(), Arc::new(curve));
                UpsertOutcome::Updated
            }
        }
    }

    /// Upserts every record of a document. A record without a point list is a
    /// structural violation and aborts before anything is written.
    pub fn bulk_upsert(&self, document: NormDocument) -> Result<(UpsertSummary, Vec<(String, UpsertOutcome)>)> {
        if let Some((norm_id, _)) = document.iter().find(|(_, record)| record.points.is_none()) {
            return Err(NormError::MalformedEntry {
                norm_id: norm_id.to_owned(),
                reason: "point list is null or missing".to_owned(),
            });
        }

        let mut summary = UpsertSummary::default();
        let mut outcomes = Vec::with_capacity(document.len());
        for (norm_id, record) in document {
            let points = record.points.unwrap_or_default();
            let outcome = self.upsert(&norm_id, points, &record.norm_type, &record.description);
            summary.record(outcome);
            outcomes.push((norm_id, outcome));
        }
        info!(
            new = summary.new,
            updated = summary.updated,
            unchanged = summary.unchanged,
            "ingested norms"
        );
        Ok((summary, outcomes))
    }

    pub fn get(&self, norm_id: &str) -> Option<Arc<NormCurve>> {
        self.read().get(norm_id).cloned()
    }

    pub fn contains(&self, norm_id: &str) -> bool {
        self.read().contains_key(norm_id)
    }

    pub fn remove(&self, norm_id: &str) -> bool {
        self.write().remove(norm_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn norm_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Owned copy of every stored curve.
    pub fn all(&self) -> BTreeMap<String, NormCurve> {
        self.read()
            .iter()
            .map(|(norm_id, curve)| (norm_id.clone(), curve.as_ref().clone()))
            .collect()
    }

    pub fn to_document(&self) -> NormDocument {
        self.read()
            .iter()
            .map(|(norm_id, curve)| {
                let record = NormRecord::new(
                    curve.points().to_vec(),
                    curve.norm_type(),
                    curve.description(),
                );
                (norm_id.clone(), record)
            })
            .collect()
    }

    pub fn load_from(&self, persistence: &dyn NormPersistence) -> Result<(UpsertSummary, Vec<(String, UpsertOutcome)>)> {
        self.bulk_upsert(persistence.load_all()?)
    }

    pub fn save_to(&self, persistence: &dyn NormPersistence) -> Result<()> {
        persistence.save_all(&self.to_document())
    }

    pub fn validate(&self, norm_id: &str) -> NormValidation {
        match self.get(norm_id) {
            Some(curve) => validate_curve(&curve, &self.policy),
            None => NormValidation {
                valid: false,
                reasons: vec![format!("norm '{norm_id}' not found")],
                warnings: Vec::new(),
            },
        }
    }

    // 只在寫鎖內呼叫，generation 的順序即寫入順序
    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<NormCurve>>> {
        self.curves.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<NormCurve>>> {
        self.curves.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for NormPointStore {
    fn default() -> Self {
        NormPointStore::new()
    }
}

fn validate_curve(curve: &NormCurve, policy: &ValidationPolicy) -> NormValidation {
    let mut reasons = Vec::new();
    let mut warnings = Vec::new();

    if curve.is_empty() {
        reasons.push("no points".to_owned());
    }
    for point in curve.points().iter().filter(|pt| !pt.is_positive()) {
        reasons.push(format!(
            "non-positive point (load {}, energy {})",
            point.load(),
            point.energy()
        ));
    }

    if reasons.is_empty() {
        match interpolationbuilder::build(curve.points()) {
            Ok(function) => {
                if curve.len() == 1 {
                    warnings.push("single point, norm is constant".to_owned());
                }
                if function.is_degraded() {
                    let cause = function
                        .fallback_cause()
                        .map(|cause| format!(": {cause}"))
                        .unwrap_or_default();
                    warnings.push(format!("degraded interpolation ({}){cause}", function.strategy()));
                }
                let mean_energy = curve.points().iter().map(|pt| pt.energy()).sum::<f64>() / curve.len() as f64;
                if let Some(rms) = function.residual_rms(curve.points()) {
                    if rms > policy.poor_fit_threshold * mean_energy {
                        warnings.push(format!("poor fit, RMS residual {rms:.3}"));
                    }
                }
            }
            Err(error) => reasons.push(format!("could not be interpolated: {error}")),
        }
    }

    if curve.len() > policy.max_recommended_points {
        warnings.push(format!(
            "{} points exceed the recommended {}, input may be noisy",
            curve.len(),
            policy.max_recommended_points
        ));
    }

    if !reasons.is_empty() {
        warn!(?reasons, "norm failed validation");
    }

    NormValidation {
        valid: reasons.is_empty(),
        reasons,
        warnings,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::norm::normpersistence::MemoryPersistence;

    fn points(raw: &[(f64, f64)]) -> Vec<NormPoint> {
        raw.iter().map(|&pt| NormPoint::from(pt)).collect()
    }

    #[test]
    fn test_upsert_outcomes() {
        let store = NormPointStore::new();
        let raw = [(10.0, 100.0), (20.0, 60.0)];
        assert_eq!(store.upsert("N1", points(&raw), "traction", ""), UpsertOutcome::New);
        assert_eq!(store.upsert("N1", points(&raw), "traction", ""), UpsertOutcome::Unchanged);
        assert_eq!(
            store.upsert("N1", points(&[(20.0, 60.0), (10.0, 100.0 + 1e-12)]), "traction", ""),
            UpsertOutcome::Unchanged
        );
        assert_eq!(store.upsert("N1", points(&raw), "traction", "renamed"), UpsertOutcome::Updated);
        assert_eq!(store.upsert("N1", points(&[(10.0, 101.0)]), "traction", "renamed"), UpsertOutcome::Updated);
        assert_eq!(store.get("N1").unwrap().len(), 1);
    }

    #[test]
    fn test_unchanged_keeps_same_snapshot() {
        let store = NormPointStore::new();
        store.upsert("N1", points(&[(10.0, 100.0)]), "", "");
        let before = store.get("N1").unwrap();
        store.upsert("N1", points(&[(10.0, 100.0)]), "", "");
        assert!(Arc::ptr_eq(&before, &store.get("N1").unwrap()));
    }

    #[test]
    fn test_metadata_update_keeps_fingerprint() {
        let store = NormPointStore::new();
        store.upsert("N1", points(&[(10.0, 100.0), (20.0, 60.0)]), "", "");
        let before = store.get("N1").unwrap().fingerprint();
        store.upsert("N1", points(&[(20.0, 60.0), (10.0, 100.0 + 1e-12)]), "", "note");
        let after = store.get("N1").unwrap();
        assert_eq!(after.fingerprint(), before);
        assert_eq!(after.description(), "note");
    }

    #[test]
    fn test_resent_points_within_tolerance_are_unchanged() {
        let store = NormPointStore::new();
        store.upsert("N1", points(&[(10.0, 100.0), (10.0 + 5e-10, 50.0)]), "", "");
        let outcome = store.upsert("N1", points(&[(10.0 + 5e-10, 100.0), (10.0, 50.0)]), "", "");
        assert_eq!(outcome, UpsertOutcome::Unchanged);
    }

    #[test]
    fn test_generation_advances_only_on_point_changes() {
        let store = NormPointStore::new();
        store.upsert("N1", points(&[(10.0, 100.0)]), "", "");
        store.upsert("N2", points(&[(10.0, 50.0)]), "", "");
        let first = store.get("N1").unwrap().generation();
        assert!(store.get("N2").unwrap().generation() > first);

        store.upsert("N1", points(&[(10.0, 100.0)]), "", "relabelled");
        assert_eq!(store.get("N1").unwrap().generation(), first);

        store.upsert("N1", points(&[(10.0, 120.0)]), "", "");
        assert!(store.get("N1").unwrap().generation() > store.get("N2").unwrap().generation());
    }

    #[test]
    fn test_get_absent_is_none() {
        let store = NormPointStore::new();
        assert!(store.get("missing").is_none());
        assert!(!store.contains("missing"));
    }

    #[test]
    fn test_all_is_a_snapshot() {
        let store = NormPointStore::new();
        store.upsert("N1", points(&[(10.0, 100.0)]), "", "");
        let mut snapshot = store.all();
        snapshot.remove("N1");
        snapshot.insert("N9".to_owned(), NormCurve::new(Vec::new(), String::new(), String::new()));
        assert!(store.contains("N1"));
        assert!(!store.contains("N9"));
        assert_eq!(store.norm_ids(), vec!["N1".to_owned()]);
    }

    #[test]
    fn test_validate() {
        let store = NormPointStore::new();
        store.upsert("empty", Vec::new(), "", "");
        store.upsert("negative", points(&[(-5.0, 10.0), (10.0, 5.0)]), "", "");
        store.upsert("single", points(&[(10.0, 50.0)]), "", "");
        store.upsert("good", points(&[(10.0, 100.0), (20.0, 60.0), (30.0, 46.67)]), "", "");
        let many: Vec<(f64, f64)> = (1..=21).map(|i| (i as f64, 100.0 / i as f64 + 5.0)).collect();
        store.upsert("many", points(&many), "", "");

        let empty = store.validate("empty");
        assert!(!empty.valid);
        assert_eq!(empty.reasons, vec!["no points".to_owned()]);

        assert!(!store.validate("negative").valid);

        let single = store.validate("single");
        assert!(single.valid);
        assert_eq!(single.warnings.len(), 1);

        let good = store.validate("good");
        assert!(good.valid);
        assert!(good.warnings.is_empty());

        let many = store.validate("many");
        assert!(many.valid);
        assert!(many.warnings.iter().any(|w| w.contains("21 points")));

        let missing = store.validate("missing");
        assert!(!missing.valid);
    }

    #[test]
    fn test_validate_flags_degraded_fit() {
        let store = NormPointStore::new();
        store.upsert("flat", points(&[(10.0, 100.0), (10.0, 90.0), (10.0, 80.0)]), "", "");
        let validation = store.validate("flat");
        assert!(validation.valid);
        assert!(validation.warnings.iter().any(|w| w.starts_with("degraded interpolation")));
    }

    #[test]
    fn test_validate_flags_fallback_hyperbola() {
        let store = NormPointStore::new();
        store.upsert("heavy", points(&[(1e5, 3.0), (2e5, 2.0), (3e5, 1.5)]), "", "");
        let validation = store.validate("heavy");
        assert!(validation.valid);
        assert!(validation
            .warnings
            .iter()
            .any(|w| w.starts_with("degraded interpolation (fallback hyperbola)")));
    }

    #[test]
    fn test_bulk_upsert_rejects_null_points() {
        let store = NormPointStore::new();
        let mut document = NormDocument::new();
        document.insert("N1".to_owned(), NormRecord::new(points(&[(10.0, 1.0)]), "", ""));
        document.insert(
            "N2".to_owned(),
            NormRecord { points: None, norm_type: String::new(), description: String::new() },
        );
        let result = store.bulk_upsert(document);
        assert!(matches!(result, Err(NormError::MalformedEntry { ref norm_id, .. }) if norm_id == "N2"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_persistence_round_trip() {
        let store = NormPointStore::new();
        store.upsert("N1", points(&[(10.0, 100.0), (20.0, 60.0)]), "traction", "main line");
        let persistence = MemoryPersistence::default();
        store.save_to(&persistence).unwrap();

        let restored = NormPointStore::new();
        let (summary, _) = restored.load_from(&persistence).unwrap();
        assert_eq!(summary.new, 1);
        assert_eq!(restored.all(), store.all());

        let (summary, _) = restored.load_from(&persistence).unwrap();
        assert_eq!(summary.unchanged, 1);
    }
}
