use std::collections::HashMap;
use std::sync::atomic::{
    AtomicU64,
    Ordering
};
use std::sync::{
    Arc,
    Mutex,
    MutexGuard,
    OnceLock,
    PoisonError
};

use serde::Serialize;
use tracing::debug;

use crate::error::InterpolationError;
use crate::interpolation::interpolationbuilder;
use crate::interpolation::interpolationfunction::InterpolationFunction;
use crate::interpolation::valuecache::ValueCache;
use crate::norm::normcurve::NormCurve;

pub type SharedFunction = Result<Arc<InterpolationFunction>, InterpolationError>;

/// 一個 norm id 對應一個 slot；fingerprint 不同即視為新的一代。
///
/// `OnceLock` 保證同一代只會 build 一次：並發的第一次 evaluate
/// 會阻塞在同一個 cell 上，最後看到同一個結果（包含失敗結果）。
/// 較舊 generation 的快照不能取代 slot，只拿到一個不入 cache 的 cell。
struct FunctionSlot {
    generation: u64,
    fingerprint: u64,
    cell: Arc<OnceLock<SharedFunction>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub cached_functions: usize,
    pub function_builds: u64,
    pub function_hits: u64,
    pub value_hits: u64,
    pub value_misses: u64,
    pub value_evictions: u64,
}

/// Per-norm memo of interpolation functions, with an optional value cache.
pub struct InterpolationCache {
    slots: Mutex<HashMap<String, FunctionSlot>>,
    values: Option<ValueCache>,
    builds: AtomicU64,
    hits: AtomicU64,
}

impl InterpolationCache {
    pub fn new() -> InterpolationCache {
        InterpolationCache {
            slots: Mutex::new(HashMap::new()),
            values: None,
            builds: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    pub fn with_value_cache(capacity: usize) -> InterpolationCache {
        InterpolationCache {
            values: Some(ValueCache::new(capacity)),
            ..InterpolationCache::new()
        }
    }

    /// Function for the current content of `curve`, built at most once per
    /// content generation. A snapshot older than the cached one is built on
    /// the side and never replaces it.
    pub fn function(&self, norm_id: &str, curve: &NormCurve) -> SharedFunction {
        self.function_in_slot(norm_id, curve).0
    }

    fn function_in_slot(&self, norm_id: &str, curve: &NormCurve) -> (SharedFunction, bool) {
        let (cell, current) = self.slot(norm_id, curve);
        let mut built = false;
        let result = cell
            .get_or_init(|| {
                built = true;
                self.builds.fetch_add(1, Ordering::Relaxed);
                debug!(norm_id, points = curve.len(), "building norm function");
                interpolationbuilder::build(curve.points()).map(Arc::new)
            })
            .clone();
        if !built {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        (result, current)
    }

    pub fn evaluate(
        &self,
        norm_id: &str,
        curve: &NormCurve,
        load: f64,
    ) -> Result<f64, InterpolationError> {
        let (function, current) = self.function_in_slot(norm_id, curve);
        let function = function?;
        let value = match &self.values {
            Some(values) if current => values.get_or_compute(
                norm_id,
                curve.fingerprint(),
                load,
                || function.value(load),
            ),
            _ => function.value(load),
        };
        Ok(value)
    }

    /// Drops the cached function of one norm. Returns whether one was cached.
    pub fn invalidate(&self, norm_id: &str) -> bool {
        let removed = self.lock_slots().remove(norm_id).is_some();
        if let Some(values) = &self.values {
            values.invalidate_norm(norm_id);
        }
        if removed {
            debug!(norm_id, "invalidated norm function");
        }
        removed
    }

    /// Drops the cached function of one norm only when it was built from a
    /// generation older than `generation`. A reader that already cached the
    /// newer curve keeps its function.
    pub fn invalidate_before(&self, norm_id: &str, generation: u64) -> bool {
        let mut slots = self.lock_slots();
        let stale = slots
            .get(norm_id)
            .is_some_and(|slot| slot.generation < generation);
        if stale {
            slots.remove(norm_id);
            if let Some(values) = &self.values {
                values.invalidate_norm(norm_id);
            }
            debug!(norm_id, generation, "invalidated superseded norm function");
        }
        stale
    }

    pub fn clear(&self) {
        self.lock_slots().clear();
        if let Some(values) = &self.values {
            values.clear();
        }
    }

    pub fn is_cached(&self, norm_id: &str) -> bool {
        self.lock_slots()
            .get(norm_id)
            .is_some_and(|slot| slot.cell.get().is_some())
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            cached_functions: self.lock_slots().len(),
            function_builds: self.builds.load(Ordering::Relaxed),
            function_hits: self.hits.load(Ordering::Relaxed),
            ..CacheStats::default()
        };
        if let Some(values) = &self.values {
            stats.value_hits = values.hits();
            stats.value_misses = values.misses();
            stats.value_evictions = values.evictions();
        }
        stats
    }

    /// Cell for this snapshot, and whether it is the one held by the cache.
    fn slot(&self, norm_id: &str, curve: &NormCurve) -> (Arc<OnceLock<SharedFunction>>, bool) {
        let fingerprint = curve.fingerprint();
        let generation = curve.generation();
        let mut slots = self.lock_slots();
        if let Some(slot) = slots.get_mut(norm_id) {
            if slot.fingerprint == fingerprint {
                slot.generation = slot.generation.max(generation);
                return (slot.cell.clone(), true);
            }
            if generation < slot.generation {
                debug!(norm_id, generation, cached = slot.generation, "stale norm snapshot, not caching its function");
                return (Arc::new(OnceLock::new()), false);
            }
            debug!(norm_id, "norm content changed, discarding cached function");
            if let Some(values) = &self.values {
                values.invalidate_norm(norm_id);
            }
        }
        let cell = Arc::new(OnceLock::new());
        slots.insert(
            norm_id.to_owned(),
            FunctionSlot { generation, fingerprint, cell: cell.clone() },
        );
        (cell, true)
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<String, FunctionSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InterpolationCache {
    fn default() -> Self {
        InterpolationCache::new()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    use crate::norm::normpoint::NormPoint;

    fn curve(raw: &[(f64, f64)]) -> NormCurve {
        NormCurve::new(
            raw.iter().map(|&pt| NormPoint::from(pt)).collect(),
            String::new(),
            String::new(),
        )
    }

    #[test]
    fn test_function_is_built_once_per_content() {
        let cache = InterpolationCache::new();
        let n1 = curve(&[(10.0, 100.0), (20.0, 60.0)]);
        let first = cache.function("N1", &n1).unwrap();
        let second = cache.function("N1", &n1.clone()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats().function_builds, 1);
        assert_eq!(cache.stats().function_hits, 1);
    }

    #[test]
    fn test_content_change_rebuilds() {
        let cache = InterpolationCache::new();
        let old = curve(&[(10.0, 100.0), (20.0, 60.0)]);
        let new = curve(&[(10.0, 200.0), (20.0, 120.0)]);
        assert!((cache.evaluate("N1", &old, 20.0).unwrap() - 60.0).abs() < 1e-9);
        assert!((cache.evaluate("N1", &new, 20.0).unwrap() - 120.0).abs() < 1e-9);
        assert_eq!(cache.stats().function_builds, 2);
    }

    #[test]
    fn test_stale_snapshot_does_not_displace_newer_function() {
        let cache = InterpolationCache::new();
        let old = curve(&[(10.0, 100.0), (20.0, 60.0)]).with_generation(1);
        let new = curve(&[(10.0, 200.0), (20.0, 120.0)]).with_generation(2);

        let first = cache.function("N1", &new).unwrap();
        let stale = cache.function("N1", &old).unwrap();
        let again = cache.function("N1", &new).unwrap();

        assert!(Arc::ptr_eq(&first, &again));
        assert!((stale.value(20.0) - 60.0).abs() < 1e-9);
        assert_eq!(cache.stats().function_builds, 2);
        assert_eq!(cache.stats().cached_functions, 1);
    }

    #[test]
    fn test_stale_snapshot_skips_value_cache() {
        let cache = InterpolationCache::with_value_cache(16);
        let old = curve(&[(10.0, 100.0), (20.0, 60.0)]).with_generation(1);
        let new = curve(&[(10.0, 200.0), (20.0, 120.0)]).with_generation(2);

        cache.evaluate("N1", &new, 20.0).unwrap();
        assert!((cache.evaluate("N1", &old, 20.0).unwrap() - 60.0).abs() < 1e-9);
        assert!((cache.evaluate("N1", &new, 20.0).unwrap() - 120.0).abs() < 1e-9);
        let stats = cache.stats();
        assert_eq!(stats.value_misses, 1);
        assert_eq!(stats.value_hits, 1);
    }

    #[test]
    fn test_invalidation_is_targeted() {
        let cache = InterpolationCache::new();
        let n1 = curve(&[(10.0, 100.0)]);
        let n2 = curve(&[(10.0, 50.0)]);
        let n2_function = cache.function("N2", &n2).unwrap();
        cache.function("N1", &n1).unwrap();

        assert!(cache.invalidate("N1"));
        assert!(!cache.is_cached("N1"));
        assert!(cache.is_cached("N2"));
        assert!(Arc::ptr_eq(&n2_function, &cache.function("N2", &n2).unwrap()));
        assert!(!cache.invalidate("N1"));
    }

    #[test]
    fn test_invalidate_before_keeps_current_generation() {
        let cache = InterpolationCache::new();
        let old = curve(&[(10.0, 100.0)]).with_generation(1);
        let new = curve(&[(10.0, 120.0)]).with_generation(2);

        cache.function("N1", &old).unwrap();
        assert!(cache.invalidate_before("N1", 2));
        assert!(!cache.is_cached("N1"));

        let current = cache.function("N1", &new).unwrap();
        assert!(!cache.invalidate_before("N1", 2));
        assert!(Arc::ptr_eq(&current, &cache.function("N1", &new).unwrap()));
        assert_eq!(cache.stats().function_builds, 2);
    }

    #[test]
    fn test_build_failure_is_cached_per_generation() {
        let cache = InterpolationCache::new();
        let broken = curve(&[(-1.0, 10.0), (5.0, 4.0)]);
        assert!(cache.function("N1", &broken).is_err());
        assert!(cache.function("N1", &broken).is_err());
        assert_eq!(cache.stats().function_builds, 1);
    }

    #[test]
    fn test_value_cache_serves_repeated_loads() {
        let cache = InterpolationCache::with_value_cache(16);
        let n1 = curve(&[(10.0, 100.0), (20.0, 60.0), (30.0, 46.67)]);
        let first = cache.evaluate("N1", &n1, 25.0).unwrap();
        let second = cache.evaluate("N1", &n1, 25.0).unwrap();
        assert_eq!(first, second);
        let stats = cache.stats();
        assert_eq!(stats.value_hits, 1);
        assert_eq!(stats.value_misses, 1);
    }

    #[test]
    fn test_concurrent_first_evaluations_build_once() {
        let cache = Arc::new(InterpolationCache::new());
        let n1 = Arc::new(curve(&[(10.0, 100.0), (20.0, 60.0), (30.0, 46.67)]));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let n1 = Arc::clone(&n1);
                thread::spawn(move || cache.function("N1", &n1).unwrap())
            })
            .collect();
        let functions: Vec<Arc<InterpolationFunction>> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();

        assert_eq!(cache.stats().function_builds, 1);
        for function in &functions[1..] {
            assert!(Arc::ptr_eq(&functions[0], function));
        }
    }
}
