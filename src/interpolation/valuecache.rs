use std::collections::HashMap;
use std::sync::atomic::{
    AtomicU64,
    Ordering
};
use std::sync::{
    Mutex,
    MutexGuard,
    PoisonError
};

use chrono::{
    DateTime,
    Utc
};
use tracing::debug;

/// Loads within the same bucket of this width share a cached value.
pub const LOAD_RESOLUTION: f64 = 1e-6;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

// ─────────────────────────────────────────────────────────────────────────────
// ValueCache：(norm id, curve fingerprint, load bucket) → 值
// ─────────────────────────────────────────────────────────────────────────────
//
// fingerprint 放進 key，曲線內容一變舊值自然失效；
// invalidate_norm 只是提早釋放記憶體。
//
// 超過 capacity 時依 staleness = 距上次使用天數 / 命中次數 淘汰，
// 分數最高者（久未使用且少被命中）先淘汰；同分時先淘汰最早寫入者。
// 剛寫入的 entry 不參與該次淘汰。

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ValueKey {
    norm_id: String,
    fingerprint: u64,
    load_bucket: i64,
}

impl ValueKey {
    fn new(norm_id: &str, fingerprint: u64, load: f64) -> Option<ValueKey> {
        let bucket = (load / LOAD_RESOLUTION).round();
        if !bucket.is_finite() || bucket.abs() >= i64::MAX as f64 {
            return None;
        }
        Some(ValueKey {
            norm_id: norm_id.to_owned(),
            fingerprint,
            load_bucket: bucket as i64,
        })
    }
}

struct ValueEntry {
    value: f64,
    last_used: DateTime<Utc>,
    hits: u64,
    sequence: u64,
}

impl ValueEntry {
    fn staleness(&self, now: DateTime<Utc>) -> f64 {
        let idle_days = (now - self.last_used).num_milliseconds().max(0) as f64 / MILLIS_PER_DAY;
        idle_days / self.hits.max(1) as f64
    }
}

struct ValueCacheInner {
    entries: HashMap<ValueKey, ValueEntry>,
    next_sequence: u64,
}

pub struct ValueCache {
    capacity: usize,
    inner: Mutex<ValueCacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ValueCache {
    pub fn new(capacity: usize) -> ValueCache {
        ValueCache {
            capacity,
            inner: Mutex::new(ValueCacheInner {
                entries: HashMap::new(),
                next_sequence: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn get_or_compute(
        &self,
        norm_id: &str,
        fingerprint: u64,
        load: f64,
        compute: impl FnOnce() -> f64,
    ) -> f64 {
        self.get_or_compute_at(norm_id, fingerprint, load, Utc::now(), compute)
    }

    fn get_or_compute_at(
        &self,
        norm_id: &str,
        fingerprint: u64,
        load: f64,
        now: DateTime<Utc>,
        compute: impl FnOnce() -> f64,
    ) -> f64 {
        let Some(key) = ValueKey::new(norm_id, fingerprint, load) else {
            return compute();
        };

        if let Some(entry) = self.lock().entries.get_mut(&key) {
            entry.hits += 1;
            entry.last_used = now;
            self.hits.fetch_add(1, Ordering::Relaxed);
            return entry.value;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = compute();

        let mut inner = self.lock();
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.entries.insert(
            key.clone(),
            ValueEntry { value, last_used: now, hits: 1, sequence },
        );
        self.evict_overflow(&mut inner, &key, now);
        value
    }

    /// Drops every entry of one norm; other norms are untouched.
    pub fn invalidate_norm(&self, norm_id: &str) {
        self.lock().entries.retain(|key, _| key.norm_id != norm_id);
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    // 分數 = 閒置天數 / 命中次數，當作「陳舊度」：分數最高的先淘汰。
    // 字面上的「分數低者先淘汰」會丟掉最新、最常用的項目，見 DESIGN.md Open Question 3。
    fn evict_overflow(&self, inner: &mut ValueCacheInner, keep: &ValueKey, now: DateTime<Utc>) {
        while inner.entries.len() > self.capacity {
            let victim = inner
                .entries
                .iter()
                .filter(|(key, _)| *key != keep)
                .max_by(|(_, lhs), (_, rhs)| {
                    lhs.staleness(now)
                        .total_cmp(&rhs.staleness(now))
                        .then_with(|| rhs.sequence.cmp(&lhs.sequence))
                })
                .map(|(key, _)| key.clone());

            let Some(victim) = victim else {
                // capacity == 0：連剛寫入的都不留
                inner.entries.remove(keep);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                break;
            };
            debug!(norm_id = %victim.norm_id, "evicting cached norm value");
            inner.entries.remove(&victim);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn lock(&self) -> MutexGuard<'_, ValueCacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
