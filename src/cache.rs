use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use uuid::Uuid;

use crate::risk::RiskResult;

/// How long a cached risk result stays valid, measured from the write.
pub const RISK_RESULT_TTL: Duration = Duration::from_secs(5 * 60);

pub fn cache_key(student_id: Uuid) -> String {
    format!("risk:weekly:{student_id}")
}

/// Time source for TTL checks, injectable so expiry is testable without
/// sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct Entry {
    result: RiskResult,
    stored_at: Instant,
}

/// Per-student memoization of full risk results. Entries expire on read after
/// the TTL; there is no background sweep, the map stays bounded by the active
/// student count. The cache is owned by the evaluator that constructs it, not
/// a module-level singleton.
pub struct RiskCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<String, Entry>>,
}

impl RiskCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<RiskResult> {
        let now = self.clock.now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if now.duration_since(entry.stored_at) <= self.ttl => {
                    return Some(entry.result.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        self.entries.write().remove(key);
        None
    }

    pub fn set(&self, key: &str, result: RiskResult) {
        self.entries.write().insert(
            key.to_string(),
            Entry {
                result,
                stored_at: self.clock.now(),
            },
        );
    }

    /// Drops one student's entry, or every entry when no student is given.
    pub fn clear(&self, student_id: Option<Uuid>) {
        match student_id {
            Some(id) => {
                self.entries.write().remove(&cache_key(id));
            }
            None => self.entries.write().clear(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::WeeklyMetrics;
    use crate::risk::score_metrics;
    use parking_lot::Mutex;

    struct ManualClock {
        base: Instant,
        offset: Mutex<Duration>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                base: Instant::now(),
                offset: Mutex::new(Duration::ZERO),
            }
        }

        fn advance(&self, by: Duration) {
            *self.offset.lock() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.base + *self.offset.lock()
        }
    }

    fn result() -> RiskResult {
        score_metrics(&WeeklyMetrics::default(), Uuid::new_v4())
    }

    #[test]
    fn round_trip_within_ttl_returns_the_stored_value() {
        let cache = RiskCache::new(RISK_RESULT_TTL);
        let value = result();
        let key = cache_key(value.student_id);
        cache.set(&key, value.clone());
        assert_eq!(cache.get(&key), Some(value));
    }

    #[test]
    fn entry_expires_after_ttl_and_stays_gone() {
        let clock = Arc::new(ManualClock::new());
        let cache = RiskCache::with_clock(Duration::from_secs(300), clock.clone());
        let value = result();
        let key = cache_key(value.student_id);
        cache.set(&key, value);

        clock.advance(Duration::from_secs(301));
        assert!(cache.get(&key).is_none());
        // The expired entry was evicted; a second read is still a miss.
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn read_at_exactly_ttl_is_still_a_hit() {
        let clock = Arc::new(ManualClock::new());
        let cache = RiskCache::with_clock(Duration::from_secs(300), clock.clone());
        let value = result();
        let key = cache_key(value.student_id);
        cache.set(&key, value);

        clock.advance(Duration::from_secs(300));
        assert!(cache.get(&key).is_some());
    }

    #[test]
    fn set_overwrites_unconditionally() {
        let cache = RiskCache::new(RISK_RESULT_TTL);
        let first = result();
        let key = cache_key(first.student_id);
        cache.set(&key, first.clone());

        let mut second = first.clone();
        second.risk_score = 55;
        cache.set(&key, second.clone());
        assert_eq!(cache.get(&key).map(|r| r.risk_score), Some(55));
    }

    #[test]
    fn clear_one_student_leaves_the_rest() {
        let cache = RiskCache::new(RISK_RESULT_TTL);
        let a = result();
        let b = result();
        cache.set(&cache_key(a.student_id), a.clone());
        cache.set(&cache_key(b.student_id), b.clone());

        cache.clear(Some(a.student_id));
        assert!(cache.get(&cache_key(a.student_id)).is_none());
        assert!(cache.get(&cache_key(b.student_id)).is_some());

        cache.clear(None);
        assert!(cache.is_empty());
    }

    #[test]
    fn keys_are_namespaced_by_student() {
        let id = Uuid::new_v4();
        assert_eq!(cache_key(id), format!("risk:weekly:{id}"));
    }
}
