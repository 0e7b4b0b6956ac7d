//! Core flood control implementation.

use std::fmt::Debug;
use std::hash::Hash;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::backend::FloodControlBackend;
use super::decision::Decision;
use super::window::CallWindow;
use crate::config::FloodControlConfig;
use crate::error::{FloodgateError, Result};

/// Sliding-window flood control keyed by caller identity.
///
/// Each identity owns a [`CallWindow`]. The map is sharded by identity hash;
/// a check holds its shard's write lock from lookup through trim, decision and
/// record, so checks for one identity are linearizable and never interleave.
/// This struct is thread-safe and can be shared across multiple tasks.
pub struct FloodControl<K = i64>
where
    K: Eq + Hash,
{
    /// Admitted call timestamps indexed by identity
    history: DashMap<K, CallWindow>,
    /// Maximum admitted calls within the window
    limit: usize,
    /// Width of the trailing window
    period: Duration,
}

impl<K> FloodControl<K>
where
    K: Eq + Hash + Clone + Debug,
{
    /// Create a new flood control gate.
    ///
    /// Fails if `limit` or `period` is zero.
    pub fn new(limit: usize, period: Duration) -> Result<Self> {
        if limit == 0 {
            return Err(FloodgateError::Config("limit must be positive".to_string()));
        }
        if period.is_zero() {
            return Err(FloodgateError::Config("period must be positive".to_string()));
        }

        Ok(Self {
            history: DashMap::new(),
            limit,
            period,
        })
    }

    /// Create a gate from the flood control section of the configuration.
    pub fn from_config(config: &FloodControlConfig) -> Result<Self> {
        Self::new(config.limit, config.period())
    }

    /// Check a call for `identity` at the current instant and record it if admitted.
    pub fn check(&self, identity: &K) -> Decision {
        self.check_with(identity, Instant::now)
    }

    /// Check a call for `identity` as if it happened at `now`.
    ///
    /// Instants passed for one identity must be non-decreasing.
    pub fn check_at(&self, identity: &K, now: Instant) -> Decision {
        self.check_with(identity, || now)
    }

    fn check_with(&self, identity: &K, clock: impl FnOnce() -> Instant) -> Decision {
        // Only clone the key when the identity is new.
        let mut window = match self.history.get_mut(identity) {
            Some(window) => window,
            None => self.history.entry(identity.clone()).or_default(),
        };
        // Read the clock under the lock so recorded instants stay ordered.
        let now = clock();

        let expired = window.trim(now, self.period);
        let in_window = window.len();

        let decision = if in_window >= self.limit {
            Decision::Denied {
                retry_after: window.retry_after(now, self.period),
            }
        } else {
            window.record(now);
            Decision::Allowed {
                remaining: self.limit - in_window - 1,
            }
        };
        drop(window);

        trace!(
            identity = ?identity,
            expired = expired,
            in_window = in_window,
            "Checked flood control"
        );

        if let Decision::Denied { retry_after } = decision {
            debug!(
                identity = ?identity,
                limit = self.limit,
                retry_after_ms = retry_after.as_millis() as u64,
                "Flood control limit exceeded"
            );
        }

        decision
    }

    /// Remove identities with no calls left inside the window.
    ///
    /// Returns the number of identities evicted.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }

    /// Remove identities with no calls left inside the window as of `now`.
    pub fn evict_idle_at(&self, now: Instant) -> usize {
        let mut evicted = 0;
        self.history.retain(|_, window| {
            window.trim(now, self.period);
            if window.is_empty() {
                evicted += 1;
                false
            } else {
                true
            }
        });

        if evicted > 0 {
            debug!(
                evicted = evicted,
                remaining = self.history.len(),
                "Evicted idle identities"
            );
        }
        evicted
    }

    /// Number of calls currently recorded for `identity`, without trimming.
    ///
    /// Returns `None` if the identity is not tracked.
    pub fn history_len(&self, identity: &K) -> Option<usize> {
        self.history.get(identity).map(|window| window.len())
    }

    /// Get the number of tracked identities.
    pub fn tracked_identities(&self) -> usize {
        self.history.len()
    }

    /// Clear all history.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.history.clear();
    }

    /// Maximum calls admitted per identity within the window.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Width of the trailing window.
    pub fn period(&self) -> Duration {
        self.period
    }
}

#[async_trait]
impl<K> FloodControlBackend<K> for FloodControl<K>
where
    K: Eq + Hash + Clone + Debug + Send + Sync,
{
    async fn check_identity(&self, identity: &K) -> Decision {
        self.check(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio_test::{assert_ready, task};

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn test_construction_rejects_zero_limit() {
        let result = FloodControl::<i64>::new(0, Duration::from_secs(1));
        assert!(matches!(result, Err(FloodgateError::Config(_))));
    }

    #[test]
    fn test_construction_rejects_zero_period() {
        let result = FloodControl::<i64>::new(1, Duration::ZERO);
        assert!(matches!(result, Err(FloodgateError::Config(_))));
    }

    #[test]
    fn test_from_config() {
        let config = FloodControlConfig {
            limit: 3,
            period_ms: 2000,
            sweep_interval_secs: 5,
        };
        let gate = FloodControl::<i64>::from_config(&config).unwrap();
        assert_eq!(gate.limit(), 3);
        assert_eq!(gate.period(), Duration::from_secs(2));
        assert_eq!(gate.tracked_identities(), 0);
    }

    #[test]
    fn test_sliding_window_scenario() {
        let gate = FloodControl::<i64>::new(3, Duration::from_secs(2)).unwrap();
        let start = Instant::now();

        assert_eq!(gate.check_at(&1, start), Decision::Allowed { remaining: 2 });
        assert_eq!(gate.check_at(&1, start + ms(500)), Decision::Allowed { remaining: 1 });
        assert_eq!(gate.check_at(&1, start + ms(1000)), Decision::Allowed { remaining: 0 });

        assert_eq!(
            gate.check_at(&1, start + ms(1500)),
            Decision::Denied { retry_after: ms(500) }
        );

        // The call at 0.0s is 2.1s old and drops out of the window.
        assert!(gate.check_at(&1, start + ms(2100)).is_allowed());
        assert_eq!(gate.history_len(&1), Some(3));
    }

    #[test]
    fn test_limit_plus_one_within_period_denied() {
        let gate = FloodControl::<i64>::new(5, Duration::from_secs(10)).unwrap();
        let start = Instant::now();

        for i in 0..5 {
            assert!(gate.check_at(&7, start + ms(i * 100)).is_allowed());
        }
        assert!(!gate.check_at(&7, start + ms(10_000)).is_allowed());
    }

    #[test]
    fn test_window_expires_after_period() {
        let gate = FloodControl::<i64>::new(2, Duration::from_secs(1)).unwrap();
        let start = Instant::now();

        assert!(gate.check_at(&1, start).is_allowed());
        assert!(gate.check_at(&1, start + ms(10)).is_allowed());
        assert!(!gate.check_at(&1, start + ms(20)).is_allowed());

        // Strictly more than a period after the newest call, everything is gone.
        let later = start + ms(1011);
        assert_eq!(gate.check_at(&1, later), Decision::Allowed { remaining: 1 });
        assert_eq!(gate.history_len(&1), Some(1));
    }

    #[test]
    fn test_call_exactly_period_old_still_counts() {
        let period = Duration::from_secs(2);
        let gate = FloodControl::<i64>::new(1, period).unwrap();
        let start = Instant::now();

        assert!(gate.check_at(&1, start).is_allowed());
        assert_eq!(
            gate.check_at(&1, start + period),
            Decision::Denied { retry_after: Duration::ZERO }
        );
        assert!(gate.check_at(&1, start + period + Duration::from_nanos(1)).is_allowed());
    }

    #[test]
    fn test_identities_are_independent() {
        let gate = FloodControl::<i64>::new(2, Duration::from_secs(60)).unwrap();
        let now = Instant::now();

        assert!(gate.check_at(&1, now).is_allowed());
        assert!(gate.check_at(&1, now).is_allowed());
        assert!(!gate.check_at(&1, now).is_allowed());

        assert!(gate.check_at(&2, now).is_allowed());
        assert!(gate.check_at(&2, now).is_allowed());
        assert_eq!(gate.history_len(&1), Some(2));
        assert_eq!(gate.history_len(&2), Some(2));
        assert_eq!(gate.tracked_identities(), 2);
    }

    #[test]
    fn test_zero_and_negative_identities_are_distinct() {
        let gate = FloodControl::<i64>::new(1, Duration::from_secs(60)).unwrap();
        let now = Instant::now();

        assert!(gate.check_at(&0, now).is_allowed());
        assert!(gate.check_at(&-1, now).is_allowed());
        assert!(gate.check_at(&i64::MIN, now).is_allowed());
        assert!(!gate.check_at(&0, now).is_allowed());
        assert_eq!(gate.tracked_identities(), 3);
    }

    #[test]
    fn test_string_identities() {
        let gate = FloodControl::<String>::new(1, Duration::from_secs(60)).unwrap();

        assert!(gate.check(&"alice".to_string()).is_allowed());
        assert!(!gate.check(&"alice".to_string()).is_allowed());
        assert!(gate.check(&"bob".to_string()).is_allowed());
    }

    #[test]
    fn test_denied_calls_are_not_recorded() {
        let gate = FloodControl::<i64>::new(2, Duration::from_secs(1)).unwrap();
        let start = Instant::now();

        assert!(gate.check_at(&1, start).is_allowed());
        assert!(gate.check_at(&1, start + ms(100)).is_allowed());

        // Hammer the gate while full; none of these occupy a slot.
        for i in 0..10 {
            assert!(!gate.check_at(&1, start + ms(500 + i * 50)).is_allowed());
        }
        assert_eq!(gate.history_len(&1), Some(2));

        // Only the first admitted call has aged out, so exactly one slot opens.
        assert!(gate.check_at(&1, start + ms(1050)).is_allowed());
        assert!(!gate.check_at(&1, start + ms(1060)).is_allowed());

        // Once the second admitted call ages out, another slot opens regardless
        // of the denied attempts made in between.
        assert!(gate.check_at(&1, start + ms(1101)).is_allowed());
    }

    #[test]
    fn test_evict_idle_removes_empty_identities() {
        let gate = FloodControl::<i64>::new(2, Duration::from_secs(1)).unwrap();
        let start = Instant::now();

        gate.check_at(&1, start);
        gate.check_at(&2, start + ms(800));
        assert_eq!(gate.tracked_identities(), 2);

        assert_eq!(gate.evict_idle_at(start + ms(1500)), 1);
        assert_eq!(gate.tracked_identities(), 1);
        assert_eq!(gate.history_len(&1), None);
        assert_eq!(gate.history_len(&2), Some(1));

        assert_eq!(gate.evict_idle_at(start + ms(1900)), 1);
        assert_eq!(gate.tracked_identities(), 0);
    }

    #[test]
    fn test_evicted_identity_starts_fresh() {
        let gate = FloodControl::<i64>::new(1, Duration::from_secs(1)).unwrap();
        let start = Instant::now();

        assert!(gate.check_at(&1, start).is_allowed());
        assert_eq!(gate.evict_idle_at(start + ms(1001)), 1);
        assert_eq!(gate.check_at(&1, start + ms(1002)), Decision::Allowed { remaining: 0 });
    }

    #[test]
    fn test_clear() {
        let gate = FloodControl::<i64>::new(1, Duration::from_secs(60)).unwrap();
        gate.check(&1);
        gate.check(&2);
        assert_eq!(gate.tracked_identities(), 2);

        gate.clear();
        assert_eq!(gate.tracked_identities(), 0);
        assert!(gate.check(&1).is_allowed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checks_admit_exactly_limit() {
        const LIMIT: usize = 10;
        const CALLERS: usize = 8;

        let gate = Arc::new(FloodControl::<i64>::new(LIMIT, Duration::from_secs(60)).unwrap());

        let handles: Vec<_> = (0..LIMIT * CALLERS)
            .map(|_| {
                let gate = Arc::clone(&gate);
                tokio::spawn(async move { gate.check_identity(&42).await })
            })
            .collect();

        let decisions = futures::future::join_all(handles).await;
        let allowed = decisions
            .into_iter()
            .map(|result| result.unwrap())
            .filter(Decision::is_allowed)
            .count();

        assert_eq!(allowed, LIMIT);
        assert_eq!(gate.history_len(&42), Some(LIMIT));
    }

    #[test]
    fn test_concurrent_threads_across_identities() {
        const LIMIT: usize = 5;
        const IDENTITIES: i64 = 16;
        const ATTEMPTS: usize = 20;

        let gate = Arc::new(FloodControl::<i64>::new(LIMIT, Duration::from_secs(60)).unwrap());

        let mut threads = Vec::new();
        for identity in 0..IDENTITIES {
            for _ in 0..2 {
                let gate = Arc::clone(&gate);
                threads.push(std::thread::spawn(move || {
                    (0..ATTEMPTS)
                        .filter(|_| gate.check(&identity).is_allowed())
                        .count()
                }));
            }
        }

        let allowed: usize = threads.into_iter().map(|t| t.join().unwrap()).sum();

        assert_eq!(allowed, LIMIT * IDENTITIES as usize);
        for identity in 0..IDENTITIES {
            assert_eq!(gate.history_len(&identity), Some(LIMIT));
        }
    }

    /// Identity that counts how often it is cloned.
    #[derive(Debug)]
    struct CountedKey {
        id: u32,
        clones: Arc<AtomicUsize>,
    }

    impl Clone for CountedKey {
        fn clone(&self) -> Self {
            self.clones.fetch_add(1, Ordering::SeqCst);
            Self {
                id: self.id,
                clones: Arc::clone(&self.clones),
            }
        }
    }

    impl PartialEq for CountedKey {
        fn eq(&self, other: &Self) -> bool {
            self.id == other.id
        }
    }

    impl Eq for CountedKey {}

    impl Hash for CountedKey {
        fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
            self.id.hash(state);
        }
    }

    #[test]
    fn test_tracked_identity_is_not_cloned() {
        let gate = FloodControl::<CountedKey>::new(3, Duration::from_secs(60)).unwrap();
        let clones = Arc::new(AtomicUsize::new(0));
        let key = CountedKey {
            id: 1,
            clones: Arc::clone(&clones),
        };

        for _ in 0..5 {
            gate.check(&key);
        }

        assert_eq!(clones.load(Ordering::SeqCst), 1);
        assert_eq!(gate.history_len(&key), Some(3));
    }

    #[test]
    fn test_backend_check_completes_on_first_poll() {
        let gate = FloodControl::<i64>::new(1, Duration::from_secs(60)).unwrap();

        let mut first = task::spawn(gate.check_identity(&5));
        assert_eq!(assert_ready!(first.poll()), Decision::Allowed { remaining: 0 });

        let mut second = task::spawn(gate.check_identity(&5));
        assert!(!assert_ready!(second.poll()).is_allowed());
    }
}
