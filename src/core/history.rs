//! Bounded rolling history per location.
//!
//! Every [`LocationHistory`] owns a newest-first buffer of points guarded by
//! its own mutex, so a query on one location never waits on another. Points
//! only ever leave the buffer from the tail, once they are older than the
//! configured maximum age. All age comparisons are inclusive: a point that is
//! exactly `w` minutes old still belongs to a `w`-minute window.

use crate::config::HistorySection;
use crate::core::aggregate::round_to;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// A single stored reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// Temperature in °F
    pub value: f64,
    /// When the reading was taken
    pub timestamp: DateTime<Utc>,
}

impl HistoryPoint {
    pub fn new(value: f64, timestamp: DateTime<Utc>) -> Self {
        Self { value, timestamp }
    }

    fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }
}

/// Bounds applied to every location history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistorySettings {
    /// Points older than this are pruned
    pub max_age: Duration,
    /// Newest point must be at most this old to count as current
    pub recent_cutoff: Duration,
    /// Window used by [`LocationHistory::average`]
    pub average_window: Duration,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            max_age: Duration::minutes(60),
            recent_cutoff: Duration::minutes(5),
            average_window: Duration::minutes(5),
        }
    }
}

impl From<&HistorySection> for HistorySettings {
    fn from(section: &HistorySection) -> Self {
        Self {
            max_age: Duration::minutes(section.max_age_minutes as i64),
            recent_cutoff: Duration::minutes(section.recent_cutoff_minutes as i64),
            average_window: Duration::minutes(section.average_window_minutes as i64),
        }
    }
}

/// Query failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryError {
    /// The newest point is older than the recency cutoff, or there is none
    NoRecentData,
    /// No point falls inside the requested window
    NoData,
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryError::NoRecentData => write!(f, "No recent data"),
            HistoryError::NoData => write!(f, "No data"),
        }
    }
}

impl std::error::Error for HistoryError {}

/// Rolling history for one location.
#[derive(Debug)]
pub struct LocationHistory {
    alias: String,
    settings: HistorySettings,
    points: Mutex<VecDeque<HistoryPoint>>,
}

impl LocationHistory {
    pub fn new(alias: impl Into<String>, settings: HistorySettings) -> Self {
        Self {
            alias: alias.into(),
            settings,
            points: Mutex::new(VecDeque::new()),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn settings(&self) -> &HistorySettings {
        &self.settings
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<HistoryPoint>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.points.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Prepend a reading and prune expired points.
    pub fn insert(&self, value: f64, timestamp: DateTime<Utc>) {
        self.insert_at(value, timestamp, Utc::now());
    }

    pub fn insert_at(&self, value: f64, timestamp: DateTime<Utc>, now: DateTime<Utc>) {
        let mut points = self.lock();
        points.push_front(HistoryPoint::new(value, timestamp));
        self.prune_locked(&mut points, now);
    }

    /// Drop every point older than the maximum age.
    pub fn prune(&self) {
        self.prune_at(Utc::now());
    }

    pub fn prune_at(&self, now: DateTime<Utc>) {
        let mut points = self.lock();
        self.prune_locked(&mut points, now);
    }

    fn prune_locked(&self, points: &mut VecDeque<HistoryPoint>, now: DateTime<Utc>) {
        while points
            .back()
            .is_some_and(|p| p.age(now) > self.settings.max_age)
        {
            points.pop_back();
        }
    }

    /// Newest value, if it is recent enough.
    pub fn current(&self) -> Result<f64, HistoryError> {
        self.current_at(Utc::now())
    }

    pub fn current_at(&self, now: DateTime<Utc>) -> Result<f64, HistoryError> {
        match self.lock().front() {
            Some(p) if p.age(now) <= self.settings.recent_cutoff => Ok(p.value),
            _ => Err(HistoryError::NoRecentData),
        }
    }

    /// Mean over the configured default window.
    pub fn average(&self) -> Result<f64, HistoryError> {
        self.average_over(self.settings.average_window)
    }

    /// Mean of every point at most `window` old, rounded to 2 decimals.
    pub fn average_over(&self, window: Duration) -> Result<f64, HistoryError> {
        self.average_at(window, Utc::now())
    }

    pub fn average_at(&self, window: Duration, now: DateTime<Utc>) -> Result<f64, HistoryError> {
        let values: Vec<f64> = self
            .lock()
            .iter()
            .filter(|p| p.age(now) <= window)
            .map(|p| p.value)
            .collect();

        if values.is_empty() {
            return Err(HistoryError::NoData);
        }
        Ok(round_to(values.iter().mean(), 2))
    }

    /// Number of points currently held, pruned or not.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Prune, then count the points that remain.
    pub fn datapoint_count(&self) -> usize {
        let mut points = self.lock();
        self.prune_locked(&mut points, Utc::now());
        points.len()
    }

    /// Copy of the buffer, newest first.
    pub fn snapshot(&self) -> Vec<HistoryPoint> {
        self.lock().iter().copied().collect()
    }
}

/// All location histories, created lazily on first sight.
#[derive(Debug, Default)]
pub struct HistoryRegistry {
    settings: HistorySettings,
    histories: RwLock<HashMap<String, Arc<LocationHistory>>>,
}

/// Thread-safe shared history registry.
pub type SharedHistory = Arc<HistoryRegistry>;

impl HistoryRegistry {
    pub fn new(settings: HistorySettings) -> Self {
        Self {
            settings,
            histories: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &HistorySettings {
        &self.settings
    }

    /// History for `alias`, if it has ever been recorded.
    pub fn get(&self, alias: &str) -> Option<Arc<LocationHistory>> {
        let key = alias.trim().to_lowercase();
        self.histories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    /// History for `alias`, creating it on first sight.
    pub fn get_or_create(&self, alias: &str) -> Arc<LocationHistory> {
        if let Some(history) = self.get(alias) {
            return history;
        }

        let key = alias.trim().to_lowercase();
        let mut histories = self
            .histories
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // Re-checked under the write lock so concurrent callers share one record.
        histories
            .entry(key.clone())
            .or_insert_with(|| {
                tracing::debug!("Creating history for '{}'", key);
                Arc::new(LocationHistory::new(key.clone(), self.settings))
            })
            .clone()
    }

    /// Record a reading for `alias`.
    pub fn record(&self, alias: &str, value: f64, timestamp: DateTime<Utc>) {
        self.get_or_create(alias).insert(value, timestamp);
    }

    /// Known location aliases, sorted.
    pub fn locations(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self
            .histories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        aliases.sort();
        aliases
    }

    pub fn len(&self) -> usize {
        self.histories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn settings() -> HistorySettings {
        HistorySettings {
            max_age: Duration::minutes(60),
            recent_cutoff: Duration::minutes(5),
            average_window: Duration::minutes(5),
        }
    }

    /// Values 100..1 inserted at matching ages, oldest first.
    fn filled(now: DateTime<Utc>) -> LocationHistory {
        let history = LocationHistory::new("test", settings());
        for x in (1..=100).rev() {
            history.insert_at(x as f64, now - Duration::minutes(x), now);
        }
        history
    }

    #[test]
    fn test_prune_keeps_boundary_point() {
        let now = Utc::now();
        let history = filled(now);

        assert_eq!(history.len(), 60);
        let points = history.snapshot();
        assert_eq!(points.first().map(|p| p.value), Some(1.0));
        assert_eq!(points.last().map(|p| p.value), Some(60.0));
    }

    #[test]
    fn test_current_returns_newest() {
        let now = Utc::now();
        let history = filled(now);
        assert_eq!(history.current_at(now), Ok(1.0));
    }

    #[test]
    fn test_current_requires_recent_point() {
        let now = Utc::now();
        let history = LocationHistory::new("attic", settings());
        assert_eq!(history.current_at(now), Err(HistoryError::NoRecentData));

        history.insert_at(72.0, now - Duration::minutes(6), now);
        assert_eq!(history.current_at(now), Err(HistoryError::NoRecentData));

        history.insert_at(72.5, now - Duration::minutes(5), now);
        assert_eq!(history.current_at(now), Ok(72.5));
    }

    #[test]
    fn test_average_window_is_inclusive() {
        let now = Utc::now();
        let history = filled(now);

        // Ages 1..=5 minutes: (1 + 2 + 3 + 4 + 5) / 5
        assert_eq!(history.average_at(Duration::minutes(5), now), Ok(3.0));
        // Ages 1..=10 minutes
        assert_eq!(history.average_at(Duration::minutes(10), now), Ok(5.5));
    }

    #[test]
    fn test_average_rounds_to_two_places() {
        let now = Utc::now();
        let history = LocationHistory::new("office", settings());
        history.insert_at(70.0, now - Duration::minutes(2), now);
        history.insert_at(70.0, now - Duration::minutes(1), now);
        history.insert_at(70.5, now, now);
        assert_eq!(history.average_at(Duration::minutes(5), now), Ok(70.17));
    }

    #[test]
    fn test_average_without_points_in_window() {
        let now = Utc::now();
        let history = LocationHistory::new("garage", settings());
        assert_eq!(history.average_at(Duration::minutes(5), now), Err(HistoryError::NoData));

        history.insert_at(50.0, now - Duration::minutes(30), now);
        assert_eq!(history.average_at(Duration::minutes(5), now), Err(HistoryError::NoData));
    }

    #[test]
    fn test_later_prune_drops_aged_points() {
        let now = Utc::now();
        let history = filled(now);
        history.prune_at(now + Duration::minutes(30));
        // Ages are now 31..=90; only 31..=60 survive.
        assert_eq!(history.len(), 30);
    }

    #[test]
    fn test_locations_do_not_share_buffers() {
        let registry = HistoryRegistry::new(settings());
        let now = Utc::now();
        registry.record("kitchen", 68.0, now);
        registry.record("bedroom", 64.0, now);
        registry.record("bedroom", 64.5, now);

        assert_eq!(registry.get("kitchen").map(|h| h.len()), Some(1));
        assert_eq!(registry.get("bedroom").map(|h| h.len()), Some(2));
        assert_eq!(registry.locations(), vec!["bedroom", "kitchen"]);
    }

    #[test]
    fn test_registry_lookup_is_case_insensitive() {
        let registry = HistoryRegistry::new(settings());
        registry.record("ServerRoom", 80.0, Utc::now());
        assert!(registry.get("serverroom").is_some());
        assert!(Arc::ptr_eq(
            &registry.get_or_create("SERVERROOM"),
            &registry.get_or_create("serverroom")
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_concurrent_reads_during_writes() {
        let registry = Arc::new(HistoryRegistry::new(settings()));
        let history = registry.get_or_create("crawlspace");

        let writer = {
            let history = history.clone();
            thread::spawn(move || {
                for i in 0..500 {
                    history.insert(55.0 + (i % 3) as f64, Utc::now());
                }
            })
        };

        let reader = {
            let registry = registry.clone();
            thread::spawn(move || {
                for _ in 0..500 {
                    if let Some(h) = registry.get("crawlspace") {
                        if let Ok(avg) = h.average() {
                            assert!((55.0..=57.0).contains(&avg));
                        }
                    }
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(history.len(), 500);
        assert_eq!(history.datapoint_count(), 500);
    }
}
