//! # Sample History
//!
//! [`HistorySeries`] is the accumulated time series built from successive profiles:
//! one wattage per timestamp, always in ascending order. A profile covering a range
//! that is already present overwrites the overlapping readings instead of duplicating
//! them, so merging the same profile twice leaves the series unchanged.
//!
//! [`HistoryStore`] is the shared handle used by the poller and the range fetcher.
//! Both may write concurrently, so every access goes through one lock.
//!
//! ```rust
//! use smartmeter::history::HistoryStore;
//! use smartmeter::profile::PowerProfile;
//! use chrono::{TimeDelta, Utc};
//!
//! let store = HistoryStore::new(TimeDelta::seconds(1));
//! let profile = PowerProfile::new(Some("2015-06-15T12:00:00Z".into()), vec![100, 150]);
//!
//! store.merge(&profile, Utc::now());
//! store.merge(&profile, Utc::now());
//! assert_eq!(store.count(), 2);
//! ```

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;

use crate::profile::{PowerProfile, Sample};

/// Ordered, deduplicated wattage readings
#[derive(Debug, Clone)]
pub struct HistorySeries {
    entries: BTreeMap<DateTime<Utc>, i64>,
    interval: TimeDelta,
}

impl HistorySeries {
    /// Creates an empty series whose profiles are spaced by `interval`
    pub fn new(interval: TimeDelta) -> Self {
        Self { entries: BTreeMap::new(), interval }
    }

    pub fn interval(&self) -> TimeDelta {
        self.interval
    }

    /// Inserts every reading of `profile`, overwriting readings at the same timestamp
    ///
    /// `fallback_start` anchors profiles that carry no decodable start timestamp.
    ///
    /// # Returns
    ///
    /// The number of timestamps that were not present before
    pub fn merge(&mut self, profile: &PowerProfile, fallback_start: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        for sample in profile.samples(self.interval, fallback_start) {
            self.entries.insert(sample.timestamp, sample.watts);
        }
        self.entries.len() - before
    }

    pub fn samples(&self) -> Vec<Sample> {
        self.iter().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = Sample> + '_ {
        self.entries.iter().map(|(&timestamp, &watts)| Sample::new(timestamp, watts))
    }

    /// Readings with timestamps inside `range`, in ascending order
    pub fn range(&self, range: RangeInclusive<DateTime<Utc>>) -> Vec<Sample> {
        if range.start() > range.end() {
            return Vec::new();
        }
        self.entries.range(range).map(|(&timestamp, &watts)| Sample::new(timestamp, watts)).collect()
    }

    pub fn get(&self, timestamp: DateTime<Utc>) -> Option<i64> {
        self.entries.get(&timestamp).copied()
    }

    pub fn earliest(&self) -> Option<DateTime<Utc>> {
        self.entries.first_key_value().map(|(&ts, _)| ts)
    }

    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.entries.last_key_value().map(|(&ts, _)| ts)
    }

    pub fn latest_sample(&self) -> Option<Sample> {
        self.entries.last_key_value().map(|(&ts, &watts)| Sample::new(ts, watts))
    }

    pub fn latest_wattage(&self) -> Option<i64> {
        self.entries.last_key_value().map(|(_, &watts)| watts)
    }

    /// Time covered between the earliest and latest reading
    pub fn span(&self) -> Option<TimeDelta> {
        Some(self.latest()? - self.earliest()?)
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Shared, lock-guarded handle to a [`HistorySeries`]
///
/// Cloning the handle shares the underlying series.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    series: Arc<RwLock<HistorySeries>>,
}

impl HistoryStore {
    pub fn new(interval: TimeDelta) -> Self {
        Self { series: Arc::new(RwLock::new(HistorySeries::new(interval))) }
    }

    /// Merges `profile` under the write lock; see [`HistorySeries::merge`]
    pub fn merge(&self, profile: &PowerProfile, fallback_start: DateTime<Utc>) -> usize {
        self.series.write().merge(profile, fallback_start)
    }

    /// Runs `f` against the series while holding the read lock
    pub fn with_series<R>(&self, f: impl FnOnce(&HistorySeries) -> R) -> R {
        f(&*self.series.read())
    }

    /// A copy of the whole series, detached from the store
    pub fn snapshot(&self) -> HistorySeries {
        self.series.read().clone()
    }

    pub fn samples(&self) -> Vec<Sample> {
        self.series.read().samples()
    }

    pub fn range(&self, range: RangeInclusive<DateTime<Utc>>) -> Vec<Sample> {
        self.series.read().range(range)
    }

    pub fn earliest(&self) -> Option<DateTime<Utc>> {
        self.series.read().earliest()
    }

    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.series.read().latest()
    }

    pub fn latest_sample(&self) -> Option<Sample> {
        self.series.read().latest_sample()
    }

    pub fn latest_wattage(&self) -> Option<i64> {
        self.series.read().latest_wattage()
    }

    pub fn span(&self) -> Option<TimeDelta> {
        self.series.read().span()
    }

    pub fn count(&self) -> usize {
        self.series.read().count()
    }

    pub fn is_empty(&self) -> bool {
        self.series.read().is_empty()
    }

    pub fn clear(&self) {
        self.series.write().clear();
    }
}
