//! # Power Profiles
//!
//! A power profile is what one `getPowerProfile` request returns: an optional start
//! timestamp followed by wattage readings at a fixed spacing. Profiles are produced
//! only by [`ProfileParser`], which either yields a complete profile or an error.
//!
//! ## Example
//!
//! ```rust
//! use smartmeter::profile::parse_profile;
//! use chrono::TimeDelta;
//!
//! let xml = br#"<reply>
//!     <header><startts>2015-06-15T12:00:00Z</startts></header>
//!     <v>100</v><v>150</v>
//! </reply>"#;
//!
//! let profile = parse_profile(xml).unwrap();
//! assert_eq!(profile.wattages(), &[100, 150]);
//!
//! let samples: Vec<_> = profile.samples(TimeDelta::seconds(1), profile.start().unwrap()).collect();
//! assert_eq!(samples[1].watts, 150);
//! ```

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

mod parser;
pub mod timestamp;

pub use parser::{parse_profile, parse_profile_async, ParserState, ProfileParser};

/// One wattage reading at an absolute point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub watts: i64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, watts: i64) -> Self {
        Self { timestamp, watts }
    }
}

/// A contiguous batch of readings as returned by one device request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PowerProfile {
    startts: Option<String>,
    start: Option<DateTime<Utc>>,
    wattages: Vec<i64>,
}

impl PowerProfile {
    /// Builds a profile from its parts, decoding `startts` when it is in a known format
    pub fn new(startts: Option<String>, wattages: Vec<i64>) -> Self {
        let start = startts.as_deref().and_then(timestamp::parse_device_timestamp);
        Self { startts, start, wattages }
    }

    /// The `startts` header text exactly as the device sent it
    pub fn startts(&self) -> Option<&str> {
        self.startts.as_deref()
    }

    /// The decoded start timestamp, if the header was present and decodable
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    pub fn wattages(&self) -> &[i64] {
        &self.wattages
    }

    /// The most recent reading; this is what live polling reports
    pub fn last_wattage(&self) -> Option<i64> {
        self.wattages.last().copied()
    }

    pub fn len(&self) -> usize {
        self.wattages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wattages.is_empty()
    }

    /// Returns the readings with absolute timestamps
    ///
    /// Sample `i` is placed at `start + i * interval`, where `start` is the profile's own
    /// start timestamp or `fallback_start` when the device did not send a decodable one.
    /// Readings that would land beyond the representable time range are dropped.
    pub fn samples(&self, interval: TimeDelta, fallback_start: DateTime<Utc>) -> impl Iterator<Item = Sample> + '_ {
        let start = self.start.unwrap_or(fallback_start);
        let step_ms = interval.num_milliseconds();
        self.wattages.iter().enumerate().map_while(move |(index, &watts)| {
            let offset = TimeDelta::try_milliseconds(step_ms.saturating_mul(index as i64))?;
            start.checked_add_signed(offset).map(|timestamp| Sample::new(timestamp, watts))
        })
    }
}

impl std::fmt::Display for PowerProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} samples starting {}", self.wattages.len(), self.startts.as_deref().unwrap_or("<unknown>"))
    }
}
