//! # Meter Configuration
//!
//! `MeterConfig` carries everything the client needs to talk to one device: its
//! address, request timeouts, the device's sampling cadence and the per-request
//! sample ceiling used to split historical transfers into chunks.
//!
//! ```rust
//! use smartmeter::config::MeterConfig;
//! use std::time::Duration;
//!
//! let config = MeterConfig::new("192.168.1.40")
//!     .with_poll_interval(Duration::from_secs(2))
//!     .with_max_samples_per_request(300);
//! assert!(config.validate().is_ok());
//! ```
//!
//! Configurations can also be read from JSON, with missing fields falling back to
//! their defaults:
//!
//! ```rust
//! use smartmeter::config::MeterConfig;
//!
//! let config = MeterConfig::from_json(r#"{ "host": "meter.local:8080" }"#).unwrap();
//! assert_eq!(config.max_samples_per_request, 100);
//! ```

use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::client::constants::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_MAX_HISTORY_SECS, DEFAULT_MAX_SAMPLES_PER_REQUEST, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_SAMPLE_INTERVAL_SECS, MAX_HISTORY_SECS_LIMIT,
};
use crate::error::{Error, Result};

/// Connection and scheduling settings for a single power meter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// Device host, optionally with a port (`"10.0.0.7"`, `"meter.local:8080"`)
    pub host: String,
    /// Default interval for live wattage polling
    pub poll_interval_ms: u64,
    /// Upper bound for a whole request, including the body transfer
    pub request_timeout_ms: u64,
    /// Upper bound for establishing the TCP connection
    pub connect_timeout_ms: u64,
    /// Spacing between consecutive samples reported by the device
    pub sample_interval_secs: u64,
    /// Largest `n` the device accepts in a single request
    pub max_samples_per_request: u32,
    /// How far back the device retains samples
    pub max_history_secs: u64,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            sample_interval_secs: DEFAULT_SAMPLE_INTERVAL_SECS,
            max_samples_per_request: DEFAULT_MAX_SAMPLES_PER_REQUEST,
            max_history_secs: DEFAULT_MAX_HISTORY_SECS,
        }
    }
}

impl MeterConfig {
    /// Creates a configuration for `host` with every other setting at its default
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into(), ..Self::default() }
    }

    /// Parses a JSON document; absent fields take their default values
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::invalid_config(format!("malformed JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = duration_millis(interval);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = duration_millis(timeout);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = duration_millis(timeout);
        self
    }

    pub fn with_sample_interval_secs(mut self, secs: u64) -> Self {
        self.sample_interval_secs = secs;
        self
    }

    pub fn with_max_samples_per_request(mut self, samples: u32) -> Self {
        self.max_samples_per_request = samples;
        self
    }

    pub fn with_max_history(mut self, span: Duration) -> Self {
        self.max_history_secs = span.as_secs();
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn sample_interval(&self) -> TimeDelta {
        i64::try_from(self.sample_interval_secs).ok().and_then(TimeDelta::try_seconds).unwrap_or(TimeDelta::MAX)
    }

    pub fn max_history(&self) -> Duration {
        Duration::from_secs(self.max_history_secs)
    }

    /// Checks that the configuration describes a reachable, well-formed device setup
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If every field is usable
    /// * `Err(Error::InvalidConfig)` - Naming the first offending field
    pub fn validate(&self) -> Result<()> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(Error::invalid_config("host must not be empty"));
        }
        if host.contains("://") || host.contains('/') {
            return Err(Error::invalid_config(format!("host must be a bare host[:port], got {:?}", self.host)));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::invalid_config("poll_interval_ms must be greater than zero"));
        }
        if self.request_timeout_ms == 0 || self.connect_timeout_ms == 0 {
            return Err(Error::invalid_config("timeouts must be greater than zero"));
        }
        // One day of spacing is already far beyond anything a meter reports.
        if self.sample_interval_secs == 0 || self.sample_interval_secs > 86_400 {
            return Err(Error::invalid_config("sample_interval_secs must be between 1 and 86400"));
        }
        if self.max_samples_per_request == 0 {
            return Err(Error::invalid_config("max_samples_per_request must be greater than zero"));
        }
        if self.max_history_secs == 0 || self.max_history_secs > MAX_HISTORY_SECS_LIMIT {
            return Err(Error::invalid_config(format!(
                "max_history_secs must be between 1 and {MAX_HISTORY_SECS_LIMIT}"
            )));
        }
        Ok(())
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
