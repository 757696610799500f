//! # Power Meter
//!
//! [`PowerMeter`] ties the pieces together for one device: a [`FetchClient`], a shared
//! [`HistoryStore`], the live [`Poller`] and the [`RangeFetcher`]. Both the poller and
//! range fetches write into the same history, and every callback is delivered through
//! one [`Dispatcher`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use smartmeter::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let meter = PowerMeter::new(MeterConfig::new("192.168.1.40"))?;
//!
//!     meter.register_observer(Arc::new(|watts: i64| println!("now: {watts} W")));
//!     meter.start_default_polling()?;
//!
//!     let outcome = meter.fetch_history(Duration::from_secs(600), |_| {})?.wait().await;
//!     println!("{outcome:?}, {} samples stored", meter.history().count());
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::client::{FetchClient, ProfileSource};
use crate::config::MeterConfig;
use crate::dispatch::{Dispatcher, SerialDispatcher};
use crate::error::Result;
use crate::history::HistoryStore;
use crate::poller::{Poller, WattageObserver};
use crate::range::{RangeEvent, RangeFetchHandle, RangeFetcher};

/// Client for a single residential power meter
pub struct PowerMeter {
    config: MeterConfig,
    history: HistoryStore,
    poller: Poller,
    ranges: RangeFetcher,
}

impl PowerMeter {
    /// Connects to the device described by `config`
    ///
    /// Callbacks run on a [`SerialDispatcher`] spawned on the current runtime.
    ///
    /// # Returns
    ///
    /// * `Ok(PowerMeter)` - Ready to poll; no request has been sent yet
    /// * `Err(Error::InvalidConfig)` - If `config` fails validation
    /// * `Err(Error::Runtime)` - If called outside a Tokio runtime
    ///
    /// [`Error::InvalidConfig`]: crate::Error::InvalidConfig
    /// [`Error::Runtime`]: crate::Error::Runtime
    pub fn new(config: MeterConfig) -> Result<Self> {
        let source = Arc::new(FetchClient::new(&config)?);
        let dispatcher = Arc::new(SerialDispatcher::new()?);
        Self::with_parts(config, source, dispatcher)
    }

    /// Builds a meter from an explicit profile source and delivery context
    pub fn with_parts(
        config: MeterConfig,
        source: Arc<dyn ProfileSource>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Self> {
        config.validate()?;
        let history = HistoryStore::new(config.sample_interval());
        let poller = Poller::new(Arc::clone(&source), history.clone(), Arc::clone(&dispatcher));
        let ranges = RangeFetcher::new(source, history.clone(), dispatcher, &config);
        debug!(host = %config.host, "power meter created");
        Ok(Self { config, history, poller, ranges })
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn config(&self) -> &MeterConfig {
        &self.config
    }

    /// Samples collected so far by polling and range fetches
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Installs the live wattage observer, returning the one it replaces
    pub fn register_observer(&self, observer: Arc<dyn WattageObserver>) -> Option<Arc<dyn WattageObserver>> {
        self.poller.register_observer(observer)
    }

    pub fn unregister_observer(&self) -> Option<Arc<dyn WattageObserver>> {
        self.poller.unregister_observer()
    }

    /// Starts polling every `interval`; see [`Poller::start`]
    pub fn start_polling(&self, interval: Duration) -> Result<()> {
        self.poller.start(interval)
    }

    /// Starts polling at the configured `poll_interval_ms`
    pub fn start_default_polling(&self) -> Result<()> {
        self.poller.start(self.config.poll_interval())
    }

    pub fn stop_polling(&self) {
        self.poller.stop();
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }

    /// Fetches the most recent `timespan` of history; see [`RangeFetcher::fetch_range`]
    pub fn fetch_history<F>(&self, timespan: Duration, on_event: F) -> Result<RangeFetchHandle>
    where
        F: FnMut(RangeEvent) + Send + 'static,
    {
        self.ranges.fetch_range(timespan, on_event)
    }

    /// True while a history fetch is running
    pub fn is_fetching_history(&self) -> bool {
        self.ranges.is_active()
    }
}
