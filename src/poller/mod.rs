//! # Live Wattage Polling
//!
//! The [`Poller`] asks the meter for its latest single sample (`ts=0`, `n=1`) on a fixed
//! interval and hands the wattage to the registered [`WattageObserver`].
//!
//! ## Single-flight
//!
//! At most one poll request is outstanding at any time. A tick that fires while the
//! previous request is still pending, or while no observer is registered, does nothing.
//!
//! ## Failures
//!
//! A failed poll is logged at debug level and otherwise ignored: no retry, no backoff,
//! no error delivered. The next scheduled tick is the retry.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use smartmeter::client::FetchClient;
//! use smartmeter::config::MeterConfig;
//! use smartmeter::dispatch::SerialDispatcher;
//! use smartmeter::history::HistoryStore;
//! use smartmeter::poller::Poller;
//!
//! #[tokio::main]
//! async fn main() -> smartmeter::Result<()> {
//!     let config = MeterConfig::new("192.168.1.40");
//!     let poller = Poller::new(
//!         Arc::new(FetchClient::new(&config)?),
//!         HistoryStore::new(config.sample_interval()),
//!         Arc::new(SerialDispatcher::new()?),
//!     );
//!
//!     poller.register_observer(Arc::new(|watts: i64| println!("{watts} W")));
//!     poller.start(Duration::from_secs(1))?;
//!     tokio::time::sleep(Duration::from_secs(10)).await;
//!     poller.stop();
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{SubsecRound, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

use crate::client::ProfileSource;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::history::HistoryStore;

/// Receives live wattage readings
pub trait WattageObserver: Send + Sync {
    fn did_update_wattage(&self, watts: i64);
}

impl<F> WattageObserver for F
where
    F: Fn(i64) + Send + Sync,
{
    fn did_update_wattage(&self, watts: i64) {
        self(watts)
    }
}

struct PollerShared {
    source: Arc<dyn ProfileSource>,
    history: HistoryStore,
    dispatcher: Arc<dyn Dispatcher>,
    observer: RwLock<Option<Arc<dyn WattageObserver>>>,
    in_flight: AtomicBool,
    // Bumped on every start/stop so results of requests issued under an older
    // schedule can be recognised and dropped.
    generation: AtomicU64,
}

impl PollerShared {
    fn tick(self: &Arc<Self>, runtime: &Handle, generation: u64) -> bool {
        if self.observer.read().is_none() {
            trace!("no observer registered; skipping tick");
            return false;
        }
        if self.in_flight.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            trace!("previous poll still pending; skipping tick");
            return false;
        }

        let shared = Arc::clone(self);
        runtime.spawn(async move {
            let _pending = scopeguard::guard(&shared.in_flight, |flag| flag.store(false, Ordering::Release));
            let requested_at = Utc::now().trunc_subsecs(0);

            match shared.source.fetch(0, 1).await {
                Ok(profile) => {
                    if shared.generation.load(Ordering::Acquire) != generation {
                        debug!("poller stopped while request was pending; discarding result");
                        return;
                    }
                    shared.history.merge(&profile, requested_at);
                    match profile.last_wattage() {
                        Some(watts) => shared.deliver(watts),
                        None => trace!("poll returned no samples"),
                    }
                },
                Err(error) => debug!(%error, "poll failed; waiting for next tick"),
            }
        });
        true
    }

    fn deliver(self: &Arc<Self>, watts: i64) {
        let shared = Arc::clone(self);
        self.dispatcher.dispatch(Box::new(move || {
            let observer = shared.observer.read().clone();
            if let Some(observer) = observer {
                observer.did_update_wattage(watts);
            }
        }));
    }
}

/// Periodic single-sample poller with single-flight semantics
pub struct Poller {
    shared: Arc<PollerShared>,
    schedule: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    /// Creates an idle poller; nothing is requested until [`start`](Self::start) or
    /// [`tick`](Self::tick) is called
    pub fn new(source: Arc<dyn ProfileSource>, history: HistoryStore, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            shared: Arc::new(PollerShared {
                source,
                history,
                dispatcher,
                observer: RwLock::new(None),
                in_flight: AtomicBool::new(false),
                generation: AtomicU64::new(0),
            }),
            schedule: Mutex::new(None),
        }
    }

    /// Installs `observer`, returning the one it replaces
    pub fn register_observer(&self, observer: Arc<dyn WattageObserver>) -> Option<Arc<dyn WattageObserver>> {
        self.shared.observer.write().replace(observer)
    }

    /// Removes the current observer; readings not yet delivered are dropped
    pub fn unregister_observer(&self) -> Option<Arc<dyn WattageObserver>> {
        self.shared.observer.write().take()
    }

    pub fn has_observer(&self) -> bool {
        self.shared.observer.read().is_some()
    }

    /// Starts polling every `interval`, beginning with an immediate tick
    ///
    /// Calling `start` while running replaces the schedule.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the schedule was installed
    /// * `Err(Error::InvalidConfig)` - If `interval` is zero
    /// * `Err(Error::Runtime)` - If called outside a Tokio runtime
    pub fn start(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(Error::invalid_config("poll interval must be greater than zero"));
        }
        let runtime = Handle::try_current()
            .map_err(|e| Error::runtime(format!("polling needs a Tokio runtime: {e}")))?;

        let mut schedule = self.schedule.lock();
        if let Some(previous) = schedule.take() {
            previous.abort();
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let shared = Arc::clone(&self.shared);
        let handle = runtime.clone();
        *schedule = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                shared.tick(&handle, generation);
            }
        }));

        info!(?interval, "wattage polling started");
        Ok(())
    }

    /// Cancels the schedule
    ///
    /// A request already in flight is not interrupted, but its result is discarded.
    pub fn stop(&self) {
        if let Some(schedule) = self.schedule.lock().take() {
            schedule.abort();
            self.shared.generation.fetch_add(1, Ordering::AcqRel);
            info!("wattage polling stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.schedule.lock().as_ref().is_some_and(|schedule| !schedule.is_finished())
    }

    /// True while a poll request is outstanding
    pub fn is_in_flight(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Runs one poll step outside the schedule
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - A request was issued
    /// * `Ok(false)` - The tick was skipped because a request is still pending or no
    ///   observer is registered
    /// * `Err(Error::Runtime)` - If called outside a Tokio runtime
    pub fn tick(&self) -> Result<bool> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::runtime(format!("polling needs a Tokio runtime: {e}")))?;
        let generation = self.shared.generation.load(Ordering::Acquire);
        Ok(self.shared.tick(&runtime, generation))
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        if let Some(schedule) = self.schedule.get_mut().take() {
            schedule.abort();
        }
        // A request still in flight must not reach history or the observer.
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
    }
}
