//! # Historical Range Retrieval
//!
//! The meter only hands out a bounded number of samples per request, so a historical
//! window is fetched as a series of chunks, oldest first. Each chunk is merged into the
//! [`HistoryStore`] as soon as it arrives, followed by a [`RangeEvent::Progress`]
//! callback; the operation always ends with exactly one [`RangeEvent::Finished`].
//!
//! ## Ordering
//!
//! Chunks are strictly sequential: chunk `n + 1` is not requested before chunk `n`
//! has succeeded or failed.
//!
//! ## Cancellation
//!
//! [`RangeFetchHandle::cancel`] is cooperative. It is checked before each chunk; a chunk
//! already in flight is allowed to finish and is still merged.
//!
//! ## Failure
//!
//! A failed chunk ends the operation with [`RangeOutcome::Failed`]. Chunks merged
//! before the failure stay in the store.
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
//! use smartmeter::range::{RangeEvent, RangeFetcher};
//!
//! #[tokio::main]
//! async fn main() -> smartmeter::Result<()> {
//!     let config = MeterConfig::new("192.168.1.40");
//!     let history = HistoryStore::new(config.sample_interval());
//!     let fetcher = RangeFetcher::new(
//!         Arc::new(FetchClient::new(&config)?),
//!         history.clone(),
//!         Arc::new(SerialDispatcher::new()?),
//!         &config,
//!     );
//!
//!     let handle = fetcher.fetch_range(Duration::from_secs(15 * 60), |event| match event {
//!         RangeEvent::Progress(p) => println!("{:.0}%", p.fraction_complete() * 100.0),
//!         RangeEvent::Finished(outcome) => println!("done: {outcome:?}"),
//!     })?;
//!
//!     handle.wait().await;
//!     println!("{} samples in history", history.count());
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::ProfileSource;
use crate::config::MeterConfig;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::history::HistoryStore;

/// How much of a range fetch is left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeProgress {
    pub remaining_seconds: u64,
    pub total_seconds: u64,
}

impl RangeProgress {
    /// Share of the requested span already transferred, from `0.0` to `1.0`
    pub fn fraction_complete(&self) -> f64 {
        if self.total_seconds == 0 {
            return 1.0;
        }
        let done = self.total_seconds.saturating_sub(self.remaining_seconds);
        done as f64 / self.total_seconds as f64
    }

    pub fn is_complete(&self) -> bool {
        self.remaining_seconds == 0
    }
}

/// How a range fetch ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeOutcome {
    /// Every chunk was fetched and merged
    Completed { samples_added: usize },
    /// `cancel()` was observed at a chunk boundary
    Cancelled { remaining_seconds: u64 },
    /// A chunk failed; earlier chunks remain merged
    Failed { error: Error, remaining_seconds: u64 },
}

impl RangeOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RangeOutcome::Completed { .. })
    }
}

/// Callback payload for a range fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeEvent {
    /// Sent after each merged chunk, with strictly decreasing `remaining_seconds`
    Progress(RangeProgress),
    /// Sent exactly once, last
    Finished(RangeOutcome),
}

/// Per-invocation chunk bookkeeping
#[derive(Debug, Clone, Copy)]
struct RangeFetchState {
    remaining_samples: u64,
    total_samples: u64,
    chunk_size: u32,
    interval_secs: u64,
}

impl RangeFetchState {
    fn new(span_secs: u64, interval_secs: u64, chunk_size: u32) -> Self {
        let interval_secs = interval_secs.max(1);
        let total_samples = span_secs.div_ceil(interval_secs);
        Self { remaining_samples: total_samples, total_samples, chunk_size: chunk_size.max(1), interval_secs }
    }

    /// `(offset_seconds, max_samples)` for the next request, oldest window first
    fn next_chunk(&self) -> Option<(u64, u32)> {
        if self.remaining_samples == 0 {
            return None;
        }
        let count = self.remaining_samples.min(u64::from(self.chunk_size));
        // count <= chunk_size, so it always fits
        let count = u32::try_from(count).unwrap_or(self.chunk_size);
        Some((self.remaining_seconds(), count))
    }

    fn complete_chunk(&mut self, count: u32) {
        self.remaining_samples = self.remaining_samples.saturating_sub(u64::from(count));
    }

    fn remaining_seconds(&self) -> u64 {
        self.remaining_samples.saturating_mul(self.interval_secs)
    }

    fn progress(&self) -> RangeProgress {
        RangeProgress {
            remaining_seconds: self.remaining_seconds(),
            total_seconds: self.total_samples.saturating_mul(self.interval_secs),
        }
    }
}

/// Handle to a running range fetch
///
/// Dropping the handle does not cancel the fetch.
#[derive(Debug)]
pub struct RangeFetchHandle {
    token: CancellationToken,
    task: JoinHandle<RangeOutcome>,
}

impl RangeFetchHandle {
    /// Requests cancellation at the next chunk boundary
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// A token that cancels this fetch, for callers that cannot hold the handle
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Waits for the fetch to end and returns its outcome
    pub async fn wait(self) -> RangeOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => RangeOutcome::Cancelled { remaining_seconds: 0 },
        }
    }
}

/// Fetches bounded historical windows chunk by chunk
pub struct RangeFetcher {
    source: Arc<dyn ProfileSource>,
    history: HistoryStore,
    dispatcher: Arc<dyn Dispatcher>,
    chunk_size: u32,
    interval_secs: u64,
    max_span: Duration,
    active: Arc<AtomicBool>,
}

impl RangeFetcher {
    pub fn new(
        source: Arc<dyn ProfileSource>,
        history: HistoryStore,
        dispatcher: Arc<dyn Dispatcher>,
        config: &MeterConfig,
    ) -> Self {
        Self {
            source,
            history,
            dispatcher,
            chunk_size: config.max_samples_per_request,
            interval_secs: config.sample_interval_secs,
            max_span: config.max_history(),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// True while a range fetch is running
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Starts fetching the most recent `timespan` of history in the background
    ///
    /// Spans beyond the device's retention are clamped to it. `on_event` runs on the
    /// dispatcher's context, never on the task doing the network work.
    ///
    /// # Returns
    ///
    /// * `Ok(RangeFetchHandle)` - The fetch is running
    /// * `Err(Error::FetchInProgress)` - If another range fetch has not finished yet
    /// * `Err(Error::Runtime)` - If called outside a Tokio runtime
    pub fn fetch_range<F>(&self, timespan: Duration, on_event: F) -> Result<RangeFetchHandle>
    where
        F: FnMut(RangeEvent) + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::runtime(format!("range fetch needs a Tokio runtime: {e}")))?;
        if self.active.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return Err(Error::FetchInProgress);
        }

        let span = timespan.min(self.max_span);
        if span < timespan {
            debug!(requested = ?timespan, clamped = ?span, "range clamped to device retention");
        }

        let job = RangeJob {
            source: Arc::clone(&self.source),
            history: self.history.clone(),
            events: EventSink { dispatcher: Arc::clone(&self.dispatcher), callback: Arc::new(Mutex::new(on_event)) },
            state: RangeFetchState::new(span.as_secs(), self.interval_secs, self.chunk_size),
            token: CancellationToken::new(),
            active: Arc::clone(&self.active),
        };
        let token = job.token.clone();
        let task = runtime.spawn(job.run());

        Ok(RangeFetchHandle { token, task })
    }
}

struct EventSink<F> {
    dispatcher: Arc<dyn Dispatcher>,
    callback: Arc<Mutex<F>>,
}

impl<F> EventSink<F>
where
    F: FnMut(RangeEvent) + Send + 'static,
{
    fn emit(&self, event: RangeEvent) {
        let callback = Arc::clone(&self.callback);
        self.dispatcher.dispatch(Box::new(move || {
            let mut callback = callback.lock();
            (*callback)(event);
        }));
    }
}

struct RangeJob<F> {
    source: Arc<dyn ProfileSource>,
    history: HistoryStore,
    events: EventSink<F>,
    state: RangeFetchState,
    token: CancellationToken,
    active: Arc<AtomicBool>,
}

impl<F> RangeJob<F>
where
    F: FnMut(RangeEvent) + Send + 'static,
{
    async fn run(mut self) -> RangeOutcome {
        let active = scopeguard::guard(Arc::clone(&self.active), |active| active.store(false, Ordering::Release));
        info!(seconds = self.state.progress().total_seconds, "range fetch started");

        let mut samples_added = 0;
        let outcome = loop {
            let Some((offset_seconds, count)) = self.state.next_chunk() else {
                break RangeOutcome::Completed { samples_added };
            };
            if self.token.is_cancelled() {
                info!(remaining_seconds = self.state.remaining_seconds(), "range fetch cancelled");
                break RangeOutcome::Cancelled { remaining_seconds: self.state.remaining_seconds() };
            }

            let requested_at = Utc::now();
            match self.source.fetch(offset_seconds, count).await {
                Ok(profile) => {
                    let Some(anchor) = window_start(requested_at, offset_seconds) else {
                        let error = Error::invalid_config(format!("offset of {offset_seconds}s reaches before any representable time"));
                        warn!(%error, "range fetch aborted");
                        break RangeOutcome::Failed { error, remaining_seconds: self.state.remaining_seconds() };
                    };
                    samples_added += self.history.merge(&profile, anchor);
                },
                Err(error) => {
                    warn!(%error, offset_seconds, "range chunk failed; aborting");
                    break RangeOutcome::Failed { error, remaining_seconds: self.state.remaining_seconds() };
                },
            }

            self.state.complete_chunk(count);
            let progress = self.state.progress();
            debug!(offset_seconds, count, remaining_seconds = progress.remaining_seconds, "range chunk merged");
            self.events.emit(RangeEvent::Progress(progress));
        };

        // Free the slot before the consumer hears about the end, so it can start the next fetch.
        drop(active);
        self.events.emit(RangeEvent::Finished(outcome.clone()));
        outcome
    }
}

/// Where a window requested `offset_seconds` back from `requested_at` begins
fn window_start(requested_at: DateTime<Utc>, offset_seconds: u64) -> Option<DateTime<Utc>> {
    let offset = TimeDelta::try_seconds(i64::try_from(offset_seconds).ok()?)?;
    requested_at.checked_sub_signed(offset).map(|start| start.trunc_subsecs(0))
}
