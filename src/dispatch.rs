//! # Callback Delivery
//!
//! Network work runs on background tasks, but observers and progress callbacks must all
//! run on one consistent context chosen by the consumer. A [`Dispatcher`] is that
//! context: components hand it boxed jobs and it runs them in submission order.
//!
//! * [`SerialDispatcher`] runs jobs one at a time on a dedicated Tokio task.
//! * [`ChannelDispatcher`] hands jobs to a receiver the consumer drains on its own
//!   thread, e.g. once per frame of a UI loop.
//! * [`InlineDispatcher`] runs jobs immediately on whichever task produced them.
//!
//! ```rust
//! use smartmeter::dispatch::{ChannelDispatcher, Dispatcher};
//!
//! let (dispatcher, mut jobs) = ChannelDispatcher::channel();
//! dispatcher.dispatch(Box::new(|| println!("delivered")));
//!
//! // On the consumer's own thread:
//! while let Ok(job) = jobs.try_recv() {
//!     job();
//! }
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};

use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{Error, Result};

/// A unit of callback work
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// The execution context on which results are delivered
pub trait Dispatcher: Send + Sync {
    /// Queues `job`; jobs from one dispatcher run in the order they were queued
    fn dispatch(&self, job: Job);
}

/// Forwards jobs to a receiver drained by the consumer
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::UnboundedSender<Job>,
}

impl ChannelDispatcher {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Job>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Dispatcher for ChannelDispatcher {
    fn dispatch(&self, job: Job) {
        if self.tx.send(job).is_err() {
            warn!("callback receiver dropped; discarding job");
        }
    }
}

/// Runs jobs sequentially on a dedicated Tokio task
///
/// A panicking job is logged and does not stop later jobs from running. The task ends
/// once the dispatcher is dropped and the queue is drained.
#[derive(Debug, Clone)]
pub struct SerialDispatcher {
    inner: ChannelDispatcher,
}

impl SerialDispatcher {
    /// Spawns the delivery task on the current Tokio runtime
    ///
    /// # Returns
    ///
    /// * `Ok(SerialDispatcher)` - Ready to accept jobs
    /// * `Err(Error::Runtime)` - If called outside a Tokio runtime
    pub fn new() -> Result<Self> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::runtime(format!("SerialDispatcher needs a Tokio runtime: {e}")))?;

        let (inner, mut jobs) = ChannelDispatcher::channel();
        handle.spawn(async move {
            while let Some(job) = jobs.recv().await {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    warn!("callback panicked");
                }
            }
        });
        Ok(Self { inner })
    }
}

impl Dispatcher for SerialDispatcher {
    fn dispatch(&self, job: Job) {
        self.inner.dispatch(job);
    }
}

/// Runs every job immediately on the caller's task
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, job: Job) {
        job();
    }
}
