//! smartmeter - An async client for residential power meters
//!
//! This crate talks to power meters that publish their readings over plain HTTP as
//! small XML "power profile" documents. It keeps a live wattage reading flowing to an
//! observer and pulls bounded windows of historical samples into an in-memory time
//! series.
//!
//! # Features
//!
//! - **Profile Parsing**: Incremental XML parsing into wattage profiles
//! - **Live Polling**: Single-flight periodic polling of the latest reading
//! - **History**: Deduplicated, time-ordered sample storage
//! - **Range Fetching**: Chunked, cancellable retrieval of historical windows with progress
//!
//! # Examples
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
//!     // Live readings
//!     meter.register_observer(Arc::new(|watts: i64| println!("{watts} W")));
//!     meter.start_polling(Duration::from_secs(1))?;
//!
//!     // Last five minutes of history
//!     let handle = meter.fetch_history(Duration::from_secs(300), |event| {
//!         if let RangeEvent::Progress(progress) = event {
//!             println!("{:.0}% done", progress.fraction_complete() * 100.0);
//!         }
//!     })?;
//!     handle.wait().await;
//!
//!     for sample in meter.history().samples() {
//!         println!("{} {}", sample.timestamp, sample.watts);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! Every fallible operation returns [`Result`]. Callers usually only need to tell
//! network failures from malformed replies:
//!
//! ```rust
//! use smartmeter::{Error, Result};
//!
//! fn describe(result: Result<()>) -> &'static str {
//!     match result {
//!         Ok(()) => "ok",
//!         Err(e) if e.is_network() => "meter unreachable",
//!         Err(e) if e.is_parse() => "meter sent garbage",
//!         Err(Error::FetchInProgress) => "busy",
//!         Err(_) => "other",
//!     }
//! }
//! ```
//!
//! # Runtime
//!
//! Network work runs on Tokio tasks. Constructors that spawn tasks must be called from
//! within a Tokio runtime; observers and progress callbacks are delivered through a
//! [`dispatch::Dispatcher`] of the caller's choosing.

#![doc(html_root_url = "https://docs.rs/smartmeter/0.1.0")]

pub mod error;

pub use error::{Error, Result};

pub mod client;
pub mod config;
pub mod dispatch;
pub mod history;
pub mod meter;
pub mod poller;
pub mod profile;
pub mod range;


/// Re-export common types for convenience
pub mod prelude {
    pub use crate::client::{FetchClient, ProfileSource};
    pub use crate::config::MeterConfig;
    pub use crate::dispatch::{ChannelDispatcher, Dispatcher, InlineDispatcher, SerialDispatcher};
    pub use crate::history::{HistorySeries, HistoryStore};
    pub use crate::meter::PowerMeter;
    pub use crate::poller::{Poller, WattageObserver};
    pub use crate::profile::{PowerProfile, Sample};
    pub use crate::range::{RangeEvent, RangeFetchHandle, RangeFetcher, RangeOutcome, RangeProgress};
    pub use crate::Error;
    pub use crate::Result;
}
