//! # Device Access
//!
//! Everything that talks to the meter goes through the [`ProfileSource`] trait. The
//! production implementation, [`FetchClient`], issues one HTTP GET per call against
//! the meter's `getPowerProfile` endpoint and streams the reply body straight into the
//! profile parser, so a slow device never forces the whole document into memory first.
//!
//! ## Failure classes
//!
//! * Connection, timeout and body-transfer failures, as well as non-success HTTP
//!   replies, come back as network errors ([`Error::is_network`]).
//! * A body that is not a well-formed profile document comes back as a parse error
//!   ([`Error::is_parse`]).
//! * A well-formed document without samples is a successful, empty profile.
//!
//! ## Example
//!
//! ```rust,no_run
//! use smartmeter::client::{FetchClient, ProfileSource};
//! use smartmeter::config::MeterConfig;
//!
//! #[tokio::main]
//! async fn main() -> smartmeter::Result<()> {
//!     let client = FetchClient::new(&MeterConfig::new("192.168.1.40"))?;
//!
//!     // Latest single reading
//!     let profile = client.fetch(0, 1).await?;
//!     println!("{} W", profile.last_wattage().unwrap_or_default());
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use futures::TryStreamExt;
#[cfg(test)]
use mockall::automock;
use reqwest::Url;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::config::MeterConfig;
use crate::error::{Error, Result};
use crate::profile::{parse_profile_async, PowerProfile};

pub mod constants;

use constants::{params, PROFILE_PATH};

/// A source of power profiles
///
/// `offset_seconds` is how far in the past the returned profile starts (`0` is now) and
/// `max_samples` caps the number of readings returned.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Performs one request and returns the complete profile
    async fn fetch(&self, offset_seconds: u64, max_samples: u32) -> Result<PowerProfile>;

    /// Like [`fetch`](Self::fetch), but abandons the read once `cancel` fires
    ///
    /// Returns `Err(Error::Cancelled)` when the token wins; whatever the device had sent
    /// so far is discarded.
    async fn fetch_cancellable(
        &self,
        offset_seconds: u64,
        max_samples: u32,
        cancel: &CancellationToken,
    ) -> Result<PowerProfile> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = self.fetch(offset_seconds, max_samples) => result,
        }
    }
}

/// HTTP client for one meter
#[derive(Debug, Clone)]
pub struct FetchClient {
    host: String,
    endpoint: Url,
    http: reqwest::Client,
}

impl FetchClient {
    /// Creates a client for the host named in `config`
    ///
    /// # Returns
    ///
    /// * `Ok(FetchClient)` - Ready to issue requests; nothing is sent yet
    /// * `Err(Error::InvalidConfig)` - If the configuration does not validate or the host
    ///   does not form a valid URL
    pub fn new(config: &MeterConfig) -> Result<Self> {
        config.validate()?;
        let host = config.host.trim().to_string();
        let endpoint = Url::parse(&format!("http://{host}{PROFILE_PATH}"))
            .map_err(|e| Error::invalid_config(format!("host {host:?} does not form a valid URL: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| Error::runtime(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { host, endpoint, http })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// The full request URL for the given window
    pub fn request_url(&self, offset_seconds: u64, max_samples: u32) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair(params::OFFSET, &offset_seconds.to_string())
            .append_pair(params::COUNT, &max_samples.to_string());
        url
    }
}

#[async_trait]
impl ProfileSource for FetchClient {
    #[instrument(level = "debug", skip(self), fields(host = %self.host))]
    async fn fetch(&self, offset_seconds: u64, max_samples: u32) -> Result<PowerProfile> {
        let url = self.request_url(offset_seconds, max_samples);
        let response = self.http.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus { status: status.as_u16(), url: url.to_string() });
        }

        let body = response.bytes_stream().map_err(std::io::Error::other);
        let profile = parse_profile_async(StreamReader::new(Box::pin(body))).await?;

        debug!(samples = profile.len(), startts = ?profile.startts(), "profile received");
        Ok(profile)
    }
}
