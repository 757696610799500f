/// Path of the profile endpoint on the meter's embedded web server
pub const PROFILE_PATH: &str = "/InstantView/request/getPowerProfile.html";

/// Query parameter names
pub mod params {
    /// Offset into the past, in seconds, at which the returned profile starts
    pub const OFFSET: &str = "ts";
    /// Maximum number of samples to return
    pub const COUNT: &str = "n";
}

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_SAMPLE_INTERVAL_SECS: u64 = 1;
pub const DEFAULT_MAX_SAMPLES_PER_REQUEST: u32 = 100;

/// The meter keeps roughly eight hours of samples
pub const DEFAULT_MAX_HISTORY_SECS: u64 = 8 * 60 * 60;

/// Longest retention a configuration may claim; no meter buffers a month of samples
pub const MAX_HISTORY_SECS_LIMIT: u64 = 31 * 24 * 60 * 60;
