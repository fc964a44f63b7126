//! Fetcher configuration.
//!
//! `FetchConfig` controls how a single [`HttpUrlFetcher`](crate::net::HttpUrlFetcher)
//! talks to the network: timeouts, the redirect bound and the identity headers
//! it sends.
//!
//! # Examples
//!
//! ## Use defaults
//! ```rust
//! use gosub_fetcher::FetchConfig;
//! let cfg = FetchConfig::default();
//! assert_eq!(cfg.max_redirects, 5);
//! ```
//!
//! ## Customize with the builder
//! ```rust
//! use std::time::Duration;
//! use gosub_fetcher::FetchConfig;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = FetchConfig::builder()
//!     .timeout(Duration::from_secs(10))
//!     .max_redirects(3)
//!     .user_agent("Gosub/0.1")
//!     .build()?; // returns Result<FetchConfig, FetchConfigError>
//! # Ok(()) }
//! ```
//!
//! # Fields (summary)
//! - `timeout`: bound for connecting and for every single body read, used when the
//!   request sets none of its own (default: 2500ms).
//! - `max_redirects`: number of redirect hops after which a load fails (default: 5).
//! - `user_agent`: UA string sent with each request, `None` leaves it to the transport.
//! - `disable_cache`: send `Cache-Control: no-cache` unless the request sets it (default: true).

use std::fmt;
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = "Gosub/1.0 (X11; Linux x86_64) GosubFetcher/1.0";

/// Default connect/read timeout for requests without their own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2500);

/// Default redirect bound.
pub const MAXIMUM_REDIRECTS: usize = 5;

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub max_redirects: usize,
    pub user_agent: Option<String>,
    pub disable_cache: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_redirects: MAXIMUM_REDIRECTS,
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            disable_cache: true,
        }
    }
}

impl FetchConfig {
    pub fn builder() -> FetchConfigBuilder {
        FetchConfigBuilder::default()
    }
}

/// Builder for [`FetchConfig`].
#[derive(Debug, Clone, Default)]
pub struct FetchConfigBuilder {
    inner: FetchConfig,
}

impl FetchConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut FetchConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn timeout(self, timeout: Duration) -> Self { self.map(|c| c.timeout = timeout) }
    pub fn timeout_ms(self, ms: u64) -> Self { self.map(|c| c.timeout = Duration::from_millis(ms)) }
    pub fn max_redirects(self, n: usize) -> Self { self.map(|c| c.max_redirects = n) }
    pub fn user_agent<S: Into<String>>(self, ua: S) -> Self {
        self.map(|c| c.user_agent = Some(ua.into()))
    }
    pub fn no_user_agent(self) -> Self { self.map(|c| c.user_agent = None) }
    pub fn disable_cache(self, on: bool) -> Self { self.map(|c| c.disable_cache = on) }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut FetchConfig)) -> Self { self.map(f) }

    /// Validate and build the final config.
    pub fn build(self) -> Result<FetchConfig, FetchConfigError> {
        validate(&self.inner)?;
        Ok(self.inner)
    }
}

// ---------- Validation ----------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchConfigError {
    ZeroTimeout,
    ZeroRedirects,
    EmptyUserAgent,
}

impl fmt::Display for FetchConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchConfigError::ZeroTimeout =>
                write!(f, "timeout must be larger than zero"),
            FetchConfigError::ZeroRedirects =>
                write!(f, "max_redirects must be at least 1"),
            FetchConfigError::EmptyUserAgent =>
                write!(f, "user_agent must not be empty (use no_user_agent() instead)"),
        }
    }
}
impl std::error::Error for FetchConfigError {}

fn validate(c: &FetchConfig) -> Result<(), FetchConfigError> {
    if c.timeout.is_zero() {
        return Err(FetchConfigError::ZeroTimeout);
    }
    if c.max_redirects == 0 {
        return Err(FetchConfigError::ZeroRedirects);
    }
    if c.user_agent.as_deref().is_some_and(|ua| ua.trim().is_empty()) {
        return Err(FetchConfigError::EmptyUserAgent);
    }
    Ok(())
}
