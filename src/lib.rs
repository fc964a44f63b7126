//! Single-resource HTTP loader.
//!
//! [`HttpUrlFetcher`] follows redirects itself (bounded, with loop detection),
//! hands the body out as a stream, and sends bodies of resources marked
//! `secret=true` through an external [`DecryptService`] before delivering them.
//!
//! ```rust,no_run
//! use gosub_fetcher::{FetchConfig, FetchRequest, HttpUrlFetcher};
//!
//! # async fn run() -> Result<(), gosub_fetcher::FetchError> {
//! let request = FetchRequest::parse("https://example.com/avatar.png")?.with_timeout_ms(5000);
//! let fetcher = HttpUrlFetcher::with_config(request, FetchConfig::default())?;
//!
//! if let Some(body) = fetcher.load().await? {
//!     let bytes = body.bytes().await?;
//!     println!("got {} bytes", bytes.len());
//! }
//! # Ok(()) }
//! ```
pub mod config;
pub mod errors;
pub mod net;
pub mod secret;

#[cfg(test)]
mod test_support;

pub use config::{FetchConfig, FetchConfigError};
pub use errors::FetchError;
pub use net::{
    DataCallback, DataSource, FetchRequest, HttpTransport, HttpUrlFetcher, ResponseBody, Transport,
};
pub use secret::{DecryptCallback, DecryptService, SecretDecoder};
