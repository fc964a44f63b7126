use std::time::Duration;

use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use url::Url;

use crate::errors::FetchError;
use crate::net::query::QueryFlags;

/// A single resource to load.
///
/// The query flags are derived once from the URL when the request is created.
/// Headers can be added while building; after that the request is only read.
/// A request without its own timeout uses the fetcher's configured one.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    url: Url,
    headers: HeaderMap,
    timeout: Option<Duration>,
    flags: QueryFlags,
}

impl FetchRequest {
    pub fn new(url: Url) -> Self {
        let flags = QueryFlags::from_url(&url);
        Self {
            url,
            headers: HeaderMap::new(),
            timeout: None,
            flags,
        }
    }

    /// Parses `url`, which must be absolute.
    pub fn parse(url: &str) -> Result<Self, FetchError> {
        Ok(Self::new(Url::parse(url)?))
    }

    /// Sets a header. A later call with the same name replaces the earlier value.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, FetchError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| FetchError::InvalidHeader(format!("{name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| FetchError::InvalidHeader(format!("{name}: {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn with_headers<'a, I>(self, headers: I) -> Result<Self, FetchError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        headers
            .into_iter()
            .try_fold(self, |req, (name, value)| req.with_header(name, value))
    }

    /// Bound for connecting and for every single body read of this request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_timeout_ms(self, ms: u64) -> Self {
        self.with_timeout(Duration::from_millis(ms))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn flags(&self) -> &QueryFlags {
        &self.flags
    }

    /// Decode key when the body has to go through the decrypt service.
    pub fn secret_target(&self) -> Option<&str> {
        self.flags.secret_target()
    }
}
