use std::io;
use url::Url;

/// Everything that can go wrong while loading a single resource.
///
/// Every variant is terminal: the fetcher never retries and reports each
/// failure exactly once. A cancelled load is *not* an error and never shows up
/// here.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Too many (> {max}) redirects!")]
    TooManyRedirects { max: usize },

    #[error("In re-direct loop at {url}")]
    RedirectLoop { url: Url },

    #[error("Received empty or null redirect url")]
    EmptyRedirectLocation,

    /// Transport-level failure without a usable status code, including every
    /// I/O error while draining a body (a stalled read among them).
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Http request failed with status code: {status}, {message}")]
    Http { status: u16, message: String },

    /// No response head within the request timeout.
    #[error("Request timed out")]
    Timeout,

    /// The decrypt service reported failure. The code is passed on verbatim.
    #[error("{0}")]
    DecryptFailure(i32),

    #[error("Decrypt service dropped the callback without reporting an outcome")]
    DecryptAbandoned,

    #[error("Secret target requested but no decrypt service is configured")]
    NoDecryptService,

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),
}

impl FetchError {
    /// HTTP status attached to this error, if the server sent one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Body I/O failures, including read timeouts, are connection errors.
impl From<io::Error> for FetchError {
    fn from(e: io::Error) -> Self {
        FetchError::Connection(e.to_string())
    }
}
