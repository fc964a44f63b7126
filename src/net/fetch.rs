use std::sync::Arc;
use std::time::{Duration, Instant};

use http::header::{CACHE_CONTROL, CONTENT_ENCODING, CONTENT_LENGTH, LOCATION};
use http::HeaderValue;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::FetchConfig;
use crate::errors::FetchError;
use crate::net::request::FetchRequest;
use crate::net::response::ResponseBody;
use crate::net::transport::{ConnectRequest, Connection, HttpTransport, Transport};
use crate::secret::{DecryptService, SecretDecoder};

/// Where the delivered data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Remote,
}

/// Receives the single outcome of a load.
///
/// `on_data_ready(None)` means the load was cancelled; it is not a failure.
pub trait DataCallback {
    fn on_data_ready(&mut self, data: Option<ResponseBody>);
    fn on_load_failed(&mut self, error: FetchError);
}

/// Position in a redirect chain.
///
/// Each hop produces a new state; `history` holds every URL visited before
/// `url`, the last one being the direct predecessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectState {
    pub url: Url,
    pub history: Vec<Url>,
    pub redirects: usize,
}

impl RedirectState {
    pub fn start(url: Url) -> Self {
        Self { url, history: Vec::new(), redirects: 0 }
    }

    pub fn previous(&self) -> Option<&Url> {
        self.history.last()
    }

    /// State for the hop to `location`.
    pub fn follow(&self, location: Url) -> Self {
        let mut history = self.history.clone();
        history.push(self.url.clone());
        Self { url: location, history, redirects: self.redirects + 1 }
    }

    /// Checks the hop before any request goes out.
    pub fn check(&self, max_redirects: usize) -> Result<(), FetchError> {
        if self.redirects >= max_redirects {
            return Err(FetchError::TooManyRedirects { max: max_redirects });
        }
        // Parsed URLs are already normalized (scheme/host case, default port, dot segments)
        if self.history.iter().any(|seen| seen == &self.url) {
            return Err(FetchError::RedirectLoop { url: self.url.clone() });
        }
        Ok(())
    }
}

enum Hop {
    Deliver(ResponseBody),
    Follow(Url),
}

/// Loads one [`FetchRequest`], following redirects and decoding secret bodies.
///
/// The fetcher is cheap to share: [`cancel`](HttpUrlFetcher::cancel) may be
/// called from any thread while [`load`](HttpUrlFetcher::load) runs elsewhere.
/// Cancelling never aborts network I/O that is already in flight, it only
/// decides what gets delivered at the next checkpoint (right after connecting
/// and right before handing out decrypted data).
pub struct HttpUrlFetcher<T: Transport = HttpTransport> {
    request: FetchRequest,
    transport: Arc<T>,
    config: FetchConfig,
    decoder: SecretDecoder,
    cancel: CancellationToken,
}

impl HttpUrlFetcher<HttpTransport> {
    /// Fetcher backed by a fresh `reqwest` transport built from `config`.
    pub fn with_config(request: FetchRequest, config: FetchConfig) -> Result<Self, FetchError> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Ok(Self::new(request, transport, config))
    }
}

impl<T: Transport> HttpUrlFetcher<T> {
    pub fn new(request: FetchRequest, transport: Arc<T>, config: FetchConfig) -> Self {
        Self {
            request,
            transport,
            config,
            decoder: SecretDecoder::disabled(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_decrypt_service(mut self, service: Arc<dyn DecryptService>) -> Self {
        self.decoder = SecretDecoder::new(service);
        self
    }

    pub fn request(&self) -> &FetchRequest {
        &self.request
    }

    pub fn data_source(&self) -> DataSource {
        DataSource::Remote
    }

    /// Flags the load as cancelled. Does not tear down an in-flight connection.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token that cancels this load, for handing to other threads.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Loads the resource and reports the outcome to `callback` exactly once.
    pub async fn load_data(&self, callback: &mut impl DataCallback) {
        let started = Instant::now();
        match self.load().await {
            Ok(data) => callback.on_data_ready(data),
            Err(e) => {
                log::debug!("Failed to load data for url {}: {e}", self.request.url());
                callback.on_load_failed(e);
            }
        }
        log::trace!("Finished http url fetcher fetch in {:?}", started.elapsed());
    }

    /// Blocking variant of [`load_data`](Self::load_data) for dedicated worker
    /// threads. Must not be called from within an async context.
    pub fn load_blocking(
        &self,
        runtime: &tokio::runtime::Handle,
        callback: &mut impl DataCallback,
    ) {
        runtime.block_on(self.load_data(callback));
    }

    /// Loads the resource.
    ///
    /// `Ok(None)` means the load was cancelled at one of the checkpoints.
    pub async fn load(&self) -> Result<Option<ResponseBody>, FetchError> {
        let Some(body) = self.load_with_redirects().await? else {
            return Ok(None);
        };
        self.decoder.resolve(&self.request, body, &self.cancel).await
    }

    async fn load_with_redirects(&self) -> Result<Option<ResponseBody>, FetchError> {
        let mut state = RedirectState::start(self.request.url().clone());

        loop {
            state.check(self.config.max_redirects)?;

            let mut connection = self.open(&state.url).await?;
            if self.is_cancelled() {
                connection.cleanup();
                return Ok(None);
            }

            let hop = next_hop(&state.url, &mut connection);
            // Whatever the outcome, this hop's connection is done
            connection.cleanup();

            match hop? {
                Hop::Deliver(body) => return Ok(Some(body)),
                Hop::Follow(location) => {
                    log::debug!(
                        "Redirect {} of {}: {} -> {}",
                        state.redirects + 1,
                        self.config.max_redirects,
                        state.url,
                        location
                    );
                    state = state.follow(location);
                }
            }
        }
    }

    /// The request's own timeout, or the configured one.
    fn timeout(&self) -> Duration {
        self.request.timeout().unwrap_or(self.config.timeout)
    }

    async fn open(&self, url: &Url) -> Result<Connection, FetchError> {
        let mut headers = self.request.headers().clone();
        if self.config.disable_cache && !headers.contains_key(CACHE_CONTROL) {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        }

        self.transport
            .connect(ConnectRequest {
                url,
                headers: &headers,
                timeout: self.timeout(),
            })
            .await
    }
}

fn is_http_ok(status: u16) -> bool {
    status / 100 == 2
}

fn is_http_redirect(status: u16) -> bool {
    status / 100 == 3
}

fn next_hop(url: &Url, connection: &mut Connection) -> Result<Hop, FetchError> {
    let status = connection
        .status()
        .ok_or_else(|| FetchError::Connection(format!("no status received from {url}")))?;

    if is_http_ok(status) {
        Ok(Hop::Deliver(stream_for_successful_request(connection)?))
    } else if is_http_redirect(status) {
        let location = connection
            .header(&LOCATION)
            .ok_or(FetchError::EmptyRedirectLocation)?;
        Ok(Hop::Follow(url.join(location)?))
    } else {
        Err(FetchError::Http {
            status,
            message: connection.reason().to_string(),
        })
    }
}

fn stream_for_successful_request(connection: &mut Connection) -> Result<ResponseBody, FetchError> {
    let body = connection
        .take_body()
        .ok_or_else(|| FetchError::Connection("response body already released".into()))?;

    // Content-Length describes the encoded bytes, so only trust it for identity bodies
    if let Some(encoding) = connection.header(&CONTENT_ENCODING) {
        log::debug!("Got non empty content encoding: {encoding}");
        return Ok(ResponseBody::new(body));
    }

    let content_length = connection
        .header(&CONTENT_LENGTH)
        .and_then(|v| v.parse::<u64>().ok());
    Ok(match content_length {
        Some(len) => ResponseBody::with_content_length(body, len),
        None => ResponseBody::new(body),
    })
}
