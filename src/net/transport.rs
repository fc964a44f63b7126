//! Connection layer used by the fetcher.
//!
//! The fetcher never talks to `reqwest` directly. It asks a [`Transport`] for
//! a [`Connection`] per hop and handles redirects itself, so transports must
//! *not* follow redirects on their own.
use std::future::Future;
use std::io;
use std::time::Duration;

use http::header::HeaderName;
use http::HeaderMap;
use url::Url;

use crate::config::FetchConfig;
use crate::errors::FetchError;
use crate::net::response::BodyStream;

/// Everything a transport needs to open one connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectRequest<'a> {
    pub url: &'a Url,
    pub headers: &'a HeaderMap,
    /// Bound for connecting and receiving the response head, and again for
    /// every single body read.
    pub timeout: Duration,
}

/// Opens connections for the fetcher.
///
/// # Implementations
///
/// - [`HttpTransport`]: production implementation using `reqwest`
/// - Scripted implementations for testing
pub trait Transport: Send + Sync {
    /// Sends a GET for `request.url` and returns as soon as the response head
    /// is available. The body is left unread in the returned connection.
    fn connect(
        &self,
        request: ConnectRequest<'_>,
    ) -> impl Future<Output = Result<Connection, FetchError>> + Send;
}

/// An open response: status line and headers, plus the unread body.
///
/// A connection belongs to exactly one hop of one load. It is released by
/// [`cleanup`](Connection::cleanup), by dropping it, or by moving its body
/// into a [`ResponseBody`](crate::net::ResponseBody).
pub struct Connection {
    url: Url,
    /// `None` when the transport got no usable status line.
    status: Option<u16>,
    reason: String,
    headers: HeaderMap,
    body: Option<BodyStream>,
}

impl Connection {
    pub fn new(
        url: Url,
        status: Option<u16>,
        reason: impl Into<String>,
        headers: HeaderMap,
        body: BodyStream,
    ) -> Self {
        Self {
            url,
            status,
            reason: reason.into(),
            headers,
            body: Some(body),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Reason phrase as sent (or implied) by the server.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value as a trimmed string; blank and non-UTF-8 values count as absent.
    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Moves the body out. The connection stays usable for header lookups.
    pub fn take_body(&mut self) -> Option<BodyStream> {
        self.body.take()
    }

    /// Closes the body stream and disconnects. Idempotent.
    pub fn cleanup(&mut self) {
        if self.body.take().is_some() {
            log::trace!("Released connection to {}", self.url);
        }
    }

    pub fn is_released(&self) -> bool {
        self.body.is_none()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.url.as_str())
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("headers", &self.headers)
            .field("released", &self.is_released())
            .finish()
    }
}

/// [`Transport`] on top of `reqwest`.
///
/// Redirects are disabled at the client level. The request timeout bounds the
/// connect phase and every single body read.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
        if let Some(ua) = &config.user_agent {
            builder = builder.user_agent(ua.as_str());
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::Connection(format!("cannot build http client: {e}")))?;

        Ok(Self { client })
    }
}

/// Reason phrase from the status line. hyper only keeps it when it differs
/// from the canonical one.
fn reason_phrase(response: &reqwest::Response) -> String {
    let status = response.status();
    match response.extensions().get::<hyper::ext::ReasonPhrase>() {
        Some(reason) => String::from_utf8_lossy(reason.as_bytes()).into_owned(),
        None => status.canonical_reason().unwrap_or("Unknown").to_string(),
    }
}

impl Transport for HttpTransport {
    async fn connect(&self, request: ConnectRequest<'_>) -> Result<Connection, FetchError> {
        let send = self
            .client
            .get(request.url.clone())
            .headers(request.headers.clone())
            .send();

        let response = tokio::time::timeout(request.timeout, send)
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        let reason = reason_phrase(&response);
        let headers = response.headers().clone();
        let url = response.url().clone();

        // Each read gets its own deadline, so slow but steady bodies still complete
        let read_timeout = request.timeout;
        let body = futures::stream::try_unfold(response, move |mut response| async move {
            match tokio::time::timeout(read_timeout, response.chunk()).await {
                Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out")),
                Ok(Err(e)) => Err(io::Error::other(e)),
                Ok(Ok(Some(chunk))) => Ok(Some((chunk, response))),
                Ok(Ok(None)) => Ok(None),
            }
        });

        Ok(Connection::new(url, Some(status.as_u16()), reason, headers, Box::pin(body)))
    }
}
