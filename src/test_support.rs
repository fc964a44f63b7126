//! Test doubles shared by the unit tests.
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, LOCATION};
use http::HeaderMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::errors::FetchError;
use crate::net::{ConnectRequest, Connection, DataCallback, ResponseBody, Transport};
use crate::secret::{DecryptCallback, DecryptService};

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// One step of a raw HTTP reply written by [`serve_http`].
#[derive(Debug, Clone)]
pub(crate) enum Wire {
    Send(String),
    Pause(Duration),
}

/// Status line plus headers of a reply that closes the connection.
pub(crate) fn head(status: &str, headers: &[(&str, &str)]) -> String {
    let mut raw = format!("HTTP/1.1 {status}\r\n");
    for (name, value) in headers {
        raw.push_str(&format!("{name}: {value}\r\n"));
    }
    raw.push_str("Connection: close\r\n\r\n");
    raw
}

/// Reply without a body.
pub(crate) fn empty_reply(status: &str, headers: &[(&str, &str)]) -> Vec<Wire> {
    let mut headers = headers.to_vec();
    headers.push(("Content-Length", "0"));
    vec![Wire::Send(head(status, &headers))]
}

/// `200 OK` reply with a known length.
pub(crate) fn ok_reply(body: &str) -> Vec<Wire> {
    let len = body.len().to_string();
    vec![Wire::Send(head("200 OK", &[("Content-Length", len.as_str())]) + body)]
}

/// Minimal HTTP/1.1 server on localhost. Answers each request according to
/// its path and closes the connection afterwards; unknown paths get a 404.
pub(crate) async fn serve_http(routes: Vec<(&'static str, Vec<Wire>)>) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let routes = Arc::new(routes);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else { break };
            let routes = routes.clone();
            tokio::spawn(async move {
                let mut received = Vec::new();
                let mut buf = [0u8; 1024];
                while !received.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => received.extend_from_slice(&buf[..n]),
                    }
                }

                let received = String::from_utf8_lossy(&received);
                let path = received.split_whitespace().nth(1).unwrap_or("/").to_string();
                let parts = routes
                    .iter()
                    .find(|(p, _)| *p == path)
                    .map(|(_, parts)| parts.clone())
                    .unwrap_or_else(|| empty_reply("404 Not Found", &[]));

                for part in parts {
                    match part {
                        Wire::Send(raw) => {
                            if socket.write_all(raw.as_bytes()).await.is_err() {
                                return;
                            }
                            let _ = socket.flush().await;
                        }
                        Wire::Pause(delay) => tokio::time::sleep(delay).await,
                    }
                }
                let _ = socket.shutdown().await;
            });
        }
    });

    Url::parse(&format!("http://{addr}/")).unwrap()
}

#[derive(Debug, Clone)]
pub(crate) struct ScriptedResponse {
    status: Option<u16>,
    reason: String,
    headers: HeaderMap,
    body: Bytes,
}

impl ScriptedResponse {
    pub fn ok(body: &'static [u8]) -> Self {
        Self::status(200, "OK")
            .header("content-length", &body.len().to_string())
            .body(body)
    }

    pub fn redirect(status: u16, location: &str) -> Self {
        let mut resp = Self::status(status, "Redirect");
        resp.headers.insert(LOCATION, HeaderValue::from_str(location).unwrap());
        resp.headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
        resp
    }

    pub fn status(status: u16, reason: &str) -> Self {
        Self {
            status: Some(status),
            reason: reason.to_string(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn no_status() -> Self {
        Self { status: None, ..Self::status(0, "") }
    }

    pub fn header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.insert(HeaderName::from_static(name), HeaderValue::from_str(value).unwrap());
        self
    }

    fn body(mut self, body: &'static [u8]) -> Self {
        self.body = Bytes::from_static(body);
        self
    }
}

struct OpenGuard(Arc<AtomicUsize>);

impl Drop for OpenGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory transport answering from a fixed route table.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    routes: HashMap<Url, ScriptedResponse>,
    requests: Mutex<Vec<(Url, HeaderMap)>>,
    open: Arc<AtomicUsize>,
    cancel_on_connect: Mutex<Option<CancellationToken>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, url: &str, response: ScriptedResponse) -> Self {
        self.routes.insert(Url::parse(url).unwrap(), response);
        self
    }

    /// Cancels `token` as soon as the next connection is established.
    pub fn cancel_on_connect(&self, token: CancellationToken) {
        *self.cancel_on_connect.lock().unwrap() = Some(token);
    }

    pub fn requested(&self) -> Vec<String> {
        self.requests.lock().unwrap().iter().map(|(u, _)| u.to_string()).collect()
    }

    pub fn last_headers(&self) -> Option<HeaderMap> {
        self.requests.lock().unwrap().last().map(|(_, h)| h.clone())
    }

    /// True when no connection body is still held open.
    pub fn all_released(&self) -> bool {
        self.open.load(Ordering::SeqCst) == 0
    }
}

impl Transport for ScriptedTransport {
    async fn connect(&self, request: ConnectRequest<'_>) -> Result<Connection, FetchError> {
        self.requests
            .lock()
            .unwrap()
            .push((request.url.clone(), request.headers.clone()));

        let Some(resp) = self.routes.get(request.url).cloned() else {
            return Err(FetchError::Connection(format!("no route to {}", request.url)));
        };

        if let Some(token) = self.cancel_on_connect.lock().unwrap().as_ref() {
            token.cancel();
        }

        self.open.fetch_add(1, Ordering::SeqCst);
        let guard = OpenGuard(self.open.clone());
        let chunks: Vec<io::Result<Bytes>> =
            if resp.body.is_empty() { vec![] } else { vec![Ok(resp.body)] };
        let body = futures::stream::iter(chunks).map(move |chunk| {
            let _open = &guard;
            chunk
        });

        Ok(Connection::new(
            request.url.clone(),
            resp.status,
            resp.reason,
            resp.headers,
            Box::pin(body),
        ))
    }
}

/// Decrypt service answering with a fixed outcome from a separate thread.
pub(crate) struct FixedDecrypt {
    outcome: Result<Bytes, i32>,
    calls: Mutex<Vec<(String, Vec<u8>)>>,
}

impl FixedDecrypt {
    pub fn success(plain: &'static [u8]) -> Self {
        Self { outcome: Ok(Bytes::from_static(plain)), calls: Mutex::new(Vec::new()) }
    }

    pub fn failure(code: i32) -> Self {
        Self { outcome: Err(code), calls: Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> Vec<(String, Vec<u8>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl DecryptService for FixedDecrypt {
    fn decode_secret_data(&self, target: &str, data: Bytes, callback: DecryptCallback) {
        self.calls.lock().unwrap().push((target.to_string(), data.to_vec()));
        let outcome = self.outcome.clone();
        std::thread::spawn(move || match outcome {
            Ok(plain) => callback.on_success(plain),
            Err(code) => callback.on_fail(code),
        });
    }
}

/// Decrypt service that cancels the load before reporting success.
pub(crate) struct CancellingDecrypt {
    token: CancellationToken,
    plain: Bytes,
}

impl CancellingDecrypt {
    pub fn new(token: CancellationToken, plain: &'static [u8]) -> Self {
        Self { token, plain: Bytes::from_static(plain) }
    }
}

impl DecryptService for CancellingDecrypt {
    fn decode_secret_data(&self, _target: &str, _data: Bytes, callback: DecryptCallback) {
        let token = self.token.clone();
        let plain = self.plain.clone();
        std::thread::spawn(move || {
            token.cancel();
            callback.on_success(plain);
        });
    }
}

/// Decrypt service that loses the callback.
pub(crate) struct DroppingDecrypt;

impl DecryptService for DroppingDecrypt {
    fn decode_secret_data(&self, _target: &str, _data: Bytes, callback: DecryptCallback) {
        drop(callback);
    }
}

/// Records what a load reported.
#[derive(Default)]
pub(crate) struct Recorder {
    data: Option<Option<ResponseBody>>,
    error: Option<FetchError>,
    calls: usize,
}

impl Recorder {
    pub fn cancelled(&self) -> bool {
        self.calls == 1 && matches!(self.data, Some(None))
    }

    pub fn error(&self) -> Option<&FetchError> {
        assert_eq!(self.calls, 1, "expected exactly one callback");
        self.error.as_ref()
    }

    pub fn take_data(&mut self) -> Option<ResponseBody> {
        assert_eq!(self.calls, 1, "expected exactly one callback");
        self.data.take().flatten()
    }
}

impl DataCallback for Recorder {
    fn on_data_ready(&mut self, data: Option<ResponseBody>) {
        self.calls += 1;
        self.data = Some(data);
    }

    fn on_load_failed(&mut self, error: FetchError) {
        self.calls += 1;
        self.error = Some(error);
    }
}
