//! Secret-decode bridge.
//!
//! Resources whose URL carries `target=<key>&secret=true` arrive encrypted.
//! Their body is buffered completely and handed to an external
//! [`DecryptService`], which reports back through a [`DecryptCallback`] at
//! some later point and on a thread of its own choosing. The bridge waits on
//! a one-shot channel for that single outcome, so the load looks sequential to
//! whoever awaits it.
//!
//! ## Design notes
//! - A [`DecryptCallback`] is consumed by either outcome method, so a service
//!   cannot report twice.
//! - Dropping the callback without an outcome ends the wait with
//!   [`FetchError::DecryptAbandoned`].
//! - There is no timeout on the wait. A service that never answers stalls the
//!   load.
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::errors::FetchError;
use crate::net::{FetchRequest, ResponseBody};

/// Result a decrypt service reports: plaintext or a service specific error code.
pub type DecryptOutcome = Result<Bytes, i32>;

/// Single-use reply handle given to a [`DecryptService`].
#[derive(Debug)]
pub struct DecryptCallback {
    tx: oneshot::Sender<DecryptOutcome>,
}

impl DecryptCallback {
    /// Creates a callback and the receiving end the bridge waits on.
    pub fn channel() -> (Self, oneshot::Receiver<DecryptOutcome>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    pub fn on_success(self, data: impl Into<Bytes>) {
        self.complete(Ok(data.into()));
    }

    pub fn on_fail(self, error_code: i32) {
        self.complete(Err(error_code));
    }

    fn complete(self, outcome: DecryptOutcome) {
        // The waiting side may be gone already, nothing to deliver to then
        if self.tx.send(outcome).is_err() {
            log::debug!("Decrypt outcome arrived after the load was dropped");
        }
    }
}

/// External service that turns an encrypted payload back into plaintext.
///
/// Implementations must eventually call exactly one of
/// [`DecryptCallback::on_success`] or [`DecryptCallback::on_fail`]. They may
/// do so from any thread, synchronously or later.
pub trait DecryptService: Send + Sync {
    fn decode_secret_data(&self, target: &str, data: Bytes, callback: DecryptCallback);
}

/// Routes successful bodies of secret resources through a [`DecryptService`].
#[derive(Clone, Default)]
pub struct SecretDecoder {
    service: Option<Arc<dyn DecryptService>>,
}

impl SecretDecoder {
    pub fn new(service: Arc<dyn DecryptService>) -> Self {
        Self { service: Some(service) }
    }

    /// A decoder without a service. Passes plain resources through and
    /// rejects secret ones.
    pub fn disabled() -> Self {
        Self { service: None }
    }

    pub fn has_service(&self) -> bool {
        self.service.is_some()
    }

    /// Delivers `body` for `request`.
    ///
    /// Plain resources pass through untouched. For secret ones the body is
    /// drained, decrypted and returned as a fresh in-memory body, unless
    /// `cancel` fired before the plaintext could be delivered, in which case
    /// the result is `Ok(None)`.
    pub async fn resolve(
        &self,
        request: &FetchRequest,
        body: ResponseBody,
        cancel: &CancellationToken,
    ) -> Result<Option<ResponseBody>, FetchError> {
        let Some(target) = request.secret_target() else {
            return Ok(Some(body));
        };
        let service = self.service.as_ref().ok_or(FetchError::NoDecryptService)?;

        // Decryption needs the complete payload
        let data = body.bytes().await?;
        log::debug!("Decoding {} secret bytes for target {target}", data.len());

        let (callback, outcome) = DecryptCallback::channel();
        service.decode_secret_data(target, data, callback);

        let plain = outcome
            .await
            .map_err(|_| FetchError::DecryptAbandoned)?
            .map_err(FetchError::DecryptFailure)?;

        if cancel.is_cancelled() {
            log::debug!("Load of {} cancelled while decoding, dropping plaintext", request.url());
            return Ok(None);
        }
        Ok(Some(ResponseBody::from_bytes(plain)))
    }
}

impl std::fmt::Debug for SecretDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretDecoder")
            .field("service", &self.service.as_ref().map(|_| "Arc<dyn DecryptService>"))
            .finish()
    }
}
