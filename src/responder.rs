//! Per-request response handle.
//!
//! Every handler in a chain receives a clone of the same [`Responder`]. The
//! first [`send`](Responder::send) wins; later sends are dropped with a
//! warning, so a middleware and an action can never both write a body.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use crate::response::{IntoResponse, Response};

#[derive(Default)]
struct Outgoing {
    status: Option<u16>,
    headers: Vec<(String, String)>,
    sent: Option<Response>,
}

/// Shared, send-once handle on the response for one request.
#[derive(Clone, Default)]
pub struct Responder {
    inner: Arc<Mutex<Outgoing>>,
}

impl Responder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Outgoing> {
        // A poisoned lock only means a handler panicked mid-update; the
        // state itself is still consistent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Overrides the status of whatever gets sent next.
    pub fn set_status(&self, code: impl Into<u16>) {
        self.lock().status = Some(code.into());
    }

    /// Adds a header to whatever gets sent next.
    pub fn set_header(&self, name: &str, value: &str) {
        self.lock().headers.push((name.to_owned(), value.to_owned()));
    }

    /// The status set so far, if any.
    pub fn status(&self) -> Option<u16> {
        let out = self.lock();
        out.sent.as_ref().map(|r| r.status).or(out.status)
    }

    pub fn headers_sent(&self) -> bool {
        self.lock().sent.is_some()
    }

    /// Sends `reply`. Returns `false`, sending nothing, when a response was
    /// already sent.
    pub fn send(&self, reply: impl IntoResponse) -> bool {
        let mut out = self.lock();
        if out.sent.is_some() {
            warn!("response already sent, dropping second send");
            return false;
        }
        let mut response = reply.into_response();
        if let Some(status) = out.status {
            response.status = status;
        }
        let extra = std::mem::take(&mut out.headers);
        response.headers.extend(extra);
        out.sent = Some(response);
        true
    }

    /// A copy of the sent response, if any.
    pub fn sent(&self) -> Option<Response> {
        self.lock().sent.clone()
    }

    /// Takes the sent response out of the handle.
    pub(crate) fn take(&self) -> Option<Response> {
        self.lock().sent.take()
    }
}
