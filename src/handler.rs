//! Handler trait, type erasure and the `Next` continuation.
//!
//! # How a chain is stored
//!
//! A route resolves to an ordered chain of handlers: router-level
//! middleware, route-level middleware, then the endpoint. The chain holds
//! handlers of different concrete types, so each one is erased behind
//! `dyn ErasedHandler` and shared as a [`BoxedHandler`]:
//!
//! ```text
//! async fn auth(req, res, next) -> Result<(), Error> { … }   ← user writes this
//!        ↓ router.middleware(auth)
//! auth.into_boxed_handler()                                   ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(auth))                                   ← stored in the chain
//!        ↓ next.run(req, res) at request time
//! handler.call(req, res, next)                                ← one vtable dispatch
//! ```
//!
//! Each handler receives a [`Next`] pointing at the rest of the chain. It
//! either continues with [`Next::run`], answers through the
//! [`Responder`] and returns, or hands an error to the router's error
//! pipeline with [`Next::fail`]. Returning `Err` from a handler is the same
//! as calling `fail`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, error};

use crate::error::Error;
use crate::request::Request;
use crate::responder::Responder;
use crate::response::{IntoResponse, Json};
use crate::status::reason_phrase;

// ── Erased types ──────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Uniform dispatch interface every chain element implements.
pub trait ErasedHandler {
    fn call(&self, req: Request, res: Responder, next: Next) -> BoxFuture<()>;
}

/// A type-erased handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// The router's error pipeline: receives every error forwarded with
/// [`Next::fail`].
pub type BoxedErrorHandler = Arc<dyn Fn(Error, Responder) -> BoxFuture<()> + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for everything that can sit in a route's chain.
///
/// Satisfied automatically by any function with the signature
///
/// ```text
/// async fn name(req: Request, res: Responder, next: Next) -> Result<(), Error>
/// ```
///
/// by plain endpoints wrapped with [`endpoint`], and by
/// [`MiddlewareRef`](crate::MiddlewareRef). The trait is sealed.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

pub(crate) mod private {
    pub trait Sealed {}
}

impl<F, Fut> private::Sealed for F
where
    F: Fn(Request, Responder, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
}

impl<F, Fut> Handler for F
where
    F: Fn(Request, Responder, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

struct FnHandler<F>(F);

impl<F, Fut> ErasedHandler for FnHandler<F>
where
    F: Fn(Request, Responder, Next) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    fn call(&self, req: Request, res: Responder, next: Next) -> BoxFuture<()> {
        let fut = (self.0)(req, res.clone(), next.clone());
        Box::pin(async move {
            if let Err(err) = fut.await {
                next.fail(res, err).await;
            }
        })
    }
}

// ── Endpoints ─────────────────────────────────────────────────────────────────

/// A terminal handler: `async fn(Request) -> impl IntoResponse`.
pub struct Endpoint<F>(F);

/// Wraps a request-to-response function so it can end a chain.
///
/// ```rust
/// use trellis::{Request, Router, endpoint};
///
/// async fn liveness(_req: Request) -> &'static str { "ok" }
///
/// let app = Router::new().get("/healthz", endpoint(liveness));
/// ```
pub fn endpoint<F, Fut, R>(f: F) -> Endpoint<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    Endpoint(f)
}

impl<F> private::Sealed for Endpoint<F> {}

impl<F, Fut, R> Handler for Endpoint<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(self)
    }
}

impl<F, Fut, R> ErasedHandler for Endpoint<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request, res: Responder, _next: Next) -> BoxFuture<()> {
        let fut = (self.0)(req);
        Box::pin(async move {
            res.send(fut.await);
        })
    }
}

// ── Next ──────────────────────────────────────────────────────────────────────

/// Continuation handed to each handler: the rest of the chain plus the
/// error pipeline.
#[derive(Clone)]
pub struct Next {
    chain: Arc<[BoxedHandler]>,
    index: usize,
    on_error: BoxedErrorHandler,
}

impl Next {
    /// A continuation that starts at the first element of `chain`.
    pub fn new(chain: Vec<BoxedHandler>, on_error: BoxedErrorHandler) -> Self {
        Self { chain: chain.into(), index: 0, on_error }
    }

    /// Runs the next handler in the chain. Past the end of the chain this
    /// does nothing.
    pub fn run(self, req: Request, res: Responder) -> BoxFuture<()> {
        match self.chain.get(self.index).cloned() {
            Some(handler) => {
                let next = Self { index: self.index + 1, ..self };
                handler.call(req, res, next)
            }
            None => Box::pin(async {}),
        }
    }

    /// Skips the rest of the chain and hands `err` to the error pipeline.
    pub fn fail(self, res: Responder, err: Error) -> BoxFuture<()> {
        (self.on_error)(err, res)
    }

    /// Number of handlers not yet run.
    pub fn remaining(&self) -> usize {
        self.chain.len().saturating_sub(self.index)
    }
}

// ── Error pipeline ────────────────────────────────────────────────────────────

/// Erases an async error handler.
pub fn error_handler<F, Fut>(f: F) -> BoxedErrorHandler
where
    F: Fn(Error, Responder) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |err: Error, res: Responder| -> BoxFuture<()> { Box::pin(f(err, res)) })
}

/// Formats errors as `{"error": kind, "message": msg, "status": code}`.
///
/// Only [`HttpError`](crate::HttpError) messages reach the client; any
/// other error is reported as a bare 500 and logged.
pub(crate) fn default_error_handler() -> BoxedErrorHandler {
    error_handler(|err: Error, res: Responder| async move {
        let status = err.status();
        if status >= 500 {
            error!(status, "request failed: {err}");
        } else {
            debug!(status, "request rejected: {err}");
        }
        if res.headers_sent() {
            return;
        }

        let (kind, message) = match err.as_http() {
            Some(http) => (http.kind(), http.message().to_owned()),
            None => ("InternalServerError", reason_phrase(status).to_owned()),
        };
        res.set_status(status);
        res.send(Json(json!({ "error": kind, "message": message, "status": status })));
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HttpError;
    use crate::method::Method;
    use std::sync::Mutex;

    fn request() -> Request {
        Request::builder(Method::Get, "/").build()
    }

    #[tokio::test]
    async fn chain_runs_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let seen = Arc::clone(&seen);
            move |req: Request, res: Responder, next: Next| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().unwrap().push("first");
                    next.run(req, res).await;
                    Ok(())
                }
            }
        };
        let last = {
            let seen = Arc::clone(&seen);
            move |_req: Request, res: Responder, _next: Next| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().unwrap().push("last");
                    res.send("done");
                    Ok(())
                }
            }
        };

        let next = Next::new(
            vec![first.into_boxed_handler(), last.into_boxed_handler()],
            default_error_handler(),
        );
        assert_eq!(next.remaining(), 2);

        let res = Responder::new();
        next.run(request(), res.clone()).await;
        assert_eq!(*seen.lock().unwrap(), ["first", "last"]);
        assert_eq!(res.sent().unwrap().body(), b"done");
    }

    #[tokio::test]
    async fn returned_error_reaches_error_pipeline() {
        let failing = |_req: Request, _res: Responder, _next: Next| async {
            Err::<(), _>(Error::from(HttpError::conflict()))
        };
        let next = Next::new(vec![failing.into_boxed_handler()], default_error_handler());

        let res = Responder::new();
        next.run(request(), res.clone()).await;

        let sent = res.sent().unwrap();
        assert_eq!(sent.status_code(), 409);
        let body: serde_json::Value = serde_json::from_slice(sent.body()).unwrap();
        assert_eq!(body, json!({"error": "Conflict", "message": "", "status": 409}));
    }

    #[tokio::test]
    async fn opaque_errors_are_not_leaked() {
        let res = Responder::new();
        default_error_handler()(Error::handler("password=hunter2"), res.clone()).await;

        let sent = res.sent().unwrap();
        assert_eq!(sent.status_code(), 500);
        assert!(!String::from_utf8_lossy(sent.body()).contains("hunter2"));
    }

    #[tokio::test]
    async fn endpoint_sends_its_response() {
        async fn hello(_req: Request) -> &'static str { "hello" }

        let next = Next::new(vec![endpoint(hello).into_boxed_handler()], default_error_handler());
        let res = Responder::new();
        next.run(request(), res.clone()).await;
        assert_eq!(res.sent().unwrap().body(), b"hello");
    }
}
