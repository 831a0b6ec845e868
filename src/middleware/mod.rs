//! Middleware references and their normalization into chain handlers.
//!
//! Middleware comes in two shapes:
//!
//! - **Function** middleware: anything implementing [`Handler`], typically
//!   `async fn(Request, Responder, Next) -> Result<(), Error>`, or one
//!   shared [`Middleware`] instance.
//! - **Instantiable** middleware: a type implementing [`Middleware`] that is
//!   constructed afresh for every request, so per-request state in its
//!   fields never leaks between requests.
//!
//! [`middleware_handler`] turns either shape into a [`BoxedHandler`].
//! Errors and panics raised by the middleware are forwarded to
//! [`Next::fail`]; they never unwind into the server.

use std::any::type_name;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use tracing::error;

use crate::error::{Error, HttpError};
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler, Next, private};
use crate::request::Request;
use crate::responder::Responder;

/// Middleware with a `handle` capability.
///
/// ```rust
/// use async_trait::async_trait;
/// use trellis::{Error, HttpError, Middleware, Next, Request, Responder};
///
/// #[derive(Default)]
/// struct RequireToken;
///
/// #[async_trait]
/// impl Middleware for RequireToken {
///     async fn handle(&self, req: Request, res: Responder, next: Next) -> Result<(), Error> {
///         if req.header("authorization").is_none() {
///             return Err(HttpError::Unauthorized("missing token".into()).into());
///         }
///         next.run(req, res).await;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, req: Request, res: Responder, next: Next) -> Result<(), Error>;
}

type Factory = Arc<dyn Fn() -> Option<Box<dyn Middleware>> + Send + Sync + 'static>;

/// A reference to middleware, resolved to a handler when routes are bound.
#[derive(Clone)]
pub enum MiddlewareRef {
    Function(BoxedHandler),
    Instantiable { name: &'static str, factory: Factory },
}

impl MiddlewareRef {
    /// Function middleware.
    pub fn function(handler: impl Handler) -> Self {
        Self::Function(handler.into_boxed_handler())
    }

    /// One `Middleware` instance shared by every request.
    pub fn instance(middleware: impl Middleware) -> Self {
        Self::Function(Arc::new(Shared(Arc::new(middleware))))
    }

    /// `M` constructed with `Default` on every invocation.
    pub fn of<M: Middleware + Default>() -> Self {
        Self::Instantiable {
            name: type_name::<M>(),
            factory: Arc::new(|| Some(Box::new(M::default()) as Box<dyn Middleware>)),
        }
    }

    /// `M` constructed by `factory` on every invocation. A factory that
    /// yields `None` lets the request through untouched.
    pub fn factory<M, F>(factory: F) -> Self
    where
        M: Middleware,
        F: Fn() -> Option<M> + Send + Sync + 'static,
    {
        Self::Instantiable {
            name: type_name::<M>(),
            factory: Arc::new(move || factory().map(|m| Box::new(m) as Box<dyn Middleware>)),
        }
    }

    /// Label used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Function(_) => "function",
            Self::Instantiable { name, .. } => name,
        }
    }
}

impl std::fmt::Debug for MiddlewareRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MiddlewareRef").field(&self.name()).finish()
    }
}

impl private::Sealed for MiddlewareRef {}

impl Handler for MiddlewareRef {
    fn into_boxed_handler(self) -> BoxedHandler {
        middleware_handler(self)
    }
}

/// Normalizes a middleware reference into a chain handler.
pub fn middleware_handler(middleware: MiddlewareRef) -> BoxedHandler {
    match middleware {
        MiddlewareRef::Function(handler) => Arc::new(CatchPanic(handler)),
        MiddlewareRef::Instantiable { name, factory } => Arc::new(Instantiate { name, factory }),
    }
}

fn panicked(name: &str) -> Error {
    error!(middleware = name, "middleware panicked");
    HttpError::internal("middleware panicked").into()
}

struct Shared(Arc<dyn Middleware>);

impl ErasedHandler for Shared {
    fn call(&self, req: Request, res: Responder, next: Next) -> BoxFuture<()> {
        let middleware = Arc::clone(&self.0);
        Box::pin(async move {
            let (fail_res, fail_next) = (res.clone(), next.clone());
            if let Err(err) = middleware.handle(req, res, next).await {
                fail_next.fail(fail_res, err).await;
            }
        })
    }
}

struct CatchPanic(BoxedHandler);

impl ErasedHandler for CatchPanic {
    fn call(&self, req: Request, res: Responder, next: Next) -> BoxFuture<()> {
        let (fail_res, fail_next) = (res.clone(), next.clone());
        let Ok(fut) = catch_unwind(AssertUnwindSafe(|| self.0.call(req, res, next))) else {
            return fail_next.fail(fail_res, panicked("function"));
        };
        Box::pin(async move {
            if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
                fail_next.fail(fail_res, panicked("function")).await;
            }
        })
    }
}

struct Instantiate {
    name: &'static str,
    factory: Factory,
}

impl ErasedHandler for Instantiate {
    fn call(&self, req: Request, res: Responder, next: Next) -> BoxFuture<()> {
        let (fail_res, fail_next) = (res.clone(), next.clone());
        let name = self.name;

        let instance = match catch_unwind(AssertUnwindSafe(|| (self.factory)())) {
            Ok(Some(instance)) => instance,
            Ok(None) => return next.run(req, res),
            Err(_) => return fail_next.fail(fail_res, panicked(name)),
        };

        Box::pin(async move {
            match AssertUnwindSafe(instance.handle(req, res, next)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => fail_next.fail(fail_res, err).await,
                Err(_) => fail_next.fail(fail_res, panicked(name)).await,
            }
        })
    }
}
