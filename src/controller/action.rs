//! The handler generated for each controller route.

use std::any::type_name;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::error;

use super::metadata::{Action, RouteGroup};
use super::params::{ParameterDeclaration, extract_parameters};
use crate::error::{Error, HttpError};
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Next};
use crate::request::Request;
use crate::responder::Responder;
use crate::response::Response;

/// Builds the chain-ending handler for one action of `instance`.
///
/// The handler extracts the declared arguments, calls the action, and:
/// - on a reply, sends it with the declared status unless the reply is
///   empty or a response already went out;
/// - on an error or a panic, forwards it to [`Next::fail`].
pub fn route_handler<C: Send + Sync + 'static>(instance: Arc<C>, group: &RouteGroup<C>) -> BoxedHandler {
    Arc::new(RouteHandler {
        instance,
        action: Arc::clone(group.action()),
        params: group.params().into(),
        status: group.response_status(),
    })
}

/// Sends `reply` through `res` unless it is empty or the response was
/// already sent. Returns whether anything was sent.
pub fn send_reply(res: &Responder, reply: Option<Response>, status: Option<u16>) -> bool {
    if res.headers_sent() {
        return false;
    }
    let Some(response) = reply else {
        return false;
    };
    if let Some(code) = status {
        res.set_status(code);
    }
    res.send(response)
}

struct RouteHandler<C> {
    instance: Arc<C>,
    action: Action<C>,
    params: Arc<[ParameterDeclaration]>,
    status: Option<u16>,
}

fn panicked<C>() -> Error {
    error!(controller = type_name::<C>(), "controller action panicked");
    HttpError::internal("controller action panicked").into()
}

impl<C: Send + Sync + 'static> ErasedHandler for RouteHandler<C> {
    fn call(&self, req: Request, res: Responder, next: Next) -> BoxFuture<()> {
        let args = extract_parameters(&req, &res, &next, &self.params);
        let status = self.status;
        let invoked = catch_unwind(AssertUnwindSafe(|| (self.action)(Arc::clone(&self.instance), args)));

        Box::pin(async move {
            let outcome = match invoked {
                Ok(fut) => AssertUnwindSafe(fut)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err(panicked::<C>())),
                Err(_) => Err(panicked::<C>()),
            };
            match outcome {
                Ok(reply) => {
                    send_reply(&res, reply, status);
                }
                Err(err) => next.fail(res, err).await,
            }
        })
    }
}
