//! # trellis
//!
//! Controller-based routing on top of a small hyper framework.
//!
//! A [`Controller`] is a plain struct. It describes its routes once, in
//! code: the base path, which action serves which method and path, where
//! each positional argument comes from, the success status, and the
//! middleware to run first. [`attach_controllers`] turns those
//! descriptions into sub-routers and mounts them on an ordinary
//! [`Router`], which you hand to a [`Server`] or drive in-process with
//! [`Router::handle`].
//!
//! Handlers follow the chain model: every middleware and route handler is
//! called with the request, a [`Responder`], and the [`Next`] continuation.
//! Errors go to [`Next::fail`] and end up in the router's error handler,
//! which by default answers with a JSON body carrying the status of the
//! [`HttpError`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use trellis::{
//!     Controller, ControllerInstance, ControllerMetadata, Error, HttpError, Json, Registry,
//!     Router, Server, ServerConfig, Status, attach_controllers,
//! };
//!
//! #[derive(Default)]
//! struct Users;
//!
//! impl Controller for Users {
//!     fn describe(meta: &mut ControllerMetadata<Self>) {
//!         meta.base_path("/users");
//!         meta.action("find", |_this: Arc<Self>, args| async move {
//!             let id: u64 = args.value(0)?;
//!             if id == 0 {
//!                 return Err(HttpError::NotFound(format!("user {id}")).into());
//!             }
//!             Ok::<_, Error>(Json(id))
//!         })
//!         .get("/{id}")
//!         .path_param(0, "id");
//!
//!         meta.action("create", |_this: Arc<Self>, args| async move {
//!             let name: String = args.value(0)?;
//!             Ok::<_, Error>(name)
//!         })
//!         .post("/")
//!         .body_field(0, "name")
//!         .status(Status::Created);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let config = ServerConfig::from_env()?;
//!     let app = attach_controllers(
//!         Router::with_options(config.router),
//!         Registry::new(),
//!         vec![ControllerInstance::of::<Users>()],
//!     )
//!     .await?;
//!
//!     Server::new(config).serve(app).await
//! }
//! ```

mod config;
mod controller;
mod error;
mod handler;
mod method;
mod request;
mod responder;
mod response;
mod router;
mod server;
mod status;

pub mod middleware;

pub use config::ServerConfig;
pub use controller::{
    Arg, Args, Controller, ControllerInstance, ControllerMetadata, ParamSource,
    ParameterDeclaration, Registry, RouteDeclaration, RouteGroup, attach_controllers,
    attach_middlewares, build_router, extract_parameters, route_handler, send_reply,
};
pub use error::{Error, HttpError};
pub use handler::{
    BoxFuture, BoxedErrorHandler, BoxedHandler, Endpoint, ErasedHandler, Handler, Next, endpoint,
    error_handler,
};
pub use method::Method;
pub use middleware::{Middleware, MiddlewareRef, middleware_handler};
pub use request::{Request, RequestBuilder};
pub use responder::Responder;
pub use response::{IntoReply, IntoResponse, Json, Response, ResponseBuilder};
pub use router::{Router, RouterOptions};
pub use server::Server;
pub use status::Status;
