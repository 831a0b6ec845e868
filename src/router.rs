//! Radix-tree request router with middleware and mounted sub-routers.
//!
//! One matchit tree per HTTP method, holding the chain for each route.
//! A router can also mount other routers under a path prefix; lookup walks
//! its own trees first, then the mounts in mount order, and prepends each
//! router's middleware on the way back out. The resulting chain is always
//! outer middleware → inner middleware → route handlers.

use std::collections::HashMap;
use std::sync::Arc;

use matchit::Router as MatchitRouter;
use serde::Deserialize;

use crate::error::{Error, HttpError};
use crate::handler::{BoxedErrorHandler, BoxedHandler, Handler, Next, default_error_handler};
use crate::method::Method;
use crate::request::Request;
use crate::responder::Responder;
use crate::response::Response;
use crate::status::Status;

/// Per-router matching options.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct RouterOptions {
    /// When `false`, `/users` and `/users/` are the same path.
    pub strict: bool,
}

/// The application router.
///
/// Build it once at startup and pass it to [`Server::serve`](crate::Server::serve),
/// or drive it in-process with [`Router::handle`]. Registration methods take
/// and return `self` so they chain.
pub struct Router {
    options: RouterOptions,
    middleware: Vec<BoxedHandler>,
    routes: HashMap<Method, MatchitRouter<Arc<[BoxedHandler]>>>,
    mounts: Vec<(String, Router)>,
    on_error: BoxedErrorHandler,
}

type Matched = (Vec<BoxedHandler>, HashMap<String, String>);

impl Router {
    pub fn new() -> Self {
        Self::with_options(RouterOptions::default())
    }

    pub fn with_options(options: RouterOptions) -> Self {
        Self {
            options,
            middleware: Vec::new(),
            routes: HashMap::new(),
            mounts: Vec::new(),
            on_error: default_error_handler(),
        }
    }

    pub fn options(&self) -> RouterOptions { self.options }

    /// Adds middleware that runs before every route of this router,
    /// including routes of mounted routers. Runs in registration order.
    pub fn middleware(mut self, handler: impl Handler) -> Self {
        self.middleware.push(handler.into_boxed_handler());
        self
    }

    pub(crate) fn middleware_boxed(mut self, handler: BoxedHandler) -> Self {
        self.middleware.push(handler);
        self
    }

    /// Registers `handler` for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax:
    ///
    /// ```rust
    /// # use trellis::{Method, Request, Router, endpoint};
    /// # async fn get_user(_: Request) -> &'static str { "" }
    /// Router::new().on(Method::Get, "/users/{id}", endpoint(get_user));
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the path is malformed or conflicts with an existing route.
    /// Use [`Router::route`] to get the error instead.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.route(method, path, vec![handler.into_boxed_handler()])
            .unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Get, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Post, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Put, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Delete, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Patch, path, handler)
    }

    /// Registers a chain of handlers for a method + path pair.
    pub fn route(mut self, method: Method, path: &str, chain: Vec<BoxedHandler>) -> Result<Self, Error> {
        let normalized = self.normalize(path);
        self.routes
            .entry(method)
            .or_default()
            .insert(normalized.as_str(), chain.into())
            .map_err(|e| Error::InvalidRoute { path: path.to_owned(), reason: e.to_string() })?;
        Ok(self)
    }

    /// Mounts `router` under `prefix`. An empty or `/` prefix mounts at the root.
    pub fn mount(mut self, prefix: &str, router: Router) -> Self {
        self.mounts.push((mount_prefix(prefix), router));
        self
    }

    /// Replaces the error pipeline. Only the outermost router's pipeline is used.
    pub fn on_error(mut self, handler: BoxedErrorHandler) -> Self {
        self.on_error = handler;
        self
    }

    /// Routes one request and produces one response.
    ///
    /// Unmatched requests get `404 Not Found`. A matched chain that finishes
    /// without sending anything gets `204 No Content`.
    pub async fn handle(&self, req: Request) -> Response {
        let Some((chain, params)) = self.lookup(req.method(), req.path()) else {
            return Response::status(Status::NotFound);
        };

        let res = Responder::new();
        match decode_params(params) {
            Ok(params) => {
                Next::new(chain, Arc::clone(&self.on_error))
                    .run(req.with_params(params), res.clone())
                    .await;
            }
            Err(err) => (self.on_error)(err.into(), res.clone()).await,
        }

        res.take().unwrap_or_else(|| Response::status(Status::NoContent))
    }

    /// Mounted routers see the path as received, so each one applies its
    /// own trailing-slash rule.
    pub(crate) fn lookup(&self, method: Method, raw: &str) -> Option<Matched> {
        let path = self.normalize(raw);

        let own = self.routes.get(&method).and_then(|tree| {
            let matched = tree.at(&path).ok()?;
            let params = matched.params.iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect();
            Some((matched.value.to_vec(), params))
        });

        let (inner, params) = own.or_else(|| {
            self.mounts.iter().find_map(|(prefix, router)| {
                let rest = strip_mount(prefix, raw)?;
                router.lookup(method, rest)
            })
        })?;

        let mut chain = self.middleware.clone();
        chain.extend(inner);
        Some((chain, params))
    }

    fn normalize(&self, path: &str) -> String {
        let path = if path.starts_with('/') { path.to_owned() } else { format!("/{path}") };
        if self.options.strict || path == "/" {
            return path;
        }
        match path.trim_end_matches('/') {
            "" => "/".to_owned(),
            trimmed => trimmed.to_owned(),
        }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

/// Percent-decodes matched parameter values. A value that does not decode
/// to UTF-8 rejects the request.
fn decode_params(params: HashMap<String, String>) -> Result<HashMap<String, String>, HttpError> {
    params
        .into_iter()
        .map(|(name, raw)| match urlencoding::decode(&raw) {
            Ok(value) => Ok((name, value.into_owned())),
            Err(_) => Err(HttpError::BadRequest(format!("path parameter `{name}` is not valid UTF-8"))),
        })
        .collect()
}

fn mount_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    match trimmed {
        "" => String::new(),
        p if p.starts_with('/') => p.to_owned(),
        p => format!("/{p}"),
    }
}

/// The part of `path` a router mounted at `prefix` sees, if it applies.
fn strip_mount<'a>(prefix: &str, path: &'a str) -> Option<&'a str> {
    if prefix.is_empty() {
        return Some(path);
    }
    match path.strip_prefix(prefix)? {
        "" => Some("/"),
        rest if rest.starts_with('/') => Some(rest),
        _ => None,
    }
}
