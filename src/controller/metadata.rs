//! Controller descriptors and the registry that holds them.
//!
//! A controller describes itself once, through [`Controller::describe`],
//! into a [`ControllerMetadata`]. The [`Registry`] keeps one record per
//! controller type; moving it into
//! [`attach_controllers`](crate::attach_controllers) freezes it.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use super::Controller;
use super::params::{Args, ParamSource, ParameterDeclaration};
use crate::error::Error;
use crate::handler::BoxFuture;
use crate::method::Method;
use crate::middleware::MiddlewareRef;
use crate::response::{IntoReply, Response};
use crate::router::RouterOptions;

/// A controller method, erased.
pub(crate) type Action<C> =
    Arc<dyn Fn(Arc<C>, Args) -> BoxFuture<Result<Option<Response>, Error>> + Send + Sync + 'static>;

// ── RouteDeclaration ──────────────────────────────────────────────────────────

/// One (method, path) binding of an action, with its own middleware.
#[derive(Clone, Debug)]
pub struct RouteDeclaration {
    method: Method,
    path: String,
    middleware: Vec<MiddlewareRef>,
}

impl RouteDeclaration {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), middleware: Vec::new() }
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn middleware(&self) -> &[MiddlewareRef] { &self.middleware }
}

// ── RouteGroup ────────────────────────────────────────────────────────────────

/// Everything declared for one action: its routes, parameters and status.
pub struct RouteGroup<C> {
    routes: Vec<RouteDeclaration>,
    pending_middleware: Vec<MiddlewareRef>,
    response_status: Option<u16>,
    params: Vec<ParameterDeclaration>,
    action: Action<C>,
}

impl<C> Clone for RouteGroup<C> {
    fn clone(&self) -> Self {
        Self {
            routes: self.routes.clone(),
            pending_middleware: self.pending_middleware.clone(),
            response_status: self.response_status,
            params: self.params.clone(),
            action: Arc::clone(&self.action),
        }
    }
}

impl<C> RouteGroup<C> {
    fn new(action: Action<C>) -> Self {
        Self {
            routes: Vec::new(),
            pending_middleware: Vec::new(),
            response_status: None,
            params: Vec::new(),
            action,
        }
    }

    /// Binds the action to `method` + `path`. Paths are relative to the
    /// controller's base path.
    pub fn route(&mut self, method: Method, path: impl Into<String>) -> &mut Self {
        let mut decl = RouteDeclaration::new(method, path);
        if self.routes.is_empty() {
            decl.middleware = std::mem::take(&mut self.pending_middleware);
        }
        self.routes.push(decl);
        self
    }

    pub fn get(&mut self, path: impl Into<String>) -> &mut Self { self.route(Method::Get, path) }
    pub fn post(&mut self, path: impl Into<String>) -> &mut Self { self.route(Method::Post, path) }
    pub fn put(&mut self, path: impl Into<String>) -> &mut Self { self.route(Method::Put, path) }
    pub fn delete(&mut self, path: impl Into<String>) -> &mut Self { self.route(Method::Delete, path) }
    pub fn patch(&mut self, path: impl Into<String>) -> &mut Self { self.route(Method::Patch, path) }

    /// Adds route-level middleware. It lands on the first route declaration,
    /// whether that route is declared before or after this call. Use
    /// [`route_middleware`](Self::route_middleware) for the other routes.
    pub fn middleware(&mut self, middleware: MiddlewareRef) -> &mut Self {
        match self.routes.first_mut() {
            Some(first) => first.middleware.push(middleware),
            None => self.pending_middleware.push(middleware),
        }
        self
    }

    /// Adds middleware to the most recently declared route only. Before any
    /// route is declared this is the same as [`middleware`](Self::middleware).
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use trellis::{Controller, ControllerMetadata, Error, MiddlewareRef, Next, Request, Responder};
    ///
    /// async fn admin_only(req: Request, res: Responder, next: Next) -> Result<(), Error> {
    ///     next.run(req, res).await;
    ///     Ok(())
    /// }
    ///
    /// struct Reports;
    ///
    /// impl Controller for Reports {
    ///     fn describe(meta: &mut ControllerMetadata<Self>) {
    ///         meta.action("show", |_this: Arc<Self>, _args| async { Ok::<_, Error>("report") })
    ///             .get("/public")
    ///             .get("/full")
    ///             .route_middleware(MiddlewareRef::function(admin_only));
    ///     }
    /// }
    /// ```
    pub fn route_middleware(&mut self, middleware: MiddlewareRef) -> &mut Self {
        match self.routes.last_mut() {
            Some(last) => last.middleware.push(middleware),
            None => self.pending_middleware.push(middleware),
        }
        self
    }

    /// Status sent with every non-empty reply of this action.
    pub fn status(&mut self, code: impl Into<u16>) -> &mut Self {
        self.response_status = Some(code.into());
        self
    }

    pub fn param(&mut self, param: ParameterDeclaration) -> &mut Self {
        self.params.push(param);
        self
    }

    pub fn request(&mut self, index: usize) -> &mut Self {
        self.param(ParameterDeclaration::new(ParamSource::Request, index))
    }

    pub fn response(&mut self, index: usize) -> &mut Self {
        self.param(ParameterDeclaration::new(ParamSource::Response, index))
    }

    pub fn next(&mut self, index: usize) -> &mut Self {
        self.param(ParameterDeclaration::new(ParamSource::Next, index))
    }

    pub fn path_param(&mut self, index: usize, name: &str) -> &mut Self {
        self.param(ParameterDeclaration::named(ParamSource::Path, name, index))
    }

    pub fn query(&mut self, index: usize, name: &str) -> &mut Self {
        self.param(ParameterDeclaration::named(ParamSource::Query, name, index))
    }

    /// The whole JSON body.
    pub fn body(&mut self, index: usize) -> &mut Self {
        self.param(ParameterDeclaration::new(ParamSource::Body, index))
    }

    pub fn body_field(&mut self, index: usize, name: &str) -> &mut Self {
        self.param(ParameterDeclaration::named(ParamSource::Body, name, index))
    }

    pub fn header(&mut self, index: usize, name: &str) -> &mut Self {
        self.param(ParameterDeclaration::named(ParamSource::Header, name, index))
    }

    pub fn cookie(&mut self, index: usize, name: &str) -> &mut Self {
        self.param(ParameterDeclaration::named(ParamSource::Cookie, name, index))
    }

    pub fn routes(&self) -> &[RouteDeclaration] { &self.routes }
    pub fn response_status(&self) -> Option<u16> { self.response_status }
    pub fn params(&self) -> &[ParameterDeclaration] { &self.params }

    pub(crate) fn action(&self) -> &Action<C> { &self.action }

    fn prepend_middleware(&mut self, middleware: MiddlewareRef) {
        match self.routes.first_mut() {
            Some(first) => first.middleware.insert(0, middleware),
            None => self.pending_middleware.insert(0, middleware),
        }
    }
}

// ── ControllerMetadata ────────────────────────────────────────────────────────

/// The routing descriptor of controller `C`.
pub struct ControllerMetadata<C> {
    base_path: String,
    router_options: RouterOptions,
    middleware: Vec<MiddlewareRef>,
    routes: Vec<(String, RouteGroup<C>)>,
}

impl<C: Send + Sync + 'static> ControllerMetadata<C> {
    pub(crate) fn empty() -> Self {
        Self {
            base_path: String::new(),
            router_options: RouterOptions::default(),
            middleware: Vec::new(),
            routes: Vec::new(),
        }
    }

    pub fn base_path(&mut self, path: impl Into<String>) -> &mut Self {
        self.base_path = path.into();
        self
    }

    pub fn router_options(&mut self, options: RouterOptions) -> &mut Self {
        self.router_options = options;
        self
    }

    /// Adds controller-level middleware; it runs before every route of the
    /// controller, in the order added.
    pub fn middleware(&mut self, middleware: MiddlewareRef) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    /// Declares the action `name`. Declaring a name twice replaces the
    /// earlier declaration.
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use trellis::{Controller, ControllerMetadata, Error, Status};
    ///
    /// struct Ping;
    ///
    /// impl Ping {
    ///     async fn pong(&self) -> Result<&'static str, Error> { Ok("pong") }
    /// }
    ///
    /// impl Controller for Ping {
    ///     fn describe(meta: &mut ControllerMetadata<Self>) {
    ///         meta.base_path("/ping");
    ///         meta.action("pong", |this: Arc<Self>, _args| async move { this.pong().await })
    ///             .get("/")
    ///             .status(Status::Ok);
    ///     }
    /// }
    /// ```
    pub fn action<F, Fut, R>(&mut self, name: &str, action: F) -> &mut RouteGroup<C>
    where
        F: Fn(Arc<C>, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: IntoReply + 'static,
    {
        let erased: Action<C> = Arc::new(
            move |this: Arc<C>, args: Args| -> BoxFuture<Result<Option<Response>, Error>> {
                let fut = action(this, args);
                Box::pin(async move { fut.await.map(IntoReply::into_reply) })
            },
        );

        let group = RouteGroup::new(erased);
        let index = match self.routes.iter().position(|(n, _)| n == name) {
            Some(index) => {
                self.routes[index].1 = group;
                index
            }
            None => {
                self.routes.push((name.to_owned(), group));
                self.routes.len() - 1
            }
        };
        &mut self.routes[index].1
    }

    pub fn path(&self) -> &str { &self.base_path }
    pub fn options(&self) -> RouterOptions { self.router_options }
    pub fn middleware_refs(&self) -> &[MiddlewareRef] { &self.middleware }

    /// Whether the controller mounts at the root of its parent router.
    pub fn is_root(&self) -> bool {
        matches!(self.base_path.as_str(), "" | "/")
    }

    pub fn group(&self, name: &str) -> Option<&RouteGroup<C>> {
        self.routes.iter().find(|(n, _)| n == name).map(|(_, g)| g)
    }

    pub fn group_mut(&mut self, name: &str) -> Option<&mut RouteGroup<C>> {
        self.routes.iter_mut().find(|(n, _)| n == name).map(|(_, g)| g)
    }

    /// Action groups in declaration order.
    pub fn groups(&self) -> impl Iterator<Item = (&str, &RouteGroup<C>)> {
        self.routes.iter().map(|(n, g)| (n.as_str(), g))
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Controller metadata keyed by controller type.
#[derive(Default)]
pub struct Registry {
    controllers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The metadata of `C`, described on first access and returned as-is
    /// afterwards.
    pub fn get_meta<C: Controller>(&mut self) -> &mut ControllerMetadata<C> {
        self.controllers
            .entry(TypeId::of::<C>())
            .or_insert_with(|| {
                let mut meta = ControllerMetadata::<C>::empty();
                C::describe(&mut meta);
                debug!(controller = type_name::<C>(), actions = meta.routes.len(), "controller described");
                Box::new(meta)
            })
            .downcast_mut::<ControllerMetadata<C>>()
            .expect("Registry: entry keyed by another type (should be impossible)")
    }

    /// Attaches `middleware` in front of the existing middleware of `C`.
    ///
    /// Without an action name, or when `C` mounts at the root, the
    /// middleware becomes the first controller-level middleware. With an
    /// action name it becomes the first middleware of that action's first
    /// route. Naming an action `C` does not declare does nothing.
    pub fn attach_middleware<C: Controller>(&mut self, action: Option<&str>, middleware: MiddlewareRef) {
        let meta = self.get_meta::<C>();
        match action {
            Some(name) if !meta.is_root() => match meta.group_mut(name) {
                Some(group) => group.prepend_middleware(middleware),
                None => debug!(controller = type_name::<C>(), action = name, "no such action, middleware ignored"),
            },
            _ => meta.middleware.insert(0, middleware),
        }
    }

    pub fn contains<C: 'static>(&self) -> bool {
        self.controllers.contains_key(&TypeId::of::<C>())
    }

    pub fn len(&self) -> usize { self.controllers.len() }
    pub fn is_empty(&self) -> bool { self.controllers.is_empty() }
}
