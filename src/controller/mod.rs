//! Controllers and their attachment onto a [`Router`].
//!
//! A controller is a plain struct whose methods serve HTTP routes. It
//! declares those routes once, in [`Controller::describe`]; at startup
//! [`attach_controllers`] turns every description into a sub-router and
//! mounts it at the controller's base path:
//!
//! ```text
//! Controller::describe ──▶ Registry ──▶ attach_controllers ──▶ Router
//!   (routes, params,        (one record     (sub-router per     (mounted at
//!    middleware, status)     per type)       controller)          base path)
//! ```
//!
//! Per request, the chain of a controller route is: the app's global
//! middleware, the controller's middleware, the route's middleware, and
//! finally the generated handler from [`route_handler`].

mod action;
mod metadata;
mod params;

use std::any::type_name;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::try_join_all;
use tracing::{debug, info};

use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler};
use crate::middleware::{MiddlewareRef, middleware_handler};
use crate::router::Router;

pub use action::{route_handler, send_reply};
pub use metadata::{ControllerMetadata, Registry, RouteDeclaration, RouteGroup};
pub use params::{Arg, Args, ParamSource, ParameterDeclaration, extract_parameters};

/// A type whose methods are mapped to HTTP routes.
///
/// ```rust
/// use std::sync::Arc;
/// use trellis::{Controller, ControllerMetadata, Error, HttpError, Json, Status};
///
/// struct Users;
///
/// impl Users {
///     async fn find(&self, id: u64) -> Result<Json<u64>, Error> {
///         if id == 0 {
///             return Err(HttpError::NotFound(format!("user {id}")).into());
///         }
///         Ok(Json(id))
///     }
/// }
///
/// impl Controller for Users {
///     fn describe(meta: &mut ControllerMetadata<Self>) {
///         meta.base_path("/users");
///         meta.action("find", |this: Arc<Self>, args| async move {
///             this.find(args.value(0)?).await
///         })
///         .get("/{id}")
///         .path_param(0, "id");
///     }
/// }
/// ```
pub trait Controller: Sized + Send + Sync + 'static {
    /// Declares the controller's routes. Runs once per [`Registry`].
    fn describe(meta: &mut ControllerMetadata<Self>);
}

/// A controller waiting to be attached: an instance, or a recipe for one.
pub struct ControllerInstance {
    name: &'static str,
    resolve: BoxFuture<Result<Box<dyn Mount>, Error>>,
}

impl ControllerInstance {
    pub fn new<C: Controller>(controller: C) -> Self {
        Self::from_arc(Arc::new(controller))
    }

    pub fn from_arc<C: Controller>(controller: Arc<C>) -> Self {
        Self {
            name: type_name::<C>(),
            resolve: Box::pin(async move { Ok(Box::new(Resolved(controller)) as Box<dyn Mount>) }),
        }
    }

    /// `C` constructed with `Default` when attached.
    pub fn of<C: Controller + Default>() -> Self {
        Self::from_factory(|| async { Ok::<_, Error>(C::default()) })
    }

    /// `C` constructed by an async, fallible factory when attached.
    pub fn from_factory<C, F, Fut>(factory: F) -> Self
    where
        C: Controller,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<C, Error>> + Send + 'static,
    {
        Self {
            name: type_name::<C>(),
            resolve: Box::pin(async move {
                let controller = factory().await?;
                Ok(Box::new(Resolved(Arc::new(controller))) as Box<dyn Mount>)
            }),
        }
    }

    pub fn name(&self) -> &'static str { self.name }
}

trait Mount: Send {
    fn name(&self) -> &'static str;
    fn build(&self, registry: &mut Registry) -> Result<(String, Router), Error>;
}

struct Resolved<C>(Arc<C>);

impl<C: Controller> Mount for Resolved<C> {
    fn name(&self) -> &'static str {
        type_name::<C>()
    }

    fn build(&self, registry: &mut Registry) -> Result<(String, Router), Error> {
        let meta = registry.get_meta::<C>();
        let router = build_router(Arc::clone(&self.0), meta)?;
        Ok((meta.path().to_owned(), router))
    }
}

/// The sub-router for one controller instance, not yet mounted.
pub fn build_router<C: Controller>(instance: Arc<C>, meta: &ControllerMetadata<C>) -> Result<Router, Error> {
    let mut router = Router::with_options(meta.options());
    for middleware in meta.middleware_refs() {
        router = router.middleware_boxed(middleware_handler(middleware.clone()));
    }

    for (action, group) in meta.groups() {
        if let Some(param) = group.params().iter().find(|p| p.index == usize::MAX) {
            return Err(Error::InvalidRoute {
                path: format!("{}::{action}", type_name::<C>()),
                reason: format!("parameter index {} is out of range", param.index),
            });
        }
        for decl in group.routes() {
            let mut chain: Vec<BoxedHandler> = decl
                .middleware()
                .iter()
                .cloned()
                .map(middleware_handler)
                .collect();
            chain.push(route_handler(Arc::clone(&instance), group));

            router = router.route(decl.method(), decl.path(), chain)?;
            debug!(
                controller = type_name::<C>(),
                action,
                method = %decl.method(),
                path = %format!("{}{}", meta.path().trim_end_matches('/'), decl.path()),
                "route bound"
            );
        }
    }
    Ok(router)
}

/// Attaches every controller onto `app`.
///
/// Controllers are resolved concurrently; each is then built into its own
/// sub-router and mounted at its base path, in list order. Consuming the
/// registry freezes all metadata. A malformed or conflicting route aborts
/// the whole attachment.
pub async fn attach_controllers(
    mut app: Router,
    mut registry: Registry,
    controllers: Vec<ControllerInstance>,
) -> Result<Router, Error> {
    let resolved = try_join_all(controllers.into_iter().map(|c| c.resolve)).await?;

    for controller in resolved {
        let (path, router) = controller.build(&mut registry)?;
        info!(controller = controller.name(), path = %path, "controller mounted");
        app = app.mount(&path, router);
    }
    Ok(app)
}

/// Applies global middleware to `app`, in order.
pub fn attach_middlewares(app: Router, middlewares: Vec<MiddlewareRef>) -> Router {
    middlewares
        .into_iter()
        .fold(app, |app, middleware| app.middleware_boxed(middleware_handler(middleware)))
}
