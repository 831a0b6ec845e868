//! A small todo API built from two controllers.
//!
//! Run with:
//!   RUST_LOG=trellis=debug,controllers=info cargo run --example controllers
//!
//! Try:
//!   curl http://localhost:3000/todos
//!   curl -X POST http://localhost:3000/todos \
//!        -H 'content-type: application/json' \
//!        -H 'authorization: Bearer demo' \
//!        -d '{"title":"water the plants"}'
//!   curl http://localhost:3000/todos/0
//!   curl -X DELETE http://localhost:3000/todos/0 -H 'authorization: Bearer demo'
//!   curl http://localhost:3000/healthz

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;
use tracing_subscriber::EnvFilter;
use trellis::{
    Controller, ControllerInstance, ControllerMetadata, Error, HttpError, Json, Middleware,
    MiddlewareRef, Next, Registry, Request, Responder, Router, Server, ServerConfig, Status,
    attach_controllers, attach_middlewares,
};

// ── Middleware ────────────────────────────────────────────────────────────────

/// Logs method, path and latency. One instance per request.
struct AccessLog {
    started: Instant,
}

impl Default for AccessLog {
    fn default() -> Self {
        Self { started: Instant::now() }
    }
}

#[async_trait]
impl Middleware for AccessLog {
    async fn handle(&self, req: Request, res: Responder, next: Next) -> Result<(), Error> {
        let (method, path) = (req.method(), req.path().to_owned());
        next.run(req, res.clone()).await;
        info!(
            %method,
            path = %path,
            status = res.status().unwrap_or(204),
            elapsed_us = self.started.elapsed().as_micros() as u64,
            "request"
        );
        Ok(())
    }
}

async fn require_token(req: Request, res: Responder, next: Next) -> Result<(), Error> {
    match req.header("authorization") {
        Some(token) if token.starts_with("Bearer ") => {
            next.run(req, res).await;
            Ok(())
        }
        _ => Err(HttpError::Unauthorized("missing bearer token".into()).into()),
    }
}

// ── Controllers ───────────────────────────────────────────────────────────────

#[derive(Clone, Serialize)]
struct Todo {
    id: u64,
    title: String,
    done: bool,
}

#[derive(Deserialize)]
struct NewTodo {
    title: String,
}

#[derive(Default)]
struct Todos {
    next_id: AtomicU64,
    items: RwLock<Vec<Todo>>,
}

impl Todos {
    async fn list(&self, done: Option<bool>) -> Result<Json<Vec<Todo>>, Error> {
        let items = self.items.read().await;
        Ok(Json(
            items.iter().filter(|t| done.is_none_or(|d| t.done == d)).cloned().collect(),
        ))
    }

    async fn find(&self, id: u64) -> Result<Json<Todo>, Error> {
        let items = self.items.read().await;
        items
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .map(Json)
            .ok_or_else(|| HttpError::NotFound(format!("todo {id}")).into())
    }

    async fn create(&self, new: NewTodo) -> Result<Json<Todo>, Error> {
        if new.title.trim().is_empty() {
            return Err(HttpError::UnprocessableContent("title must not be empty".into()).into());
        }
        let mut items = self.items.write().await;
        if items.iter().any(|t| t.title == new.title) {
            return Err(HttpError::conflict().into());
        }
        let todo = Todo {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            title: new.title,
            done: false,
        };
        items.push(todo.clone());
        Ok(Json(todo))
    }

    async fn complete(&self, id: u64) -> Result<Json<Todo>, Error> {
        let mut items = self.items.write().await;
        let todo = items
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| HttpError::NotFound(format!("todo {id}")))?;
        todo.done = true;
        Ok(Json(todo.clone()))
    }

    async fn remove(&self, id: u64) -> Result<(), Error> {
        let mut items = self.items.write().await;
        let before = items.len();
        items.retain(|t| t.id != id);
        if items.len() == before {
            return Err(HttpError::NotFound(format!("todo {id}")).into());
        }
        Ok(())
    }
}

impl Controller for Todos {
    fn describe(meta: &mut ControllerMetadata<Self>) {
        meta.base_path("/todos");

        meta.action("list", |this: Arc<Self>, args| async move { this.list(args.value(0)?).await })
            .get("/")
            .query(0, "done");

        meta.action("find", |this: Arc<Self>, args| async move { this.find(args.value(0)?).await })
            .get("/{id}")
            .path_param(0, "id");

        meta.action("create", |this: Arc<Self>, args| async move {
            this.create(args.value(0)?).await
        })
        .middleware(MiddlewareRef::function(require_token))
        .post("/")
        .body(0)
        .status(Status::Created);

        meta.action("complete", |this: Arc<Self>, args| async move {
            this.complete(args.value(0)?).await
        })
        .patch("/{id}/done")
        .path_param(0, "id");

        meta.action("remove", |this: Arc<Self>, args| async move { this.remove(args.value(0)?).await })
            .delete("/{id}")
            .path_param(0, "id");
    }
}

struct Health;

impl Controller for Health {
    fn describe(meta: &mut ControllerMetadata<Self>) {
        meta.action("live", |_this: Arc<Self>, _args| async { Ok::<_, Error>("ok") })
            .get("/healthz");
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;

    let mut registry = Registry::new();
    registry.attach_middleware::<Todos>(Some("remove"), MiddlewareRef::function(require_token));

    let app = attach_middlewares(Router::with_options(config.router), vec![MiddlewareRef::of::<AccessLog>()]);
    let app = attach_controllers(app, registry, vec![
        ControllerInstance::of::<Todos>(),
        ControllerInstance::new(Health),
    ])
    .await?;

    Server::new(config).serve(app).await
}
