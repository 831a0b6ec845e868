//! End-to-end behavior of controllers attached to a router, driven
//! in-process through `Router::handle`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use trellis::{
    Controller, ControllerInstance, ControllerMetadata, Error, HttpError, Json, Method,
    Middleware, MiddlewareRef, Next, Registry, Request, Responder, Response, Router, Status,
    attach_controllers, attach_middlewares, error_handler,
};

fn get(path: &str) -> Request {
    Request::builder(Method::Get, path).build()
}

fn body_json(res: &Response) -> Value {
    serde_json::from_slice(res.body()).unwrap()
}

type Trail = Arc<Mutex<Vec<&'static str>>>;

/// Function middleware that records `name` and continues the chain.
fn mark(trail: &Trail, name: &'static str) -> MiddlewareRef {
    let trail = Arc::clone(trail);
    MiddlewareRef::function(move |req: Request, res: Responder, next: Next| {
        let trail = Arc::clone(&trail);
        async move {
            trail.lock().unwrap().push(name);
            next.run(req, res).await;
            Ok::<(), Error>(())
        }
    })
}

// ── Notes: a small CRUD controller ───────────────────────────────────────────

#[derive(Default)]
struct Notes {
    notes: Mutex<Vec<String>>,
}

impl Notes {
    async fn list(&self) -> Result<Json<Vec<String>>, Error> {
        tokio::time::sleep(Duration::from_millis(2)).await;
        Ok(Json(self.notes.lock().unwrap().clone()))
    }

    async fn find(&self, id: usize) -> Result<String, Error> {
        self.notes
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| HttpError::NotFound(format!("note {id}")).into())
    }

    async fn create(&self, text: String) -> Result<Json<Value>, Error> {
        let mut notes = self.notes.lock().unwrap();
        if notes.contains(&text) {
            return Err(HttpError::conflict().into());
        }
        notes.push(text);
        Ok(Json(json!({ "id": notes.len() - 1 })))
    }
}

impl Controller for Notes {
    fn describe(meta: &mut ControllerMetadata<Self>) {
        meta.base_path("/notes");
        meta.action("list", |this: Arc<Self>, _args| async move { this.list().await })
            .get("/");
        meta.action("find", |this: Arc<Self>, args| async move { this.find(args.value(0)?).await })
            .get("/{id}")
            .path_param(0, "id");
        meta.action("create", |this: Arc<Self>, args| async move {
            this.create(args.value(0)?).await
        })
        .post("/")
        .body_field(0, "text")
        .status(Status::Created);
        meta.action("fail", |_this: Arc<Self>, _args| async {
            Err::<(), _>(Error::handler("database is gone"))
        })
        .get("/broken/fail");
    }
}

async fn notes_app() -> Router {
    attach_controllers(Router::new(), Registry::new(), vec![ControllerInstance::of::<Notes>()])
        .await
        .unwrap()
}

#[tokio::test]
async fn routes_are_reachable_under_base_path() {
    let app = notes_app().await;

    let create = Request::builder(Method::Post, "/notes")
        .json(&json!({ "text": "buy milk" }))
        .build();
    let res = app.handle(create).await;
    assert_eq!(res.status_code(), 201);
    assert_eq!(body_json(&res), json!({ "id": 0 }));

    let res = app.handle(get("/notes/0")).await;
    assert_eq!(res.status_code(), 200);
    assert_eq!(res.body(), b"buy milk");

    let res = app.handle(get("/notes/")).await;
    assert_eq!(body_json(&res), json!(["buy milk"]));

    assert_eq!(app.handle(get("/0")).await.status_code(), 404);
    assert_eq!(app.handle(Request::builder(Method::Put, "/notes").build()).await.status_code(), 404);
}

#[tokio::test]
async fn http_errors_use_default_formatter() {
    let app = notes_app().await;

    let res = app.handle(get("/notes/7")).await;
    assert_eq!(res.status_code(), 404);
    assert_eq!(
        body_json(&res),
        json!({ "error": "NotFound", "message": "note 7", "status": 404 })
    );

    let create = || Request::builder(Method::Post, "/notes").json(&json!({ "text": "a" })).build();
    app.handle(create()).await;
    let res = app.handle(create()).await;
    assert_eq!(res.status_code(), 409);
    assert_eq!(body_json(&res), json!({ "error": "Conflict", "message": "", "status": 409 }));
}

#[tokio::test]
async fn invalid_arguments_are_bad_requests() {
    let app = notes_app().await;
    let res = app.handle(get("/notes/first")).await;
    assert_eq!(res.status_code(), 400);
    assert_eq!(body_json(&res)["error"], "BadRequest");
}

#[tokio::test]
async fn other_errors_hide_their_message() {
    let app = notes_app().await;
    let res = app.handle(get("/notes/broken/fail")).await;
    assert_eq!(res.status_code(), 500);
    assert_eq!(
        body_json(&res),
        json!({ "error": "InternalServerError", "message": "Internal Server Error", "status": 500 })
    );
}

#[tokio::test]
async fn custom_error_handler_replaces_default() {
    let app = notes_app().await.on_error(error_handler(|err: Error, res: Responder| async move {
        res.set_status(err.status());
        res.send(format!("oops: {err}"));
    }));
    let res = app.handle(get("/notes/3")).await;
    assert_eq!(res.status_code(), 404);
    assert_eq!(res.body(), b"oops: note 3");
}

// ── Middleware ordering ──────────────────────────────────────────────────────

static AUDIT: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

async fn audit_global(req: Request, res: Responder, next: Next) -> Result<(), Error> {
    AUDIT.lock().unwrap().push("global");
    next.run(req, res).await;
    Ok(())
}

async fn audit_controller(req: Request, res: Responder, next: Next) -> Result<(), Error> {
    AUDIT.lock().unwrap().push("controller");
    next.run(req, res).await;
    Ok(())
}

async fn audit_route(req: Request, res: Responder, next: Next) -> Result<(), Error> {
    AUDIT.lock().unwrap().push("route");
    next.run(req, res).await;
    Ok(())
}

#[derive(Default)]
struct Audited;

impl Controller for Audited {
    fn describe(meta: &mut ControllerMetadata<Self>) {
        meta.base_path("/audited");
        meta.middleware(MiddlewareRef::function(audit_controller));
        meta.action("show", |_this: Arc<Self>, _args| async {
            AUDIT.lock().unwrap().push("action");
            Ok::<_, Error>("shown")
        })
        .middleware(MiddlewareRef::function(audit_route))
        .get("/");
    }
}

#[tokio::test]
async fn global_then_controller_then_route_middleware() {
    let app = attach_middlewares(Router::new(), vec![MiddlewareRef::function(audit_global)]);
    let app = attach_controllers(app, Registry::new(), vec![ControllerInstance::of::<Audited>()])
        .await
        .unwrap();

    let res = app.handle(get("/audited")).await;
    assert_eq!(res.body(), b"shown");
    assert_eq!(*AUDIT.lock().unwrap(), ["global", "controller", "route", "action"]);
}

#[derive(Default)]
struct Guarded;

impl Controller for Guarded {
    fn describe(meta: &mut ControllerMetadata<Self>) {
        meta.base_path("/guarded");
        meta.action("open", |_this: Arc<Self>, _args| async { Ok::<_, Error>("open") })
            .get("/");
    }
}

#[tokio::test]
async fn attached_middleware_runs_latest_first() {
    let trail: Trail = Arc::default();
    let mut registry = Registry::new();
    registry.attach_middleware::<Guarded>(Some("open"), mark(&trail, "A"));
    registry.attach_middleware::<Guarded>(Some("open"), mark(&trail, "B"));
    registry.attach_middleware::<Guarded>(None, mark(&trail, "controller"));
    registry.attach_middleware::<Guarded>(Some("missing"), mark(&trail, "never"));

    let app = attach_controllers(Router::new(), registry, vec![ControllerInstance::of::<Guarded>()])
        .await
        .unwrap();
    app.handle(get("/guarded")).await;

    assert_eq!(*trail.lock().unwrap(), ["controller", "B", "A"]);
}

async fn forbid(_req: Request, _res: Responder, _next: Next) -> Result<(), Error> {
    Err(HttpError::Forbidden("staff only".into()).into())
}

#[derive(Default)]
struct Secrets;

impl Controller for Secrets {
    fn describe(meta: &mut ControllerMetadata<Self>) {
        meta.base_path("/s");
        meta.action("read", |_this: Arc<Self>, _args| async { Ok::<_, Error>("secret") })
            .middleware(MiddlewareRef::function(forbid))
            .get("/one")
            .get("/two")
            .route_middleware(MiddlewareRef::function(forbid))
            .get("/three");
    }
}

#[tokio::test]
async fn each_route_runs_its_own_middleware() {
    let app = attach_controllers(Router::new(), Registry::new(), vec![ControllerInstance::of::<Secrets>()])
        .await
        .unwrap();
    assert_eq!(app.handle(get("/s/one")).await.status_code(), 403);
    assert_eq!(app.handle(get("/s/two")).await.status_code(), 403);

    let open = app.handle(get("/s/three")).await;
    assert_eq!(open.status_code(), 200);
    assert_eq!(open.body(), b"secret");
}

// ── Parameter sources ────────────────────────────────────────────────────────

#[derive(Default)]
struct Files;

impl Controller for Files {
    fn describe(meta: &mut ControllerMetadata<Self>) {
        meta.base_path("/files");
        meta.action("open", |_this: Arc<Self>, args| async move {
            let name: String = args.value(0)?;
            Ok::<_, Error>(name)
        })
        .get("/{name}")
        .path_param(0, "name");
        meta.action("whoami", |_this: Arc<Self>, args| async move {
            let user: Option<String> = args.value(0)?;
            let theme: Option<String> = args.value(1)?;
            Ok::<_, Error>(format!("{} {}", user.unwrap_or_default(), theme.unwrap_or_default()))
        })
        .get("/me/session")
        .cookie(0, "user")
        .cookie(1, "theme");
    }
}

async fn files_app() -> Router {
    attach_controllers(Router::new(), Registry::new(), vec![ControllerInstance::of::<Files>()])
        .await
        .unwrap()
}

#[tokio::test]
async fn path_parameters_arrive_decoded() {
    let app = files_app().await;
    assert_eq!(app.handle(get("/files/a%20b")).await.body(), b"a b");
    assert_eq!(app.handle(get("/files/%E2%9C%93.txt")).await.body(), "\u{2713}.txt".as_bytes());
    assert_eq!(app.handle(get("/files/%C3%28")).await.status_code(), 400);
}

#[tokio::test]
async fn cookies_from_every_cookie_header() {
    let app = files_app().await;
    let req = Request::builder(Method::Get, "/files/me/session")
        .header("cookie", "user=ada")
        .header("cookie", "theme=dark")
        .build();
    assert_eq!(app.handle(req).await.body(), b"ada dark");
}

// ── Instantiable middleware ──────────────────────────────────────────────────

static CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);

struct RequestScoped {
    calls: AtomicUsize,
}

impl Default for RequestScoped {
    fn default() -> Self {
        CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
        Self { calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl Middleware for RequestScoped {
    async fn handle(&self, req: Request, res: Responder, next: Next) -> Result<(), Error> {
        let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        res.set_header("x-calls", &calls.to_string());
        next.run(req, res).await;
        Ok(())
    }
}

#[tokio::test]
async fn instantiable_middleware_is_fresh_per_request() {
    let app = Router::new()
        .middleware(MiddlewareRef::of::<RequestScoped>())
        .get("/", trellis::endpoint(|_req: Request| async { "hi" }));

    for _ in 0..3 {
        let res = app.handle(get("/")).await;
        assert_eq!(res.header("x-calls"), Some("1"));
    }
    assert_eq!(CONSTRUCTED.load(Ordering::SeqCst), 3);
}

// ── Replies ──────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Replies;

impl Controller for Replies {
    fn describe(meta: &mut ControllerMetadata<Self>) {
        meta.base_path("/replies");
        meta.action("slow", |_this: Arc<Self>, _args| async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok::<_, Error>(Json(json!({ "late": true })))
        })
        .get("/slow")
        .status(Status::Accepted);
        meta.action("nothing", |_this: Arc<Self>, _args| async { Ok::<_, Error>(None::<String>) })
            .get("/nothing");
        meta.action("manual", |_this: Arc<Self>, args| async move {
            if let Some(res) = args.responder(1) {
                res.set_status(Status::Created);
                res.send("sent by hand");
            }
            Ok::<_, Error>("never sent")
        })
        .get("/manual")
        .response(1);
        meta.action("explode", |_this: Arc<Self>, _args| async move {
            if true {
                panic!("controller bug");
            }
            Ok::<_, Error>(())
        })
        .get("/explode");
    }
}

async fn replies_app() -> Router {
    attach_controllers(Router::new(), Registry::new(), vec![ControllerInstance::of::<Replies>()])
        .await
        .unwrap()
}

#[tokio::test]
async fn async_reply_is_sent_with_declared_status() {
    let res = replies_app().await.handle(get("/replies/slow")).await;
    assert_eq!(res.status_code(), 202);
    assert_eq!(body_json(&res), json!({ "late": true }));
}

#[tokio::test]
async fn empty_reply_is_no_content() {
    let res = replies_app().await.handle(get("/replies/nothing")).await;
    assert_eq!(res.status_code(), 204);
    assert!(res.body().is_empty());
}

#[tokio::test]
async fn manual_send_is_not_overwritten() {
    let res = replies_app().await.handle(get("/replies/manual")).await;
    assert_eq!(res.status_code(), 201);
    assert_eq!(res.body(), b"sent by hand");
}

#[tokio::test]
async fn panicking_action_becomes_500() {
    let app = replies_app().await;
    let res = app.handle(get("/replies/explode")).await;
    assert_eq!(res.status_code(), 500);
    assert_eq!(body_json(&res)["message"], "controller action panicked");

    // The router still serves after a panic.
    assert_eq!(app.handle(get("/replies/slow")).await.status_code(), 202);
}

// ── Router options ───────────────────────────────────────────────────────────

#[derive(Default)]
struct Strict;

impl Controller for Strict {
    fn describe(meta: &mut ControllerMetadata<Self>) {
        meta.base_path("/strict");
        meta.router_options(trellis::RouterOptions { strict: true });
        meta.action("exact", |_this: Arc<Self>, _args| async { Ok::<_, Error>("exact") })
            .get("/exact");
    }
}

#[tokio::test]
async fn strict_controllers_reject_trailing_slash() {
    let app = attach_controllers(Router::new(), Registry::new(), vec![ControllerInstance::of::<Strict>()])
        .await
        .unwrap();
    assert_eq!(app.handle(get("/strict/exact")).await.status_code(), 200);
    assert_eq!(app.handle(get("/strict/exact/")).await.status_code(), 404);
}

#[tokio::test]
async fn controllers_share_one_router() {
    let app = attach_controllers(
        Router::new(),
        Registry::new(),
        vec![ControllerInstance::of::<Notes>(), ControllerInstance::of::<Replies>()],
    )
    .await
    .unwrap();
    assert_eq!(app.handle(get("/notes")).await.status_code(), 200);
    assert_eq!(app.handle(get("/replies/slow")).await.status_code(), 202);
}
