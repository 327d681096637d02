use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use modelops::*;
use serde_json::{json, Value};

/// Records every request as `METHOD path body`.
#[derive(Default)]
struct Gateway {
    log: Mutex<Vec<String>>,
    models: Mutex<Value>,
}

type Shared = Arc<Gateway>;

impl Gateway {
    fn record(&self, line: String) {
        self.log.lock().unwrap().push(line);
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

async fn list_models(State(g): State<Shared>) -> Json<Value> {
    g.record("GET /models/list".into());
    Json(g.models.lock().unwrap().clone())
}

async fn unload(State(g): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    g.record(format!("POST /models/unload {body}"));
    *g.models.lock().unwrap() = json!([{ "model_name": "m1", "status": "unloading" }]);
    Json(json!({ "model_name": body["model_name"], "status": "unloading", "error": null }))
}

async fn load(State(g): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    g.record(format!("POST /models/load {body}"));
    Json(json!({ "model_name": body["model_name"], "status": "error", "error": "no GPU 7" }))
}

async fn download(State(g): State<Shared>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    g.record(format!("POST /models/download {body}"));
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "detail": "hub unreachable" })))
}

async fn list_servers(State(g): State<Shared>) -> Json<Value> {
    g.record("GET /servers/list".into());
    Json(json!({ "servers": [{
        "server_id": "4f1c2d3e-aaaa-bbbb-cccc-000000000001",
        "status": "running",
        "config": { "host": "0.0.0.0", "port": 8001, "model_name": "m1", "gpu_id": 0 }
    }]}))
}

async fn start(State(g): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    g.record(format!("POST /servers/start {body}"));
    Json(json!({ "server_id": "new", "status": "starting", "config": body }))
}

async fn stop(State(g): State<Shared>, Path(id): Path<String>) -> (StatusCode, Json<Value>) {
    g.record(format!("POST /servers/stop/{id}"));
    (StatusCode::NOT_FOUND, Json(json!({ "detail": format!("Server {id} not found") })))
}

async fn health(State(g): State<Shared>, Path(id): Path<String>) -> Json<Value> {
    g.record(format!("GET /servers/health/{id}"));
    Json(json!({ "server_id": id, "status": "running" }))
}

async fn spawn_gateway() -> (Shared, String) {
    let g: Shared = Arc::new(Gateway::default());
    *g.models.lock().unwrap() = json!([{ "model_name": "m1", "status": "ready" }]);

    let app = Router::new()
        .route("/api/models/list", get(list_models))
        .route("/api/models/unload", post(unload))
        .route("/api/models/load", post(load))
        .route("/api/models/download", post(download))
        .route("/api/servers/list", get(list_servers))
        .route("/api/servers/start", post(start))
        .route("/api/servers/stop/:id", post(stop))
        .route("/api/servers/health/:id", get(health))
        .with_state(g.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (g, format!("http://{addr}/api"))
}

fn client(base: &str) -> ApiClient {
    ApiClient::new(&ClientConfig::new(base).unwrap()).unwrap()
}

#[tokio::test]
async fn test_lists_parse_backend_shapes() {
    let (_g, base) = spawn_gateway().await;
    let api = client(&base);

    let models = api.list_models().await.unwrap();
    assert_eq!(models[0].name, "m1");
    assert_eq!(models[0].status, Some(ModelStatus::Ready));

    let servers = api.list_servers().await.unwrap();
    assert_eq!(servers[0].config.port, 8001);
    assert_eq!(servers[0].config.gpu_id, Some(0));
}

#[tokio::test]
async fn test_http_error_carries_detail() {
    let (g, base) = spawn_gateway().await;
    let api = client(&base);

    let err = api.download_model("m2").await.unwrap_err();
    match err {
        ClientError::Http { status, ref message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "hub unreachable");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(g.log(), vec![r#"POST /models/download {"model_name":"m2"}"#.to_string()]);
}

#[tokio::test]
async fn test_error_field_in_ack_is_application_error() {
    let (_g, base) = spawn_gateway().await;
    let err = client(&base).load_model("m1", Some(7)).await.unwrap_err();
    assert!(matches!(err, ClientError::Application(ref m) if m == "no GPU 7"));
}

#[tokio::test]
async fn test_server_calls_hit_path_endpoints() {
    let (g, base) = spawn_gateway().await;
    let api = client(&base);

    api.check_health("abc").await.unwrap();
    let err = api.stop_server("abc").await.unwrap_err();
    assert!(matches!(err, ClientError::Http { status: 404, .. }));
    api.start_server(&ServerConfig::new("m1", 8002)).await.unwrap();

    let log = g.log();
    assert_eq!(log[0], "GET /servers/health/abc");
    assert_eq!(log[1], "POST /servers/stop/abc");
    assert!(log[2].starts_with("POST /servers/start "));
    assert!(log[2].contains(r#""port":8002"#));
}

#[tokio::test]
async fn test_unreachable_backend_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{addr}/api")).list_models().await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
}

#[tokio::test]
async fn test_unload_flow_invalidates_and_refetches() {
    let (g, base) = spawn_gateway().await;
    let api: Arc<dyn Backend> = Arc::new(client(&base));
    let store = Arc::new(LifecycleStore::new(api.clone(), Duration::from_secs(3600)));
    let orch = MutationOrchestrator::new(api, store.clone(), Notifier::default());

    let mut mounted = store.mount_models();
    while mounted.changed().await.is_some_and(|s| s.snapshot.is_none()) {}
    assert!(ModelCard::from(&mounted.state().items()[0]).actions.unload);

    orch.dispatch(Intent::Model { name: "m1".into(), action: ModelAction::Unload })
        .await
        .unwrap();

    assert_eq!(
        g.log(),
        vec![
            "GET /models/list".to_string(),
            r#"POST /models/unload {"model_name":"m1"}"#.to_string(),
            "GET /models/list".to_string(),
        ]
    );
    let state = store.models().state();
    assert_eq!(state.find("m1").unwrap().status, Some(ModelStatus::Unloading));
}
