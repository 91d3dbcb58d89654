//! End-to-end tests for the HTTP API.
//!
//! Each test binds a real listener on an ephemeral port, backs it with an
//! on-disk SQLite database in a temp directory, and talks to it with
//! `reqwest`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use conceptgraph::config::ConceptGraphConfig;
use conceptgraph::server::{serve, AppState};
use conceptgraph::store::SqliteStore;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct TestServer {
    addr: SocketAddr,
    client: Client,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<conceptgraph::Result<()>>,
    _dir: TempDir,
}

impl TestServer {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open(&dir.path().join("concepts.db")).unwrap());

        let mut config = ConceptGraphConfig::default();
        config.traversal.max_depth = 5;
        let state = AppState::new(store, &config);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(serve(
            listener,
            state,
            async move {
                let _ = stopped.await;
            },
            Duration::from_secs(2),
        ));

        Self {
            addr,
            client: Client::new(),
            stop: Some(stop),
            handle,
            _dir: dir,
        }
    }

    async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.handle.await.unwrap().unwrap();
    }

    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Response {
        let mut request = self
            .client
            .request(method, format!("http://{}{path}", self.addr));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let res = request.send().await.unwrap();
        Response {
            status: res.status().as_u16(),
            headers: res.headers().clone(),
            body: res.text().await.unwrap(),
        }
    }
}

struct Response {
    status: u16,
    headers: reqwest::header::HeaderMap,
    body: String,
}

impl Response {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

async fn create(server: &TestServer, title: &str, prerequisites: &[&str]) -> String {
    let res = server
        .request(
            Method::POST,
            "/concept/new",
            Some(json!({ "title": title, "content": "", "prerequisites": prerequisites })),
        )
        .await;
    assert_eq!(res.status, 201, "{}", res.body);
    res.json()["uuid"].as_str().unwrap().to_string()
}

fn ids(list: &Value) -> Vec<String> {
    let mut ids: Vec<String> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["uuid"].as_str().unwrap().to_string())
        .collect();
    ids.sort();
    ids
}

// ===========================================================================
// Tests
// ===========================================================================

#[tokio::test]
async fn neighborhood_over_http() {
    let server = TestServer::start().await;
    let a = create(&server, "Arithmetic", &[]).await;
    let b = create(&server, "Algebra", &[a.as_str()]).await;
    let c = create(&server, "Calculus", &[b.as_str()]).await;

    let res = server
        .request(Method::GET, &format!("/concept/around/{b}?depth=1"), None)
        .await;
    assert_eq!(res.status, 200, "{}", res.body);
    let body = res.json();

    let mut want = vec![a.clone(), b.clone(), c.clone()];
    want.sort();
    assert_eq!(ids(&body["concepts"]), want);
    assert_eq!(body["links"].as_array().unwrap().len(), 2);

    let res = server
        .request(
            Method::POST,
            "/concept/around",
            Some(json!({ "root_id": b, "depth": 0 })),
        )
        .await;
    let body = res.json();
    assert_eq!(ids(&body["concepts"]), vec![b.clone()]);
    assert_eq!(body["concepts"][0]["prerequisites"], json!([a]));
    assert_eq!(body["links"], json!([]));

    server.shutdown().await;
}

#[tokio::test]
async fn crud_round_trip() {
    let server = TestServer::start().await;
    let sets = create(&server, "Sets", &[]).await;
    let logic = create(&server, "Logic", &[]).await;

    let res = server
        .request(
            Method::POST,
            "/concept/link",
            Some(json!({ "start_id": logic, "end_id": sets })),
        )
        .await;
    assert_eq!(res.status, 200, "{}", res.body);

    let res = server
        .request(
            Method::PUT,
            &format!("/concept/update/{sets}"),
            Some(json!({ "content": "collections of things" })),
        )
        .await;
    assert_eq!(res.status, 200);
    assert_eq!(res.json()["content"], "collections of things");

    let res = server.request(Method::GET, &format!("/concept/{sets}"), None).await;
    assert_eq!(res.json()["prerequisites"], json!([logic]));

    let res = server.request(Method::GET, "/concept/search?query=LOG", None).await;
    assert_eq!(ids(&res.json()), vec![logic.clone()]);

    let res = server
        .request(Method::DELETE, &format!("/concept/delete/{logic}"), None)
        .await;
    assert_eq!(res.status, 204);

    let res = server.request(Method::GET, "/concept/all", None).await;
    assert_eq!(ids(&res.json()), vec![sets.clone()]);
    assert_eq!(res.json()[0]["prerequisites"], json!([]));

    server.shutdown().await;
}

#[tokio::test]
async fn errors_map_to_status_codes() {
    let server = TestServer::start().await;
    let a = create(&server, "Arithmetic", &[]).await;

    let res = server.request(Method::GET, "/concept/around/missing?depth=1", None).await;
    assert_eq!(res.status, 404);
    assert!(res.json()["error"].as_str().unwrap().contains("missing"));

    let res = server
        .request(Method::GET, &format!("/concept/around/{a}?depth=-1"), None)
        .await;
    assert_eq!(res.status, 400);

    let res = server
        .request(Method::GET, &format!("/concept/around/{a}?depth=6"), None)
        .await;
    assert_eq!(res.status, 400, "above the configured maximum");

    let res = server
        .request(Method::GET, &format!("/concept/around/{a}?depth=deep"), None)
        .await;
    assert_eq!(res.status, 400);
    assert!(res.json()["error"].is_string());

    let res = server
        .request(
            Method::POST,
            "/concept/link",
            Some(json!({ "start_id": a, "end_id": a })),
        )
        .await;
    assert_eq!(res.status, 400);

    let res = server.request(Method::POST, "/concept/new", Some(json!({ "content": "x" }))).await;
    assert_eq!(res.status, 400, "title is required");

    server.shutdown().await;
}

#[tokio::test]
async fn cors_headers_and_preflight() {
    let server = TestServer::start().await;

    let res = server.request(Method::OPTIONS, "/concept/new", None).await;
    assert_eq!(res.status, 200);
    assert_eq!(res.header("access-control-allow-origin"), Some("*"));
    assert_eq!(
        res.header("access-control-allow-methods"),
        Some("GET,POST,PUT,DELETE")
    );

    let res = server.request(Method::GET, "/", None).await;
    assert_eq!(res.status, 200);
    assert_eq!(res.header("access-control-allow-origin"), Some("*"));

    server.shutdown().await;
}

#[tokio::test]
async fn data_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("concepts.db");

    let id = {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let service = conceptgraph::graph::ConceptService::new(store);
        service.create("Persistence", "", &[]).unwrap().id
    };

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let service = conceptgraph::graph::ConceptService::new(store);
    assert_eq!(service.get(&id).unwrap().title, "Persistence");
}
