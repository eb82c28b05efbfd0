//! Dashboard HTTP tests against a server bound to an ephemeral port.

use std::net::SocketAddr;
use std::time::Duration;

use admitq::dashboard::{self, DashboardState};
use admitq::engine::QueueService;
use admitq::model::{NewWorkItem, WorkId};
use serde_json::{Value, json};
use tokio::sync::oneshot;

struct TestServer {
    addr: SocketAddr,
    service: QueueService,
    stop: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<admitq::error::Result<()>>,
}

impl TestServer {
    async fn start() -> Self {
        let service = QueueService::default();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = DashboardState {
            service: service.clone(),
            stats_push_interval: Duration::from_secs(5),
        };
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(dashboard::serve(listener, state, async move {
            stopped.await.ok();
        }));
        Self {
            addr,
            service,
            stop: Some(stop),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("dashboard did not shut down")
            .unwrap()
            .unwrap();
    }
}

async fn get_json(url: &str) -> Value {
    reqwest::get(url).await.unwrap().json().await.unwrap()
}

async fn post_json(url: &str) -> Value {
    reqwest::Client::new()
        .post(url)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn health_reports_queue_size() {
    let server = TestServer::start().await;
    server.service.enqueue(NewWorkItem::new("a")).await;

    let body = get_json(&server.url("/health")).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["queueSize"], 1);
    assert!(body["timestamp"].as_i64().unwrap() > 0);

    server.shutdown().await;
}

#[tokio::test]
async fn queue_stats_lists_items_and_stats() {
    let server = TestServer::start().await;
    server
        .service
        .enqueue(
            NewWorkItem::new("msg-1")
                .priority(5)
                .message(json!({"content": "hi"}))
                .route_reason("direct mention"),
        )
        .await;
    server.service.enqueue(NewWorkItem::new("msg-2").priority(70)).await;
    server.service.claim("w1").await.unwrap();

    let body = get_json(&server.url("/queue-stats")).await;
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);

    let first = items.iter().find(|i| i["id"] == "msg-1").unwrap();
    assert_eq!(first["priority"], 5);
    assert_eq!(first["routerReason"], "direct mention");
    assert_eq!(first["claimedBy"], "w1");
    assert!(first["claimedAt"].is_i64());
    assert_eq!(first["attempts"], 1);
    assert!(first["timestamp"].is_i64());

    let stats = &body["stats"];
    assert_eq!(stats["totalItems"], 2);
    assert_eq!(stats["claimedItems"], 1);
    assert_eq!(stats["priorityBands"]["critical"], 1);
    assert_eq!(stats["priorityBands"]["low"], 1);
    assert!(stats["lastSuccess"].is_null());
    assert_eq!(stats["avgWait"], stats["averageWaitTime"]);
    assert_eq!(stats["throughputHour"], 0);

    server.shutdown().await;
}

#[tokio::test]
async fn delete_clear_and_purge() {
    let server = TestServer::start().await;
    for (id, p) in [("a", 10), ("b", 70), ("c", 95), ("d", 40)] {
        server.service.enqueue(NewWorkItem::new(id).priority(p)).await;
    }

    let body = post_json(&server.url("/queue-delete/d")).await;
    assert_eq!(body, json!({"success": true}));
    assert!(server.service.get(&WorkId::from("d")).is_none());

    // Unknown ids still succeed.
    let body = post_json(&server.url("/queue-delete/ghost")).await;
    assert_eq!(body["success"], true);

    let body = post_json(&server.url("/queue-purge/60")).await;
    assert_eq!(body, json!({"success": true, "purged": 2}));
    assert_eq!(server.service.len(), 1);

    let body = post_json(&server.url("/queue-clear")).await;
    assert_eq!(body, json!({"success": true, "cleared": 1}));
    assert!(server.service.is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn purge_rejects_non_numeric_priority() {
    let server = TestServer::start().await;

    let resp = reqwest::Client::new()
        .post(server.url("/queue-purge/lots"))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_client_error());

    server.shutdown().await;
}

#[tokio::test]
async fn cors_is_open() {
    let server = TestServer::start().await;

    let resp = reqwest::Client::new()
        .get(server.url("/health"))
        .header("Origin", "http://dashboard.local")
        .send()
        .await
        .unwrap();
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );

    server.shutdown().await;
}
