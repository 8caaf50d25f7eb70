//! End-to-end tests against an in-process WebSocket message bus.

use std::sync::Arc;
use std::time::Duration;

use contxt_bus::{Ack, HandlerError, MessageBus, MessageBusConnection, Subscribe};
use contxt_core::{OrganizationId, SequentialIdGenerator};
use contxt_settings::ApiSettings;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

const TIMEOUT: Duration = Duration::from_secs(5);

/// What the fake bus observed.
#[derive(Clone, Default)]
struct Observed {
    frames: Arc<Mutex<Vec<Value>>>,
    paths: Arc<Mutex<Vec<String>>>,
    authorization: Arc<Mutex<Vec<Option<String>>>>,
}

impl Observed {
    fn methods(&self) -> Vec<String> {
        self.frames
            .lock()
            .iter()
            .filter_map(|f| f["method"].as_str().map(str::to_owned))
            .collect()
    }

    fn acks(&self) -> Vec<Value> {
        self.frames
            .lock()
            .iter()
            .filter(|f| f["method"] == "MessageBus.Acknowledge")
            .map(|f| f["params"]["message_id"].clone())
            .collect()
    }
}

/// Boot a fake bus. Every subscribe gets `sub-1` and one push `m-1`; a
/// publish to channel `drop` kills the socket.
async fn boot_bus() -> (String, Observed) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let observed = Observed::default();
    let seen = observed.clone();

    let _server = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let seen = seen.clone();
            let _conn = tokio::spawn(async move {
                let headers = seen.clone();
                let ws = accept_hdr_async(stream, move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    headers.paths.lock().push(req.uri().path().to_owned());
                    headers.authorization.lock().push(
                        req.headers()
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_owned),
                    );
                    Ok(resp)
                })
                .await
                .unwrap();
                serve(ws, seen).await;
            });
        }
    });

    (format!("ws://{addr}"), observed)
}

async fn serve(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    seen: Observed,
) {
    let (mut sink, mut stream) = ws.split();
    while let Some(Ok(msg)) = stream.next().await {
        let Message::Text(text) = msg else { continue };
        let frame: Value = serde_json::from_str(text.as_str()).unwrap();
        seen.frames.lock().push(frame.clone());

        let id = frame["id"].clone();
        let mut replies = Vec::new();
        match frame["method"].as_str().unwrap_or_default() {
            "MessageBus.Authorize" if frame["params"]["token"] == "bad" => {
                replies.push(json!({"jsonrpc": "2.0", "id": id, "error": {"code": 401, "message": "Unauthorized"}}));
            }
            "MessageBus.Authorize" => {
                replies.push(json!({"jsonrpc": "2.0", "id": id, "result": {"authorized": true}}));
            }
            "MessageBus.Publish" if frame["params"]["channel"] == "drop" => {
                // Abandon the socket without a close frame.
                return;
            }
            "MessageBus.Publish" => {
                replies.push(json!({"jsonrpc": "2.0", "id": id, "result": {"published": true}}));
            }
            "MessageBus.Subscribe" => {
                replies.push(json!({"jsonrpc": "2.0", "id": id, "result": {"subscription": "sub-1"}}));
                replies.push(json!({
                    "jsonrpc": "2.0",
                    "id": "sub-1",
                    "result": {"id": "m-1", "body": {"temp": 70}},
                }));
            }
            "MessageBus.Acknowledge" => {
                replies.push(json!({"jsonrpc": "2.0", "id": id, "result": {"acknowledged": true}}));
            }
            _ => {}
        }
        for reply in replies {
            if sink.send(Message::Text(reply.to_string().into())).await.is_err() {
                return;
            }
        }
    }
}

async fn connect(url: &str) -> MessageBusConnection {
    contxt_bus::websocket::connect_with_id_generator(
        &format!("{url}/organizations/org-1/stream"),
        Some("tok"),
        Arc::new(SequentialIdGenerator::new("req")),
    )
    .await
    .unwrap()
}

async fn wait_for(mut check: impl FnMut() -> bool) {
    timeout(TIMEOUT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn authorize_and_publish_round_trip() {
    let (url, observed) = boot_bus().await;
    let conn = connect(&url).await;
    assert!(conn.is_connected());

    let authorized = timeout(TIMEOUT, conn.authorize("tok")).await.unwrap().unwrap();
    assert_eq!(authorized["authorized"], true);

    let published = timeout(TIMEOUT, conn.publish("svc-1", "feed:1", json!({"x": 1})))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(published["published"], true);

    let frames = observed.frames.lock().clone();
    assert_eq!(
        frames[1],
        json!({
            "jsonrpc": "2.0",
            "method": "MessageBus.Publish",
            "params": {"service_id": "svc-1", "channel": "feed:1", "message": {"x": 1}},
            "id": "req-2",
        })
    );
    assert_eq!(observed.authorization.lock()[0].as_deref(), Some("Bearer tok"));
    assert_eq!(observed.paths.lock()[0], "/organizations/org-1/stream");
    assert_eq!(conn.handler_count(), 0);
}

#[tokio::test]
async fn server_error_rejects_request() {
    let (url, _observed) = boot_bus().await;
    let conn = connect(&url).await;

    let err = timeout(TIMEOUT, conn.authorize("bad")).await.unwrap().unwrap_err();
    assert_eq!(
        err.rpc_payload(),
        Some(&json!({"code": 401, "message": "Unauthorized"}))
    );
}

#[tokio::test]
async fn subscribe_delivers_push_and_auto_acks() {
    let (url, observed) = boot_bus().await;
    let conn = connect(&url).await;

    let (body_tx, mut body_rx) = mpsc::unbounded_channel();
    let request = Subscribe::new("svc-1", "feed:1")
        .group("workers")
        .on_message(move |body: Value, _ack: Ack| {
            let body_tx = body_tx.clone();
            async move {
                let _ = body_tx.send(body);
                Ok::<(), HandlerError>(())
            }
        })
        .on_error(|_err: Value| {});

    let result = timeout(TIMEOUT, conn.subscribe(request)).await.unwrap().unwrap();
    assert_eq!(result["subscription"], "sub-1");

    let body = timeout(TIMEOUT, body_rx.recv()).await.unwrap().unwrap();
    assert_eq!(body, json!({"temp": 70}));

    wait_for(|| observed.acks().len() == 1).await;
    assert_eq!(observed.acks(), vec![json!("m-1")]);

    let subscribe = observed.frames.lock()[0].clone();
    assert_eq!(
        subscribe["params"],
        json!({"service_id": "svc-1", "channel": "feed:1", "group": "workers"})
    );
}

#[tokio::test]
async fn manual_ack_is_not_repeated() {
    let (url, observed) = boot_bus().await;
    let conn = connect(&url).await;

    let request = Subscribe::new("svc-1", "feed:1")
        .on_message(|_body: Value, ack: Ack| async move {
            let answer = ack.ack().await?;
            assert_eq!(answer["acknowledged"], true);
            Ok::<(), HandlerError>(())
        })
        .on_error(|_err: Value| {});
    let _ = timeout(TIMEOUT, conn.subscribe(request)).await.unwrap().unwrap();

    wait_for(|| observed.acks().len() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(observed.acks().len(), 1);
}

#[tokio::test]
async fn close_marks_connection_down() {
    let (url, _observed) = boot_bus().await;
    let conn = connect(&url).await;

    conn.close();
    assert!(!conn.is_connected());
    let err = conn.publish("svc", "ch", json!(1)).await.unwrap_err();
    assert_eq!(err.to_string(), "WebSocket connection not open");
}

#[tokio::test]
async fn registry_caches_per_organization() {
    let (url, observed) = boot_bus().await;
    let bus = MessageBus::new(ApiSettings {
        base_url: url,
        token: Some("tok".into()),
    });
    let org = OrganizationId::from("org-42");

    let first = bus.connect(&org).await.unwrap();
    let second = bus.connect(&org).await.unwrap();
    assert_eq!(first.id(), second.id());
    assert_eq!(observed.paths.lock().clone(), vec!["/organizations/org-42/stream"]);

    let cached = bus.connection(&org).await.unwrap();
    assert_eq!(cached.id(), first.id());

    assert!(bus.disconnect(&org).await);
    assert!(!first.is_connected());
    assert!(bus.connection(&org).await.is_none());

    let third = bus.connect(&org).await.unwrap();
    assert_ne!(third.id(), first.id());
    wait_for(|| observed.paths.lock().len() == 2).await;
    assert!(observed.methods().is_empty());
}

#[tokio::test]
async fn socket_reset_drops_handlers_and_orphans_requests() {
    let (url, _observed) = boot_bus().await;
    let conn = connect(&url).await;

    let request = Subscribe::new("svc-1", "feed:1")
        .on_message(|_body: Value, _ack: Ack| async { Ok::<(), HandlerError>(()) })
        .on_error(|_err: Value| {});
    let _ = timeout(TIMEOUT, conn.subscribe(request)).await.unwrap().unwrap();
    assert!(conn.has_subscription(&"sub-1".into()));

    let pending = conn.publish("svc-1", "drop", json!({"x": 1}));
    wait_for(|| !conn.is_connected()).await;

    assert_eq!(conn.handler_count(), 0);
    assert!(!conn.has_subscription(&"sub-1".into()));
    assert!(timeout(Duration::from_millis(100), pending).await.is_err());

    let err = conn.publish("svc-1", "feed:1", json!(1)).await.unwrap_err();
    assert_eq!(err.to_string(), "WebSocket connection not open");
}
