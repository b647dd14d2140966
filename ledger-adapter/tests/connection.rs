//! Notification-stream lifecycle tests against a loopback websocket
//! server: first open, idempotent connect, notification delivery,
//! auto-reconnect and intentional disconnect.

use anyhow::Result;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use ledger_adapter::{Credentials, Error, EventHandler, LedgerAdapter, LedgerEvent};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TRANSFER_ID: &str = "6851929f-5a91-4d02-b9f4-4ae6b7f1768c";

#[derive(Default)]
struct Collector {
    events: Mutex<Vec<LedgerEvent>>,
}

#[async_trait]
impl EventHandler for Collector {
    async fn on_event(&self, event: LedgerEvent) {
        self.events.lock().await.push(event);
    }
}

impl Collector {
    async fn names(&self) -> Vec<&'static str> {
        self.events.lock().await.iter().map(|e| e.name()).collect()
    }
}

async fn mount_rest(server: &MockServer, ws_port: u16) {
    let uri = server.uri();
    Mock::given(method("GET"))
        .and(path("/accounts/mike"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ledger": uri,
            "name": "mike",
            "balance": "0"
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "precision": 10,
            "scale": 2,
            "urls": {
                "transfer": format!("{uri}/transfers/:id"),
                "transfer_fulfillment": format!("{uri}/transfers/:id/fulfillment"),
                "transfer_rejection": format!("{uri}/transfers/:id/rejection"),
                "account": format!("{uri}/accounts/:name"),
                "account_transfers": format!("ws://127.0.0.1:{ws_port}/accounts/:name/transfers"),
                "message": format!("{uri}/messages"),
            }
        })))
        .mount(server)
        .await;
}

/// Adapter logs go through `tracing`; surface them in test output when
/// `RUST_LOG` asks for them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn adapter_for(server: &MockServer) -> LedgerAdapter {
    init_tracing();
    LedgerAdapter::new(Credentials {
        account_uri: format!("{}/accounts/mike", server.uri()),
        username: None,
        password: "mike".to_string(),
        prefix: "example.red.".to_string(),
        client_cert_pem: None,
    })
    .expect("valid credentials")
}

/// Websocket server that holds every connection open until the client
/// closes, optionally greeting each connection with the given frames.
async fn ws_server(frames: Vec<String>) -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let frames = frames.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                for frame in frames {
                    if ws.send(WsMessage::Text(frame)).await.is_err() {
                        return;
                    }
                }
                while let Some(frame) = ws.next().await {
                    if frame.is_err() {
                        break;
                    }
                }
            });
        }
    });
    Ok(port)
}

async fn wait_for<F>(mut condition: F)
where
    F: FnMut() -> futures::future::BoxFuture<'static, bool>,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if condition().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn connect_is_idempotent_and_disconnect_is_clean() -> Result<()> {
    let ws_port = ws_server(Vec::new()).await?;
    let rest = MockServer::start().await;
    mount_rest(&rest, ws_port).await;

    let adapter = adapter_for(&rest);
    let collector = Arc::new(Collector::default());
    adapter.subscribe(collector.clone()).await;

    adapter.connect().await?;
    assert!(adapter.is_connected().await);

    // A second connect while connected is a no-op.
    adapter.connect().await?;
    assert_eq!(collector.names().await, vec!["connect"]);

    // An intentional close raises no endpoint error and lands back in
    // the disconnected state.
    adapter.disconnect().await;
    assert!(!adapter.is_connected().await);
    assert_eq!(collector.names().await, vec!["connect", "disconnect"]);

    // Disconnecting again is a no-op.
    adapter.disconnect().await;
    assert_eq!(collector.names().await, vec!["connect", "disconnect"]);
    Ok(())
}

#[tokio::test]
async fn unreachable_stream_endpoint_fails_the_connect() -> Result<()> {
    let rest = MockServer::start().await;
    // Reserve a port, then free it so nothing is listening there.
    let dead_port = {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        listener.local_addr()?.port()
    };
    mount_rest(&rest, dead_port).await;

    let adapter = adapter_for(&rest);
    let collector = Arc::new(Collector::default());
    adapter.subscribe(collector.clone()).await;

    let err = adapter.connect().await.unwrap_err();
    assert!(matches!(err, Error::UnreachableEndpoint(_)));
    assert!(!adapter.is_connected().await);
    assert!(collector.names().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn disconnect_interrupts_a_hanging_handshake() -> Result<()> {
    // Accepts TCP connections but never answers the websocket upgrade,
    // leaving the connect attempt in flight indefinitely.
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let ws_port = listener.local_addr()?.port();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let rest = MockServer::start().await;
    mount_rest(&rest, ws_port).await;

    let adapter = Arc::new(adapter_for(&rest));
    let pending = {
        let adapter = adapter.clone();
        tokio::spawn(async move { adapter.connect().await })
    };
    // Let the attempt reach the handshake before pulling the plug.
    tokio::time::sleep(Duration::from_millis(200)).await;

    tokio::time::timeout(Duration::from_secs(2), adapter.disconnect())
        .await
        .expect("disconnect must not wait out the handshake");

    let err = pending.await?.unwrap_err();
    assert!(matches!(err, Error::UnreachableEndpoint(_)));
    assert!(!adapter.is_connected().await);
    Ok(())
}

#[tokio::test]
async fn stream_notifications_surface_as_events() -> Result<()> {
    let rest = MockServer::start().await;
    let frame = json!({
        "type": "transfer",
        "resource": {
            "id": format!("{}/transfers/{TRANSFER_ID}", rest.uri()),
            "ledger": rest.uri(),
            "debits": [
                {"account": format!("{}/accounts/alice", rest.uri()), "amount": "10"}
            ],
            "credits": [
                {"account": format!("{}/accounts/mike", rest.uri()), "amount": "10"}
            ],
            "state": "prepared"
        }
    });
    let ws_port = ws_server(vec![frame.to_string()]).await?;
    mount_rest(&rest, ws_port).await;

    let adapter = adapter_for(&rest);
    let collector = Arc::new(Collector::default());
    adapter.subscribe(collector.clone()).await;
    adapter.connect().await?;

    let probe = collector.clone();
    wait_for(move || {
        let probe = probe.clone();
        Box::pin(async move { probe.events.lock().await.len() >= 2 })
    })
    .await;

    let events = collector.events.lock().await.clone();
    assert_eq!(events[0], LedgerEvent::Connect);
    match &events[1] {
        LedgerEvent::IncomingPrepare(transfer) => {
            assert_eq!(transfer.id.to_string(), TRANSFER_ID);
            assert_eq!(transfer.account, "example.red.alice");
            assert_eq!(transfer.ledger, "example.red.");
        }
        other => panic!("expected incoming_prepare, got {}", other.name()),
    }

    adapter.disconnect().await;
    Ok(())
}

#[tokio::test]
async fn lost_stream_reconnects_automatically() -> Result<()> {
    // First connection is dropped right after the handshake; later
    // connections are held open.
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let ws_port = listener.local_addr()?.port();
    let connections = Arc::new(AtomicUsize::new(0));
    let seen = connections.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let attempt = seen.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                if attempt == 0 {
                    return;
                }
                while let Some(frame) = ws.next().await {
                    if frame.is_err() {
                        break;
                    }
                }
            });
        }
    });

    let rest = MockServer::start().await;
    mount_rest(&rest, ws_port).await;

    let adapter = adapter_for(&rest);
    let collector = Arc::new(Collector::default());
    adapter.subscribe(collector.clone()).await;
    adapter.connect().await?;

    // connect, disconnect (stream lost), connect again after backoff.
    let probe = collector.clone();
    wait_for(move || {
        let probe = probe.clone();
        Box::pin(async move {
            probe.events.lock().await.iter().filter(|e| **e == LedgerEvent::Connect).count() >= 2
        })
    })
    .await;

    assert!(connections.load(Ordering::SeqCst) >= 2);
    assert_eq!(
        collector.names().await[..3],
        ["connect", "disconnect", "connect"]
    );
    assert!(adapter.is_connected().await);

    adapter.disconnect().await;
    assert!(!adapter.is_connected().await);
    Ok(())
}
