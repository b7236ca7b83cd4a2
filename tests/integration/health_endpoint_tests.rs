//! Integration tests for the HTTP surface served alongside the WebSocket.

use tokio::net::{TcpListener, TcpStream};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use proactive_hub::gateway::server::router;

use super::test_helpers::{harness, ScriptedAgent};

async fn serve_router() -> std::net::SocketAddr {
    let h = harness(ScriptedAgent::default());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = router(h.state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

async fn raw_get(addr: std::net::SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.expect("write");
    let mut response = String::new();
    stream.read_to_string(&mut response).await.expect("read");
    response
}

#[tokio::test]
async fn health_returns_ok() {
    let addr = serve_router().await;
    let response = raw_get(addr, "/health").await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.ends_with("ok"), "{response}");
}

#[tokio::test]
async fn websocket_route_rejects_plain_http() {
    let addr = serve_router().await;
    let response = raw_get(addr, "/ws").await;
    let status: u16 = response
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("status code");
    assert!((400..500).contains(&status), "{response}");
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let addr = serve_router().await;
    let response = raw_get(addr, "/nope").await;
    assert!(response.starts_with("HTTP/1.1 404"), "{response}");
}
