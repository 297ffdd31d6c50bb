//! Embedded server tests: bind, serve, health, shutdown.

use std::time::Duration;

use coord_server::{EmbeddedServer, ServerConfig, ServerError};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

type Ws = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(server: &EmbeddedServer) -> Ws {
    let url = format!("ws://{}/ws", server.connect_string());
    let (mut ws, _) = connect_async(&url).await.expect("Failed to connect");

    let welcome = next_json(&mut ws).await;
    assert_eq!(welcome["method"], "server/connected");
    assert!(welcome["params"]["clientId"].is_string());
    ws
}

async fn next_json(ws: &mut Ws) -> Value {
    let msg = timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("Timeout waiting for message")
        .expect("Stream ended")
        .expect("WebSocket error");
    serde_json::from_str(&msg.into_text().unwrap()).unwrap()
}

async fn call(ws: &mut Ws, id: i64, method: &str, params: Value) -> Value {
    let req = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
    ws.send(Message::Text(req.to_string().into())).await.unwrap();
    next_json(ws).await
}

#[tokio::test]
async fn ephemeral_port_resolves_to_a_concrete_port() {
    let mut server = EmbeddedServer::start(ServerConfig::new(0)).await.unwrap();
    assert_ne!(server.port(), 0);
    assert!(server.is_running());
    server.stop().await.unwrap();
    assert!(!server.is_running());
}

#[tokio::test]
async fn serves_json_rpc_over_websocket() {
    let mut server = EmbeddedServer::start(ServerConfig::new(0)).await.unwrap();
    let mut ws = connect(&server).await;

    let resp = call(&mut ws, 1, "node/create", json!({ "path": "/testpath", "data": [1] })).await;
    assert_eq!(resp["id"], 1);
    assert_eq!(resp["result"]["path"], "/testpath");

    let resp = call(&mut ws, 2, "node/getData", json!({ "path": "/testpath" })).await;
    assert_eq!(resp["result"]["data"], json!([1]));

    let resp = call(&mut ws, 3, "node/create", json!({ "path": "/testpath" })).await;
    assert_eq!(resp["error"]["code"], -32110);

    assert_eq!(server.store().len(), 2);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn malformed_messages_get_error_responses() {
    let mut server = EmbeddedServer::start(ServerConfig::new(0)).await.unwrap();
    let mut ws = connect(&server).await;

    ws.send(Message::Text("not json".into())).await.unwrap();
    let resp = next_json(&mut ws).await;
    assert_eq!(resp["error"]["code"], -32700);
    assert!(resp["id"].is_null());

    ws.send(Message::Text(json!({ "id": 4, "method": "server/ping" }).to_string().into()))
        .await
        .unwrap();
    let resp = next_json(&mut ws).await;
    assert_eq!(resp["error"]["code"], -32600);
    assert_eq!(resp["id"], 4);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn health_reports_clients_and_nodes() {
    let mut server = EmbeddedServer::start(ServerConfig::new(0)).await.unwrap();
    let mut ws = connect(&server).await;
    call(&mut ws, 1, "server/ping", json!({})).await;
    call(&mut ws, 2, "node/exists", json!({ "path": "/" })).await;

    let url = format!("http://{}/health", server.connect_string());
    let body: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["clients"], 1);
    assert_eq!(body["requests"], 2);
    assert_eq!(body["nodes"], 1);
    assert_eq!(server.connection_count(), 1);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn second_bind_on_a_taken_port_fails() {
    let mut first = EmbeddedServer::start(ServerConfig::new(0)).await.unwrap();

    let err = EmbeddedServer::start(ServerConfig::new(first.port())).await.unwrap_err();
    assert!(matches!(err, ServerError::Bind { .. }), "{err:?}");

    first.stop().await.unwrap();
}

#[tokio::test]
async fn invalid_hostname_is_rejected() {
    let config = ServerConfig {
        hostname: "not a host".into(),
        ..ServerConfig::default()
    };
    let err = EmbeddedServer::start(config).await.unwrap_err();
    assert!(matches!(err, ServerError::InvalidAddress(_)));
}

#[tokio::test]
async fn stop_closes_connections_and_frees_the_port() {
    let mut server = EmbeddedServer::start(ServerConfig::new(0)).await.unwrap();
    let addr = server.local_addr();
    let mut ws = connect(&server).await;

    server.stop().await.unwrap();

    // The open socket is told to close.
    let closed = timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok());

    assert!(tokio::net::TcpStream::connect(addr).await.is_err());

    let err = server.stop().await.unwrap_err();
    assert!(matches!(err, ServerError::AlreadyStopped));
}

#[tokio::test]
async fn max_connections_rejects_extra_clients() {
    let config = ServerConfig {
        max_connections: Some(1),
        ..ServerConfig::default()
    };
    let mut server = EmbeddedServer::start(config).await.unwrap();
    let _first = connect(&server).await;

    let url = format!("ws://{}/ws", server.connect_string());
    assert!(connect_async(&url).await.is_err());

    server.stop().await.unwrap();
}

#[test]
fn server_outlives_the_runtime_that_started_it() {
    let starter = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let server = starter
        .block_on(EmbeddedServer::start(ServerConfig::new(0)))
        .unwrap();
    drop(starter);

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    runtime.block_on(async move {
        let mut server = server;
        let mut ws = connect(&server).await;
        let resp = call(&mut ws, 1, "server/ping", json!({})).await;
        assert_eq!(resp["result"]["pong"], true);
        server.stop().await.unwrap();
    });
}
