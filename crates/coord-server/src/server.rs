//! WebSocket server using Axum, hosted on a dedicated thread and runtime.
//!
//! Handles HTTP upgrade to WebSocket, message routing to the request
//! handler, connection tracking, and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use coord_protocol::{
    HandlerResult, JSONRPC_VERSION, Notifications, RequestId, RpcError, RpcNotification, RpcResponse,
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::connection::ClientConnection;
use crate::error::ServerError;
use crate::service::NodeService;
use crate::store::NodeStore;

/// How long `stop` waits for the server thread to wind down.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Implemented by whatever answers JSON-RPC requests on the socket.
pub trait RequestHandler: Send + Sync + 'static {
    /// Handle a JSON-RPC request and return a response.
    fn handle_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> impl std::future::Future<Output = HandlerResult> + Send;

    /// Extra fields merged into the `/health` response.
    fn health(&self) -> Value {
        json!({})
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Maximum concurrent connections
    pub max_connections: Option<usize>,
    /// Log every connection at info instead of debug
    pub verbose_logging: bool,
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            hostname: "127.0.0.1".into(),
            max_connections: Some(64),
            verbose_logging: false,
        }
    }
}

/// Shared state for the axum handlers.
struct AppState<H: RequestHandler> {
    handler: Arc<H>,
    config: ServerConfig,
    clients: Arc<DashMap<String, ClientConnection>>,
    shutdown_rx: watch::Receiver<bool>,
}

/// A running embedded server.
///
/// Dropping it without calling [`stop`](Self::stop) still shuts the server
/// down (the shutdown channel closes), but nothing waits for it.
pub struct EmbeddedServer {
    local_addr: SocketAddr,
    store: Arc<NodeStore>,
    clients: Arc<DashMap<String, ClientConnection>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    thread: Option<JoinHandle<()>>,
}

impl EmbeddedServer {
    /// Bind and start serving. Returns once the listener is bound, so
    /// `local_addr` always carries the concrete port.
    pub async fn start(config: ServerConfig) -> Result<Self, ServerError> {
        let raw = format!("{}:{}", config.hostname, config.port);
        let addr: SocketAddr = raw.parse().map_err(|_| ServerError::InvalidAddress(raw))?;

        let store = Arc::new(NodeStore::new());
        let handler = Arc::new(NodeService::new(store.clone()));
        let clients = Arc::new(DashMap::new());

        let (ready_tx, ready_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let state = Arc::new(AppState {
            handler,
            config: config.clone(),
            clients: clients.clone(),
            shutdown_rx,
        });

        let thread = std::thread::Builder::new()
            .name(format!("coord-server-{}", config.port))
            .spawn(move || run_server_thread(addr, state, ready_tx))
            .map_err(ServerError::Runtime)?;

        let local_addr = match ready_rx.await {
            Ok(bound) => bound?,
            Err(_) => {
                return Err(ServerError::TaskFailed(
                    "server thread exited before binding".into(),
                ));
            }
        };

        Ok(Self {
            local_addr,
            store,
            clients,
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The actual bound port.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// `host:port` form accepted by the client.
    pub fn connect_string(&self) -> String {
        self.local_addr.to_string()
    }

    pub fn store(&self) -> &Arc<NodeStore> {
        &self.store
    }

    pub fn connection_count(&self) -> usize {
        self.clients.len()
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }

    /// Gracefully stop the server and wait for its thread, bounded by
    /// [`SHUTDOWN_TIMEOUT`]. Open WebSocket connections are closed.
    pub async fn stop(&mut self) -> Result<(), ServerError> {
        let shutdown_tx = self.shutdown_tx.take().ok_or(ServerError::AlreadyStopped)?;
        let _ = shutdown_tx.send(true);

        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        let joined = tokio::time::timeout(
            SHUTDOWN_TIMEOUT,
            tokio::task::spawn_blocking(move || thread.join()),
        )
        .await;

        match joined {
            Err(_) => Err(ServerError::ShutdownTimeout(SHUTDOWN_TIMEOUT)),
            Ok(Err(e)) => Err(ServerError::TaskFailed(e.to_string())),
            Ok(Ok(Err(_))) => Err(ServerError::TaskFailed("server thread panicked".into())),
            Ok(Ok(Ok(()))) => {
                info!("Coordination server on {} stopped", self.local_addr);
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for EmbeddedServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedServer")
            .field("local_addr", &self.local_addr)
            .field("running", &self.is_running())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server thread
// ─────────────────────────────────────────────────────────────────────────────

fn run_server_thread<H: RequestHandler>(
    addr: SocketAddr,
    state: Arc<AppState<H>>,
    ready_tx: oneshot::Sender<Result<SocketAddr, ServerError>>,
) {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("coord-server-worker")
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready_tx.send(Err(ServerError::Runtime(e)));
            return;
        }
    };

    runtime.block_on(serve(addr, state, ready_tx));
    // Cancels connection tasks that are still winding down.
    runtime.shutdown_timeout(Duration::from_secs(1));
}

async fn serve<H: RequestHandler>(
    addr: SocketAddr,
    state: Arc<AppState<H>>,
    ready_tx: oneshot::Sender<Result<SocketAddr, ServerError>>,
) {
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(source) => {
            let _ = ready_tx.send(Err(ServerError::Bind { addr, source }));
            return;
        }
    };
    let local_addr = match listener.local_addr() {
        Ok(local_addr) => local_addr,
        Err(e) => {
            let _ = ready_tx.send(Err(ServerError::Io(e)));
            return;
        }
    };

    let shutdown_rx = state.shutdown_rx.clone();
    let app = Router::new()
        .route("/ws", get(ws_upgrade_handler::<H>))
        .route("/health", get(health_handler::<H>))
        .with_state(state);

    if ready_tx.send(Ok(local_addr)).is_err() {
        debug!("Start of {local_addr} was abandoned before it completed");
        return;
    }
    info!("Coordination server listening on ws://{local_addr}/ws");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_requested(shutdown_rx))
        .await
    {
        error!("Coordination server on {local_addr} failed: {e}");
    }
}

/// Resolves once `true` is published or the sender is dropped.
async fn shutdown_requested(mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        let stop = *shutdown_rx.borrow_and_update();
        if stop || shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn ws_upgrade_handler<H: RequestHandler>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState<H>>>,
) -> impl IntoResponse {
    if let Some(max) = state.config.max_connections {
        let current = state.clients.len();
        if current >= max {
            warn!("Connection rejected: max connections reached ({max})");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    }

    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
        .into_response()
}

async fn health_handler<H: RequestHandler>(
    State(state): State<Arc<AppState<H>>>,
) -> impl IntoResponse {
    let requests: u64 = state.clients.iter().map(|conn| conn.requests_handled).sum();
    let mut body = json!({
        "status": "ok",
        "clients": state.clients.len(),
        "requests": requests,
    });
    if let (Some(body), Value::Object(extra)) = (body.as_object_mut(), state.handler.health()) {
        body.extend(extra);
    }
    Json(body)
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Connection Handler
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_ws_connection<H: RequestHandler>(socket: WebSocket, state: Arc<AppState<H>>) {
    let client_id = uuid::Uuid::new_v4().to_string();
    state
        .clients
        .insert(client_id.clone(), ClientConnection::new());
    if state.config.verbose_logging {
        info!("Client connected: {client_id}");
    } else {
        debug!("Client connected: {client_id}");
    }

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut shutdown_rx = state.shutdown_rx.clone();

    if send_welcome(&mut ws_tx, &client_id).await {
        loop {
            tokio::select! {
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(mut conn) = state.clients.get_mut(&client_id) {
                                conn.record_request();
                            }
                            let response = handle_message(&text, &state.handler).await;
                            if let Err(e) = ws_tx.send(Message::Text(response.into())).await {
                                warn!("Failed to send response to {client_id}: {e}");
                                break;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = ws_tx.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("Client disconnected: {client_id}");
                            break;
                        }
                        Some(Err(e)) => {
                            warn!("WebSocket error for {client_id}: {e}");
                            break;
                        }
                        _ => {}
                    }
                }

                // Any change means shutdown; an Err means the server handle is gone.
                _ = shutdown_rx.changed() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }

    state.clients.remove(&client_id);
    debug!("Client {client_id} removed (total: {})", state.clients.len());
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

async fn send_welcome(ws_tx: &mut SplitSink<WebSocket, Message>, client_id: &str) -> bool {
    let welcome = RpcNotification::new(
        Notifications::SERVER_CONNECTED,
        Some(json!({
            "clientId": client_id,
            "serverVersion": SERVER_VERSION,
        })),
    );
    let text = match serde_json::to_string(&welcome) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to encode welcome: {e}");
            return false;
        }
    };
    match ws_tx.send(Message::Text(text.into())).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to send welcome to {client_id}: {e}");
            false
        }
    }
}

async fn handle_message<H: RequestHandler>(text: &str, handler: &Arc<H>) -> String {
    let response = match serde_json::from_str::<Value>(text) {
        Ok(parsed) => dispatch(parsed, handler).await,
        Err(_) => RpcResponse::error(None, RpcError::parse_error("Failed to parse JSON")),
    };
    encode_response(&response)
}

async fn dispatch<H: RequestHandler>(parsed: Value, handler: &Arc<H>) -> RpcResponse {
    let jsonrpc = parsed.get("jsonrpc").and_then(|v| v.as_str());
    let id: Option<RequestId> = parsed
        .get("id")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok());

    let method = match parsed.get("method").and_then(|v| v.as_str()) {
        Some(method) if jsonrpc == Some(JSONRPC_VERSION) => method,
        _ => {
            return RpcResponse::error(id, RpcError::invalid_request("Invalid JSON-RPC 2.0 request"));
        }
    };
    let params = parsed.get("params").cloned();

    match handler.handle_request(method, params).await {
        Ok(result) => RpcResponse::success(id.unwrap_or(RequestId::Number(0)), result),
        Err(err) => RpcResponse::error(id, err),
    }
}

fn encode_response(response: &RpcResponse) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        error!("Failed to encode response: {e}");
        r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Failed to encode response"}}"#
            .to_string()
    })
}
