//! CoordClient: a started session against one embedded server.
//!
//! Requests are written by a writer task and answered by a reader task that
//! matches responses to callers through a pending-request map keyed by id.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use coord_protocol::node::{ROOT_PATH, namespaced, validate_path};
use coord_protocol::{
    ChildrenResult, CreateParams, CreateResult, ExistsResult, GetDataResult, HandlerResult,
    Methods, NodeStat, PathParams, RequestId, RpcError, RpcErrorCode, RpcRequest, RpcResponse,
    SetDataParams, VersionedPathParams,
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{OnceCell, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::retry::RetryPolicy;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type PendingMap = DashMap<i64, oneshot::Sender<HandlerResult>>;
type Outgoing = (RpcRequest, oneshot::Sender<HandlerResult>);

/// Everything needed to open a session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `host:port` of the server
    pub connect_string: String,
    /// Every path is scoped under `/<namespace>`
    pub namespace: String,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(connect_string: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            connect_string: connect_string.into(),
            namespace: namespace.into(),
            retry: RetryPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Started,
    Closed,
}

pub struct CoordClient {
    namespace: String,
    connect_string: String,
    request_timeout: Duration,
    /// Dropped on close, which lets the writer task flush and close the socket
    request_tx: Mutex<Option<mpsc::Sender<Outgoing>>>,
    pending: Arc<PendingMap>,
    next_id: AtomicI64,
    namespace_ready: OnceCell<()>,
    writer: Mutex<Option<JoinHandle<()>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl CoordClient {
    /// Connect, retrying per `config.retry`, and return a started client.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        validate_namespace(&config.namespace)?;

        let url = format!("ws://{}/ws", config.connect_string);
        let ws = connect_with_retry(&url, &config.retry).await?;
        let (mut sink, mut stream) = ws.split();

        let (request_tx, mut request_rx) = mpsc::channel::<Outgoing>(64);
        let pending: Arc<PendingMap> = Arc::new(DashMap::new());

        // Writer task: serializes requests onto the socket
        let writer_pending = pending.clone();
        let writer = tokio::spawn(async move {
            while let Some((req, response_tx)) = request_rx.recv().await {
                let RequestId::Number(id) = req.id else {
                    continue;
                };
                let text = match serde_json::to_string(&req) {
                    Ok(text) => text,
                    Err(e) => {
                        let _ = response_tx.send(Err(RpcError::internal(format!("Failed to encode request: {e}"))));
                        continue;
                    }
                };
                writer_pending.insert(id, response_tx);
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    warn!("Coordination client lost its connection: {e}");
                    writer_pending.remove(&id);
                    break;
                }
            }
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        });

        // Reader task: routes responses to waiting callers
        let reader_pending = pending.clone();
        let reader = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => route_incoming(&text, &reader_pending),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!("Coordination client read error: {e}");
                        break;
                    }
                }
            }
            // Dropping the senders wakes every outstanding caller.
            reader_pending.clear();
        });

        debug!("Coordination client connected to {} (namespace: {})", config.connect_string, config.namespace);

        Ok(Self {
            namespace: config.namespace,
            connect_string: config.connect_string,
            request_timeout: config.request_timeout,
            request_tx: Mutex::new(Some(request_tx)),
            pending,
            next_id: AtomicI64::new(1),
            namespace_ready: OnceCell::new(),
            writer: Mutex::new(Some(writer)),
            reader: Mutex::new(Some(reader)),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn connect_string(&self) -> &str {
        &self.connect_string
    }

    pub fn state(&self) -> ClientState {
        if self.request_tx.lock().is_some() {
            ClientState::Started
        } else {
            ClientState::Closed
        }
    }

    /// Whether the underlying socket is still open.
    pub fn is_connected(&self) -> bool {
        self.reader
            .lock()
            .as_ref()
            .is_some_and(|reader| !reader.is_finished())
    }

    // ── Node operations ─────────────────────────────────────────────────

    /// Create a node; its parent must exist. Returns the namespace-relative path.
    pub async fn create(&self, path: &str, data: impl Into<Vec<u8>>) -> Result<String, ClientError> {
        self.create_node(path, data.into(), false).await
    }

    /// Create a node along with any missing ancestors.
    pub async fn create_with_parents(&self, path: &str, data: impl Into<Vec<u8>>) -> Result<String, ClientError> {
        self.create_node(path, data.into(), true).await
    }

    pub async fn get_data(&self, path: &str) -> Result<Vec<u8>, ClientError> {
        Ok(self.get_data_with_stat(path).await?.0)
    }

    pub async fn get_data_with_stat(&self, path: &str) -> Result<(Vec<u8>, NodeStat), ClientError> {
        let path = self.full_path(path)?;
        let result: GetDataResult = self.call(Methods::NODE_GET_DATA, PathParams { path }).await?;
        Ok((result.data, result.stat))
    }

    /// Replace a node's data; `version`, when given, must match.
    pub async fn set_data(
        &self,
        path: &str,
        data: impl Into<Vec<u8>>,
        version: Option<i32>,
    ) -> Result<NodeStat, ClientError> {
        let path = self.full_path(path)?;
        self.call(
            Methods::NODE_SET_DATA,
            SetDataParams {
                path,
                data: data.into(),
                version,
            },
        )
        .await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ClientError> {
        self.delete_versioned(path, None).await
    }

    pub async fn delete_versioned(&self, path: &str, version: Option<i32>) -> Result<(), ClientError> {
        let path = self.full_path(path)?;
        let _: Value = self.call(Methods::NODE_DELETE, VersionedPathParams { path, version }).await?;
        Ok(())
    }

    /// `None` when the node does not exist.
    pub async fn check_exists(&self, path: &str) -> Result<Option<NodeStat>, ClientError> {
        let path = self.full_path(path)?;
        let result: ExistsResult = self.call(Methods::NODE_EXISTS, PathParams { path }).await?;
        Ok(result.stat)
    }

    pub async fn get_children(&self, path: &str) -> Result<Vec<String>, ClientError> {
        let path = self.full_path(path)?;
        let result: ChildrenResult = self.call(Methods::NODE_CHILDREN, PathParams { path }).await?;
        Ok(result.children)
    }

    pub async fn ping(&self) -> Result<(), ClientError> {
        let _: Value = self.request(Methods::SERVER_PING, None).await?;
        Ok(())
    }

    /// Close the session. Outstanding requests fail with `Closed`. Idempotent.
    pub async fn close(&self) {
        let Some(request_tx) = self.request_tx.lock().take() else {
            return;
        };
        drop(request_tx);

        let writer = self.writer.lock().take();
        if let Some(writer) = writer {
            if tokio::time::timeout(Duration::from_secs(2), writer).await.is_err() {
                warn!("Coordination client writer did not finish closing");
            }
        }
        let reader = self.reader.lock().take();
        if let Some(reader) = reader {
            reader.abort();
        }
        self.pending.clear();
        debug!("Coordination client for namespace {} closed", self.namespace);
    }

    // ── Internal ──────────────────────────────────────────────────────────

    async fn create_node(&self, path: &str, data: Vec<u8>, create_parents: bool) -> Result<String, ClientError> {
        let full = self.full_path(path)?;
        self.ensure_namespace().await?;
        let result: CreateResult = self
            .call(
                Methods::NODE_CREATE,
                CreateParams {
                    path: full,
                    data,
                    create_parents,
                },
            )
            .await?;
        Ok(self.relative_path(&result.path))
    }

    /// Create `/<namespace>` once, before the first write.
    async fn ensure_namespace(&self) -> Result<(), ClientError> {
        self.namespace_ready
            .get_or_try_init(|| async {
                let params = CreateParams {
                    path: namespaced(&self.namespace, ROOT_PATH),
                    data: Vec::new(),
                    create_parents: false,
                };
                match self.call::<_, CreateResult>(Methods::NODE_CREATE, params).await {
                    Ok(_) => Ok(()),
                    Err(e) if e.rpc_code() == Some(RpcErrorCode::NodeExists) => Ok(()),
                    Err(e) => Err(e),
                }
            })
            .await
            .map(|_| ())
    }

    fn full_path(&self, path: &str) -> Result<String, ClientError> {
        validate_path(path)?;
        Ok(namespaced(&self.namespace, path))
    }

    fn relative_path(&self, full: &str) -> String {
        let prefix = namespaced(&self.namespace, ROOT_PATH);
        match full.strip_prefix(&prefix) {
            Some("") => ROOT_PATH.to_string(),
            Some(rest) => rest.to_string(),
            None => full.to_string(),
        }
    }

    async fn call<P: Serialize, R: DeserializeOwned>(&self, method: &str, params: P) -> Result<R, ClientError> {
        let params = serde_json::to_value(params)?;
        let value = self.request(method, Some(params)).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ClientError> {
        let request_tx = self.request_tx.lock().clone().ok_or(ClientError::Closed)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (response_tx, response_rx) = oneshot::channel();
        let req = RpcRequest::new(RequestId::Number(id), method, params);

        request_tx
            .send((req, response_tx))
            .await
            .map_err(|_| ClientError::Closed)?;

        match tokio::time::timeout(self.request_timeout, response_rx).await {
            Err(_) => {
                self.pending.remove(&id);
                Err(ClientError::Timeout(self.request_timeout))
            }
            Ok(Err(_)) => Err(ClientError::Closed),
            Ok(Ok(result)) => Ok(result?),
        }
    }
}

impl std::fmt::Debug for CoordClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordClient")
            .field("connect_string", &self.connect_string)
            .field("namespace", &self.namespace)
            .field("state", &self.state())
            .finish()
    }
}

fn validate_namespace(namespace: &str) -> Result<(), ClientError> {
    let reason = if namespace.is_empty() {
        "must not be empty"
    } else if namespace.contains('/') {
        "must not contain '/'"
    } else if namespace == "." || namespace == ".." {
        "must not be a relative segment"
    } else {
        return Ok(());
    };
    Err(ClientError::InvalidNamespace {
        namespace: namespace.to_string(),
        reason: reason.to_string(),
    })
}

async fn connect_with_retry(url: &str, retry: &RetryPolicy) -> Result<WsStream, ClientError> {
    let mut attempt = 0u32;
    loop {
        match connect_async(url).await {
            Ok((ws, _)) => return Ok(ws),
            Err(e) if attempt < retry.max_retries => {
                let delay = retry.delay_for(attempt);
                debug!("Connect to {url} failed (attempt {}): {e}; retrying in {delay:?}", attempt + 1);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(ClientError::Connect {
                    url: url.to_string(),
                    attempts: attempt + 1,
                    source: Box::new(e),
                });
            }
        }
    }
}

fn route_incoming(text: &str, pending: &PendingMap) {
    let parsed: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!("Unparseable message from server: {e}");
            return;
        }
    };

    if parsed.get("result").is_none() && parsed.get("error").is_none() {
        if let Some(method) = parsed.get("method").and_then(|m| m.as_str()) {
            debug!("Notification from server: {method}");
        }
        return;
    }

    let response: RpcResponse = match serde_json::from_value(parsed) {
        Ok(response) => response,
        Err(e) => {
            warn!("Malformed response from server: {e}");
            return;
        }
    };
    let Some(RequestId::Number(id)) = response.id().cloned() else {
        warn!("Response without a usable id: {response:?}");
        return;
    };
    if let Some((_, tx)) = pending.remove(&id) {
        let _ = tx.send(response.into_result());
    }
}
