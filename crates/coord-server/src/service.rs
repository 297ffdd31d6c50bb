//! NodeService: dispatches JSON-RPC methods onto the node store.

use std::sync::Arc;

use coord_protocol::{
    ChildrenResult, CreateParams, CreateResult, ExistsResult, GetDataResult, HandlerResult,
    Methods, PathParams, RpcError, SetDataParams, VersionedPathParams,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use crate::server::RequestHandler;
use crate::store::NodeStore;

pub struct NodeService {
    store: Arc<NodeStore>,
}

impl NodeService {
    pub fn new(store: Arc<NodeStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<NodeStore> {
        &self.store
    }
}

impl RequestHandler for NodeService {
    async fn handle_request(&self, method: &str, params: Option<Value>) -> HandlerResult {
        debug!("Handling {method}");
        match method {
            Methods::NODE_CREATE => {
                let p: CreateParams = parse_params(params)?;
                let path = self.store.create(&p.path, p.data, p.create_parents)?;
                to_result(CreateResult { path })
            }
            Methods::NODE_GET_DATA => {
                let p: PathParams = parse_params(params)?;
                let (data, stat) = self.store.get_data(&p.path)?;
                to_result(GetDataResult { data, stat })
            }
            Methods::NODE_SET_DATA => {
                let p: SetDataParams = parse_params(params)?;
                let stat = self.store.set_data(&p.path, p.data, p.version)?;
                to_result(stat)
            }
            Methods::NODE_DELETE => {
                let p: VersionedPathParams = parse_params(params)?;
                self.store.delete(&p.path, p.version)?;
                Ok(json!({ "deleted": true }))
            }
            Methods::NODE_EXISTS => {
                let p: PathParams = parse_params(params)?;
                let stat = self.store.exists(&p.path)?;
                to_result(ExistsResult { stat })
            }
            Methods::NODE_CHILDREN => {
                let p: PathParams = parse_params(params)?;
                let children = self.store.children(&p.path)?;
                to_result(ChildrenResult { children })
            }
            Methods::SERVER_PING => Ok(json!({ "pong": true })),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn health(&self) -> Value {
        json!({ "nodes": self.store.len() })
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcError> {
    let params = params.ok_or_else(|| RpcError::invalid_params("Missing params"))?;
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(format!("Invalid params: {e}")))
}

fn to_result<T: Serialize>(value: T) -> HandlerResult {
    serde_json::to_value(value).map_err(|e| RpcError::internal(format!("Failed to encode result: {e}")))
}
