//! Coordination protocol types
//!
//! JSON-RPC 2.0 compatible types spoken between the embedded coordination
//! server and its test clients. This crate is the single source of truth for
//! method names, error codes, node parameter/result shapes, and path rules.

pub mod error;
pub mod jsonrpc;
pub mod methods;
pub mod node;

pub use error::{RpcError, RpcErrorCode};
pub use jsonrpc::{HandlerResult, JSONRPC_VERSION, Outcome, RequestId, RpcNotification, RpcRequest, RpcResponse};
pub use methods::{MethodName, Methods, Notifications};
pub use node::{
    ChildrenResult, CreateParams, CreateResult, ExistsResult, GetDataResult, NodeStat,
    PathParams, SetDataParams, VersionedPathParams,
};
