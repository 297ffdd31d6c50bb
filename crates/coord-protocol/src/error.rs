//! Error types and standard JSON-RPC 2.0 error codes, plus node store errors.

use serde::{Deserialize, Serialize};

/// Standard JSON-RPC 2.0 error codes plus server and node store errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcErrorCode {
    // JSON-RPC 2.0 standard errors
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,

    // Server errors
    ServerError,
    ServerShuttingDown,

    // Node store errors
    NodeExists,
    NoNode,
    NotEmpty,
    BadVersion,
    InvalidPath,

    Custom(i32),
}

impl RpcErrorCode {
    pub fn code(&self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ServerError => -32000,
            Self::ServerShuttingDown => -32002,
            Self::NodeExists => -32110,
            Self::NoNode => -32111,
            Self::NotEmpty => -32112,
            Self::BadVersion => -32113,
            Self::InvalidPath => -32114,
            Self::Custom(c) => *c,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32603 => Self::InternalError,
            -32000 => Self::ServerError,
            -32002 => Self::ServerShuttingDown,
            -32110 => Self::NodeExists,
            -32111 => Self::NoNode,
            -32112 => Self::NotEmpty,
            -32113 => Self::BadVersion,
            -32114 => Self::InvalidPath,
            c => Self::Custom(c),
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("RPC error [{code}]: {message}")]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    pub fn new(code: RpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::ParseError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InvalidRequest, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(RpcErrorCode::MethodNotFound, format!("Method not found: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InvalidParams, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InternalError, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::ServerError, message)
    }

    pub fn shutting_down() -> Self {
        Self::new(RpcErrorCode::ServerShuttingDown, "Server is shutting down")
    }

    pub fn node_exists(path: &str) -> Self {
        Self::new(RpcErrorCode::NodeExists, format!("Node already exists: {path}"))
            .with_data(serde_json::json!({ "path": path }))
    }

    pub fn no_node(path: &str) -> Self {
        Self::new(RpcErrorCode::NoNode, format!("No such node: {path}"))
            .with_data(serde_json::json!({ "path": path }))
    }

    pub fn not_empty(path: &str) -> Self {
        Self::new(RpcErrorCode::NotEmpty, format!("Node has children: {path}"))
            .with_data(serde_json::json!({ "path": path }))
    }

    pub fn bad_version(path: &str, expected: i32, actual: i32) -> Self {
        Self::new(
            RpcErrorCode::BadVersion,
            format!("Version mismatch for {path}: expected {expected}, found {actual}"),
        )
        .with_data(serde_json::json!({ "path": path, "expected": expected, "actual": actual }))
    }

    pub fn invalid_path(path: &str, reason: &str) -> Self {
        Self::new(RpcErrorCode::InvalidPath, format!("Invalid path {path:?}: {reason}"))
    }

    pub fn error_code(&self) -> RpcErrorCode {
        RpcErrorCode::from_code(self.code)
    }
}
