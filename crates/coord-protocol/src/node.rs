//! Node parameter and result types, plus path rules shared by server and client.

use serde::{Deserialize, Serialize};

use crate::error::RpcError;

/// Metadata for a stored node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStat {
    /// Data version, bumped on every `setData`. Starts at 0.
    pub version: i32,
    /// Creation time, milliseconds since the epoch
    pub created_at: i64,
    /// Last modification time, milliseconds since the epoch
    pub modified_at: i64,
    pub num_children: usize,
    pub data_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateParams {
    pub path: String,
    #[serde(default)]
    pub data: Vec<u8>,
    /// Create missing ancestors (with empty data) instead of failing with `NoNode`.
    #[serde(default)]
    pub create_parents: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResult {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathParams {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedPathParams {
    pub path: String,
    /// Expected version; `None` matches any version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetDataParams {
    pub path: String,
    #[serde(default)]
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDataResult {
    pub data: Vec<u8>,
    pub stat: NodeStat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExistsResult {
    pub stat: Option<NodeStat>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildrenResult {
    pub children: Vec<String>,
}

pub const ROOT_PATH: &str = "/";

/// Check that `path` is absolute, has no trailing slash (except the root),
/// and has no empty, `.` or `..` segments.
pub fn validate_path(path: &str) -> Result<(), RpcError> {
    if !path.starts_with('/') {
        return Err(RpcError::invalid_path(path, "must start with '/'"));
    }
    if path == ROOT_PATH {
        return Ok(());
    }
    if path.ends_with('/') {
        return Err(RpcError::invalid_path(path, "must not end with '/'"));
    }
    for segment in path[1..].split('/') {
        match segment {
            "" => return Err(RpcError::invalid_path(path, "empty segment")),
            "." | ".." => return Err(RpcError::invalid_path(path, "relative segment")),
            s if s.contains('\0') => return Err(RpcError::invalid_path(path, "null character")),
            _ => {}
        }
    }
    Ok(())
}

/// Parent of a validated, non-root path.
pub fn parent_path(path: &str) -> Option<&str> {
    if path == ROOT_PATH {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT_PATH),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last segment of a validated path; empty for the root.
pub fn node_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

/// Version after one more write. Wraps past `i32::MAX` like ZooKeeper's.
pub fn next_version(version: i32) -> i32 {
    version.wrapping_add(1)
}

/// Prefix `path` with `/<namespace>`. The namespace root maps to `/<namespace>`.
pub fn namespaced(namespace: &str, path: &str) -> String {
    if path == ROOT_PATH {
        format!("/{namespace}")
    } else {
        format!("/{namespace}{path}")
    }
}
