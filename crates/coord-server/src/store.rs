//! NodeStore: the in-memory node tree behind the embedded server.

use std::collections::BTreeMap;

use coord_protocol::RpcError;
use coord_protocol::node::{NodeStat, ROOT_PATH, next_version, node_name, parent_path, validate_path};
use parking_lot::RwLock;

struct Node {
    data: Vec<u8>,
    version: i32,
    created_at: i64,
    modified_at: i64,
}

impl Node {
    fn new(data: Vec<u8>) -> Self {
        let now = now_millis();
        Self {
            data,
            version: 0,
            created_at: now,
            modified_at: now,
        }
    }
}

/// Hierarchical node store keyed by absolute path.
///
/// The root `/` always exists. Nodes are kept in a `BTreeMap` so the direct
/// children of a path form one contiguous key range.
pub struct NodeStore {
    nodes: RwLock<BTreeMap<String, Node>>,
}

impl NodeStore {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(ROOT_PATH.to_string(), Node::new(Vec::new()));
        Self {
            nodes: RwLock::new(nodes),
        }
    }

    /// Create a node. Missing ancestors fail with `NoNode` unless
    /// `create_parents` is set, in which case they are created empty.
    pub fn create(&self, path: &str, data: Vec<u8>, create_parents: bool) -> Result<String, RpcError> {
        validate_path(path)?;
        let mut nodes = self.nodes.write();

        if nodes.contains_key(path) {
            return Err(RpcError::node_exists(path));
        }

        let mut missing = Vec::new();
        let mut cursor = parent_path(path);
        while let Some(parent) = cursor {
            if nodes.contains_key(parent) {
                break;
            }
            if !create_parents {
                return Err(RpcError::no_node(parent));
            }
            missing.push(parent.to_string());
            cursor = parent_path(parent);
        }

        for ancestor in missing.into_iter().rev() {
            nodes.insert(ancestor, Node::new(Vec::new()));
        }
        nodes.insert(path.to_string(), Node::new(data));
        Ok(path.to_string())
    }

    pub fn get_data(&self, path: &str) -> Result<(Vec<u8>, NodeStat), RpcError> {
        validate_path(path)?;
        let nodes = self.nodes.read();
        let node = nodes.get(path).ok_or_else(|| RpcError::no_node(path))?;
        Ok((node.data.clone(), stat_of(&nodes, path, node)))
    }

    /// Replace a node's data. `version`, when given, must match the current one.
    pub fn set_data(&self, path: &str, data: Vec<u8>, version: Option<i32>) -> Result<NodeStat, RpcError> {
        validate_path(path)?;
        let mut nodes = self.nodes.write();
        let node = nodes.get_mut(path).ok_or_else(|| RpcError::no_node(path))?;
        check_version(path, node, version)?;

        node.data = data;
        node.version = next_version(node.version);
        node.modified_at = now_millis();

        let nodes = &*nodes;
        let node = &nodes[path];
        Ok(stat_of(nodes, path, node))
    }

    /// Delete a leaf node. The root cannot be deleted.
    pub fn delete(&self, path: &str, version: Option<i32>) -> Result<(), RpcError> {
        validate_path(path)?;
        if path == ROOT_PATH {
            return Err(RpcError::invalid_path(path, "the root node cannot be deleted"));
        }

        let mut nodes = self.nodes.write();
        let node = nodes.get(path).ok_or_else(|| RpcError::no_node(path))?;
        check_version(path, node, version)?;
        if !children_of(&nodes, path).is_empty() {
            return Err(RpcError::not_empty(path));
        }

        nodes.remove(path);
        Ok(())
    }

    pub fn exists(&self, path: &str) -> Result<Option<NodeStat>, RpcError> {
        validate_path(path)?;
        let nodes = self.nodes.read();
        Ok(nodes.get(path).map(|node| stat_of(&nodes, path, node)))
    }

    /// Names (not paths) of the direct children, sorted.
    pub fn children(&self, path: &str) -> Result<Vec<String>, RpcError> {
        validate_path(path)?;
        let nodes = self.nodes.read();
        if !nodes.contains_key(path) {
            return Err(RpcError::no_node(path));
        }
        Ok(children_of(&nodes, path)
            .into_iter()
            .map(|child| node_name(child).to_string())
            .collect())
    }

    /// Number of nodes, including the root.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// True when only the root exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 1
    }
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new()
    }
}

fn children_of<'a>(nodes: &'a BTreeMap<String, Node>, path: &str) -> Vec<&'a str> {
    let prefix = if path == ROOT_PATH {
        ROOT_PATH.to_string()
    } else {
        format!("{path}/")
    };
    nodes
        .range(prefix.clone()..)
        .map(|(key, _)| key.as_str())
        .take_while(|key| key.starts_with(&prefix))
        .filter(|key| {
            let rest = &key[prefix.len()..];
            !rest.is_empty() && !rest.contains('/')
        })
        .collect()
}

fn stat_of(nodes: &BTreeMap<String, Node>, path: &str, node: &Node) -> NodeStat {
    NodeStat {
        version: node.version,
        created_at: node.created_at,
        modified_at: node.modified_at,
        num_children: children_of(nodes, path).len(),
        data_length: node.data.len(),
    }
}

fn check_version(path: &str, node: &Node, expected: Option<i32>) -> Result<(), RpcError> {
    match expected {
        Some(expected) if expected != node.version => {
            Err(RpcError::bad_version(path, expected, node.version))
        }
        _ => Ok(()),
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
