//! Node store and service tests: tree semantics and JSON-RPC dispatch.

use std::sync::Arc;

use coord_protocol::RpcErrorCode;
use coord_server::{NodeService, NodeStore, RequestHandler};
use serde_json::json;

// ─────────────────────────────────────────────────────────────────────────────
// NodeStore
// ─────────────────────────────────────────────────────────────────────────────

mod store {
    use super::*;

    #[test]
    fn new_store_has_only_the_root() {
        let store = NodeStore::new();
        assert_eq!(store.len(), 1);
        assert!(store.is_empty());
        assert!(store.exists("/").unwrap().is_some());
        assert!(store.children("/").unwrap().is_empty());
    }

    #[test]
    fn create_get_delete() {
        let store = NodeStore::new();
        store.create("/testpath", vec![1], false).unwrap();

        let (data, stat) = store.get_data("/testpath").unwrap();
        assert_eq!(data, vec![1]);
        assert_eq!(stat.version, 0);
        assert_eq!(stat.data_length, 1);

        store.delete("/testpath", None).unwrap();
        assert!(store.exists("/testpath").unwrap().is_none());
    }

    #[test]
    fn create_twice_fails_with_node_exists() {
        let store = NodeStore::new();
        store.create("/a", vec![], false).unwrap();
        let err = store.create("/a", vec![], false).unwrap_err();
        assert_eq!(err.error_code(), RpcErrorCode::NodeExists);

        let err = store.create("/", vec![], false).unwrap_err();
        assert_eq!(err.error_code(), RpcErrorCode::NodeExists);
    }

    #[test]
    fn create_without_parent_fails_unless_requested() {
        let store = NodeStore::new();
        let err = store.create("/a/b/c", vec![], false).unwrap_err();
        assert_eq!(err.error_code(), RpcErrorCode::NoNode);
        assert_eq!(store.len(), 1);

        store.create("/a/b/c", vec![7], true).unwrap();
        assert!(store.exists("/a").unwrap().is_some());
        assert!(store.exists("/a/b").unwrap().is_some());
        assert_eq!(store.get_data("/a/b").unwrap().0, Vec::<u8>::new());
        assert_eq!(store.get_data("/a/b/c").unwrap().0, vec![7]);
    }

    #[test]
    fn children_are_direct_and_sorted() {
        let store = NodeStore::new();
        store.create("/a", vec![], false).unwrap();
        store.create("/a/z", vec![], false).unwrap();
        store.create("/a/b", vec![], false).unwrap();
        store.create("/a/b/deep", vec![], false).unwrap();
        store.create("/a-sibling", vec![], false).unwrap();
        store.create("/a0", vec![], false).unwrap();

        assert_eq!(store.children("/a").unwrap(), vec!["b", "z"]);
        assert_eq!(store.children("/").unwrap(), vec!["a", "a-sibling", "a0"]);
        assert_eq!(store.exists("/a").unwrap().unwrap().num_children, 2);

        let err = store.children("/missing").unwrap_err();
        assert_eq!(err.error_code(), RpcErrorCode::NoNode);
    }

    #[test]
    fn delete_rejects_non_empty_and_root() {
        let store = NodeStore::new();
        store.create("/a/b", vec![], true).unwrap();

        let err = store.delete("/a", None).unwrap_err();
        assert_eq!(err.error_code(), RpcErrorCode::NotEmpty);

        let err = store.delete("/", None).unwrap_err();
        assert_eq!(err.error_code(), RpcErrorCode::InvalidPath);

        let err = store.delete("/missing", None).unwrap_err();
        assert_eq!(err.error_code(), RpcErrorCode::NoNode);
    }

    #[test]
    fn set_data_bumps_version_and_checks_expected_version() {
        let store = NodeStore::new();
        store.create("/v", vec![1], false).unwrap();

        let stat = store.set_data("/v", vec![2, 3], Some(0)).unwrap();
        assert_eq!(stat.version, 1);
        assert_eq!(stat.data_length, 2);

        let err = store.set_data("/v", vec![4], Some(0)).unwrap_err();
        assert_eq!(err.error_code(), RpcErrorCode::BadVersion);

        let stat = store.set_data("/v", vec![4], None).unwrap();
        assert_eq!(stat.version, 2);

        let err = store.delete("/v", Some(1)).unwrap_err();
        assert_eq!(err.error_code(), RpcErrorCode::BadVersion);
        store.delete("/v", Some(2)).unwrap();
    }

    #[test]
    fn invalid_paths_are_rejected_everywhere() {
        let store = NodeStore::new();
        assert_eq!(store.create("a", vec![], false).unwrap_err().error_code(), RpcErrorCode::InvalidPath);
        assert_eq!(store.get_data("/a/").unwrap_err().error_code(), RpcErrorCode::InvalidPath);
        assert_eq!(store.exists("//").unwrap_err().error_code(), RpcErrorCode::InvalidPath);
        assert_eq!(store.delete("/../a", None).unwrap_err().error_code(), RpcErrorCode::InvalidPath);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// NodeService
// ─────────────────────────────────────────────────────────────────────────────

mod service {
    use super::*;

    fn svc() -> NodeService {
        NodeService::new(Arc::new(NodeStore::new()))
    }

    #[tokio::test]
    async fn create_and_get_data() {
        let s = svc();
        let created = s
            .handle_request("node/create", Some(json!({ "path": "/ns/a", "data": [1, 2], "createParents": true })))
            .await
            .unwrap();
        assert_eq!(created["path"], "/ns/a");

        let got = s.handle_request("node/getData", Some(json!({ "path": "/ns/a" }))).await.unwrap();
        assert_eq!(got["data"], json!([1, 2]));
        assert_eq!(got["stat"]["version"], 0);
    }

    #[tokio::test]
    async fn exists_returns_null_stat_for_missing_nodes() {
        let s = svc();
        let result = s.handle_request("node/exists", Some(json!({ "path": "/nope" }))).await.unwrap();
        assert!(result["stat"].is_null());
    }

    #[tokio::test]
    async fn set_data_delete_and_children() {
        let s = svc();
        s.handle_request("node/create", Some(json!({ "path": "/p" }))).await.unwrap();
        s.handle_request("node/create", Some(json!({ "path": "/p/c" }))).await.unwrap();

        let stat = s
            .handle_request("node/setData", Some(json!({ "path": "/p", "data": [9], "version": 0 })))
            .await
            .unwrap();
        assert_eq!(stat["version"], 1);

        let children = s.handle_request("node/children", Some(json!({ "path": "/p" }))).await.unwrap();
        assert_eq!(children["children"], json!(["c"]));

        let deleted = s.handle_request("node/delete", Some(json!({ "path": "/p/c" }))).await.unwrap();
        assert_eq!(deleted["deleted"], true);
    }

    #[tokio::test]
    async fn missing_or_malformed_params() {
        let s = svc();
        let err = s.handle_request("node/getData", None).await.unwrap_err();
        assert_eq!(err.error_code(), RpcErrorCode::InvalidParams);

        let err = s.handle_request("node/getData", Some(json!({ "pth": "/x" }))).await.unwrap_err();
        assert_eq!(err.error_code(), RpcErrorCode::InvalidParams);
    }

    #[tokio::test]
    async fn unknown_method_and_ping() {
        let s = svc();
        let err = s.handle_request("node/rename", None).await.unwrap_err();
        assert_eq!(err.error_code(), RpcErrorCode::MethodNotFound);

        let pong = s.handle_request("server/ping", None).await.unwrap();
        assert_eq!(pong["pong"], true);
    }

    #[tokio::test]
    async fn health_reports_node_count() {
        let s = svc();
        s.handle_request("node/create", Some(json!({ "path": "/x" }))).await.unwrap();
        assert_eq!(s.health()["nodes"], 2);
    }
}
