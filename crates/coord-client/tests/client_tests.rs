//! Client tests: retry policy and namespaced operations against a live server.

use std::time::Duration;

use coord_client::{ClientConfig, ClientError, ClientState, CoordClient, RetryPolicy};
use coord_protocol::RpcErrorCode;
use coord_server::{EmbeddedServer, ServerConfig};

async fn start_server() -> EmbeddedServer {
    EmbeddedServer::start(ServerConfig::new(0)).await.unwrap()
}

async fn connect(server: &EmbeddedServer, namespace: &str) -> CoordClient {
    let config = ClientConfig::new(server.connect_string(), namespace).with_retry(RetryPolicy::never());
    CoordClient::connect(config).await.unwrap()
}

/// A port nothing is listening on.
fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

// ─────────────────────────────────────────────────────────────────────────────
// Retry policy
// ─────────────────────────────────────────────────────────────────────────────

mod retry {
    use super::*;

    #[test]
    fn default_is_one_second_three_retries() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.initial_delay, Duration::from_millis(1000));
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.max_attempts(), 4);
    }

    #[test]
    fn never_makes_a_single_attempt() {
        let policy = RetryPolicy::never();
        assert_eq!(policy.max_retries, 0);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn delay_stays_inside_the_backoff_window() {
        let policy = RetryPolicy::new(Duration::from_millis(10), 5);
        for retry in 0..5u32 {
            let upper = Duration::from_millis(10) * (1u32 << (retry + 1));
            for _ in 0..50 {
                let delay = policy.delay_for(retry);
                assert!(delay >= Duration::from_millis(10), "retry {retry}: {delay:?}");
                assert!(delay < upper, "retry {retry}: {delay:?}");
            }
        }
    }

    #[test]
    fn large_retry_counts_do_not_overflow() {
        let policy = RetryPolicy::new(Duration::from_secs(1), u32::MAX);
        let delay = policy.delay_for(u32::MAX);
        assert!(delay >= Duration::from_secs(1));
        assert_eq!(policy.max_attempts(), u32::MAX);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connecting
// ─────────────────────────────────────────────────────────────────────────────

mod connecting {
    use super::*;

    #[tokio::test]
    async fn connects_and_pings() {
        let mut server = start_server().await;
        let client = connect(&server, "ping").await;

        assert_eq!(client.state(), ClientState::Started);
        assert_eq!(client.namespace(), "ping");
        assert_eq!(client.connect_string(), server.connect_string());
        client.ping().await.unwrap();

        client.close().await;
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn gives_up_after_retries_are_exhausted() {
        let port = closed_port();
        let config = ClientConfig::new(format!("127.0.0.1:{port}"), "nobody")
            .with_retry(RetryPolicy::new(Duration::from_millis(5), 2));

        let err = CoordClient::connect(config).await.unwrap_err();
        match err {
            ClientError::Connect { attempts, url, .. } => {
                assert_eq!(attempts, 3);
                assert!(url.contains(&port.to_string()));
            }
            other => panic!("expected Connect error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejects_invalid_namespaces_before_connecting() {
        let port = closed_port();
        for namespace in ["", "a/b", "/lead", ".."] {
            let config = ClientConfig::new(format!("127.0.0.1:{port}"), namespace);
            let err = CoordClient::connect(config).await.unwrap_err();
            assert!(
                matches!(err, ClientError::InvalidNamespace { .. }),
                "{namespace:?} gave {err:?}"
            );
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Node operations
// ─────────────────────────────────────────────────────────────────────────────

mod operations {
    use super::*;

    #[tokio::test]
    async fn create_then_read_back() {
        let mut server = start_server().await;
        let client = connect(&server, "ops").await;

        let path = client.create("/testpath", vec![1u8]).await.unwrap();
        assert_eq!(path, "/testpath");
        assert_eq!(client.get_data("/testpath").await.unwrap(), vec![1u8]);

        // Stored under the namespace on the server side.
        let (data, _) = server.store().get_data("/ops/testpath").unwrap();
        assert_eq!(data, vec![1u8]);

        client.close().await;
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_create_reports_node_exists() {
        let mut server = start_server().await;
        let client = connect(&server, "dup").await;

        client.create("/once", Vec::new()).await.unwrap();
        let err = client.create("/once", Vec::new()).await.unwrap_err();
        assert_eq!(err.rpc_code(), Some(RpcErrorCode::NodeExists));

        client.close().await;
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn missing_parent_fails_unless_requested() {
        let mut server = start_server().await;
        let client = connect(&server, "tree").await;

        let err = client.create("/a/b", Vec::new()).await.unwrap_err();
        assert_eq!(err.rpc_code(), Some(RpcErrorCode::NoNode));

        client.create_with_parents("/a/b/c", b"leaf".to_vec()).await.unwrap();
        let mut children = client.get_children("/a").await.unwrap();
        children.sort();
        assert_eq!(children, vec!["b".to_string()]);
        assert_eq!(client.get_children("/").await.unwrap(), vec!["a".to_string()]);

        client.close().await;
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn versioned_updates_and_deletes() {
        let mut server = start_server().await;
        let client = connect(&server, "ver").await;

        client.create("/v", b"one".to_vec()).await.unwrap();
        let stat = client.set_data("/v", b"two".to_vec(), Some(0)).await.unwrap();
        assert_eq!(stat.version, 1);

        let err = client.set_data("/v", b"three".to_vec(), Some(0)).await.unwrap_err();
        assert_eq!(err.rpc_code(), Some(RpcErrorCode::BadVersion));

        let (data, stat) = client.get_data_with_stat("/v").await.unwrap();
        assert_eq!(data, b"two".to_vec());
        assert_eq!(stat.data_length, 3);

        let err = client.delete_versioned("/v", Some(7)).await.unwrap_err();
        assert_eq!(err.rpc_code(), Some(RpcErrorCode::BadVersion));
        client.delete_versioned("/v", Some(1)).await.unwrap();
        assert!(client.check_exists("/v").await.unwrap().is_none());

        client.close().await;
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn invalid_paths_are_rejected_locally() {
        let mut server = start_server().await;
        let client = connect(&server, "paths").await;

        let err = client.create("relative", Vec::new()).await.unwrap_err();
        assert_eq!(err.rpc_code(), Some(RpcErrorCode::InvalidPath));
        let err = client.get_data("/trailing/").await.unwrap_err();
        assert_eq!(err.rpc_code(), Some(RpcErrorCode::InvalidPath));

        client.close().await;
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn namespaces_are_isolated_on_a_shared_server() {
        let mut server = start_server().await;
        let first = connect(&server, "first").await;
        let second = connect(&server, "second").await;

        first.create("/testpath", vec![1u8]).await.unwrap();
        second.create("/testpath", vec![2u8]).await.unwrap();

        assert_eq!(first.get_data("/testpath").await.unwrap(), vec![1u8]);
        assert_eq!(second.get_data("/testpath").await.unwrap(), vec![2u8]);

        first.delete("/testpath").await.unwrap();
        assert!(first.check_exists("/testpath").await.unwrap().is_none());
        assert!(second.check_exists("/testpath").await.unwrap().is_some());

        first.close().await;
        second.close().await;
        server.stop().await.unwrap();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Closing
// ─────────────────────────────────────────────────────────────────────────────

mod closing {
    use super::*;

    #[tokio::test]
    async fn operations_after_close_fail() {
        let mut server = start_server().await;
        let client = connect(&server, "closed").await;

        client.close().await;
        assert_eq!(client.state(), ClientState::Closed);
        assert!(matches!(client.ping().await, Err(ClientError::Closed)));

        // Idempotent.
        client.close().await;
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn server_shutdown_fails_outstanding_calls() {
        let mut server = start_server().await;
        let config = ClientConfig::new(server.connect_string(), "gone")
            .with_retry(RetryPolicy::never())
            .with_request_timeout(Duration::from_millis(500));
        let client = CoordClient::connect(config).await.unwrap();
        client.ping().await.unwrap();

        server.stop().await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), client.ping()).await.unwrap();
        assert!(result.is_err());

        client.close().await;
    }
}
