//! Integration tests for the WebSocket transport.
//!
//! These spin up a real server and client on the loopback interface to
//! verify that bytes actually flow both ways, that our own
//! `WebSocketConnection::connect` interoperates with our server side,
//! and that the accept gate can reject peers before the handshake.

#[cfg(feature = "websocket")]
mod websocket {
    use std::sync::Arc;

    use crosswire_transport::{
        Connection, SendMode, Transport, WebSocketConnection,
        WebSocketTransport,
    };

    /// Binds a transport on an OS-assigned port and returns it with the
    /// `ws://` URL a client can dial.
    async fn bind_transport() -> (WebSocketTransport, String) {
        let transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("should have local addr");
        (transport, format!("ws://{addr}"))
    }

    #[tokio::test]
    async fn test_websocket_accept_and_send_receive() {
        let (mut transport, url) = bind_transport().await;

        // Accept in a background task so we can connect concurrently.
        let server_handle = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });

        let client_conn = WebSocketConnection::connect(&url)
            .await
            .expect("client should connect");
        let server_conn = server_handle.await.expect("task should complete");

        // The adapter mints a non-empty identifier at accept time.
        assert!(!server_conn.identifier().as_str().is_empty());

        // --- Server sends, client receives ---
        server_conn
            .send(b"hello from server", SendMode::Reliable)
            .await
            .expect("send should succeed");
        let received = client_conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, b"hello from server");

        // --- Client sends, server receives ---
        // Unreliable degrades to reliable on WebSocket; the bytes must
        // still arrive.
        client_conn
            .send(b"hello from client", SendMode::Unreliable)
            .await
            .expect("send should succeed");
        let received = server_conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, b"hello from client");

        server_conn.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_peer_close() {
        let (mut transport, url) = bind_transport().await;

        let server_handle = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });

        let client_conn = WebSocketConnection::connect(&url)
            .await
            .expect("client should connect");
        let server_conn = server_handle.await.unwrap();

        client_conn.close().await.expect("close should succeed");

        // Server should see None (clean close).
        let result = server_conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on peer close");
    }

    #[tokio::test]
    async fn test_websocket_identifiers_unique_per_connection() {
        let (mut transport, url) = bind_transport().await;

        let server_handle = tokio::spawn(async move {
            let a = transport.accept().await.expect("should accept");
            let b = transport.accept().await.expect("should accept");
            (a, b)
        });

        let _c1 = WebSocketConnection::connect(&url).await.unwrap();
        let _c2 = WebSocketConnection::connect(&url).await.unwrap();
        let (a, b) = server_handle.await.unwrap();

        assert_ne!(a.identifier(), b.identifier());
    }

    #[tokio::test]
    async fn test_websocket_accept_gate_rejects_peer() {
        let transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().unwrap();
        let url = format!("ws://{addr}");

        // Gate that rejects everyone: accept() should keep waiting, and
        // the rejected client's handshake should fail or its connection
        // should close immediately.
        let mut transport = transport
            .with_accept_gate(Arc::new(|_peer| false));

        let server_handle = tokio::spawn(async move {
            // Never resolves for a rejected peer; give it a bounded window.
            tokio::time::timeout(
                std::time::Duration::from_millis(300),
                transport.accept(),
            )
            .await
        });

        // Either the handshake fails outright or the socket closes
        // before any data arrives.
        if let Ok(conn) = WebSocketConnection::connect(&url).await {
            let result = conn.recv().await;
            assert!(matches!(result, Ok(None) | Err(_)));
        }

        let accept_result = server_handle.await.unwrap();
        assert!(
            accept_result.is_err(),
            "gated accept should not produce a connection"
        );
    }
}
