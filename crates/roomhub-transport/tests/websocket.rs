//! Integration tests for the WebSocket transport.
//!
//! Both ends use the crate's own types: the listener accepts, and
//! [`WebSocketConnection::connect`] dials, so the dialer used by room
//! servers is covered by the same tests as the accept path.

#[cfg(feature = "websocket")]
mod websocket {
    use roomhub_transport::{Connection, Transport, WebSocketConnection, WebSocketTransport};

    async fn bound_transport() -> (WebSocketTransport, String) {
        let transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("local addr").to_string();
        (transport, addr)
    }

    #[tokio::test]
    async fn test_dial_and_accept_exchange_messages_both_ways() {
        let (mut transport, addr) = bound_transport().await;

        let server = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });
        let client = WebSocketConnection::connect(&addr)
            .await
            .expect("client should connect");
        let server_conn = server.await.expect("task should complete");

        assert!(server_conn.remote_addr().is_some());
        assert!(client.remote_addr().is_none());
        assert_ne!(server_conn.id(), client.id());

        client.send(b"ping").await.expect("client send");
        let got = server_conn.recv().await.expect("server recv");
        assert_eq!(got, Some(b"ping".to_vec()));

        server_conn.send(b"pong").await.expect("server send");
        let got = client.recv().await.expect("client recv");
        assert_eq!(got, Some(b"pong".to_vec()));
    }

    #[tokio::test]
    async fn test_send_is_not_blocked_by_pending_recv() {
        let (mut transport, addr) = bound_transport().await;
        let server = tokio::spawn(async move { transport.accept().await.unwrap() });
        let client = std::sync::Arc::new(WebSocketConnection::connect(&addr).await.unwrap());
        let server_conn = server.await.unwrap();

        // Park a reader on the client, then write from another task.
        let reader = {
            let client = std::sync::Arc::clone(&client);
            tokio::spawn(async move { client.recv().await })
        };
        tokio::task::yield_now().await;

        tokio::time::timeout(std::time::Duration::from_secs(2), client.send(b"hello"))
            .await
            .expect("send must not wait for the parked reader")
            .expect("send ok");
        assert_eq!(server_conn.recv().await.unwrap(), Some(b"hello".to_vec()));

        server_conn.send(b"back").await.unwrap();
        let got = reader.await.unwrap().unwrap();
        assert_eq!(got, Some(b"back".to_vec()));
    }

    #[tokio::test]
    async fn test_close_is_observed_as_clean_end_of_stream() {
        let (mut transport, addr) = bound_transport().await;
        let server = tokio::spawn(async move { transport.accept().await.unwrap() });
        let client = WebSocketConnection::connect(&addr).await.unwrap();
        let server_conn = server.await.unwrap();

        client.close().await.expect("close");

        let got = server_conn.recv().await.expect("recv after close");
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        // Bind then drop to get a port nothing listens on.
        let (transport, addr) = bound_transport().await;
        drop(transport);

        let result = WebSocketConnection::connect(&addr).await;
        assert!(matches!(
            result,
            Err(roomhub_transport::TransportError::ConnectFailed { .. })
        ));
    }
}
