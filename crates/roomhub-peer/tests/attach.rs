//! Handshake and request/response over a real WebSocket on localhost.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use roomhub_peer::{
    Authenticator, OpenAuthenticator, PeerError, PeerIdentity, accept_handshake, attach,
    initiate_handshake,
};
use roomhub_protocol::{JsonCodec, Message, PeerId, ResponseStatus, RoomId};
use roomhub_transport::{Transport, WebSocketConnection, WebSocketTransport};

struct LevelAuth;

impl Authenticator for LevelAuth {
    async fn authenticate(&self, token: &str) -> Result<PeerIdentity, PeerError> {
        let level = token
            .parse()
            .map_err(|_| PeerError::AuthFailed(format!("bad token {token:?}")))?;
        Ok(PeerIdentity {
            permission_level: level,
            username: Some(format!("user{level}")),
        })
    }
}

async fn listener() -> (WebSocketTransport, String) {
    let transport = WebSocketTransport::bind("127.0.0.1:0").await.unwrap();
    let addr = transport.local_addr().unwrap().to_string();
    (transport, addr)
}

#[tokio::test]
async fn test_handshake_assigns_peer_id_and_identity() {
    let (mut transport, addr) = listener().await;

    let server = tokio::spawn(async move {
        let conn = transport.accept().await.unwrap();
        accept_handshake(&conn, &JsonCodec, &LevelAuth, PeerId(7)).await
    });

    let conn = WebSocketConnection::connect(&addr).await.unwrap();
    let assigned = initiate_handshake(&conn, &JsonCodec, Some("3".into()))
        .await
        .unwrap();
    assert_eq!(assigned, PeerId(7));

    let identity = server.await.unwrap().unwrap();
    assert_eq!(identity.permission_level, 3);
    assert_eq!(identity.username.as_deref(), Some("user3"));
}

#[tokio::test]
async fn test_rejected_token_is_reported_to_dialer() {
    let (mut transport, addr) = listener().await;

    let server = tokio::spawn(async move {
        let conn = transport.accept().await.unwrap();
        accept_handshake(&conn, &JsonCodec, &LevelAuth, PeerId(1)).await
    });

    let conn = WebSocketConnection::connect(&addr).await.unwrap();
    let err = initiate_handshake(&conn, &JsonCodec, Some("not-a-number".into()))
        .await
        .unwrap_err();
    match err {
        PeerError::Handshake(reason) => assert!(reason.contains("Unauthorized"), "{reason}"),
        other => panic!("expected Handshake error, got {other:?}"),
    }

    assert!(matches!(
        server.await.unwrap(),
        Err(PeerError::AuthFailed(_))
    ));
}

#[tokio::test]
async fn test_attached_peers_exchange_requests_and_responses() {
    let (mut transport, addr) = listener().await;

    let server = tokio::spawn(async move {
        let conn = transport.accept().await.unwrap();
        let identity = accept_handshake(&conn, &JsonCodec, &OpenAuthenticator, PeerId(1))
            .await
            .unwrap();
        let (peer, mut inbox) = attach(conn, JsonCodec, PeerId(1), identity);

        let request = inbox.recv().await.expect("one request");
        assert_eq!(request.payload, Message::DestroyRoom { room_id: RoomId(4) });
        peer.respond_failure(request.seq, ResponseStatus::Failed, "Room does not exist")
            .unwrap();
        peer
    });

    let conn = WebSocketConnection::connect(&addr).await.unwrap();
    let id = initiate_handshake(&conn, &JsonCodec, None).await.unwrap();
    let (client, _inbox) = attach(conn, JsonCodec, id, PeerIdentity::default());

    let err = client
        .request(Message::DestroyRoom { room_id: RoomId(4) })
        .await
        .unwrap()
        .into_result()
        .unwrap_err();
    assert!(matches!(
        err,
        PeerError::Rejected { status: ResponseStatus::Failed, ref reason } if reason == "Room does not exist"
    ));

    let master_side = server.await.unwrap();
    assert!(master_side.is_connected());
}

#[tokio::test]
async fn test_remote_close_disconnects_peer_and_runs_listeners() {
    let (mut transport, addr) = listener().await;

    let server = tokio::spawn(async move {
        let conn = transport.accept().await.unwrap();
        let identity = accept_handshake(&conn, &JsonCodec, &OpenAuthenticator, PeerId(2))
            .await
            .unwrap();
        attach(conn, JsonCodec, PeerId(2), identity)
    });

    let conn = WebSocketConnection::connect(&addr).await.unwrap();
    let id = initiate_handshake(&conn, &JsonCodec, None).await.unwrap();
    let (client, _client_inbox) = attach(conn, JsonCodec, id, PeerIdentity::default());

    let (master_side, _inbox) = server.await.unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    master_side.on_disconnect(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    client.disconnect();

    tokio::time::timeout(Duration::from_secs(5), master_side.closed())
        .await
        .expect("master side should observe the close");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!master_side.is_connected());
}
