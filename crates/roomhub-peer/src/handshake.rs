//! The first exchange on every connection, before [`attach`](crate::attach).
//!
//! ```text
//! dialer                              master
//!   seq=0 Handshake{version, token} ──►  authenticate(token)
//!   ◄── reply_to=0 HandshakeAck{peer_id}
//! ```
//!
//! A failed handshake is answered with a non-success status before the
//! connection is dropped, so the dialer learns why.

use std::time::Duration;

use roomhub_protocol::{Codec, Envelope, Message, PROTOCOL_VERSION, PeerId, ResponseStatus};
use roomhub_transport::{Connection, TransportError};

use crate::{Authenticator, PeerError, PeerIdentity};

/// How long either side waits for the other's handshake frame.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

async fn recv_frame<C, K>(conn: &C, codec: &K) -> Result<Envelope, PeerError>
where
    C: Connection<Error = TransportError>,
    K: Codec,
{
    match tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.recv()).await {
        Ok(Ok(Some(data))) => Ok(codec.decode(&data)?),
        Ok(Ok(None)) => Err(PeerError::Handshake(
            "connection closed before handshake".into(),
        )),
        Ok(Err(e)) => Err(PeerError::Transport(e)),
        Err(_) => Err(PeerError::Handshake("handshake timed out".into())),
    }
}

async fn send_frame<C, K>(conn: &C, codec: &K, envelope: &Envelope) -> Result<(), PeerError>
where
    C: Connection<Error = TransportError>,
    K: Codec,
{
    let bytes = codec.encode(envelope)?;
    conn.send(&bytes).await?;
    Ok(())
}

/// Master side: waits for the dialer's `Handshake`, authenticates it and
/// acknowledges with the assigned `peer_id`.
pub async fn accept_handshake<C, K, A>(
    conn: &C,
    codec: &K,
    auth: &A,
    peer_id: PeerId,
) -> Result<PeerIdentity, PeerError>
where
    C: Connection<Error = TransportError>,
    K: Codec,
    A: Authenticator,
{
    let frame = recv_frame(conn, codec).await?;
    let reply_to = frame.seq;

    let (version, token) = match frame.payload {
        Message::Handshake { version, token } if !frame.is_response() => (version, token),
        other => {
            let reply = Envelope::response(
                0,
                reply_to,
                ResponseStatus::Failed,
                Message::reason("expected Handshake"),
            );
            send_frame(conn, codec, &reply).await?;
            return Err(PeerError::Handshake(format!(
                "first message must be Handshake, got {}",
                other.kind()
            )));
        }
    };

    if version != PROTOCOL_VERSION {
        let reason = format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}");
        let reply = Envelope::response(0, reply_to, ResponseStatus::Failed, Message::reason(&reason));
        send_frame(conn, codec, &reply).await?;
        return Err(PeerError::Handshake(reason));
    }

    let identity = match auth.authenticate(token.as_deref().unwrap_or("")).await {
        Ok(identity) => identity,
        Err(e) => {
            let reply = Envelope::response(
                0,
                reply_to,
                ResponseStatus::Unauthorized,
                Message::reason("unauthorized"),
            );
            send_frame(conn, codec, &reply).await?;
            return Err(e);
        }
    };

    let ack = Envelope::response(0, reply_to, ResponseStatus::Success, Message::HandshakeAck { peer_id });
    send_frame(conn, codec, &ack).await?;
    Ok(identity)
}

/// Dialer side: sends `Handshake` and returns the id the master assigned.
pub async fn initiate_handshake<C, K>(
    conn: &C,
    codec: &K,
    token: Option<String>,
) -> Result<PeerId, PeerError>
where
    C: Connection<Error = TransportError>,
    K: Codec,
{
    let hello = Envelope::request(
        0,
        Message::Handshake {
            version: PROTOCOL_VERSION,
            token,
        },
    );
    send_frame(conn, codec, &hello).await?;

    let reply = recv_frame(conn, codec).await?;
    match (reply.status, reply.payload) {
        (ResponseStatus::Success, Message::HandshakeAck { peer_id }) => Ok(peer_id),
        (status, Message::Reason { message }) => {
            Err(PeerError::Handshake(format!("{status}: {message}")))
        }
        (_, other) => Err(PeerError::UnexpectedResponse(other.kind())),
    }
}
