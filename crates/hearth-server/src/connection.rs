//! Per-connection pipeline
//!
//! Each accepted socket gets one reader loop and one writer task. The
//! reader decodes frames, peels encryption, handles the handshake pair
//! locally and hands everything else to the dispatcher; the writer
//! drains the outbound queue, encrypting non-handshake frames once a
//! session key is bound. Events for one connection are strictly
//! serialized: a second handshake can therefore swap the key without
//! racing in-flight frames.

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use hearth_crypto::{symmetric, SessionKey};
use hearth_protocol::payload::{self, Ack, ErrorBody, ErrorCode};
use hearth_protocol::wire::{Flags, MessageType, Packet, PacketCodec};
use hearth_protocol::ProtocolError;

use crate::dispatcher::ConnectionContext;
use crate::registry::OUTBOUND_QUEUE_DEPTH;
use crate::server::ServerCore;

/// Key slot shared between the reader (binds it) and writer (encrypts
/// with it); both tasks belong to the same connection
type KeySlot = Arc<Mutex<Option<SessionKey>>>;

/// Drive one client connection to completion
pub async fn handle_connection(core: Arc<ServerCore>, stream: TcpStream, addr: SocketAddr) {
    let framed = Framed::new(stream, PacketCodec::new());
    let (mut sink, mut frames) = framed.split();

    let (tx, mut rx) = mpsc::channel::<Packet>(OUTBOUND_QUEUE_DEPTH);
    let connection_id = core.registry.register(tx.clone());
    let session_key: KeySlot = Arc::new(Mutex::new(None));

    debug!(remote = %addr, connection_id, "connection open");

    // Writer: outbound encryption happens here so pushed frames (fan-out)
    // get the same treatment as responses.
    let writer_key = Arc::clone(&session_key);
    let writer = tokio::spawn(async move {
        while let Some(packet) = rx.recv().await {
            let packet = match encrypt_outbound(packet, &writer_key) {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "outbound encryption failed, closing");
                    break;
                }
            };
            if sink.send(packet).await.is_err() {
                break;
            }
        }
    });

    let mut ctx = ConnectionContext::new(connection_id, addr);
    let read_timeout = Duration::from_secs(core.config.read_timeout_secs);

    loop {
        let frame = match tokio::time::timeout(read_timeout, frames.next()).await {
            Err(_) => {
                info!(remote = %addr, "read timeout, closing connection");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(err))) => {
                log_protocol_error(addr, &err);
                break;
            }
            Ok(Some(Ok(packet))) => packet,
        };

        match process_frame(&core, &mut ctx, &session_key, frame).await {
            Ok(Some(response)) => {
                // Responses go through the same queue as pushes; if the
                // client cannot drain it, the connection is done.
                if tx.send(response).await.is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(close) => {
                if let Some(response) = close.farewell {
                    let _ = tx.send(response).await;
                    // Give the writer a moment to flush the farewell
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                break;
            }
        }
    }

    writer.abort();
    core.registry.unregister(connection_id);
    if let Some(user_id) = ctx.user_id {
        if !core.registry.is_online(user_id) {
            if let Err(e) = core.users.mark_offline(user_id).await {
                warn!(user_id = %user_id, error = %e, "offline status update failed");
            }
        }
    }
    debug!(remote = %addr, connection_id, "connection closed");
}

/// Why the reader loop is terminating, with an optional last frame
struct CloseConnection {
    farewell: Option<Packet>,
}

impl CloseConnection {
    fn silent() -> Self {
        Self { farewell: None }
    }

    fn with(packet: Packet) -> Self {
        Self {
            farewell: Some(packet),
        }
    }
}

async fn process_frame(
    core: &Arc<ServerCore>,
    ctx: &mut ConnectionContext,
    session_key: &KeySlot,
    mut packet: Packet,
) -> Result<Option<Packet>, CloseConnection> {
    let key_bound = session_key.lock().expect("key mutex").is_some();

    // Inbound decryption
    if packet.is_encrypted() {
        if !key_bound {
            log_protocol_error(ctx.remote_addr, &ProtocolError::NoSessionKey);
            return Err(CloseConnection::silent());
        }
        let plaintext = {
            let guard = session_key.lock().expect("key mutex");
            let key = guard.as_ref().expect("checked above");
            symmetric::decrypt_wire(key, &packet.payload)
        };
        match plaintext {
            Ok(bytes) => {
                packet.payload = bytes.into();
                packet.flags = packet.flags.without(Flags::ENCRYPTED);
            }
            Err(err) => {
                // Tampered or desynchronized stream: assume compromised
                warn!(remote = %ctx.remote_addr, error = %err, "inbound decryption failed, closing");
                return Err(CloseConnection::silent());
            }
        }
    } else if key_bound && !packet.message_type.is_handshake() {
        // Once keyed, plaintext application traffic is a protocol breach
        warn!(
            remote = %ctx.remote_addr,
            message_type = ?packet.message_type,
            "plaintext frame on encrypted connection, closing"
        );
        return Err(CloseConnection::silent());
    }

    // Handshake pair is handled below the dispatcher
    match packet.message_type {
        MessageType::AuthHandshakeReq => return handshake_response(core, &packet).map(Some),
        MessageType::AuthKeyExchangeReq => {
            return key_exchange(core, ctx, session_key, &packet).map(Some)
        }
        _ => {}
    }

    // With encryption mandated, anything besides handshake and heartbeat
    // must wait until a key is bound.
    if core.config.encryption.required
        && !key_bound
        && !matches!(packet.message_type, MessageType::Ping | MessageType::Pong)
    {
        let body = ErrorBody::new(
            ErrorCode::InvalidRequest,
            "encryption required: complete the key exchange first",
        );
        let res_type = packet
            .message_type
            .response()
            .unwrap_or(MessageType::Error);
        let bytes = payload::to_bytes(&body).unwrap_or_default();
        return Ok(Some(Packet::response_to(&packet, res_type, bytes)));
    }

    Ok(core.dispatcher.dispatch(ctx, packet).await)
}

/// `AUTH_HANDSHAKE_REQ` -> public key response
fn handshake_response(
    core: &Arc<ServerCore>,
    packet: &Packet,
) -> Result<Packet, CloseConnection> {
    match core.keypair.public_key_der() {
        Ok(der) => Ok(Packet::response_to(
            packet,
            MessageType::AuthHandshakeRes,
            der,
        )),
        Err(err) => {
            warn!(error = %err, "public key encode failed");
            Err(CloseConnection::silent())
        }
    }
}

/// `AUTH_KEY_EXCHANGE_REQ` -> unwrap the RSA-wrapped AES key and bind it
///
/// A repeat exchange replaces the previous key; the reader processes one
/// frame at a time, so no encrypted frame is in flight during the swap.
fn key_exchange(
    core: &Arc<ServerCore>,
    ctx: &ConnectionContext,
    session_key: &KeySlot,
    packet: &Packet,
) -> Result<Packet, CloseConnection> {
    match core.keypair.unwrap_session_key(&packet.payload) {
        Ok(key) => {
            *session_key.lock().expect("key mutex") = Some(key);
            info!(remote = %ctx.remote_addr, "session key established");
            let bytes = payload::to_bytes(&Ack::OK).unwrap_or_default();
            Ok(Packet::response_to(
                packet,
                MessageType::AuthKeyExchangeRes,
                bytes,
            ))
        }
        Err(err) => {
            warn!(remote = %ctx.remote_addr, error = %err, "key exchange failed, closing");
            let body = ErrorBody::new(ErrorCode::InvalidRequest, "key exchange failed");
            let bytes = payload::to_bytes(&body).unwrap_or_default();
            Err(CloseConnection::with(Packet::response_to(
                packet,
                MessageType::AuthKeyExchangeRes,
                bytes,
            )))
        }
    }
}

/// Encrypt an outbound frame if a key is bound and the type allows it
fn encrypt_outbound(mut packet: Packet, key_slot: &KeySlot) -> hearth_crypto::Result<Packet> {
    if packet.message_type.is_handshake() {
        return Ok(packet);
    }
    let guard = key_slot.lock().expect("key mutex");
    let Some(key) = guard.as_ref() else {
        return Ok(packet);
    };
    let sealed = symmetric::encrypt(key, &packet.payload)?;
    packet.payload = sealed.to_wire().into();
    packet.flags = packet.flags.with(Flags::ENCRYPTED);
    Ok(packet)
}

fn log_protocol_error(addr: SocketAddr, err: &ProtocolError) {
    match err {
        ProtocolError::PayloadOverflow { length } => {
            // Oversized length fields are the classic memory-exhaustion probe
            warn!(remote = %addr, length, "oversized frame rejected, possible DoS attempt");
        }
        other => {
            warn!(remote = %addr, error = %other, "protocol error, closing connection");
        }
    }
}
