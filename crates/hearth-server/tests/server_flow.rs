//! End-to-end protocol flows against a live in-process server

use bytes::{BufMut, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

use hearth_crypto::asymmetric::{public_key_from_der, wrap_session_key};
use hearth_crypto::{symmetric, SessionKey};
use hearth_protocol::model::{Chat, Message, Session, UserProfile};
use hearth_protocol::payload::{
    CreateChatRequest, ErrorBody, ErrorCode, LoginRequest, RegisterRequest, SendMessageRequest,
    UserIdBody,
};
use hearth_protocol::wire::{Flags, MessageType, Packet, PacketCodec, HEADER_LEN, MAGIC};
use hearth_server::{ChatServer, ServerConfig};

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.host = "127.0.0.1".into();
    // 4096-bit keygen is too slow for CI; the handshake path is identical
    config.encryption.rsa_key_size = 2048;
    config.encryption.required = false;
    config
}

async fn start_server(config: ServerConfig) -> SocketAddr {
    let server = ChatServer::new(config).await.expect("server build");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });
    addr
}

struct TestClient {
    framed: Framed<TcpStream, PacketCodec>,
    next_id: u64,
    key: Option<SessionKey>,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        Self {
            framed: Framed::new(stream, PacketCodec::new()),
            next_id: 1,
            key: None,
        }
    }

    fn seal(&self, mut packet: Packet) -> Packet {
        if let Some(key) = &self.key {
            if !packet.message_type.is_handshake() {
                let sealed = symmetric::encrypt(key, &packet.payload).expect("encrypt");
                packet.payload = sealed.to_wire().into();
                packet.flags = packet.flags.with(Flags::ENCRYPTED);
            }
        }
        packet
    }

    fn open(&self, mut packet: Packet) -> Packet {
        if packet.flags.contains(Flags::ENCRYPTED) {
            let key = self.key.as_ref().expect("encrypted frame without key");
            let plain = symmetric::decrypt_wire(key, &packet.payload).expect("decrypt");
            packet.payload = plain.into();
            packet.flags = packet.flags.without(Flags::ENCRYPTED);
        }
        packet
    }

    async fn send_raw(&mut self, message_type: MessageType, payload: Bytes) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let packet = self.seal(Packet::new(message_type, id, payload));
        self.framed.send(packet).await.expect("send");
        id
    }

    /// Send a request and wait for the frame echoing its message id
    async fn request_bytes(&mut self, message_type: MessageType, payload: Bytes) -> Packet {
        let id = self.send_raw(message_type, payload).await;
        loop {
            let packet = self.recv().await.expect("response before close");
            if packet.message_id == id {
                return packet;
            }
            // Unsolicited push while waiting: not ours, keep reading
        }
    }

    async fn request<T: Serialize>(&mut self, message_type: MessageType, body: &T) -> Packet {
        let payload = Bytes::from(serde_json::to_vec(body).unwrap());
        self.request_bytes(message_type, payload).await
    }

    /// Next inbound frame, decrypted, or None on close/timeout
    async fn recv(&mut self) -> Option<Packet> {
        match tokio::time::timeout(RESPONSE_TIMEOUT, self.framed.next()).await {
            Ok(Some(Ok(packet))) => Some(self.open(packet)),
            _ => None,
        }
    }

    /// Full handshake + key exchange; subsequent frames are encrypted
    async fn establish_encryption(&mut self) {
        let res = self
            .request_bytes(MessageType::AuthHandshakeReq, Bytes::new())
            .await;
        assert_eq!(res.message_type, MessageType::AuthHandshakeRes);
        assert!(
            res.payload.len() >= 256,
            "DER public key too short: {}",
            res.payload.len()
        );

        let server_public = public_key_from_der(&res.payload).expect("server key DER");
        let key = SessionKey::generate();
        let wrapped = wrap_session_key(&server_public, &key).expect("wrap");

        let res = self
            .request_bytes(MessageType::AuthKeyExchangeReq, wrapped.into())
            .await;
        assert_eq!(res.message_type, MessageType::AuthKeyExchangeRes);

        self.key = Some(key);
    }

    async fn register(&mut self, username: &str) -> UserProfile {
        let res = self
            .request(
                MessageType::AuthRegisterReq,
                &RegisterRequest {
                    username: username.into(),
                    password: "Alice1234".into(),
                    full_name: username.to_uppercase(),
                    bio: None,
                },
            )
            .await;
        assert_eq!(res.message_type, MessageType::AuthRegisterRes);
        parse(&res)
    }

    async fn login(&mut self, username: &str) -> Session {
        let res = self
            .request(
                MessageType::AuthLoginReq,
                &LoginRequest {
                    username: username.into(),
                    password: "Alice1234".into(),
                    device_info: Some("test".into()),
                },
            )
            .await;
        assert_eq!(res.message_type, MessageType::AuthLoginRes);
        parse(&res)
    }
}

fn parse<T: DeserializeOwned>(packet: &Packet) -> T {
    serde_json::from_slice(&packet.payload).unwrap_or_else(|e| {
        panic!(
            "payload parse failed: {} (raw: {})",
            e,
            String::from_utf8_lossy(&packet.payload)
        )
    })
}

fn parse_error(packet: &Packet) -> ErrorBody {
    parse(packet)
}

// --- account lifecycle over the wire ---

#[tokio::test]
async fn test_register_login_send_message() {
    let addr = start_server(test_config()).await;
    let mut client = TestClient::connect(addr).await;

    let profile = client.register("alice").await;
    assert_eq!(profile.username, "alice");
    assert!(profile.password_hash.is_empty(), "credentials leaked");

    let session = client.login("alice").await;
    assert!(!session.token.is_empty());
    assert!(session.expires_at > chrono::Utc::now());

    let res = client
        .request(
            MessageType::MessageSendReq,
            &SendMessageRequest {
                chat_id: uuid::Uuid::new_v4(),
                sender_id: profile.user_id,
                content: "hi".into(),
                message_type: hearth_protocol::model::MessageKind::Text,
                reply_to: None,
            },
        )
        .await;
    assert_eq!(res.message_type, MessageType::MessageSendRes);
    let stored: Message = parse(&res);
    assert_eq!(stored.content, "hi");
    assert_eq!(stored.sender_id, profile.user_id);
}

// --- handshake and key exchange ---

#[tokio::test]
async fn test_handshake_and_encrypted_traffic() {
    let mut config = test_config();
    config.encryption.required = true;
    let addr = start_server(config).await;
    let mut client = TestClient::connect(addr).await;

    client.establish_encryption().await;

    // Application traffic now flows encrypted both ways
    let profile = client.register("alice").await;
    let session = client.login("alice").await;
    assert_eq!(session.user_id, profile.user_id);

    let res = client
        .request(
            MessageType::UserGetProfileReq,
            &UserIdBody {
                user_id: profile.user_id,
            },
        )
        .await;
    assert_eq!(res.message_type, MessageType::UserGetProfileRes);
}

#[tokio::test]
async fn test_encryption_required_gates_plaintext_requests() {
    let mut config = test_config();
    config.encryption.required = true;
    let addr = start_server(config).await;
    let mut client = TestClient::connect(addr).await;

    let res = client
        .request(
            MessageType::AuthRegisterReq,
            &RegisterRequest {
                username: "alice".into(),
                password: "Alice1234".into(),
                full_name: "Alice".into(),
                bio: None,
            },
        )
        .await;
    let err = parse_error(&res);
    assert_eq!(err.code, ErrorCode::InvalidRequest);

    // PING is exempt so clients can probe before the handshake
    let res = client
        .request_bytes(MessageType::Ping, Bytes::new())
        .await;
    assert_eq!(res.message_type, MessageType::Pong);
}

// --- corrupted frame closes the connection ---

#[tokio::test]
async fn test_bad_crc_closes_connection() {
    let addr = start_server(test_config()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let mut codec = PacketCodec::new();
    let mut buf = BytesMut::new();
    tokio_util::codec::Encoder::encode(
        &mut codec,
        Packet::new(MessageType::Ping, 1, Bytes::new()),
        &mut buf,
    )
    .unwrap();
    let last = buf.len() - 1;
    buf[last] ^= 0xFF;

    stream.write_all(&buf).await.unwrap();

    // No response; the server closes the socket
    let mut out = [0u8; 64];
    let read = tokio::time::timeout(RESPONSE_TIMEOUT, stream.read(&mut out))
        .await
        .expect("server should close, not hang")
        .unwrap();
    assert_eq!(read, 0, "expected EOF after corrupted frame");
}

// --- oversized length field closes the connection ---

#[tokio::test]
async fn test_payload_overflow_closes_connection() {
    let addr = start_server(test_config()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    // Header only: a 10 MiB + 1 declared payload that never arrives
    let mut header = BytesMut::with_capacity(HEADER_LEN);
    header.put_u32(MAGIC);
    header.put_u16(MessageType::MessageSendReq.code());
    header.put_u8(1);
    header.put_u8(0);
    header.put_u64(99);
    header.put_u32(10 * 1024 * 1024 + 1);
    header.put_u64(0);
    stream.write_all(&header).await.unwrap();

    let mut out = [0u8; 64];
    let read = tokio::time::timeout(RESPONSE_TIMEOUT, stream.read(&mut out))
        .await
        .expect("server should close immediately")
        .unwrap();
    assert_eq!(read, 0, "expected EOF after oversized header");
}

// --- fan-out to other participants only ---

#[tokio::test]
async fn test_fan_out_to_two_recipients() {
    let addr = start_server(test_config()).await;

    let mut alice = TestClient::connect(addr).await;
    let mut bob = TestClient::connect(addr).await;
    let mut carol = TestClient::connect(addr).await;

    let alice_profile = alice.register("alice").await;
    let bob_profile = bob.register("bob").await;
    let carol_profile = carol.register("carol").await;
    alice.login("alice").await;
    bob.login("bob").await;
    carol.login("carol").await;

    let res = alice
        .request(
            MessageType::ChatCreateReq,
            &CreateChatRequest {
                chat_type: hearth_protocol::model::ChatType::Group,
                name: Some("trio".into()),
                description: None,
                owner_id: alice_profile.user_id,
                member_ids: vec![bob_profile.user_id, carol_profile.user_id],
            },
        )
        .await;
    let chat: Chat = parse(&res);
    assert_eq!(chat.participant_count, 3);

    let res = alice
        .request(
            MessageType::MessageSendReq,
            &SendMessageRequest {
                chat_id: chat.chat_id,
                sender_id: alice_profile.user_id,
                content: "hello everyone".into(),
                message_type: hearth_protocol::model::MessageKind::Text,
                reply_to: None,
            },
        )
        .await;
    let stored: Message = parse(&res);

    // Bob and Carol each receive exactly one identical push
    for client in [&mut bob, &mut carol] {
        let push = client.recv().await.expect("MESSAGE_RECEIVE push");
        assert_eq!(push.message_type, MessageType::MessageReceive);
        let delivered: Message = parse(&push);
        assert_eq!(delivered.message_id, stored.message_id);
        assert_eq!(delivered.content, "hello everyone");
    }

    // The sender gets no echo of her own message
    let stray = tokio::time::timeout(Duration::from_millis(300), alice.framed.next()).await;
    assert!(stray.is_err(), "sender received unexpected push");
}

// --- session expiry ---

#[tokio::test]
async fn test_session_expiry_and_relogin() {
    let mut config = test_config();
    config.session.token_expiration_seconds = 1;
    let addr = start_server(config).await;
    let mut client = TestClient::connect(addr).await;

    let profile = client.register("alice").await;
    client.login("alice").await;

    tokio::time::sleep(Duration::from_millis(2100)).await;

    let res = client
        .request(
            MessageType::UserGetProfileReq,
            &UserIdBody {
                user_id: profile.user_id,
            },
        )
        .await;
    let err = parse_error(&res);
    assert_eq!(err.code, ErrorCode::SessionExpired);

    // Fresh credentials still work on the same connection
    let session = client.login("alice").await;
    assert!(session.expires_at > chrono::Utc::now());

    let res = client
        .request(
            MessageType::UserGetProfileReq,
            &UserIdBody {
                user_id: profile.user_id,
            },
        )
        .await;
    assert_eq!(res.message_type, MessageType::UserGetProfileRes);
}

// --- state gating ---

#[tokio::test]
async fn test_requests_before_login_are_unauthenticated() {
    let addr = start_server(test_config()).await;
    let mut client = TestClient::connect(addr).await;

    for message_type in [
        MessageType::ChatListReq,
        MessageType::MessageHistoryReq,
        MessageType::UserSearchReq,
    ] {
        let res = client
            .request_bytes(message_type, Bytes::from_static(b"{}"))
            .await;
        let err = parse_error(&res);
        assert_eq!(err.code, ErrorCode::Unauthenticated, "{:?}", message_type);
    }
}

// --- encryption gating ---

#[tokio::test]
async fn test_plaintext_after_key_exchange_closes_connection() {
    let mut config = test_config();
    config.encryption.required = true;
    let addr = start_server(config).await;
    let mut client = TestClient::connect(addr).await;

    client.establish_encryption().await;

    // Bypass the client's own sealing: send a plaintext PING on the keyed
    // connection
    let packet = Packet::new(MessageType::Ping, 42, Bytes::new());
    client.framed.send(packet).await.unwrap();

    assert!(
        client.recv().await.is_none(),
        "server should drop plaintext frames once keyed"
    );
}

// --- correlation ---

#[tokio::test]
async fn test_responses_echo_request_message_id() {
    let addr = start_server(test_config()).await;
    let mut client = TestClient::connect(addr).await;

    let id = client.send_raw(MessageType::Ping, Bytes::new()).await;
    let res = client.recv().await.unwrap();
    assert_eq!(res.message_type, MessageType::Pong);
    assert_eq!(res.message_id, id);
    assert!(res.flags.contains(Flags::REPLY));
}

// --- login failure keeps the connection usable ---

#[tokio::test]
async fn test_bad_credentials_then_good() {
    let addr = start_server(test_config()).await;
    let mut client = TestClient::connect(addr).await;

    client.register("alice").await;

    let res = client
        .request(
            MessageType::AuthLoginReq,
            &LoginRequest {
                username: "alice".into(),
                password: "WrongPassword1".into(),
                device_info: None,
            },
        )
        .await;
    let err = parse_error(&res);
    assert_eq!(err.code, ErrorCode::AuthFailed);

    // Same connection, correct password
    let session = client.login("alice").await;
    assert!(!session.token.is_empty());
}
