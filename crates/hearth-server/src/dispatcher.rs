//! Request dispatch
//!
//! Maps each inbound `(message_type, payload)` onto a service call and
//! wraps the outcome in a response frame whose `message_id` echoes the
//! request. Handshake frames never reach this layer; the connection deals
//! with them before dispatch.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use hearth_protocol::model::Session;
use hearth_protocol::payload::{
    self, Ack, AddParticipantRequest, AvatarSetRequest, ChatIdBody, ChatUpdateRequest,
    CreateChatRequest, EditMessageRequest, HistoryRequest, LoginRequest, MessageIdBody,
    PasswordResetRequest, RegisterRequest, RemoveParticipantRequest, SearchRequest,
    StatusUpdateRequest, TokenBody, TypingIndicatorBody, UpdateProfileRequest, UserIdBody,
};
use hearth_protocol::wire::{MessageType, Packet};

use crate::error::{ServiceError, ServiceResult};
use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::services::{AuthService, ChatService, MessageService, UserService};
use crate::session::SessionManager;

/// Per-connection view the dispatcher reads and updates
#[derive(Debug)]
pub struct ConnectionContext {
    pub connection_id: ConnectionId,
    pub remote_addr: SocketAddr,
    pub user_id: Option<Uuid>,
    pub session: Option<Session>,
}

impl ConnectionContext {
    pub fn new(connection_id: ConnectionId, remote_addr: SocketAddr) -> Self {
        Self {
            connection_id,
            remote_addr,
            user_id: None,
            session: None,
        }
    }

    fn require_user(&self) -> ServiceResult<Uuid> {
        self.user_id.ok_or(ServiceError::Unauthenticated)
    }
}

/// Routes packets to domain services
pub struct Dispatcher {
    auth: AuthService,
    users: UserService,
    chats: ChatService,
    messages: MessageService,
    sessions: Arc<SessionManager>,
    registry: Arc<ConnectionRegistry>,
}

impl Dispatcher {
    pub fn new(
        auth: AuthService,
        users: UserService,
        chats: ChatService,
        messages: MessageService,
        sessions: Arc<SessionManager>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            auth,
            users,
            chats,
            messages,
            sessions,
            registry,
        }
    }

    /// Handle one inbound packet, producing at most one response frame
    ///
    /// Returns `None` for fire-and-forget types that succeeded. Fan-out
    /// side effects (message delivery, typing indicators) happen in here.
    pub async fn dispatch(&self, ctx: &mut ConnectionContext, packet: Packet) -> Option<Packet> {
        debug!(
            remote = %ctx.remote_addr,
            message_type = ?packet.message_type,
            message_id = packet.message_id,
            "dispatch"
        );

        if let Err(err) = self.gate(ctx, packet.message_type) {
            return Some(self.error_response(ctx, &packet, err));
        }

        let result = self.route(ctx, &packet).await;
        match result {
            Ok(Some(body)) => {
                let res_type = packet
                    .message_type
                    .response()
                    .unwrap_or(MessageType::Error);
                Some(Packet::response_to(&packet, res_type, body))
            }
            Ok(None) => None,
            Err(err) => Some(self.error_response(ctx, &packet, err)),
        }
    }

    /// Authentication / session-expiry gate
    fn gate(&self, ctx: &mut ConnectionContext, message_type: MessageType) -> ServiceResult<()> {
        if message_type.allowed_unauthenticated() {
            return Ok(());
        }
        match &ctx.session {
            None => Err(ServiceError::Unauthenticated),
            Some(session) if !session.is_valid() => {
                // The session died under this connection; drop back to the
                // unauthenticated state so a fresh login can proceed.
                ctx.session = None;
                ctx.user_id = None;
                self.registry.unbind_user(ctx.connection_id);
                Err(ServiceError::SessionExpired)
            }
            Some(_) => Ok(()),
        }
    }

    async fn route(
        &self,
        ctx: &mut ConnectionContext,
        packet: &Packet,
    ) -> ServiceResult<Option<Bytes>> {
        use MessageType::*;

        match packet.message_type {
            Ping => Ok(Some(Bytes::new())),
            // We never ping clients; a stray PONG is noise, not an error
            Pong => Ok(None),

            AuthRegisterReq => {
                let req: RegisterRequest = parse(packet)?;
                let profile = self.auth.register(req).await?;
                body(&profile.redacted()).map(Some)
            }
            AuthLoginReq => {
                let req: LoginRequest = parse(packet)?;
                let (profile, session) = self.auth.login(req).await?;
                ctx.user_id = Some(profile.user_id);
                ctx.session = Some(session.clone());
                self.registry.bind_user(ctx.connection_id, profile.user_id);
                body(&session).map(Some)
            }
            AuthLogoutReq => {
                let req: TokenBody = parse(packet)?;
                ctx.require_user()?;
                self.auth.logout(&req.token).await?;
                ctx.session = None;
                ctx.user_id = None;
                self.registry.unbind_user(ctx.connection_id);
                body(&Ack::OK).map(Some)
            }
            AuthTokenRefresh => {
                let req: TokenBody = parse(packet)?;
                ctx.require_user()?;
                let refreshed = self.sessions.refresh(&req.token).await?;
                ctx.session = Some(refreshed.clone());
                body(&refreshed).map(Some)
            }
            AuthPasswordResetReq => {
                let req: PasswordResetRequest = parse(packet)?;
                let user_id = ctx.require_user()?;
                let profile = self.auth.reset_password(user_id, req).await?;
                // Every session of the user is gone, this connection's too
                ctx.session = None;
                ctx.user_id = None;
                self.registry.unbind_user(ctx.connection_id);
                body(&profile.redacted()).map(Some)
            }

            SessionValidateReq => {
                let req: TokenBody = parse(packet)?;
                let session = self.sessions.validate(&req.token).await?;
                body(&session).map(Some)
            }
            SessionInfoReq => {
                let session = ctx
                    .session
                    .clone()
                    .ok_or(ServiceError::Unauthenticated)?;
                body(&session).map(Some)
            }
            SessionTerminate => {
                let req: TokenBody = parse(packet)?;
                let user_id = ctx.require_user()?;
                let target = self.sessions.validate(&req.token).await?;
                if target.user_id != user_id {
                    return Err(ServiceError::Forbidden(
                        "cannot terminate another user's session".into(),
                    ));
                }
                self.sessions.terminate(&req.token).await?;
                Ok(None)
            }

            UserGetProfileReq => {
                let req: UserIdBody = parse(packet)?;
                let profile = self.users.get_profile(req.user_id).await?;
                body(&profile).map(Some)
            }
            UserUpdateProfileReq => {
                let req: UpdateProfileRequest = parse(packet)?;
                let requester = ctx.require_user()?;
                let profile = self.users.update_profile(requester, req).await?;
                body(&profile).map(Some)
            }
            UserSearchReq => {
                let req: SearchRequest = parse(packet)?;
                let hits = self.users.search(req).await?;
                body(&hits).map(Some)
            }
            UserStatusUpdateReq => {
                let req: StatusUpdateRequest = parse(packet)?;
                let requester = ctx.require_user()?;
                let profile = self.users.update_status(requester, req.status).await?;
                body(&profile).map(Some)
            }
            UserOnlineListReq => {
                let online = self.registry.online_users();
                let profiles = self.users.online_list(&online).await?;
                body(&profiles).map(Some)
            }
            UserAvatarGetReq => {
                let req: UserIdBody = parse(packet)?;
                let avatar = self.users.get_avatar(req.user_id).await?;
                body(&avatar).map(Some)
            }
            UserAvatarSetReq => {
                let req: AvatarSetRequest = parse(packet)?;
                let requester = ctx.require_user()?;
                let profile = self.users.set_avatar(requester, req.avatar_data).await?;
                body(&profile).map(Some)
            }

            ChatCreateReq => {
                let req: CreateChatRequest = parse(packet)?;
                let requester = ctx.require_user()?;
                let chat = self.chats.create(requester, req).await?;
                body(&chat).map(Some)
            }
            ChatListReq => {
                let requester = ctx.require_user()?;
                let chats = self.chats.list(requester).await?;
                body(&chats).map(Some)
            }
            ChatJoinReq => {
                let req: ChatIdBody = parse(packet)?;
                let requester = ctx.require_user()?;
                let chat = self.chats.join(requester, req.chat_id).await?;
                body(&chat).map(Some)
            }
            ChatLeaveReq => {
                let req: ChatIdBody = parse(packet)?;
                let requester = ctx.require_user()?;
                let chat = self.chats.leave(requester, req.chat_id).await?;
                body(&chat).map(Some)
            }
            ChatInfoReq => {
                let req: ChatIdBody = parse(packet)?;
                let chat = self.chats.info(req.chat_id).await?;
                body(&chat).map(Some)
            }
            ChatUpdateReq => {
                let req: ChatUpdateRequest = parse(packet)?;
                let requester = ctx.require_user()?;
                let chat = self.chats.update(requester, req).await?;
                body(&chat).map(Some)
            }
            ChatDeleteReq => {
                let req: ChatIdBody = parse(packet)?;
                let requester = ctx.require_user()?;
                let chat = self.chats.delete(requester, req.chat_id).await?;
                body(&chat).map(Some)
            }
            ChatAddParticipantReq => {
                let req: AddParticipantRequest = parse(packet)?;
                let requester = ctx.require_user()?;
                let chat = self.chats.add_participant(requester, req).await?;
                body(&chat).map(Some)
            }
            ChatRemoveParticipantReq => {
                let req: RemoveParticipantRequest = parse(packet)?;
                let requester = ctx.require_user()?;
                let chat = self.chats.remove_participant(requester, req).await?;
                body(&chat).map(Some)
            }

            MessageSendReq => {
                let req: hearth_protocol::payload::SendMessageRequest = parse(packet)?;
                let requester = ctx.require_user()?;
                let stored = self.messages.send(requester, req).await?;
                self.fan_out(&stored).await;
                body(&stored).map(Some)
            }
            MessageHistoryReq => {
                let req: HistoryRequest = parse(packet)?;
                ctx.require_user()?;
                let page = self.messages.history(req).await?;
                body(&page).map(Some)
            }
            MessageReadReceiptReq => {
                let req: MessageIdBody = parse(packet)?;
                let requester = ctx.require_user()?;
                let message = self.messages.mark_read(requester, req.message_id).await?;
                body(&message).map(Some)
            }
            MessageEditReq => {
                let req: EditMessageRequest = parse(packet)?;
                let requester = ctx.require_user()?;
                let message = self.messages.edit(requester, req).await?;
                body(&message).map(Some)
            }
            MessageDeleteReq => {
                let req: MessageIdBody = parse(packet)?;
                let requester = ctx.require_user()?;
                let message = self.messages.delete(requester, req.message_id).await?;
                body(&message).map(Some)
            }
            TypingIndicator => {
                let req: TypingIndicatorBody = parse(packet)?;
                let requester = ctx.require_user()?;
                if req.user_id != requester {
                    return Err(ServiceError::Forbidden(
                        "typing indicator for another user".into(),
                    ));
                }
                self.push_to_participants(req.chat_id, requester, MessageType::TypingIndicator, &req)
                    .await?;
                Ok(None)
            }

            // Server-initiated or transport-layer types a client must not send
            ServiceDiscoveryReq | ServiceDiscoveryRes | AuthHandshakeReq | AuthHandshakeRes
            | AuthKeyExchangeReq | AuthKeyExchangeRes | AuthRegisterRes | AuthLoginRes
            | AuthLogoutRes | AuthPasswordResetRes | SessionValidateRes | SessionInfoRes
            | UserGetProfileRes | UserUpdateProfileRes | UserSearchRes | UserStatusUpdateRes
            | UserOnlineListRes | UserAvatarGetRes | UserAvatarSetRes | ChatCreateRes
            | ChatListRes | ChatJoinRes | ChatLeaveRes | ChatInfoRes | ChatUpdateRes
            | ChatDeleteRes | ChatAddParticipantRes | ChatRemoveParticipantRes
            | MessageSendRes | MessageReceive | MessageHistoryRes | MessageReadReceiptRes
            | MessageEditRes | MessageDeleteRes | ServerShutdown | Broadcast => {
                Err(ServiceError::Invalid(format!(
                    "{:?} is not a client request",
                    packet.message_type
                )))
            }

            Error => {
                warn!(remote = %ctx.remote_addr, "client sent ERROR frame, ignoring");
                Ok(None)
            }
        }
    }

    /// Deliver a stored message to the chat's other connected participants
    async fn fan_out(&self, stored: &hearth_protocol::model::Message) {
        let participants = match self.chats.participants(stored.chat_id).await {
            Ok(p) => p,
            Err(e) => {
                warn!(chat_id = %stored.chat_id, error = %e, "fan-out participant lookup failed");
                return;
            }
        };
        let payload = match payload::to_bytes(stored) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "fan-out serialize failed");
                return;
            }
        };

        let push = Packet::new(MessageType::MessageReceive, rand::random::<u64>(), payload);
        for participant in participants {
            if participant.user_id == stored.sender_id {
                continue;
            }
            let delivered = self
                .registry
                .send_to_user(participant.user_id, &push, None);
            debug!(
                chat_id = %stored.chat_id,
                recipient = %participant.user_id,
                delivered,
                "message fan-out"
            );
        }
    }

    /// Push an unsolicited frame to every participant except the origin
    async fn push_to_participants<T: Serialize>(
        &self,
        chat_id: Uuid,
        origin: Uuid,
        message_type: MessageType,
        payload_body: &T,
    ) -> ServiceResult<()> {
        let participants = self.chats.participants(chat_id).await?;
        let bytes = body(payload_body)?;
        let push = Packet::new(message_type, rand::random::<u64>(), bytes);
        for participant in participants {
            if participant.user_id != origin {
                self.registry.send_to_user(participant.user_id, &push, None);
            }
        }
        Ok(())
    }

    fn error_response(
        &self,
        ctx: &ConnectionContext,
        packet: &Packet,
        err: ServiceError,
    ) -> Packet {
        warn!(
            remote = %ctx.remote_addr,
            message_type = ?packet.message_type,
            message_id = packet.message_id,
            error = %err,
            "request failed"
        );
        let res_type = packet
            .message_type
            .response()
            .unwrap_or(MessageType::Error);
        let bytes = payload::to_bytes(&err.body()).unwrap_or_default();
        Packet::response_to(packet, res_type, bytes)
    }
}

fn parse<T: DeserializeOwned>(packet: &Packet) -> ServiceResult<T> {
    payload::from_bytes(&packet.payload).map_err(|e| ServiceError::Invalid(e.to_string()))
}

fn body<T: Serialize>(value: &T) -> ServiceResult<Bytes> {
    payload::to_bytes(value).map_err(|e| ServiceError::Internal(e.to_string()))
}
