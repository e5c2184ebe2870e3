//! Message-type enumeration
//!
//! Codes are grouped into reserved ranges: discovery (0x00xx, UDP only),
//! handshake (0x0100..0x011F), auth (0x0120..0x01FF), session (0x02xx),
//! user (0x03xx), chat (0x04xx), messaging (0x05xx), system (0xF0xx).
//! The low bit of a code is request/response parity: even = request,
//! odd = response.

use crate::ProtocolError;

/// All message types understood by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    // Discovery (UDP only)
    ServiceDiscoveryReq = 0x0001,
    ServiceDiscoveryRes = 0x0002,

    // Encryption handshake
    AuthHandshakeReq = 0x0100,
    AuthHandshakeRes = 0x0101,
    AuthKeyExchangeReq = 0x0102,
    AuthKeyExchangeRes = 0x0103,

    // Authentication
    AuthRegisterReq = 0x0120,
    AuthRegisterRes = 0x0121,
    AuthLoginReq = 0x0122,
    AuthLoginRes = 0x0123,
    AuthLogoutReq = 0x0124,
    AuthLogoutRes = 0x0125,
    AuthTokenRefresh = 0x0126,
    AuthPasswordResetReq = 0x0127,
    AuthPasswordResetRes = 0x0128,

    // Sessions
    SessionValidateReq = 0x0200,
    SessionValidateRes = 0x0201,
    SessionInfoReq = 0x0202,
    SessionInfoRes = 0x0203,
    SessionTerminate = 0x0204,

    // Users
    UserGetProfileReq = 0x0300,
    UserGetProfileRes = 0x0301,
    UserUpdateProfileReq = 0x0302,
    UserUpdateProfileRes = 0x0303,
    UserSearchReq = 0x0304,
    UserSearchRes = 0x0305,
    UserStatusUpdateReq = 0x0306,
    UserStatusUpdateRes = 0x0307,
    UserOnlineListReq = 0x0308,
    UserOnlineListRes = 0x0309,
    UserAvatarGetReq = 0x030A,
    UserAvatarGetRes = 0x030B,
    UserAvatarSetReq = 0x030C,
    UserAvatarSetRes = 0x030D,

    // Chats
    ChatCreateReq = 0x0400,
    ChatCreateRes = 0x0401,
    ChatListReq = 0x0402,
    ChatListRes = 0x0403,
    ChatJoinReq = 0x0404,
    ChatJoinRes = 0x0405,
    ChatLeaveReq = 0x0406,
    ChatLeaveRes = 0x0407,
    ChatInfoReq = 0x0408,
    ChatInfoRes = 0x0409,
    ChatUpdateReq = 0x040A,
    ChatUpdateRes = 0x040B,
    ChatDeleteReq = 0x040C,
    ChatDeleteRes = 0x040D,
    ChatAddParticipantReq = 0x040E,
    ChatAddParticipantRes = 0x040F,
    ChatRemoveParticipantReq = 0x0410,
    ChatRemoveParticipantRes = 0x0411,

    // Messaging
    MessageSendReq = 0x0500,
    MessageSendRes = 0x0501,
    /// Server-initiated delivery of a stored message to chat participants
    MessageReceive = 0x0502,
    MessageHistoryReq = 0x0504,
    MessageHistoryRes = 0x0505,
    MessageReadReceiptReq = 0x0506,
    MessageReadReceiptRes = 0x0507,
    MessageEditReq = 0x0508,
    MessageEditRes = 0x0509,
    MessageDeleteReq = 0x050A,
    MessageDeleteRes = 0x050B,
    TypingIndicator = 0x050C,

    // System
    Ping = 0xF000,
    Pong = 0xF001,
    Error = 0xF002,
    ServerShutdown = 0xF003,
    Broadcast = 0xF004,
}

impl MessageType {
    /// Raw wire code
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Request/response parity: even codes are requests
    pub const fn is_request(self) -> bool {
        self.code() & 1 == 0
    }

    /// Whether this type belongs to the handshake exemption set
    ///
    /// Frames of these types are never encrypted, even when a session key
    /// is bound: the key exchange itself has to travel in the clear (the
    /// request payload is RSA-wrapped, not GCM-encrypted).
    pub const fn is_handshake(self) -> bool {
        matches!(
            self,
            Self::AuthHandshakeReq
                | Self::AuthHandshakeRes
                | Self::AuthKeyExchangeReq
                | Self::AuthKeyExchangeRes
        )
    }

    /// Whether this request may be issued before login
    pub const fn allowed_unauthenticated(self) -> bool {
        matches!(
            self,
            Self::ServiceDiscoveryReq
                | Self::ServiceDiscoveryRes
                | Self::AuthHandshakeReq
                | Self::AuthKeyExchangeReq
                | Self::AuthRegisterReq
                | Self::AuthLoginReq
                | Self::Ping
                | Self::Pong
        )
    }

    /// The response type paired with this request, if any
    pub const fn response(self) -> Option<MessageType> {
        Some(match self {
            Self::AuthHandshakeReq => Self::AuthHandshakeRes,
            Self::AuthKeyExchangeReq => Self::AuthKeyExchangeRes,
            Self::AuthRegisterReq => Self::AuthRegisterRes,
            Self::AuthLoginReq => Self::AuthLoginRes,
            Self::AuthLogoutReq => Self::AuthLogoutRes,
            Self::AuthTokenRefresh => Self::AuthLoginRes,
            Self::AuthPasswordResetReq => Self::AuthPasswordResetRes,
            Self::SessionValidateReq => Self::SessionValidateRes,
            Self::SessionInfoReq => Self::SessionInfoRes,
            Self::UserGetProfileReq => Self::UserGetProfileRes,
            Self::UserUpdateProfileReq => Self::UserUpdateProfileRes,
            Self::UserSearchReq => Self::UserSearchRes,
            Self::UserStatusUpdateReq => Self::UserStatusUpdateRes,
            Self::UserOnlineListReq => Self::UserOnlineListRes,
            Self::UserAvatarGetReq => Self::UserAvatarGetRes,
            Self::UserAvatarSetReq => Self::UserAvatarSetRes,
            Self::ChatCreateReq => Self::ChatCreateRes,
            Self::ChatListReq => Self::ChatListRes,
            Self::ChatJoinReq => Self::ChatJoinRes,
            Self::ChatLeaveReq => Self::ChatLeaveRes,
            Self::ChatInfoReq => Self::ChatInfoRes,
            Self::ChatUpdateReq => Self::ChatUpdateRes,
            Self::ChatDeleteReq => Self::ChatDeleteRes,
            Self::ChatAddParticipantReq => Self::ChatAddParticipantRes,
            Self::ChatRemoveParticipantReq => Self::ChatRemoveParticipantRes,
            Self::MessageSendReq => Self::MessageSendRes,
            Self::MessageHistoryReq => Self::MessageHistoryRes,
            Self::MessageReadReceiptReq => Self::MessageReadReceiptRes,
            Self::MessageEditReq => Self::MessageEditRes,
            Self::MessageDeleteReq => Self::MessageDeleteRes,
            Self::Ping => Self::Pong,
            _ => return None,
        })
    }
}

impl TryFrom<u16> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, ProtocolError> {
        Ok(match value {
            0x0001 => Self::ServiceDiscoveryReq,
            0x0002 => Self::ServiceDiscoveryRes,
            0x0100 => Self::AuthHandshakeReq,
            0x0101 => Self::AuthHandshakeRes,
            0x0102 => Self::AuthKeyExchangeReq,
            0x0103 => Self::AuthKeyExchangeRes,
            0x0120 => Self::AuthRegisterReq,
            0x0121 => Self::AuthRegisterRes,
            0x0122 => Self::AuthLoginReq,
            0x0123 => Self::AuthLoginRes,
            0x0124 => Self::AuthLogoutReq,
            0x0125 => Self::AuthLogoutRes,
            0x0126 => Self::AuthTokenRefresh,
            0x0127 => Self::AuthPasswordResetReq,
            0x0128 => Self::AuthPasswordResetRes,
            0x0200 => Self::SessionValidateReq,
            0x0201 => Self::SessionValidateRes,
            0x0202 => Self::SessionInfoReq,
            0x0203 => Self::SessionInfoRes,
            0x0204 => Self::SessionTerminate,
            0x0300 => Self::UserGetProfileReq,
            0x0301 => Self::UserGetProfileRes,
            0x0302 => Self::UserUpdateProfileReq,
            0x0303 => Self::UserUpdateProfileRes,
            0x0304 => Self::UserSearchReq,
            0x0305 => Self::UserSearchRes,
            0x0306 => Self::UserStatusUpdateReq,
            0x0307 => Self::UserStatusUpdateRes,
            0x0308 => Self::UserOnlineListReq,
            0x0309 => Self::UserOnlineListRes,
            0x030A => Self::UserAvatarGetReq,
            0x030B => Self::UserAvatarGetRes,
            0x030C => Self::UserAvatarSetReq,
            0x030D => Self::UserAvatarSetRes,
            0x0400 => Self::ChatCreateReq,
            0x0401 => Self::ChatCreateRes,
            0x0402 => Self::ChatListReq,
            0x0403 => Self::ChatListRes,
            0x0404 => Self::ChatJoinReq,
            0x0405 => Self::ChatJoinRes,
            0x0406 => Self::ChatLeaveReq,
            0x0407 => Self::ChatLeaveRes,
            0x0408 => Self::ChatInfoReq,
            0x0409 => Self::ChatInfoRes,
            0x040A => Self::ChatUpdateReq,
            0x040B => Self::ChatUpdateRes,
            0x040C => Self::ChatDeleteReq,
            0x040D => Self::ChatDeleteRes,
            0x040E => Self::ChatAddParticipantReq,
            0x040F => Self::ChatAddParticipantRes,
            0x0410 => Self::ChatRemoveParticipantReq,
            0x0411 => Self::ChatRemoveParticipantRes,
            0x0500 => Self::MessageSendReq,
            0x0501 => Self::MessageSendRes,
            0x0502 => Self::MessageReceive,
            0x0504 => Self::MessageHistoryReq,
            0x0505 => Self::MessageHistoryRes,
            0x0506 => Self::MessageReadReceiptReq,
            0x0507 => Self::MessageReadReceiptRes,
            0x0508 => Self::MessageEditReq,
            0x0509 => Self::MessageEditRes,
            0x050A => Self::MessageDeleteReq,
            0x050B => Self::MessageDeleteRes,
            0x050C => Self::TypingIndicator,
            0xF000 => Self::Ping,
            0xF001 => Self::Pong,
            0xF002 => Self::Error,
            0xF003 => Self::ServerShutdown,
            0xF004 => Self::Broadcast,
            other => return Err(ProtocolError::UnknownMessageType(other)),
        })
    }
}
