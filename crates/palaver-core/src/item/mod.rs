//! Typed wire items for the chat service.
//!
//! Every frame starts with a self-describing header
//! `(version, service_id, subtype, payload_length)` followed by the
//! subtype's field layout. The header is fixed; field layouts live with
//! their concrete types in the submodules.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{PalaverError, Result};

pub mod chat;
pub mod directory;
pub mod distant;
pub mod lobby;
pub mod stored;

pub use chat::{ChatAvatarItem, ChatMsgItem, ChatStatusItem};
pub use directory::{
    LobbyChallengeItem, LobbyDirectoryEntry, LobbyInviteItem, LobbyListItem,
    LobbyListRequestItem, LobbyUnsubscribeItem,
};
pub use distant::{DhPublicKeyItem, SignerKey};
pub use lobby::{BounceInfo, Bouncing, LobbyEventItem, LobbyEventKind, LobbyMsgItem};
pub use stored::{LobbyConfigItem, PrivateChatMsgConfigItem};

/// Service identifier of the chat subsystem.
pub const CHAT_SERVICE: u16 = 0x0C01;

/// Current item version. Decoders accept any non-zero version and ignore
/// unknown trailing payload bytes, so later versions can append fields.
pub const ITEM_VERSION: u8 = 2;

/// Fixed header size: version u8, service u16, subtype u8, payload u32.
pub const HEADER_LEN: usize = 8;

/// Subtype values. Deprecated values are reserved: no encoder can produce
/// them and the registry rejects them on decode.
pub mod subtype {
    pub const CHAT_MSG: u8 = 0x01;
    pub const CHAT_STATUS: u8 = 0x02;
    pub const CHAT_AVATAR: u8 = 0x03;
    pub const PRIVATE_MSG_CONFIG: u8 = 0x04;
    /// Unsigned lobby message. Do not use.
    pub const LOBBY_MSG_DEPRECATED: u8 = 0x05;
    /// Pre-flags lobby invite. Do not use.
    pub const LOBBY_INVITE_DEPRECATED: u8 = 0x06;
    pub const LOBBY_CHALLENGE: u8 = 0x07;
    pub const LOBBY_UNSUBSCRIBE: u8 = 0x08;
    /// Unsigned lobby event. Do not use.
    pub const LOBBY_EVENT_DEPRECATED: u8 = 0x09;
    pub const LOBBY_LIST_REQUEST: u8 = 0x0A;
    pub const LOBBY_LIST: u8 = 0x0B;
    pub const LOBBY_SIGNED_MSG: u8 = 0x0C;
    pub const LOBBY_SIGNED_EVENT: u8 = 0x0D;
    pub const LOBBY_INVITE: u8 = 0x0E;
    pub const LOBBY_CONFIG: u8 = 0x0F;
    pub const DISTANT_DH_PUBLIC_KEY: u8 = 0x10;

    /// Reserved values that must never appear in new traffic.
    pub const DEPRECATED: &[u8] = &[
        LOBBY_MSG_DEPRECATED,
        LOBBY_INVITE_DEPRECATED,
        LOBBY_EVENT_DEPRECATED,
    ];
}

/// Outbound scheduling priority. Metadata for the transport collaborator;
/// never serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    /// Interactive traffic (messages, events, handshakes).
    Interactive,
    /// Bulk transfers that may be delayed (avatars, stored config).
    Bulk,
}

/// Parsed item header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemHeader {
    pub version: u8,
    pub service: u16,
    pub subtype: u8,
    pub payload_len: u32,
}

impl ItemHeader {
    pub fn decode(buf: &mut Bytes) -> Result<Self> {
        if buf.remaining() < HEADER_LEN {
            return Err(PalaverError::Truncated("item header".into()));
        }
        let version = buf.get_u8();
        if version == 0 {
            return Err(PalaverError::MalformedField("item version 0".into()));
        }
        let service = buf.get_u16();
        let subtype = buf.get_u8();
        let payload_len = buf.get_u32();
        Ok(Self {
            version,
            service,
            subtype,
            payload_len,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.version);
        buf.put_u16(self.service);
        buf.put_u8(self.subtype);
        buf.put_u32(self.payload_len);
    }
}

/// A decoded chat item. One variant per live wire subtype.
///
/// Not `Clone`: avatar and DH key items own their raw buffers / key
/// material exclusively.
#[derive(Debug, PartialEq)]
pub enum ChatItem {
    Msg(ChatMsgItem),
    Status(ChatStatusItem),
    Avatar(ChatAvatarItem),
    PrivateMsgConfig(PrivateChatMsgConfigItem),
    LobbyChallenge(LobbyChallengeItem),
    LobbyUnsubscribe(LobbyUnsubscribeItem),
    LobbyListRequest(LobbyListRequestItem),
    LobbyList(LobbyListItem),
    LobbyMsg(LobbyMsgItem),
    LobbyEvent(LobbyEventItem),
    LobbyInvite(LobbyInviteItem),
    LobbyConfig(LobbyConfigItem),
    DhPublicKey(DhPublicKeyItem),
}

impl ChatItem {
    pub fn subtype(&self) -> u8 {
        match self {
            ChatItem::Msg(_) => subtype::CHAT_MSG,
            ChatItem::Status(_) => subtype::CHAT_STATUS,
            ChatItem::Avatar(_) => subtype::CHAT_AVATAR,
            ChatItem::PrivateMsgConfig(_) => subtype::PRIVATE_MSG_CONFIG,
            ChatItem::LobbyChallenge(_) => subtype::LOBBY_CHALLENGE,
            ChatItem::LobbyUnsubscribe(_) => subtype::LOBBY_UNSUBSCRIBE,
            ChatItem::LobbyListRequest(_) => subtype::LOBBY_LIST_REQUEST,
            ChatItem::LobbyList(_) => subtype::LOBBY_LIST,
            ChatItem::LobbyMsg(_) => subtype::LOBBY_SIGNED_MSG,
            ChatItem::LobbyEvent(_) => subtype::LOBBY_SIGNED_EVENT,
            ChatItem::LobbyInvite(_) => subtype::LOBBY_INVITE,
            ChatItem::LobbyConfig(_) => subtype::LOBBY_CONFIG,
            ChatItem::DhPublicKey(_) => subtype::DISTANT_DH_PUBLIC_KEY,
        }
    }

    pub fn priority(&self) -> Priority {
        match self {
            ChatItem::Avatar(_)
            | ChatItem::PrivateMsgConfig(_)
            | ChatItem::LobbyConfig(_) => Priority::Bulk,
            _ => Priority::Interactive,
        }
    }

    /// Exact encoded payload length; used to preallocate buffers.
    pub fn payload_len(&self) -> usize {
        match self {
            ChatItem::Msg(i) => i.encoded_len(),
            ChatItem::Status(i) => i.encoded_len(),
            ChatItem::Avatar(i) => i.encoded_len(),
            ChatItem::PrivateMsgConfig(i) => i.encoded_len(),
            ChatItem::LobbyChallenge(i) => i.encoded_len(),
            ChatItem::LobbyUnsubscribe(i) => i.encoded_len(),
            ChatItem::LobbyListRequest(i) => i.encoded_len(),
            ChatItem::LobbyList(i) => i.encoded_len(),
            ChatItem::LobbyMsg(i) => i.encoded_len(),
            ChatItem::LobbyEvent(i) => i.encoded_len(),
            ChatItem::LobbyInvite(i) => i.encoded_len(),
            ChatItem::LobbyConfig(i) => i.encoded_len(),
            ChatItem::DhPublicKey(i) => i.encoded_len(),
        }
    }

    pub fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            ChatItem::Msg(i) => i.encode_payload(buf),
            ChatItem::Status(i) => i.encode_payload(buf),
            ChatItem::Avatar(i) => i.encode_payload(buf),
            ChatItem::PrivateMsgConfig(i) => i.encode_payload(buf),
            ChatItem::LobbyChallenge(i) => i.encode_payload(buf),
            ChatItem::LobbyUnsubscribe(i) => i.encode_payload(buf),
            ChatItem::LobbyListRequest(i) => i.encode_payload(buf),
            ChatItem::LobbyList(i) => i.encode_payload(buf),
            ChatItem::LobbyMsg(i) => i.encode_payload(buf),
            ChatItem::LobbyEvent(i) => i.encode_payload(buf),
            ChatItem::LobbyInvite(i) => i.encode_payload(buf),
            ChatItem::LobbyConfig(i) => i.encode_payload(buf),
            ChatItem::DhPublicKey(i) => i.encode_payload(buf),
        }
    }
}

/// Encode a full frame: header then payload. Deterministic; the buffer is
/// preallocated to the exact frame size.
pub fn encode_item(item: &ChatItem) -> Result<Bytes> {
    let payload_len = item.payload_len();
    if payload_len > u32::MAX as usize {
        return Err(PalaverError::MalformedField("payload exceeds u32".into()));
    }
    let header = ItemHeader {
        version: ITEM_VERSION,
        service: CHAT_SERVICE,
        subtype: item.subtype(),
        payload_len: payload_len as u32,
    };
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload_len);
    header.encode(&mut buf);
    item.encode_payload(&mut buf)?;
    if buf.len() != HEADER_LEN + payload_len {
        return Err(PalaverError::Internal(format!(
            "encoded size mismatch for subtype {:#04x}: declared {}, wrote {}",
            header.subtype,
            payload_len,
            buf.len() - HEADER_LEN
        )));
    }
    Ok(buf.freeze())
}
