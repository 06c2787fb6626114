//! Decode registry: maps `(service_id, subtype)` to a payload decoder so
//! an incoming frame can be reconstructed without prior knowledge of its
//! concrete type.
//!
//! Registration is a startup-time side effect: build the registry once
//! (or take [`ItemRegistry::global`]), then treat it as read-only.

use std::collections::HashMap;
use std::sync::OnceLock;

use bytes::{Buf, Bytes};

use crate::error::{PalaverError, Result};
use crate::item::{self, subtype, ChatItem, ItemHeader, CHAT_SERVICE};

/// Payload decoder for one concrete item type.
pub type DecodeFn = fn(&mut Bytes) -> Result<ChatItem>;

/// Immutable-after-init map from `(service_id, subtype)` to decoder.
pub struct ItemRegistry {
    decoders: HashMap<(u16, u8), DecodeFn>,
}

impl ItemRegistry {
    /// Empty registry. Useful for tests and foreign services.
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Registry with every live chat subtype installed.
    pub fn with_chat_items() -> Self {
        let mut reg = Self::new();
        // Duplicate registration of built-ins cannot happen; drop the
        // Result rather than propagate an impossible error.
        let _ = reg.register_chat(subtype::CHAT_MSG, |b| {
            item::ChatMsgItem::decode_payload(b).map(ChatItem::Msg)
        });
        let _ = reg.register_chat(subtype::CHAT_STATUS, |b| {
            item::ChatStatusItem::decode_payload(b).map(ChatItem::Status)
        });
        let _ = reg.register_chat(subtype::CHAT_AVATAR, |b| {
            item::ChatAvatarItem::decode_payload(b).map(ChatItem::Avatar)
        });
        let _ = reg.register_chat(subtype::PRIVATE_MSG_CONFIG, |b| {
            item::PrivateChatMsgConfigItem::decode_payload(b).map(ChatItem::PrivateMsgConfig)
        });
        let _ = reg.register_chat(subtype::LOBBY_CHALLENGE, |b| {
            item::LobbyChallengeItem::decode_payload(b).map(ChatItem::LobbyChallenge)
        });
        let _ = reg.register_chat(subtype::LOBBY_UNSUBSCRIBE, |b| {
            item::LobbyUnsubscribeItem::decode_payload(b).map(ChatItem::LobbyUnsubscribe)
        });
        let _ = reg.register_chat(subtype::LOBBY_LIST_REQUEST, |b| {
            item::LobbyListRequestItem::decode_payload(b).map(ChatItem::LobbyListRequest)
        });
        let _ = reg.register_chat(subtype::LOBBY_LIST, |b| {
            item::LobbyListItem::decode_payload(b).map(ChatItem::LobbyList)
        });
        let _ = reg.register_chat(subtype::LOBBY_SIGNED_MSG, |b| {
            item::LobbyMsgItem::decode_payload(b).map(ChatItem::LobbyMsg)
        });
        let _ = reg.register_chat(subtype::LOBBY_SIGNED_EVENT, |b| {
            item::LobbyEventItem::decode_payload(b).map(ChatItem::LobbyEvent)
        });
        let _ = reg.register_chat(subtype::LOBBY_INVITE, |b| {
            item::LobbyInviteItem::decode_payload(b).map(ChatItem::LobbyInvite)
        });
        let _ = reg.register_chat(subtype::LOBBY_CONFIG, |b| {
            item::LobbyConfigItem::decode_payload(b).map(ChatItem::LobbyConfig)
        });
        let _ = reg.register_chat(subtype::DISTANT_DH_PUBLIC_KEY, |b| {
            item::DhPublicKeyItem::decode_payload(b).map(ChatItem::DhPublicKey)
        });
        reg
    }

    /// Process-wide registry, initialized on first use.
    pub fn global() -> &'static ItemRegistry {
        static GLOBAL: OnceLock<ItemRegistry> = OnceLock::new();
        GLOBAL.get_or_init(ItemRegistry::with_chat_items)
    }

    /// Install a decoder. Refuses duplicates and reserved subtypes.
    pub fn register(&mut self, service: u16, sub: u8, f: DecodeFn) -> Result<()> {
        if service == CHAT_SERVICE && subtype::DEPRECATED.contains(&sub) {
            return Err(PalaverError::Internal(format!(
                "subtype {sub:#04x} is reserved"
            )));
        }
        if self.decoders.insert((service, sub), f).is_some() {
            return Err(PalaverError::Internal(format!(
                "duplicate decoder for ({service:#06x}, {sub:#04x})"
            )));
        }
        Ok(())
    }

    fn register_chat(&mut self, sub: u8, f: DecodeFn) -> Result<()> {
        self.register(CHAT_SERVICE, sub, f)
    }

    /// True if any decoder is registered for `service`.
    fn knows_service(&self, service: u16) -> bool {
        self.decoders.keys().any(|(s, _)| *s == service)
    }

    /// Decode a full frame into a typed item.
    ///
    /// Unknown trailing payload bytes (from a newer item version that
    /// appended fields) are ignored; a payload shorter than the decoder
    /// needs is `Truncated`.
    pub fn decode(&self, mut frame: Bytes) -> Result<ChatItem> {
        let header = ItemHeader::decode(&mut frame)?;
        let declared = header.payload_len as usize;
        if frame.remaining() < declared {
            return Err(PalaverError::Truncated(format!(
                "payload declares {declared} bytes, {} available",
                frame.remaining()
            )));
        }
        let mut payload = frame.split_to(declared);

        let decoder = match self.decoders.get(&(header.service, header.subtype)) {
            Some(f) => f,
            None => {
                if header.service == CHAT_SERVICE
                    && subtype::DEPRECATED.contains(&header.subtype)
                {
                    // Best-effort defensive handling: the bytes were
                    // length-validated above and are discarded unused.
                    tracing::debug!(
                        subtype = header.subtype,
                        "rejecting deprecated chat subtype"
                    );
                    return Err(PalaverError::UnknownSubtype(header.subtype));
                }
                if !self.knows_service(header.service) {
                    return Err(PalaverError::UnknownService(header.service));
                }
                return Err(PalaverError::UnknownSubtype(header.subtype));
            }
        };

        let decoded = decoder(&mut payload)?;
        if payload.has_remaining() {
            tracing::trace!(
                subtype = header.subtype,
                extra = payload.remaining(),
                "ignoring trailing payload bytes"
            );
        }
        Ok(decoded)
    }
}

impl Default for ItemRegistry {
    fn default() -> Self {
        Self::new()
    }
}
