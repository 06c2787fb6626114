//! Lobby bouncing objects: signed messages and events relayed across the
//! overlay.
//!
//! A bouncing object carries the info to relay an item throughout a
//! lobby while the dedup cache prevents duplicates. The original design
//! expressed this as a second base class; here the shared fields live in
//! [`BounceInfo`] (composition) and the relay behavior is the
//! [`Bouncing`] capability implemented by both concrete items.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{PalaverError, Result};
use crate::id::{ChatLobbyId, ChatLobbyMsgId};
use crate::sign::KeySignature;
use crate::wire;

/// Fields shared by every lobby-bounced item.
///
/// The signature is always the last field of the payload; the canonical
/// signing range is the serialized payload truncated right before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BounceInfo {
    pub lobby_id: ChatLobbyId,
    pub msg_id: ChatLobbyMsgId,
    /// Claimed sender display name.
    pub nick: String,
    pub signature: KeySignature,
}

impl BounceInfo {
    fn head_len(&self) -> usize {
        8 + 8 + wire::prefixed_len(self.nick.len())
    }

    fn encode_head(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u64(self.lobby_id);
        buf.put_u64(self.msg_id);
        wire::put_string(buf, &self.nick, "bounce.nick")
    }

    fn decode_head(buf: &mut Bytes) -> Result<(ChatLobbyId, ChatLobbyMsgId, String)> {
        let lobby_id = wire::get_u64(buf, "bounce.lobby_id")?;
        let msg_id = wire::get_u64(buf, "bounce.msg_id")?;
        let nick = wire::get_string(buf, "bounce.nick")?;
        Ok((lobby_id, msg_id, nick))
    }
}

/// Capability of items that are relayed ("bounced") through a lobby.
pub trait Bouncing {
    fn bounce(&self) -> &BounceInfo;
    fn bounce_mut(&mut self) -> &mut BounceInfo;

    /// Canonical signing range: the serialized payload excluding the
    /// signature field. Verification must re-derive exactly these bytes.
    fn signed_bytes(&self) -> Result<Bytes>;
}

/// A chat message bounced through a lobby.
///
/// `parent_msg_id` references another `msg_id` in the same lobby for
/// threaded display, or 0 for root messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyMsgItem {
    pub bounce: BounceInfo,
    pub parent_msg_id: ChatLobbyMsgId,
    pub flags: u32,
    pub send_time: u64,
    pub message: String,
}

impl LobbyMsgItem {
    pub fn encoded_len(&self) -> usize {
        self.signed_len() + self.bounce.signature.encoded_len()
    }

    fn signed_len(&self) -> usize {
        self.bounce.head_len() + 8 + 4 + 8 + wire::prefixed_len(self.message.len())
    }

    fn encode_signed(&self, buf: &mut BytesMut) -> Result<()> {
        self.bounce.encode_head(buf)?;
        buf.put_u64(self.parent_msg_id);
        buf.put_u32(self.flags);
        buf.put_u64(self.send_time);
        wire::put_string(buf, &self.message, "lobby_msg.message")
    }

    pub fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        self.encode_signed(buf)?;
        self.bounce.signature.encode(buf)
    }

    pub fn decode_payload(buf: &mut Bytes) -> Result<Self> {
        let (lobby_id, msg_id, nick) = BounceInfo::decode_head(buf)?;
        let parent_msg_id = wire::get_u64(buf, "lobby_msg.parent_msg_id")?;
        let flags = wire::get_u32(buf, "lobby_msg.flags")?;
        let send_time = wire::get_u64(buf, "lobby_msg.send_time")?;
        let message = wire::get_string(buf, "lobby_msg.message")?;
        let signature = KeySignature::decode(buf)?;
        Ok(Self {
            bounce: BounceInfo {
                lobby_id,
                msg_id,
                nick,
                signature,
            },
            parent_msg_id,
            flags,
            send_time,
            message,
        })
    }
}

impl Bouncing for LobbyMsgItem {
    fn bounce(&self) -> &BounceInfo {
        &self.bounce
    }

    fn bounce_mut(&mut self) -> &mut BounceInfo {
        &mut self.bounce
    }

    fn signed_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.signed_len());
        self.encode_signed(&mut buf)?;
        Ok(buf.freeze())
    }
}

/// Lobby event kinds. The wire value is a single byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyEventKind {
    PeerJoined,
    PeerLeft,
    PeerStatus,
    PeerChangedNick,
    KeepAlive,
}

impl LobbyEventKind {
    pub fn to_wire(self) -> u8 {
        match self {
            LobbyEventKind::PeerJoined => 0x01,
            LobbyEventKind::PeerLeft => 0x02,
            LobbyEventKind::PeerStatus => 0x03,
            LobbyEventKind::PeerChangedNick => 0x04,
            LobbyEventKind::KeepAlive => 0x05,
        }
    }

    pub fn from_wire(v: u8) -> Result<Self> {
        match v {
            0x01 => Ok(LobbyEventKind::PeerJoined),
            0x02 => Ok(LobbyEventKind::PeerLeft),
            0x03 => Ok(LobbyEventKind::PeerStatus),
            0x04 => Ok(LobbyEventKind::PeerChangedNick),
            0x05 => Ok(LobbyEventKind::KeepAlive),
            other => Err(PalaverError::MalformedField(format!(
                "lobby_event.kind {other:#04x}"
            ))),
        }
    }
}

/// A lobby membership event bounced through a lobby.
///
/// `send_time` is checked against the staleness horizon to reject old
/// looping events independently of the dedup cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyEventItem {
    pub bounce: BounceInfo,
    pub event: LobbyEventKind,
    /// Free-form detail (nick for joins/leaves, status text, ...).
    pub detail: String,
    pub send_time: u64,
}

impl LobbyEventItem {
    pub fn encoded_len(&self) -> usize {
        self.signed_len() + self.bounce.signature.encoded_len()
    }

    fn signed_len(&self) -> usize {
        self.bounce.head_len() + 1 + wire::prefixed_len(self.detail.len()) + 8
    }

    fn encode_signed(&self, buf: &mut BytesMut) -> Result<()> {
        self.bounce.encode_head(buf)?;
        buf.put_u8(self.event.to_wire());
        wire::put_string(buf, &self.detail, "lobby_event.detail")?;
        buf.put_u64(self.send_time);
        Ok(())
    }

    pub fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        self.encode_signed(buf)?;
        self.bounce.signature.encode(buf)
    }

    pub fn decode_payload(buf: &mut Bytes) -> Result<Self> {
        let (lobby_id, msg_id, nick) = BounceInfo::decode_head(buf)?;
        let event = LobbyEventKind::from_wire(wire::get_u8(buf, "lobby_event.kind")?)?;
        let detail = wire::get_string(buf, "lobby_event.detail")?;
        let send_time = wire::get_u64(buf, "lobby_event.send_time")?;
        let signature = KeySignature::decode(buf)?;
        Ok(Self {
            bounce: BounceInfo {
                lobby_id,
                msg_id,
                nick,
                signature,
            },
            event,
            detail,
            send_time,
        })
    }
}

impl Bouncing for LobbyEventItem {
    fn bounce(&self) -> &BounceInfo {
        &self.bounce
    }

    fn bounce_mut(&mut self) -> &mut BounceInfo {
        &mut self.bounce
    }

    fn signed_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.signed_len());
        self.encode_signed(&mut buf)?;
        Ok(buf.freeze())
    }
}
