//! Direct (non-lobby) chat items: messages, peer status, avatars.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Result;
use crate::wire;

/// A private or public chat message exchanged directly between peers.
#[derive(Debug, Clone, Default)]
pub struct ChatMsgItem {
    pub flags: u32,
    pub send_time: u64,
    pub message: String,
    /// Local receive time. Not serialized, excluded from equality.
    pub recv_time: u64,
}

impl PartialEq for ChatMsgItem {
    fn eq(&self, other: &Self) -> bool {
        self.flags == other.flags
            && self.send_time == other.send_time
            && self.message == other.message
    }
}

impl Eq for ChatMsgItem {}

impl ChatMsgItem {
    pub fn encoded_len(&self) -> usize {
        4 + 8 + wire::prefixed_len(self.message.len())
    }

    pub fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u32(self.flags);
        buf.put_u64(self.send_time);
        wire::put_string(buf, &self.message, "msg.message")
    }

    pub fn decode_payload(buf: &mut Bytes) -> Result<Self> {
        let flags = wire::get_u32(buf, "msg.flags")?;
        let send_time = wire::get_u64(buf, "msg.send_time")?;
        let message = wire::get_string(buf, "msg.message")?;
        Ok(Self {
            flags,
            send_time,
            message,
            recv_time: 0,
        })
    }
}

/// Activity info for the sending peer: typing, idle, custom state string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatStatusItem {
    pub flags: u32,
    pub status: String,
}

impl ChatStatusItem {
    pub fn encoded_len(&self) -> usize {
        4 + wire::prefixed_len(self.status.len())
    }

    pub fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u32(self.flags);
        wire::put_string(buf, &self.status, "status.status")
    }

    pub fn decode_payload(buf: &mut Bytes) -> Result<Self> {
        let flags = wire::get_u32(buf, "status.flags")?;
        let status = wire::get_string(buf, "status.status")?;
        Ok(Self { flags, status })
    }
}

/// Opaque avatar image bytes. The image codec is external; this item only
/// moves the buffer. Move-only: the buffer has a single owner.
#[derive(Debug, PartialEq, Eq, Default)]
pub struct ChatAvatarItem {
    pub image: Bytes,
}

impl ChatAvatarItem {
    pub fn encoded_len(&self) -> usize {
        wire::prefixed_len(self.image.len())
    }

    pub fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        wire::put_bytes(buf, &self.image, "avatar.image")
    }

    pub fn decode_payload(buf: &mut Bytes) -> Result<Self> {
        let image = wire::get_bytes(buf, "avatar.image")?;
        Ok(Self { image })
    }
}
