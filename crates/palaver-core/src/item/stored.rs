//! Persisted configuration items. These reuse the wire encoding for
//! on-disk storage; the file layout around them is owned by the storage
//! collaborator.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Result;
use crate::id::{ChatLobbyId, PeerId};
use crate::wire;

/// A stored private chat message (incoming or outgoing history record).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateChatMsgConfigItem {
    pub peer: PeerId,
    pub flags: u32,
    pub config_flags: u32,
    pub send_time: u64,
    pub message: String,
    pub recv_time: u64,
}

impl PrivateChatMsgConfigItem {
    pub fn encoded_len(&self) -> usize {
        PeerId::LEN + 4 + 4 + 8 + wire::prefixed_len(self.message.len()) + 8
    }

    pub fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        buf.extend_from_slice(self.peer.as_bytes());
        buf.put_u32(self.flags);
        buf.put_u32(self.config_flags);
        buf.put_u64(self.send_time);
        wire::put_string(buf, &self.message, "msg_config.message")?;
        buf.put_u64(self.recv_time);
        Ok(())
    }

    pub fn decode_payload(buf: &mut Bytes) -> Result<Self> {
        let peer = PeerId::from_bytes(wire::get_array(buf, "msg_config.peer")?);
        let flags = wire::get_u32(buf, "msg_config.flags")?;
        let config_flags = wire::get_u32(buf, "msg_config.config_flags")?;
        let send_time = wire::get_u64(buf, "msg_config.send_time")?;
        let message = wire::get_string(buf, "msg_config.message")?;
        let recv_time = wire::get_u64(buf, "msg_config.recv_time")?;
        Ok(Self {
            peer,
            flags,
            config_flags,
            send_time,
            message,
            recv_time,
        })
    }
}

/// Stored per-lobby configuration flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LobbyConfigItem {
    pub lobby_id: ChatLobbyId,
    pub flags: u32,
}

impl LobbyConfigItem {
    pub fn encoded_len(&self) -> usize {
        8 + 4
    }

    pub fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u64(self.lobby_id);
        buf.put_u32(self.flags);
        Ok(())
    }

    pub fn decode_payload(buf: &mut Bytes) -> Result<Self> {
        let lobby_id = wire::get_u64(buf, "lobby_config.lobby_id")?;
        let flags = wire::get_u32(buf, "lobby_config.flags")?;
        Ok(Self { lobby_id, flags })
    }
}
