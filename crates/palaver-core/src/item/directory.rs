//! Lobby directory and membership items: list exchange, invitations,
//! unsubscription, and the connection challenge.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{PalaverError, Result};
use crate::id::ChatLobbyId;
use crate::wire;

/// Asks connected peers which lobbies they know. Empty payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LobbyListRequestItem;

impl LobbyListRequestItem {
    pub fn encoded_len(&self) -> usize {
        0
    }

    pub fn encode_payload(&self, _buf: &mut BytesMut) -> Result<()> {
        Ok(())
    }

    pub fn decode_payload(_buf: &mut Bytes) -> Result<Self> {
        Ok(Self)
    }
}

/// One visible lobby in a list response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyDirectoryEntry {
    pub lobby_id: ChatLobbyId,
    pub name: String,
    pub topic: String,
    pub member_count: u32,
    pub flags: u32,
}

impl LobbyDirectoryEntry {
    /// Minimum encoded size: two u32 length prefixes plus the fixed
    /// fields. Used to sanity-check declared entry counts.
    const MIN_LEN: usize = 8 + 4 + 4 + 4 + 4;

    fn encoded_len(&self) -> usize {
        8 + wire::prefixed_len(self.name.len()) + wire::prefixed_len(self.topic.len()) + 4 + 4
    }

    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u64(self.lobby_id);
        wire::put_string(buf, &self.name, "lobby_entry.name")?;
        wire::put_string(buf, &self.topic, "lobby_entry.topic")?;
        buf.put_u32(self.member_count);
        buf.put_u32(self.flags);
        Ok(())
    }

    fn decode(buf: &mut Bytes) -> Result<Self> {
        let lobby_id = wire::get_u64(buf, "lobby_entry.lobby_id")?;
        let name = wire::get_string(buf, "lobby_entry.name")?;
        let topic = wire::get_string(buf, "lobby_entry.topic")?;
        let member_count = wire::get_u32(buf, "lobby_entry.member_count")?;
        let flags = wire::get_u32(buf, "lobby_entry.flags")?;
        Ok(Self {
            lobby_id,
            name,
            topic,
            member_count,
            flags,
        })
    }
}

/// Answer to a list request: the lobbies this peer can advertise.
/// No cross-entry ordering guarantee.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LobbyListItem {
    pub lobbies: Vec<LobbyDirectoryEntry>,
}

impl LobbyListItem {
    pub fn encoded_len(&self) -> usize {
        4 + self.lobbies.iter().map(|e| e.encoded_len()).sum::<usize>()
    }

    pub fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        if self.lobbies.len() > u32::MAX as usize {
            return Err(PalaverError::MalformedField("lobby_list.count".into()));
        }
        buf.put_u32(self.lobbies.len() as u32);
        for entry in &self.lobbies {
            entry.encode(buf)?;
        }
        Ok(())
    }

    pub fn decode_payload(buf: &mut Bytes) -> Result<Self> {
        let count = wire::get_u32(buf, "lobby_list.count")? as usize;
        // A count the remaining bytes cannot possibly hold is malformed,
        // not merely truncated.
        if count > buf.len() / LobbyDirectoryEntry::MIN_LEN + 1 {
            return Err(PalaverError::MalformedField(format!(
                "lobby_list.count {count} impossible for {} bytes",
                buf.len()
            )));
        }
        let mut lobbies = Vec::with_capacity(count);
        for _ in 0..count {
            lobbies.push(LobbyDirectoryEntry::decode(buf)?);
        }
        Ok(Self { lobbies })
    }
}

/// Proposes joining a lobby to a specific peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyInviteItem {
    pub lobby_id: ChatLobbyId,
    pub lobby_name: String,
    pub lobby_topic: String,
    pub lobby_flags: u32,
}

impl LobbyInviteItem {
    pub fn encoded_len(&self) -> usize {
        8 + wire::prefixed_len(self.lobby_name.len())
            + wire::prefixed_len(self.lobby_topic.len())
            + 4
    }

    pub fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u64(self.lobby_id);
        wire::put_string(buf, &self.lobby_name, "invite.name")?;
        wire::put_string(buf, &self.lobby_topic, "invite.topic")?;
        buf.put_u32(self.lobby_flags);
        Ok(())
    }

    pub fn decode_payload(buf: &mut Bytes) -> Result<Self> {
        let lobby_id = wire::get_u64(buf, "invite.lobby_id")?;
        let lobby_name = wire::get_string(buf, "invite.name")?;
        let lobby_topic = wire::get_string(buf, "invite.topic")?;
        let lobby_flags = wire::get_u32(buf, "invite.flags")?;
        Ok(Self {
            lobby_id,
            lobby_name,
            lobby_topic,
            lobby_flags,
        })
    }
}

/// Sent when leaving a lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LobbyUnsubscribeItem {
    pub lobby_id: ChatLobbyId,
}

impl LobbyUnsubscribeItem {
    pub fn encoded_len(&self) -> usize {
        8
    }

    pub fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u64(self.lobby_id);
        Ok(())
    }

    pub fn decode_payload(buf: &mut Bytes) -> Result<Self> {
        let lobby_id = wire::get_u64(buf, "unsubscribe.lobby_id")?;
        Ok(Self { lobby_id })
    }
}

/// Liveness/identity challenge exchanged before a peer is admitted to a
/// private lobby's forwarding set. The response transform rule is owned
/// by the identity collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LobbyChallengeItem {
    pub challenge_code: u64,
}

impl LobbyChallengeItem {
    pub fn encoded_len(&self) -> usize {
        8
    }

    pub fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u64(self.challenge_code);
        Ok(())
    }

    pub fn decode_payload(buf: &mut Bytes) -> Result<Self> {
        let challenge_code = wire::get_u64(buf, "challenge.code")?;
        Ok(Self { challenge_code })
    }
}
