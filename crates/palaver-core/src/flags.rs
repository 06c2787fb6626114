//! Chat and lobby flag bits.
//!
//! Flags are independent bits in a single `u32` and are preserved exactly
//! on round-trip; the codec never interprets them.

/// Message concerns a private (one-to-one) conversation.
pub const CHAT_FLAG_PRIVATE: u32 = 0x0001;
/// Sender asks the peer to send its avatar.
pub const CHAT_FLAG_REQUESTS_AVATAR: u32 = 0x0002;
/// Frame is accompanied by avatar data.
pub const CHAT_FLAG_CONTAINS_AVATAR: u32 = 0x0004;
/// Sender has a new avatar available on request.
pub const CHAT_FLAG_AVATAR_AVAILABLE: u32 = 0x0008;
/// Status string carries a custom peer state.
pub const CHAT_FLAG_CUSTOM_STATE: u32 = 0x0010;
/// Message concerns a public (broadcast) conversation.
pub const CHAT_FLAG_PUBLIC: u32 = 0x0020;
/// Sender asks the peer for its custom state string.
pub const CHAT_FLAG_REQUEST_CUSTOM_STATE: u32 = 0x0040;
/// Sender has a new custom state available on request.
pub const CHAT_FLAG_CUSTOM_STATE_AVAILABLE: u32 = 0x0080;
/// Message text continues in a follow-up frame.
pub const CHAT_FLAG_PARTIAL_MESSAGE: u32 = 0x0100;
/// Message belongs to a lobby conversation.
pub const CHAT_FLAG_LOBBY: u32 = 0x0200;
/// Sender is closing a distant-chat tunnel.
pub const CHAT_FLAG_CLOSING_DISTANT: u32 = 0x0400;
/// Acknowledges a distant-chat tunnel.
pub const CHAT_FLAG_ACK_DISTANT: u32 = 0x0800;
/// Keep-alive frame, no user content.
pub const CHAT_FLAG_KEEP_ALIVE: u32 = 0x1000;
/// Connection attempt was refused by the peer.
pub const CHAT_FLAG_CONNECTION_REFUSED: u32 = 0x2000;

/// Lobby is publicly listed.
pub const LOBBY_FLAG_PUBLIC: u32 = 0x0001;
/// Lobby admits peers only after a connection challenge.
pub const LOBBY_FLAG_CHALLENGE_REQUIRED: u32 = 0x0002;
/// Lobby requires signed bouncing objects (always set by this node).
pub const LOBBY_FLAG_SIGNED_ONLY: u32 = 0x0004;

/// Stored private message was incoming (vs. sent by us).
pub const MSG_CONFIG_FLAG_INCOMING: u32 = 0x0001;
