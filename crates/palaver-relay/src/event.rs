//! Application-facing events.
//!
//! The relay pushes accepted traffic onto a bounded queue for the UI /
//! embedding application to drain; a full queue drops the event (the
//! protocol state is already updated, display is best-effort).

use bytes::Bytes;

use palaver_core::id::{ChatLobbyId, DistantSessionId, PeerId};
use palaver_core::item::{ChatMsgItem, ChatStatusItem, LobbyEventKind, LobbyInviteItem};

use crate::bounce::StoredMessage;

#[derive(Debug)]
pub enum ChatEvent {
    /// Direct (non-lobby) message from a connected peer.
    DirectMessage { from: PeerId, item: ChatMsgItem },
    /// Peer activity / custom-state update.
    PeerStatus { from: PeerId, item: ChatStatusItem },
    /// Avatar bytes received from a peer.
    Avatar { from: PeerId, image: Bytes },
    /// A lobby message passed the bounce gates.
    LobbyMessage {
        lobby: ChatLobbyId,
        msg: StoredMessage,
    },
    /// A lobby event passed the bounce gates.
    LobbyEvent {
        lobby: ChatLobbyId,
        kind: LobbyEventKind,
        nick: String,
        detail: String,
    },
    /// A peer proposed a lobby to us.
    LobbyInvited { from: PeerId, invite: LobbyInviteItem },
    /// The known-lobby directory changed.
    DirectoryUpdated { known: usize },
    /// A distant-chat session derived its shared secret; fetch it with
    /// `DhSessionManager::take_shared_secret`.
    DistantKeyReady { session: DistantSessionId },
}
