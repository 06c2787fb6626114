//! Lobby directory and per-peer membership state machine.
//!
//! Per (lobby, peer) the state moves
//! `Unknown → ChallengeSent → Verified → Forwarding`, or
//! `Unknown → Rejected` (terminal). Only peers in `Forwarding` receive
//! bounced traffic. The challenge transform rule is owned by the
//! identity collaborator; this table only drives the state machine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use palaver_core::error::{PalaverError, Result};
use palaver_core::id::{ChatLobbyId, PeerId};
use palaver_core::item::{LobbyChallengeItem, LobbyDirectoryEntry, LobbyInviteItem, LobbyListItem};

use crate::identity::IdentityDirectory;

/// An issued challenge nobody answered within this window is dead; late
/// answers are rejected.
const CHALLENGE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipState {
    Unknown,
    ChallengeSent,
    Verified,
    Forwarding,
    Rejected,
}

#[derive(Debug)]
struct PeerMembership {
    state: MembershipState,
    /// Code of the challenge we issued, while in `ChallengeSent`.
    challenge: Option<u64>,
    since: Instant,
}

#[derive(Default)]
struct LobbyMembers {
    peers: HashMap<PeerId, PeerMembership>,
}

/// What to do with an incoming challenge code.
#[derive(Debug, PartialEq, Eq)]
pub enum ChallengeDisposition {
    /// The code answered a challenge we issued; the peer is now verified
    /// for `lobby`.
    Answered { lobby: ChatLobbyId },
    /// The code is a fresh challenge addressed to us; send the reply.
    Reply(LobbyChallengeItem),
    /// The code matched nothing; the peer is rejected where it was
    /// pending.
    Rejected,
}

/// Directory of visible lobbies plus per-lobby membership tables.
///
/// Lock discipline: at most one lobby's member table is held at a time;
/// different lobbies are independent.
pub struct MembershipTable {
    identity: Arc<dyn IdentityDirectory>,
    lobbies: DashMap<ChatLobbyId, Mutex<LobbyMembers>>,
    visible: DashMap<ChatLobbyId, LobbyDirectoryEntry>,
    invites: DashMap<ChatLobbyId, LobbyInviteItem>,
}

impl MembershipTable {
    pub fn new(identity: Arc<dyn IdentityDirectory>) -> Self {
        Self {
            identity,
            lobbies: DashMap::new(),
            visible: DashMap::new(),
            invites: DashMap::new(),
        }
    }

    /// Register a lobby we serve and can advertise.
    pub fn announce_lobby(&self, entry: LobbyDirectoryEntry) {
        self.lobbies
            .entry(entry.lobby_id)
            .or_insert_with(|| Mutex::new(LobbyMembers::default()));
        self.visible.insert(entry.lobby_id, entry);
    }

    pub fn remove_lobby(&self, lobby: ChatLobbyId) {
        self.lobbies.remove(&lobby);
        self.visible.remove(&lobby);
    }

    pub fn serves_lobby(&self, lobby: ChatLobbyId) -> bool {
        self.lobbies.contains_key(&lobby)
    }

    /// Answer to a list request: everything we can advertise.
    pub fn list_response(&self) -> LobbyListItem {
        LobbyListItem {
            lobbies: self.visible.iter().map(|e| e.value().clone()).collect(),
        }
    }

    /// Merge a peer's list response into the known directory. Duplicate
    /// reconciliation across peers is presentation-level and external;
    /// latest entry wins here.
    pub fn merge_directory(&self, list: &LobbyListItem) {
        for entry in &list.lobbies {
            self.visible.insert(entry.lobby_id, entry.clone());
        }
    }

    pub fn known_lobbies(&self) -> Vec<LobbyDirectoryEntry> {
        self.visible.iter().map(|e| e.value().clone()).collect()
    }

    /// Record an invitation. Joining is a local decision.
    pub fn record_invite(&self, invite: LobbyInviteItem) {
        self.invites.insert(invite.lobby_id, invite);
    }

    pub fn pending_invites(&self) -> Vec<LobbyInviteItem> {
        self.invites.iter().map(|e| e.value().clone()).collect()
    }

    /// Accept a recorded invitation: the lobby becomes served/visible.
    pub fn accept_invite(&self, lobby: ChatLobbyId) -> Option<LobbyDirectoryEntry> {
        let (_, invite) = self.invites.remove(&lobby)?;
        let entry = LobbyDirectoryEntry {
            lobby_id: invite.lobby_id,
            name: invite.lobby_name,
            topic: invite.lobby_topic,
            member_count: 0,
            flags: invite.lobby_flags,
        };
        self.announce_lobby(entry.clone());
        Some(entry)
    }

    /// Issue a connection challenge to a peer wanting lobby traffic.
    pub fn begin_challenge(
        &self,
        lobby: ChatLobbyId,
        peer: PeerId,
    ) -> Result<LobbyChallengeItem> {
        let members = self
            .lobbies
            .get(&lobby)
            .ok_or_else(|| PalaverError::Internal(format!("unknown lobby {lobby:#x}")))?;
        let mut guard = members
            .lock()
            .map_err(|_| PalaverError::Internal("membership lock poisoned".into()))?;

        let code: u64 = rand::random();
        guard.peers.insert(
            peer,
            PeerMembership {
                state: MembershipState::ChallengeSent,
                challenge: Some(code),
                since: Instant::now(),
            },
        );
        Ok(LobbyChallengeItem {
            challenge_code: code,
        })
    }

    /// Route an incoming challenge code from `peer`.
    ///
    /// If we issued a challenge to this peer, the code is treated as its
    /// answer; otherwise it is a challenge to us and we produce a reply.
    pub fn on_challenge_code(&self, peer: PeerId, code: u64) -> ChallengeDisposition {
        let mut pending_lobby: Option<ChatLobbyId> = None;
        for entry in self.lobbies.iter() {
            let Ok(guard) = entry.value().lock() else {
                continue;
            };
            if let Some(m) = guard.peers.get(&peer) {
                if m.state == MembershipState::ChallengeSent {
                    pending_lobby = Some(*entry.key());
                    break;
                }
            }
        }

        let Some(lobby) = pending_lobby else {
            return ChallengeDisposition::Reply(LobbyChallengeItem {
                challenge_code: self.identity.answer_challenge(code),
            });
        };

        let Some(members) = self.lobbies.get(&lobby) else {
            return ChallengeDisposition::Rejected;
        };
        let Ok(mut guard) = members.lock() else {
            return ChallengeDisposition::Rejected;
        };
        let Some(m) = guard.peers.get_mut(&peer) else {
            return ChallengeDisposition::Rejected;
        };

        let issued = m.challenge.take();
        let in_time = m.since.elapsed() <= CHALLENGE_TTL;
        if in_time && issued.is_some_and(|c| self.identity.check_challenge(&peer, c, code)) {
            m.state = MembershipState::Verified;
            m.since = Instant::now();
            ChallengeDisposition::Answered { lobby }
        } else {
            m.state = MembershipState::Rejected;
            ChallengeDisposition::Rejected
        }
    }

    /// Admit a verified peer into the forwarding set.
    pub fn promote_forwarding(&self, lobby: ChatLobbyId, peer: PeerId) -> Result<()> {
        let members = self
            .lobbies
            .get(&lobby)
            .ok_or_else(|| PalaverError::Internal(format!("unknown lobby {lobby:#x}")))?;
        let mut guard = members
            .lock()
            .map_err(|_| PalaverError::Internal("membership lock poisoned".into()))?;
        match guard.peers.get_mut(&peer) {
            Some(m) if m.state == MembershipState::Verified => {
                m.state = MembershipState::Forwarding;
                m.since = Instant::now();
                Ok(())
            }
            Some(m) => Err(PalaverError::Internal(format!(
                "peer {peer} not verified (state {:?})",
                m.state
            ))),
            None => Err(PalaverError::Internal(format!("peer {peer} unknown"))),
        }
    }

    /// Current state, `Unknown` when never seen.
    pub fn state_of(&self, lobby: ChatLobbyId, peer: &PeerId) -> MembershipState {
        let Some(members) = self.lobbies.get(&lobby) else {
            return MembershipState::Unknown;
        };
        let Ok(guard) = members.lock() else {
            return MembershipState::Unknown;
        };
        guard
            .peers
            .get(peer)
            .map(|m| m.state)
            .unwrap_or(MembershipState::Unknown)
    }

    /// Peers that receive bounced traffic for `lobby`, excluding
    /// `except` (the peer an item arrived from).
    pub fn forwarding_peers(&self, lobby: ChatLobbyId, except: Option<&PeerId>) -> Vec<PeerId> {
        let Some(members) = self.lobbies.get(&lobby) else {
            return vec![];
        };
        let Ok(guard) = members.lock() else {
            return vec![];
        };
        let mut out: Vec<PeerId> = guard
            .peers
            .iter()
            .filter(|&(p, m)| m.state == MembershipState::Forwarding && Some(*p) != except.copied())
            .map(|(p, _)| *p)
            .collect();
        out.sort();
        out
    }

    /// A peer left the lobby (or disconnected).
    pub fn handle_unsubscribe(&self, lobby: ChatLobbyId, peer: &PeerId) {
        if let Some(members) = self.lobbies.get(&lobby) {
            if let Ok(mut guard) = members.lock() {
                guard.peers.remove(peer);
            }
        }
    }

    pub fn member_count(&self, lobby: ChatLobbyId) -> usize {
        self.lobbies
            .get(&lobby)
            .and_then(|m| m.lock().ok().map(|g| g.peers.len()))
            .unwrap_or(0)
    }
}
