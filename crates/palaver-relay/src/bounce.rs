//! Bouncing-object protocol: the dedup / flood / signature layer for
//! lobby-relayed items.
//!
//! Each peer forwards a given `(lobby_id, msg_id)` at most once, so the
//! overlay-wide flood terminates within the overlay diameter instead of
//! looping. Signature and staleness failures are local-only: the item is
//! dropped and nothing is sent back, so an outside observer cannot tell
//! drop reasons apart.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

use palaver_core::error::Result;
use palaver_core::id::{ChatLobbyId, ChatLobbyMsgId, PeerId};
use palaver_core::item::{
    BounceInfo, Bouncing, LobbyEventItem, LobbyEventKind, LobbyMsgItem,
};
use palaver_core::sign::{verify_detached, KeySignature};

use crate::config::BounceSection;
use crate::identity::IdentityDirectory;
use crate::membership::MembershipTable;
use crate::obs::RelayMetrics;

/// Result of ingesting a bouncing item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Accepted locally; forward to these lobby members.
    AcceptedForward { targets: Vec<PeerId> },
    /// Accepted locally; no member left to forward to.
    AcceptedNoForward,
    /// `(lobby_id, msg_id)` already seen; dropped.
    DuplicateDropped,
    /// Signature did not verify; dropped and NOT cached, so a later
    /// validly-signed copy of the same msg_id is still accepted.
    SignatureInvalid,
    /// Event older than the staleness horizon; dropped uncached.
    StaleDropped,
    /// Violates local constraints (unknown lobby, empty nick, oversized
    /// text); dropped.
    Malformed,
}

impl IngestOutcome {
    /// Metrics label.
    pub fn label(&self) -> &'static str {
        match self {
            IngestOutcome::AcceptedForward { .. } => "accepted_forward",
            IngestOutcome::AcceptedNoForward => "accepted_no_forward",
            IngestOutcome::DuplicateDropped => "duplicate",
            IngestOutcome::SignatureInvalid => "signature_invalid",
            IngestOutcome::StaleDropped => "stale",
            IngestOutcome::Malformed => "malformed",
        }
    }

    pub fn accepted(&self) -> bool {
        matches!(
            self,
            IngestOutcome::AcceptedForward { .. } | IngestOutcome::AcceptedNoForward
        )
    }
}

/// An accepted lobby message kept for threading and display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub msg_id: ChatLobbyMsgId,
    pub parent_msg_id: ChatLobbyMsgId,
    pub nick: String,
    pub text: String,
    pub send_time: u64,
}

/// Per-lobby record of already-seen ids with insertion times. Bounded by
/// both a retention window and a size cap.
#[derive(Default)]
struct SeenCache {
    entries: HashMap<ChatLobbyMsgId, Instant>,
}

impl SeenCache {
    fn contains(&self, id: ChatLobbyMsgId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Record `id`, evicting the oldest entry when at capacity.
    fn insert(&mut self, id: ChatLobbyMsgId, now: Instant, cap: usize) {
        if self.entries.len() >= cap && !self.entries.contains_key(&id) {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, t)| **t)
                .map(|(id, _)| *id)
            {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(id, now);
    }

    fn evict_older_than(&mut self, now: Instant, retention: Duration) {
        self.entries
            .retain(|_, seen| now.duration_since(*seen) <= retention);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

struct LobbyState {
    msgs_seen: SeenCache,
    events_seen: SeenCache,
    /// Accepted messages in local delivery order, bounded.
    history: VecDeque<StoredMessage>,
    /// Thread index: parent msg_id -> children, only for parents we have
    /// actually seen.
    children: HashMap<ChatLobbyMsgId, Vec<ChatLobbyMsgId>>,
    /// Next locally originated msg_id.
    next_msg_id: u64,
}

impl LobbyState {
    fn new() -> Self {
        Self {
            msgs_seen: SeenCache::default(),
            events_seen: SeenCache::default(),
            history: VecDeque::new(),
            children: HashMap::new(),
            // Random start so restarts do not trivially replay ids; 0 is
            // reserved for "no parent".
            next_msg_id: rand::random::<u64>().max(1),
        }
    }

    fn alloc_msg_id(&mut self) -> ChatLobbyMsgId {
        let id = self.next_msg_id;
        self.next_msg_id = self.next_msg_id.wrapping_add(1).max(1);
        id
    }
}

/// Seconds since the unix epoch; 0 on a clock before 1970.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// The bounce protocol instance of this node.
///
/// Per-lobby state sits behind a `Mutex` inside the map: every ingest or
/// eviction for one lobby is a serialized critical section, so two peers
/// racing the same msg_id deterministically produce one accept and one
/// duplicate. Different lobbies proceed concurrently.
pub struct BounceProtocol {
    retention: Duration,
    cache_cap: usize,
    event_horizon_secs: u64,
    max_message_bytes: usize,
    history_depth: usize,

    identity: Arc<dyn IdentityDirectory>,
    membership: Arc<MembershipTable>,
    metrics: Arc<RelayMetrics>,

    lobbies: DashMap<ChatLobbyId, Mutex<LobbyState>>,
}

impl BounceProtocol {
    pub fn new(
        cfg: &BounceSection,
        identity: Arc<dyn IdentityDirectory>,
        membership: Arc<MembershipTable>,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            retention: Duration::from_secs(cfg.dedup_retention_secs),
            cache_cap: cfg.dedup_max_entries,
            event_horizon_secs: cfg.event_horizon_secs,
            max_message_bytes: cfg.max_message_bytes,
            history_depth: cfg.history_depth,
            identity,
            membership,
            metrics,
            lobbies: DashMap::new(),
        }
    }

    /// Start serving a lobby. Idempotent.
    pub fn join_lobby(&self, lobby: ChatLobbyId) {
        self.lobbies
            .entry(lobby)
            .or_insert_with(|| Mutex::new(LobbyState::new()));
    }

    /// Stop serving a lobby; drops its caches and history.
    pub fn leave_lobby(&self, lobby: ChatLobbyId) {
        self.lobbies.remove(&lobby);
    }

    pub fn serves_lobby(&self, lobby: ChatLobbyId) -> bool {
        self.lobbies.contains_key(&lobby)
    }

    /// Ingest a lobby message arriving from `from` (None = local user).
    pub fn ingest_msg(&self, item: &LobbyMsgItem, from: Option<PeerId>) -> IngestOutcome {
        self.ingest_msg_at(item, from, Instant::now())
    }

    pub fn ingest_msg_at(
        &self,
        item: &LobbyMsgItem,
        from: Option<PeerId>,
        now: Instant,
    ) -> IngestOutcome {
        let outcome = self.ingest_msg_inner(item, from, now);
        self.metrics.ingest.inc(&[("outcome", outcome.label())]);
        outcome
    }

    fn ingest_msg_inner(
        &self,
        item: &LobbyMsgItem,
        from: Option<PeerId>,
        now: Instant,
    ) -> IngestOutcome {
        let bounce = item.bounce();
        if item.message.len() > self.max_message_bytes {
            tracing::debug!(lobby = bounce.lobby_id, "oversized lobby message dropped");
            return IngestOutcome::Malformed;
        }

        let Some(state) = self.lobbies.get(&bounce.lobby_id) else {
            tracing::debug!(lobby = bounce.lobby_id, "message for unserved lobby dropped");
            return IngestOutcome::Malformed;
        };
        let Ok(mut state) = state.lock() else {
            return IngestOutcome::Malformed;
        };

        if let Some(outcome) = self.bounce_gate(&mut state.msgs_seen, item, bounce) {
            return outcome;
        }

        // Accepted: record, link threading, compute forward set.
        state.msgs_seen.insert(bounce.msg_id, now, self.cache_cap);
        if item.parent_msg_id != 0 && state.msgs_seen.contains(item.parent_msg_id) {
            state
                .children
                .entry(item.parent_msg_id)
                .or_default()
                .push(bounce.msg_id);
        }
        state.history.push_back(StoredMessage {
            msg_id: bounce.msg_id,
            parent_msg_id: item.parent_msg_id,
            nick: bounce.nick.clone(),
            text: item.message.clone(),
            send_time: item.send_time,
        });
        while state.history.len() > self.history_depth {
            if let Some(dropped) = state.history.pop_front() {
                state.children.remove(&dropped.msg_id);
            }
        }
        drop(state);

        self.forward_outcome(bounce.lobby_id, from)
    }

    /// Ingest a lobby event arriving from `from` (None = local user).
    pub fn ingest_event(&self, item: &LobbyEventItem, from: Option<PeerId>) -> IngestOutcome {
        self.ingest_event_at(item, from, unix_now(), Instant::now())
    }

    pub fn ingest_event_at(
        &self,
        item: &LobbyEventItem,
        from: Option<PeerId>,
        now_unix: u64,
        now: Instant,
    ) -> IngestOutcome {
        let outcome = self.ingest_event_inner(item, from, now_unix, now);
        self.metrics.ingest.inc(&[("outcome", outcome.label())]);
        outcome
    }

    fn ingest_event_inner(
        &self,
        item: &LobbyEventItem,
        from: Option<PeerId>,
        now_unix: u64,
        now: Instant,
    ) -> IngestOutcome {
        let bounce = item.bounce();
        let Some(state) = self.lobbies.get(&bounce.lobby_id) else {
            tracing::debug!(lobby = bounce.lobby_id, "event for unserved lobby dropped");
            return IngestOutcome::Malformed;
        };
        let Ok(mut state) = state.lock() else {
            return IngestOutcome::Malformed;
        };

        if let Some(outcome) = self.bounce_gate(&mut state.events_seen, item, bounce) {
            return outcome;
        }

        // Staleness gate, independent of the dedup cache: old looping
        // events are dropped uncached.
        if item.send_time.saturating_add(self.event_horizon_secs) < now_unix {
            tracing::debug!(
                lobby = bounce.lobby_id,
                msg_id = bounce.msg_id,
                "stale lobby event dropped"
            );
            return IngestOutcome::StaleDropped;
        }

        state.events_seen.insert(bounce.msg_id, now, self.cache_cap);
        drop(state);

        self.forward_outcome(bounce.lobby_id, from)
    }

    /// Shared gate: nick sanity, duplicate check, signature check.
    /// Returns the dropping outcome, or None to continue.
    fn bounce_gate(
        &self,
        seen: &mut SeenCache,
        item: &dyn Bouncing,
        bounce: &BounceInfo,
    ) -> Option<IngestOutcome> {
        if bounce.nick.is_empty() {
            tracing::debug!(lobby = bounce.lobby_id, "bouncing item without nick dropped");
            return Some(IngestOutcome::Malformed);
        }

        if seen.contains(bounce.msg_id) {
            return Some(IngestOutcome::DuplicateDropped);
        }

        // Invalid signatures are dropped but never cached as seen:
        // otherwise an adversary could broadcast a junk copy of a
        // legitimate msg_id first and suppress the real one.
        let Ok(signed) = item.signed_bytes() else {
            return Some(IngestOutcome::Malformed);
        };
        let Some(key) = self.identity.verifying_key(&bounce.signature.signer) else {
            tracing::debug!(
                lobby = bounce.lobby_id,
                signer = %bounce.signature.signer,
                "bouncing item from unknown signer dropped"
            );
            return Some(IngestOutcome::SignatureInvalid);
        };
        if !verify_detached(&key, &signed, &bounce.signature) {
            tracing::debug!(
                lobby = bounce.lobby_id,
                msg_id = bounce.msg_id,
                "bouncing item with invalid signature dropped"
            );
            return Some(IngestOutcome::SignatureInvalid);
        }
        None
    }

    fn forward_outcome(&self, lobby: ChatLobbyId, from: Option<PeerId>) -> IngestOutcome {
        let targets = self.membership.forwarding_peers(lobby, from.as_ref());
        if targets.is_empty() {
            IngestOutcome::AcceptedNoForward
        } else {
            IngestOutcome::AcceptedForward { targets }
        }
    }

    /// Originate a lobby message from the local user: allocate a msg_id,
    /// sign the canonical range, self-ingest. The returned item is ready
    /// to encode and fan out to the returned targets.
    pub fn send_message(
        &self,
        lobby: ChatLobbyId,
        text: &str,
        parent: ChatLobbyMsgId,
        flags: u32,
    ) -> Result<(LobbyMsgItem, IngestOutcome)> {
        let msg_id = self.alloc_msg_id(lobby)?;
        let mut item = LobbyMsgItem {
            bounce: BounceInfo {
                lobby_id: lobby,
                msg_id,
                nick: self.identity.local_nick(),
                signature: KeySignature {
                    signer: self.identity.local_signer(),
                    bytes: vec![],
                },
            },
            parent_msg_id: parent,
            flags,
            send_time: unix_now(),
            message: text.to_owned(),
        };
        item.bounce.signature = self.identity.sign(&item.signed_bytes()?)?;
        let outcome = self.ingest_msg(&item, None);
        Ok((item, outcome))
    }

    /// Originate a lobby event from the local user.
    pub fn send_event(
        &self,
        lobby: ChatLobbyId,
        event: LobbyEventKind,
        detail: &str,
    ) -> Result<(LobbyEventItem, IngestOutcome)> {
        let msg_id = self.alloc_msg_id(lobby)?;
        let mut item = LobbyEventItem {
            bounce: BounceInfo {
                lobby_id: lobby,
                msg_id,
                nick: self.identity.local_nick(),
                signature: KeySignature {
                    signer: self.identity.local_signer(),
                    bytes: vec![],
                },
            },
            event,
            detail: detail.to_owned(),
            send_time: unix_now(),
        };
        item.bounce.signature = self.identity.sign(&item.signed_bytes()?)?;
        let outcome = self.ingest_event(&item, None);
        Ok((item, outcome))
    }

    fn alloc_msg_id(&self, lobby: ChatLobbyId) -> Result<ChatLobbyMsgId> {
        let state = self.lobbies.get(&lobby).ok_or_else(|| {
            palaver_core::PalaverError::Internal(format!("not serving lobby {lobby:#x}"))
        })?;
        let mut state = state
            .lock()
            .map_err(|_| palaver_core::PalaverError::Internal("lobby lock poisoned".into()))?;
        Ok(state.alloc_msg_id())
    }

    /// Drop dedup entries older than the retention window, all lobbies.
    pub fn evict(&self, now: Instant) {
        for entry in self.lobbies.iter() {
            if let Ok(mut state) = entry.value().lock() {
                state.msgs_seen.evict_older_than(now, self.retention);
                state.events_seen.evict_older_than(now, self.retention);
            }
        }
    }

    /// Whether a message id is currently in the dedup cache.
    pub fn msg_seen(&self, lobby: ChatLobbyId, msg_id: ChatLobbyMsgId) -> bool {
        self.lobbies
            .get(&lobby)
            .and_then(|s| s.lock().ok().map(|g| g.msgs_seen.contains(msg_id)))
            .unwrap_or(false)
    }

    /// Children linked under `msg_id` for threaded display.
    pub fn thread_children(
        &self,
        lobby: ChatLobbyId,
        msg_id: ChatLobbyMsgId,
    ) -> Vec<ChatLobbyMsgId> {
        self.lobbies
            .get(&lobby)
            .and_then(|s| {
                s.lock()
                    .ok()
                    .map(|g| g.children.get(&msg_id).cloned().unwrap_or_default())
            })
            .unwrap_or_default()
    }

    /// Accepted messages in local delivery order.
    pub fn history(&self, lobby: ChatLobbyId) -> Vec<StoredMessage> {
        self.lobbies
            .get(&lobby)
            .and_then(|s| s.lock().ok().map(|g| g.history.iter().cloned().collect()))
            .unwrap_or_default()
    }

    /// Dedup cache sizes, for maintenance logging.
    pub fn cache_sizes(&self, lobby: ChatLobbyId) -> Option<(usize, usize)> {
        self.lobbies
            .get(&lobby)
            .and_then(|s| s.lock().ok().map(|g| (g.msgs_seen.len(), g.events_seen.len())))
    }

    /// Lobbies currently served.
    pub fn lobby_ids(&self) -> HashSet<ChatLobbyId> {
        self.lobbies.iter().map(|e| *e.key()).collect()
    }
}
