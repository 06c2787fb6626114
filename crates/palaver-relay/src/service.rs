//! ChatService: wires the dispatcher, the protocol components, and the
//! outbound peer queues into one relay instance.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use palaver_core::error::{PalaverError, Result};
use palaver_core::id::{ChatLobbyId, ChatLobbyMsgId, DistantSessionId, PeerId};
use palaver_core::item::{
    encode_item, subtype, ChatItem, LobbyDirectoryEntry, LobbyEventKind, LobbyInviteItem,
    LobbyListRequestItem, LobbyUnsubscribeItem, Priority,
};

use crate::bounce::{unix_now, BounceProtocol, IngestOutcome, StoredMessage};
use crate::config::RelayConfig;
use crate::dispatch::{ChatDispatcher, ItemHandler, PeerCtx};
use crate::distant::DhSessionManager;
use crate::event::ChatEvent;
use crate::identity::IdentityDirectory;
use crate::membership::{ChallengeDisposition, MembershipTable};
use crate::obs::RelayMetrics;
use crate::outbound::{OutboundFrame, PeerRegistry};

/// One relay instance: protocol state machines plus routing.
pub struct ChatService {
    dispatcher: ChatDispatcher,
    pub bounce: Arc<BounceProtocol>,
    pub membership: Arc<MembershipTable>,
    pub distant: Arc<DhSessionManager>,
    pub peers: Arc<PeerRegistry>,
    pub metrics: Arc<RelayMetrics>,

    outbound_queue: usize,
    maintenance_every: Duration,
}

impl ChatService {
    /// Build a service from validated config. Returns the service and
    /// the application event queue.
    pub fn new(
        cfg: &RelayConfig,
        identity: Arc<dyn IdentityDirectory>,
    ) -> (Arc<Self>, mpsc::Receiver<ChatEvent>) {
        let metrics = Arc::new(RelayMetrics::new());
        let membership = Arc::new(MembershipTable::new(identity.clone()));
        let bounce = Arc::new(BounceProtocol::new(
            &cfg.bounce,
            identity.clone(),
            membership.clone(),
            metrics.clone(),
        ));
        let distant = Arc::new(DhSessionManager::new(
            &cfg.distant,
            identity.clone(),
            metrics.clone(),
        ));
        let peers = Arc::new(PeerRegistry::new());
        let (events_tx, events_rx) = mpsc::channel(cfg.relay.event_queue);

        let dispatcher = ChatDispatcher::new();
        dispatcher.register(
            &[subtype::LOBBY_SIGNED_MSG, subtype::LOBBY_SIGNED_EVENT],
            Arc::new(BounceHandler {
                bounce: bounce.clone(),
                peers: peers.clone(),
                events: events_tx.clone(),
            }),
        );
        dispatcher.register(
            &[
                subtype::LOBBY_LIST_REQUEST,
                subtype::LOBBY_LIST,
                subtype::LOBBY_INVITE,
                subtype::LOBBY_UNSUBSCRIBE,
                subtype::LOBBY_CHALLENGE,
            ],
            Arc::new(DirectoryHandler {
                membership: membership.clone(),
                peers: peers.clone(),
                events: events_tx.clone(),
            }),
        );
        dispatcher.register(
            &[subtype::DISTANT_DH_PUBLIC_KEY],
            Arc::new(DistantHandler {
                distant: distant.clone(),
                peers: peers.clone(),
                events: events_tx.clone(),
            }),
        );
        dispatcher.register(
            &[subtype::CHAT_MSG, subtype::CHAT_STATUS, subtype::CHAT_AVATAR],
            Arc::new(DirectHandler { events: events_tx }),
        );

        let service = Arc::new(Self {
            dispatcher,
            bounce,
            membership,
            distant,
            peers,
            metrics,
            outbound_queue: cfg.relay.outbound_queue,
            maintenance_every: Duration::from_secs(cfg.relay.maintenance_interval_secs),
        });
        (service, events_rx)
    }

    /// Attach a connected peer; the transport drains the returned queue.
    pub fn attach_peer(&self, peer: PeerId) -> mpsc::Receiver<OutboundFrame> {
        self.peers.attach(peer, self.outbound_queue)
    }

    /// Peer disconnected: drop its queue.
    pub fn detach_peer(&self, peer: &PeerId) {
        self.peers.detach(peer);
    }

    /// Entry point for raw frames from directly connected peers.
    pub async fn handle_incoming(&self, peer: PeerId, raw: Bytes) -> Result<()> {
        self.dispatcher
            .dispatch(PeerCtx {
                peer,
                distant_session: None,
                raw,
            })
            .await
    }

    /// Entry point for frames that arrived through a distant-chat tunnel.
    pub async fn handle_incoming_distant(
        &self,
        peer: PeerId,
        session: DistantSessionId,
        raw: Bytes,
    ) -> Result<()> {
        self.dispatcher
            .dispatch(PeerCtx {
                peer,
                distant_session: Some(session),
                raw,
            })
            .await
    }

    /// Create (and serve) a lobby.
    pub fn create_lobby(&self, entry: LobbyDirectoryEntry) {
        self.bounce.join_lobby(entry.lobby_id);
        self.membership.announce_lobby(entry);
    }

    /// Originate a lobby message; forwards to the current member set.
    pub fn send_lobby_message(
        &self,
        lobby: ChatLobbyId,
        text: &str,
        parent: ChatLobbyMsgId,
        flags: u32,
    ) -> Result<IngestOutcome> {
        let (item, outcome) = self.bounce.send_message(lobby, text, parent, flags)?;
        if let IngestOutcome::AcceptedForward { targets } = &outcome {
            let frame = encode_item(&ChatItem::LobbyMsg(item))?;
            self.peers.fan_out(
                targets,
                &OutboundFrame {
                    priority: Priority::Interactive,
                    bytes: frame,
                },
            );
        }
        Ok(outcome)
    }

    /// Originate a lobby event; forwards to the current member set.
    pub fn send_lobby_event(
        &self,
        lobby: ChatLobbyId,
        event: LobbyEventKind,
        detail: &str,
    ) -> Result<IngestOutcome> {
        let (item, outcome) = self.bounce.send_event(lobby, event, detail)?;
        if let IngestOutcome::AcceptedForward { targets } = &outcome {
            let frame = encode_item(&ChatItem::LobbyEvent(item))?;
            self.peers.fan_out(
                targets,
                &OutboundFrame {
                    priority: Priority::Interactive,
                    bytes: frame,
                },
            );
        }
        Ok(outcome)
    }

    /// Invite a specific peer to one of our visible lobbies.
    pub fn invite_peer(&self, peer: PeerId, lobby: ChatLobbyId) -> Result<()> {
        let entry = self
            .membership
            .known_lobbies()
            .into_iter()
            .find(|e| e.lobby_id == lobby)
            .ok_or_else(|| PalaverError::Internal(format!("unknown lobby {lobby:#x}")))?;
        let frame = encode_item(&ChatItem::LobbyInvite(LobbyInviteItem {
            lobby_id: entry.lobby_id,
            lobby_name: entry.name,
            lobby_topic: entry.topic,
            lobby_flags: entry.flags,
        }))?;
        self.peers.send(
            &peer,
            OutboundFrame {
                priority: Priority::Interactive,
                bytes: frame,
            },
        );
        Ok(())
    }

    /// Ask a peer which lobbies it knows.
    pub fn request_lobby_list(&self, peer: PeerId) -> Result<()> {
        let frame = encode_item(&ChatItem::LobbyListRequest(LobbyListRequestItem))?;
        self.peers.send(
            &peer,
            OutboundFrame {
                priority: Priority::Interactive,
                bytes: frame,
            },
        );
        Ok(())
    }

    /// Challenge a peer before admitting it to a lobby's forwarding set.
    pub fn challenge_peer(&self, lobby: ChatLobbyId, peer: PeerId) -> Result<()> {
        let item = self.membership.begin_challenge(lobby, peer)?;
        let frame = encode_item(&ChatItem::LobbyChallenge(item))?;
        self.peers.send(
            &peer,
            OutboundFrame {
                priority: Priority::Interactive,
                bytes: frame,
            },
        );
        Ok(())
    }

    /// Leave a lobby: tell the members, then drop local state.
    pub fn unsubscribe(&self, lobby: ChatLobbyId) -> Result<()> {
        let targets = self.membership.forwarding_peers(lobby, None);
        if !targets.is_empty() {
            let frame = encode_item(&ChatItem::LobbyUnsubscribe(LobbyUnsubscribeItem {
                lobby_id: lobby,
            }))?;
            self.peers.fan_out(
                &targets,
                &OutboundFrame {
                    priority: Priority::Interactive,
                    bytes: frame,
                },
            );
        }
        self.bounce.leave_lobby(lobby);
        self.membership.remove_lobby(lobby);
        Ok(())
    }

    /// Start a distant-chat handshake toward `peer` via the relay path.
    pub fn initiate_distant(&self, peer: PeerId, session: DistantSessionId) -> Result<()> {
        let item = self.distant.initiate(session)?;
        let frame = encode_item(&ChatItem::DhPublicKey(item))?;
        self.peers.send(
            &peer,
            OutboundFrame {
                priority: Priority::Interactive,
                bytes: frame,
            },
        );
        Ok(())
    }

    /// Periodic maintenance: dedup eviction and handshake expiry.
    pub fn spawn_maintenance(self: &Arc<Self>) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(service.maintenance_every);
            // The first tick fires immediately; skip it.
            tick.tick().await;
            loop {
                tick.tick().await;
                let now = Instant::now();
                service.bounce.evict(now);
                service.distant.expire(now);
                service.distant.sweep_failed();
                tracing::debug!(
                    dropped = service.peers.dropped(),
                    "maintenance tick complete"
                );
            }
        })
    }
}

fn emit(events: &mpsc::Sender<ChatEvent>, event: ChatEvent) {
    if events.try_send(event).is_err() {
        tracing::debug!("event queue full, event dropped");
    }
}

/// Lobby msg/event traffic: dedup, verify, deliver, forward.
struct BounceHandler {
    bounce: Arc<BounceProtocol>,
    peers: Arc<PeerRegistry>,
    events: mpsc::Sender<ChatEvent>,
}

#[async_trait]
impl ItemHandler for BounceHandler {
    async fn handle(&self, ctx: PeerCtx, item: ChatItem) -> Result<()> {
        match item {
            ChatItem::LobbyMsg(msg) => {
                let outcome = self.bounce.ingest_msg(&msg, Some(ctx.peer));
                if let IngestOutcome::AcceptedForward { targets } = &outcome {
                    // Rebroadcast the identical bytes: the signature
                    // covers them, re-encoding buys nothing.
                    self.peers.fan_out(
                        targets,
                        &OutboundFrame {
                            priority: Priority::Interactive,
                            bytes: ctx.raw.clone(),
                        },
                    );
                }
                if outcome.accepted() {
                    emit(
                        &self.events,
                        ChatEvent::LobbyMessage {
                            lobby: msg.bounce.lobby_id,
                            msg: StoredMessage {
                                msg_id: msg.bounce.msg_id,
                                parent_msg_id: msg.parent_msg_id,
                                nick: msg.bounce.nick.clone(),
                                text: msg.message.clone(),
                                send_time: msg.send_time,
                            },
                        },
                    );
                }
                Ok(())
            }
            ChatItem::LobbyEvent(ev) => {
                let outcome = self.bounce.ingest_event(&ev, Some(ctx.peer));
                if let IngestOutcome::AcceptedForward { targets } = &outcome {
                    self.peers.fan_out(
                        targets,
                        &OutboundFrame {
                            priority: Priority::Interactive,
                            bytes: ctx.raw.clone(),
                        },
                    );
                }
                if outcome.accepted() {
                    emit(
                        &self.events,
                        ChatEvent::LobbyEvent {
                            lobby: ev.bounce.lobby_id,
                            kind: ev.event,
                            nick: ev.bounce.nick.clone(),
                            detail: ev.detail.clone(),
                        },
                    );
                }
                Ok(())
            }
            other => Err(PalaverError::Internal(format!(
                "bounce handler got subtype {:#04x}",
                other.subtype()
            ))),
        }
    }
}

/// Directory and membership traffic.
struct DirectoryHandler {
    membership: Arc<MembershipTable>,
    peers: Arc<PeerRegistry>,
    events: mpsc::Sender<ChatEvent>,
}

#[async_trait]
impl ItemHandler for DirectoryHandler {
    async fn handle(&self, ctx: PeerCtx, item: ChatItem) -> Result<()> {
        match item {
            ChatItem::LobbyListRequest(_) => {
                let frame = encode_item(&ChatItem::LobbyList(self.membership.list_response()))?;
                self.peers.send(
                    &ctx.peer,
                    OutboundFrame {
                        priority: Priority::Interactive,
                        bytes: frame,
                    },
                );
                Ok(())
            }
            ChatItem::LobbyList(list) => {
                self.membership.merge_directory(&list);
                emit(
                    &self.events,
                    ChatEvent::DirectoryUpdated {
                        known: self.membership.known_lobbies().len(),
                    },
                );
                Ok(())
            }
            ChatItem::LobbyInvite(invite) => {
                self.membership.record_invite(invite.clone());
                emit(
                    &self.events,
                    ChatEvent::LobbyInvited {
                        from: ctx.peer,
                        invite,
                    },
                );
                Ok(())
            }
            ChatItem::LobbyUnsubscribe(unsub) => {
                self.membership.handle_unsubscribe(unsub.lobby_id, &ctx.peer);
                Ok(())
            }
            ChatItem::LobbyChallenge(ch) => {
                match self.membership.on_challenge_code(ctx.peer, ch.challenge_code) {
                    ChallengeDisposition::Reply(reply) => {
                        let frame = encode_item(&ChatItem::LobbyChallenge(reply))?;
                        self.peers.send(
                            &ctx.peer,
                            OutboundFrame {
                                priority: Priority::Interactive,
                                bytes: frame,
                            },
                        );
                    }
                    ChallengeDisposition::Answered { lobby } => {
                        // Verified peers are admitted to forwarding
                        // right away; stricter admission can hold them
                        // in Verified instead.
                        self.membership.promote_forwarding(lobby, ctx.peer)?;
                    }
                    ChallengeDisposition::Rejected => {
                        tracing::debug!(peer = %ctx.peer, "challenge answer rejected");
                    }
                }
                Ok(())
            }
            other => Err(PalaverError::Internal(format!(
                "directory handler got subtype {:#04x}",
                other.subtype()
            ))),
        }
    }
}

/// Distant-chat handshake traffic.
struct DistantHandler {
    distant: Arc<DhSessionManager>,
    peers: Arc<PeerRegistry>,
    events: mpsc::Sender<ChatEvent>,
}

#[async_trait]
impl ItemHandler for DistantHandler {
    async fn handle(&self, ctx: PeerCtx, item: ChatItem) -> Result<()> {
        let ChatItem::DhPublicKey(key) = item else {
            return Err(PalaverError::Internal(format!(
                "distant handler got subtype {:#04x}",
                item.subtype()
            )));
        };
        let Some(session) = ctx.distant_session else {
            tracing::debug!(peer = %ctx.peer, "dh key outside a tunnel dropped");
            return Ok(());
        };
        match self.distant.handle_public_key(session, &key) {
            Ok(reply) => {
                if let Some(reply) = reply {
                    let frame = encode_item(&ChatItem::DhPublicKey(reply))?;
                    self.peers.send(
                        &ctx.peer,
                        OutboundFrame {
                            priority: Priority::Interactive,
                            bytes: frame,
                        },
                    );
                }
                emit(&self.events, ChatEvent::DistantKeyReady { session });
                Ok(())
            }
            Err(e) => {
                // Local-only failure: the session is terminal, nothing
                // goes back down the relay path.
                tracing::debug!(session, error = %e, "distant handshake failed");
                Ok(())
            }
        }
    }
}

/// Direct chat traffic delivered to the application.
struct DirectHandler {
    events: mpsc::Sender<ChatEvent>,
}

#[async_trait]
impl ItemHandler for DirectHandler {
    async fn handle(&self, ctx: PeerCtx, item: ChatItem) -> Result<()> {
        match item {
            ChatItem::Msg(mut msg) => {
                msg.recv_time = unix_now();
                emit(
                    &self.events,
                    ChatEvent::DirectMessage {
                        from: ctx.peer,
                        item: msg,
                    },
                );
                Ok(())
            }
            ChatItem::Status(status) => {
                emit(
                    &self.events,
                    ChatEvent::PeerStatus {
                        from: ctx.peer,
                        item: status,
                    },
                );
                Ok(())
            }
            ChatItem::Avatar(avatar) => {
                emit(
                    &self.events,
                    ChatEvent::Avatar {
                        from: ctx.peer,
                        image: avatar.image,
                    },
                );
                Ok(())
            }
            other => Err(PalaverError::Internal(format!(
                "direct handler got subtype {:#04x}",
                other.subtype()
            ))),
        }
    }
}
