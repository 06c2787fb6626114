//! Outbound peer queues.
//!
//! Forwarding is fire-and-forget: frames are pushed with `try_send` and a
//! full queue drops the frame (counted, logged at debug). The transport
//! collaborator drains the receivers; no acknowledgement is awaited here.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;

use palaver_core::id::PeerId;
use palaver_core::item::Priority;

/// A frame queued for one peer, tagged with the item's scheduling
/// priority for the transport layer.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    pub priority: Priority,
    pub bytes: Bytes,
}

/// One peer's outbound queue sender.
#[derive(Clone)]
pub struct PeerLink {
    tx: mpsc::Sender<OutboundFrame>,
}

impl PeerLink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Push without waiting. Returns false when the queue was full.
    fn push(&self, frame: OutboundFrame) -> bool {
        self.tx.try_send(frame).is_ok()
    }
}

/// Registry of connected peers' outbound queues.
#[derive(Default)]
pub struct PeerRegistry {
    peers: DashMap<PeerId, PeerLink>,
    dropped: AtomicU64,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self {
            peers: DashMap::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Attach a peer and hand back the receiver for the transport to
    /// drain.
    pub fn attach(&self, peer: PeerId, capacity: usize) -> mpsc::Receiver<OutboundFrame> {
        let (link, rx) = PeerLink::channel(capacity);
        self.peers.insert(peer, link);
        rx
    }

    pub fn detach(&self, peer: &PeerId) {
        self.peers.remove(peer);
    }

    pub fn is_attached(&self, peer: &PeerId) -> bool {
        self.peers.contains_key(peer)
    }

    /// Send one frame to one peer, fire-and-forget.
    pub fn send(&self, peer: &PeerId, frame: OutboundFrame) {
        let Some(link) = self.peers.get(peer).map(|l| l.value().clone()) else {
            tracing::debug!(%peer, "outbound to unattached peer dropped");
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        if !link.push(frame) {
            tracing::debug!(%peer, "outbound queue full, frame dropped");
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Fan one frame out to many peers. `Bytes` clones are cheap
    /// refcounts; the payload is shared.
    pub fn fan_out(&self, targets: &[PeerId], frame: &OutboundFrame) {
        for peer in targets {
            self.send(peer, frame.clone());
        }
    }

    /// Total frames dropped on full or missing queues.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
