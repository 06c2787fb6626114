//! Registry and dispatcher for decoded chat items.
//!
//! The transport hands raw frames in; the codec reconstructs the typed
//! item; the dispatcher routes it to the handler registered for its
//! subtype. Unknown or undecodable traffic is dropped with a debug log,
//! never answered.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use palaver_core::error::{PalaverError, Result};
use palaver_core::id::{DistantSessionId, PeerId};
use palaver_core::item::ChatItem;
use palaver_core::registry::ItemRegistry;

/// Per-frame context passed to handlers.
#[derive(Clone)]
pub struct PeerCtx {
    /// Peer the frame arrived from.
    pub peer: PeerId,
    /// Set when the frame arrived through a distant-chat tunnel.
    pub distant_session: Option<DistantSessionId>,
    /// The raw frame, reused verbatim when forwarding.
    pub raw: Bytes,
}

/// Handler for one group of subtypes.
#[async_trait]
pub trait ItemHandler: Send + Sync {
    async fn handle(&self, ctx: PeerCtx, item: ChatItem) -> Result<()>;
}

/// Routes decoded items to their registered handlers.
pub struct ChatDispatcher {
    registry: &'static ItemRegistry,
    handlers: DashMap<u8, Arc<dyn ItemHandler>>,
}

impl ChatDispatcher {
    pub fn new() -> Self {
        Self {
            registry: ItemRegistry::global(),
            handlers: DashMap::new(),
        }
    }

    /// Register one handler for a set of subtypes.
    pub fn register(&self, subtypes: &[u8], handler: Arc<dyn ItemHandler>) {
        for sub in subtypes {
            self.handlers.insert(*sub, handler.clone());
        }
    }

    pub fn registered_subtypes(&self) -> Vec<u8> {
        let mut subs: Vec<u8> = self.handlers.iter().map(|e| *e.key()).collect();
        subs.sort();
        subs
    }

    /// Decode and route one frame.
    pub async fn dispatch(&self, ctx: PeerCtx) -> Result<()> {
        let item = self.registry.decode(ctx.raw.clone())?;
        let sub = item.subtype();
        let handler = self
            .handlers
            .get(&sub)
            .map(|h| h.value().clone())
            .ok_or_else(|| {
                PalaverError::Internal(format!("no handler for subtype {sub:#04x}"))
            })?;
        handler.handle(ctx, item).await
    }
}

impl Default for ChatDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
