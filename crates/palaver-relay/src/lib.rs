//! palaver relay: runtime for the lobby chat protocol.
//!
//! This crate wires the item codec to the protocol state machines: the
//! bouncing/dedup layer for lobby traffic, the lobby directory and
//! membership challenge flow, and the distant-chat Diffie-Hellman
//! handshake. Transport and durable storage stay behind seams
//! ([`outbound::PeerRegistry`] queues, [`identity::IdentityDirectory`]);
//! this crate never blocks on network I/O.

pub mod bounce;
pub mod config;
pub mod dispatch;
pub mod distant;
pub mod event;
pub mod identity;
pub mod membership;
pub mod obs;
pub mod outbound;
pub mod service;

pub use palaver_core::{PalaverError, Result};
