//! palaver core: wire-level item codec, concrete chat item types, and
//! signature plumbing for the lobby/distant-chat protocol.
//!
//! This crate defines the binary contracts shared by the relay runtime and
//! by storage tooling. It intentionally carries no transport or runtime
//! dependencies so it can be reused in multiple contexts.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `PalaverError`/`Result` so a node
//! does not crash on malformed input from network peers.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod flags;
pub mod id;
pub mod item;
pub mod registry;
pub mod sign;
pub mod wire;

/// Shared result type.
pub use error::{PalaverError, Result};
