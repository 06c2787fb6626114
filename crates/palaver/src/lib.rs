//! Top-level facade crate for palaver.
//!
//! Re-exports the item codec and the relay runtime so users can depend
//! on a single crate.

pub mod core {
    pub use palaver_core::*;
}

pub mod relay {
    pub use palaver_relay::*;
}
