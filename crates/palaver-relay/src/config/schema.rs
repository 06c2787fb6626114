use serde::Deserialize;

use palaver_core::error::{PalaverError, Result};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    pub version: u32,

    #[serde(default)]
    pub bounce: BounceSection,

    #[serde(default)]
    pub distant: DistantSection,

    #[serde(default)]
    pub relay: RelaySection,
}

impl RelayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(PalaverError::Config(format!(
                "unsupported config version {}",
                self.version
            )));
        }
        self.bounce.validate()?;
        self.distant.validate()?;
        self.relay.validate()?;
        Ok(())
    }
}

/// Bouncing-object protocol knobs. The dedup retention policy is bounded
/// on both sides: an unbounded cache is a memory-exhaustion risk, an
/// overly small one reopens the rebroadcast loop.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BounceSection {
    #[serde(default = "default_dedup_retention_secs")]
    pub dedup_retention_secs: u64,

    #[serde(default = "default_dedup_max_entries")]
    pub dedup_max_entries: usize,

    #[serde(default = "default_event_horizon_secs")]
    pub event_horizon_secs: u64,

    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,

    #[serde(default = "default_history_depth")]
    pub history_depth: usize,
}

impl Default for BounceSection {
    fn default() -> Self {
        Self {
            dedup_retention_secs: default_dedup_retention_secs(),
            dedup_max_entries: default_dedup_max_entries(),
            event_horizon_secs: default_event_horizon_secs(),
            max_message_bytes: default_max_message_bytes(),
            history_depth: default_history_depth(),
        }
    }
}

impl BounceSection {
    pub fn validate(&self) -> Result<()> {
        if !(60..=86_400).contains(&self.dedup_retention_secs) {
            return Err(PalaverError::Config(
                "bounce.dedup_retention_secs must be between 60 and 86400".into(),
            ));
        }
        if !(256..=1_000_000).contains(&self.dedup_max_entries) {
            return Err(PalaverError::Config(
                "bounce.dedup_max_entries must be between 256 and 1000000".into(),
            ));
        }
        if !(60..=86_400).contains(&self.event_horizon_secs) {
            return Err(PalaverError::Config(
                "bounce.event_horizon_secs must be between 60 and 86400".into(),
            ));
        }
        if !(256..=1_048_576).contains(&self.max_message_bytes) {
            return Err(PalaverError::Config(
                "bounce.max_message_bytes must be between 256 and 1048576".into(),
            ));
        }
        if !(16..=65_536).contains(&self.history_depth) {
            return Err(PalaverError::Config(
                "bounce.history_depth must be between 16 and 65536".into(),
            ));
        }
        Ok(())
    }
}

fn default_dedup_retention_secs() -> u64 {
    600
}
fn default_dedup_max_entries() -> usize {
    4096
}
fn default_event_horizon_secs() -> u64 {
    600
}
fn default_max_message_bytes() -> usize {
    4096
}
fn default_history_depth() -> usize {
    256
}

/// Distant-chat handshake knobs.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DistantSection {
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
}

impl Default for DistantSection {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: default_handshake_timeout_secs(),
        }
    }
}

impl DistantSection {
    pub fn validate(&self) -> Result<()> {
        if !(5..=600).contains(&self.handshake_timeout_secs) {
            return Err(PalaverError::Config(
                "distant.handshake_timeout_secs must be between 5 and 600".into(),
            ));
        }
        Ok(())
    }
}

fn default_handshake_timeout_secs() -> u64 {
    30
}

/// Relay-wide knobs.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelaySection {
    /// Capacity of each peer's outbound queue.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,

    /// Period of the eviction/expiry maintenance tick.
    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,

    /// Capacity of the application event queue.
    #[serde(default = "default_event_queue")]
    pub event_queue: usize,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            outbound_queue: default_outbound_queue(),
            maintenance_interval_secs: default_maintenance_interval_secs(),
            event_queue: default_event_queue(),
        }
    }
}

impl RelaySection {
    pub fn validate(&self) -> Result<()> {
        if !(8..=65_536).contains(&self.outbound_queue) {
            return Err(PalaverError::Config(
                "relay.outbound_queue must be between 8 and 65536".into(),
            ));
        }
        if !(1..=3_600).contains(&self.maintenance_interval_secs) {
            return Err(PalaverError::Config(
                "relay.maintenance_interval_secs must be between 1 and 3600".into(),
            ));
        }
        if !(8..=65_536).contains(&self.event_queue) {
            return Err(PalaverError::Config(
                "relay.event_queue must be between 8 and 65536".into(),
            ));
        }
        Ok(())
    }
}

fn default_outbound_queue() -> usize {
    256
}
fn default_maintenance_interval_secs() -> u64 {
    30
}
fn default_event_queue() -> usize {
    1024
}
