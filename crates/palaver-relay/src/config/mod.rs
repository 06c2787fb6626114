//! Relay config loader (strict parsing).

pub mod schema;

use std::fs;

use palaver_core::error::{PalaverError, Result};

pub use schema::{BounceSection, DistantSection, RelayConfig, RelaySection};

pub fn load_from_file(path: &str) -> Result<RelayConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| PalaverError::Config(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<RelayConfig> {
    let cfg: RelayConfig = serde_yaml::from_str(s)
        .map_err(|e| PalaverError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            version: 1,
            bounce: BounceSection::default(),
            distant: DistantSection::default(),
            relay: RelaySection::default(),
        }
    }
}
