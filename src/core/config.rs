use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::core::error::CommandError;
use crate::core::session::EmulationIdentity;
use crate::core::utils::parse_hex;

/// Console settings, loadable from a JSON file.
///
/// Every field has a default so a config file only needs the keys it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Receive budget for `send`
    pub send_timeout_ms: u32,
    /// Receive budget for `reqa`
    pub reqa_timeout_ms: u32,
    /// Granularity of the transceive wait
    pub poll_slice_ms: u32,
    /// Granularity of the emulation wait, between interrupt checks
    pub emu_wait_slice_ms: u32,
    /// Print a trailing partial byte of received frames instead of dropping it
    pub keep_partial_byte: bool,
    /// Refuse CRC/REQA operations while no technology is selected
    pub strict_technology: bool,
    /// Append a CRC to emulation replies that carry no flag
    pub emu_reply_crc: bool,
    pub default_uid: String,
    pub default_atqa: String,
    pub default_sak: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            send_timeout_ms: 1000,
            reqa_timeout_ms: 1000,
            poll_slice_ms: 10,
            emu_wait_slice_ms: 100,
            keep_partial_byte: false,
            strict_technology: false,
            emu_reply_crc: false,
            default_uid: "01020304".to_string(),
            default_atqa: "4400".to_string(),
            default_sak: "00".to_string(),
        }
    }
}

impl Config {
    /// Load a config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        config
            .identity()
            .with_context(|| format!("Invalid emulation identity in {}", path.display()))?;
        if config.poll_slice_ms == 0 || config.emu_wait_slice_ms == 0 {
            anyhow::bail!("Wait slices must be at least 1 ms");
        }

        log::debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Emulation identity the session starts with
    pub fn identity(&self) -> Result<EmulationIdentity, CommandError> {
        let mut identity = EmulationIdentity::default();
        identity.set_uid(&parse_hex(&self.default_uid).map_err(CommandError::parse("Invalid UID"))?)?;
        identity.set_atqa(&parse_hex(&self.default_atqa).map_err(CommandError::parse("Invalid ATQA"))?)?;
        identity.set_sak(&parse_hex(&self.default_sak).map_err(CommandError::parse("Invalid SAK"))?)?;
        Ok(identity)
    }
}
