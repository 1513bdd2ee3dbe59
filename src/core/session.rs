use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::core::error::CommandError;
use crate::core::utils::format_hex;
use crate::hal::{HalResult, NfcHal};

/// Longest UID a listener can present
pub const MAX_UID_LEN: usize = 20;

/// Carrier frequency, fc
const CARRIER_HZ: u64 = 13_560_000;

/// Tag technology driving CRC selection and hardware configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Technology {
    Iso14443a,
    Iso14443b,
    Iso15693,
}

impl Technology {
    /// Minimum listener response delay, in carrier cycles
    pub fn listener_fdt_fc(self) -> u64 {
        match self {
            Technology::Iso14443a => 1172,
            Technology::Iso14443b => 1024,
            Technology::Iso15693 => 4352,
        }
    }

    /// Minimum listener response delay
    pub fn listener_fdt(self) -> Duration {
        Duration::from_nanos(self.listener_fdt_fc() * 1_000_000_000 / CARRIER_HZ)
    }
}

impl fmt::Display for Technology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Technology::Iso14443a => write!(f, "ISO 14443 A"),
            Technology::Iso14443b => write!(f, "ISO 14443 B"),
            Technology::Iso15693 => write!(f, "ISO 15693"),
        }
    }
}

/// Whether the radio initiates (poller) or emulates a tag (listener)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    Poller,
    Listener,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Poller => write!(f, "poller"),
            Mode::Listener => write!(f, "listener"),
        }
    }
}

/// Identity presented to a reader while emulating
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulationIdentity {
    uid: Vec<u8>,
    atqa: [u8; 2],
    sak: u8,
}

impl EmulationIdentity {
    pub fn uid(&self) -> &[u8] {
        &self.uid
    }

    pub fn atqa(&self) -> [u8; 2] {
        self.atqa
    }

    pub fn sak(&self) -> u8 {
        self.sak
    }

    pub fn set_uid(&mut self, uid: &[u8]) -> Result<(), CommandError> {
        if uid.is_empty() || uid.len() > MAX_UID_LEN {
            return Err(CommandError::InvalidArgument(format!(
                "UID must be 1 to {MAX_UID_LEN} bytes, got {}",
                uid.len()
            )));
        }
        self.uid = uid.to_vec();
        Ok(())
    }

    pub fn set_atqa(&mut self, atqa: &[u8]) -> Result<(), CommandError> {
        self.atqa = atqa.try_into().map_err(|_| {
            CommandError::InvalidArgument(format!("ATQA must be 2 bytes, got {}", atqa.len()))
        })?;
        Ok(())
    }

    pub fn set_sak(&mut self, sak: &[u8]) -> Result<(), CommandError> {
        match sak {
            [sak] => {
                self.sak = *sak;
                Ok(())
            }
            _ => Err(CommandError::InvalidArgument(format!(
                "SAK must be 1 byte, got {}",
                sak.len()
            ))),
        }
    }
}

impl Default for EmulationIdentity {
    fn default() -> Self {
        Self {
            uid: vec![0x01, 0x02, 0x03, 0x04],
            atqa: [0x44, 0x00],
            sak: 0x00,
        }
    }
}

impl fmt::Display for EmulationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UID {} ({} bytes), ATQA {}, SAK {:02X}",
            format_hex(&self.uid),
            self.uid.len(),
            format_hex(&self.atqa),
            self.sak
        )
    }
}

/// Radio state shared by every console command.
///
/// Owned by the dispatcher and handed to each handler; nothing else
/// mutates it.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub technology: Option<Technology>,
    pub mode: Mode,
    pub field_on: bool,
    pub identity: EmulationIdentity,
    /// The hardware currently holds a mode from `set_mode`
    pub(crate) hal_configured: bool,
    low_power_off: bool,
}

impl Session {
    pub fn new(identity: EmulationIdentity) -> Self {
        Self {
            identity,
            ..Self::default()
        }
    }

    pub fn is_low_power(&self) -> bool {
        !self.low_power_off
    }

    /// Leave low-power mode unless already out of it
    pub fn low_power_stop<H: NfcHal + ?Sized>(&mut self, hal: &mut H) -> HalResult<()> {
        if self.low_power_off {
            return Ok(());
        }
        hal.low_power_mode_stop()?;
        self.low_power_off = true;
        Ok(())
    }

    /// Return to low-power mode, which also drops the field
    pub fn low_power_start<H: NfcHal + ?Sized>(&mut self, hal: &mut H) -> HalResult<()> {
        if !self.low_power_off {
            return Ok(());
        }
        hal.low_power_mode_start()?;
        self.low_power_off = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::MockHal;

    #[test]
    fn fdt_durations() {
        assert_eq!(Technology::Iso14443a.listener_fdt().as_nanos(), 86_430);
        assert!(Technology::Iso15693.listener_fdt() > Technology::Iso14443b.listener_fdt());
    }

    #[test]
    fn uid_length_follows_input() {
        let mut id = EmulationIdentity::default();
        id.set_uid(&[0xAA, 0xBB, 0xCC, 0xDD]).unwrap();
        assert_eq!(id.uid(), &[0xAA, 0xBB, 0xCC, 0xDD]);

        id.set_uid(&[0x11; 7]).unwrap();
        assert_eq!(id.uid().len(), 7);

        assert!(id.set_uid(&[]).is_err());
        assert!(id.set_uid(&[0; MAX_UID_LEN + 1]).is_err());
        assert_eq!(id.uid().len(), 7);
    }

    #[test]
    fn atqa_must_be_two_bytes() {
        let mut id = EmulationIdentity::default();
        assert!(id.set_atqa(&[0x04]).is_err());
        assert!(id.set_atqa(&[0x04, 0x00, 0x00]).is_err());
        assert_eq!(id.atqa(), [0x44, 0x00]);
        id.set_atqa(&[0x04, 0x00]).unwrap();
        assert_eq!(id.atqa(), [0x04, 0x00]);
    }

    #[test]
    fn sak_must_be_one_byte() {
        let mut id = EmulationIdentity::default();
        assert!(id.set_sak(&[]).is_err());
        assert!(id.set_sak(&[0x08, 0x00]).is_err());
        id.set_sak(&[0x08]).unwrap();
        assert_eq!(id.sak(), 0x08);
    }

    #[test]
    fn low_power_transitions_are_tracked() {
        let mut hal = MockHal::new();
        let mut session = Session::default();
        assert!(session.is_low_power());

        session.low_power_stop(&mut hal).unwrap();
        session.low_power_stop(&mut hal).unwrap();
        assert!(!session.is_low_power());
        assert_eq!(hal.count("low_power_mode_stop"), 1);

        session.low_power_start(&mut hal).unwrap();
        assert!(session.is_low_power());
        assert_eq!(hal.count("low_power_mode_start"), 1);
    }

    #[test]
    fn identity_display() {
        let id = EmulationIdentity::default();
        assert_eq!(id.to_string(), "UID 01020304 (4 bytes), ATQA 4400, SAK 00");
    }
}
