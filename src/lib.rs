/// NFC Console - debug interface for an NFC radio
///
/// This library provides the command dispatcher, frame transceiver and tag
/// emulation loop behind the `nfc-cli` binary, driven through the `NfcHal`
/// trait.
pub mod cli;
pub mod core;
pub mod hal;

// Re-export commonly used types
pub use crate::core::{
    commands::{CommandRecord, Dispatcher},
    config::Config,
    console::{Console, Interrupt},
    error::CommandError,
    session::{EmulationIdentity, Mode, Session, Technology},
    utils::{format_hex, parse_hex},
};
pub use crate::hal::{HalError, NfcHal};

// Common error type
pub type Result<T> = anyhow::Result<T>;
