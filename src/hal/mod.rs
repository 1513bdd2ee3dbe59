//! Radio driver boundary: the trait the console drives, plus a scripted
//! mock and a simulated radio for running without hardware.

pub mod mock;
pub mod sim;
pub mod traits;

pub use traits::{Event, HalError, HalLease, HalResult, NfcHal, ShortFrame, RX_CAP_BYTES};
