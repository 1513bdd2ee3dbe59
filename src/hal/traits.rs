use std::fmt;
use std::ops::{BitOr, BitOrAssign, Deref, DerefMut};

use thiserror::Error;

use crate::core::bit_buffer::BitBuffer;
use crate::core::session::{EmulationIdentity, Mode, Technology};

/// Most bytes the radio hands back from a single receive
pub const RX_CAP_BYTES: usize = 100;

/// Errors reported by the radio driver
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HalError {
    #[error("chip not ready")]
    NotReady,

    #[error("communication timeout")]
    Timeout,

    #[error("receive buffer of {0} bytes overflowed")]
    BufferOverflow(usize),

    #[error("hardware error code {0}")]
    Code(i32),
}

pub type HalResult<T> = std::result::Result<T, HalError>;

/// Event bitmask returned by [`NfcHal::wait_event`]
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Event(u32);

impl Event {
    pub const NONE: Event = Event(0);
    pub const RX_END: Event = Event(1 << 0);
    pub const FIELD_ON: Event = Event(1 << 1);
    pub const FIELD_OFF: Event = Event(1 << 2);
    pub const LISTENER_ACTIVE: Event = Event(1 << 3);
    pub const ABORT_REQUEST: Event = Event(1 << 4);
    pub const TIMEOUT: Event = Event(1 << 5);

    const NAMES: [(Event, &'static str); 6] = [
        (Event::RX_END, "RX_END"),
        (Event::FIELD_ON, "FIELD_ON"),
        (Event::FIELD_OFF, "FIELD_OFF"),
        (Event::LISTENER_ACTIVE, "LISTENER_ACTIVE"),
        (Event::ABORT_REQUEST, "ABORT_REQUEST"),
        (Event::TIMEOUT, "TIMEOUT"),
    ];

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is set
    pub const fn contains(self, other: Event) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }
}

impl BitOr for Event {
    type Output = Event;

    fn bitor(self, rhs: Event) -> Event {
        Event(self.0 | rhs.0)
    }
}

impl BitOrAssign for Event {
    fn bitor_assign(&mut self, rhs: Event) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "Event(NONE)");
        }
        let names: Vec<&str> = Event::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "Event({})", names.join(" | "))
    }
}

/// ISO 14443-A short frames (7 bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortFrame {
    /// ALL_REQ (WUPA), also wakes halted tags
    AllReq,
    /// SENS_REQ (REQA)
    SensReq,
}

impl ShortFrame {
    pub const BITS: usize = 7;

    pub fn code(self) -> u8 {
        match self {
            ShortFrame::AllReq => 0x52,
            ShortFrame::SensReq => 0x26,
        }
    }
}

/// Radio driver consumed by the console.
///
/// Everything that touches the analog front end lives behind this trait;
/// the console only sequences calls and formats results.
pub trait NfcHal {
    /// Ok when the chip is initialised and idle
    fn is_ready(&self) -> HalResult<()>;

    /// Take exclusive ownership of the radio. Prefer [`HalLease`].
    fn acquire(&mut self);

    /// Give back exclusive ownership of the radio
    fn release(&mut self);

    fn set_mode(&mut self, mode: Mode, technology: Technology) -> HalResult<()>;

    fn reset_mode(&mut self) -> HalResult<()>;

    /// Enter low-power mode; the field goes down with it
    fn low_power_mode_start(&mut self) -> HalResult<()>;

    fn low_power_mode_stop(&mut self) -> HalResult<()>;

    fn poller_field_on(&mut self) -> HalResult<()>;

    /// Clear pending transmit/receive state
    fn trx_reset(&mut self) -> HalResult<()>;

    fn poller_tx(&mut self, frame: &BitBuffer) -> HalResult<()>;

    /// Fetch the last received frame, at most `max_bytes` long
    fn poller_rx(&mut self, max_bytes: usize) -> HalResult<BitBuffer>;

    fn iso14443a_poller_short_frame(&mut self, frame: ShortFrame) -> HalResult<()>;

    fn listener_tx(&mut self, frame: &BitBuffer) -> HalResult<()>;

    fn listener_rx(&mut self, max_bytes: usize) -> HalResult<BitBuffer>;

    /// Load the UID, ATQA and SAK answered during anticollision
    fn listener_set_identity(&mut self, identity: &EmulationIdentity) -> HalResult<()>;

    /// Return the listener to its idle state
    fn listener_idle(&mut self) -> HalResult<()>;

    /// Block until an event fires or `timeout_ms` elapses.
    ///
    /// Returns [`Event::TIMEOUT`] when nothing happened.
    fn wait_event(&mut self, timeout_ms: u32) -> Event;
}

/// Exclusive hold on the radio, released on drop
pub struct HalLease<'a, H: NfcHal + ?Sized> {
    hal: &'a mut H,
}

impl<'a, H: NfcHal + ?Sized> HalLease<'a, H> {
    pub fn acquire(hal: &'a mut H) -> Self {
        hal.acquire();
        Self { hal }
    }
}

impl<H: NfcHal + ?Sized> Deref for HalLease<'_, H> {
    type Target = H;

    fn deref(&self) -> &H {
        self.hal
    }
}

impl<H: NfcHal + ?Sized> DerefMut for HalLease<'_, H> {
    fn deref_mut(&mut self) -> &mut H {
        self.hal
    }
}

impl<H: NfcHal + ?Sized> Drop for HalLease<'_, H> {
    fn drop(&mut self) {
        self.hal.release();
    }
}
