use crate::core::bit_buffer::BitBuffer;
use crate::core::crc::append_crc;
use crate::core::error::CommandError;
use crate::core::session::{Session, Technology};
use crate::core::utils::format_hex;
use crate::hal::{Event, HalLease, NfcHal, ShortFrame, RX_CAP_BYTES};

/// REQB: APf, AFI 00 (all families), PARAM 00 (one slot)
const REQB: [u8; 3] = [0x05, 0x00, 0x00];
/// ISO 15693 inventory: high data rate + inventory flags, one slot, no mask
const INVENTORY: [u8; 3] = [0x26, 0x01, 0x00];

/// Millisecond budget spent in fixed slices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutBudget {
    remaining_ms: u32,
    slice_ms: u32,
}

impl TimeoutBudget {
    pub fn new(total_ms: u32, slice_ms: u32) -> Self {
        Self {
            remaining_ms: total_ms,
            slice_ms: slice_ms.max(1),
        }
    }

    /// Take the next slice, or `None` once the budget is spent
    pub fn next_slice(&mut self) -> Option<u32> {
        if self.remaining_ms == 0 {
            return None;
        }
        let slice = self.slice_ms.min(self.remaining_ms);
        self.remaining_ms -= slice;
        Some(slice)
    }

    pub fn remaining_ms(&self) -> u32 {
        self.remaining_ms
    }
}

/// How a transceive waits and what it prints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransceiveOptions {
    pub timeout_ms: u32,
    pub slice_ms: u32,
    pub keep_partial_byte: bool,
}

/// Wait on the radio until a frame has been received
pub fn wait_for_rx<H: NfcHal + ?Sized>(hal: &mut H, mut budget: TimeoutBudget) -> bool {
    while let Some(slice) = budget.next_slice() {
        let event = hal.wait_event(slice);
        log::trace!("wait {event:?}, {} ms left", budget.remaining_ms());
        if event.contains(Event::RX_END) {
            return true;
        }
    }
    false
}

/// Bytes of a received frame that get reported.
///
/// Only whole bytes unless `keep_partial_byte` is set; the dropped bits
/// are logged.
pub fn frame_bytes(frame: &BitBuffer, keep_partial_byte: bool) -> &[u8] {
    if keep_partial_byte || frame.is_byte_aligned() {
        return frame.data();
    }
    log::debug!(
        "Dropping {} trailing bits of a {}-bit frame",
        frame.size_bits() % 8,
        frame.size_bits()
    );
    frame.whole_data()
}

/// Hex text of a received frame, see [`frame_bytes`]
pub fn format_frame(frame: &BitBuffer, keep_partial_byte: bool) -> String {
    format_hex(frame_bytes(frame, keep_partial_byte))
}

/// Check the preconditions shared by every poller exchange
pub fn ensure_field_ready<H: NfcHal + ?Sized>(session: &Session, hal: &H) -> Result<(), CommandError> {
    if !session.field_on {
        return Err(CommandError::FieldOff);
    }
    hal.is_ready().map_err(|_| CommandError::NotReady)
}

/// Send `frame`, optionally checksummed, and return the answer.
///
/// The CRC is appended in place, so `frame` holds exactly what went on
/// the air afterwards.
pub fn send<H: NfcHal + ?Sized>(
    hal: &mut H,
    frame: &mut BitBuffer,
    technology: Option<Technology>,
    append_checksum: bool,
    options: &TransceiveOptions,
) -> Result<BitBuffer, CommandError> {
    if append_checksum {
        append_crc(frame, technology)?;
    }

    log::debug!("TX {} ({} bits)", format_hex(frame.data()), frame.size_bits());

    let mut lease = HalLease::acquire(hal);
    lease.trx_reset()?;
    lease
        .poller_tx(frame)
        .map_err(CommandError::hal("Transmit failed"))?;

    receive(&mut *lease, options)
}

fn receive<H: NfcHal + ?Sized>(hal: &mut H, options: &TransceiveOptions) -> Result<BitBuffer, CommandError> {
    if !wait_for_rx(hal, TimeoutBudget::new(options.timeout_ms, options.slice_ms)) {
        log::info!("No response within {} ms", options.timeout_ms);
        return Err(CommandError::Timeout);
    }

    let rx = hal
        .poller_rx(RX_CAP_BYTES)
        .map_err(CommandError::hal("Receive failed"))?;
    log::debug!("RX {} ({} bits)", format_hex(rx.data()), rx.size_bits());
    Ok(rx)
}

/// Wake every tag in the field with the technology's request-all frame
pub fn request_all<H: NfcHal + ?Sized>(
    hal: &mut H,
    technology: Technology,
    options: &TransceiveOptions,
) -> Result<BitBuffer, CommandError> {
    match technology {
        Technology::Iso14443a => {
            let mut lease = HalLease::acquire(hal);
            lease.trx_reset()?;
            lease
                .iso14443a_poller_short_frame(ShortFrame::AllReq)
                .map_err(CommandError::hal("REQA error"))?;
            receive(&mut *lease, options)
        }
        Technology::Iso14443b => {
            let mut frame = BitBuffer::from_bytes(&REQB)?;
            send(hal, &mut frame, Some(technology), true, options)
        }
        Technology::Iso15693 => {
            let mut frame = BitBuffer::from_bytes(&INVENTORY)?;
            send(hal, &mut frame, Some(technology), true, options)
        }
    }
}
