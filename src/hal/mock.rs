use std::collections::VecDeque;

use crate::core::bit_buffer::BitBuffer;
use crate::core::session::{EmulationIdentity, Mode, Technology};
use crate::hal::traits::{Event, HalError, HalResult, NfcHal, ShortFrame};

/// Scripted radio for unit tests.
///
/// Records every call and transmitted frame, and plays back queued events
/// and received frames. With nothing queued `wait_event` reports a timeout
/// and receives fail with [`HalError::Timeout`].
#[derive(Debug, Default)]
pub struct MockHal {
    pub ready: bool,
    pub events: VecDeque<Event>,
    pub rx_frames: VecDeque<HalResult<BitBuffer>>,
    pub poller_sent: Vec<BitBuffer>,
    pub listener_sent: Vec<BitBuffer>,
    pub short_frames: Vec<ShortFrame>,
    pub modes: Vec<(Mode, Technology)>,
    pub identity: Option<EmulationIdentity>,
    /// Testing hook: error returned by the next transmit
    pub tx_error: Option<HalError>,
    /// Every trait call, by method name
    pub calls: Vec<&'static str>,
    /// Sum of the timeouts passed to `wait_event`
    pub waited_ms: u64,
    acquired: u32,
}

impl MockHal {
    pub fn new() -> Self {
        Self {
            ready: true,
            ..Self::default()
        }
    }

    pub fn push_event(&mut self, event: Event) {
        self.events.push_back(event);
    }

    pub fn push_rx(&mut self, bytes: &[u8]) {
        self.push_rx_bits(bytes, bytes.len() * 8);
    }

    pub fn push_rx_bits(&mut self, bytes: &[u8], bits: usize) {
        let mut frame = BitBuffer::with_capacity(bytes.len());
        let frame = match frame.set_bits(bytes, bits) {
            Ok(()) => Ok(frame),
            Err(_) => Err(HalError::BufferOverflow(bytes.len())),
        };
        self.rx_frames.push_back(frame);
    }

    pub fn push_rx_error(&mut self, err: HalError) {
        self.rx_frames.push_back(Err(err));
    }

    pub fn is_acquired(&self) -> bool {
        self.acquired > 0
    }

    /// How many times `method` was called
    pub fn count(&self, method: &str) -> usize {
        self.calls.iter().filter(|c| **c == method).count()
    }

    fn next_rx(&mut self, max_bytes: usize) -> HalResult<BitBuffer> {
        let frame = self.rx_frames.pop_front().unwrap_or(Err(HalError::Timeout))?;
        if frame.size_bytes() > max_bytes {
            return Err(HalError::BufferOverflow(max_bytes));
        }
        Ok(frame)
    }

    fn tx_result(&mut self) -> HalResult<()> {
        match self.tx_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl NfcHal for MockHal {
    fn is_ready(&self) -> HalResult<()> {
        if self.ready {
            Ok(())
        } else {
            Err(HalError::NotReady)
        }
    }

    fn acquire(&mut self) {
        self.calls.push("acquire");
        self.acquired += 1;
    }

    fn release(&mut self) {
        self.calls.push("release");
        self.acquired = self.acquired.saturating_sub(1);
    }

    fn set_mode(&mut self, mode: Mode, technology: Technology) -> HalResult<()> {
        self.calls.push("set_mode");
        self.modes.push((mode, technology));
        Ok(())
    }

    fn reset_mode(&mut self) -> HalResult<()> {
        self.calls.push("reset_mode");
        Ok(())
    }

    fn low_power_mode_start(&mut self) -> HalResult<()> {
        self.calls.push("low_power_mode_start");
        Ok(())
    }

    fn low_power_mode_stop(&mut self) -> HalResult<()> {
        self.calls.push("low_power_mode_stop");
        Ok(())
    }

    fn poller_field_on(&mut self) -> HalResult<()> {
        self.calls.push("poller_field_on");
        Ok(())
    }

    fn trx_reset(&mut self) -> HalResult<()> {
        self.calls.push("trx_reset");
        Ok(())
    }

    fn poller_tx(&mut self, frame: &BitBuffer) -> HalResult<()> {
        self.calls.push("poller_tx");
        self.tx_result()?;
        self.poller_sent.push(frame.clone());
        Ok(())
    }

    fn poller_rx(&mut self, max_bytes: usize) -> HalResult<BitBuffer> {
        self.calls.push("poller_rx");
        self.next_rx(max_bytes)
    }

    fn iso14443a_poller_short_frame(&mut self, frame: ShortFrame) -> HalResult<()> {
        self.calls.push("iso14443a_poller_short_frame");
        self.tx_result()?;
        self.short_frames.push(frame);
        Ok(())
    }

    fn listener_tx(&mut self, frame: &BitBuffer) -> HalResult<()> {
        self.calls.push("listener_tx");
        self.tx_result()?;
        self.listener_sent.push(frame.clone());
        Ok(())
    }

    fn listener_rx(&mut self, max_bytes: usize) -> HalResult<BitBuffer> {
        self.calls.push("listener_rx");
        self.next_rx(max_bytes)
    }

    fn listener_set_identity(&mut self, identity: &EmulationIdentity) -> HalResult<()> {
        self.calls.push("listener_set_identity");
        self.identity = Some(identity.clone());
        Ok(())
    }

    fn listener_idle(&mut self) -> HalResult<()> {
        self.calls.push("listener_idle");
        Ok(())
    }

    fn wait_event(&mut self, timeout_ms: u32) -> Event {
        self.waited_ms += u64::from(timeout_ms);
        self.events.pop_front().unwrap_or(Event::TIMEOUT)
    }
}
