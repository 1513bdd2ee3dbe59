use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

use crate::core::bit_buffer::BitBuffer;
use crate::core::crc::checksum;
use crate::core::session::{EmulationIdentity, Mode, Technology};
use crate::hal::traits::{Event, HalError, HalResult, NfcHal, ShortFrame};

const TAG_UID: [u8; 7] = [0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66];
const TAG_ATQA: [u8; 2] = [0x44, 0x00];
const TAG_SAK: u8 = 0x00;
const CASCADE_TAG: u8 = 0x88;

/// Radio stand-in used when no hardware is attached.
///
/// As a poller it talks to a virtual NFC-A tag (7-byte UID, readable
/// pages) and echoes unknown frames. As a listener it plays a short reader
/// session against the configured identity: field on, the technology's
/// wake-up sequence, field off.
#[derive(Debug)]
pub struct SimulatedHal {
    acquired: bool,
    field_on: bool,
    mode: Option<(Mode, Technology)>,
    events: VecDeque<Event>,
    pending_rx: Option<BitBuffer>,
    reader_frames: VecDeque<BitBuffer>,
}

impl SimulatedHal {
    pub fn new() -> Self {
        Self {
            acquired: false,
            field_on: false,
            mode: None,
            events: VecDeque::new(),
            pending_rx: None,
            reader_frames: VecDeque::new(),
        }
    }

    fn technology(&self) -> Technology {
        self.mode
            .map(|(_, technology)| technology)
            .unwrap_or(Technology::Iso14443a)
    }

    fn respond(&mut self, bytes: Vec<u8>, bits: usize) {
        match BitBuffer::from_bits(&bytes, bits) {
            Ok(frame) => {
                self.pending_rx = Some(frame);
                self.events.push_back(Event::RX_END);
            }
            Err(e) => log::warn!("sim: dropping response: {e}"),
        }
    }

    fn respond_with_crc(&mut self, mut bytes: Vec<u8>) {
        let crc = checksum(self.technology(), &bytes);
        bytes.extend_from_slice(&crc);
        let bits = bytes.len() * 8;
        self.respond(bytes, bits);
    }

    fn tag_reply(&mut self, frame: &[u8]) {
        match (self.technology(), frame) {
            (Technology::Iso14443a, [0x93, 0x20]) => {
                let cl1 = [CASCADE_TAG, TAG_UID[0], TAG_UID[1], TAG_UID[2]];
                let mut reply = cl1.to_vec();
                reply.push(bcc(&cl1));
                self.respond(reply, 40);
            }
            (Technology::Iso14443a, [0x93, 0x70, ..]) => self.respond_with_crc(vec![0x04]),
            (Technology::Iso14443a, [0x95, 0x20]) => {
                let mut reply = TAG_UID[3..].to_vec();
                reply.push(bcc(&TAG_UID[3..]));
                self.respond(reply, 40);
            }
            (Technology::Iso14443a, [0x95, 0x70, ..]) => self.respond_with_crc(vec![TAG_SAK]),
            (Technology::Iso14443a, [0x30, page, ..]) => {
                let start = page.wrapping_mul(4);
                let data = (0..16u8).map(|i| start.wrapping_add(i)).collect();
                self.respond_with_crc(data);
            }
            // HALT is never answered
            (Technology::Iso14443a, [0x50, 0x00, ..]) => {}
            (Technology::Iso14443b, [0x05, ..]) => {
                let mut atqb = vec![0x50];
                atqb.extend_from_slice(&TAG_UID[..4]);
                atqb.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x71, 0x71]);
                self.respond_with_crc(atqb);
            }
            (Technology::Iso15693, [_, 0x01, ..]) => {
                let mut reply = vec![0x00, 0x00];
                reply.extend(TAG_UID.iter().rev());
                reply.push(0xE0);
                self.respond_with_crc(reply);
            }
            (_, other) => {
                let other = other.to_vec();
                let bits = other.len() * 8;
                self.respond(other, bits);
            }
        }
    }

    fn load_reader_session(&mut self, technology: Technology, identity: &EmulationIdentity) {
        self.reader_frames.clear();

        let with_crc = |mut bytes: Vec<u8>| {
            let crc = checksum(technology, &bytes);
            bytes.extend_from_slice(&crc);
            BitBuffer::from_bytes(&bytes)
        };

        let frames = match technology {
            Technology::Iso14443a => {
                let uid = identity.uid();
                let cl1: Vec<u8> = if uid.len() > 4 {
                    [CASCADE_TAG].iter().chain(uid.iter()).take(4).copied().collect()
                } else {
                    uid.iter().copied().chain(std::iter::repeat(0)).take(4).collect()
                };
                let mut select = vec![0x93, 0x70];
                select.extend_from_slice(&cl1);
                select.push(bcc(&cl1));

                vec![
                    BitBuffer::from_bits(&[ShortFrame::SensReq.code()], ShortFrame::BITS),
                    BitBuffer::from_bytes(&[0x93, 0x20]),
                    with_crc(select),
                    with_crc(vec![0x50, 0x00]),
                ]
            }
            Technology::Iso14443b => vec![with_crc(vec![0x05, 0x00, 0x00])],
            Technology::Iso15693 => vec![with_crc(vec![0x26, 0x01, 0x00])],
        };

        for frame in frames {
            match frame {
                Ok(frame) => self.reader_frames.push_back(frame),
                Err(e) => log::warn!("sim: skipping reader frame: {e}"),
            }
        }

        self.events.push_back(Event::FIELD_ON);
        self.next_reader_frame();
    }

    fn next_reader_frame(&mut self) {
        match self.reader_frames.pop_front() {
            Some(frame) => {
                self.pending_rx = Some(frame);
                self.events.push_back(Event::RX_END);
            }
            None => self.events.push_back(Event::FIELD_OFF),
        }
    }

    fn take_rx(&mut self, max_bytes: usize) -> HalResult<BitBuffer> {
        let frame = self.pending_rx.take().ok_or(HalError::Timeout)?;
        if frame.size_bytes() > max_bytes {
            return Err(HalError::BufferOverflow(max_bytes));
        }
        Ok(frame)
    }
}

impl Default for SimulatedHal {
    fn default() -> Self {
        Self::new()
    }
}

fn bcc(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

impl NfcHal for SimulatedHal {
    fn is_ready(&self) -> HalResult<()> {
        Ok(())
    }

    fn acquire(&mut self) {
        if self.acquired {
            log::warn!("sim: radio acquired twice");
        }
        self.acquired = true;
    }

    fn release(&mut self) {
        self.acquired = false;
    }

    fn set_mode(&mut self, mode: Mode, technology: Technology) -> HalResult<()> {
        log::debug!("sim: mode {mode} {technology}");
        self.mode = Some((mode, technology));
        Ok(())
    }

    fn reset_mode(&mut self) -> HalResult<()> {
        self.mode = None;
        self.events.clear();
        self.pending_rx = None;
        self.reader_frames.clear();
        Ok(())
    }

    fn low_power_mode_start(&mut self) -> HalResult<()> {
        self.field_on = false;
        Ok(())
    }

    fn low_power_mode_stop(&mut self) -> HalResult<()> {
        Ok(())
    }

    fn poller_field_on(&mut self) -> HalResult<()> {
        self.field_on = true;
        Ok(())
    }

    fn trx_reset(&mut self) -> HalResult<()> {
        self.pending_rx = None;
        self.events.retain(|e| !e.contains(Event::RX_END));
        Ok(())
    }

    fn poller_tx(&mut self, frame: &BitBuffer) -> HalResult<()> {
        if self.field_on {
            self.tag_reply(frame.data());
        }
        Ok(())
    }

    fn poller_rx(&mut self, max_bytes: usize) -> HalResult<BitBuffer> {
        self.take_rx(max_bytes)
    }

    fn iso14443a_poller_short_frame(&mut self, frame: ShortFrame) -> HalResult<()> {
        log::debug!("sim: short frame {:02X}", frame.code());
        if self.field_on && self.technology() == Technology::Iso14443a {
            self.respond(TAG_ATQA.to_vec(), 16);
        }
        Ok(())
    }

    fn listener_tx(&mut self, frame: &BitBuffer) -> HalResult<()> {
        log::debug!("sim: reader got {} bits", frame.size_bits());
        self.next_reader_frame();
        Ok(())
    }

    fn listener_rx(&mut self, max_bytes: usize) -> HalResult<BitBuffer> {
        self.take_rx(max_bytes)
    }

    fn listener_set_identity(&mut self, identity: &EmulationIdentity) -> HalResult<()> {
        let technology = self.technology();
        self.load_reader_session(technology, identity);
        Ok(())
    }

    fn listener_idle(&mut self) -> HalResult<()> {
        self.pending_rx = None;
        Ok(())
    }

    fn wait_event(&mut self, timeout_ms: u32) -> Event {
        match self.events.pop_front() {
            Some(event) => event,
            None => {
                thread::sleep(Duration::from_millis(u64::from(timeout_ms)));
                Event::TIMEOUT
            }
        }
    }
}
