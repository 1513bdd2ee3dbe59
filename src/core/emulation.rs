//! Listener session: print what a reader sends and answer with frames the
//! operator types in.

use std::fmt;
use std::io::{BufRead, Write};
use std::time::Instant;

use crate::core::bit_buffer::BitBuffer;
use crate::core::config::Config;
use crate::core::console::Console;
use crate::core::crc::append_crc;
use crate::core::error::{CommandError, ParseError};
use crate::core::session::{Mode, Session, Technology};
use crate::core::utils::{format_hex, parse_hex};
use crate::hal::{Event, HalLease, NfcHal, RX_CAP_BYTES};

/// Operator line ending the session without a reply
pub const END_SENTINEL: &str = "skip";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmulationState {
    Idle,
    FieldObserved,
    FrameReceived,
    AwaitingReply,
    Transmitting,
    Terminated,
}

/// What the operator answered to a received frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Frame { data: Vec<u8>, append_crc: bool },
    /// Stop the session, restoring the radio
    End,
    /// Stop the session, leaving the listener configured
    Detach,
}

/// Parse an operator reply line (without its line terminator).
///
/// An odd-length line starting with `0` or `1` carries a leading CRC flag;
/// otherwise `default_crc` applies.
pub fn parse_reply(line: &str, default_crc: bool) -> Result<Reply, ParseError> {
    if !line.is_empty() && line.chars().all(|c| c == '\t') {
        return Ok(Reply::Detach);
    }

    let line = line.trim();
    if line.is_empty() || line == END_SENTINEL {
        return Ok(Reply::End);
    }

    let (append_crc, hex) = match line.as_bytes()[0] {
        b'0' if line.len() % 2 == 1 => (false, &line[1..]),
        b'1' if line.len() % 2 == 1 => (true, &line[1..]),
        _ => (default_crc, line),
    };

    Ok(Reply::Frame {
        data: parse_hex(hex)?,
        append_crc,
    })
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmulationExit {
    Interrupted,
    Aborted,
    Ended,
    Detached,
    InputClosed,
}

impl fmt::Display for EmulationExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmulationExit::Interrupted => write!(f, "interrupted"),
            EmulationExit::Aborted => write!(f, "aborted by hardware"),
            EmulationExit::Ended => write!(f, "ended by operator"),
            EmulationExit::Detached => write!(f, "detached, listener left configured"),
            EmulationExit::InputClosed => write!(f, "console input closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmulationSummary {
    pub exit: EmulationExit,
    pub frames_received: usize,
    pub replies_sent: usize,
}

struct Emulator<'a, H: NfcHal + ?Sized> {
    hal: &'a mut H,
    technology: Technology,
    config: &'a Config,
    state: EmulationState,
    frames_received: usize,
    replies_sent: usize,
}

impl<H: NfcHal + ?Sized> Emulator<'_, H> {
    fn set_state(&mut self, state: EmulationState) {
        if self.state != state {
            log::trace!("emulation {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn run<R: BufRead, W: Write>(&mut self, console: &mut Console<R, W>) -> Result<EmulationExit, CommandError> {
        loop {
            let event = self.hal.wait_event(self.config.emu_wait_slice_ms);

            if event.is_empty() || event == Event::TIMEOUT {
                if console.interrupt().take() {
                    return Ok(EmulationExit::Interrupted);
                }
                continue;
            }

            if event.contains(Event::ABORT_REQUEST) {
                return Ok(EmulationExit::Aborted);
            }
            if event.contains(Event::FIELD_ON) {
                writeln!(console, "Field on")?;
                self.set_state(EmulationState::FieldObserved);
            }
            if event.contains(Event::LISTENER_ACTIVE) {
                log::debug!("Listener activated by reader");
            }
            if event.contains(Event::RX_END) {
                if let Some(exit) = self.on_frame(console)? {
                    return Ok(exit);
                }
            }
            if event.contains(Event::FIELD_OFF) {
                writeln!(console, "Field off")?;
                self.hal.listener_idle()?;
                self.set_state(EmulationState::Idle);
            }
        }
    }

    fn on_frame<R: BufRead, W: Write>(&mut self, console: &mut Console<R, W>) -> Result<Option<EmulationExit>, CommandError> {
        self.set_state(EmulationState::FrameReceived);

        let rx = match self.hal.listener_rx(RX_CAP_BYTES) {
            Ok(rx) => rx,
            Err(e) => {
                writeln!(console, "Error. Receive failed: {e}")?;
                self.set_state(EmulationState::FieldObserved);
                return Ok(None);
            }
        };
        self.frames_received += 1;
        let fdt_start = Instant::now();

        if rx.is_byte_aligned() {
            writeln!(console, "{}", format_hex(rx.data()))?;
        } else {
            writeln!(console, "{} ({} bits)", format_hex(rx.data()), rx.size_bits())?;
        }
        console.flush()?;

        self.set_state(EmulationState::AwaitingReply);
        let Some(line) = console.read_line()? else {
            return Ok(Some(EmulationExit::InputClosed));
        };
        // Ctrl+C while the operator was typing discards the reply
        if console.interrupt().take() {
            return Ok(Some(EmulationExit::Interrupted));
        }

        let (data, with_crc) = match parse_reply(&line, self.config.emu_reply_crc) {
            Ok(Reply::Frame { data, append_crc }) => (data, append_crc),
            Ok(Reply::End) => return Ok(Some(EmulationExit::Ended)),
            Ok(Reply::Detach) => return Ok(Some(EmulationExit::Detached)),
            Err(e) => {
                writeln!(console, "Error. Reply not sent: {e}")?;
                self.set_state(EmulationState::FieldObserved);
                return Ok(None);
            }
        };

        let mut frame = BitBuffer::from_bytes(&data)?;
        if with_crc {
            append_crc(&mut frame, Some(self.technology))?;
        }

        let fdt = self.technology.listener_fdt();
        if let Some(remaining) = fdt.checked_sub(fdt_start.elapsed()) {
            if console.interrupt().wait_timeout(remaining) {
                return Ok(Some(EmulationExit::Interrupted));
            }
        }

        self.set_state(EmulationState::Transmitting);
        log::debug!("TX {}", format_hex(frame.data()));
        match self.hal.listener_tx(&frame) {
            Ok(()) => self.replies_sent += 1,
            Err(e) => writeln!(console, "Error. Transmit failed: {e}")?,
        }
        self.set_state(EmulationState::FieldObserved);
        Ok(None)
    }
}

/// Run an emulation session until the operator or the hardware ends it.
///
/// The session must already be in a listener mode. Unless the operator
/// detaches, the radio mode is reset and low-power mode restored on the
/// way out, also when the loop fails.
pub fn run<H: NfcHal + ?Sized, R: BufRead, W: Write>(
    hal: &mut H,
    session: &mut Session,
    config: &Config,
    console: &mut Console<R, W>,
) -> Result<EmulationSummary, CommandError> {
    let technology = match (session.mode, session.technology) {
        (Mode::Listener, Some(technology)) => technology,
        _ => return Err(CommandError::NotListener),
    };
    hal.is_ready().map_err(|_| CommandError::NotReady)?;

    let mut lease = HalLease::acquire(hal);
    session.low_power_stop(&mut *lease)?;
    if !session.hal_configured {
        lease.set_mode(Mode::Listener, technology)?;
        session.hal_configured = true;
    }
    lease
        .listener_set_identity(&session.identity)
        .map_err(CommandError::hal("Identity setup failed"))?;

    writeln!(console, "Emulating {technology}: {}", session.identity)?;
    writeln!(console, "Reply with [0|1]<hex>, empty line or '{END_SENTINEL}' to stop. Press Ctrl+C to abort")?;
    console.flush()?;

    let mut emulator = Emulator {
        hal: &mut *lease,
        technology,
        config,
        state: EmulationState::Idle,
        frames_received: 0,
        replies_sent: 0,
    };
    let result = emulator.run(console);
    emulator.set_state(EmulationState::Terminated);
    let (frames_received, replies_sent) = (emulator.frames_received, emulator.replies_sent);

    if !matches!(result, Ok(EmulationExit::Detached)) {
        if let Err(e) = lease.reset_mode() {
            log::warn!("Failed to reset radio mode: {e}");
        }
        session.hal_configured = false;
        if let Err(e) = session.low_power_start(&mut *lease) {
            log::warn!("Failed to restore low-power mode: {e}");
        }
        session.field_on = false;
    }

    let exit = result?;
    log::info!("Emulation stopped ({exit}): {frames_received} frames in, {replies_sent} replies out");
    writeln!(console, "Emulation stopped ({exit})")?;

    Ok(EmulationSummary {
        exit,
        frames_received,
        replies_sent,
    })
}
