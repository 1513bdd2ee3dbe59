use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{BufRead, Write};

use crate::core::bit_buffer::BitBuffer;
use crate::core::config::Config;
use crate::core::console::Console;
use crate::core::emulation;
use crate::core::error::CommandError;
use crate::core::session::{Mode, Session, Technology};
use crate::core::transceiver::{self, TransceiveOptions};
use crate::core::utils::{format_hex, hex_byte_len, parse_hex, parse_hex_into, parse_int, read_token};
use crate::hal::{HalLease, NfcHal};

/// Console command, resolved from its name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Field,
    FieldOn,
    FieldOff,
    SetMode(Technology, Mode),
    SetUid,
    SetSak,
    SetAtqa,
    Reqa,
    Send,
    RunEmu,
    Status,
    Help,
}

impl CommandKind {
    /// Commands that work without a radio attached
    fn needs_hardware(self) -> bool {
        !matches!(self, CommandKind::Status | CommandKind::Help)
    }
}

/// Name, handler and usage line of every console command
pub const COMMANDS: &[(&str, CommandKind, &str)] = &[
    ("field", CommandKind::Field, "turn field on until Ctrl+C"),
    ("on", CommandKind::FieldOn, "turn field on"),
    ("off", CommandKind::FieldOff, "turn field off"),
    (
        "mode_14443_a",
        CommandKind::SetMode(Technology::Iso14443a, Mode::Poller),
        "set mode ISO 14443 A",
    ),
    (
        "mode_14443_b",
        CommandKind::SetMode(Technology::Iso14443b, Mode::Poller),
        "set mode ISO 14443 B",
    ),
    (
        "mode_15693",
        CommandKind::SetMode(Technology::Iso15693, Mode::Poller),
        "set mode ISO 15693",
    ),
    (
        "mode_emu_14443_a",
        CommandKind::SetMode(Technology::Iso14443a, Mode::Listener),
        "set emulation mode ISO 14443 A",
    ),
    (
        "mode_emu_14443_b",
        CommandKind::SetMode(Technology::Iso14443b, Mode::Listener),
        "set emulation mode ISO 14443 B",
    ),
    (
        "mode_emu_15693",
        CommandKind::SetMode(Technology::Iso15693, Mode::Listener),
        "set emulation mode ISO 15693",
    ),
    ("set_uid", CommandKind::SetUid, "<uid:hex> - set emulated UID (1-20 bytes)"),
    ("set_sak", CommandKind::SetSak, "<sak:hex> - set emulated SAK (1 byte)"),
    ("set_atqa", CommandKind::SetAtqa, "<atqa:hex> - set emulated ATQA (2 bytes)"),
    ("reqa", CommandKind::Reqa, "send request-all of the current technology"),
    ("send", CommandKind::Send, "<add_crc:0|1> <cmd:hex> - send command"),
    ("run_emu", CommandKind::RunEmu, "run emulation in the current emulation mode"),
    ("status", CommandKind::Status, "show radio state and emulated identity"),
    ("help", CommandKind::Help, "show this list"),
];

/// One executed console command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub args: String,
    pub success: bool,
    pub error: Option<String>,
    pub response: Vec<u8>,
    pub duration_ms: u64,
}

/// Statistics about executed commands
#[derive(Debug, Clone)]
pub struct CommandStatistics {
    pub total_commands: usize,
    pub successful_commands: usize,
    pub failed_commands: usize,
    pub average_duration_ms: u64,
}

/// Runs console commands against one radio and one session
pub struct Dispatcher<H> {
    hal: Option<H>,
    session: Session,
    config: Config,
    table: HashMap<&'static str, CommandKind>,
    history: Vec<CommandRecord>,
}

impl<H: NfcHal> Dispatcher<H> {
    /// Create a dispatcher driving `hal`
    pub fn new(hal: H, config: Config) -> Result<Self, CommandError> {
        Self::build(Some(hal), config)
    }

    /// Create a dispatcher with no radio; only `help` and `status` work
    pub fn detached(config: Config) -> Result<Self, CommandError> {
        Self::build(None, config)
    }

    fn build(hal: Option<H>, config: Config) -> Result<Self, CommandError> {
        let session = Session::new(config.identity()?);
        let table = COMMANDS
            .iter()
            .map(|(name, kind, _)| (*name, *kind))
            .collect();

        Ok(Self {
            hal,
            session,
            config,
            table,
            history: Vec::new(),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn hal(&self) -> Option<&H> {
        self.hal.as_ref()
    }

    pub fn hal_mut(&mut self) -> Option<&mut H> {
        self.hal.as_mut()
    }

    pub fn lookup(&self, name: &str) -> Option<CommandKind> {
        self.table.get(name).copied()
    }

    /// Execute one command line, printing its output to `console`.
    ///
    /// Errors are returned, not printed, so the caller decides how to
    /// report them. Unknown commands also print the usage list.
    pub fn execute<R: BufRead, W: Write>(
        &mut self,
        line: &str,
        console: &mut Console<R, W>,
    ) -> Result<(), CommandError> {
        let Some((name, args)) = read_token(line) else {
            write_usage(console)?;
            return Ok(());
        };

        let start_time = std::time::Instant::now();
        let timestamp = Utc::now();
        log::info!("Executing: {name} {args}");

        let result = self.dispatch(name, args, console);
        let duration_ms = start_time.elapsed().as_millis() as u64;

        let (success, error, response) = match &result {
            Ok(response) => (true, None, response.clone()),
            Err(e) => {
                log::warn!("{name} failed: {e}");
                (false, Some(e.to_string()), Vec::new())
            }
        };
        self.history.push(CommandRecord {
            timestamp,
            command: name.to_string(),
            args: args.to_string(),
            success,
            error,
            response,
            duration_ms,
        });

        result.map(|_| ())
    }

    fn dispatch<R: BufRead, W: Write>(
        &mut self,
        name: &str,
        args: &str,
        console: &mut Console<R, W>,
    ) -> Result<Vec<u8>, CommandError> {
        let Some(kind) = self.lookup(name) else {
            write_usage(console)?;
            return Err(CommandError::UnknownCommand(name.to_string()));
        };

        if !kind.needs_hardware() {
            if kind == CommandKind::Status {
                return self.cmd_status(console);
            }
            write_usage(console)?;
            return Ok(Vec::new());
        }

        let Some(hal) = self.hal.as_mut() else {
            write_usage(console)?;
            return Err(CommandError::NoHardware);
        };
        let session = &mut self.session;
        let config = &self.config;

        match kind {
            CommandKind::Field => cmd_field(hal, session, console),
            CommandKind::FieldOn => cmd_field_on(hal, session, console),
            CommandKind::FieldOff => cmd_field_off(hal, session, console),
            CommandKind::SetMode(technology, mode) => cmd_set_mode(hal, session, technology, mode, console),
            CommandKind::SetUid => cmd_set_uid(session, args, console),
            CommandKind::SetSak => cmd_set_sak(session, args, console),
            CommandKind::SetAtqa => cmd_set_atqa(session, args, console),
            CommandKind::Reqa => cmd_reqa(hal, session, config, console),
            CommandKind::Send => cmd_send(hal, session, config, args, console),
            CommandKind::RunEmu => {
                emulation::run(hal, session, config, console)?;
                Ok(Vec::new())
            }
            CommandKind::Status | CommandKind::Help => Ok(Vec::new()),
        }
    }

    fn cmd_status<R: BufRead, W: Write>(&self, console: &mut Console<R, W>) -> Result<Vec<u8>, CommandError> {
        let session = &self.session;
        let technology = session
            .technology
            .map(|t| t.to_string())
            .unwrap_or_else(|| "none".to_string());

        writeln!(console, "Hardware: {}", if self.hal.is_some() { "attached" } else { "none" })?;
        writeln!(console, "Technology: {technology} ({})", session.mode)?;
        writeln!(console, "Field: {}", if session.field_on { "on" } else { "off" })?;
        writeln!(console, "Low power: {}", if session.is_low_power() { "yes" } else { "no" })?;
        writeln!(console, "Emulation: {}", session.identity)?;
        Ok(Vec::new())
    }

    /// Get command history
    pub fn history(&self) -> &[CommandRecord] {
        &self.history
    }

    /// Clear command history
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Export history to JSON
    pub fn export_history(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(&self.history).context("Failed to serialize command history")
    }

    /// Import history from JSON
    pub fn import_history(&mut self, json: &str) -> anyhow::Result<()> {
        let imported: Vec<CommandRecord> =
            serde_json::from_str(json).context("Failed to deserialize command history")?;

        self.history.extend(imported);
        Ok(())
    }

    /// Get statistics about command history
    pub fn get_statistics(&self) -> CommandStatistics {
        let total_commands = self.history.len();
        let successful_commands = self.history.iter().filter(|cmd| cmd.success).count();
        let failed_commands = total_commands - successful_commands;

        let average_duration_ms = if !self.history.is_empty() {
            self.history.iter().map(|cmd| cmd.duration_ms).sum::<u64>() / total_commands as u64
        } else {
            0
        };

        CommandStatistics {
            total_commands,
            successful_commands,
            failed_commands,
            average_duration_ms,
        }
    }
}

/// Print the command list
pub fn write_usage<W: Write>(out: &mut W) -> std::io::Result<()> {
    writeln!(out, "Usage:")?;
    writeln!(out, "nfc <cmd>")?;
    writeln!(out, "Cmd list:")?;
    for (name, _, help) in COMMANDS {
        writeln!(out, "\t{name:<18} - {help}")?;
    }
    Ok(())
}

fn ensure_ready<H: NfcHal>(hal: &H) -> Result<(), CommandError> {
    hal.is_ready().map_err(|_| CommandError::NotReady)
}

fn transceive_options(config: &Config, timeout_ms: u32) -> TransceiveOptions {
    TransceiveOptions {
        timeout_ms,
        slice_ms: config.poll_slice_ms,
        keep_partial_byte: config.keep_partial_byte,
    }
}

fn cmd_field<H: NfcHal, R: BufRead, W: Write>(
    hal: &mut H,
    session: &mut Session,
    console: &mut Console<R, W>,
) -> Result<Vec<u8>, CommandError> {
    ensure_ready(hal)?;
    let was_on = session.field_on;

    let mut lease = HalLease::acquire(hal);
    session.low_power_stop(&mut *lease)?;
    lease.poller_field_on()?;
    session.field_on = true;

    writeln!(console, "Field is on. Don't leave device in this mode for too long!!!")?;
    writeln!(console, "Press Ctrl+C to abort")?;
    console.flush()?;

    console.interrupt().wait();

    if !was_on {
        session.low_power_start(&mut *lease)?;
        session.field_on = false;
        writeln!(console, "Field is off.")?;
    }
    Ok(Vec::new())
}

fn cmd_field_on<H: NfcHal, R: BufRead, W: Write>(
    hal: &mut H,
    session: &mut Session,
    console: &mut Console<R, W>,
) -> Result<Vec<u8>, CommandError> {
    ensure_ready(hal)?;

    let mut lease = HalLease::acquire(hal);
    session.low_power_stop(&mut *lease)?;
    lease.poller_field_on()?;
    session.field_on = true;

    writeln!(console, "Field is on.")?;
    Ok(Vec::new())
}

fn cmd_field_off<H: NfcHal, R: BufRead, W: Write>(
    hal: &mut H,
    session: &mut Session,
    console: &mut Console<R, W>,
) -> Result<Vec<u8>, CommandError> {
    ensure_ready(hal)?;

    let mut lease = HalLease::acquire(hal);
    session.low_power_start(&mut *lease)?;
    session.field_on = false;

    writeln!(console, "Field is off.")?;
    Ok(Vec::new())
}

fn cmd_set_mode<H: NfcHal, R: BufRead, W: Write>(
    hal: &mut H,
    session: &mut Session,
    technology: Technology,
    mode: Mode,
    console: &mut Console<R, W>,
) -> Result<Vec<u8>, CommandError> {
    ensure_ready(hal)?;

    let mut lease = HalLease::acquire(hal);
    if session.hal_configured {
        lease.reset_mode()?;
        session.hal_configured = false;
    }
    lease.set_mode(mode, technology)?;
    session.hal_configured = true;
    session.technology = Some(technology);
    session.mode = mode;

    match mode {
        Mode::Poller => writeln!(console, "Set mode {technology}")?,
        Mode::Listener => writeln!(console, "Set emulation mode {technology}")?,
    }
    Ok(Vec::new())
}

fn hex_argument(args: &str, what: &'static str) -> Result<Vec<u8>, CommandError> {
    let token = read_token(args).map(|(token, _)| token).unwrap_or("");
    parse_hex(token).map_err(CommandError::parse(what))
}

fn cmd_set_uid<R: BufRead, W: Write>(
    session: &mut Session,
    args: &str,
    console: &mut Console<R, W>,
) -> Result<Vec<u8>, CommandError> {
    let uid = hex_argument(args, "Invalid UID")?;
    session.identity.set_uid(&uid)?;
    writeln!(console, "UID set to {} ({} bytes)", format_hex(&uid), uid.len())?;
    Ok(Vec::new())
}

fn cmd_set_sak<R: BufRead, W: Write>(
    session: &mut Session,
    args: &str,
    console: &mut Console<R, W>,
) -> Result<Vec<u8>, CommandError> {
    let sak = hex_argument(args, "Invalid SAK")?;
    session.identity.set_sak(&sak)?;
    writeln!(console, "SAK set to {}", format_hex(&sak))?;
    Ok(Vec::new())
}

fn cmd_set_atqa<R: BufRead, W: Write>(
    session: &mut Session,
    args: &str,
    console: &mut Console<R, W>,
) -> Result<Vec<u8>, CommandError> {
    let atqa = hex_argument(args, "Invalid ATQA")?;
    session.identity.set_atqa(&atqa)?;
    writeln!(console, "ATQA set to {}", format_hex(&atqa))?;
    Ok(Vec::new())
}

fn cmd_reqa<H: NfcHal, R: BufRead, W: Write>(
    hal: &mut H,
    session: &mut Session,
    config: &Config,
    console: &mut Console<R, W>,
) -> Result<Vec<u8>, CommandError> {
    transceiver::ensure_field_ready(session, hal)?;

    let technology = match session.technology {
        Some(technology) => technology,
        None if config.strict_technology => return Err(CommandError::TechnologyNotSet),
        None => Technology::Iso14443a,
    };

    let options = transceive_options(config, config.reqa_timeout_ms);
    let rx = transceiver::request_all(hal, technology, &options)?;

    let received = transceiver::frame_bytes(&rx, options.keep_partial_byte);
    let shown = match technology {
        Technology::Iso14443a => &received[..received.len().min(2)],
        _ => received,
    };
    writeln!(console, "{}", format_hex(shown))?;
    Ok(shown.to_vec())
}

fn cmd_send<H: NfcHal, R: BufRead, W: Write>(
    hal: &mut H,
    session: &mut Session,
    config: &Config,
    args: &str,
    console: &mut Console<R, W>,
) -> Result<Vec<u8>, CommandError> {
    transceiver::ensure_field_ready(session, hal)?;

    let (crc_token, rest) = read_token(args).unwrap_or(("", ""));
    let add_crc = match parse_int(crc_token) {
        Ok(0) => false,
        Ok(1) => true,
        _ => {
            return Err(CommandError::InvalidArgument(
                "Incorrect or missing crc value, expected int 0 or 1".to_string(),
            ))
        }
    };

    let Some((hex, _)) = read_token(rest) else {
        return Err(CommandError::InvalidArgument("No command found!!!".to_string()));
    };
    let mut data = vec![0u8; hex_byte_len(hex)];
    parse_hex_into(hex, &mut data).map_err(CommandError::parse("Command hex byte conversion error"))?;
    let mut frame = BitBuffer::from_bytes(&data)?;

    if add_crc && session.technology.is_none() {
        if config.strict_technology {
            return Err(CommandError::TechnologyNotSet);
        }
        log::warn!("No technology selected, sending without CRC");
    }

    let options = transceive_options(config, config.send_timeout_ms);
    let rx = transceiver::send(hal, &mut frame, session.technology, add_crc, &options)?;

    writeln!(console, "{}", transceiver::format_frame(&rx, options.keep_partial_byte))?;
    Ok(rx.data().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::console::Interrupt;
    use crate::hal::mock::MockHal;
    use crate::hal::Event;
    use std::io::Cursor;

    type TestConsole = Console<Cursor<Vec<u8>>, Vec<u8>>;

    fn console(input: &str) -> TestConsole {
        Console::new(Cursor::new(input.as_bytes().to_vec()), Vec::new(), Interrupt::new())
    }

    fn output(console: &TestConsole) -> String {
        String::from_utf8_lossy(console.output()).to_string()
    }

    fn dispatcher() -> Dispatcher<MockHal> {
        Dispatcher::new(MockHal::new(), Config::default()).unwrap()
    }

    #[test]
    fn table_covers_every_command() {
        let d = dispatcher();
        for (name, kind, _) in COMMANDS {
            assert_eq!(d.lookup(name), Some(*kind));
        }
        assert_eq!(d.lookup("Send"), None);
        assert_eq!(d.lookup("sen"), None);
    }

    #[test]
    fn empty_line_prints_usage() {
        let mut d = dispatcher();
        let mut c = console("");
        d.execute("   ", &mut c).unwrap();
        assert!(output(&c).contains("Cmd list:"));
        assert!(d.history().is_empty());
    }

    #[test]
    fn unknown_command_prints_usage() {
        let mut d = dispatcher();
        let mut c = console("");
        let err = d.execute("REQA", &mut c).unwrap_err();
        assert!(matches!(err, CommandError::UnknownCommand(ref n) if n == "REQA"));
        assert!(output(&c).contains("Cmd list:"));
    }

    #[test]
    fn detached_dispatcher_only_reports() {
        let mut d = Dispatcher::<MockHal>::detached(Config::default()).unwrap();
        let mut c = console("");
        assert!(matches!(d.execute("on", &mut c), Err(CommandError::NoHardware)));
        d.execute("status", &mut c).unwrap();
        assert!(output(&c).contains("Hardware: none"));
    }

    #[test]
    fn on_and_off_track_field_state() {
        let mut d = dispatcher();
        let mut c = console("");

        d.execute("on", &mut c).unwrap();
        assert!(d.session().field_on);
        assert!(!d.session().is_low_power());

        d.execute("off", &mut c).unwrap();
        assert!(!d.session().field_on);
        assert!(d.session().is_low_power());

        let hal = d.hal().unwrap();
        assert_eq!(hal.count("poller_field_on"), 1);
        assert_eq!(hal.count("low_power_mode_start"), 1);
        assert!(!hal.is_acquired());
    }

    #[test]
    fn mode_commands_reset_previous_mode() {
        let mut d = dispatcher();
        let mut c = console("");

        d.execute("mode_14443_a", &mut c).unwrap();
        d.execute("mode_emu_15693", &mut c).unwrap();

        assert_eq!(d.session().technology, Some(Technology::Iso15693));
        assert_eq!(d.session().mode, Mode::Listener);
        let hal = d.hal().unwrap();
        assert_eq!(hal.count("reset_mode"), 1);
        assert_eq!(
            hal.modes,
            vec![
                (Mode::Poller, Technology::Iso14443a),
                (Mode::Listener, Technology::Iso15693)
            ]
        );
        assert!(output(&c).contains("Set mode ISO 14443 A"));
        assert!(output(&c).contains("Set emulation mode ISO 15693"));
    }

    #[test]
    fn send_requires_field() {
        let mut d = dispatcher();
        let mut c = console("");
        assert!(matches!(d.execute("send 1 3000", &mut c), Err(CommandError::FieldOff)));
        assert!(d.hal().unwrap().poller_sent.is_empty());
    }

    #[test]
    fn send_rejects_bad_crc_flag() {
        let mut d = dispatcher();
        let mut c = console("");
        d.execute("on", &mut c).unwrap();
        for line in ["send", "send 2 3000", "send x 3000"] {
            let err = d.execute(line, &mut c).unwrap_err();
            assert!(err.to_string().contains("expected int 0 or 1"), "{line}");
        }
        let err = d.execute("send 1", &mut c).unwrap_err();
        assert!(err.to_string().contains("No command found"));
        let err = d.execute("send 1 300", &mut c).unwrap_err();
        assert!(err.to_string().contains("conversion error"));
    }

    #[test]
    fn send_appends_crc_for_iso14443a() {
        let mut d = dispatcher();
        let mut c = console("");
        d.execute("on", &mut c).unwrap();
        d.execute("mode_14443_a", &mut c).unwrap();

        let hal = d.hal_mut().unwrap();
        hal.push_event(Event::RX_END);
        hal.push_rx(&[0xAA, 0x55]);
        d.execute("send 1 3000", &mut c).unwrap();

        let hal = d.hal_mut().unwrap();
        assert_eq!(hal.poller_sent[0].data(), &[0x30, 0x00, 0x02, 0xA8]);
        hal.push_event(Event::RX_END);
        hal.push_rx(&[0xAA, 0x55]);
        d.execute("send 0 3000", &mut c).unwrap();
        assert_eq!(d.hal().unwrap().poller_sent[1].data(), &[0x30, 0x00]);

        assert!(output(&c).contains("AA55\n"));
        assert_eq!(d.history().last().unwrap().response, vec![0xAA, 0x55]);
    }

    #[test]
    fn send_without_technology_is_lenient_by_default() {
        let mut d = dispatcher();
        let mut c = console("");
        d.execute("on", &mut c).unwrap();

        let hal = d.hal_mut().unwrap();
        hal.push_event(Event::RX_END);
        hal.push_rx(&[0x01]);
        d.execute("send 1 3000", &mut c).unwrap();
        assert_eq!(d.hal().unwrap().poller_sent[0].data(), &[0x30, 0x00]);
    }

    #[test]
    fn strict_mode_rejects_crc_without_technology() {
        let config = Config {
            strict_technology: true,
            ..Config::default()
        };
        let mut d = Dispatcher::new(MockHal::new(), config).unwrap();
        let mut c = console("");
        d.execute("on", &mut c).unwrap();

        assert!(matches!(d.execute("send 1 3000", &mut c), Err(CommandError::TechnologyNotSet)));
        assert!(matches!(d.execute("reqa", &mut c), Err(CommandError::TechnologyNotSet)));
        assert!(d.hal().unwrap().poller_sent.is_empty());
    }

    #[test]
    fn send_drops_trailing_partial_byte() {
        let mut d = dispatcher();
        let mut c = console("");
        d.execute("on", &mut c).unwrap();
        let hal = d.hal_mut().unwrap();
        hal.push_event(Event::RX_END);
        hal.push_rx_bits(&[0x12, 0x34, 0x0F], 20);
        d.execute("send 0 AB", &mut c).unwrap();
        assert!(output(&c).ends_with("1234\n"));
    }

    #[test]
    fn send_keeps_partial_byte_when_configured() {
        let config = Config {
            keep_partial_byte: true,
            ..Config::default()
        };
        let mut d = Dispatcher::new(MockHal::new(), config).unwrap();
        let mut c = console("");
        d.execute("on", &mut c).unwrap();
        let hal = d.hal_mut().unwrap();
        hal.push_event(Event::RX_END);
        hal.push_rx_bits(&[0x12, 0x34, 0x0F], 20);
        d.execute("send 0 AB", &mut c).unwrap();
        assert!(output(&c).ends_with("12340F\n"));
    }

    #[test]
    fn send_timeout_is_reported() {
        let mut d = dispatcher();
        let mut c = console("");
        d.execute("on", &mut c).unwrap();
        let err = d.execute("send 0 3000", &mut c).unwrap_err();
        assert_eq!(err.to_string(), "Error. Timeout");
        assert!(!d.hal().unwrap().is_acquired());
    }

    #[test]
    fn reqa_prints_atqa() {
        let mut d = dispatcher();
        let mut c = console("");
        d.execute("on", &mut c).unwrap();
        let hal = d.hal_mut().unwrap();
        hal.push_event(Event::RX_END);
        hal.push_rx(&[0x44, 0x00]);

        d.execute("reqa", &mut c).unwrap();
        assert!(output(&c).ends_with("4400\n"));
    }

    #[test]
    fn identity_commands_validate() {
        let mut d = dispatcher();
        let mut c = console("");

        d.execute("set_uid AABBCCDD", &mut c).unwrap();
        assert_eq!(d.session().identity.uid(), &[0xAA, 0xBB, 0xCC, 0xDD]);

        assert!(d.execute("set_atqa 04", &mut c).is_err());
        assert!(d.execute("set_atqa 040000", &mut c).is_err());
        d.execute("set_atqa 0400", &mut c).unwrap();
        assert_eq!(d.session().identity.atqa(), [0x04, 0x00]);

        assert!(d.execute("set_sak 0800", &mut c).is_err());
        d.execute("set_sak 08", &mut c).unwrap();
        assert_eq!(d.session().identity.sak(), 0x08);

        assert!(d.execute("set_uid", &mut c).is_err());
        assert!(d.execute("set_uid ABC", &mut c).is_err());
        assert_eq!(d.session().identity.uid(), &[0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn field_waits_for_interrupt_and_restores() {
        let mut d = dispatcher();
        d.execute("mode_14443_a", &mut console("")).unwrap();

        let mut c = console("");
        c.interrupt().raise();
        d.execute("field", &mut c).unwrap();

        assert!(!d.session().field_on);
        assert!(d.session().is_low_power());
        assert_eq!(d.session().technology, Some(Technology::Iso14443a));
        assert!(output(&c).contains("Field is off."));
        assert!(!d.hal().unwrap().is_acquired());
    }

    #[test]
    fn field_keeps_prior_on_state() {
        let mut d = dispatcher();
        let mut c = console("");
        d.execute("on", &mut c).unwrap();
        c.interrupt().raise();
        d.execute("field", &mut c).unwrap();
        assert!(d.session().field_on);
    }

    #[test]
    fn not_ready_aborts_without_acquiring() {
        let mut d = dispatcher();
        d.hal_mut().unwrap().ready = false;
        let mut c = console("");
        assert!(matches!(d.execute("on", &mut c), Err(CommandError::NotReady)));
        assert_eq!(d.hal().unwrap().count("acquire"), 0);
        assert!(!d.session().field_on);
    }

    #[test]
    fn run_emu_requires_listener_mode() {
        let mut d = dispatcher();
        let mut c = console("");
        assert!(matches!(d.execute("run_emu", &mut c), Err(CommandError::NotListener)));
        d.execute("mode_14443_a", &mut c).unwrap();
        assert!(matches!(d.execute("run_emu", &mut c), Err(CommandError::NotListener)));
    }

    #[test]
    fn history_records_outcomes() {
        let mut d = dispatcher();
        let mut c = console("");
        d.execute("on", &mut c).unwrap();
        let _ = d.execute("send 9 00", &mut c);

        let history = d.history();
        assert_eq!(history.len(), 2);
        assert!(history[0].success);
        assert!(!history[1].success);
        assert_eq!(history[1].command, "send");
        assert_eq!(history[1].args, "9 00");

        let stats = d.get_statistics();
        assert_eq!(stats.total_commands, 2);
        assert_eq!(stats.failed_commands, 1);

        let json = d.export_history().unwrap();
        let mut other = dispatcher();
        other.import_history(&json).unwrap();
        assert_eq!(other.history().len(), 2);

        d.clear_history();
        assert!(d.history().is_empty());
    }

    #[test]
    fn import_invalid_json() {
        let mut d = dispatcher();
        assert!(d.import_history("invalid json").is_err());
        assert!(d.import_history("{}").is_err());
    }
}
