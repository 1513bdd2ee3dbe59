use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::core::{
    commands::Dispatcher,
    config::Config,
    console::{Console, Interrupt},
    utils::format_hex_spaced,
};
use crate::hal::{sim::SimulatedHal, NfcHal};

#[derive(Parser)]
#[command(name = "nfc-cli")]
#[command(about = "Debug console for an NFC radio: field control, raw frames and tag emulation")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// JSON config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Radio backend
    #[arg(long, global = true, default_value = "sim")]
    pub backend: Backend,

    /// Refuse CRC and REQA operations until a technology is selected
    #[arg(long, global = true)]
    pub strict: bool,

    /// Load a previously exported command history before running
    #[arg(long, global = true)]
    pub history_in: Option<PathBuf>,

    /// Write the command history as JSON on exit
    #[arg(long, global = true)]
    pub history_out: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive console
    Shell,

    /// Execute commands from a script file
    Script {
        /// Script file path
        file: String,

        /// Continue on errors
        #[arg(short, long)]
        continue_on_error: bool,
    },

    /// Execute a single command
    Exec {
        /// Command and its arguments (e.g. "send 1 3000")
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        words: Vec<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Backend {
    Sim,
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sim" => Ok(Backend::Sim),
            _ => Err(format!("Invalid backend: {s} (available: sim)")),
        }
    }
}

type StdConsole = Console<io::StdinLock<'static>, io::Stdout>;

pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.debug {
        log::LevelFilter::Debug
    } else if cli.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if cli.strict {
        config.strict_technology = true;
    }

    let interrupt = Interrupt::new();
    let handler = interrupt.clone();
    ctrlc::set_handler(move || handler.raise()).context("Failed to install Ctrl+C handler")?;

    let hal = match cli.backend {
        Backend::Sim => SimulatedHal::new(),
    };
    let mut dispatcher = Dispatcher::new(hal, config).context("Invalid emulation identity")?;
    if let Some(path) = &cli.history_in {
        read_history(&mut dispatcher, path)?;
    }
    let mut console = Console::new(io::stdin().lock(), io::stdout(), interrupt);

    let result = match cli.command {
        Commands::Shell => cmd_shell(&mut dispatcher, &mut console),
        Commands::Script {
            file,
            continue_on_error,
        } => cmd_script(&mut dispatcher, &mut console, &file, continue_on_error),
        Commands::Exec { words } => cmd_exec(&mut dispatcher, &mut console, &words.join(" ")),
    };

    if let Some(path) = &cli.history_out {
        write_history(&dispatcher, path)?;
    }

    result
}

fn read_history<H: NfcHal>(dispatcher: &mut Dispatcher<H>, path: &Path) -> Result<()> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file: {}", path.display()))?;
    dispatcher
        .import_history(&json)
        .with_context(|| format!("Invalid history file: {}", path.display()))?;
    log::info!("Loaded {} history records from {}", dispatcher.history().len(), path.display());
    Ok(())
}

fn write_history<H: NfcHal>(dispatcher: &Dispatcher<H>, path: &Path) -> Result<()> {
    let json = dispatcher.export_history()?;
    fs::write(path, json).with_context(|| format!("Failed to write history file: {}", path.display()))?;
    log::info!("History written to {}", path.display());
    Ok(())
}

fn cmd_exec<H: NfcHal>(dispatcher: &mut Dispatcher<H>, console: &mut StdConsole, line: &str) -> Result<()> {
    dispatcher
        .execute(line, console)
        .with_context(|| format!("Command failed: {line}"))
}

fn cmd_script<H: NfcHal>(
    dispatcher: &mut Dispatcher<H>,
    console: &mut StdConsole,
    file_path: &str,
    continue_on_error: bool,
) -> Result<()> {
    let file = File::open(file_path)
        .with_context(|| format!("Failed to open script file: {file_path}"))?;

    let reader_buf = BufReader::new(file);
    let mut line_number = 0;
    let mut errors = 0;

    writeln!(console, "Executing script: {file_path}")?;
    writeln!(console)?;

    for line in reader_buf.lines() {
        line_number += 1;
        let line = line.context("Failed to read line from script")?;
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }

        writeln!(console, "Line {line_number}: {line}")?;
        console.interrupt().take();

        if let Err(e) = dispatcher.execute(line, console) {
            errors += 1;
            writeln!(console, "{e}")?;
            if !continue_on_error {
                bail!(
                    "Script execution stopped due to error on line {}",
                    line_number
                );
            }
        }
        writeln!(console)?;
    }

    writeln!(console, "Script execution completed.")?;
    writeln!(console, "Total lines processed: {line_number}")?;
    if errors > 0 {
        writeln!(console, "Errors encountered: {errors}")?;
    }

    Ok(())
}

fn cmd_shell<H: NfcHal, R: BufRead, W: Write>(
    dispatcher: &mut Dispatcher<H>,
    console: &mut Console<R, W>,
) -> Result<()> {
    writeln!(console, "NFC Console - Interactive Mode")?;
    writeln!(console, "Type 'help' for commands, 'history', 'clear', 'quit'.")?;
    writeln!(console, "Ctrl+C stops a running command or discards the line being typed; 'quit' or Ctrl+D leaves.")?;
    writeln!(console)?;

    loop {
        write!(console, "nfc> ")?;
        console.flush()?;

        let Some(input) = console.read_line().context("Failed to read input")? else {
            writeln!(console)?;
            break;
        };

        if console.interrupt().take() {
            writeln!(console, "^C")?;
            continue;
        }
        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "quit" | "exit" | "q" => break,
            "history" => print_history(dispatcher, console)?,
            "clear" => {
                dispatcher.clear_history();
                writeln!(console, "Command history cleared")?;
            }
            _ => {
                if let Err(e) = dispatcher.execute(input, console) {
                    writeln!(console, "{e}")?;
                }
            }
        }
        // Only commands that wait consume the interrupt
        console.interrupt().take();
    }

    let stats = dispatcher.get_statistics();
    log::info!(
        "Session closed: {} commands, {} failed, {} ms average",
        stats.total_commands,
        stats.failed_commands,
        stats.average_duration_ms
    );
    writeln!(console, "Goodbye!")?;
    Ok(())
}

fn print_history<H: NfcHal, W: Write>(dispatcher: &Dispatcher<H>, console: &mut W) -> Result<()> {
    let history = dispatcher.history();
    if history.is_empty() {
        writeln!(console, "No commands in history")?;
        return Ok(());
    }

    writeln!(console, "Command history:")?;
    for (i, cmd) in history.iter().enumerate() {
        let status = if cmd.success { "OK" } else { "ERROR" };
        write!(
            console,
            "  [{}] {} {} {} - {} ({}ms)",
            i + 1,
            cmd.timestamp.format("%H:%M:%S"),
            cmd.command,
            cmd.args,
            status,
            cmd.duration_ms
        )?;
        if !cmd.response.is_empty() {
            write!(console, " -> {}", format_hex_spaced(&cmd.response))?;
        }
        writeln!(console)?;
    }
    Ok(())
}
