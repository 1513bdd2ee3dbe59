use anyhow::Result;

use nfc_cli::cli::commands::run_cli;

fn main() -> Result<()> {
    run_cli()
}
