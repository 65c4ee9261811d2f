//! `dccnet-xfer` — exchange files with a peer over DCCNET.
//!
//! Each side sends its input file and stores what the peer sends in its
//! output file.  Exits non-zero if the connection is reset or gives up.

use std::path::PathBuf;

use clap::Parser;
use dccnet::app::{self, xfer, Mode, Tuning};

/// Bidirectional file transfer over a DCCNET link.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(flatten)]
    mode: Mode,
    /// File to send.
    input: PathBuf,
    /// Where to store the peer's file.
    output: PathBuf,
    #[command(flatten)]
    tuning: Tuning,
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut conn = app::connect(&cli.mode, &cli.tuning).await?;
    log::debug!("[xfer] {:?}", conn.config());
    xfer::run(&mut conn, &cli.input, &cli.output).await?;
    log::info!("[xfer] {}", conn.stats());
    log::debug!("[xfer] {:?}", conn.into_inner().faults());
    Ok(())
}

#[tokio::main]
async fn main() {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
