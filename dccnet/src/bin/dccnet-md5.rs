//! `dccnet-md5` — answer each line received with its MD5 digest.

use clap::Parser;
use dccnet::app::{self, md5, Mode, Tuning};

/// MD5 line-digest responder over a DCCNET link.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(flatten)]
    mode: Mode,
    #[command(flatten)]
    tuning: Tuning,
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut conn = app::connect(&cli.mode, &cli.tuning).await?;
    log::debug!("[md5] {:?}", conn.config());
    md5::run(&mut conn).await?;
    log::info!("[md5] {}", conn.stats());
    log::debug!("[md5] {:?}", conn.into_inner().faults());
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
