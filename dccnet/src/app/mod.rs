//! Command-line surface shared by the two collaborator binaries.
//!
//! Both programs take the same role selector and tuning flags:
//!
//! ```text
//! dccnet-xfer (-s <PORT> | -c <HOST:PORT>) <INPUT> <OUTPUT> [tuning]
//! dccnet-md5  (-s <PORT> | -c <HOST:PORT>) [tuning]
//! ```
//!
//! [`connect`] turns them into a ready [`Connection`]: a server accepts exactly
//! one peer, a client dials out, and either way the TCP stream is wrapped in
//! a [`Simulator`] (a pass-through unless `--loss`/`--corrupt` are given).

pub mod md5;
pub mod xfer;

use std::time::Duration;

use anyhow::Context;
use clap::Args;
use tokio::net::{TcpListener, TcpStream};

use crate::connection::{Connection, ConnectionConfig};
use crate::simulator::{Simulator, SimulatorConfig};
use crate::timer::{DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT};

/// Channel type used by the binaries.
pub type Channel = Simulator<TcpStream>;

/// Which end of the TCP connection to play.
#[derive(Debug, Clone, Args)]
#[group(required = true, multiple = false)]
pub struct Mode {
    /// Listen on this port and accept a single peer.
    #[arg(short, long, value_name = "PORT")]
    pub server: Option<u16>,
    /// Connect to a listening peer.
    #[arg(short, long, value_name = "HOST:PORT")]
    pub client: Option<String>,
}

/// Protocol and fault-injection knobs.
#[derive(Debug, Clone, Args)]
pub struct Tuning {
    /// Retransmission timeout in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = DEFAULT_TIMEOUT.as_millis() as u64)]
    pub timeout_ms: u64,
    /// Retransmissions before the connection resets itself.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,
    /// Time to keep answering duplicates after both ENDs
    /// [default: 0, or 3 timeouts when faults are injected].
    #[arg(long, value_name = "MS")]
    pub linger_ms: Option<u64>,
    /// Probability of dropping each outgoing frame.
    #[arg(long, value_name = "P", default_value_t = 0.0, value_parser = parse_probability)]
    pub loss: f64,
    /// Probability of flipping one bit in each outgoing frame.
    #[arg(long, value_name = "P", default_value_t = 0.0, value_parser = parse_probability)]
    pub corrupt: f64,
    /// Seed for the fault injector.
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,
}

impl Tuning {
    pub fn simulator_config(&self) -> SimulatorConfig {
        SimulatorConfig {
            drop_rate: self.loss,
            corrupt_rate: self.corrupt,
            duplicate_rate: 0.0,
            seed: self.seed,
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        let retransmit_timeout = Duration::from_millis(self.timeout_ms);
        let linger = match self.linger_ms {
            Some(ms) => Duration::from_millis(ms),
            None if self.simulator_config().is_passthrough() => Duration::ZERO,
            None => retransmit_timeout * 3,
        };
        ConnectionConfig {
            retransmit_timeout,
            max_retries: self.max_retries,
            linger,
        }
    }
}

fn parse_probability(s: &str) -> Result<f64, String> {
    let p: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&p) {
        Ok(p)
    } else {
        Err(format!("{p} is not a probability in [0, 1]"))
    }
}

/// Open the TCP channel selected by `mode`.
pub async fn open_channel(mode: &Mode) -> anyhow::Result<TcpStream> {
    let stream = match (&mode.server, &mode.client) {
        (Some(port), _) => {
            let listener = TcpListener::bind(("0.0.0.0", *port))
                .await
                .with_context(|| format!("binding port {port}"))?;
            log::info!("[app] listening on {}", listener.local_addr()?);
            let (stream, peer) = listener.accept().await.context("accepting peer")?;
            log::info!("[app] accepted {peer}");
            stream
        }
        (None, Some(addr)) => {
            let stream = TcpStream::connect(addr.as_str())
                .await
                .with_context(|| format!("connecting to {addr}"))?;
            log::info!("[app] connected to {addr}");
            stream
        }
        (None, None) => anyhow::bail!("one of --server or --client is required"),
    };
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Open the channel and wrap it in a [`Connection`].
pub async fn connect(mode: &Mode, tuning: &Tuning) -> anyhow::Result<Connection<Channel>> {
    let stream = open_channel(mode).await?;
    let sim = tuning.simulator_config();
    if !sim.is_passthrough() {
        log::info!(
            "[app] injecting faults: loss={} corrupt={} seed={:?}",
            sim.drop_rate,
            sim.corrupt_rate,
            sim.seed
        );
    }
    Ok(Connection::new(
        Simulator::new(stream, sim),
        tuning.connection_config(),
    ))
}
