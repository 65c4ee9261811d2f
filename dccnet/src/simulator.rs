//! Fault-injecting channel wrapper.
//!
//! Real links rarely lose anything over TCP, so the retransmission and resync
//! paths would go unexercised.  [`Simulator`] wraps any byte channel and
//! applies a fault model to every write call, which the connection issues
//! once per encoded frame:
//!
//! | Fault       | Effect on the written frame                         |
//! |-------------|-----------------------------------------------------|
//! | Drop        | Swallowed; reported as written.                     |
//! | Corruption  | One random bit flipped before forwarding.           |
//! | Duplication | Forwarded twice back to back.                       |
//!
//! Reads pass through untouched.  With every rate at zero the wrapper is a
//! transparent pass-through.  A fixed `seed` makes the fault sequence
//! reproducible.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Buf, BytesMut};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Fault probabilities, each in `[0.0, 1.0]`.
#[derive(Debug, Clone, Default)]
pub struct SimulatorConfig {
    pub drop_rate: f64,
    pub corrupt_rate: f64,
    pub duplicate_rate: f64,
    /// RNG seed; `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl SimulatorConfig {
    /// `true` when no fault can ever fire.
    pub fn is_passthrough(&self) -> bool {
        self.drop_rate <= 0.0 && self.corrupt_rate <= 0.0 && self.duplicate_rate <= 0.0
    }
}

/// Counters of injected faults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultCounts {
    pub dropped: u64,
    pub corrupted: u64,
    pub duplicated: u64,
}

pub struct Simulator<S> {
    inner: S,
    config: SimulatorConfig,
    rng: StdRng,
    /// Accepted bytes not yet handed to `inner`.
    pending: BytesMut,
    faults: FaultCounts,
}

impl<S> Simulator<S> {
    pub fn new(inner: S, mut config: SimulatorConfig) -> Self {
        config.drop_rate = config.drop_rate.clamp(0.0, 1.0);
        config.corrupt_rate = config.corrupt_rate.clamp(0.0, 1.0);
        config.duplicate_rate = config.duplicate_rate.clamp(0.0, 1.0);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            inner,
            config,
            rng,
            pending: BytesMut::new(),
            faults: FaultCounts::default(),
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn faults(&self) -> FaultCounts {
        self.faults
    }

    /// Run `buf` through the fault model and queue what survives.
    fn inject(&mut self, buf: &[u8]) {
        if self.config.is_passthrough() {
            self.pending.extend_from_slice(buf);
            return;
        }
        if self.rng.gen_bool(self.config.drop_rate) {
            self.faults.dropped += 1;
            log::trace!("[simulator] dropped {} bytes", buf.len());
            return;
        }

        let start = self.pending.len();
        self.pending.extend_from_slice(buf);
        if !buf.is_empty() && self.rng.gen_bool(self.config.corrupt_rate) {
            let bit = self.rng.gen_range(0..buf.len() * 8);
            self.pending[start + bit / 8] ^= 1 << (bit % 8);
            self.faults.corrupted += 1;
            log::trace!("[simulator] flipped bit {bit} of {} bytes", buf.len());
        }
        if self.rng.gen_bool(self.config.duplicate_rate) {
            let copy = self.pending[start..].to_vec();
            self.pending.extend_from_slice(&copy);
            self.faults.duplicated += 1;
            log::trace!("[simulator] duplicated {} bytes", buf.len());
        }
    }
}

impl<S: AsyncWrite + Unpin> Simulator<S> {
    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while !self.pending.is_empty() {
            let n = ready!(Pin::new(&mut self.inner).poll_write(cx, &self.pending))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.pending.advance(n);
        }
        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Simulator<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Simulator<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        this.inject(buf);
        // Progress is best-effort here; flush finishes the job.
        if let Poll::Ready(Err(e)) = this.poll_drain(cx) {
            return Poll::Ready(Err(e));
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    async fn write_and_collect(
        config: SimulatorConfig,
        writes: &[&[u8]],
    ) -> (Vec<u8>, FaultCounts) {
        let (a, mut b) = duplex(64 * 1024);
        let mut sim = Simulator::new(a, config);
        for w in writes {
            sim.write_all(w).await.unwrap();
            sim.flush().await.unwrap();
        }
        let faults = sim.faults();
        sim.shutdown().await.unwrap();
        drop(sim);
        let mut out = Vec::new();
        b.read_to_end(&mut out).await.unwrap();
        (out, faults)
    }

    #[tokio::test]
    async fn default_config_is_passthrough() {
        let config = SimulatorConfig::default();
        assert!(config.is_passthrough());
        let (out, faults) = write_and_collect(config, &[&b"abc"[..], &b"def"[..]]).await;
        assert_eq!(out, b"abcdef");
        assert_eq!(faults, FaultCounts::default());
    }

    #[tokio::test]
    async fn full_drop_rate_swallows_everything() {
        let config = SimulatorConfig {
            drop_rate: 1.0,
            seed: Some(1),
            ..Default::default()
        };
        let (out, faults) = write_and_collect(config, &[&b"abc"[..], &b"def"[..]]).await;
        assert!(out.is_empty());
        assert_eq!(faults.dropped, 2);
    }

    #[tokio::test]
    async fn corruption_flips_exactly_one_bit() {
        let config = SimulatorConfig {
            corrupt_rate: 1.0,
            seed: Some(7),
            ..Default::default()
        };
        let input = [0u8; 32];
        let (out, faults) = write_and_collect(config, &[&input[..]]).await;
        assert_eq!(out.len(), input.len());
        let flipped: u32 = out.iter().map(|b| b.count_ones()).sum();
        assert_eq!(flipped, 1);
        assert_eq!(faults.corrupted, 1);
    }

    #[tokio::test]
    async fn duplication_repeats_the_write() {
        let config = SimulatorConfig {
            duplicate_rate: 1.0,
            seed: Some(3),
            ..Default::default()
        };
        let (out, faults) = write_and_collect(config, &[&b"frame"[..]]).await;
        assert_eq!(out, b"frameframe");
        assert_eq!(faults.duplicated, 1);
    }

    #[tokio::test]
    async fn same_seed_same_faults() {
        let config = SimulatorConfig {
            drop_rate: 0.5,
            corrupt_rate: 0.3,
            seed: Some(42),
            ..Default::default()
        };
        let writes = vec![&b"0123456789"[..]; 20];
        let first = write_and_collect(config.clone(), &writes).await;
        let second = write_and_collect(config, &writes).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn rates_are_clamped() {
        let (a, _b) = duplex(16);
        let sim = Simulator::new(
            a,
            SimulatorConfig {
                drop_rate: 3.0,
                corrupt_rate: -1.0,
                ..Default::default()
            },
        );
        assert_eq!(sim.config().drop_rate, 1.0);
        assert_eq!(sim.config().corrupt_rate, 0.0);
    }
}
