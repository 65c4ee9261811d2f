//! Stop-and-wait connection over one owned byte channel.
//!
//! # Architecture
//!
//! ```text
//!  Application
//!      │  send / send_end / receive / close
//!      ▼
//!  Connection<S>
//!    ├── Sender          (alternating id, outstanding frame + encoded bytes)
//!    ├── Receiver        (duplicate suppression, delivery queue, peer END)
//!    ├── Reassembler     (receive buffer → frames)
//!    ├── RetransmitTimer (deadline, retry count)
//!    └── S               (AsyncRead + AsyncWrite, exclusively owned)
//! ```
//!
//! Every blocking operation funnels into one private `step`, which waits for
//! whichever comes first: bytes from the channel or the retransmission
//! deadline.  Reads are polled first, so an ACK already sitting in the
//! channel is processed before a simultaneous expiry could retransmit.  ACK
//! handling, timer arming and retransmission therefore never interleave.
//!
//! # Usage
//!
//! ```ignore
//! let mut conn = Connection::new(stream, ConnectionConfig::default());
//! conn.send(b"hello").await?;
//! conn.send_end(b"").await?;
//! while let Received::Data(chunk) = conn.receive().await? {
//!     out.write_all(&chunk).await?;
//! }
//! conn.close().await?;
//! ```

use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{sleep_until, Instant};

use crate::frame::{Frame, FrameError, MAX_FRAME_LEN, MAX_PAYLOAD};
use crate::reassembler::Reassembler;
use crate::receiver::{Inbound, Receiver};
use crate::sender::Sender;
use crate::state::ConnectionState;
use crate::stats::ConnectionStats;
use crate::timer::{Expiry, RetransmitTimer, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT};

/// Stand-in deadline for a disarmed timer; its branch is disabled anyway.
const FAR_FUTURE: Duration = Duration::from_secs(365 * 24 * 3600);

/// Tunable protocol parameters.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// How long an outstanding frame waits for its ACK before being resent.
    pub retransmit_timeout: Duration,
    /// Retransmissions allowed before the connection resets itself.
    pub max_retries: u32,
    /// How long [`Connection::close`] keeps answering duplicates after the
    /// END exchange.  Zero skips the wait.
    pub linger: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            retransmit_timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            linger: Duration::ZERO,
        }
    }
}

/// Failures surfaced to the application.
///
/// Corrupt frames, duplicates and stale ACKs are handled internally and never
/// appear here.
#[derive(Debug, Error)]
pub enum ConnError {
    /// No ACK arrived within the retry ceiling; an RST was sent.
    #[error("no acknowledgement after maximum retransmissions; connection reset")]
    RetriesExhausted,
    /// The peer sent RST.
    #[error("connection reset by peer")]
    PeerReset,
    /// The operation is not allowed in the connection's current state.
    #[error("connection closed")]
    ConnectionClosed,
    /// The channel reached end-of-file before the END exchange completed.
    #[error("peer closed the channel before the end of stream")]
    PeerClosed,
    #[error("payload of {0} bytes exceeds the frame limit of {max} bytes", max = MAX_PAYLOAD)]
    PayloadTooLarge(usize),
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FrameError> for ConnError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::PayloadTooLarge(n) => Self::PayloadTooLarge(n),
            other => Self::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, other)),
        }
    }
}

/// Result of [`Connection::receive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Payload of one accepted data frame.
    Data(Bytes),
    /// The peer sent END and every payload before it has been delivered.
    End,
}

enum Event {
    Read(std::io::Result<usize>),
    Timeout,
}

/// One stop-and-wait session over channel `S`.
///
/// Single-owner: all operations take `&mut self`.  Callers that want to send
/// and receive from different tasks must serialise access themselves.
pub struct Connection<S> {
    channel: S,
    config: ConnectionConfig,
    state: ConnectionState,
    sender: Sender,
    receiver: Receiver,
    reassembler: Reassembler,
    timer: RetransmitTimer,
    stats: ConnectionStats,
    read_buf: Vec<u8>,
    /// Aborted, lost, or shut down; every further operation fails.
    terminated: bool,
    /// `close` has shut the channel down.
    shut_down: bool,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already-open channel.
    pub fn new(channel: S, config: ConnectionConfig) -> Self {
        let timer = RetransmitTimer::new(config.retransmit_timeout, config.max_retries);
        Self {
            channel,
            config,
            state: ConnectionState::Idle,
            sender: Sender::new(),
            receiver: Receiver::new(),
            reassembler: Reassembler::new(),
            timer,
            stats: ConnectionStats::default(),
            read_buf: vec![0u8; MAX_FRAME_LEN],
            terminated: false,
            shut_down: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Give the channel back, dropping any protocol state.
    pub fn into_inner(self) -> S {
        self.channel
    }

    // -----------------------------------------------------------------------
    // Public operations
    // -----------------------------------------------------------------------

    /// Send one data frame.
    ///
    /// Blocks while a previous frame is still unacknowledged, processing
    /// inbound traffic meanwhile; returns once the new frame is written and its
    /// timer armed.  Delivery is confirmed by a later call that drives the
    /// connection ([`flush`](Self::flush), [`receive`](Self::receive), the
    /// next send).
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), ConnError> {
        self.transmit(payload, false).await
    }

    /// Send the final data frame of this side's stream, flagged END.
    ///
    /// Once it is acknowledged every further send fails with
    /// [`ConnError::ConnectionClosed`].
    pub async fn send_end(&mut self, payload: &[u8]) -> Result<(), ConnError> {
        self.transmit(payload, true).await
    }

    /// Wait until nothing is outstanding.
    pub async fn flush(&mut self) -> Result<(), ConnError> {
        self.ensure_usable()?;
        self.wait_idle().await
    }

    /// Pull the next payload, or [`Received::End`] once the peer has finished.
    ///
    /// Keeps servicing ACKs and retransmissions for this side's outstanding
    /// frame while it waits.
    pub async fn receive(&mut self) -> Result<Received, ConnError> {
        loop {
            self.ensure_usable()?;
            if let Some(payload) = self.receiver.pop() {
                return Ok(Received::Data(payload));
            }
            if self.receiver.peer_finished() {
                return Ok(Received::End);
            }
            self.step().await?;
        }
    }

    /// Whatever [`receive`](Self::receive) would return right now without
    /// touching the channel, or `None` if it would have to wait.
    pub fn try_receive(&mut self) -> Option<Received> {
        if let Some(payload) = self.receiver.pop() {
            Some(Received::Data(payload))
        } else if self.receiver.peer_finished() && !self.terminated {
            Some(Received::End)
        } else {
            None
        }
    }

    /// Send a single RST carrying `reason` and enter [`ConnectionState::Closed`].
    pub async fn abort(&mut self, reason: &str) -> Result<(), ConnError> {
        self.ensure_usable()?;
        self.reset(reason).await;
        Ok(())
    }

    /// Orderly shutdown.
    ///
    /// Sends an empty END unless one was already sent, waits for its ACK and
    /// for the peer's END, lingers for [`ConnectionConfig::linger`] to answer
    /// late duplicates, then shuts the channel down.  Payloads received but
    /// never read are dropped.
    pub async fn close(&mut self) -> Result<(), ConnError> {
        if self.shut_down {
            return Ok(());
        }
        self.ensure_usable()?;

        if !self.sender.end_sent() {
            self.send_end(&[]).await?;
        }
        self.wait_idle().await?;
        while !self.receiver.peer_finished() {
            self.step().await?;
        }

        let unread = self.receiver.discard();
        if unread > 0 {
            log::warn!("[dccnet] closing with {unread} undelivered bytes");
        }

        self.linger().await;
        self.channel.shutdown().await?;
        self.shut_down = true;
        self.terminated = true;
        self.state = ConnectionState::Closed;
        log::debug!("[dccnet] closed ({})", self.stats);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Event loop
    // -----------------------------------------------------------------------

    async fn transmit(&mut self, payload: &[u8], end: bool) -> Result<(), ConnError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(ConnError::PayloadTooLarge(payload.len()));
        }
        self.ensure_usable()?;
        self.wait_idle().await?;
        if self.sender.end_sent() {
            return Err(ConnError::ConnectionClosed);
        }

        let frame = self.sender.build_frame(Bytes::copy_from_slice(payload), end);
        let encoded = frame.encode()?;
        self.write_raw(&encoded).await?;
        log::debug!(
            "[dccnet] → {} id={} len={}",
            if end { "END" } else { "DATA" },
            frame.id,
            frame.payload.len()
        );

        self.stats.frames_sent += 1;
        self.stats.bytes_sent += payload.len() as u64;
        self.sender.record_sent(frame, encoded);
        self.timer.arm();
        self.refresh_state();
        Ok(())
    }

    async fn wait_idle(&mut self) -> Result<(), ConnError> {
        while self.sender.has_outstanding() {
            self.step().await?;
        }
        Ok(())
    }

    /// Wait for one event (channel read or timer expiry) and process it.
    async fn step(&mut self) -> Result<(), ConnError> {
        let deadline = self.timer.deadline();
        let event = tokio::select! {
            biased;
            read = self.channel.read(&mut self.read_buf) => Event::Read(read),
            _ = sleep_until(deadline.unwrap_or_else(|| Instant::now() + FAR_FUTURE)),
                if deadline.is_some() => Event::Timeout,
        };

        match event {
            Event::Read(Ok(0)) => {
                log::debug!("[dccnet] channel reached EOF");
                self.terminate();
                Err(ConnError::PeerClosed)
            }
            Event::Read(Ok(n)) => {
                self.reassembler.extend(&self.read_buf[..n]);
                self.drain_frames().await
            }
            Event::Read(Err(e)) => {
                self.terminate();
                Err(ConnError::Io(e))
            }
            Event::Timeout => self.on_timeout().await,
        }
    }

    /// Process every complete frame currently buffered.
    async fn drain_frames(&mut self) -> Result<(), ConnError> {
        while let Some(item) = self.reassembler.next_frame() {
            match item {
                Ok(frame) => self.handle_frame(frame).await?,
                Err(e) => {
                    self.stats.malformed += 1;
                    log::debug!("[dccnet] discarding malformed input: {e}");
                }
            }
        }
        Ok(())
    }

    async fn handle_frame(&mut self, frame: Frame) -> Result<(), ConnError> {
        self.stats.frames_received += 1;

        if frame.is_rst() {
            log::warn!(
                "[dccnet] ← RST reason={:?}",
                String::from_utf8_lossy(&frame.payload)
            );
            self.terminate();
            return Err(ConnError::PeerReset);
        }

        if frame.is_ack() {
            if self.sender.on_ack(frame.id) {
                self.timer.disarm();
                self.refresh_state();
                log::debug!("[dccnet] ← ACK id={}", frame.id);
            } else {
                self.stats.stale_acks += 1;
                log::debug!("[dccnet] ← stale ACK id={} ignored", frame.id);
            }
            return Ok(());
        }

        match self.receiver.on_data(&frame) {
            Inbound::Accepted => {
                self.stats.bytes_received += frame.payload.len() as u64;
                self.write_ack(frame.id).await?;
                self.refresh_state();
                log::debug!(
                    "[dccnet] ← {} id={} len={}; → ACK",
                    if frame.is_end() { "END" } else { "DATA" },
                    frame.id,
                    frame.payload.len()
                );
            }
            Inbound::Duplicate => {
                self.stats.duplicates += 1;
                self.write_ack(frame.id).await?;
                log::debug!("[dccnet] ← duplicate id={}; → ACK again", frame.id);
            }
            Inbound::AfterEnd => {
                log::warn!("[dccnet] ← DATA id={} after peer END dropped", frame.id);
            }
        }
        Ok(())
    }

    async fn on_timeout(&mut self) -> Result<(), ConnError> {
        match self.timer.on_expiry() {
            Expiry::Retransmit { attempt } => {
                if let Some(bytes) = self.sender.on_retransmit() {
                    log::debug!(
                        "[dccnet] timeout, retransmitting id={} ({attempt}/{})",
                        self.sender.next_id(),
                        self.config.max_retries
                    );
                    self.stats.retransmissions += 1;
                    self.write_raw(&bytes).await?;
                } else {
                    self.timer.disarm();
                }
                Ok(())
            }
            Expiry::GiveUp => {
                log::warn!(
                    "[dccnet] no ACK after {} retransmissions; resetting",
                    self.config.max_retries
                );
                self.reset("retries exhausted").await;
                Err(ConnError::RetriesExhausted)
            }
        }
    }

    /// Keep answering duplicates until the peer hangs up or the linger expires.
    async fn linger(&mut self) {
        if self.config.linger.is_zero() {
            return;
        }
        let until = Instant::now() + self.config.linger;
        loop {
            let read = tokio::select! {
                read = self.channel.read(&mut self.read_buf) => read,
                _ = sleep_until(until) => break,
            };
            match read {
                Ok(n) if n > 0 => {
                    self.reassembler.extend(&self.read_buf[..n]);
                    if self.drain_frames().await.is_err() {
                        break;
                    }
                }
                _ => break,
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn write_ack(&mut self, id: u8) -> Result<(), ConnError> {
        let encoded = Frame::ack(id).encode()?;
        self.write_raw(&encoded).await?;
        self.stats.acks_sent += 1;
        Ok(())
    }

    async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), ConnError> {
        self.channel.write_all(bytes).await?;
        self.channel.flush().await?;
        Ok(())
    }

    /// Best-effort RST, then terminate.
    async fn reset(&mut self, reason: &str) {
        if let Ok(encoded) = Frame::rst(reason).encode() {
            if let Err(e) = self.write_raw(&encoded).await {
                log::debug!("[dccnet] RST not delivered: {e}");
            }
        }
        self.stats.resets_sent += 1;
        log::debug!("[dccnet] → RST reason={reason:?}");
        self.terminate();
    }

    fn terminate(&mut self) {
        self.terminated = true;
        self.timer.disarm();
        self.sender.clear();
        self.state = ConnectionState::Closed;
    }

    fn ensure_usable(&self) -> Result<(), ConnError> {
        if self.terminated {
            Err(ConnError::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    fn refresh_state(&mut self) {
        self.state = if self.terminated
            || (self.sender.is_finished() && self.receiver.peer_finished())
        {
            ConnectionState::Closed
        } else if self.sender.has_outstanding() {
            ConnectionState::AwaitingAck
        } else {
            ConnectionState::Idle
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::flags;
    use tokio::io::{duplex, DuplexStream};

    fn fast() -> ConnectionConfig {
        ConnectionConfig {
            retransmit_timeout: Duration::from_millis(20),
            max_retries: 3,
            linger: Duration::ZERO,
        }
    }

    fn pair() -> (Connection<DuplexStream>, DuplexStream) {
        let (a, b) = duplex(64 * 1024);
        (Connection::new(a, fast()), b)
    }

    async fn write_frame(peer: &mut DuplexStream, frame: Frame) {
        peer.write_all(&frame.encode().unwrap()).await.unwrap();
    }

    #[test]
    fn default_config_matches_protocol_constants() {
        let c = ConnectionConfig::default();
        assert_eq!(c.retransmit_timeout, Duration::from_secs(1));
        assert_eq!(c.max_retries, 16);
        assert!(c.linger.is_zero());
    }

    #[tokio::test]
    async fn new_connection_is_idle() {
        let (conn, _peer) = pair();
        assert_eq!(conn.state(), ConnectionState::Idle);
        assert_eq!(conn.stats(), &ConnectionStats::default());
    }

    #[tokio::test]
    async fn config_is_kept_as_given() {
        let (conn, _peer) = pair();
        assert_eq!(conn.config().retransmit_timeout, Duration::from_millis(20));
        assert_eq!(conn.config().max_retries, 3);
    }

    #[tokio::test]
    async fn send_enters_awaiting_ack_and_ack_returns_to_idle() {
        let (mut conn, mut peer) = pair();
        conn.send(b"hi").await.unwrap();
        assert_eq!(conn.state(), ConnectionState::AwaitingAck);

        write_frame(&mut peer, Frame::ack(0)).await;
        conn.flush().await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn oversized_payload_rejected_without_writing() {
        let (mut conn, _peer) = pair();
        let big = vec![0u8; MAX_PAYLOAD + 1];
        assert!(matches!(
            conn.send(&big).await,
            Err(ConnError::PayloadTooLarge(n)) if n == MAX_PAYLOAD + 1
        ));
        assert_eq!(conn.stats().frames_sent, 0);
        assert_eq!(conn.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn peer_eof_unblocks_receive() {
        let (mut conn, peer) = pair();
        drop(peer);
        assert!(matches!(conn.receive().await, Err(ConnError::PeerClosed)));
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(matches!(conn.receive().await, Err(ConnError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn rst_then_every_operation_fails_closed() {
        let (mut conn, mut peer) = pair();
        write_frame(&mut peer, Frame::new(0, flags::RST, Bytes::new())).await;
        assert!(matches!(conn.receive().await, Err(ConnError::PeerReset)));
        assert!(matches!(conn.send(b"x").await, Err(ConnError::ConnectionClosed)));
        assert!(matches!(conn.close().await, Err(ConnError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn abort_writes_rst_with_reason() {
        let (mut conn, mut peer) = pair();
        conn.abort("operator abort").await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Closed);

        let mut buf = vec![0u8; 64];
        let n = peer.read(&mut buf).await.unwrap();
        let (frame, _) = Frame::decode(&buf[..n]).unwrap().unwrap();
        assert!(frame.is_rst());
        assert_eq!(&frame.payload[..], b"operator abort");
    }

    #[tokio::test]
    async fn frame_error_conversion() {
        assert!(matches!(
            ConnError::from(FrameError::PayloadTooLarge(5000)),
            ConnError::PayloadTooLarge(5000)
        ));
        assert!(matches!(
            ConnError::from(FrameError::InvalidSync),
            ConnError::Io(_)
        ));
    }
}
