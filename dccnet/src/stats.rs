//! Per-connection counters.
//!
//! Owned by the connection that updates them; read through
//! [`crate::connection::Connection::stats`].

use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Data frames written for the first time.
    pub frames_sent: u64,
    /// Payload bytes in those frames.
    pub bytes_sent: u64,
    /// Timer-driven rewrites of an outstanding frame.
    pub retransmissions: u64,
    pub acks_sent: u64,
    /// Frames that decoded cleanly.
    pub frames_received: u64,
    /// Payload bytes accepted for delivery.
    pub bytes_received: u64,
    /// Data frames suppressed as retransmitted duplicates.
    pub duplicates: u64,
    /// ACKs that did not match the outstanding frame.
    pub stale_acks: u64,
    /// Decode failures (bad sync, checksum or length).
    pub malformed: u64,
    pub resets_sent: u64,
}

impl fmt::Display for ConnectionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent={} frames/{} bytes retransmits={} received={} frames/{} bytes duplicates={} stale_acks={} malformed={}",
            self.frames_sent,
            self.bytes_sent,
            self.retransmissions,
            self.frames_received,
            self.bytes_received,
            self.duplicates,
            self.stale_acks,
            self.malformed,
        )
    }
}
