//! Outbound frame state for stop-and-wait reliability.
//!
//! [`Sender`] tracks the alternating sequence id and the single in-flight
//! frame.  It does **not** touch the channel;
//! [`crate::connection::Connection`] calls these methods and owns the actual
//! read/write loop.
//!
//! # Stop-and-Wait contract
//! - At most **one** frame is in flight at any moment (`outstanding`).
//! - A new frame may only be sent once `outstanding` is `None`.
//! - On a matching ACK: toggle `next_id`; clear `outstanding`.
//! - On timeout: rewrite the stored encoded bytes unchanged.

use bytes::Bytes;

use crate::frame::{flags, Frame};

/// A frame that has been sent but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outstanding {
    pub frame: Frame,
    /// The exact bytes written on first transmission; retransmissions reuse them.
    pub encoded: Bytes,
}

/// Stop-and-wait send-side state for one connection.
#[derive(Debug, Default)]
pub struct Sender {
    /// Sequence id of the **next** data frame to send (0 or 1).
    next_id: u8,
    /// The in-flight frame, or `None` when the sender is idle.
    outstanding: Option<Outstanding>,
    /// An END frame has been written.
    end_sent: bool,
    /// The END frame has been acknowledged; the send side is closed.
    end_acked: bool,
}

impl Sender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> u8 {
        self.next_id
    }

    /// Build the next data frame, flagged END when `end` is set.
    ///
    /// The caller must subsequently call [`record_sent`](Self::record_sent)
    /// with the encoded bytes it wrote.
    pub fn build_frame(&self, payload: Bytes, end: bool) -> Frame {
        let flags = if end { flags::END } else { 0 };
        Frame::new(self.next_id, flags, payload)
    }

    /// Move `frame` into the in-flight slot (first transmission).
    pub fn record_sent(&mut self, frame: Frame, encoded: Bytes) {
        debug_assert!(
            self.outstanding.is_none(),
            "record_sent called while a frame is already in flight"
        );
        if frame.is_end() {
            self.end_sent = true;
        }
        self.outstanding = Some(Outstanding {
            frame,
            encoded,
        });
    }

    /// Process an inbound ACK carrying sequence id `id`.
    ///
    /// Returns `true` if it acknowledges the in-flight frame; the slot is
    /// cleared and `next_id` toggles.  Returns `false` for a stale ACK.
    pub fn on_ack(&mut self, id: u8) -> bool {
        match &self.outstanding {
            Some(entry) if entry.frame.id == id => {
                if entry.frame.is_end() {
                    self.end_acked = true;
                }
                self.outstanding = None;
                self.next_id ^= 1;
                true
            }
            _ => false,
        }
    }

    /// Bytes to rewrite for a retransmission.
    pub fn on_retransmit(&self) -> Option<Bytes> {
        self.outstanding.as_ref().map(|e| e.encoded.clone())
    }

    pub fn outstanding(&self) -> Option<&Outstanding> {
        self.outstanding.as_ref()
    }

    /// `true` when a frame is waiting for an ACK.
    pub fn has_outstanding(&self) -> bool {
        self.outstanding.is_some()
    }

    pub fn end_sent(&self) -> bool {
        self.end_sent
    }

    /// `true` once our END has been acknowledged.
    pub fn is_finished(&self) -> bool {
        self.end_acked
    }

    /// Forget the in-flight frame (connection aborted).
    pub fn clear(&mut self) {
        self.outstanding = None;
    }
}
