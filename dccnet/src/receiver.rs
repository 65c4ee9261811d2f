//! Inbound data-frame acceptance and delivery queue.
//!
//! The [`Receiver`] handles everything that happens *after* a data frame is
//! decoded and *before* the application reads its payload:
//! - Detecting retransmitted duplicates by comparing against the id of the
//!   last accepted frame.
//! - Queueing accepted payloads in arrival order.
//! - Recording the peer's END so the application sees end-of-stream once the
//!   queue drains.
//!
//! The [`Receiver`] does **not** send ACKs itself; the connection ACKs every
//! frame reported as [`Inbound::Accepted`] or [`Inbound::Duplicate`].

use std::collections::VecDeque;

use bytes::Bytes;

use crate::frame::Frame;

/// Outcome of offering a data frame to the [`Receiver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// New frame: payload queued, must be acknowledged.
    Accepted,
    /// Same id as the last accepted frame: re-acknowledge, do not deliver.
    Duplicate,
    /// New data after the peer's END; dropped without acknowledgement.
    AfterEnd,
}

#[derive(Debug, Default)]
pub struct Receiver {
    /// Id of the most recently accepted data frame.
    last_accepted_id: Option<u8>,
    /// Payloads accepted but not yet handed to the application.
    inbox: VecDeque<Bytes>,
    /// The peer's END frame has been accepted.
    peer_finished: bool,
}

impl Receiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a decoded data frame (neither ACK nor RST).
    pub fn on_data(&mut self, frame: &Frame) -> Inbound {
        if self.last_accepted_id == Some(frame.id) {
            return Inbound::Duplicate;
        }
        if self.peer_finished {
            return Inbound::AfterEnd;
        }

        self.last_accepted_id = Some(frame.id);
        if !frame.payload.is_empty() {
            self.inbox.push_back(frame.payload.clone());
        }
        if frame.is_end() {
            self.peer_finished = true;
        }
        Inbound::Accepted
    }

    /// Next payload in arrival order.
    pub fn pop(&mut self) -> Option<Bytes> {
        self.inbox.pop_front()
    }

    pub fn last_accepted_id(&self) -> Option<u8> {
        self.last_accepted_id
    }

    /// `true` once the peer's END frame has been accepted.
    pub fn peer_finished(&self) -> bool {
        self.peer_finished
    }

    /// Bytes waiting in the delivery queue.
    pub fn buffered_bytes(&self) -> usize {
        self.inbox.iter().map(Bytes::len).sum()
    }

    /// Drop undelivered payloads, returning how many bytes were lost.
    pub fn discard(&mut self) -> usize {
        let n = self.buffered_bytes();
        self.inbox.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::flags;

    #[test]
    fn first_frame_is_accepted() {
        let mut r = Receiver::new();
        assert_eq!(r.last_accepted_id(), None);
        assert_eq!(r.on_data(&Frame::data(0, &b"hello"[..])), Inbound::Accepted);
        assert_eq!(r.last_accepted_id(), Some(0));
        assert_eq!(r.pop().as_deref(), Some(&b"hello"[..]));
        assert_eq!(r.pop(), None);
    }

    #[test]
    fn first_frame_may_use_id_one() {
        let mut r = Receiver::new();
        assert_eq!(r.on_data(&Frame::data(1, &b"x"[..])), Inbound::Accepted);
    }

    #[test]
    fn duplicate_delivered_once() {
        let mut r = Receiver::new();
        let f = Frame::data(0, &b"once"[..]);
        assert_eq!(r.on_data(&f), Inbound::Accepted);
        assert_eq!(r.on_data(&f), Inbound::Duplicate);
        assert_eq!(r.buffered_bytes(), 4);
        assert_eq!(r.pop().as_deref(), Some(&b"once"[..]));
        assert_eq!(r.pop(), None);
    }

    #[test]
    fn alternating_ids_preserve_order() {
        let mut r = Receiver::new();
        r.on_data(&Frame::data(0, &b"data1"[..]));
        r.on_data(&Frame::data(1, &b"data2"[..]));
        r.on_data(&Frame::data(0, &b"data3"[..]));
        let got: Vec<Bytes> = std::iter::from_fn(|| r.pop()).collect();
        assert_eq!(got, vec!["data1", "data2", "data3"]);
    }

    #[test]
    fn empty_end_frame_queues_nothing() {
        let mut r = Receiver::new();
        let end = Frame::new(0, flags::END, Bytes::new());
        assert_eq!(r.on_data(&end), Inbound::Accepted);
        assert!(r.peer_finished());
        assert_eq!(r.pop(), None);
    }

    #[test]
    fn end_frame_payload_is_delivered() {
        let mut r = Receiver::new();
        r.on_data(&Frame::new(0, flags::END, &b"tail"[..]));
        assert!(r.peer_finished());
        assert_eq!(r.pop().as_deref(), Some(&b"tail"[..]));
    }

    #[test]
    fn duplicate_end_is_reacknowledged() {
        let mut r = Receiver::new();
        let end = Frame::new(1, flags::END, Bytes::new());
        r.on_data(&end);
        assert_eq!(r.on_data(&end), Inbound::Duplicate);
    }

    #[test]
    fn new_data_after_end_is_dropped() {
        let mut r = Receiver::new();
        r.on_data(&Frame::new(0, flags::END, Bytes::new()));
        assert_eq!(r.on_data(&Frame::data(1, &b"late"[..])), Inbound::AfterEnd);
        assert_eq!(r.pop(), None);
    }

    #[test]
    fn discard_reports_lost_bytes() {
        let mut r = Receiver::new();
        r.on_data(&Frame::data(0, &b"abc"[..]));
        r.on_data(&Frame::data(1, &b"de"[..]));
        assert_eq!(r.discard(), 5);
        assert_eq!(r.pop(), None);
    }
}
