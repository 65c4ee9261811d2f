//! Inbound byte accumulation and frame extraction.
//!
//! The channel is a byte stream: one read may deliver half a frame, or three
//! frames and the start of a fourth.  [`Reassembler`] owns the receive buffer,
//! appends whatever arrives, and peels complete frames off the front.
//!
//! Malformed input never stalls the stream.  When the bytes at the front fail
//! to decode, the buffer is advanced to the next position that could start a
//! sync pattern and scanning resumes from there; lost frames are recovered by
//! the peer's retransmission, not here.
//!
//! A corrupted length field is the one fault a checksum cannot reject right
//! away: the frame just looks incomplete.  While the front frame waits for
//! bytes, any later complete frame that passes its checksum proves the
//! declared length wrong, and the front bytes are dropped up to it.

use bytes::{Buf, BytesMut};

use crate::frame::{declared_length, Frame, FrameError, HEADER_LEN, MAX_FRAME_LEN, SYNC_PATTERN};

/// Receive buffer plus the frame-extraction loop.
#[derive(Debug)]
pub struct Reassembler {
    buffer: BytesMut,
    /// Bytes thrown away while resynchronising.
    discarded: u64,
}

impl Reassembler {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(2 * MAX_FRAME_LEN),
            discarded: 0,
        }
    }

    /// Append freshly read bytes without extracting anything.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Extract the next item from the front of the buffer.
    ///
    /// Returns:
    /// - `None` when the buffer holds no complete frame,
    /// - `Some(Ok(frame))` after removing exactly that frame's bytes,
    /// - `Some(Err(..))` after discarding the malformed prefix, including an
    ///   incomplete frame that a later valid frame shows to be corrupt.
    ///
    /// Call repeatedly until it returns `None`.
    pub fn next_frame(&mut self) -> Option<Result<Frame, FrameError>> {
        match Frame::decode(&self.buffer) {
            Ok(None) => {
                let next = self.next_valid_frame()?;
                let declared = declared_length(&self.buffer);
                self.buffer.advance(next);
                self.discarded += next as u64;
                Some(Err(FrameError::LengthOverrun(declared)))
            }
            Ok(Some((frame, consumed))) => {
                self.buffer.advance(consumed);
                Some(Ok(frame))
            }
            Err(e) => {
                self.resync();
                Some(Err(e))
            }
        }
    }

    /// Append `data` and return every complete, valid frame now available.
    ///
    /// Malformed frames are skipped; use [`next_frame`](Self::next_frame) to
    /// observe them.
    pub fn push(&mut self, data: &[u8]) -> Vec<Frame> {
        self.extend(data);
        let mut frames = Vec::new();
        while let Some(item) = self.next_frame() {
            match item {
                Ok(frame) => frames.push(frame),
                Err(e) => log::debug!("[reassembler] dropped malformed frame: {e}"),
            }
        }
        frames
    }

    /// Number of buffered bytes not yet assembled into frames.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Total bytes discarded while resynchronising.
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }

    /// Offset of the first complete, valid frame after the front one.
    fn next_valid_frame(&self) -> Option<usize> {
        if self.buffer.len() < HEADER_LEN {
            return None;
        }
        self.buffer
            .windows(SYNC_PATTERN.len())
            .enumerate()
            .skip(1)
            .filter(|(_, w)| *w == SYNC_PATTERN)
            .map(|(i, _)| i)
            .find(|&i| matches!(Frame::decode(&self.buffer[i..]), Ok(Some(_))))
    }

    /// Skip past the rejected frame start to the next sync candidate.
    ///
    /// At least one byte is always dropped, so repeated failures make progress.
    fn resync(&mut self) {
        let skip = sync_candidate(&self.buffer[1..])
            .map(|i| i + 1)
            .unwrap_or(self.buffer.len());
        self.buffer.advance(skip);
        self.discarded += skip as u64;
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Index of the first position whose bytes match the sync pattern, or a
/// prefix of it when the buffer ends early.
fn sync_candidate(buf: &[u8]) -> Option<usize> {
    (0..buf.len()).find(|&i| {
        let tail = &buf[i..];
        let n = tail.len().min(SYNC_PATTERN.len());
        tail[..n] == SYNC_PATTERN[..n]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{flags, HEADER_LEN};

    fn encoded(frame: &Frame) -> Vec<u8> {
        frame.encode().unwrap().to_vec()
    }

    #[test]
    fn single_complete_frame() {
        let mut r = Reassembler::new();
        let frames = r.push(&encoded(&Frame::data(0, &b"hello"[..])));
        assert_eq!(frames, vec![Frame::data(0, &b"hello"[..])]);
        assert!(r.is_empty());
    }

    #[test]
    fn multiple_frames_in_one_read() {
        let mut r = Reassembler::new();
        let mut bytes = encoded(&Frame::data(0, &b"data1"[..]));
        bytes.extend(encoded(&Frame::data(1, &b"data2"[..])));
        bytes.extend(encoded(&Frame::ack(0)));

        let frames = r.push(&bytes);
        assert_eq!(frames.len(), 3);
        assert_eq!(&frames[0].payload[..], b"data1");
        assert_eq!(&frames[1].payload[..], b"data2");
        assert!(frames[2].is_ack());
        assert!(r.is_empty());
    }

    #[test]
    fn frame_split_across_reads() {
        let mut r = Reassembler::new();
        let bytes = encoded(&Frame::data(1, &b"split payload"[..]));

        assert!(r.push(&bytes[..5]).is_empty());
        assert!(r.push(&bytes[5..HEADER_LEN + 3]).is_empty());
        assert_eq!(r.len(), HEADER_LEN + 3);

        let frames = r.push(&bytes[HEADER_LEN + 3..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0].payload[..], b"split payload");
        assert!(r.is_empty());
    }

    #[test]
    fn byte_at_a_time() {
        let mut r = Reassembler::new();
        let mut bytes = encoded(&Frame::data(0, &b"a"[..]));
        bytes.extend(encoded(&Frame::new(1, flags::END, &b"b"[..])));

        let mut frames = Vec::new();
        for b in &bytes {
            frames.extend(r.push(std::slice::from_ref(b)));
        }
        assert_eq!(frames.len(), 2);
        assert!(frames[1].is_end());
    }

    #[test]
    fn leading_garbage_is_skipped() {
        let mut r = Reassembler::new();
        let mut bytes = vec![0x00, 0x00, 0x23, 0xc2, 0xdc, 0xc0, 0x23, 0xc2];
        bytes.extend(encoded(&Frame::ack(0)));

        let frames = r.push(&bytes);
        assert_eq!(frames, vec![Frame::ack(0)]);
        assert!(r.is_empty());
        assert_eq!(r.discarded_bytes(), 8);
    }

    #[test]
    fn invalid_sync_reported_then_recovered() {
        let mut r = Reassembler::new();
        let mut bytes = encoded(&Frame::data(0, &b"x"[..]));
        bytes[0] = 0xff;
        bytes.extend(encoded(&Frame::data(1, &b"y"[..])));
        r.extend(&bytes);

        assert_eq!(r.next_frame(), Some(Err(FrameError::InvalidSync)));
        assert_eq!(r.next_frame(), Some(Ok(Frame::data(1, &b"y"[..]))));
        assert_eq!(r.next_frame(), None);
    }

    #[test]
    fn corrupt_frame_dropped_next_frame_kept() {
        let mut r = Reassembler::new();
        let mut bytes = encoded(&Frame::data(0, &b"corrupted"[..]));
        let last = bytes.len() - 1;
        bytes[last] ^= 0x40;
        bytes.extend(encoded(&Frame::data(1, &b"intact"[..])));

        let frames = r.push(&bytes);
        assert_eq!(frames, vec![Frame::data(1, &b"intact"[..])]);
        assert!(r.is_empty());
    }

    #[test]
    fn partial_sync_prefix_is_retained() {
        let mut r = Reassembler::new();
        let frame = encoded(&Frame::ack(1));
        let mut bytes = vec![0x11; HEADER_LEN];
        bytes.extend_from_slice(&frame[..3]);

        assert!(r.push(&bytes).is_empty());
        assert_eq!(r.len(), 3, "the sync prefix must survive resync");

        assert_eq!(r.push(&frame[3..]), vec![Frame::ack(1)]);
    }

    #[test]
    fn inflated_length_recovers_on_later_frames() {
        let mut r = Reassembler::new();
        let mut bad = encoded(&Frame::data(0, &b"abc"[..]));
        // Claim 40 payload bytes instead of 3.
        bad[10..12].copy_from_slice(&40u16.to_be_bytes());
        assert!(r.push(&bad).is_empty());

        let good = encoded(&Frame::data(0, vec![b'z'; 64]));
        let frames = r.push(&good);
        assert_eq!(frames, vec![Frame::data(0, vec![b'z'; 64])]);
    }

    #[test]
    fn length_overrun_skips_to_later_valid_frame() {
        let mut r = Reassembler::new();
        let mut bad = encoded(&Frame::data(0, &b"hello"[..]));
        bad[10] ^= 0x04;
        let good = encoded(&Frame::data(0, &b"hello"[..]));

        let mut items = Vec::new();
        r.extend(&bad);
        r.extend(&good);
        while let Some(item) = r.next_frame() {
            items.push(item);
        }

        assert_eq!(
            items,
            vec![
                Err(FrameError::LengthOverrun(1024 + 5)),
                Ok(Frame::data(0, &b"hello"[..])),
            ]
        );
        assert!(r.is_empty());
        assert_eq!(r.discarded_bytes(), bad.len() as u64);
    }

    #[test]
    fn incomplete_frame_waits_without_later_valid_frame() {
        let mut r = Reassembler::new();
        let frame = encoded(&Frame::data(1, vec![7u8; 100]));
        assert!(r.push(&frame[..60]).is_empty());
        assert!(r.next_frame().is_none());
        assert_eq!(r.push(&frame[60..]), vec![Frame::data(1, vec![7u8; 100])]);
        assert_eq!(r.discarded_bytes(), 0);
    }
}
