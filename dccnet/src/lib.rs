//! `dccnet` — reliable, framed, bidirectional stop-and-wait transport over
//! an already-open byte stream.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐   DATA / END   ┌──────────┐
//!  │  Sender  │───────────────▶│ Receiver │   (peer)
//!  └────┬─────┘                └─────┬────┘
//!       │          ACK / RST         │
//!       │◀───────────────────────────┘
//!       │
//!  ┌────▼──────────────────────────────┐
//!  │            Connection             │
//!  │ (owns state machine, timer and    │
//!  │  the byte channel)                │
//!  └────┬──────────────────────────────┘
//!       │ encoded frames
//!  ┌────▼──────┐      ┌─────────────┐
//!  │   frame   │◀─────│ reassembler │  (byte stream → frames, resync)
//!  └───────────┘      └─────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`checksum`]    — RFC 1071 Internet checksum
//! - [`frame`]       — wire format (encode / decode / validate)
//! - [`reassembler`] — receive buffer, frame extraction, sync recovery
//! - [`connection`]  — stop-and-wait per-connection lifecycle
//! - [`sender`]      — alternating id and the outstanding frame
//! - [`receiver`]    — duplicate suppression and delivery queue
//! - [`timer`]       — retransmission deadline and retry ceiling
//! - [`state`]       — finite-state-machine types
//! - [`stats`]       — per-connection counters
//! - [`simulator`]   — fault-injecting channel wrapper
//! - [`app`]         — CLI surface plus the file transfer and MD5 collaborators

pub mod app;
pub mod checksum;
pub mod connection;
pub mod frame;
pub mod reassembler;
pub mod receiver;
pub mod sender;
pub mod simulator;
pub mod state;
pub mod stats;
pub mod timer;

pub use connection::{ConnError, Connection, ConnectionConfig, Received};
pub use frame::{Frame, FrameError};
pub use state::ConnectionState;
