//! Connection finite-state machine (FSM) types.
//!
//! Transitions are driven by [`crate::connection::Connection`]; this module
//! only names the states so they can be logged and asserted on.
//!
//! ```text
//!           send()                      timeout (retries ≤ ceiling)
//!   Idle ──────────▶ AwaitingAck ◀──────────────┐
//!    ▲                  │  │                    │
//!    │   matching ACK   │  └────────────────────┘
//!    └──────────────────┘
//!
//!   any ──▶ Closed   on RST sent/received, retry exhaustion,
//!                    or both ENDs exchanged and acknowledged
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No data frame outstanding.
    #[default]
    Idle,
    /// One data frame in flight; the retransmission timer is running.
    AwaitingAck,
    /// Terminal.  Reached through an orderly END exchange or an abort.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::AwaitingAck => "awaiting-ack",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}
