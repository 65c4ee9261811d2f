//! Retransmission timer for the single outstanding frame.
//!
//! Stop-and-wait needs exactly one timer: it runs while a data frame is
//! awaiting its ACK and is disarmed the moment that ACK is processed.  The
//! timeout is fixed (no RTT estimation or back-off); each expiry bumps a retry
//! counter, and once the counter passes the ceiling the connection gives up.
//!
//! [`RetransmitTimer`] holds only the deadline and the counter.  It does not
//! sleep by itself: [`crate::connection::Connection`] races
//! [`deadline`](RetransmitTimer::deadline) against channel reads inside one
//! `select!`, so arming, disarming and expiry are all serialised with ACK
//! processing.

use std::time::Duration;

use tokio::time::Instant;

/// Default retransmission timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Default number of retransmissions before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 16;

/// What the connection must do after the deadline passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Rewrite the outstanding frame; this is retransmission number `attempt`.
    Retransmit { attempt: u32 },
    /// The retry ceiling was exceeded.
    GiveUp,
}

#[derive(Debug)]
pub struct RetransmitTimer {
    timeout: Duration,
    max_retries: u32,
    deadline: Option<Instant>,
    retries: u32,
}

impl RetransmitTimer {
    pub fn new(timeout: Duration, max_retries: u32) -> Self {
        Self {
            timeout,
            max_retries,
            deadline: None,
            retries: 0,
        }
    }

    /// Start the timer for a freshly sent frame.
    ///
    /// A timer that is already running keeps its deadline and retry count.
    pub fn arm(&mut self) {
        if self.deadline.is_none() {
            self.deadline = Some(Instant::now() + self.timeout);
            self.retries = 0;
        }
    }

    /// Stop the timer and reset the retry count (the frame was acknowledged).
    pub fn disarm(&mut self) {
        self.deadline = None;
        self.retries = 0;
    }

    /// Handle a deadline that has passed.
    ///
    /// On [`Expiry::Retransmit`] the timer restarts with a full timeout; on
    /// [`Expiry::GiveUp`] it is left disarmed.
    pub fn on_expiry(&mut self) -> Expiry {
        self.retries += 1;
        if self.retries > self.max_retries {
            self.deadline = None;
            return Expiry::GiveUp;
        }
        self.deadline = Some(Instant::now() + self.timeout);
        Expiry::Retransmit {
            attempt: self.retries,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Retransmissions performed for the current frame.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for RetransmitTimer {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_MAX_RETRIES)
    }
}
