//! Connection state machine.
//!
//! ```text
//!              open()                    transport failure
//! Connecting ─────────► Open ──────────────────────────────► Closed{n}
//!     ▲                                                          │
//!     │             tick() reaches 0 / begin_connecting()        │
//!     └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Every transition happens on [`ConnectionCore`], which also owns the
//! pending request store: leaving `Open` and rejecting the outstanding
//! requests is one step under one lock.

use std::fmt;

use super::{config::GatewayConfig, pending::PendingRequestStore, types::ConnectionEpoch};
use crate::reconnect::{BackoffConfig, countdown_ticks};

/// Current state of the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// A connection attempt is in progress.
    Connecting,
    /// Connected; requests may be sent.
    Open,
    /// Disconnected; reconnects when `countdown` reaches zero.
    Closed {
        /// Remaining ticks before the next attempt.
        countdown: u32,
    },
}

impl ConnectionState {
    /// Whether requests may be sent.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Whether the connection is down.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }

    /// Remaining reconnect ticks, while closed.
    pub fn countdown(&self) -> Option<u32> {
        match self {
            Self::Closed { countdown } => Some(*countdown),
            _ => None,
        }
    }

    /// Upper-case state name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connecting => "CONNECTING",
            Self::Open => "OPEN",
            Self::Closed { .. } => "CLOSED",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed { countdown } => write!(f, "CLOSED({countdown})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Result of one countdown tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Tick {
    /// Not counting down (already reconnecting or open).
    Skipped,
    /// One tick elapsed; carries the remaining ticks.
    Counted(u32),
    /// The countdown reached zero; the state is now `Connecting`.
    Expired,
}

/// Mutable connection state shared by the handle and the connection task.
pub(crate) struct ConnectionCore {
    state: ConnectionState,
    epoch: ConnectionEpoch,
    pub(crate) pending: PendingRequestStore,
    backoff: BackoffConfig,
    reconnect_attempt: u32,
    stopped: bool,
}

impl ConnectionCore {
    pub(crate) fn new(config: &GatewayConfig) -> Self {
        Self {
            state: ConnectionState::Connecting,
            epoch: ConnectionEpoch::default(),
            pending: PendingRequestStore::new(config.max_pending_requests),
            backoff: config.backoff(),
            reconnect_attempt: 0,
            stopped: false,
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn epoch(&self) -> ConnectionEpoch {
        self.epoch
    }

    /// `Closed → Connecting`, skipping the rest of the countdown.
    ///
    /// Returns `false` (and changes nothing) in any other state.
    pub(crate) fn begin_connecting(&mut self) -> bool {
        if self.stopped || !self.state.is_closed() {
            return false;
        }
        self.state = ConnectionState::Connecting;
        true
    }

    /// `Connecting → Open`. Starts a new epoch and resets the backoff.
    pub(crate) fn open(&mut self) -> ConnectionEpoch {
        self.epoch = self.epoch.next();
        self.state = ConnectionState::Open;
        self.reconnect_attempt = 0;
        self.epoch
    }

    /// Enter `Closed` after a failed attempt or a dropped connection.
    ///
    /// Rejects every pending request and returns the countdown length and
    /// the number of rejected requests.
    pub(crate) fn close(&mut self, reason: &str, tick: std::time::Duration) -> (u32, usize) {
        let countdown = countdown_ticks(self.backoff, self.reconnect_attempt, tick);
        self.reconnect_attempt = self.reconnect_attempt.saturating_add(1);
        self.state = ConnectionState::Closed { countdown };
        let rejected = self.pending.invalidate_all(reason);
        (countdown, rejected)
    }

    /// Advance the countdown by one tick.
    pub(crate) fn tick(&mut self) -> Tick {
        match self.state {
            ConnectionState::Closed { countdown } if !self.stopped => {
                let remaining = countdown.saturating_sub(1);
                if remaining == 0 {
                    self.state = ConnectionState::Connecting;
                    Tick::Expired
                } else {
                    self.state = ConnectionState::Closed {
                        countdown: remaining,
                    };
                    Tick::Counted(remaining)
                }
            }
            _ => Tick::Skipped,
        }
    }

    /// Terminal shutdown: rejects pending requests and parks in `Closed{0}`.
    ///
    /// Returns `true` if the state was not already closed.
    pub(crate) fn shutdown(&mut self) -> bool {
        let was_closed = self.state.is_closed();
        self.stopped = true;
        self.pending.invalidate_all("gateway stopped");
        self.state = ConnectionState::Closed { countdown: 0 };
        !was_closed
    }
}
