//! Receipt-based liveness.
//!
//! A socket can stay open while the far end has stalled, so "disconnected"
//! is derived from the time since the last admitted sample rather than from
//! transport state. The watchdog is polled; [`DisconnectWatchdog::poll`]
//! turns the level into edges.

use std::time::Duration;

use tokio::time::Instant;

/// Default silence after which the link counts as disconnected.
pub const DEFAULT_DISCONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTransition {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct DisconnectWatchdog {
    timeout: Duration,
    last_receipt: Option<Instant>,
    /// Level seen by the previous poll; `None` until the first poll.
    previous: Option<bool>,
}

impl DisconnectWatchdog {
    pub fn new(timeout: Duration) -> Self {
        DisconnectWatchdog {
            timeout,
            last_receipt: None,
            previous: None,
        }
    }

    pub fn record_receipt(&mut self, now: Instant) {
        self.last_receipt = Some(now);
    }

    pub fn last_receipt(&self) -> Option<Instant> {
        self.last_receipt
    }

    /// True until the first receipt, then true whenever the last receipt is
    /// strictly older than the timeout.
    pub fn is_disconnected(&self, now: Instant) -> bool {
        match self.last_receipt {
            Some(at) => now.saturating_duration_since(at) > self.timeout,
            None => true,
        }
    }

    /// Re-evaluate and report an edge. The first poll only establishes the
    /// baseline and never reports.
    pub fn poll(&mut self, now: Instant) -> Option<LinkTransition> {
        let current = self.is_disconnected(now);
        let previous = self.previous.replace(current)?;
        match (previous, current) {
            (false, true) => Some(LinkTransition::Disconnected),
            (true, false) => Some(LinkTransition::Connected),
            _ => None,
        }
    }
}

impl Default for DisconnectWatchdog {
    fn default() -> Self {
        Self::new(DEFAULT_DISCONNECT_TIMEOUT)
    }
}
