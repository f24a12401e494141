//! Connection lifecycle over a pluggable transport.
//!
//! Handles:
//! - Opening the transport, at most one connection at a time
//! - Detaching a closed connection and ignoring anything it still delivers
//! - Constant-delay reconnect after every close, forever
//! - The short-lived "receiving" indicator raised by each admitted sample
//!
//! The manager does no I/O itself. A [`Transport`] opens the connection and
//! reports [`TransportEvent`]s on a channel; the owner feeds those back
//! through [`ConnectionManager::handle_event`] and drives timers with
//! [`ConnectionManager::poll_reconnect`].

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::Instant;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_RECEIVING_HOLD: Duration = Duration::from_millis(100);

/// Monotonic id distinguishing successive connections.
pub type ConnectionId = u64;

pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub connection: ConnectionId,
    pub kind: TransportEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    Opened,
    /// One inbound text payload.
    Message(String),
    /// Remote close, read error or failed connect. Sent at most once.
    Closed { reason: Option<String> },
}

impl TransportEvent {
    pub fn opened(connection: ConnectionId) -> Self {
        Self {
            connection,
            kind: TransportEventKind::Opened,
        }
    }

    pub fn message(connection: ConnectionId, payload: impl Into<String>) -> Self {
        Self {
            connection,
            kind: TransportEventKind::Message(payload.into()),
        }
    }

    pub fn closed(connection: ConnectionId, reason: Option<String>) -> Self {
        Self {
            connection,
            kind: TransportEventKind::Closed { reason },
        }
    }
}

/// Opens message-oriented connections to an endpoint.
pub trait Transport: Send + 'static {
    /// Start connecting. Every event for this connection must be tagged with
    /// `connection` and sent on `events`.
    fn open(
        &mut self,
        endpoint: &str,
        connection: ConnectionId,
        events: EventSender,
    ) -> TransportHandle;
}

/// Ownership of a live connection's background work.
///
/// Dropping the handle aborts the task, which detaches the connection: no
/// further events will be produced for it.
#[derive(Debug, Default)]
pub struct TransportHandle {
    task: Option<AbortHandle>,
}

impl TransportHandle {
    pub fn new(task: AbortHandle) -> Self {
        Self { task: Some(task) }
    }
}

impl From<AbortHandle> for TransportHandle {
    fn from(task: AbortHandle) -> Self {
        Self::new(task)
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

struct ActiveConnection {
    id: ConnectionId,
    _handle: TransportHandle,
}

pub struct ConnectionManager<T> {
    transport: T,
    endpoint: String,
    reconnect_delay: Duration,
    events: EventSender,
    active: Option<ActiveConnection>,
    next_id: ConnectionId,
    state: ConnectionState,
    reconnect_at: Option<Instant>,
    reconnects: u64,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(
        transport: T,
        endpoint: impl Into<String>,
        reconnect_delay: Duration,
        events: EventSender,
    ) -> Self {
        ConnectionManager {
            transport,
            endpoint: endpoint.into(),
            reconnect_delay,
            events,
            active: None,
            next_id: 1,
            state: ConnectionState::Disconnected,
            reconnect_at: None,
            reconnects: 0,
        }
    }

    /// Open a connection unless one is already attached.
    ///
    /// Returns whether a new connection was started.
    pub fn connect(&mut self) -> bool {
        if let Some(active) = &self.active {
            tracing::trace!(connection = active.id, "connect skipped, already attached");
            return false;
        }

        self.reconnect_at = None;
        let id = self.next_id;
        self.next_id += 1;

        tracing::info!(connection = id, endpoint = %self.endpoint, "connecting");
        let handle = self.transport.open(&self.endpoint, id, self.events.clone());
        self.active = Some(ActiveConnection {
            id,
            _handle: handle,
        });
        self.state = ConnectionState::Connecting;
        true
    }

    /// Apply a transport event. Returns the payload of a message from the
    /// attached connection; everything else is consumed here.
    pub fn handle_event(&mut self, event: TransportEvent, now: Instant) -> Option<String> {
        let current = self.active.as_ref().map(|a| a.id);
        if current != Some(event.connection) {
            tracing::trace!(
                connection = event.connection,
                "dropping event from detached connection"
            );
            return None;
        }

        match event.kind {
            TransportEventKind::Opened => {
                tracing::info!(connection = event.connection, "connected");
                self.state = ConnectionState::Connected;
                None
            }
            TransportEventKind::Message(payload) => Some(payload),
            TransportEventKind::Closed { reason } => {
                self.on_closed(event.connection, reason, now);
                None
            }
        }
    }

    fn on_closed(&mut self, id: ConnectionId, reason: Option<String>, now: Instant) {
        // Dropping the handle aborts the reader task.
        self.active = None;
        self.state = ConnectionState::Disconnected;
        self.reconnect_at = Some(now + self.reconnect_delay);

        match reason {
            Some(reason) => tracing::warn!(
                connection = id,
                %reason,
                retry_ms = self.reconnect_delay.as_millis() as u64,
                "connection lost"
            ),
            None => tracing::info!(
                connection = id,
                retry_ms = self.reconnect_delay.as_millis() as u64,
                "connection closed"
            ),
        }
    }

    /// Fire the pending reconnect if its deadline has passed.
    pub fn poll_reconnect(&mut self, now: Instant) -> bool {
        match self.reconnect_at {
            Some(at) if now >= at => {
                self.reconnect_at = None;
                self.reconnects += 1;
                self.connect()
            }
            _ => false,
        }
    }

    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Cancel any pending reconnect and detach the current connection.
    pub fn shutdown(&mut self) {
        self.reconnect_at = None;
        if let Some(active) = self.active.take() {
            tracing::debug!(connection = active.id, "detaching transport");
        }
        self.state = ConnectionState::Disconnected;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_attached(&self) -> bool {
        self.active.is_some()
    }

    pub fn current_connection(&self) -> Option<ConnectionId> {
        self.active.as_ref().map(|a| a.id)
    }

    /// Reconnect attempts made so far (the initial connect is not counted).
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Debounced "data is flowing" indicator.
///
/// Raised by [`trigger`](Self::trigger) and lowered once `hold` passes
/// without another trigger; each trigger replaces the pending reset.
#[derive(Debug, Clone)]
pub struct ReceivingFlag {
    hold: Duration,
    reset_at: Option<Instant>,
}

impl ReceivingFlag {
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            reset_at: None,
        }
    }

    pub fn trigger(&mut self, now: Instant) {
        self.reset_at = Some(now + self.hold);
    }

    pub fn is_active(&self) -> bool {
        self.reset_at.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.reset_at
    }

    /// Lower the flag if its reset is due. Returns true when it was lowered.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.reset_at {
            Some(at) if now >= at => {
                self.reset_at = None;
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.reset_at = None;
    }
}

impl Default for ReceivingFlag {
    fn default() -> Self {
        Self::new(DEFAULT_RECEIVING_HOLD)
    }
}
