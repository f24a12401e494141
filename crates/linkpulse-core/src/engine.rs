//! # Stream engine
//!
//! Composition root tying the decoder, window, classifier, connection
//! manager and watchdog together. The engine is synchronous and owns all
//! of its state; every entry point takes the current [`Instant`] so the
//! caller decides what time it is. [`crate::runtime`] drives it from a
//! single tokio task.
//!
//! Admission of one sample is a single `&mut self` call: receipt time,
//! receiving flag, loss history and window are all updated before anything
//! else can observe the engine.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::EngineConfig;
use crate::lifecycle::{
    ConnectionManager, ConnectionState, ReceivingFlag, Transport, TransportEvent,
};
use crate::quality::{ConnectionQuality, QualityClassifier, QualityTransition};
use crate::sample::{self, Decoded, Sample};
use crate::watchdog::{DisconnectWatchdog, LinkTransition};
use crate::window::SampleWindow;

/// Discrete notifications for collaborators. Each fires once per edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineEvent {
    Connected,
    Disconnected,
    QualityDegraded,
    QualityRecovered,
}

impl From<LinkTransition> for EngineEvent {
    fn from(t: LinkTransition) -> Self {
        match t {
            LinkTransition::Connected => EngineEvent::Connected,
            LinkTransition::Disconnected => EngineEvent::Disconnected,
        }
    }
}

impl From<QualityTransition> for EngineEvent {
    fn from(t: QualityTransition) -> Self {
        match t {
            QualityTransition::Degraded => EngineEvent::QualityDegraded,
            QualityTransition::Recovered => EngineEvent::QualityRecovered,
        }
    }
}

/// Point-in-time view of everything except the window itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub is_receiving: bool,
    pub is_disconnected: bool,
    pub quality: ConnectionQuality,
    pub connection: ConnectionState,
    pub samples_admitted: u64,
    pub payloads_rejected: u64,
    pub payloads_ignored: u64,
    pub reconnects: u64,
    pub last_sample: Option<Sample>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    admitted: u64,
    rejected: u64,
    ignored: u64,
}

pub struct StreamEngine<T> {
    connection: ConnectionManager<T>,
    window: SampleWindow,
    classifier: QualityClassifier,
    watchdog: DisconnectWatchdog,
    receiving: ReceivingFlag,
    counters: Counters,
    pending: Vec<EngineEvent>,
}

impl<T: Transport> StreamEngine<T> {
    /// Build an engine. The returned receiver carries the transport's events
    /// and must be fed back through [`on_transport_event`](Self::on_transport_event).
    pub fn new(
        config: &EngineConfig,
        transport: T,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let engine = StreamEngine {
            connection: ConnectionManager::new(
                transport,
                config.endpoint.clone(),
                config.reconnect_delay,
                events_tx,
            ),
            window: SampleWindow::new(config.window_capacity),
            classifier: QualityClassifier::new(config.quality),
            watchdog: DisconnectWatchdog::new(config.disconnect_timeout),
            receiving: ReceivingFlag::new(config.receiving_hold),
            counters: Counters::default(),
            pending: Vec::new(),
        };
        (engine, events_rx)
    }

    /// Open the first connection and take the watchdog's baseline reading.
    pub fn start(&mut self, now: Instant) {
        self.connection.connect();
        self.poll_watchdog(now);
    }

    /// Periodic tick: append a gap and service due timers.
    pub fn on_tick(&mut self, now: Instant) {
        self.window.push_gap();
        self.poll_timers(now);
    }

    pub fn on_transport_event(&mut self, event: TransportEvent, now: Instant) {
        if let Some(payload) = self.connection.handle_event(event, now) {
            self.ingest(&payload, now);
        }
        self.poll_timers(now);
    }

    /// Decode one payload and admit it if it is a reader sample.
    ///
    /// Returns whether a sample was admitted.
    pub fn ingest(&mut self, raw: &str, now: Instant) -> bool {
        match sample::decode(raw) {
            Ok(Decoded::Reader(sample)) => {
                self.admit(sample, now);
                true
            }
            Ok(Decoded::Other { kind }) => {
                self.counters.ignored += 1;
                tracing::trace!(%kind, "ignoring non-reader message");
                false
            }
            Err(e) => {
                self.counters.rejected += 1;
                tracing::warn!(error = %e, "discarding malformed payload");
                false
            }
        }
    }

    fn admit(&mut self, sample: Sample, now: Instant) {
        self.watchdog.record_receipt(now);
        self.receiving.trigger(now);

        if let Some(loss) = sample.loss_rate_percent() {
            if let Some(transition) = self.classifier.observe(loss) {
                match transition {
                    QualityTransition::Degraded => {
                        tracing::warn!(loss_percent = loss, "link quality degraded")
                    }
                    QualityTransition::Recovered => {
                        tracing::info!(loss_percent = loss, "link quality recovered")
                    }
                }
                self.pending.push(transition.into());
            }
        }

        self.window.push_sample(sample);
        self.counters.admitted += 1;
    }

    /// Service every timer whose deadline has passed and re-evaluate the
    /// watchdog.
    pub fn poll_timers(&mut self, now: Instant) {
        self.receiving.poll(now);
        self.connection.poll_reconnect(now);
        self.poll_watchdog(now);
    }

    fn poll_watchdog(&mut self, now: Instant) {
        if let Some(edge) = self.watchdog.poll(now) {
            match edge {
                LinkTransition::Connected => tracing::info!("receiving stats"),
                LinkTransition::Disconnected => tracing::warn!(
                    silent_ms = self.silence_ms(now),
                    "no stats received, link considered disconnected"
                ),
            }
            self.pending.push(edge.into());
        }
    }

    fn silence_ms(&self, now: Instant) -> u64 {
        self.watchdog
            .last_receipt()
            .map(|at| now.saturating_duration_since(at).as_millis() as u64)
            .unwrap_or_default()
    }

    /// Earliest instant at which [`poll_timers`](Self::poll_timers) has work
    /// to do, other than the tick.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.receiving.deadline(), self.connection.reconnect_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Notifications raised since the last drain, in order.
    pub fn drain_events(&mut self) -> std::vec::Drain<'_, EngineEvent> {
        self.pending.drain(..)
    }

    /// Cancel every timer and detach the transport. The engine stays
    /// readable but will not reconnect.
    pub fn shutdown(&mut self) {
        self.connection.shutdown();
        self.receiving.clear();
        tracing::debug!("timers cancelled, transport detached");
    }

    pub fn window(&self) -> &SampleWindow {
        &self.window
    }

    pub fn is_receiving(&self) -> bool {
        self.receiving.is_active()
    }

    pub fn is_disconnected(&self, now: Instant) -> bool {
        self.watchdog.is_disconnected(now)
    }

    pub fn quality(&self) -> ConnectionQuality {
        self.classifier.quality()
    }

    pub fn connection(&self) -> &ConnectionManager<T> {
        &self.connection
    }

    pub fn status(&self, now: Instant) -> EngineStatus {
        EngineStatus {
            is_receiving: self.is_receiving(),
            is_disconnected: self.is_disconnected(now),
            quality: self.quality(),
            connection: self.connection.state(),
            samples_admitted: self.counters.admitted,
            payloads_rejected: self.counters.rejected,
            payloads_ignored: self.counters.ignored,
            reconnects: self.connection.reconnects(),
            last_sample: self.window.latest_sample().copied(),
        }
    }
}
