//! Engine task.
//!
//! [`spawn`] moves a [`StreamEngine`] into one tokio task that owns it
//! outright. Transport events, the gap tick and the engine's own deadlines
//! (receiving-flag reset, reconnect) all arrive through a single `select!`,
//! so the two window producers never race. Results are published on:
//!
//! - `watch` channels for the window and [`EngineStatus`]
//! - a `broadcast` channel for [`EngineEvent`]s

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::EngineConfig;
use crate::engine::{EngineEvent, EngineStatus, StreamEngine};
use crate::lifecycle::{Transport, TransportEvent};
use crate::window::SampleWindow;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Collaborator-facing handle to a running engine.
pub struct EngineHandle {
    window: watch::Receiver<SampleWindow>,
    status: watch::Receiver<EngineStatus>,
    events: broadcast::Sender<EngineEvent>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl EngineHandle {
    /// The sample window, always `window_capacity` slots long.
    pub fn window(&self) -> watch::Receiver<SampleWindow> {
        self.window.clone()
    }

    pub fn status(&self) -> watch::Receiver<EngineStatus> {
        self.status.clone()
    }

    /// Connection and quality edges from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Stop the engine and wait for it to detach its transport.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "stream engine task failed");
        }
    }
}

struct Outputs {
    window: watch::Sender<SampleWindow>,
    status: watch::Sender<EngineStatus>,
    events: broadcast::Sender<EngineEvent>,
}

/// Start the engine on the current tokio runtime.
pub fn spawn<T: Transport>(config: EngineConfig, transport: T) -> EngineHandle {
    let (engine, transport_rx) = StreamEngine::new(&config, transport);

    let (window_tx, window_rx) = watch::channel(engine.window().clone());
    let (status_tx, status_rx) = watch::channel(engine.status(Instant::now()));
    let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let outputs = Outputs {
        window: window_tx,
        status: status_tx,
        events: events_tx.clone(),
    };

    tracing::info!(
        endpoint = %config.endpoint,
        window_capacity = config.window_capacity,
        tick_ms = config.tick_interval.as_millis() as u64,
        "stream engine starting"
    );

    let task = tokio::spawn(run(
        engine,
        transport_rx,
        config.tick_interval,
        outputs,
        shutdown_rx,
    ));

    EngineHandle {
        window: window_rx,
        status: status_rx,
        events: events_tx,
        shutdown: shutdown_tx,
        task,
    }
}

async fn run<T: Transport>(
    mut engine: StreamEngine<T>,
    mut transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    period: Duration,
    outputs: Outputs,
    mut shutdown: watch::Receiver<bool>,
) {
    engine.start(Instant::now());
    let mut published = engine.window().revision();
    publish(&mut engine, &outputs, &mut published);

    let mut tick = time::interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let deadline = engine.next_deadline();

        tokio::select! {
            changed = shutdown.changed() => {
                // A dropped handle counts as a shutdown request.
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }

            _ = tick.tick() => {
                engine.on_tick(Instant::now());
            }

            Some(event) = transport_rx.recv() => {
                engine.on_transport_event(event, Instant::now());
            }

            _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                engine.poll_timers(Instant::now());
            }
        }

        publish(&mut engine, &outputs, &mut published);
    }

    engine.shutdown();
    publish(&mut engine, &outputs, &mut published);
    tracing::info!("stream engine stopped");
}

fn publish<T: Transport>(engine: &mut StreamEngine<T>, outputs: &Outputs, published: &mut u64) {
    let revision = engine.window().revision();
    if revision != *published {
        outputs.window.send_modify(|w| w.clone_from(engine.window()));
        *published = revision;
    }

    let status = engine.status(Instant::now());
    outputs.status.send_if_modified(|current| {
        if *current == status {
            false
        } else {
            *current = status;
            true
        }
    });

    for event in engine.drain_events() {
        // No subscribers is fine.
        let _ = outputs.events.send(event);
    }
}
