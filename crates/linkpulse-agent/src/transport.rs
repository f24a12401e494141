//! WebSocket transport for the stream engine.
//!
//! Each [`Transport::open`] spawns one task that connects with
//! `tokio-tungstenite` and forwards what it reads as [`TransportEvent`]s.
//! Whatever ends the task (peer close, read error, failed connect) is
//! reported as exactly one `Closed`. Aborting the task through its
//! [`TransportHandle`] reports nothing.

use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;

use linkpulse_core::lifecycle::{
    ConnectionId, EventSender, Transport, TransportEvent, TransportHandle,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl Transport for WsTransport {
    fn open(
        &mut self,
        endpoint: &str,
        connection: ConnectionId,
        events: EventSender,
    ) -> TransportHandle {
        let endpoint = endpoint.to_string();
        let task = tokio::spawn(async move {
            let reason = match run_connection(&endpoint, connection, &events).await {
                Ok(reason) => reason,
                Err(e) => Some(e.to_string()),
            };
            let _ = events.send(TransportEvent::closed(connection, reason));
        });
        TransportHandle::new(task.abort_handle())
    }
}

/// Read until the connection ends. `Ok` carries the peer's close reason.
async fn run_connection(
    endpoint: &str,
    connection: ConnectionId,
    events: &EventSender,
) -> anyhow::Result<Option<String>> {
    let (mut ws, _response) = tokio_tungstenite::connect_async(endpoint).await?;
    tracing::debug!(connection, %endpoint, "websocket open");

    if events.send(TransportEvent::opened(connection)).is_err() {
        return Ok(None);
    }

    while let Some(msg) = ws.next().await {
        let payload = match msg? {
            Message::Text(text) => text.as_str().to_owned(),
            Message::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Message::Close(frame) => {
                return Ok(frame.map(|f| {
                    format!("peer closed ({}): {}", u16::from(f.code), f.reason.as_str())
                }));
            }
            // Pongs are queued by tungstenite and flushed on the next read.
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
        };
        if events.send(TransportEvent::message(connection, payload)).is_err() {
            // Engine is gone.
            return Ok(None);
        }
    }
    Ok(None)
}
