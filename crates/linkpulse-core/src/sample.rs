//! Telemetry payload decoding.
//!
//! Each inbound frame is one JSON document from the stats relay:
//!
//! ```json
//! {
//!   "type": "reader",
//!   "timestamp": "2025-03-01T12:00:00.032Z",
//!   "stats": { "Instantaneous": { "MbpsRecvRate": 4.2, "MsRTT": 31.0, "PktRecvLossRate": 0.5 } }
//! }
//! ```
//!
//! Only `"reader"` documents become [`Sample`]s. Other kinds that pass the
//! schema are reported as [`Decoded::Other`] so callers can drop them without
//! treating them as errors.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Discriminant of the only message kind admitted into the engine.
pub const READER_KIND: &str = "reader";

// ── Wire schema ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(rename = "type")]
    kind: String,
    timestamp: String,
    stats: Option<WireStats>,
}

#[derive(Debug, Deserialize)]
struct WireStats {
    #[serde(rename = "Instantaneous")]
    instantaneous: Option<WireInstantaneous>,
}

#[derive(Debug, Deserialize)]
struct WireInstantaneous {
    #[serde(rename = "MbpsRecvRate")]
    mbps_recv_rate: f64,
    #[serde(rename = "MsRTT")]
    ms_rtt: f64,
    #[serde(rename = "PktRecvLossRate")]
    pkt_recv_loss_rate: f64,
}

// ── Decoded types ───────────────────────────────────────────────────

/// Instantaneous link measurements carried by a sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstantStats {
    pub bitrate_mbps: f64,
    pub rtt_ms: f64,
    /// Receive-side packet loss, 0–100.
    pub loss_rate_percent: f64,
}

/// One admitted telemetry reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Server-side measurement time, Unix epoch milliseconds.
    pub timestamp_ms: i64,
    /// Absent when the relay sent a reader heartbeat without a stats block.
    pub stats: Option<InstantStats>,
}

impl Sample {
    pub fn loss_rate_percent(&self) -> Option<f64> {
        self.stats.map(|s| s.loss_rate_percent)
    }
}

/// Outcome of decoding a schema-valid payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A `"reader"` message, admissible into the window and classifier.
    Reader(Sample),
    /// Any other message kind. Valid, but carries nothing for the engine.
    Other { kind: String },
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unparseable timestamp {0:?}")]
    Timestamp(String),
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

/// Decode one raw payload.
///
/// Pure: a failure leaves no trace anywhere, it is up to the caller whether
/// to log it.
pub fn decode(raw: &str) -> Result<Decoded, DecodeError> {
    let wire: WireMessage = serde_json::from_str(raw)?;
    let timestamp_ms = parse_timestamp_ms(&wire.timestamp)?;
    let stats = wire
        .stats
        .and_then(|s| s.instantaneous)
        .map(validate_stats)
        .transpose()?;

    if wire.kind != READER_KIND {
        return Ok(Decoded::Other { kind: wire.kind });
    }

    Ok(Decoded::Reader(Sample {
        timestamp_ms,
        stats,
    }))
}

fn validate_stats(raw: WireInstantaneous) -> Result<InstantStats, DecodeError> {
    let non_negative = |field: &'static str, value: f64| {
        if value.is_finite() && value >= 0.0 {
            Ok(value)
        } else {
            Err(DecodeError::OutOfRange { field, value })
        }
    };

    let loss = raw.pkt_recv_loss_rate;
    if !(loss.is_finite() && (0.0..=100.0).contains(&loss)) {
        return Err(DecodeError::OutOfRange {
            field: "PktRecvLossRate",
            value: loss,
        });
    }

    Ok(InstantStats {
        bitrate_mbps: non_negative("MbpsRecvRate", raw.mbps_recv_rate)?,
        rtt_ms: non_negative("MsRTT", raw.ms_rtt)?,
        loss_rate_percent: loss,
    })
}

/// RFC 3339 first; a zone-less ISO timestamp is taken as UTC.
fn parse_timestamp_ms(value: &str) -> Result<i64, DecodeError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.timestamp_millis());
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc().timestamp_millis())
        .map_err(|_| DecodeError::Timestamp(value.to_string()))
}
