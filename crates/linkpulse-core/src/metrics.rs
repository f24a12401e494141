//! Prometheus metrics rendering for engine status.
//!
//! Renders an [`EngineStatus`] in Prometheus text exposition format,
//! suitable for scraping by Prometheus or compatible collectors.

use std::fmt::Write;

use crate::engine::EngineStatus;
use crate::lifecycle::ConnectionState;
use crate::quality::ConnectionQuality;

fn gauge(out: &mut String, name: &str, help: &str, value: impl std::fmt::Display) {
    writeln!(out, "# HELP {name} {help}").unwrap();
    writeln!(out, "# TYPE {name} gauge").unwrap();
    writeln!(out, "{name} {value}").unwrap();
}

fn counter(out: &mut String, name: &str, help: &str, value: u64) {
    writeln!(out, "# HELP {name} {help}").unwrap();
    writeln!(out, "# TYPE {name} counter").unwrap();
    writeln!(out, "{name} {value}").unwrap();
}

/// Render engine status as Prometheus text exposition format.
pub fn render_prometheus(status: &EngineStatus) -> String {
    let mut out = String::with_capacity(1024);

    // ── Flags ───────────────────────────────────────────────────

    gauge(
        &mut out,
        "linkpulse_receiving",
        "1 while samples are arriving.",
        u8::from(status.is_receiving),
    );
    gauge(
        &mut out,
        "linkpulse_disconnected",
        "1 when no sample arrived within the disconnect timeout.",
        u8::from(status.is_disconnected),
    );
    gauge(
        &mut out,
        "linkpulse_quality_poor",
        "1 when loss-rate hysteresis classifies the link as poor.",
        u8::from(status.quality == ConnectionQuality::Poor),
    );

    writeln!(
        out,
        "# HELP linkpulse_connection_state Transport state (1 for the current state)."
    )
    .unwrap();
    writeln!(out, "# TYPE linkpulse_connection_state gauge").unwrap();
    for state in [
        ConnectionState::Disconnected,
        ConnectionState::Connecting,
        ConnectionState::Connected,
    ] {
        writeln!(
            out,
            "linkpulse_connection_state{{state=\"{}\"}} {}",
            state,
            u8::from(status.connection == state)
        )
        .unwrap();
    }

    // ── Counters ────────────────────────────────────────────────

    counter(
        &mut out,
        "linkpulse_samples_admitted_total",
        "Reader samples admitted into the window.",
        status.samples_admitted,
    );
    counter(
        &mut out,
        "linkpulse_payloads_rejected_total",
        "Payloads that failed schema validation.",
        status.payloads_rejected,
    );
    counter(
        &mut out,
        "linkpulse_payloads_ignored_total",
        "Valid payloads of a non-reader kind.",
        status.payloads_ignored,
    );
    counter(
        &mut out,
        "linkpulse_reconnects_total",
        "Reconnect attempts after the transport closed.",
        status.reconnects,
    );

    // ── Latest sample ───────────────────────────────────────────

    if let Some(stats) = status.last_sample.and_then(|s| s.stats) {
        gauge(
            &mut out,
            "linkpulse_bitrate_mbps",
            "Receive bitrate of the latest sample in Mbps.",
            format_args!("{:.3}", stats.bitrate_mbps),
        );
        gauge(
            &mut out,
            "linkpulse_rtt_ms",
            "Round-trip time of the latest sample in milliseconds.",
            format_args!("{:.3}", stats.rtt_ms),
        );
        gauge(
            &mut out,
            "linkpulse_loss_rate_percent",
            "Receive packet loss of the latest sample (0-100).",
            format_args!("{:.3}", stats.loss_rate_percent),
        );
    }

    out
}
