//! Link telemetry stream engine.
//!
//! This crate contains:
//! - **Decoding**: stats relay payloads into typed samples ([`sample`])
//! - **Sample window**: fixed-capacity, tick-aligned FIFO for plotting ([`window`])
//! - **Quality**: loss-rate hysteresis classifier ([`quality`])
//! - **Lifecycle**: transport ownership and constant-delay reconnect ([`lifecycle`])
//! - **Watchdog**: receipt-based disconnect detection ([`watchdog`])
//! - **Engine**: composition of the above, plus the tokio task that owns it
//!   ([`engine`], [`runtime`])
//! - **Utilities**: configuration, moving average, Prometheus rendering

pub mod config;
pub mod engine;
pub mod filter;
pub mod lifecycle;
pub mod metrics;
pub mod quality;
pub mod runtime;
pub mod sample;
pub mod watchdog;
pub mod window;

pub use config::{ConfigError, EngineConfig, EngineConfigInput};
pub use engine::{EngineEvent, EngineStatus, StreamEngine};
pub use runtime::{EngineHandle, spawn};
