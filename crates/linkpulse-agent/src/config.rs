//! Agent configuration.
//!
//! An optional TOML file supplies the agent's own settings at the top level
//! and the engine's under `[engine]`. Command-line flags win over the file.
//!
//! ```toml
//! http_addr = "0.0.0.0:9999"
//! log_level = "info"
//!
//! [engine]
//! endpoint = "ws://relay.local:8888/ws"
//! disconnect_timeout_ms = 5000
//! ```

use std::net::SocketAddr;
use std::path::Path;

use anyhow::Context;
use linkpulse_core::{EngineConfig, EngineConfigInput};
use serde::Deserialize;

pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:9999";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub http_addr: Option<String>,
    pub log_level: Option<String>,
    pub engine: EngineConfigInput,
}

/// Settings given on the command line.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub endpoint: Option<String>,
    pub ws_port: Option<u16>,
    pub http_addr: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub engine: EngineConfig,
    pub http_addr: SocketAddr,
    pub log_level: String,
}

impl FileConfig {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        toml::from_str(input).context("invalid config TOML")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("failed to load {}", path.display()))
    }

    /// Apply CLI overrides and resolve into a validated config.
    ///
    /// `--endpoint` beats `--ws-port`, which beats the file's endpoint.
    pub fn merge(mut self, overrides: Overrides) -> anyhow::Result<AgentConfig> {
        if let Some(port) = overrides.ws_port {
            self.engine.endpoint = Some(format!("ws://localhost:{port}/ws"));
        }
        if let Some(endpoint) = overrides.endpoint {
            self.engine.endpoint = Some(endpoint);
        }
        let engine = self.engine.resolve().context("invalid engine config")?;

        let http_addr = overrides
            .http_addr
            .or(self.http_addr)
            .unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string());
        let http_addr: SocketAddr = http_addr
            .parse()
            .with_context(|| format!("invalid http_addr {http_addr:?}"))?;

        let log_level = overrides
            .log_level
            .or(self.log_level)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        Ok(AgentConfig {
            engine,
            http_addr,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn defaults_without_file_or_flags() {
        let cfg = FileConfig::default().merge(Overrides::default()).unwrap();
        assert_eq!(cfg.engine, EngineConfig::default());
        assert_eq!(cfg.http_addr, "0.0.0.0:9999".parse().unwrap());
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn file_values_are_used() {
        let file = FileConfig::from_toml_str(
            r#"
http_addr = "127.0.0.1:7000"
log_level = "debug"

[engine]
endpoint = "wss://relay.example:443/ws"
disconnect_timeout_ms = 8000
"#,
        )
        .unwrap();
        let cfg = file.merge(Overrides::default()).unwrap();
        assert_eq!(cfg.engine.endpoint, "wss://relay.example:443/ws");
        assert_eq!(cfg.engine.disconnect_timeout, Duration::from_secs(8));
        assert_eq!(cfg.http_addr.port(), 7000);
        assert_eq!(cfg.log_level, "debug");
    }

    #[test]
    fn flags_override_file() {
        let file = FileConfig::from_toml_str(
            r#"
http_addr = "127.0.0.1:7000"
[engine]
endpoint = "ws://a:1/ws"
"#,
        )
        .unwrap();
        let cfg = file
            .merge(Overrides {
                ws_port: Some(9000),
                http_addr: Some("127.0.0.1:7001".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(cfg.engine.endpoint, "ws://localhost:9000/ws");
        assert_eq!(cfg.http_addr.port(), 7001);
    }

    #[test]
    fn endpoint_flag_beats_port_flag() {
        let cfg = FileConfig::default()
            .merge(Overrides {
                endpoint: Some("ws://relay:1234/stats".into()),
                ws_port: Some(9000),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(cfg.engine.endpoint, "ws://relay:1234/stats");
    }

    #[test]
    fn empty_file_is_default() {
        let file = FileConfig::from_toml_str("").unwrap();
        assert!(file.http_addr.is_none());
        assert!(file.engine.endpoint.is_none());
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(FileConfig::from_toml_str("http_port = 1").is_err());
        assert!(FileConfig::from_toml_str("[engine]\nwindow = 5").is_err());
    }

    #[test]
    fn invalid_values_rejected() {
        let bad_addr = FileConfig::default().merge(Overrides {
            http_addr: Some("not-an-addr".into()),
            ..Default::default()
        });
        assert!(bad_addr.is_err());

        let bad_endpoint = FileConfig::default().merge(Overrides {
            endpoint: Some("http://relay/ws".into()),
            ..Default::default()
        });
        assert!(bad_endpoint.is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = FileConfig::load(Path::new("/nonexistent/linkpulse.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/linkpulse.toml"));
    }
}
