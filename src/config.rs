//! Bridge configuration.
//!
//! Loaded with `figment`, layering a TOML file over environment variables
//! (`figment::Figment` with `Toml` + `Env` providers).

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    pub cdp_port: u16,
    pub brop_port: u16,
    pub ext_port: u16,
    pub http_port: u16,
    pub max_console_entries_per_tab: usize,
    pub max_call_log_entries: usize,
    pub extension_call_timeout_ms: u64,
    pub client_event_high_watermark: usize,
    pub target_id_prefix: String,
    pub enable_request_log: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cdp_port: 9222,
            brop_port: 9223,
            ext_port: 9224,
            http_port: 9225,
            max_console_entries_per_tab: 1000,
            max_call_log_entries: 1000,
            extension_call_timeout_ms: 30_000,
            client_event_high_watermark: 256,
            target_id_prefix: "tab".to_string(),
            enable_request_log: true,
        }
    }
}

impl Config {
    /// Load configuration, merging (in increasing priority):
    /// built-in defaults, an optional TOML file, then `BRIDGE_*` env vars.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        } else {
            figment = figment.merge(Toml::file("bridge.toml"));
        }

        figment = figment.merge(Env::prefixed("BRIDGE_"));

        figment
            .extract()
            .map_err(|e| BridgeError::Config(e.to_string()))
    }

    pub fn extension_call_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.extension_call_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_ports() {
        let cfg = Config::default();
        assert_eq!(cfg.cdp_port, 9222);
        assert_eq!(cfg.brop_port, 9223);
        assert_eq!(cfg.ext_port, 9224);
        assert_eq!(cfg.http_port, 9225);
        assert_eq!(cfg.max_console_entries_per_tab, 1000);
    }

    #[test]
    fn load_without_file_falls_back_to_defaults() {
        let cfg = Config::load(Some(std::path::Path::new(
            "/nonexistent/bridge-config-test.toml",
        )))
        .expect("defaults + env should still resolve");
        assert_eq!(cfg.cdp_port, Config::default().cdp_port);
    }

    #[test]
    fn env_override_wins_over_default() {
        std::env::set_var("BRIDGE_CDP_PORT", "19222");
        let cfg = Config::load(Some(std::path::Path::new(
            "/nonexistent/bridge-config-test-2.toml",
        )))
        .unwrap();
        assert_eq!(cfg.cdp_port, 19222);
        std::env::remove_var("BRIDGE_CDP_PORT");
    }
}
