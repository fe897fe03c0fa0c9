use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::channel::DEFAULT_OUTBOX_CAPACITY;
use crate::error::{HarnessError, Result};
use crate::panel::PanelConfig;

// =============================================================================
// Harness config (figment-deserialized from defaults / harness.toml / env vars)
// =============================================================================
//
//   harness.toml:    [server]
//                    port = 63006
//
//   env var:         HARNESS_SERVER__PORT=63006   (double underscore = nesting)
//
// CLI flags are applied last, on top of the extracted config.

pub const DEFAULT_CONFIG_FILE: &str = "harness.toml";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub session: SessionFileConfig,
    #[serde(default)]
    pub playback: PlaybackFileConfig,
    /// Button layout sent on `ready`.
    #[serde(default)]
    pub panel: PanelConfig,
}

/// Listener settings (lives under `[server]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// WebSocket route the peer connects to.
    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
        }
    }
}

/// Per-connection knobs (lives under `[session]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionFileConfig {
    /// Period of the unsolicited `active` message; 0 disables it.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
}

impl Default for SessionFileConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            outbox_capacity: default_outbox_capacity(),
        }
    }
}

/// Capture replay (lives under `[playback]`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlaybackFileConfig {
    /// Capture log replayed after each `ready`.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    63006
}
fn default_path() -> String {
    "/scrcpy".to_string()
}
fn default_heartbeat_interval_ms() -> u64 {
    3000
}
fn default_outbox_capacity() -> usize {
    DEFAULT_OUTBOX_CAPACITY
}

/// Values given on the command line. `None` leaves the loaded value alone.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,
    pub heartbeat_interval_ms: Option<u64>,
    pub playback_file: Option<PathBuf>,
}

/// Build a figment that layers: defaults → config file → HARNESS_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `HARNESS_SERVER__PORT=7000`  →  `server.port = 7000`
///   `HARNESS_SESSION__HEARTBEAT_INTERVAL_MS=0`  →  `session.heartbeat_interval_ms = 0`
pub fn load_config(config_file: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(HarnessConfig::default()))
        .merge(Toml::file(config_file))
        .merge(Env::prefixed("HARNESS_").split("__"))
}

impl HarnessConfig {
    /// Load, apply CLI overrides, and validate.
    pub fn load(config_file: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let config_file = config_file.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
        let mut config: HarnessConfig = load_config(config_file)
            .extract()
            .map_err(|e| HarnessError::Config(e.to_string()))?;
        config.apply(overrides);
        config.validate()?;
        info!(
            "Configuration loaded (config file: {})",
            config_file.display()
        );
        Ok(config)
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(host) = overrides.host {
            self.server.host = host;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(path) = overrides.path {
            self.server.path = path;
        }
        if let Some(ms) = overrides.heartbeat_interval_ms {
            self.session.heartbeat_interval_ms = ms;
        }
        if let Some(file) = overrides.playback_file {
            self.playback.file = Some(file);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.server.path.starts_with('/') {
            return Err(HarnessError::Config(format!(
                "server.path must start with '/', got `{}`",
                self.server.path
            )));
        }
        if self.session.outbox_capacity == 0 {
            return Err(HarnessError::Config(
                "session.outbox_capacity must be positive".to_string(),
            ));
        }
        self.bind_addr()?;
        self.panel.validate()
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| {
                HarnessError::Config(format!(
                    "invalid listen address {}:{}: {}",
                    self.server.host, self.server.port, e
                ))
            })
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        match self.session.heartbeat_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}
