use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Group chat relay server
///
/// Only flags the user actually passed are serialized, so unset flags never
/// mask values from the TOML file or the environment.
#[derive(Parser, Serialize, Clone, Debug)]
#[command(name = "chat-relay", version, about = "Real-time group chat relay")]
pub struct Cli {
    /// Port to listen on
    #[arg(long, env = "CHAT_RELAY_PORT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address
    #[arg(long, env = "CHAT_RELAY_BIND_ADDRESS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long, default_value = "./chat-relay.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "CHAT_RELAY_JSON_LOGS")]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub generate_config: bool,

    /// Path the WebSocket endpoint is served on
    #[arg(long, env = "CHAT_RELAY_WS_PATH")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_path: Option<String>,
}

/// Resolved server configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    /// Port to listen on
    pub port: u16,

    /// Bind address
    pub bind_address: String,

    /// Path to TOML config file
    pub config: String,

    /// Enable structured JSON logging
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    pub generate_config: bool,

    /// Path the WebSocket endpoint is served on
    pub ws_path: String,

    /// Connection liveness and write settings (loaded from [ws] section in TOML)
    #[serde(default, skip_serializing)]
    pub ws: WsConfig,
}

/// Per-connection timing for the WebSocket actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    /// Seconds between server pings (default: 30)
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// Seconds to wait for a pong before closing (default: 10)
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_secs: u64,

    /// Seconds a single socket write may take before the peer is dropped (default: 10)
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
}

impl WsConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs.max(1))
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs.max(1))
    }
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: default_ping_interval(),
            pong_timeout_secs: default_pong_timeout(),
            send_timeout_secs: default_send_timeout(),
        }
    }
}

fn default_ping_interval() -> u64 {
    30
}

fn default_pong_timeout() -> u64 {
    10
}

fn default_send_timeout() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_address: "0.0.0.0".to_string(),
            config: "./chat-relay.toml".to_string(),
            json_logs: false,
            generate_config: false,
            ws_path: "/websocket".to_string(),
            ws: WsConfig::default(),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (CHAT_RELAY_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment(Cli::parse()).extract()
    }

    fn figment(cli: Cli) -> Figment {
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("CHAT_RELAY_").split("__"))
            .merge(Serialized::defaults(cli))
    }

    /// WebSocket path with a guaranteed leading slash.
    pub fn normalized_ws_path(&self) -> String {
        if self.ws_path.starts_with('/') {
            self.ws_path.clone()
        } else {
            format!("/{}", self.ws_path)
        }
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Chat Relay Server Configuration
# Place this file at ./chat-relay.toml or specify with --config <path>
# All settings can be overridden via environment variables (CHAT_RELAY_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 8080)
# port = 8080

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Path the WebSocket endpoint is served on.
# Clients connect to ws://<host>:<port><ws_path>?nickname=<name>
# ws_path = "/websocket"

# ---- Connection Handling ----
# [ws]

# Interval in seconds between server pings (default: 30)
# ping_interval_secs = 30

# Seconds to wait for a pong before closing the connection (default: 10)
# pong_timeout_secs = 10

# Seconds a single write to a client may take before it is dropped (default: 10)
# send_timeout_secs = 10
"#
    .to_string()
}
