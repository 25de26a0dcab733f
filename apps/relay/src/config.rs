//! Relay configuration.
//!
//! Read from a TOML file given with `--config`; every field has a default,
//! so the file may be partial or absent. `--port` overrides the file.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};

use dropline_protocol::constants::{DEFAULT_RELAY_PORT, WS_MAX_MESSAGE_SIZE};
use dropline_relay_server::ServerConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Address to listen on.
    #[serde(default = "default_bind")]
    pub bind: IpAddr,

    /// Signaling port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted signaling message, in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    DEFAULT_RELAY_PORT
}

fn default_max_message_size() -> usize {
    WS_MAX_MESSAGE_SIZE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            max_message_size: default_max_message_size(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(version, about = "Dropline signaling relay")]
struct Cli {
    /// Configuration file path.
    ///
    /// Example: dropline-relay --config /etc/dropline/relay.toml
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Port to listen on, overriding the configuration file.
    #[arg(long, short)]
    port: Option<u16>,
}

impl Config {
    /// Loads configuration from the command line and optional file.
    pub fn load() -> anyhow::Result<Self> {
        Self::from_cli(Cli::parse())
    }

    fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        if let Some(port) = cli.port {
            config.port = port;
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "configuration read");
        Ok(config)
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind: self.bind,
            port: self.port,
            max_message_size: self.max_message_size,
        }
    }
}
