//! Server configuration loaded from the environment

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Bearer token required to publish (None = publishing is open)
    pub publish_token: Option<String>,
    /// Broadcast every line read from stdin
    pub stdin_producer: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            publish_token: None,
            stdin_producer: false,
        }
    }
}

impl ServerConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = match std::env::var("LONGPOLL_HOST") {
            Ok(v) => v.trim().parse().unwrap_or_else(|_| {
                tracing::warn!("Invalid LONGPOLL_HOST {:?}, using {}", v, defaults.host);
                defaults.host
            }),
            Err(_) => defaults.host,
        };

        let port = match std::env::var("LONGPOLL_PORT") {
            Ok(v) => v.trim().parse().unwrap_or_else(|_| {
                tracing::warn!("Invalid LONGPOLL_PORT {:?}, using {}", v, defaults.port);
                defaults.port
            }),
            Err(_) => defaults.port,
        };

        let publish_token = std::env::var("LONGPOLL_PUBLISH_TOKEN")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if publish_token.is_none() {
            tracing::warn!("LONGPOLL_PUBLISH_TOKEN not set - anyone can broadcast!");
        }

        let stdin_producer = std::env::var("LONGPOLL_STDIN_PRODUCER")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        Self {
            host,
            port,
            publish_token,
            stdin_producer,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
