use natours_storage::{ConnectError, StoreLocation, DEFAULT_DATABASE};
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Process settings, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database: StoreLocation,
    pub addr: SocketAddr,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PORT must be a port number, got {0:?}")]
    InvalidPort(String),
    #[error("HOST must be an IP address, got {0:?}")]
    InvalidHost(String),
    #[error("DATABASE: {0}")]
    Database(#[from] ConnectError),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database = lookup("DATABASE")
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string())
            .parse::<StoreLocation>()?;
        let port = match lookup("PORT") {
            Some(p) => p
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(p.clone()))?,
            None => DEFAULT_PORT,
        };
        let host = lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let ip: IpAddr = host
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidHost(host.clone()))?;
        Ok(Self {
            database,
            addr: SocketAddr::new(ip, port),
        })
    }
}
