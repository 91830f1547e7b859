//! Configuration loading from environment variables.

use anyhow::{bail, Context, Result};
use std::net::IpAddr;
use std::path::PathBuf;

pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Runtime settings, read from the environment (and `.env`) then overridden by CLI flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_path: PathBuf,
    pub bind: IpAddr,
    pub port: u16,
    pub page_size: u32,
    /// Username acting when a request names no admin
    pub default_admin: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("registro.db"),
            bind: IpAddr::from([127, 0, 0, 1]),
            port: 8080,
            page_size: DEFAULT_PAGE_SIZE,
            default_admin: Some("admin".to_string()),
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Reads `REGISTRO_DB`, `REGISTRO_BIND`, `REGISTRO_PORT`, `REGISTRO_PAGE_SIZE`
    /// and `REGISTRO_ADMIN`, either from the environment or a `.env` file.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = lookup("REGISTRO_DB") {
            config.database_path = PathBuf::from(path);
        }
        if let Some(bind) = lookup("REGISTRO_BIND") {
            config.bind = bind
                .parse()
                .with_context(|| format!("REGISTRO_BIND is not an IP address: {}", bind))?;
        }
        if let Some(port) = lookup("REGISTRO_PORT") {
            config.port = port
                .parse()
                .with_context(|| format!("REGISTRO_PORT is not a port number: {}", port))?;
        }
        if let Some(size) = lookup("REGISTRO_PAGE_SIZE") {
            config.page_size = size
                .parse()
                .with_context(|| format!("REGISTRO_PAGE_SIZE is not a number: {}", size))?;
            if config.page_size == 0 {
                bail!("REGISTRO_PAGE_SIZE must be at least 1");
            }
        }
        if let Some(admin) = lookup("REGISTRO_ADMIN") {
            let admin = admin.trim().to_string();
            config.default_admin = if admin.is_empty() { None } else { Some(admin) };
        }

        Ok(config)
    }
}
