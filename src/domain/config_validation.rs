//! Configuration validation.
//!
//! Checks the `[database]` and `[web]` sections before any store is opened
//! or any socket is bound.

use std::net::SocketAddr;
use std::str::FromStr;

use crate::domain::error::LedgerError;
use crate::domain::page::MAX_PAGE_SIZE;
use crate::ports::config_port::ConfigPort;

/// Storage engine selected by `[database] backend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    Postgres,
}

impl FromStr for Backend {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(Backend::Sqlite),
            "postgres" | "postgresql" => Ok(Backend::Postgres),
            other => Err(invalid(
                "database",
                "backend",
                format!("unknown backend '{other}', expected sqlite or postgres"),
            )),
        }
    }
}

fn invalid(section: &str, key: &str, reason: String) -> LedgerError {
    LedgerError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason,
    }
}

/// Validates `[database]` and returns the selected backend. Defaults to SQLite.
pub fn validate_database_config(config: &dyn ConfigPort) -> Result<Backend, LedgerError> {
    let backend = match config.get_string("database", "backend") {
        Some(raw) if !raw.trim().is_empty() => raw.parse()?,
        _ => Backend::Sqlite,
    };

    match backend {
        Backend::Sqlite => {
            config.require_string("database", "path")?;
        }
        Backend::Postgres => {
            config.require_string("database", "conninfo")?;
        }
    }

    let pool_size = config.get_int("database", "pool_size", 4);
    if !(1..=64).contains(&pool_size) {
        return Err(invalid(
            "database",
            "pool_size",
            format!("pool_size must be between 1 and 64, got {pool_size}"),
        ));
    }

    Ok(backend)
}

/// Validated `[web]` settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebSettings {
    pub listen: SocketAddr,
    pub default_page_size: u32,
}

pub fn validate_web_config(config: &dyn ConfigPort) -> Result<WebSettings, LedgerError> {
    let listen_raw = config
        .get_string("web", "listen")
        .unwrap_or_else(|| "127.0.0.1:3000".to_string());
    let listen = listen_raw
        .trim()
        .parse::<SocketAddr>()
        .map_err(|e| invalid("web", "listen", format!("'{listen_raw}' is not a socket address: {e}")))?;

    let size = config.get_int("web", "default_page_size", 20);
    if size < 1 || size > i64::from(MAX_PAGE_SIZE) {
        return Err(invalid(
            "web",
            "default_page_size",
            format!("default_page_size must be between 1 and {MAX_PAGE_SIZE}, got {size}"),
        ));
    }

    Ok(WebSettings {
        listen,
        default_page_size: size as u32,
    })
}
