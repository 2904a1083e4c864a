//! Server configuration read from `LEDGERBOX_*` environment variables.

use anyhow::{anyhow, Context, Result};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use ledgerbox_core::sync::DEFAULT_SYNC_WINDOW_SIZE;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8088";
const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;
const DEFAULT_RATE_LIMIT_PER_MINUTE: u64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub data_dir: String,
    pub sync_window: usize,
    pub request_timeout: Duration,
    pub body_limit_bytes: usize,
    /// Batch requests allowed per credential and minute. 0 disables the limit.
    pub rate_limit_per_minute: u64,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let value = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let listen_addr = parse_or(&value, "LEDGERBOX_LISTEN_ADDR", || {
            SocketAddr::from_str(DEFAULT_LISTEN_ADDR).context("default listen address")
        })?;
        let data_dir = value("LEDGERBOX_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
        let sync_window: usize =
            parse_or(&value, "LEDGERBOX_SYNC_WINDOW", || Ok(DEFAULT_SYNC_WINDOW_SIZE))?;
        if sync_window == 0 {
            return Err(anyhow!("LEDGERBOX_SYNC_WINDOW must be at least 1"));
        }
        let timeout_secs: u64 = parse_or(&value, "LEDGERBOX_REQUEST_TIMEOUT_SECS", || {
            Ok(DEFAULT_REQUEST_TIMEOUT_SECS)
        })?;
        if timeout_secs == 0 {
            return Err(anyhow!("LEDGERBOX_REQUEST_TIMEOUT_SECS must be at least 1"));
        }
        let body_limit_bytes = parse_or(&value, "LEDGERBOX_BODY_LIMIT_BYTES", || {
            Ok(DEFAULT_BODY_LIMIT_BYTES)
        })?;
        let rate_limit_per_minute = parse_or(&value, "LEDGERBOX_RATE_LIMIT_PER_MINUTE", || {
            Ok(DEFAULT_RATE_LIMIT_PER_MINUTE)
        })?;
        let log_format = match value("LEDGERBOX_LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(anyhow!(
                    "LEDGERBOX_LOG_FORMAT must be 'text' or 'json', got '{}'",
                    other
                ))
            }
        };

        Ok(Self {
            listen_addr,
            data_dir,
            sync_window,
            request_timeout: Duration::from_secs(timeout_secs),
            body_limit_bytes,
            rate_limit_per_minute,
            log_format,
        })
    }
}

fn parse_or<T>(
    value: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: impl FnOnce() -> Result<T>,
) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow!("Invalid {} '{}': {}", key, raw, e)),
        None => default(),
    }
}
