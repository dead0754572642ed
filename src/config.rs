use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

// Constants
pub const SESSION_MAX_AGE: u64 = 24 * 60 * 60; // 24 hours in seconds
pub const SWEEP_INTERVAL: u64 = 60 * 60; // hourly
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
pub const DEFAULT_STATE_DIR: &str = ".sheet-sync";

/// Server settings, read from `SHEET_SYNC_*` environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub max_age: Duration,
    pub sweep_interval: Duration,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            max_age: Duration::from_secs(SESSION_MAX_AGE),
            sweep_interval: Duration::from_secs(SWEEP_INTERVAL),
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by whatever variables are set. Unparseable values
    /// are reported and ignored.
    pub fn from_env() -> Self {
        ServerConfig::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`ServerConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = ServerConfig::default();
        let sweep_interval = match parse_var::<u64>(&lookup, "SHEET_SYNC_SWEEP_SECS") {
            Some(0) => {
                log::warn!(
                    "Ignoring SHEET_SYNC_SWEEP_SECS=0: the sweep interval must be positive"
                );
                defaults.sweep_interval
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.sweep_interval,
        };
        ServerConfig {
            addr: parse_var(&lookup, "SHEET_SYNC_ADDR").unwrap_or(defaults.addr),
            max_age: parse_var(&lookup, "SHEET_SYNC_MAX_AGE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_age),
            sweep_interval,
            upload_dir: lookup("SHEET_SYNC_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            max_upload_bytes: parse_var(&lookup, "SHEET_SYNC_MAX_UPLOAD_BYTES")
                .unwrap_or(defaults.max_upload_bytes),
        }
    }
}

/// Client-side timing.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Quiet period after the last local write before state is pushed.
    pub push_delay: Duration,
    /// How often an active session is re-validated against the server.
    pub poll_interval: Duration,
    /// Transport timeout for HTTP calls.
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            push_delay: Duration::from_millis(500),
            poll_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Directory the local-only CLI keeps its state in.
pub fn state_dir() -> PathBuf {
    env::var("SHEET_SYNC_STATE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_STATE_DIR))
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring {}={:?}: not a valid value", name, raw);
            None
        }
    }
}
