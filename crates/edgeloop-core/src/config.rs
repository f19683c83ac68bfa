// src/config.rs
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;

/// The only address the server ever binds to.
pub const LISTEN_ADDR: Ipv4Addr = Ipv4Addr::LOCALHOST;

pub const DEFAULT_BACKLOG: i32 = 128;
pub const DEFAULT_MAX_EVENTS: usize = 64;
pub const DEFAULT_READ_BUF_SIZE: usize = 4096;
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is not a valid number: {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Runtime knobs for the event loop.
///
/// Defaults reproduce the classic single-exchange server: a 128 deep
/// backlog, 64 events per wait, 4 KiB per request and no idle timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// TCP port on the loopback interface. Zero asks the kernel for an
    /// ephemeral port (handy in tests).
    pub port: u16,

    /// listen(2) backlog.
    pub backlog: i32,

    /// Upper bound on events returned by a single wait.
    pub max_events: usize,

    /// Bytes accumulated per connection before the request is decoded
    /// regardless of whether a line terminator arrived.
    pub read_buf_size: usize,

    /// Capacity of the connection table.
    pub max_connections: usize,

    /// Close connections that stay silent longer than this. `None` keeps
    /// idle connections registered forever.
    pub idle_timeout: Option<Duration>,
}

impl Config {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            backlog: DEFAULT_BACKLOG,
            max_events: DEFAULT_MAX_EVENTS,
            read_buf_size: DEFAULT_READ_BUF_SIZE,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            idle_timeout: None,
        }
    }

    /// Build a configuration from the environment (with `.env` support).
    ///
    /// Recognised variables: `EDGELOOP_BACKLOG`, `EDGELOOP_MAX_EVENTS`,
    /// `EDGELOOP_READ_BUF_SIZE`, `EDGELOOP_MAX_CONNECTIONS` and
    /// `EDGELOOP_IDLE_TIMEOUT_SECS`. Unset variables keep their default.
    pub fn from_env(port: u16) -> Result<Self, ConfigError> {
        // A missing .env file is fine.
        let _ = dotenvy::dotenv();
        Self::from_lookup(port, |key| std::env::var(key).ok())
    }

    fn from_lookup<F>(port: u16, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let mut cfg = Self::new(port);

        if let Some(v) = parse_var(&lookup, "EDGELOOP_BACKLOG")? {
            cfg.backlog = v;
        }
        if let Some(v) = parse_var(&lookup, "EDGELOOP_MAX_EVENTS")? {
            cfg.max_events = v;
        }
        if let Some(v) = parse_var(&lookup, "EDGELOOP_READ_BUF_SIZE")? {
            cfg.read_buf_size = v;
        }
        if let Some(v) = parse_var(&lookup, "EDGELOOP_MAX_CONNECTIONS")? {
            cfg.max_connections = v;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "EDGELOOP_IDLE_TIMEOUT_SECS")? {
            cfg.idle_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events;
        self
    }

    pub fn read_buf_size(mut self, size: usize) -> Self {
        self.read_buf_size = size;
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backlog <= 0 {
            return Err(ConfigError::Zero("backlog"));
        }
        if self.max_events == 0 {
            return Err(ConfigError::Zero("max_events"));
        }
        if self.read_buf_size == 0 {
            return Err(ConfigError::Zero("read_buf_size"));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Zero("max_connections"));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&'static str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var, value: raw }),
    }
}
