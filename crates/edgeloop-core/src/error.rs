// src/error.rs
use std::fmt;
use std::io;
use thiserror::Error;

/// The step of listener or registry construction that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    Socket,
    SetOption,
    Bind,
    Listen,
    NonBlocking,
    Registry,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InitStage::Socket => "socket",
            InitStage::SetOption => "setsockopt",
            InitStage::Bind => "bind",
            InitStage::Listen => "listen",
            InitStage::NonBlocking => "non-blocking mode",
            InitStage::Registry => "readiness registry",
        };
        f.write_str(name)
    }
}

/// Central error type for the edgeloop engine.
///
/// Only `Init` and `Wait` ever escape the event loop. `Accept` and
/// `Connection` are produced by per-connection helpers and logged by the
/// loop itself.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Listener or registry creation failed; nothing partial is left open.
    #[error("initialization failed at {stage}: {source}")]
    Init {
        stage: InitStage,
        #[source]
        source: io::Error,
    },

    /// accept(2) failed with something other than would-block.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// Read, write or registration failure scoped to one connection.
    #[error("connection fd={fd} failed: {source}")]
    Connection {
        fd: i32,
        #[source]
        source: io::Error,
    },

    /// epoll_wait failed; the loop can no longer observe I/O.
    #[error("readiness wait failed: {0}")]
    Wait(#[source] io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl ServerError {
    pub(crate) fn init(stage: InitStage, source: io::Error) -> Self {
        ServerError::Init { stage, source }
    }

    pub(crate) fn connection(fd: i32, source: io::Error) -> Self {
        ServerError::Connection { fd, source }
    }

    /// Whether this error should stop the event loop rather than a single
    /// connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ServerError::Init { .. } | ServerError::Wait(_) | ServerError::Config(_)
        )
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
