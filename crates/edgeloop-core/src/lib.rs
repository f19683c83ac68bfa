// src/lib.rs
#[cfg(not(target_os = "linux"))]
compile_error!("edgeloop-core is built on epoll and only supports Linux");

pub mod config;
pub mod conn;
pub mod error;
pub mod event_loop;
pub mod http;
pub mod listener;
pub mod logging;
pub mod metrics;
pub mod parser;
pub mod registry;
pub mod router;
pub mod server;
pub mod slab;
pub mod syscalls;

// Re-exports for users
pub use config::{Config, ConfigError, LISTEN_ADDR};
pub use error::{InitStage, ServerError, ServerResult};
pub use event_loop::{EventLoop, ShutdownHandle};
pub use http::{Method, Request, Response};
pub use metrics::MetricsSnapshot;
pub use parser::{ParseError, parse_request};
pub use router::{ROUTES, Route, Router};
pub use server::Server;
