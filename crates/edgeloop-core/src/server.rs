// src/server.rs
use crate::config::Config;
use crate::error::ServerResult;
use crate::event_loop::EventLoop;
use crate::listener::Listener;
use crate::router::Router;

/// Builder that binds the listener and assembles an [`EventLoop`].
///
/// ```rust,no_run
/// use edgeloop_core::Server;
///
/// Server::bind(8080).serve().unwrap();
/// ```
pub struct Server {
    config: Config,
    router: Router,
}

impl Server {
    pub fn bind(port: u16) -> Self {
        Self::with_config(Config::new(port))
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            router: Router::new(),
        }
    }

    pub fn router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Create the listener and readiness registry without starting the loop.
    pub fn build(self) -> ServerResult<EventLoop> {
        self.config.validate()?;
        let listener = Listener::bind(self.config.port, self.config.backlog)?;
        EventLoop::new(listener, self.config, self.router)
    }

    /// Build and run on the current thread until shutdown.
    pub fn serve(self) -> ServerResult<()> {
        self.build()?.run()
    }
}
