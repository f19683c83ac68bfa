use anyhow::Context;
use clap::{Parser, ValueEnum};
use edgeloop_core::{Config, LISTEN_ADDR, Server, logging};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "edgeloop")]
#[command(about = "Single-threaded, edge-triggered epoll HTTP/1.1 server")]
#[command(version)]
struct Cli {
    /// TCP port to listen on (always bound on 127.0.0.1)
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// Close connections that stay silent for this many seconds (0 disables)
    #[arg(long, value_name = "SECS")]
    idle_timeout: Option<u64>,

    /// Maximum number of simultaneously open connections
    #[arg(long, value_name = "N")]
    max_connections: Option<usize>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Compact,
    Pretty,
    Json,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // --help and --version land here too and are not failures.
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match cli.log_format {
        LogFormat::Compact => logging::init_logging(),
        LogFormat::Pretty => logging::init_logging_pretty(),
        LogFormat::Json => logging::init_logging_json(),
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = apply_overrides(
        Config::from_env(cli.port).context("invalid EDGELOOP_* environment")?,
        &cli,
    );

    let mut event_loop = Server::with_config(config)
        .build()
        .with_context(|| format!("failed to start server on {}:{}", LISTEN_ADDR, cli.port))?;

    let handle = event_loop.shutdown_handle();
    ctrlc::set_handler(move || {
        tracing::info!("received interrupt, shutting down");
        handle.shutdown();
    })
    .context("failed to install Ctrl-C handler")?;

    event_loop.run()?;
    Ok(())
}

fn apply_overrides(mut config: Config, cli: &Cli) -> Config {
    if let Some(secs) = cli.idle_timeout {
        config = config.idle_timeout((secs > 0).then(|| Duration::from_secs(secs)));
    }
    if let Some(max) = cli.max_connections {
        config = config.max_connections(max);
    }
    config
}
