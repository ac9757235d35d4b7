//! linewire: an interactive line-oriented text server
//!
//! Each TCP connection is served a line at a time:
//! - input is accumulated across partial reads and echoed back to
//!   terminal-style peers
//! - complete lines are parsed as commands and answered
//! - configuration via CLI arguments or TOML file

use linewire::config::Config;
use linewire::server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        max_sessions = config.max_sessions,
        read_timeout_ms = config.read_timeout_ms,
        idle_timeout_secs = config.idle_timeout_secs,
        line_ending = ?config.line.line_ending,
        capacity = config.line.capacity,
        "Starting linewire server"
    );

    let server = Server::bind(config)?;
    server.run()?;
    Ok(())
}
