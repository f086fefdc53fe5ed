//! `trail-finder` server: loads the dataset once, then serves nearest-route
//! queries over HTTP.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use env_logger::{Builder, Target};
use log::{error, info};

use trail_finder::config::{LogLevel, ServerConfig};
use trail_finder::{http, load_index, QueryEngine, Result};

fn init_logging(level: LogLevel) {
    let mut builder = Builder::new();
    builder
        .filter_level(level.to_filter())
        .target(Target::Stderr)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} [{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        // RUST_LOG overrides the command-line level
        .parse_default_env();

    if builder.try_init().is_err() {
        eprintln!("Logger already initialised");
    }
}

async fn run(config: ServerConfig) -> Result<()> {
    config.validate()?;

    // Fatal on failure: never serve from a partially loaded index.
    let index = load_index(&config.dataset)?;
    let engine = QueryEngine::with_defaults(Arc::new(index), config.query_defaults());
    info!(
        "[Server] Ready: {} features, default limit {}, {} policy",
        engine.stats().feature_count,
        engine.defaults().limit,
        engine.defaults().distance_policy
    );

    http::serve(&config, engine).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = ServerConfig::parse();
    init_logging(config.log_level);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("[Server] {}", err);
            ExitCode::FAILURE
        }
    }
}
