// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Meter lock proxy daemon (msd)
//!
//! Serves the lock table to worker processes over a Unix socket so they
//! share one database connection. Releases every lock still held through it
//! on SIGTERM/SIGINT.
//!
//! Usage: `msd [DATABASE_URL] [--config PATH]`

use std::path::PathBuf;

use ms_daemon::lifecycle::{self, Config, LifecycleError};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (database_url, config_path) = parse_args(std::env::args().skip(1))?;
    let config = Config::from_env(database_url, config_path)?;

    // Write startup marker to log (before tracing setup, so callers can find it)
    write_startup_marker(&config)?;

    let log_guard = setup_logging(&config)?;

    info!(database = %config.database_url, "starting msd");

    let daemon = match lifecycle::startup(&config).await {
        Ok(d) => d,
        Err(e) => {
            // Write error synchronously (tracing is non-blocking and may not flush in time)
            write_startup_error(&config, &e);
            error!("Failed to start lock proxy: {}", e);
            drop(log_guard);
            return Err(e.into());
        }
    };

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(socket = %config.socket_path.display(), "lock proxy ready");

    // Signal ready for the parent process waiting on startup
    println!("READY");

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        _ = sigint.recv() => info!("Received SIGINT, shutting down..."),
    }

    let failed = daemon.shutdown().await?;
    info!("lock proxy stopped");
    drop(log_guard);
    if !failed.is_empty() {
        return Err(format!("{} meter(s) could not be released", failed.len()).into());
    }
    Ok(())
}

fn parse_args(
    mut args: impl Iterator<Item = String>,
) -> Result<(Option<String>, Option<PathBuf>), String> {
    let mut database_url = None;
    let mut config_path = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().ok_or("--config needs a path")?;
                config_path = Some(PathBuf::from(path));
            }
            flag if flag.starts_with('-') => return Err(format!("unknown option {flag}")),
            _ if database_url.is_none() => database_url = Some(arg),
            _ => return Err(format!("unexpected argument {arg}")),
        }
    }
    Ok((database_url, config_path))
}

/// Startup marker prefix written to log before anything else.
/// Full format: "--- msd: starting (pid: 12345) ---"
pub const STARTUP_MARKER_PREFIX: &str = "--- msd: starting (pid: ";

/// Write startup marker to log file (appends to existing log)
fn write_startup_marker(config: &Config) -> Result<(), LifecycleError> {
    use std::io::Write;

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    writeln!(file, "{}{}) ---", STARTUP_MARKER_PREFIX, std::process::id())?;

    Ok(())
}

/// Write startup error synchronously to log file.
fn write_startup_error(config: &Config, error: &LifecycleError) {
    use std::io::Write;

    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)
    else {
        return;
    };
    let _ = writeln!(file, "ERROR Failed to start lock proxy: {}", error);
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file_appender = tracing_appender::rolling::never(
        config.log_path.parent().ok_or(LifecycleError::NoStateDir)?,
        config
            .log_path
            .file_name()
            .ok_or(LifecycleError::NoStateDir)?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
