// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ms - meter scheduler operator CLI

mod commands;
mod error;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{db, held, meters, proxy};
use tracing_subscriber::EnvFilter;

use crate::error::MsError;

#[derive(Parser)]
#[command(
    name = "ms",
    version,
    about = "Meter scheduler - lock table and lock proxy administration"
)]
struct Cli {
    /// Lock table database URL
    #[arg(long, global = true, env = "MS_DB")]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lock table setup
    Db(db::DbArgs),
    /// Meter rows in the lock table
    Meters(meters::MetersArgs),
    /// Talk to a running lock proxy
    Proxy(proxy::ProxyArgs),
    /// Show the held-lock snapshot written by the scheduler
    Held(held::HeldArgs),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        match e.downcast_ref::<MsError>() {
            Some(err) => eprint!("{}", err),
            None => eprintln!("error: {:#}", e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Db(args) => db::handle(args, cli.db.as_deref()).await,
        Commands::Meters(args) => meters::handle(args, cli.db.as_deref()).await,
        Commands::Proxy(args) => proxy::handle(args, cli.db.as_deref()).await,
        Commands::Held(args) => held::handle(args),
    }
}
