// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ms db` - Lock table setup

use anyhow::Result;
use clap::{Args, Subcommand};

use super::open_store;
use crate::error::MsError;

#[derive(Args)]
pub struct DbArgs {
    #[command(subcommand)]
    pub command: DbCommand,
}

#[derive(Subcommand)]
pub enum DbCommand {
    /// Create the meters table (no-op when it exists)
    Init,
}

pub async fn handle(args: DbArgs, db: Option<&str>) -> Result<()> {
    match args.command {
        DbCommand::Init => {
            let (store, url) = open_store(db).await?;
            store
                .create_schema()
                .await
                .map_err(|e| MsError::store(&url, e))?;
            println!("Initialized lock table in {}", url);
        }
    }
    Ok(())
}
