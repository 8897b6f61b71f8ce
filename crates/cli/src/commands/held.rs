// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ms held` - Print the held-lock snapshot

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use ms_core::config::{SchedulerConfig, SNAPSHOT_FILE};
use ms_storage::LockSnapshot;

use crate::error::MsError;
use crate::output::{print_list, OutputFormat};

#[derive(Args)]
pub struct HeldArgs {
    /// Directory holding the snapshot (defaults to the scheduler's)
    #[arg(long)]
    dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
}

pub fn handle(args: HeldArgs) -> Result<()> {
    let path = match args.dir {
        Some(dir) => dir.join(SNAPSHOT_FILE),
        None => SchedulerConfig::default().snapshot_path(),
    };
    let snapshot = LockSnapshot::new(path.clone());
    let held = snapshot.read().map_err(|e| {
        MsError::new(format!("Could not read {}", path.display()))
            .with_context("The file is rewritten by the scheduler after every lock change")
            .with_source(e)
    })?;

    if held.is_empty() && matches!(args.format, OutputFormat::Text) {
        println!("No meters held");
    } else {
        print_list(&held, args.format, |a| a.to_string())?;
    }
    Ok(())
}
