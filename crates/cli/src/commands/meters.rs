// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ms meters` - Meter rows in the lock table

use anyhow::Result;
use clap::{Args, Subcommand};
use ms_core::{Address, PeerFilter, Resource, ResourceFilter, ResourceStatus};
use ms_storage::LockStore;

use super::open_store;
use crate::error::MsError;
use crate::output::{print_list, OutputFormat};

#[derive(Args)]
pub struct MetersArgs {
    #[command(subcommand)]
    pub command: MetersCommand,
}

#[derive(Subcommand)]
pub enum MetersCommand {
    /// Add free meter rows
    Add {
        /// Meter addresses
        #[arg(required = true)]
        addresses: Vec<String>,
        /// Peer group shared by all added meters
        #[arg(long)]
        group: Option<String>,
        /// Add the rows outside the candidate pool
        #[arg(long)]
        inactive: bool,
    },
    /// List meter rows
    List {
        /// Include inactive meters
        #[arg(long)]
        all: bool,
        /// Only meters in a peer group
        #[arg(long, conflicts_with = "singles")]
        grouped: bool,
        /// Only meters without a peer group
        #[arg(long)]
        singles: bool,
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
    /// Clear a meter's busy flag regardless of who holds it
    Release {
        address: String,
    },
    /// Return a meter to the candidate pool
    Activate {
        address: String,
    },
    /// Take a meter out of the candidate pool
    Deactivate {
        address: String,
    },
}

pub async fn handle(args: MetersArgs, db: Option<&str>) -> Result<()> {
    let (store, url) = open_store(db).await?;

    match args.command {
        MetersCommand::Add {
            addresses,
            group,
            inactive,
        } => {
            let status = if inactive {
                ResourceStatus::Inactive
            } else {
                ResourceStatus::Active
            };
            for address in addresses {
                let mut resource = Resource::new(Address::new(address)).with_status(status);
                if let Some(group) = &group {
                    resource = resource.with_peer_group(group.clone());
                }
                store
                    .insert_resource(&resource)
                    .await
                    .map_err(|e| MsError::store(&url, e))?;
                println!("Added {}", resource.address);
            }
        }

        MetersCommand::List {
            all,
            grouped,
            singles,
            format,
        } => {
            let mut filter = if all {
                ResourceFilter::default()
            } else {
                ResourceFilter::active()
            };
            if grouped {
                filter = filter.with_peer(PeerFilter::Grouped);
            } else if singles {
                filter = filter.with_peer(PeerFilter::Ungrouped);
            }
            let resources = store
                .list_resources(&filter)
                .await
                .map_err(|e| MsError::store(&url, e))?;

            if resources.is_empty() && matches!(format, OutputFormat::Text) {
                println!("No meters");
            } else {
                if matches!(format, OutputFormat::Text) {
                    println!(
                        "{:<24} {:<6} {:<24} {:<12} {:<8} LOCKS",
                        "ADDRESS", "BUSY", "OWNER", "GROUP", "STATUS"
                    );
                }
                print_list(&resources, format, format_row)?;
            }
        }

        MetersCommand::Release { address } => {
            let address = Address::new(address);
            let was_locked = store
                .force_unlock(&address)
                .await
                .map_err(|e| MsError::store(&url, e))?;
            if was_locked {
                println!("Released {}", address);
            } else {
                println!("{} was not locked", address);
            }
        }

        MetersCommand::Activate { address } => {
            set_status(&store, &url, address, ResourceStatus::Active).await?;
        }

        MetersCommand::Deactivate { address } => {
            set_status(&store, &url, address, ResourceStatus::Inactive).await?;
        }
    }

    Ok(())
}

async fn set_status(
    store: &ms_storage::SqliteLockStore,
    url: &str,
    address: String,
    status: ResourceStatus,
) -> Result<()> {
    let address = Address::new(address);
    store
        .set_status(&address, status)
        .await
        .map_err(|e| MsError::store(url, e))?;
    println!("{} is now {}", address, status);
    Ok(())
}

fn format_row(r: &Resource) -> String {
    format!(
        "{:<24} {:<6} {:<24} {:<12} {:<8} {}",
        r.address.as_str(),
        if r.busy { "yes" } else { "no" },
        r.owner_host.as_deref().unwrap_or("-"),
        r.peer_group.as_ref().map_or("-", |g| g.0.as_str()),
        r.status.as_str(),
        r.busy_change_count
    )
}
