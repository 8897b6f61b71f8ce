// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ms proxy` - Talk to a running lock proxy

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Subcommand};
use ms_core::config::{default_holder_host, ENV_LOCK_SOCKET};
use ms_core::Address;
use ms_daemon::lifecycle::default_socket_path;
use ms_daemon::{ClientError, LockProxyClient};
use ms_storage::{LockStore, StoreError};

use super::require_db;
use crate::error::MsError;
use crate::output::{print_list, OutputFormat};

#[derive(Args)]
pub struct ProxyArgs {
    /// Proxy socket (defaults to the socket msd uses for --db)
    #[arg(long, global = true, env = ENV_LOCK_SOCKET)]
    socket: Option<PathBuf>,

    /// How long to wait for the proxy to accept (seconds)
    #[arg(long, global = true, default_value = "5")]
    wait: u64,

    #[command(subcommand)]
    pub command: ProxyCommand,
}

#[derive(Subcommand)]
pub enum ProxyCommand {
    /// Check that the proxy answers
    Ping,
    /// Lock a meter through the proxy
    Lock {
        address: String,
        /// Recorded as the row's owner host
        #[arg(long)]
        holder: Option<String>,
    },
    /// Unlock a meter through the proxy
    Unlock { address: String },
    /// Meters currently held through the proxy
    Held {
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
}

pub async fn handle(args: ProxyArgs, db: Option<&str>) -> Result<()> {
    let socket = match args.socket {
        Some(path) => path,
        None => default_socket_path(require_db(db)?),
    };
    let client = LockProxyClient::new(socket.clone())
        .with_connect_timeout(Duration::from_secs(args.wait));
    let fail = |e: ClientError| match e {
        ClientError::NotReady { .. } | ClientError::Io(_) => {
            MsError::proxy_unreachable(&socket, e)
        }
        other => MsError::proxy(other),
    };
    let store_fail = |e: StoreError| match e {
        StoreError::Unreachable { .. } => MsError::proxy_unreachable(&socket, e),
        other => MsError::proxy(ClientError::Store(other)),
    };

    match args.command {
        ProxyCommand::Ping => {
            let version = client.hello().await.map_err(fail)?;
            println!("pong (protocol v{})", version);
        }

        ProxyCommand::Lock { address, holder } => {
            let address = Address::new(address);
            let holder = holder.unwrap_or_else(|| default_holder_host(|k| std::env::var(k).ok()));
            let acquired = client
                .try_lock(&address, &holder)
                .await
                .map_err(store_fail)?;
            if acquired {
                println!("Locked {} for {}", address, holder);
            } else {
                return Err(MsError::new(format!("Meter '{}' is busy", address))
                    .with_suggestion("List owners: ms meters list")
                    .into());
            }
        }

        ProxyCommand::Unlock { address } => {
            let address = Address::new(address);
            client
                .unlock(&address)
                .await
                .map_err(store_fail)?;
            println!("Unlocked {}", address);
        }

        ProxyCommand::Held { format } => {
            let held = client.held().await.map_err(fail)?;
            if held.is_empty() && matches!(format, OutputFormat::Text) {
                println!("No meters held");
            } else {
                print_list(&held, format, |a| a.to_string())?;
            }
        }
    }

    Ok(())
}
