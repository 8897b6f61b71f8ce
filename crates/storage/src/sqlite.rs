// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed lock table
//!
//! One row per meter in the `meters` table:
//!
//! ```sql
//! CREATE TABLE meters (
//!   address TEXT PRIMARY KEY NOT NULL,
//!   busy INTEGER NOT NULL DEFAULT 0,
//!   owner_host TEXT,
//!   busy_change_count INTEGER NOT NULL DEFAULT 0,
//!   last_busy_change TEXT,
//!   peer_group TEXT,
//!   status TEXT NOT NULL DEFAULT 'active'
//! );
//! ```
//!
//! Lock and unlock are single conditional `UPDATE`s; the number of affected
//! rows decides the outcome, so several processes can share the file.

use crate::store::{LockStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ms_core::{Address, PeerGroup, Resource, ResourceFilter, ResourceStatus};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::instrument;

/// How long SQLite waits on a locked database file before reporting busy
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_CONNECTIONS: u32 = 4;

// Primary result codes; extended codes carry these in the low byte
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS meters (
  address TEXT PRIMARY KEY NOT NULL,
  busy INTEGER NOT NULL DEFAULT 0,
  owner_host TEXT,
  busy_change_count INTEGER NOT NULL DEFAULT 0,
  last_busy_change TEXT,
  peer_group TEXT,
  status TEXT NOT NULL DEFAULT 'active'
)
"#;

const COLUMNS: &str =
    "address, busy, owner_host, busy_change_count, last_busy_change, peer_group, status";

#[derive(Debug, sqlx::FromRow)]
struct MeterRow {
    address: String,
    busy: bool,
    owner_host: Option<String>,
    busy_change_count: i64,
    last_busy_change: Option<DateTime<Utc>>,
    peer_group: Option<String>,
    status: String,
}

impl TryFrom<MeterRow> for Resource {
    type Error = StoreError;

    fn try_from(row: MeterRow) -> Result<Self, Self::Error> {
        let status = ResourceStatus::from_str(&row.status).map_err(StoreError::Backend)?;
        Ok(Resource {
            address: Address::from(row.address),
            busy: row.busy,
            owner_host: row.owner_host,
            busy_change_count: row.busy_change_count,
            last_busy_change: row.last_busy_change,
            peer_group: row.peer_group.filter(|g| !g.is_empty()).map(PeerGroup::new),
            status,
        })
    }
}

/// Classify a driver error as worth retrying or not
fn store_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) => {
            let code = db.code().and_then(|c| c.parse::<i32>().ok()).unwrap_or(0);
            if matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED) {
                StoreError::Transient(e.to_string())
            } else {
                StoreError::Backend(e.to_string())
            }
        }
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Transient(e.to_string()),
        _ => StoreError::Backend(e.to_string()),
    }
}

#[derive(Clone, Debug)]
pub struct SqliteLockStore {
    pool: SqlitePool,
}

impl SqliteLockStore {
    /// Connect to a database URL such as `sqlite://meters.db`
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Backend(format!("invalid database url {url}: {e}")))?;
        Self::connect_with(options).await
    }

    /// Open (creating if needed) a database file
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        Self::connect_with(SqliteConnectOptions::new().filename(path)).await
    }

    async fn connect_with(options: SqliteConnectOptions) -> Result<Self, StoreError> {
        let options = options.create_if_missing(true).busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(store_error)?;
        Ok(Self { pool })
    }

    /// Create the `meters` table if it does not exist
    pub async fn create_schema(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    /// Add a meter row. Operator tooling only; scheduling never creates rows.
    #[instrument(skip(self, resource), fields(address = %resource.address))]
    pub async fn insert_resource(&self, resource: &Resource) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO meters (address, busy, owner_host, busy_change_count, last_busy_change, peer_group, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(resource.address.as_str())
        .bind(resource.busy)
        .bind(resource.owner_host.as_deref())
        .bind(resource.busy_change_count)
        .bind(resource.last_busy_change)
        .bind(resource.peer_group.as_ref().map(|g| g.0.as_str()))
        .bind(resource.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    /// Move a meter in or out of the candidate pool
    #[instrument(skip(self))]
    pub async fn set_status(
        &self,
        address: &Address,
        status: ResourceStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE meters SET status = ?2 WHERE address = ?1")
            .bind(address.as_str())
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::UnknownResource(address.clone()));
        }
        Ok(())
    }

    /// Clear the busy flag regardless of who set it. Returns whether it was set.
    #[instrument(skip(self))]
    pub async fn force_unlock(&self, address: &Address) -> Result<bool, StoreError> {
        match self.unlock(address).await {
            Ok(()) => Ok(true),
            Err(StoreError::NotLocked(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Every row, ordered by address
    pub async fn dump(&self) -> Result<Vec<Resource>, StoreError> {
        let rows = sqlx::query_as::<_, MeterRow>(&format!(
            "SELECT {COLUMNS} FROM meters ORDER BY address"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        rows.into_iter().map(Resource::try_from).collect()
    }

    async fn exists(&self, address: &Address) -> Result<bool, StoreError> {
        let found: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM meters WHERE address = ?1")
            .bind(address.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl LockStore for SqliteLockStore {
    #[instrument(skip(self))]
    async fn try_lock(&self, address: &Address, holder: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE meters
             SET busy = 1, owner_host = ?2, busy_change_count = busy_change_count + 1,
                 last_busy_change = ?3
             WHERE address = ?1 AND busy = 0",
        )
        .bind(address.as_str())
        .bind(holder)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn unlock(&self, address: &Address) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE meters SET busy = 0, owner_host = NULL, last_busy_change = ?2
             WHERE address = ?1 AND busy = 1",
        )
        .bind(address.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        if result.rows_affected() == 1 {
            return Ok(());
        }
        if self.exists(address).await? {
            Err(StoreError::NotLocked(address.clone()))
        } else {
            Err(StoreError::UnknownResource(address.clone()))
        }
    }

    async fn list_resources(&self, filter: &ResourceFilter) -> Result<Vec<Resource>, StoreError> {
        let rows = sqlx::query_as::<_, MeterRow>(&format!(
            "SELECT {COLUMNS} FROM meters WHERE (?1 IS NULL OR status = ?1) ORDER BY address"
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let resource = Resource::try_from(row)?;
            if filter.matches(&resource) {
                out.push(resource);
            }
        }
        Ok(out)
    }

    async fn get(&self, address: &Address) -> Result<Option<Resource>, StoreError> {
        let row = sqlx::query_as::<_, MeterRow>(&format!(
            "SELECT {COLUMNS} FROM meters WHERE address = ?1"
        ))
        .bind(address.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        row.map(Resource::try_from).transpose()
    }
}

#[cfg(test)]
#[path = "sqlite_tests.rs"]
mod tests;
