// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI command implementations

pub mod db;
pub mod held;
pub mod meters;
pub mod proxy;

use ms_storage::SqliteLockStore;

use crate::error::MsError;

/// The `--db`/`MS_DB` URL, or a friendly error
pub(crate) fn require_db(db: Option<&str>) -> Result<&str, MsError> {
    db.filter(|url| !url.is_empty()).ok_or_else(MsError::no_database)
}

pub(crate) async fn open_store(db: Option<&str>) -> Result<(SqliteLockStore, String), MsError> {
    let url = require_db(db)?;
    tracing::debug!(url, "opening lock table");
    let store = SqliteLockStore::connect(url)
        .await
        .map_err(|e| MsError::store(url, e))?;
    Ok((store, url.to_string()))
}
