// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User-friendly error display with context and suggestions.
//!
//! Each error says what went wrong, why it might have happened, and how to
//! fix it.

use std::fmt;
use std::path::Path;

use ms_core::Address;
use ms_daemon::ClientError;
use ms_storage::StoreError;

/// Error with context and recovery suggestions for user-friendly display.
#[derive(Debug)]
pub struct MsError {
    /// What went wrong
    pub message: String,
    /// Why it might have happened
    pub context: Vec<String>,
    /// How to fix it
    pub suggestions: Vec<String>,
    /// Original error if any
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl MsError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: Vec::new(),
            suggestions: Vec::new(),
            source: None,
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for MsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "error: {}", self.message)?;

        let mut context: Vec<String> = self.context.clone();
        if let Some(source) = &self.source {
            context.push(source.to_string());
        }
        if !context.is_empty() {
            writeln!(f)?;
            for ctx in &context {
                writeln!(f, "  -> {}", ctx)?;
            }
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            writeln!(f, "suggestions:")?;
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                writeln!(f, "  {}. {}", i + 1, suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for MsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Common error builders for typical failure scenarios.
impl MsError {
    /// No database URL on the command line or in the environment
    pub fn no_database() -> Self {
        MsError::new("No lock table database given")
            .with_suggestion("Pass one with: ms --db sqlite://meters.db <command>")
            .with_suggestion("Or export MS_DB=sqlite://meters.db")
    }

    /// The lock table could not be opened or queried
    pub fn store(url: &str, source: StoreError) -> Self {
        let err = MsError::new(format!("Lock table '{}' failed", url));
        match source {
            StoreError::UnknownResource(address) => MsError::unknown_meter(&address),
            StoreError::Backend(_) => err
                .with_context("The database may be missing or not initialized")
                .with_suggestion(format!("Create the table with: ms --db {} db init", url))
                .with_source(source),
            other => err.with_source(other),
        }
    }

    /// No row for this address
    pub fn unknown_meter(address: &Address) -> Self {
        MsError::new(format!("Meter '{}' not found", address))
            .with_context("Only rows in the lock table can be scheduled")
            .with_suggestion("List every row: ms meters list --all")
            .with_suggestion(format!("Add it with: ms meters add {}", address))
    }

    /// The proxy socket never accepted a connection
    pub fn proxy_unreachable<E>(socket: &Path, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        MsError::new(format!("Lock proxy at {} is not reachable", socket.display()))
            .with_context("msd may not be running for this database")
            .with_suggestion("Start it with: msd <DATABASE_URL>")
            .with_suggestion("Point at another socket with --socket or MS_LOCK_SOCKET")
            .with_source(source)
    }

    /// The proxy answered but the lock table refused the request
    pub fn proxy(source: ClientError) -> Self {
        match source {
            ClientError::Store(StoreError::UnknownResource(address)) => {
                MsError::unknown_meter(&address)
            }
            ClientError::Store(StoreError::NotLocked(address)) => {
                MsError::new(format!("Meter '{}' is not locked", address))
                    .with_suggestion("Check what the proxy holds: ms proxy held")
            }
            other => MsError::new("Lock proxy request failed").with_source(other),
        }
    }
}
