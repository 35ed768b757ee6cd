// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed persistence for the hub.
//!
//! One pool, one writer connection. The schema is bootstrapped at connect
//! time; a DSN of `sqlite::memory:` yields an ephemeral database (tests,
//! local runs). Operations are grouped by entity in the submodules.

mod blocks;
mod events;
mod hosts;
mod policy;
mod stats;

pub use events::Admit;
pub use stats::{HostAttacks, HostBreakdown, SourceCount, Statistics, UsernameCount};

use std::str::FromStr;

use chrono::NaiveDateTime;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::config::HubConfig;

/// Handle to the hub database.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS failed_logins (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_ip TEXT NOT NULL,
    target_username TEXT,
    source_host_name TEXT,
    logon_type INTEGER,
    failure_reason TEXT,
    source_port INTEGER,
    event_timestamp TEXT NOT NULL,
    host_id TEXT NOT NULL,
    event_class INTEGER NOT NULL DEFAULT 4625
);
CREATE INDEX IF NOT EXISTS idx_failed_logins_ip_time
    ON failed_logins (source_ip, event_timestamp);
CREATE INDEX IF NOT EXISTS idx_failed_logins_host_time
    ON failed_logins (host_id, event_timestamp);

CREATE TABLE IF NOT EXISTS suspicious_ips (
    source_ip TEXT PRIMARY KEY,
    lifetime_failure_count INTEGER NOT NULL DEFAULT 0,
    first_seen TEXT NOT NULL,
    last_seen TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS hosts (
    host_id TEXT PRIMARY KEY,
    host_name TEXT,
    host_ip TEXT,
    collection_method TEXT NOT NULL DEFAULT 'agent',
    status TEXT NOT NULL DEFAULT 'active',
    last_seen TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS blocks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_ip TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    reason TEXT NOT NULL,
    created_by TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    cleared_at TEXT,
    cleared_by TEXT,
    scope TEXT NOT NULL DEFAULT 'global',
    target_host_id TEXT,
    firewall_applied INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_blocks_active ON blocks (is_active, source_ip);

CREATE TABLE IF NOT EXISTS per_host_policies (
    host_id TEXT PRIMARY KEY,
    threshold INTEGER,
    window_seconds INTEGER,
    block_duration_seconds INTEGER,
    auto_block_enabled INTEGER
);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

impl Store {
    /// Open the database, bootstrap the schema, and seed missing settings
    /// from the startup config.
    pub async fn connect(config: &HubConfig) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(&config.db_dsn)?.create_if_missing(true);
        // Single writer connection: SQLite serializes writes anyway, and a
        // one-connection pool keeps `sqlite::memory:` databases shared.
        let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;

        let store = Self { pool };
        store.init_schema().await?;
        store.seed_settings(config).await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Liveness probe for `/health`.
    pub async fn ping(&self) -> bool {
        sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}

/// The hub's reference clock: local civil time, matching the civil
/// timestamps agents report.
pub fn now_local() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}
