// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host registry operations.

use sqlx::Row;

use super::{now_local, Store};
use crate::model::Host;

fn host_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Host, sqlx::Error> {
    Ok(Host {
        host_id: row.try_get("host_id")?,
        host_name: row.try_get("host_name")?,
        host_ip: row.try_get("host_ip")?,
        collection_method: row.try_get("collection_method")?,
        status: row.try_get("status")?,
        last_seen: row.try_get("last_seen")?,
        created_at: row.try_get("created_at")?,
    })
}

impl Store {
    /// Upsert a host registration.
    pub async fn register_host(
        &self,
        host_id: &str,
        host_name: Option<&str>,
        host_ip: Option<&str>,
        collection_method: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO hosts (host_id, host_name, host_ip, collection_method, status, created_at)
             VALUES (?, ?, ?, ?, 'active', ?)
             ON CONFLICT(host_id) DO UPDATE SET
                 host_name = COALESCE(excluded.host_name, hosts.host_name),
                 host_ip = COALESCE(excluded.host_ip, hosts.host_ip),
                 collection_method = excluded.collection_method,
                 status = 'active'",
        )
        .bind(host_id)
        .bind(host_name)
        .bind(host_ip)
        .bind(collection_method)
        .bind(now_local())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn list_hosts(&self) -> Result<Vec<Host>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM hosts ORDER BY host_id")
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(host_from_row).collect()
    }

    pub async fn host_exists(&self, host_id: &str) -> Result<bool, sqlx::Error> {
        let n: i64 =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM hosts WHERE host_id = ?)")
                .bind(host_id)
                .fetch_one(self.pool())
                .await?;
        Ok(n != 0)
    }

    /// Remove a host. Returns false when the host was unknown.
    pub async fn delete_host(&self, host_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM hosts WHERE host_id = ?")
            .bind(host_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn host_counts(&self) -> Result<(i64, i64), sqlx::Error> {
        let active: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM hosts WHERE status = 'active'")
                .fetch_one(self.pool())
                .await?;
        let inactive: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM hosts WHERE status <> 'active'")
                .fetch_one(self.pool())
                .await?;
        Ok((active, inactive))
    }
}
