// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Block lifecycle persistence.

use chrono::NaiveDateTime;
use sqlx::Row;

use super::{now_local, Store};
use crate::model::{Block, BlockScope};

fn block_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Block, sqlx::Error> {
    let scope: String = row.try_get("scope")?;
    Ok(Block {
        id: row.try_get("id")?,
        source_ip: row.try_get("source_ip")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
        reason: row.try_get("reason")?,
        created_by: row.try_get("created_by")?,
        is_active: row.try_get("is_active")?,
        cleared_at: row.try_get("cleared_at")?,
        cleared_by: row.try_get("cleared_by")?,
        scope: BlockScope::parse(&scope),
        target_host_id: row.try_get("target_host_id")?,
        firewall_applied: row.try_get("firewall_applied")?,
    })
}

impl Store {
    /// Insert an active block and mark the IP's suspicious record blocked.
    /// Runs in its own short transaction, separate from ingestion.
    pub async fn create_block(
        &self,
        source_ip: &str,
        scope: BlockScope,
        target_host_id: Option<&str>,
        reason: &str,
        expires_at: NaiveDateTime,
        created_by: &str,
    ) -> Result<Block, sqlx::Error> {
        let now = now_local();
        let mut tx = self.pool().begin().await?;

        let id: i64 = sqlx::query(
            "INSERT INTO blocks
                 (source_ip, created_at, expires_at, reason, created_by,
                  is_active, scope, target_host_id)
             VALUES (?, ?, ?, ?, ?, 1, ?, ?)
             RETURNING id",
        )
        .bind(source_ip)
        .bind(now)
        .bind(expires_at)
        .bind(reason)
        .bind(created_by)
        .bind(scope.as_str())
        .bind(target_host_id)
        .fetch_one(&mut *tx)
        .await?
        .try_get("id")?;

        sqlx::query("UPDATE suspicious_ips SET status = 'blocked', updated_at = ? WHERE source_ip = ?")
            .bind(now)
            .bind(source_ip)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Block {
            id,
            source_ip: source_ip.to_owned(),
            created_at: now,
            expires_at,
            reason: reason.to_owned(),
            created_by: created_by.to_owned(),
            is_active: true,
            cleared_at: None,
            cleared_by: None,
            scope,
            target_host_id: target_host_id.map(str::to_owned),
            firewall_applied: false,
        })
    }

    /// Record that the firewall adapter confirmed the rule for a block.
    pub async fn mark_firewall_applied(&self, block_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE blocks SET firewall_applied = 1 WHERE id = ?")
            .bind(block_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Active blocks whose firewall rule is still unconfirmed.
    pub async fn unapplied_blocks(&self) -> Result<Vec<Block>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM blocks WHERE is_active = 1 AND firewall_applied = 0",
        )
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(block_from_row).collect()
    }

    /// The active global block for an IP, if any. At most one exists.
    pub async fn active_global_block(
        &self,
        source_ip: &str,
    ) -> Result<Option<Block>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT * FROM blocks
             WHERE source_ip = ? AND is_active = 1 AND scope = 'global'
             ORDER BY id DESC LIMIT 1",
        )
        .bind(source_ip)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(block_from_row).transpose()
    }

    /// The active per-host block for `(ip, host)`, if any.
    pub async fn active_host_block(
        &self,
        source_ip: &str,
        host_id: &str,
    ) -> Result<Option<Block>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT * FROM blocks
             WHERE source_ip = ? AND is_active = 1 AND scope = 'per-host'
               AND target_host_id = ?
             ORDER BY id DESC LIMIT 1",
        )
        .bind(source_ip)
        .bind(host_id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(block_from_row).transpose()
    }

    /// All currently active blocks, newest first.
    pub async fn active_blocks(&self) -> Result<Vec<Block>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM blocks WHERE is_active = 1 ORDER BY created_at DESC")
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(block_from_row).collect()
    }

    pub async fn count_active_blocks(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM blocks WHERE is_active = 1")
            .fetch_one(self.pool())
            .await
    }

    /// Deactivate every active block for an IP (both scopes) and mark the
    /// suspicious record cleared. Returns the rows that were cleared so the
    /// caller can undo the matching firewall rules.
    pub async fn clear_blocks_for_ip(
        &self,
        source_ip: &str,
        cleared_by: &str,
    ) -> Result<Vec<Block>, sqlx::Error> {
        let now = now_local();
        let mut tx = self.pool().begin().await?;

        let rows = sqlx::query("SELECT * FROM blocks WHERE source_ip = ? AND is_active = 1")
            .bind(source_ip)
            .fetch_all(&mut *tx)
            .await?;
        let cleared: Vec<Block> =
            rows.iter().map(block_from_row).collect::<Result<_, _>>()?;
        if cleared.is_empty() {
            return Ok(cleared);
        }

        sqlx::query(
            "UPDATE blocks SET is_active = 0, cleared_at = ?, cleared_by = ?
             WHERE source_ip = ? AND is_active = 1",
        )
        .bind(now)
        .bind(cleared_by)
        .bind(source_ip)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE suspicious_ips SET status = 'cleared', updated_at = ? WHERE source_ip = ?")
            .bind(now)
            .bind(source_ip)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(cleared)
    }

    /// Active blocks whose `expires_at` has passed.
    pub async fn expired_blocks(
        &self,
        now: NaiveDateTime,
    ) -> Result<Vec<Block>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM blocks WHERE is_active = 1 AND expires_at <= ?")
            .bind(now)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(block_from_row).collect()
    }

    /// Retire one expired block. The suspicious record goes back to
    /// `active`: windowed counts decide whether it re-triggers.
    pub async fn expire_block(&self, block_id: i64) -> Result<(), sqlx::Error> {
        let now = now_local();
        let mut tx = self.pool().begin().await?;

        let source_ip: Option<String> = sqlx::query_scalar(
            "UPDATE blocks SET is_active = 0 WHERE id = ? AND is_active = 1 RETURNING source_ip",
        )
        .bind(block_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(ip) = source_ip {
            // Only flip to active when no other block still covers the IP.
            let remaining: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM blocks WHERE source_ip = ? AND is_active = 1",
            )
            .bind(&ip)
            .fetch_one(&mut *tx)
            .await?;
            if remaining == 0 {
                sqlx::query(
                    "UPDATE suspicious_ips SET status = 'active', updated_at = ?
                     WHERE source_ip = ? AND status = 'blocked'",
                )
                .bind(now)
                .bind(&ip)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }
}
