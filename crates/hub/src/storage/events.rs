// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idempotent event persistence and rolling-window counts.

use chrono::NaiveDateTime;
use sqlx::Row;

use super::{now_local, Store};
use crate::model::FailedLogin;

/// Outcome of persisting one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admit {
    /// Row inserted; carries the post-insert lifetime counter for the IP.
    Inserted { attempt_number: i64 },
    /// Natural-key duplicate; nothing written.
    Duplicate,
}

impl Store {
    /// Persist one failed login idempotently.
    ///
    /// The natural key is `(source_ip, target_username, source_port,
    /// event_timestamp, host_id)`. On a fresh row this performs, in one
    /// transaction: insert the event, bump the suspicious-IP lifetime
    /// counter, and touch the host registry (creating the host on first
    /// contact).
    pub async fn insert_event(
        &self,
        ev: &FailedLogin,
        host_name: Option<&str>,
    ) -> Result<Admit, sqlx::Error> {
        let mut tx = self.pool().begin().await?;

        // `IS` instead of `=` so NULL username/port compare as equal.
        let exists = sqlx::query_scalar::<_, i64>(
            "SELECT EXISTS (
                 SELECT 1 FROM failed_logins
                 WHERE source_ip = ?
                   AND target_username IS ?
                   AND source_port IS ?
                   AND event_timestamp = ?
                   AND host_id = ?
             )",
        )
        .bind(&ev.source_ip)
        .bind(&ev.target_username)
        .bind(ev.source_port)
        .bind(ev.event_timestamp)
        .bind(&ev.host_id)
        .fetch_one(&mut *tx)
        .await?;
        if exists != 0 {
            return Ok(Admit::Duplicate);
        }

        sqlx::query(
            "INSERT INTO failed_logins
                 (source_ip, target_username, source_host_name, logon_type,
                  failure_reason, source_port, event_timestamp, host_id, event_class)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&ev.source_ip)
        .bind(&ev.target_username)
        .bind(&ev.source_host_name)
        .bind(ev.logon_type)
        .bind(&ev.failure_reason)
        .bind(ev.source_port)
        .bind(ev.event_timestamp)
        .bind(&ev.host_id)
        .bind(ev.event_class)
        .execute(&mut *tx)
        .await?;

        let now = now_local();
        let attempt_number = sqlx::query(
            "INSERT INTO suspicious_ips
                 (source_ip, lifetime_failure_count, first_seen, last_seen,
                  status, created_at, updated_at)
             VALUES (?, 1, ?, ?, 'active', ?, ?)
             ON CONFLICT(source_ip) DO UPDATE SET
                 lifetime_failure_count = lifetime_failure_count + 1,
                 last_seen = MAX(suspicious_ips.last_seen, excluded.last_seen),
                 status = CASE WHEN suspicious_ips.status = 'blocked'
                               THEN 'blocked' ELSE 'active' END,
                 updated_at = excluded.updated_at
             RETURNING lifetime_failure_count",
        )
        .bind(&ev.source_ip)
        .bind(ev.event_timestamp)
        .bind(ev.event_timestamp)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?
        .try_get::<i64, _>("lifetime_failure_count")?;

        sqlx::query(
            "INSERT INTO hosts (host_id, host_name, collection_method, status, last_seen, created_at)
             VALUES (?, ?, 'agent', 'active', ?, ?)
             ON CONFLICT(host_id) DO UPDATE SET
                 host_name = COALESCE(excluded.host_name, hosts.host_name),
                 status = 'active',
                 last_seen = excluded.last_seen",
        )
        .bind(&ev.host_id)
        .bind(host_name)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Admit::Inserted { attempt_number })
    }

    /// Failed logins from `source_ip` across all hosts in `[since, until]`,
    /// inclusive at both ends. The upper bound keeps future-dated rows
    /// (agent clock skew, forged timestamps) from counting forever.
    pub async fn count_ip_window(
        &self,
        source_ip: &str,
        since: NaiveDateTime,
        until: NaiveDateTime,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM failed_logins
             WHERE source_ip = ? AND event_timestamp >= ? AND event_timestamp <= ?",
        )
        .bind(source_ip)
        .bind(since)
        .bind(until)
        .fetch_one(self.pool())
        .await
    }

    /// Failed logins from `source_ip` against one host in `[since, until]`,
    /// inclusive at both ends.
    pub async fn count_ip_host_window(
        &self,
        source_ip: &str,
        host_id: &str,
        since: NaiveDateTime,
        until: NaiveDateTime,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM failed_logins
             WHERE source_ip = ? AND host_id = ?
               AND event_timestamp >= ? AND event_timestamp <= ?",
        )
        .bind(source_ip)
        .bind(host_id)
        .bind(since)
        .bind(until)
        .fetch_one(self.pool())
        .await
    }
}
