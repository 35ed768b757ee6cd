// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only statistics projections.

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use sqlx::Row;

use super::Store;
use crate::model::{SuspiciousIp, SuspiciousStatus};

/// One `(username, count)` ranking entry.
#[derive(Debug, Clone, Serialize)]
pub struct UsernameCount {
    pub username: String,
    pub count: i64,
}

/// One `(source_ip, count)` ranking entry.
#[derive(Debug, Clone, Serialize)]
pub struct SourceCount {
    pub source_ip: String,
    pub count: i64,
}

/// Hub-wide aggregates for `GET /statistics`.
#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub total_attempts: i64,
    pub unique_ips: i64,
    pub active_blocks: i64,
    pub attempts_24h: i64,
    pub attempts_1h: i64,
    pub top_usernames: Vec<UsernameCount>,
    /// Hour-of-day buckets (0-23) over the trailing 24 hours.
    pub hourly: Vec<i64>,
}

/// Per-host slice of the global statistics projection.
#[derive(Debug, Clone, Serialize)]
pub struct HostBreakdown {
    pub host_id: String,
    pub host_name: Option<String>,
    pub total_attempts: i64,
    pub attempts_24h: i64,
    pub unique_ips: i64,
}

/// Attack summary for one host.
#[derive(Debug, Clone, Serialize)]
pub struct HostAttacks {
    pub host_id: String,
    pub total_attempts: i64,
    pub unique_attackers: i64,
    pub attempts_24h: i64,
    pub attempts_1h: i64,
    pub top_usernames: Vec<UsernameCount>,
    pub top_sources: Vec<SourceCount>,
}

impl Store {
    /// Suspicious IPs at or above `threshold` lifetime failures, most
    /// active first. Ranks by the lifetime counter on purpose: this is the
    /// dashboard projection, not the block-decision input.
    pub async fn suspicious(&self, threshold: i64) -> Result<Vec<SuspiciousIp>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT source_ip, lifetime_failure_count, first_seen, last_seen, status
             FROM suspicious_ips
             WHERE lifetime_failure_count >= ? AND status = 'active'
             ORDER BY lifetime_failure_count DESC",
        )
        .bind(threshold)
        .fetch_all(self.pool())
        .await?;
        rows.iter()
            .map(|r| {
                let status: String = r.try_get("status")?;
                Ok(SuspiciousIp {
                    source_ip: r.try_get("source_ip")?,
                    lifetime_failure_count: r.try_get("lifetime_failure_count")?,
                    first_seen: r.try_get("first_seen")?,
                    last_seen: r.try_get("last_seen")?,
                    status: SuspiciousStatus::parse(&status),
                })
            })
            .collect()
    }

    pub async fn statistics(&self, now: NaiveDateTime) -> Result<Statistics, sqlx::Error> {
        let day_ago = now - Duration::hours(24);
        let hour_ago = now - Duration::hours(1);

        let total_attempts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM failed_logins")
            .fetch_one(self.pool())
            .await?;
        let unique_ips: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT source_ip) FROM failed_logins")
                .fetch_one(self.pool())
                .await?;
        let active_blocks = self.count_active_blocks().await?;
        let attempts_24h = self.count_since(day_ago).await?;
        let attempts_1h = self.count_since(hour_ago).await?;
        let top_usernames = self.top_usernames(None).await?;
        let hourly = self.hourly_histogram(day_ago).await?;

        Ok(Statistics {
            total_attempts,
            unique_ips,
            active_blocks,
            attempts_24h,
            attempts_1h,
            top_usernames,
            hourly,
        })
    }

    pub async fn host_breakdown(
        &self,
        now: NaiveDateTime,
    ) -> Result<Vec<HostBreakdown>, sqlx::Error> {
        let day_ago = now - Duration::hours(24);
        let rows = sqlx::query(
            "SELECT h.host_id,
                    h.host_name,
                    COUNT(f.id) AS total_attempts,
                    COALESCE(SUM(f.event_timestamp >= ?), 0) AS attempts_24h,
                    COUNT(DISTINCT f.source_ip) AS unique_ips
             FROM hosts h
             LEFT JOIN failed_logins f ON f.host_id = h.host_id
             GROUP BY h.host_id
             ORDER BY total_attempts DESC",
        )
        .bind(day_ago)
        .fetch_all(self.pool())
        .await?;
        rows.iter()
            .map(|r| {
                Ok(HostBreakdown {
                    host_id: r.try_get("host_id")?,
                    host_name: r.try_get("host_name")?,
                    total_attempts: r.try_get("total_attempts")?,
                    attempts_24h: r.try_get("attempts_24h")?,
                    unique_ips: r.try_get("unique_ips")?,
                })
            })
            .collect()
    }

    /// Attack summary for one host. A host with no events yields zeros.
    pub async fn host_attacks(
        &self,
        host_id: &str,
        now: NaiveDateTime,
    ) -> Result<HostAttacks, sqlx::Error> {
        let day_ago = now - Duration::hours(24);
        let hour_ago = now - Duration::hours(1);

        let total_attempts: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM failed_logins WHERE host_id = ?")
                .bind(host_id)
                .fetch_one(self.pool())
                .await?;
        let unique_attackers: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT source_ip) FROM failed_logins WHERE host_id = ?",
        )
        .bind(host_id)
        .fetch_one(self.pool())
        .await?;
        let attempts_24h: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM failed_logins WHERE host_id = ? AND event_timestamp >= ?",
        )
        .bind(host_id)
        .bind(day_ago)
        .fetch_one(self.pool())
        .await?;
        let attempts_1h: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM failed_logins WHERE host_id = ? AND event_timestamp >= ?",
        )
        .bind(host_id)
        .bind(hour_ago)
        .fetch_one(self.pool())
        .await?;
        let top_usernames = self.top_usernames(Some(host_id)).await?;

        let rows = sqlx::query(
            "SELECT source_ip, COUNT(*) AS n FROM failed_logins
             WHERE host_id = ?
             GROUP BY source_ip ORDER BY n DESC LIMIT 10",
        )
        .bind(host_id)
        .fetch_all(self.pool())
        .await?;
        let top_sources = rows
            .iter()
            .map(|r| {
                Ok(SourceCount { source_ip: r.try_get("source_ip")?, count: r.try_get("n")? })
            })
            .collect::<Result<_, sqlx::Error>>()?;

        Ok(HostAttacks {
            host_id: host_id.to_owned(),
            total_attempts,
            unique_attackers,
            attempts_24h,
            attempts_1h,
            top_usernames,
            top_sources,
        })
    }

    async fn count_since(&self, since: NaiveDateTime) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM failed_logins WHERE event_timestamp >= ?")
            .bind(since)
            .fetch_one(self.pool())
            .await
    }

    async fn top_usernames(
        &self,
        host_id: Option<&str>,
    ) -> Result<Vec<UsernameCount>, sqlx::Error> {
        let rows = match host_id {
            Some(id) => {
                sqlx::query(
                    "SELECT target_username AS u, COUNT(*) AS n FROM failed_logins
                     WHERE target_username IS NOT NULL AND host_id = ?
                     GROUP BY u ORDER BY n DESC LIMIT 10",
                )
                .bind(id)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT target_username AS u, COUNT(*) AS n FROM failed_logins
                     WHERE target_username IS NOT NULL
                     GROUP BY u ORDER BY n DESC LIMIT 10",
                )
                .fetch_all(self.pool())
                .await?
            }
        };
        rows.iter()
            .map(|r| Ok(UsernameCount { username: r.try_get("u")?, count: r.try_get("n")? }))
            .collect()
    }

    async fn hourly_histogram(&self, since: NaiveDateTime) -> Result<Vec<i64>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT CAST(strftime('%H', event_timestamp) AS INTEGER) AS hr, COUNT(*) AS n
             FROM failed_logins
             WHERE event_timestamp >= ?
             GROUP BY hr",
        )
        .bind(since)
        .fetch_all(self.pool())
        .await?;
        let mut buckets = vec![0i64; 24];
        for row in &rows {
            let hr: Option<i64> = row.try_get("hr")?;
            let n: i64 = row.try_get("n")?;
            if let Some(hr) = hr.filter(|h| (0..24).contains(h)) {
                buckets[hr as usize] = n;
            }
        }
        Ok(buckets)
    }
}
