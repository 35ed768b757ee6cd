// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Policy persistence: the settings key/value store and per-host
//! threshold overrides.

use sqlx::Row;

use super::{now_local, Store};
use crate::config::HubConfig;
use crate::model::{settings, PerHostPolicy};

impl Store {
    /// Seed settings rows that do not exist yet. The table stays the source
    /// of truth after first boot; operator edits survive restarts.
    pub(crate) async fn seed_settings(&self, config: &HubConfig) -> Result<(), sqlx::Error> {
        let global_threshold = config.global_threshold.unwrap_or(config.threshold);
        let defaults: &[(&str, String)] = &[
            (settings::THRESHOLD, config.threshold.to_string()),
            (settings::TIME_WINDOW, config.time_window.to_string()),
            (settings::BLOCK_DURATION, config.block_duration.to_string()),
            (settings::ENABLE_AUTO_BLOCK, config.enable_auto_block.to_string()),
            (settings::GLOBAL_THRESHOLD, global_threshold.to_string()),
            (settings::ENABLE_GLOBAL_AUTO_BLOCK, config.enable_global_auto_block.to_string()),
        ];
        for (key, value) in defaults {
            sqlx::query(
                "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
                 ON CONFLICT(key) DO NOTHING",
            )
            .bind(*key)
            .bind(value.as_str())
            .bind(now_local())
            .execute(self.pool())
            .await?;
        }
        Ok(())
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool())
            .await
    }

    pub async fn setting_i64(&self, key: &str, fallback: i64) -> Result<i64, sqlx::Error> {
        Ok(self
            .get_setting(key)
            .await?
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(fallback))
    }

    pub async fn setting_bool(&self, key: &str, fallback: bool) -> Result<bool, sqlx::Error> {
        Ok(self
            .get_setting(key)
            .await?
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"))
            .unwrap_or(fallback))
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                            updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(now_local())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn per_host_policy(
        &self,
        host_id: &str,
    ) -> Result<Option<PerHostPolicy>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT host_id, threshold, window_seconds, block_duration_seconds, auto_block_enabled
             FROM per_host_policies WHERE host_id = ?",
        )
        .bind(host_id)
        .fetch_optional(self.pool())
        .await?;
        row.map(|r| {
            Ok(PerHostPolicy {
                host_id: r.try_get("host_id")?,
                threshold: r.try_get("threshold")?,
                window_seconds: r.try_get("window_seconds")?,
                block_duration_seconds: r.try_get("block_duration_seconds")?,
                auto_block_enabled: r.try_get("auto_block_enabled")?,
            })
        })
        .transpose()
    }

    pub async fn upsert_per_host_policy(
        &self,
        policy: &PerHostPolicy,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO per_host_policies
                 (host_id, threshold, window_seconds, block_duration_seconds, auto_block_enabled)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(host_id) DO UPDATE SET
                 threshold = excluded.threshold,
                 window_seconds = excluded.window_seconds,
                 block_duration_seconds = excluded.block_duration_seconds,
                 auto_block_enabled = excluded.auto_block_enabled",
        )
        .bind(&policy.host_id)
        .bind(policy.threshold)
        .bind(policy.window_seconds)
        .bind(policy.block_duration_seconds)
        .bind(policy.auto_block_enabled)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
