// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

/// Command line and environment configuration for the vigil agent.
///
/// A JSON config file may supply `host_id`, `collector_url`,
/// `poll_interval` and `event_id`; flags and environment variables win over
/// the file, and unknown file keys are ignored.
#[derive(Debug, Parser)]
#[command(name = "vigil", version, about)]
pub struct AgentConfig {
    /// Path to a JSON config file.
    #[arg(long, env = "VIGIL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Stable identifier for this host, unique per deployment.
    #[arg(long, env = "VIGIL_HOST_ID")]
    pub host_id: Option<String>,

    /// Base URL of the collector, e.g. `http://collector:3000`.
    #[arg(long, env = "VIGIL_COLLECTOR_URL")]
    pub collector_url: Option<String>,

    /// Display name reported with each batch. Defaults to the machine name.
    #[arg(long, env = "VIGIL_HOST_NAME")]
    pub host_name: Option<String>,

    /// Poll interval in seconds.
    #[arg(long, env = "VIGIL_POLL_INTERVAL")]
    pub poll_interval: Option<u64>,

    /// Security-channel event id to capture.
    #[arg(long, env = "VIGIL_EVENT_ID")]
    pub event_id: Option<u32>,

    /// Directory holding the `<host_id>_seen.json` state file.
    #[arg(long, default_value = ".", env = "VIGIL_STATE_DIR")]
    pub state_dir: PathBuf,

    /// Events per bounded read.
    #[arg(long, default_value_t = 100, env = "VIGIL_READ_BATCH")]
    pub read_batch: usize,
}

/// Keys recognized in the JSON config file. Anything else is ignored.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    host_id: Option<String>,
    #[serde(default)]
    collector_url: Option<String>,
    #[serde(default)]
    poll_interval: Option<u64>,
    #[serde(default)]
    event_id: Option<u32>,
}

/// Fully resolved agent settings.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub host_id: String,
    pub collector_url: String,
    pub host_name: String,
    pub poll_interval: std::time::Duration,
    pub event_id: u32,
    pub state_dir: PathBuf,
    pub read_batch: usize,
}

impl AgentConfig {
    /// Merge CLI/env values over the config file and validate the result.
    /// Missing `host_id` or `collector_url` is a fatal startup error.
    pub fn resolve(self) -> anyhow::Result<AgentSettings> {
        let file = match &self.config {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .map_err(|e| anyhow::anyhow!("cannot read config {}: {e}", path.display()))?;
                serde_json::from_str::<FileConfig>(&contents)
                    .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))?
            }
            None => FileConfig::default(),
        };

        let host_id = self
            .host_id
            .or(file.host_id)
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("host_id is required (flag, env, or config file)"))?;
        let collector_url = self
            .collector_url
            .or(file.collector_url)
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!("collector_url is required (flag, env, or config file)")
            })?;
        let poll_interval = self.poll_interval.or(file.poll_interval).unwrap_or(10).max(1);
        let event_id = self.event_id.or(file.event_id).unwrap_or(4625);
        let host_name = self.host_name.unwrap_or_else(machine_name);

        Ok(AgentSettings {
            host_id,
            collector_url: collector_url.trim_end_matches('/').to_owned(),
            host_name,
            poll_interval: std::time::Duration::from_secs(poll_interval),
            event_id,
            state_dir: self.state_dir,
            read_batch: self.read_batch.max(1),
        })
    }
}

fn machine_name() -> String {
    std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "unknown-host".to_owned())
}

impl AgentSettings {
    /// Path of the persisted fingerprint set.
    pub fn seen_path(&self) -> PathBuf {
        self.state_dir.join(format!("{}_seen.json", self.host_id))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
