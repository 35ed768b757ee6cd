// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the vigilhub collector.
///
/// The environment variable names are contractual: deployments configure the
/// hub through `DB_DSN`, `API_PORT` and the policy keys below.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "vigilhub", version, about)]
pub struct HubConfig {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "API_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 3000, env = "API_PORT")]
    pub port: u16,

    /// Database DSN. `sqlite::memory:` gives an ephemeral database.
    #[arg(long, default_value = "sqlite://vigilhub.db", env = "DB_DSN")]
    pub db_dsn: String,

    /// Base path for the HTTP API.
    #[arg(long, default_value = "/api/v1", env = "API_BASE_PATH")]
    pub base_path: String,

    /// Failed-login count that triggers a block.
    #[arg(long, default_value_t = 5, env = "THRESHOLD")]
    pub threshold: i64,

    /// Rolling-window length in minutes.
    #[arg(long, default_value_t = 5, env = "TIME_WINDOW")]
    pub time_window: i64,

    /// Default auto-block lifetime in minutes.
    #[arg(long, default_value_t = 60, env = "BLOCK_DURATION")]
    pub block_duration: i64,

    /// Master switch for per-host auto-blocking.
    #[arg(long, default_value_t = true, env = "ENABLE_AUTO_BLOCK", action = clap::ArgAction::Set)]
    pub enable_auto_block: bool,

    /// Threshold for global (cross-host) blocks. Falls back to `THRESHOLD`.
    #[arg(long, env = "GLOBAL_THRESHOLD")]
    pub global_threshold: Option<i64>,

    /// Master switch for global-scope blocks.
    #[arg(long, default_value_t = true, env = "ENABLE_GLOBAL_AUTO_BLOCK", action = clap::ArgAction::Set)]
    pub enable_global_auto_block: bool,

    /// Block-expiry reconciler interval in seconds (at most 60).
    #[arg(long, default_value_t = 30, env = "RECONCILER_INTERVAL_SECS")]
    pub reconciler_interval_secs: u64,
}

impl HubConfig {
    pub fn reconciler_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.reconciler_interval_secs.clamp(1, 60))
    }
}
