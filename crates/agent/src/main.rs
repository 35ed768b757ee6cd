// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use vigil::config::AgentConfig;

#[tokio::main]
async fn main() {
    let config = AgentConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let settings = match config.resolve() {
        Ok(settings) => settings,
        Err(e) => {
            error!("fatal: {e:#}");
            std::process::exit(1);
        }
    };

    if let Err(e) = vigil::run(settings).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
