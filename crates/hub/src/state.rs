// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::config::HubConfig;
use crate::feed::FeedHub;
use crate::firewall::FirewallAdapter;
use crate::storage::Store;

/// Shared hub state, constructed once at startup and threaded through every
/// handler and background task.
pub struct HubState {
    pub config: HubConfig,
    pub store: Store,
    pub firewall: Arc<dyn FirewallAdapter>,
    pub feed: FeedHub,
    pub shutdown: CancellationToken,
    pub started_at: Instant,
}

impl HubState {
    pub fn new(
        config: HubConfig,
        store: Store,
        firewall: Arc<dyn FirewallAdapter>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            store,
            firewall,
            feed: FeedHub::new(),
            shutdown,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
