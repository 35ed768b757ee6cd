// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pluggable firewall adapter.
//!
//! The actual OS rule commands live outside this service; the hub only
//! drives the adapter interface. Both operations are idempotent: applying
//! an existing rule or removing a missing one succeeds.

use async_trait::async_trait;
use std::fmt;

use crate::model::BlockScope;

/// Adapter failure classes. Transient failures are retried on the next
/// reconciler pass; permanent ones are logged and left to an operator.
#[derive(Debug, Clone)]
pub enum FirewallError {
    Transient(String),
    Permanent(String),
}

impl fmt::Display for FirewallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient(m) => write!(f, "transient: {m}"),
            Self::Permanent(m) => write!(f, "permanent: {m}"),
        }
    }
}

impl std::error::Error for FirewallError {}

#[async_trait]
pub trait FirewallAdapter: Send + Sync {
    async fn apply(
        &self,
        ip: &str,
        scope: BlockScope,
        target_host_id: Option<&str>,
    ) -> Result<(), FirewallError>;

    async fn remove(
        &self,
        ip: &str,
        scope: BlockScope,
        target_host_id: Option<&str>,
    ) -> Result<(), FirewallError>;
}

/// Default adapter: records the decision in the log and reports success.
/// Deployments wire a real rule-pushing adapter here.
#[derive(Debug, Default)]
pub struct LogFirewall;

#[async_trait]
impl FirewallAdapter for LogFirewall {
    async fn apply(
        &self,
        ip: &str,
        scope: BlockScope,
        target_host_id: Option<&str>,
    ) -> Result<(), FirewallError> {
        tracing::info!(ip = %ip, scope = scope.as_str(), host = ?target_host_id, "firewall apply");
        Ok(())
    }

    async fn remove(
        &self,
        ip: &str,
        scope: BlockScope,
        target_host_id: Option<&str>,
    ) -> Result<(), FirewallError> {
        tracing::info!(ip = %ip, scope = scope.as_str(), host = ?target_host_id, "firewall remove");
        Ok(())
    }
}

/// Recording adapter for tests.
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum FirewallCall {
        Apply { ip: String, scope: BlockScope, target_host_id: Option<String> },
        Remove { ip: String, scope: BlockScope, target_host_id: Option<String> },
    }

    /// Records every call; optionally fails each `apply` with a transient
    /// error until told otherwise.
    #[derive(Debug, Default)]
    pub struct MockFirewall {
        calls: Mutex<Vec<FirewallCall>>,
        fail_applies: Mutex<bool>,
    }

    impl MockFirewall {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<FirewallCall> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        pub fn apply_count(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, FirewallCall::Apply { .. }))
                .count()
        }

        pub fn remove_count(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, FirewallCall::Remove { .. }))
                .count()
        }

        pub fn set_fail_applies(&self, fail: bool) {
            if let Ok(mut f) = self.fail_applies.lock() {
                *f = fail;
            }
        }
    }

    #[async_trait]
    impl FirewallAdapter for MockFirewall {
        async fn apply(
            &self,
            ip: &str,
            scope: BlockScope,
            target_host_id: Option<&str>,
        ) -> Result<(), FirewallError> {
            if self.fail_applies.lock().map(|f| *f).unwrap_or(false) {
                return Err(FirewallError::Transient("injected failure".to_owned()));
            }
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(FirewallCall::Apply {
                    ip: ip.to_owned(),
                    scope,
                    target_host_id: target_host_id.map(str::to_owned),
                });
            }
            Ok(())
        }

        async fn remove(
            &self,
            ip: &str,
            scope: BlockScope,
            target_host_id: Option<&str>,
        ) -> Result<(), FirewallError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(FirewallCall::Remove {
                    ip: ip.to_owned(),
                    scope,
                    target_host_id: target_host_id.map(str::to_owned),
                });
            }
            Ok(())
        }
    }
}
