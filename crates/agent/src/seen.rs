// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-side deduplication: SHA-256 fingerprints over the event's
//! natural key, kept in an insertion-ordered bounded set persisted to
//! `<host_id>_seen.json`.
//!
//! Eviction of the oldest fingerprints is safe: the channel itself has
//! bounded retention, so an event old enough to be evicted can no longer
//! reappear through the back-scan.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Maximum fingerprints held before the oldest are evicted.
pub const SEEN_CAP: usize = 50_000;

/// Fingerprint of one event: SHA-256 over the raw UTC system time and the
/// source fields, joined with `|`. Uses the raw UTC string, not the
/// normalized local time, so the identity survives timezone changes.
pub fn fingerprint(raw_utc: &str, ip: &str, username: &str, port: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_utc.as_bytes());
    hasher.update(b"|");
    hasher.update(ip.as_bytes());
    hasher.update(b"|");
    hasher.update(username.as_bytes());
    hasher.update(b"|");
    hasher.update(port.as_bytes());
    hex::encode(hasher.finalize())
}

/// Insertion-ordered set of event fingerprints with bounded capacity.
pub struct SeenSet {
    order: VecDeque<String>,
    members: HashSet<String>,
    cap: usize,
    path: PathBuf,
}

impl SeenSet {
    /// Load from disk. A missing or corrupt file reverts to first-run
    /// behavior; the collector's own dedup covers any replays that causes.
    pub fn load(path: &Path) -> Self {
        Self::load_with_cap(path, SEEN_CAP)
    }

    pub fn load_with_cap(path: &Path, cap: usize) -> Self {
        let order: VecDeque<String> = match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Vec<String>>(&contents) {
                Ok(list) => list.into_iter().collect(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), err = %e, "corrupt seen file, starting fresh");
                    VecDeque::new()
                }
            },
            Err(_) => VecDeque::new(),
        };
        let members = order.iter().cloned().collect();
        let mut seen = Self { order, members, cap: cap.max(1), path: path.to_owned() };
        seen.enforce_cap();
        seen
    }

    pub fn contains(&self, fp: &str) -> bool {
        self.members.contains(fp)
    }

    /// Insert a fingerprint, evicting the oldest beyond capacity.
    /// Returns false if it was already present.
    pub fn insert(&mut self, fp: String) -> bool {
        if !self.members.insert(fp.clone()) {
            return false;
        }
        self.order.push_back(fp);
        self.enforce_cap();
        true
    }

    fn enforce_cap(&mut self) {
        while self.order.len() > self.cap {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Write the set to its backing file, oldest first.
    pub fn persist(&self) -> anyhow::Result<()> {
        let list: Vec<&String> = self.order.iter().collect();
        let contents = serde_json::to_string(&list)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "seen_tests.rs"]
mod tests;
