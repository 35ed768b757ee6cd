// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Security-channel reads via the platform's `wevtutil` query tool.
//!
//! Snapshot queries only: `wevtutil` cannot surface the subscription
//! signal handle, so `wait` always times out and the pipeline runs in its
//! pure-poll fallback mode, capturing everything through the safety-net
//! forward read within one poll interval.

use std::time::Duration;

use async_trait::async_trait;

use super::{EventLogSource, Wake};

/// Channel reader shelling out to `wevtutil qe`.
pub struct WevtutilSource {
    channel: String,
    event_id: u32,
}

impl WevtutilSource {
    pub fn new(event_id: u32) -> Self {
        Self { channel: "Security".to_owned(), event_id }
    }

    async fn query(&self, args: &[String]) -> anyhow::Result<Vec<String>> {
        let output = tokio::process::Command::new("wevtutil")
            .arg("qe")
            .arg(&self.channel)
            .args(args)
            .arg("/f:xml")
            .output()
            .await
            .map_err(|e| anyhow::anyhow!("wevtutil spawn failed: {e}"))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("wevtutil query failed: {}", stderr.trim());
        }
        Ok(split_events(&String::from_utf8_lossy(&output.stdout)))
    }

    fn id_filter(&self) -> String {
        format!("/q:*[System[(EventID={})]]", self.event_id)
    }
}

#[async_trait]
impl EventLogSource for WevtutilSource {
    async fn wait(&mut self, timeout: Duration) -> anyhow::Result<Wake> {
        tokio::time::sleep(timeout).await;
        Ok(Wake::TimedOut)
    }

    async fn next_batch(&mut self, _max: usize) -> anyhow::Result<Vec<String>> {
        // No subscription cursor; the safety-net forward read drains.
        Ok(Vec::new())
    }

    async fn read_reverse(&mut self, offset: usize, max: usize) -> anyhow::Result<Vec<String>> {
        // The tool pages by count only, so re-read from the newest and skip.
        let events = self
            .query(&[self.id_filter(), "/rd:true".to_owned(), format!("/c:{}", offset + max)])
            .await?;
        Ok(events.into_iter().skip(offset).take(max).collect())
    }

    async fn read_since(
        &mut self,
        since: Option<&str>,
        max: usize,
    ) -> anyhow::Result<Vec<String>> {
        match since {
            Some(ts) => {
                let filter = format!(
                    "/q:*[System[(EventID={}) and TimeCreated[@SystemTime>'{}']]]",
                    self.event_id, ts
                );
                self.query(&[filter, format!("/c:{max}")]).await
            }
            None => {
                let mut newest = self
                    .query(&[self.id_filter(), "/rd:true".to_owned(), format!("/c:{max}")])
                    .await?;
                newest.reverse();
                Ok(newest)
            }
        }
    }
}

/// Split concatenated `<Event>…</Event>` renderings into one string each.
pub fn split_events(output: &str) -> Vec<String> {
    let mut events = Vec::new();
    let mut rest = output;
    while let Some(start) = rest.find("<Event") {
        let Some(end) = rest[start..].find("</Event>") else {
            break;
        };
        let end = start + end + "</Event>".len();
        events.push(rest[start..end].to_owned());
        rest = &rest[end..];
    }
    events
}

#[cfg(test)]
#[path = "wevtutil_tests.rs"]
mod tests;
