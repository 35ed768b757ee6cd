// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: rendered-event builders and settings.

use std::path::Path;

use crate::config::AgentSettings;

/// Render a security event the way the channel's XML rendering does,
/// with the fields the parser extracts.
pub fn event_xml(ip: &str, username: &str, utc: &str, port: u16) -> String {
    format!(
        "<Event xmlns='http://schemas.microsoft.com/win/2004/08/events/event'>\
         <System>\
         <Provider Name='Microsoft-Windows-Security-Auditing' \
          Guid='{{54849625-5478-4994-a5ba-3e3b0328c30d}}'/>\
         <EventID>4625</EventID>\
         <TimeCreated SystemTime='{utc}'/>\
         <Channel>Security</Channel>\
         <Computer>WEB-01</Computer>\
         </System>\
         <EventData>\
         <Data Name='TargetUserName'>{username}</Data>\
         <Data Name='TargetDomainName'>WEB-01</Data>\
         <Data Name='Status'>0xC000006D</Data>\
         <Data Name='SubStatus'>0xC000006A</Data>\
         <Data Name='LogonType'>3</Data>\
         <Data Name='WorkstationName'>ATTACK-PC</Data>\
         <Data Name='IpAddress'>{ip}</Data>\
         <Data Name='IpPort'>{port}</Data>\
         </EventData>\
         </Event>"
    )
}

/// Settings pointing at `collector_url` with fast polling and state under
/// `state_dir`.
pub fn test_settings(collector_url: &str, state_dir: &Path) -> AgentSettings {
    AgentSettings {
        host_id: "h-test".to_owned(),
        collector_url: collector_url.trim_end_matches('/').to_owned(),
        host_name: "WEB-01".to_owned(),
        poll_interval: std::time::Duration::from_millis(20),
        event_id: 4625,
        state_dir: state_dir.to_owned(),
        read_batch: 10,
    }
}
