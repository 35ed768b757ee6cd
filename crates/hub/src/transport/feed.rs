// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-sent-events endpoint for the live feed.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::Stream;

use crate::state::HubState;

/// `GET /feed` — stream of `event: new_attack` frames.
///
/// The stream ends when the subscriber lags past its send buffer (slow
/// consumers are dropped rather than blocking the hub) or when the hub
/// shuts down.
pub async fn feed(
    State(s): State<Arc<HubState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = s.feed.subscribe();

    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        match rx.recv().await {
            Ok(frame) => {
                let event = Event::default().event("new_attack").json_data(&frame).ok()?;
                Some((Ok::<_, Infallible>(event), rx))
            }
            // Closed, or lagged: disconnect the subscriber.
            Err(_) => None,
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
