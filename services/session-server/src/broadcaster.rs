//! Per-client writer loop: pushes `UpdateFrame` deltas whenever the
//! session's state changes, until the client disconnects or is cancelled.
//!
//! Grounded on the teacher's reader/writer task split per connection
//! (`receiver::control_api`'s SSE stream is the single-direction analogue);
//! this one uses `Notify` + `CancellationToken` rather than a broadcast
//! channel because each client needs its *own* change-since cursor
//! (`session::ClientVersions`), which a shared broadcast stream can't carry.

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::session::{ClientVersions, Session};

/// Network writes carry a one-minute deadline (spec §4.1, §5) — a wedged
/// client socket must not leak this task forever.
const WRITE_DEADLINE: Duration = Duration::from_secs(60);

/// Drive `sink` for one client until it disconnects or `cancel` fires.
/// Sends an initial frame covering all state the client hasn't seen yet
/// (a fresh `ClientVersions::default()` is "hasn't seen anything"), then
/// one delta frame per wake-up.
pub async fn run(session: Arc<Session>, mut sink: SplitSink<WebSocket, Message>, cancel: CancellationToken) {
    let mut seen = ClientVersions::default();
    loop {
        if let Some(frame) = session.frame_since(&mut seen).await {
            match serde_json::to_string(&frame) {
                Ok(json) => match tokio::time::timeout(WRITE_DEADLINE, sink.send(Message::Text(json.into()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => {
                        debug!(channel = %session.channel, "client write failed, ending broadcaster");
                        return;
                    }
                    Err(_) => {
                        debug!(channel = %session.channel, "client write timed out, ending broadcaster");
                        return;
                    }
                },
                Err(e) => {
                    debug!(channel = %session.channel, error = %e, "failed to serialize update frame");
                }
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = session.notified() => {}
        }
    }
}
