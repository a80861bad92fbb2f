//! Upstream karafun WebSocket link: one connection per channel, dialed with
//! an `X-Karafun-Channel` header rather than interpolating the channel into
//! the URL path (spec §6).
//!
//! Grounded on the teacher's `forwarder::uplink::UplinkSession` — connect,
//! then loop `recv`/`send` over a typed message enum — but there is no
//! handshake to perform here: the upstream starts pushing `QueueEvent`,
//! `StatusEvent` and `PermissionsUpdateEvent` frames unprompted.

use futures_util::stream::SplitStream;
use futures_util::{Sink, SinkExt, StreamExt};
use kf_protocol::{OutboundCommandEnvelope, UpstreamEvent, UpstreamMethod};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, warn};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
type BoxedSink = Pin<Box<dyn Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("connect: {0}")]
    Connect(String),
    #[error("websocket: {0}")]
    Ws(String),
    #[error("upstream closed the connection")]
    Disconnected,
}

/// The read half of an upstream connection. Exactly one task should own
/// this — the session's listener loop — since `QueueEvent` ordering must
/// be preserved for the reconciler's sentinel protocol to work.
pub struct UpstreamReader {
    stream: SplitStream<WsStream>,
    writer_for_pong: UpstreamWriter,
}

/// The write half, cheaply cloned and shared between the listener (pong
/// replies) and every caller that wants to issue a command — the client
/// command dispatcher and the reconciler loop alike. The sink is boxed
/// behind `BoxedSink` so a session can be driven in tests without a live
/// socket (see `test_support`).
#[derive(Clone)]
pub struct UpstreamWriter {
    sink: Arc<Mutex<BoxedSink>>,
    next_command_id: Arc<AtomicU64>,
}

/// Dial `base_url`, identifying the channel via the `X-Karafun-Channel`
/// header (spec §6: "the channel travels in a header, not the URL").
pub async fn connect(base_url: &str, channel: &str) -> Result<(UpstreamReader, UpstreamWriter), UpstreamError> {
    let request = build_channel_request(base_url, channel)?;
    let (ws, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| UpstreamError::Connect(e.to_string()))?;
    let (sink, stream) = ws.split();
    let writer = UpstreamWriter {
        sink: Arc::new(Mutex::new(Box::pin(sink))),
        next_command_id: Arc::new(AtomicU64::new(1)),
    };
    let reader = UpstreamReader { stream, writer_for_pong: writer.clone() };
    Ok((reader, writer))
}

impl UpstreamReader {
    /// Block for the next recognized event, silently skipping frames this
    /// crate does not model (spec §4.3: unrecognized message types are
    /// logged and ignored, never fatal).
    pub async fn recv_event(&mut self) -> Result<UpstreamEvent, UpstreamError> {
        loop {
            match self.stream.next().await {
                None => return Err(UpstreamError::Disconnected),
                Some(Err(e)) => return Err(UpstreamError::Ws(e.to_string())),
                Some(Ok(Message::Text(text))) => match serde_json::from_str(&text) {
                    Ok(event) => return Ok(event),
                    Err(e) => {
                        debug!(error = %e, "ignoring unrecognized upstream message");
                        continue;
                    }
                },
                Some(Ok(Message::Close(_))) => return Err(UpstreamError::Disconnected),
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = self.writer_for_pong.send_raw(Message::Pong(data)).await {
                        warn!(error = %e, "failed to answer upstream ping");
                    }
                    continue;
                }
                Some(Ok(_)) => continue,
            }
        }
    }
}

/// A write sink that discards everything sent to it and always reports
/// success. Backs both `UpstreamWriter::disconnected` (a permanently
/// degraded session's placeholder, spec §7 class 1) and the test-only
/// `disconnected_writer` helper.
struct NullSink;

impl Sink<Message> for NullSink {
    type Error = tokio_tungstenite::tungstenite::Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }
    fn start_send(self: Pin<&mut Self>, _item: Message) -> Result<(), Self::Error> {
        Ok(())
    }
    fn poll_flush(self: Pin<&mut Self>, _cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }
    fn poll_close(self: Pin<&mut Self>, _cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }
}

impl UpstreamWriter {
    /// A placeholder writer for a session that never managed to dial
    /// upstream. Its `SessionError` latch means no client command ever
    /// reaches it in practice (spec §3, §7 class 1) — every new attach is
    /// handed the error frame and disconnected before issuing one.
    pub fn disconnected() -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::pin(NullSink))),
            next_command_id: Arc::new(AtomicU64::new(1)),
        }
    }

    async fn send_raw(&self, msg: Message) -> Result<(), UpstreamError> {
        let mut sink = self.sink.lock().await;
        sink.send(msg).await.map_err(|e| UpstreamError::Ws(e.to_string()))
    }

    /// Send one outbound command, assigning it the next monotonically
    /// increasing envelope id.
    pub async fn send_command(&self, method: &UpstreamMethod) -> Result<(), UpstreamError> {
        let id = self.next_command_id.fetch_add(1, Ordering::Relaxed);
        let envelope = OutboundCommandEnvelope::new(id, method);
        let json = serde_json::to_string(&envelope).map_err(|e| UpstreamError::Ws(e.to_string()))?;
        self.send_raw(Message::Text(json.into())).await
    }
}

fn build_channel_request(
    url: &str,
    channel: &str,
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, UpstreamError> {
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;

    let mut request = url
        .into_client_request()
        .map_err(|e| UpstreamError::Connect(format!("invalid URL '{url}': {e}")))?;
    request.headers_mut().insert(
        "X-Karafun-Channel",
        channel.parse().map_err(
            |e: tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue| {
                UpstreamError::Connect(format!("invalid channel header: {e}"))
            },
        )?,
    );
    Ok(request)
}

/// Test-only access to `UpstreamWriter::disconnected`, so `Session` can be
/// exercised without a live socket.
#[cfg(test)]
pub mod test_support {
    use super::UpstreamWriter;

    pub fn disconnected_writer() -> UpstreamWriter {
        UpstreamWriter::disconnected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_request_carries_header() {
        let req = build_channel_request("ws://localhost:8067/", "ABCDEF").unwrap();
        assert_eq!(req.headers().get("X-Karafun-Channel").unwrap(), "ABCDEF");
    }

    #[test]
    fn invalid_url_is_rejected() {
        assert!(build_channel_request("not a url", "ABCDEF").is_err());
    }
}
