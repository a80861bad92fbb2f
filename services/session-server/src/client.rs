//! The client-facing `/ws` endpoint (spec §4.1, §7).
//!
//! Grounded on the teacher's axum `Router` + `State<Arc<AppState>>`
//! wiring (`receiver::control_api`), generalized from a single shared
//! `AppState` to per-channel `Session`s looked up through the registry on
//! each new connection's hello frame.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use kf_protocol::{Command, UpstreamMethod};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::broadcaster;
use crate::registry::SessionRegistry;
use crate::session::Session;

pub struct AppState {
    pub registry: SessionRegistry,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// The hello frame is the first text message on the socket: exactly the
/// six-character karafun channel code, nothing else (spec §7's "six-byte
/// hello").
fn parse_hello(msg: &Message) -> Option<String> {
    match msg {
        Message::Text(text) if text.len() == 6 => Some(text.to_string()),
        _ => None,
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();

    let Some(Ok(hello)) = stream.next().await else {
        debug!("client disconnected before sending a hello frame");
        return;
    };
    let Some(channel) = parse_hello(&hello) else {
        debug!("rejecting connection: malformed hello frame");
        return;
    };

    let session = state.registry.get_or_init(&channel).await;

    if let Some(err) = session.session_error().await {
        let _ = send_error(&mut sink, &err).await;
        return;
    }

    let cancel = CancellationToken::new();
    let writer_task = tokio::spawn(broadcaster::run(session.clone(), sink, cancel.clone()));

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => {
                let value: serde_json::Value = match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!(channel, error = %e, "malformed JSON, disconnecting client");
                        break;
                    }
                };
                match Command::parse(&value) {
                    Some(command) => dispatch(&session, command).await,
                    None => debug!(channel, "ignoring unrecognized or malformed command"),
                }
            }
            Message::Close(_) => break,
            _ => continue,
        }
    }

    cancel.cancel();
    let _ = writer_task.await;
}

async fn send_error(
    sink: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    message: &str,
) -> Result<(), axum::Error> {
    let json = serde_json::json!({ "Error": message }).to_string();
    sink.send(Message::Text(json.into())).await
}

async fn dispatch(session: &Arc<Session>, command: Command) {
    match command {
        Command::Enqueue(c) => {
            session.enqueue(c.song_id, &c.username, c.min_singers).await;
        }
        Command::Upvote(c) => {
            session.upvote(c.my_queue_id, &c.username).await;
        }
        Command::Remove(c) => {
            session.remove(c.my_queue_id).await;
        }
        Command::MoveUp(c) => session.move_up_down(c.my_queue_id, true).await,
        Command::MoveDown(c) => session.move_up_down(c.my_queue_id, false).await,
        Command::Play => session.send_upstream(&UpstreamMethod::Play).await,
        Command::Pause => session.send_upstream(&UpstreamMethod::Pause).await,
        Command::Next => session.send_upstream(&UpstreamMethod::Next).await,
        Command::SetVolume(c) => {
            session
                .send_upstream(&UpstreamMethod::TrackVolume { track_id: c.track_id, volume: c.number })
                .await
        }
        Command::ChangeKey(c) => session.send_upstream(&UpstreamMethod::Pitch { pitch: c.number }).await,
        Command::ChangeTempo(c) => session.send_upstream(&UpstreamMethod::Tempo { pitch: c.number }).await,
    }
}
