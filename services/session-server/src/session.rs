//! The per-channel session actor (spec §3, §4).
//!
//! One `Session` owns all authoritative state for a channel: the
//! `SessionState` behind a `tokio::sync::Mutex`, the upstream link, and the
//! version-counter `Notify` that both the broadcaster and the reconciler
//! wake on. Grounded on the teacher's `receiver::control_api::AppState` —
//! a single `Arc<AppState>`-style actor holding locked state plus
//! broadcast/watch channels — generalized from one shared app state to one
//! state per karaoke channel.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kf_protocol::{KfQueueItem, Permissions, QueueSong, Status, UpdateFrame, UpstreamEvent};
use tokio::sync::{watch, Mutex, Notify};
use tracing::{info, warn};

use crate::model::SessionState;
use crate::reconcile::{self, ReconcileAction};
use crate::upstream::UpstreamWriter;
use crate::{persistence, random_queue_id};

/// Per-client bookkeeping of the last version numbers sent, so the
/// broadcaster can omit unchanged fields (spec §4.1).
#[derive(Debug, Default, Clone, Copy)]
pub struct ClientVersions {
    pub status: u64,
    pub queue: u64,
    pub permissions: u64,
}

pub struct Session {
    pub channel: String,
    state: Mutex<SessionState>,
    changed: Notify,
    data_dir: Option<PathBuf>,
    upstream: UpstreamWriter,
    upstream_queue_tx: watch::Sender<Option<Vec<KfQueueItem>>>,
    reconcile_pacing: Duration,
}

impl Session {
    pub fn new(
        channel: String,
        data_dir: Option<PathBuf>,
        upstream: UpstreamWriter,
        reconcile_pacing: Duration,
    ) -> (Arc<Self>, watch::Receiver<Option<Vec<KfQueueItem>>>) {
        let (tx, rx) = watch::channel(None);
        let session = Arc::new(Self {
            channel,
            state: Mutex::new(SessionState::default()),
            changed: Notify::new(),
            data_dir,
            upstream,
            upstream_queue_tx: tx,
            reconcile_pacing,
        });
        (session, rx)
    }

    /// Load any persisted queue for this channel before serving clients.
    pub async fn load_persisted(&self) {
        let Some(dir) = &self.data_dir else { return };
        match persistence::load_queue(dir, &self.channel) {
            Ok(loaded) => {
                let mut state = self.state.lock().await;
                state.seed_queue(loaded);
            }
            Err(e) => {
                warn!(channel = %self.channel, error = %e, "failed to load persisted queue, starting empty");
            }
        }
    }

    fn wake(&self) {
        self.changed.notify_waiters();
    }

    async fn persist_locked(&self, queue: &[QueueSong]) {
        let Some(dir) = &self.data_dir else { return };
        if let Err(e) = persistence::save_queue(dir, &self.channel, queue) {
            warn!(channel = %self.channel, error = %e, "failed to persist queue");
        }
    }

    // -- client command surface (spec §4.5) ---------------------------------

    pub async fn enqueue(&self, song_id: u64, username: &str, min_singers: u32) -> u64 {
        let mut state = self.state.lock().await;
        let id = state.enqueue(song_id, username, min_singers);
        self.persist_locked(state.queue_slice()).await;
        drop(state);
        self.wake();
        id
    }

    pub async fn upvote(&self, my_queue_id: u64, username: &str) -> bool {
        let mut state = self.state.lock().await;
        let ok = state.upvote(my_queue_id, username);
        if ok {
            self.persist_locked(state.queue_slice()).await;
        }
        drop(state);
        if ok {
            self.wake();
        }
        ok
    }

    pub async fn remove(&self, my_queue_id: u64) -> bool {
        let mut state = self.state.lock().await;
        let ok = state.remove(my_queue_id);
        if ok {
            self.persist_locked(state.queue_slice()).await;
        }
        drop(state);
        if ok {
            self.wake();
        }
        ok
    }

    pub async fn move_up_down(&self, my_queue_id: u64, up: bool) {
        let mut state = self.state.lock().await;
        state.move_up_down(my_queue_id, up);
        self.persist_locked(state.queue_slice()).await;
        drop(state);
        self.wake();
    }

    /// Forward a playback command straight to upstream (spec §4.5's
    /// play/pause/next/set-volume/change-key/change-tempo verbs, which have
    /// no local state of their own to update).
    pub async fn send_upstream(&self, method: &kf_protocol::UpstreamMethod) {
        if let Err(e) = self.upstream.send_command(method).await {
            warn!(channel = %self.channel, error = %e, "failed to forward command upstream");
        }
    }

    // -- upstream event surface (spec §4.3, §4.4) ----------------------------

    /// Apply one decoded upstream event: status/permissions updates are
    /// folded straight into state; queue snapshots feed the reconciler
    /// (via the watch channel) and, on the very first one, adopt the
    /// upstream's existing queue if this session started empty.
    pub async fn apply_upstream_event(&self, event: UpstreamEvent) {
        match event {
            UpstreamEvent::StatusEvent { payload } => {
                let status = Status::from(payload.status);
                let mut state = self.state.lock().await;
                state.apply_status(status);
                drop(state);
                self.wake();
            }
            UpstreamEvent::PermissionsUpdateEvent { payload } => {
                let permissions: Permissions = payload.permissions;
                let mut state = self.state.lock().await;
                state.apply_permissions(permissions);
                drop(state);
                self.wake();
            }
            UpstreamEvent::QueueEvent { payload } => {
                let items = payload.queue.items;
                {
                    let mut state = self.state.lock().await;
                    if state.queue.is_none() {
                        let adopted = reconcile::adopt(&items);
                        state.adopt(adopted);
                        self.persist_locked(state.queue_slice()).await;
                    }
                }
                self.wake();
                let _ = self.upstream_queue_tx.send(Some(items));
            }
        }
    }

    /// Run the upstream listener to completion. Returns once the upstream
    /// connection is lost, latching `session_error` so subsequent `/ws`
    /// hellos for this channel are rejected (spec §7 class 1).
    pub async fn run_listener(self: Arc<Self>, mut reader: crate::upstream::UpstreamReader) {
        loop {
            match reader.recv_event().await {
                Ok(event) => self.apply_upstream_event(event).await,
                Err(e) => {
                    warn!(channel = %self.channel, error = %e, "upstream connection lost");
                    let mut state = self.state.lock().await;
                    state.session_error = Some(format!("upstream disconnected: {e}"));
                    drop(state);
                    self.wake();
                    return;
                }
            }
        }
    }

    pub async fn session_error(&self) -> Option<String> {
        self.state.lock().await.session_error.clone()
    }

    /// Latch a permanent `SessionError` (spec §7 class 1) — used when the
    /// registry could never dial upstream for this channel in the first
    /// place, so the session is created in an already-degraded state
    /// instead of failing to register at all.
    pub async fn latch_session_error(&self, error: String) {
        let mut state = self.state.lock().await;
        state.session_error = Some(error);
    }

    /// Run the reconciler to completion (never returns under normal
    /// operation). Reacts to a new observed upstream snapshot or a local
    /// queue mutation, whichever comes first, then makes at most one
    /// upstream-converging move before waiting again (spec §4.4).
    pub async fn run_reconciler(self: Arc<Self>, mut upstream_rx: watch::Receiver<Option<Vec<KfQueueItem>>>) {
        loop {
            let woken = self.changed.notified();
            tokio::select! {
                _ = upstream_rx.changed() => {}
                _ = woken => {}
            }
            let Some(items) = upstream_rx.borrow_and_update().clone() else {
                continue;
            };
            self.reconcile_once(&items).await;
        }
    }

    async fn reconcile_once(&self, upstream_items: &[KfQueueItem]) {
        let (action, queue) = {
            let mut state = self.state.lock().await;
            let local = state.queue.get_or_insert_with(Vec::new);
            let action = reconcile::reconcile(local, upstream_items);
            if !matches!(action, ReconcileAction::Settled) {
                state.queue_version += 1;
            }
            (action, state.queue_slice().to_vec())
        };
        let method = match action {
            ReconcileAction::Settled => return,
            ReconcileAction::Mutated => {
                self.persist_locked(&queue).await;
                self.wake();
                return;
            }
            ReconcileAction::Command(method) => method,
        };
        self.persist_locked(&queue).await;
        self.wake();
        if let Err(e) = self.upstream.send_command(&method).await {
            warn!(channel = %self.channel, error = %e, "failed to send reconcile command upstream");
            return;
        }
        tokio::time::sleep(self.reconcile_pacing).await;
    }

    // -- broadcaster support (spec §4.1) -------------------------------------

    /// Build the delta frame for a client last caught up to `seen`,
    /// updating `seen` in place. Returns `None` if nothing changed.
    pub async fn frame_since(&self, seen: &mut ClientVersions) -> Option<UpdateFrame> {
        let state = self.state.lock().await;
        let mut frame = UpdateFrame::default();
        let mut changed = false;
        if state.status_version != seen.status {
            frame.status = Some(state.status.clone());
            seen.status = state.status_version;
            changed = true;
        }
        if state.queue_version != seen.queue {
            frame.queue = Some(state.queue_slice().to_vec());
            seen.queue = state.queue_version;
            changed = true;
        }
        if state.permissions_version != seen.permissions {
            frame.permissions = Some(state.permissions.clone());
            seen.permissions = state.permissions_version;
            changed = true;
        }
        changed.then_some(frame)
    }

    pub fn notified(&self) -> tokio::sync::futures::Notified<'_> {
        self.changed.notified()
    }

    pub async fn new_queue_id(&self) -> u64 {
        random_queue_id()
    }
}
