//! The per-session authoritative state (spec §3): `Status`, `Queue`,
//! `Permissions`, their version counters, and the mutation operations
//! that keep the queue's order a fixed point of the fair reorder.
//!
//! This module is deliberately lock-free — `session::Session` is the only
//! thing that ever holds a `SessionState` behind a mutex. Keeping the
//! data/logic split this way (mirroring `reorder.rs`) makes every
//! invariant here testable without spinning up tokio.

use crate::reorder::{determine_moveability, fair_reorder, move_up_down};
use kf_protocol::{Permissions, QueueSong, Status, ADOPTED_SINGER};

/// The three versioned fields plus the permanent error latch (spec §3's
/// `Session`). `queue: None` means "no persisted or adopted state yet" —
/// distinct from `Some(vec![])`, an empty-but-initialized queue (spec
/// §4.4's adoption gate keys off exactly this distinction).
#[derive(Debug, Default)]
pub struct SessionState {
    pub status: Status,
    pub status_version: u64,
    pub queue: Option<Vec<QueueSong>>,
    pub queue_version: u64,
    pub permissions: Permissions,
    pub permissions_version: u64,
    pub session_error: Option<String>,
}

impl SessionState {
    pub fn queue_slice(&self) -> &[QueueSong] {
        self.queue.as_deref().unwrap_or(&[])
    }

    fn reorder_in_place(&mut self) {
        if let Some(queue) = &mut self.queue {
            let mut next = fair_reorder(queue);
            determine_moveability(&mut next);
            *queue = next;
        }
    }

    fn bump_queue(&mut self) {
        self.reorder_in_place();
        self.queue_version += 1;
    }

    /// Load persisted or fresh state. `loaded` is `Some(queue)` when a
    /// persistence file existed, `None` when the session starts fresh
    /// (eligible for upstream adoption).
    pub fn seed_queue(&mut self, loaded: Option<Vec<QueueSong>>) {
        if let Some(mut queue) = loaded {
            determine_moveability(&mut queue);
            self.queue = Some(queue);
        }
    }

    /// spec §4.5 `enqueue`: append a new gated-or-open entry.
    pub fn enqueue(&mut self, song_id: u64, username: &str, min_singers: u32) -> u64 {
        let my_queue_id = crate::random_queue_id();
        let entry = QueueSong {
            artist: String::new(),
            song: String::new(),
            singers: vec![username.to_owned()],
            min_singers,
            song_id,
            my_queue_id,
            can_move_up: false,
            can_move_down: false,
            has_been_queued: false,
        };
        self.queue.get_or_insert_with(Vec::new).push(entry);
        self.bump_queue();
        my_queue_id
    }

    /// spec §4.5 `upvote`: add `username` to the entry's singer set. If an
    /// `"adopted"` sentinel slot is present, it is overwritten rather than
    /// appended to (spec glossary: "Adopted entry").
    pub fn upvote(&mut self, my_queue_id: u64, username: &str) -> bool {
        let Some(queue) = &mut self.queue else {
            return false;
        };
        let Some(entry) = queue.iter_mut().find(|e| e.my_queue_id == my_queue_id) else {
            return false;
        };
        if entry.singers.iter().any(|s| s == username) {
            self.bump_queue();
            return true;
        }
        if let Some(slot) = entry.singers.iter_mut().find(|s| s.as_str() == ADOPTED_SINGER) {
            *slot = username.to_owned();
        } else {
            entry.singers.push(username.to_owned());
        }
        self.bump_queue();
        true
    }

    /// spec §4.5 `remove`.
    pub fn remove(&mut self, my_queue_id: u64) -> bool {
        let Some(queue) = &mut self.queue else {
            return false;
        };
        let before = queue.len();
        queue.retain(|e| e.my_queue_id != my_queue_id);
        let removed = queue.len() != before;
        if removed {
            self.bump_queue();
        }
        removed
    }

    /// spec §4.2 `moveUpDown`.
    pub fn move_up_down(&mut self, my_queue_id: u64, up: bool) {
        let Some(queue) = &mut self.queue else {
            return;
        };
        move_up_down(queue, my_queue_id, up);
        self.bump_queue();
    }

    /// spec §4.4 adoption: install entries synthesized from the first
    /// observed upstream queue (see `reconcile::adopt`), only when the
    /// local queue has never been initialized.
    pub fn adopt(&mut self, entries: Vec<QueueSong>) {
        if self.queue.is_some() {
            return;
        }
        self.queue = Some(entries);
        self.bump_queue();
    }

    pub fn apply_status(&mut self, status: Status) {
        self.status = status;
        self.status_version += 1;
    }

    pub fn apply_permissions(&mut self, permissions: Permissions) {
        self.permissions = permissions;
        self.permissions_version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_initializes_null_queue() {
        let mut s = SessionState::default();
        assert!(s.queue.is_none());
        s.enqueue(1, "ana", 0);
        assert_eq!(s.queue_version, 1);
        assert_eq!(s.queue_slice().len(), 1);
    }

    #[test]
    fn enqueue_then_remove_returns_to_prior_state() {
        let mut s = SessionState::default();
        s.enqueue(1, "ana", 0);
        let before = s.queue_slice().to_vec();
        let before_version = s.queue_version;
        let id = s.queue_slice()[0].my_queue_id;
        s.enqueue(2, "ana", 0);
        s.remove(id);
        // Same singer, so reorder is stable; content matches minus version bump.
        assert_eq!(s.queue_slice().len(), before.len());
        assert!(s.queue_version > before_version);
    }

    fn adopted_song(my_queue_id: u64) -> QueueSong {
        QueueSong {
            artist: "A".into(),
            song: "B".into(),
            singers: vec![ADOPTED_SINGER.to_owned()],
            min_singers: 0,
            song_id: 5,
            my_queue_id,
            can_move_up: false,
            can_move_down: false,
            has_been_queued: true,
        }
    }

    #[test]
    fn upvote_overwrites_adopted_slot() {
        let mut s = SessionState::default();
        s.adopt(vec![adopted_song(1)]);
        let id = s.queue_slice()[0].my_queue_id;
        s.upvote(id, "bo");
        assert_eq!(s.queue_slice()[0].singers, vec!["bo".to_string()]);
    }

    #[test]
    fn upvote_appends_when_no_adopted_slot() {
        let mut s = SessionState::default();
        s.enqueue(1, "ana", 0);
        let id = s.queue_slice()[0].my_queue_id;
        s.upvote(id, "bo");
        assert_eq!(s.queue_slice()[0].singers, vec!["ana".to_string(), "bo".to_string()]);
    }

    #[test]
    fn adopt_is_noop_once_queue_initialized() {
        let mut s = SessionState::default();
        s.enqueue(1, "ana", 0);
        let v = s.queue_version;
        s.adopt(vec![adopted_song(9)]);
        assert_eq!(s.queue_version, v);
        assert_eq!(s.queue_slice().len(), 1);
    }

    #[test]
    fn version_counters_start_at_zero_and_only_increase() {
        let mut s = SessionState::default();
        assert_eq!(s.status_version, 0);
        s.apply_status(Status::default());
        assert_eq!(s.status_version, 1);
    }
}
