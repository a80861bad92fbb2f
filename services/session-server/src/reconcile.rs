//! The upstream reconciliation algorithm (spec §4.4).
//!
//! A pure, single-step diff: given the local queue and the most recently
//! observed upstream queue, decide the one upstream mutation (if any) that
//! moves them one step closer to agreement. Grounded on the original
//! karaoke session server's `reconcile` method for its overall shape
//! (sentinel drain, key index, walk-and-converge, remove stragglers), with
//! the `HasBeenQueued`/`MinSingers` gating and the vanished-entry pruning
//! step layered on top per the session's own queue model (§3, §4.4).

use kf_protocol::{KfItemId, KfQueueItem, QueueSong, UpstreamMethod, ADOPTED_SINGER, APPEND_POSITION, SENTINEL_PREFIX};
use std::collections::HashMap;

/// What one reconciliation pass decided.
pub enum ReconcileAction {
    /// No disagreement found; local and upstream already agree.
    Settled,
    /// `local` changed (a vanished queued entry was pruned, or an entry's
    /// `HasBeenQueued` latched) but no upstream command is needed this pass.
    Mutated,
    /// `local` may also have changed, and `method` must be sent to make
    /// further progress.
    Command(UpstreamMethod),
}

/// Run one reconciliation pass over `local`, mutating it in place
/// (sentinel backfill, vanished-entry pruning, `HasBeenQueued` latching)
/// and returning what the caller should do about it.
///
/// Precedence, in order, returning on the first step that has something to do:
/// 1. Sentinel drain: an upstream entry tagged by a live sentinel singer is
///    metadata for a local entry added without a known title — backfill it,
///    then remove the sentinel placeholder upstream.
/// 2. Index the upstream queue by `artist\0title`.
/// 3. Prune local entries that were once confirmed upstream (`HasBeenQueued`)
///    but have since vanished from it.
/// 4. Walk the (now-pruned) local queue in order, converging position by
///    position: add entries upstream has never seen, latch `HasBeenQueued`
///    on ones it has, move anything out of order. `MinSingers`-gated
///    entries are skipped without advancing the position counter.
/// 5. Remove any upstream entry the walk never claimed.
pub fn reconcile(local: &mut Vec<QueueSong>, upstream: &[KfQueueItem]) -> ReconcileAction {
    for item in upstream {
        if let Some(suffix) = item.singer.strip_prefix(SENTINEL_PREFIX) {
            if let Ok(my_queue_id) = suffix.parse::<u64>() {
                if let Some(entry) = local.iter_mut().find(|e| e.my_queue_id == my_queue_id) {
                    entry.artist = item.song.artist.clone();
                    entry.song = item.song.title.clone();
                }
            }
            return ReconcileAction::Command(UpstreamMethod::RemoveFromQueue {
                queue_item_id: item.id.clone(),
            });
        }
    }

    let mut in_kf_queue: HashMap<String, Vec<(usize, KfItemId)>> = HashMap::new();
    for (i, item) in upstream.iter().enumerate() {
        let key = format!("{}\0{}", item.song.artist, item.song.title);
        in_kf_queue.entry(key).or_default().push((i, item.id.clone()));
    }

    let mut mutated = false;
    let before = local.len();
    local.retain(|entry| !(entry.has_been_queued && !in_kf_queue.contains_key(&entry.reconcile_key())));
    if local.len() != before {
        mutated = true;
    }

    let mut position: u32 = 0;
    for entry in local.iter_mut() {
        let key = entry.reconcile_key();
        match in_kf_queue.get_mut(&key) {
            None => {
                assert!(entry.song_id != 0, "reconciler asked to push a queue entry with SongID == 0");
                if entry.is_unmetadated() {
                    let singer = Some(entry.sentinel_singer());
                    return ReconcileAction::Command(UpstreamMethod::AddToQueue {
                        song_id: entry.song_id,
                        position: APPEND_POSITION,
                        singer,
                    });
                }
                if entry.is_gated() {
                    continue;
                }
                return ReconcileAction::Command(UpstreamMethod::AddToQueue {
                    song_id: entry.song_id,
                    position: APPEND_POSITION,
                    singer: None,
                });
            }
            Some(positions) => {
                if entry.is_gated() {
                    continue;
                }
                if !entry.has_been_queued {
                    entry.has_been_queued = true;
                    mutated = true;
                }
                let (up_idx, up_id) = positions[0].clone();
                if up_idx as u32 != position {
                    return ReconcileAction::Command(UpstreamMethod::MoveInQueue {
                        queue_item_id: up_id,
                        from: up_idx as u32,
                        to: position,
                    });
                }
                positions.remove(0);
                if positions.is_empty() {
                    in_kf_queue.remove(&key);
                }
                position += 1;
            }
        }
    }

    if let Some((_, straggler_id)) = in_kf_queue.values().flatten().min_by_key(|(idx, _)| *idx) {
        return ReconcileAction::Command(UpstreamMethod::RemoveFromQueue {
            queue_item_id: straggler_id.clone(),
        });
    }

    if mutated {
        ReconcileAction::Mutated
    } else {
        ReconcileAction::Settled
    }
}

/// spec §4.4's adoption step: synthesize one local entry per upstream item,
/// run only when the local queue has never been initialized.
pub fn adopt(upstream: &[KfQueueItem]) -> Vec<QueueSong> {
    upstream
        .iter()
        .map(|item| QueueSong {
            artist: item.song.artist.clone(),
            song: item.song.title.clone(),
            singers: vec![ADOPTED_SINGER.to_owned()],
            min_singers: 0,
            song_id: item.song.id.id,
            my_queue_id: crate::random_queue_id(),
            can_move_up: false,
            can_move_down: false,
            has_been_queued: true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kf_protocol::{KfItemId, KfSongIdentifier, KfSongRef};

    fn local_song(artist: &str, title: &str, my_queue_id: u64) -> QueueSong {
        QueueSong {
            artist: artist.to_owned(),
            song: title.to_owned(),
            singers: vec!["ana".to_owned()],
            min_singers: 0,
            song_id: 1,
            my_queue_id,
            can_move_up: false,
            can_move_down: false,
            has_been_queued: false,
        }
    }

    fn upstream_item(id: &str, artist: &str, title: &str, singer: &str) -> KfQueueItem {
        KfQueueItem {
            id: KfItemId(id.to_owned()),
            singer: singer.to_owned(),
            song: KfSongRef {
                id: KfSongIdentifier { kind: 1, id: 1 },
                title: title.to_owned(),
                artist: artist.to_owned(),
            },
        }
    }

    #[test]
    fn empty_queues_are_settled() {
        let mut local: Vec<QueueSong> = vec![];
        assert!(matches!(reconcile(&mut local, &[]), ReconcileAction::Settled));
    }

    #[test]
    fn local_only_entry_is_added() {
        let mut local = vec![local_song("A", "B", 1)];
        match reconcile(&mut local, &[]) {
            ReconcileAction::Command(UpstreamMethod::AddToQueue { song_id, position, singer }) => {
                assert_eq!(song_id, 1);
                assert_eq!(position, APPEND_POSITION);
                assert!(singer.is_none());
            }
            _ => panic!("expected AddToQueue"),
        }
    }

    #[test]
    fn unmetadated_local_entry_gets_sentinel_singer() {
        let mut entry = local_song("", "", 42);
        entry.artist.clear();
        entry.song.clear();
        let mut local = vec![entry];
        match reconcile(&mut local, &[]) {
            ReconcileAction::Command(UpstreamMethod::AddToQueue { singer, .. }) => {
                assert_eq!(singer.unwrap(), "sentinel-42");
            }
            _ => panic!("expected AddToQueue with sentinel singer"),
        }
    }

    #[test]
    fn unmetadated_entry_is_added_even_when_gated() {
        // The sentinel branch bypasses MinSingers gating (spec §4.4 step 4):
        // metadata has to be learned before gating can mean anything.
        let mut entry = local_song("", "", 42);
        entry.artist.clear();
        entry.song.clear();
        entry.min_singers = 5;
        let mut local = vec![entry];
        assert!(matches!(
            reconcile(&mut local, &[]),
            ReconcileAction::Command(UpstreamMethod::AddToQueue { .. })
        ));
    }

    #[test]
    fn upstream_only_entry_is_removed() {
        let mut local: Vec<QueueSong> = vec![];
        let upstream = vec![upstream_item("u1", "A", "B", "ana")];
        match reconcile(&mut local, &upstream) {
            ReconcileAction::Command(UpstreamMethod::RemoveFromQueue { queue_item_id }) => {
                assert_eq!(queue_item_id.0, "u1");
            }
            _ => panic!("expected RemoveFromQueue"),
        }
    }

    #[test]
    fn out_of_order_entry_is_moved() {
        let mut local = vec![local_song("A", "1", 1), local_song("B", "2", 2)];
        let upstream = vec![
            upstream_item("u1", "B", "2", "ana"),
            upstream_item("u2", "A", "1", "ana"),
        ];
        match reconcile(&mut local, &upstream) {
            ReconcileAction::Command(UpstreamMethod::MoveInQueue { queue_item_id, from, to }) => {
                assert_eq!(queue_item_id.0, "u1");
                assert_eq!(from, 0);
                assert_eq!(to, 1);
            }
            _ => panic!("expected MoveInQueue"),
        }
    }

    #[test]
    fn matching_order_settles_and_latches_has_been_queued() {
        let mut local = vec![local_song("A", "1", 1), local_song("B", "2", 2)];
        let upstream = vec![
            upstream_item("u1", "A", "1", "ana"),
            upstream_item("u2", "B", "2", "ana"),
        ];
        assert!(matches!(reconcile(&mut local, &upstream), ReconcileAction::Mutated));
        assert!(local[0].has_been_queued);
        assert!(local[1].has_been_queued);
        // Second pass: nothing left to latch, truly settled.
        assert!(matches!(reconcile(&mut local, &upstream), ReconcileAction::Settled));
    }

    #[test]
    fn sentinel_backfills_metadata_then_removes_placeholder() {
        let mut entry = local_song("", "", 42);
        entry.artist.clear();
        entry.song.clear();
        let mut local = vec![entry];
        let upstream = vec![upstream_item("u9", "Queen", "Bohemian Rhapsody", "sentinel-42")];
        match reconcile(&mut local, &upstream) {
            ReconcileAction::Command(UpstreamMethod::RemoveFromQueue { queue_item_id }) => {
                assert_eq!(queue_item_id.0, "u9");
            }
            _ => panic!("expected RemoveFromQueue"),
        }
        assert_eq!(local[0].artist, "Queen");
        assert_eq!(local[0].song, "Bohemian Rhapsody");
    }

    #[test]
    fn adopt_marks_entries_as_already_queued() {
        let upstream = vec![upstream_item("u1", "A", "B", "ana")];
        let adopted = adopt(&upstream);
        assert_eq!(adopted.len(), 1);
        assert_eq!(adopted[0].singers, vec![ADOPTED_SINGER.to_string()]);
        assert!(adopted[0].has_been_queued);
    }

    /// Scenario D: a gated entry never emits an add and never latches,
    /// until upvoting brings `len(Singers)` up to `MinSingers`.
    #[test]
    fn gated_entry_is_skipped_until_min_singers_met() {
        let mut entry = local_song("A", "B", 1);
        entry.min_singers = 2;
        let mut local = vec![entry];
        assert!(matches!(reconcile(&mut local, &[]), ReconcileAction::Settled));
        assert!(!local[0].has_been_queued);

        local[0].singers.push("bo".to_owned());
        match reconcile(&mut local, &[]) {
            ReconcileAction::Command(UpstreamMethod::AddToQueue { song_id, .. }) => {
                assert_eq!(song_id, 1);
            }
            _ => panic!("expected AddToQueue once MinSingers is met"),
        }
    }

    /// Scenario F: upstream drops a previously-confirmed entry -> local
    /// deletion, reported as a mutation, with no upstream command.
    #[test]
    fn vanished_queued_entry_is_pruned_without_a_command() {
        let mut entry = local_song("A", "B", 1);
        entry.has_been_queued = true;
        let mut local = vec![entry];
        assert!(matches!(reconcile(&mut local, &[]), ReconcileAction::Mutated));
        assert!(local.is_empty());
    }

    /// An entry never confirmed upstream (`HasBeenQueued == false`) is not
    /// pruned just because it's momentarily missing from `inKfQueue` — it
    /// is a normal candidate for an add instead.
    #[test]
    fn never_queued_entry_is_not_pruned_when_absent() {
        let mut local = vec![local_song("A", "B", 1)];
        match reconcile(&mut local, &[]) {
            ReconcileAction::Command(UpstreamMethod::AddToQueue { .. }) => {}
            _ => panic!("expected AddToQueue, not a prune"),
        }
        assert_eq!(local.len(), 1);
    }

    #[test]
    #[should_panic(expected = "SongID == 0")]
    fn zero_song_id_with_unknown_metadata_fails_loudly() {
        let mut entry = local_song("A", "B", 1);
        entry.song_id = 0;
        let mut local = vec![entry];
        let _ = reconcile(&mut local, &[]);
    }
}
