//! The fair-share reorder algorithm (spec §4.2).
//!
//! Pure functions over `Vec<QueueSong>` — no locking, no I/O. Grounded on
//! the teacher's preference for small, independently-unit-testable
//! transforms (e.g. `session::apply_batch_counts`) rather than folding
//! this logic into the session actor.

use kf_protocol::QueueSong;

/// Re-derive `queue`'s play order by singer-rotation fairness.
///
/// Builds a round-robin list of singers in first-appearance order, then
/// repeatedly picks the lowest-happiness singer with a remaining
/// candidate entry, crediting every singer on that entry with
/// `1 / singers.len()` happiness. A singer with no candidate left this
/// round is penalized so the walk never stalls.
pub fn fair_reorder(queue: &[QueueSong]) -> Vec<QueueSong> {
    if queue.is_empty() {
        return Vec::new();
    }

    let mut round_robin: Vec<String> = Vec::new();
    for entry in queue {
        for singer in &entry.singers {
            if !round_robin.contains(singer) {
                round_robin.push(singer.clone());
            }
        }
    }
    if round_robin.is_empty() {
        // No singers recorded anywhere (shouldn't happen in practice);
        // preserve input order.
        return queue.to_vec();
    }

    let mut happiness = vec![0.0_f64; round_robin.len()];
    let mut moved = vec![false; queue.len()];
    let mut rr_idx = 0usize;
    let mut output = Vec::with_capacity(queue.len());

    while output.len() < queue.len() {
        let lo = happiness.iter().cloned().fold(f64::INFINITY, f64::min);
        while happiness[rr_idx] != lo {
            rr_idx = (rr_idx + 1) % round_robin.len();
        }
        let next_up = &round_robin[rr_idx];

        let candidate = queue
            .iter()
            .enumerate()
            .find(|(i, e)| !moved[*i] && e.singers.iter().any(|s| s == next_up));

        match candidate {
            Some((i, entry)) => {
                moved[i] = true;
                output.push(entry.clone());
                let credit = 1.0 / entry.singers.len() as f64;
                for singer in &entry.singers {
                    if let Some(pos) = round_robin.iter().position(|s| s == singer) {
                        happiness[pos] += credit;
                    }
                }
            }
            None => {
                happiness[rr_idx] += 1000.0;
            }
        }
        rr_idx = (rr_idx + 1) % round_robin.len();
    }

    output
}

/// Two entries are "equivalent" for moveability/swap purposes iff their
/// singer sets match in size and membership (order-independent).
fn same_singer_set(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().all(|s| b.contains(s))
}

/// Recompute `can_move_up` / `can_move_down` for every entry in place.
///
/// `can_move_up` at position `i` iff some `j < i` has an equal singer set;
/// `can_move_down` is the mirror image.
pub fn determine_moveability(queue: &mut [QueueSong]) {
    let singer_sets: Vec<Vec<String>> = queue.iter().map(|e| e.singers.clone()).collect();
    for i in 0..queue.len() {
        queue[i].can_move_up = (0..i).any(|j| same_singer_set(&singer_sets[j], &singer_sets[i]));
        queue[i].can_move_down = (i + 1..queue.len())
            .any(|j| same_singer_set(&singer_sets[j], &singer_sets[i]));
    }
}

/// Swap the entry identified by `my_queue_id` with its nearest equivalent
/// neighbor (above when `up`, below when `down`). No-op if no such
/// neighbor exists, matching spec §4.2.
pub fn move_up_down(queue: &mut Vec<QueueSong>, my_queue_id: u64, up: bool) {
    let Some(idx) = queue.iter().position(|e| e.my_queue_id == my_queue_id) else {
        return;
    };
    let singers = queue[idx].singers.clone();
    let neighbor = if up {
        (0..idx).rev().find(|&j| same_singer_set(&queue[j].singers, &singers))
    } else {
        (idx + 1..queue.len()).find(|&j| same_singer_set(&queue[j].singers, &singers))
    };
    if let Some(j) = neighbor {
        queue.swap(idx, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(artist: &str, singers: &[&str]) -> QueueSong {
        QueueSong {
            artist: artist.to_owned(),
            song: "S".to_owned(),
            singers: singers.iter().map(|s| s.to_string()).collect(),
            min_singers: 0,
            song_id: 1,
            my_queue_id: rand::random::<u64>() % (1 << 40),
            can_move_up: false,
            can_move_down: false,
            has_been_queued: false,
        }
    }

    #[test]
    fn empty_queue_reorders_to_empty() {
        assert!(fair_reorder(&[]).is_empty());
    }

    #[test]
    fn scenario_c_two_singers_surfaces_second_singer_early() {
        // spec §8 scenario C: ana, ana, bo -> ana, bo, ana
        let queue = vec![song("1", &["ana"]), song("2", &["ana"]), song("3", &["bo"])];
        let out = fair_reorder(&queue);
        let singers: Vec<&str> = out.iter().map(|e| e.singers[0].as_str()).collect();
        assert_eq!(singers, vec!["ana", "bo", "ana"]);
    }

    #[test]
    fn single_singer_preserves_order() {
        let queue = vec![song("1", &["ana"]), song("2", &["ana"]), song("3", &["ana"])];
        let out = fair_reorder(&queue);
        let artists: Vec<&str> = out.iter().map(|e| e.artist.as_str()).collect();
        assert_eq!(artists, vec!["1", "2", "3"]);
    }

    #[test]
    fn reorder_is_a_fixed_point() {
        let queue = vec![song("1", &["ana"]), song("2", &["bo"]), song("3", &["ana", "bo"])];
        let once = fair_reorder(&queue);
        let twice = fair_reorder(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn duet_credits_all_singers() {
        let queue = vec![
            song("1", &["ana", "bo"]),
            song("2", &["ana"]),
            song("3", &["bo"]),
        ];
        let out = fair_reorder(&queue);
        // The duet goes first; bo (now at 0.5) is picked again before ana
        // (still at 0) would be revisited, since bo comes next in the
        // round-robin scan order.
        assert_eq!(out[0].artist, "1");
        assert_eq!(out[1].singers, vec!["bo".to_string()]);
        assert_eq!(out[2].singers, vec!["ana".to_string()]);
    }

    #[test]
    fn empty_queue_moveability_all_false() {
        let mut q: Vec<QueueSong> = vec![];
        determine_moveability(&mut q);
        assert!(q.is_empty());
    }

    #[test]
    fn moveability_flags_equivalent_rows() {
        let mut q = vec![song("A", &["ana"]), song("B", &["ana"]), song("C", &["bo"])];
        determine_moveability(&mut q);
        assert!(!q[0].can_move_up);
        assert!(q[0].can_move_down);
        assert!(q[1].can_move_up);
        assert!(!q[1].can_move_down);
        assert!(!q[2].can_move_up);
        assert!(!q[2].can_move_down);
    }

    #[test]
    fn scenario_e_move_down_swaps_with_equivalent_neighbor() {
        let mut q = vec![song("A", &["ana"]), song("B", &["ana"]), song("C", &["bo"])];
        let a_id = q[0].my_queue_id;
        move_up_down(&mut q, a_id, false);
        let artists: Vec<&str> = q.iter().map(|e| e.artist.as_str()).collect();
        assert_eq!(artists, vec!["B", "A", "C"]);
    }

    #[test]
    fn move_up_down_is_noop_without_equivalent_neighbor() {
        let mut q = vec![song("A", &["ana"]), song("B", &["bo"])];
        let a_id = q[0].my_queue_id;
        move_up_down(&mut q, a_id, true);
        assert_eq!(q[0].artist, "A");
        move_up_down(&mut q, a_id, false);
        // B has a different singer set, no-op both ways.
        assert_eq!(q[0].artist, "A");
    }
}
