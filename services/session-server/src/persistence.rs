//! Per-channel queue persistence (spec §6).
//!
//! One JSON file per session at `<data_dir>/<channel>.json`, containing
//! the full queue array, rewritten wholesale after each mutation. Grounded
//! on the teacher's `db.rs` open/load/save split, but a flat-file JSON
//! dump rather than SQLite — the teacher's forwarder/receiver persist a
//! growing event journal that benefits from SQLite's durability knobs;
//! this system persists one small, fully-replaced snapshot per session,
//! which is exactly what a plain JSON file is for (and is what the
//! original karafun-voting server does).

use kf_protocol::QueueSong;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt queue file: {0}")]
    Corrupt(String),
}

fn channel_path(data_dir: &Path, channel: &str) -> PathBuf {
    data_dir.join(format!("{channel}.json"))
}

/// Load the persisted queue for `channel`.
///
/// `Ok(None)` means "no persisted state" (absent file) — the session
/// should treat its queue as null and remain eligible for upstream
/// adoption (spec §4.4). A present-but-unparseable file is fatal for the
/// session (spec §6, §7 class 1).
pub fn load_queue(data_dir: &Path, channel: &str) -> Result<Option<Vec<QueueSong>>, PersistError> {
    let path = channel_path(data_dir, channel);
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path)?;
    let queue: Vec<QueueSong> = serde_json::from_str(&text)
        .map_err(|e| PersistError::Corrupt(format!("{}: {e}", path.display())))?;
    Ok(Some(queue))
}

/// Rewrite the persisted queue for `channel` in full. Best-effort: callers
/// log failures and keep serving from in-memory state (spec §7 class 5).
pub fn save_queue(data_dir: &Path, channel: &str, queue: &[QueueSong]) -> Result<(), PersistError> {
    let path = channel_path(data_dir, channel);
    let text = serde_json::to_string(queue).map_err(|e| PersistError::Corrupt(e.to_string()))?;
    std::fs::write(path, text)?;
    Ok(())
}
