//! Client-facing JSON protocol: `Command` frames in, `UpdateFrame` deltas out.

use serde::{Deserialize, Serialize};

/// One changed-field delta sent to a client.
///
/// All three fields are always present in the serialized frame; `None`
/// serializes as JSON `null`, meaning "unchanged since this client's last
/// frame" (spec: absent/null fields mean "unchanged").
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateFrame {
    pub status: Option<Status>,
    pub queue: Option<Vec<QueueSong>>,
    pub permissions: Option<Permissions>,
}

/// A single local queue entry, as seen by clients and persisted to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct QueueSong {
    pub artist: String,
    pub song: String,
    pub singers: Vec<String>,
    pub min_singers: u32,
    pub song_id: u64,
    pub my_queue_id: u64,
    pub can_move_up: bool,
    pub can_move_down: bool,
    pub has_been_queued: bool,
}

/// The sentinel singer name marking an entry adopted from the upstream
/// queue at session startup.
pub const ADOPTED_SINGER: &str = "adopted";

/// Prefix used to encode a `my_queue_id` into an upstream singer field
/// for the metadata-backfill sentinel protocol.
pub const SENTINEL_PREFIX: &str = "sentinel-";

impl QueueSong {
    pub fn sentinel_singer(&self) -> String {
        format!("{SENTINEL_PREFIX}{}", self.my_queue_id)
    }

    pub fn is_unmetadated(&self) -> bool {
        self.artist.is_empty() && self.song.is_empty()
    }

    /// `artist + NUL + title`, the reconciler's join key against upstream entries.
    pub fn reconcile_key(&self) -> String {
        format!("{}\0{}", self.artist, self.song)
    }

    pub fn is_gated(&self) -> bool {
        self.min_singers as usize > self.singers.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub playing: bool,
    pub loading: bool,
    pub tempo: i32,
    pub pitch: i32,
    pub tracks: Vec<Track>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub track_id: i32,
    pub volume: f32,
    pub caption: String,
    pub color: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    pub manage_queue: bool,
    pub view_queue: bool,
    pub add_to_queue: bool,
    pub manage_playback: bool,
    pub manage_volumes: bool,
}

// ---------------------------------------------------------------------------
// Commands (client -> server)
// ---------------------------------------------------------------------------

/// A recognized client command, already matched against its verb.
///
/// Parsing a raw frame into a `Command` is two-stage (see
/// `session-server`'s `client` module): first the `command` field is
/// read to decide the verb, then the remaining fields are deserialized
/// into the matching payload struct. This lets "unknown verb" and
/// "malformed JSON" be told apart, as the spec requires.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Enqueue(EnqueueCommand),
    Upvote(UpvoteCommand),
    Remove(RemoveCommand),
    MoveUp(MoveCommand),
    MoveDown(MoveCommand),
    Play,
    Pause,
    Next,
    SetVolume(SetVolumeCommand),
    ChangeKey(ChangeKeyCommand),
    ChangeTempo(ChangeTempoCommand),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EnqueueCommand {
    pub song_id: u64,
    pub username: String,
    #[serde(default)]
    pub min_singers: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpvoteCommand {
    pub my_queue_id: u64,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoveCommand {
    pub my_queue_id: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MoveCommand {
    pub my_queue_id: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SetVolumeCommand {
    pub track_id: i32,
    pub number: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChangeKeyCommand {
    pub number: i32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChangeTempoCommand {
    pub number: i32,
}

impl Command {
    /// Parse one client frame already decoded as JSON.
    ///
    /// Returns `None` for both an unrecognized verb and a recognized verb
    /// with a malformed payload — the caller is expected to log and
    /// continue either way rather than disconnect. A frame that fails to
    /// parse as JSON at all is the caller's responsibility to treat as
    /// fatal; that decision happens one layer up, before this is called.
    pub fn parse(value: &serde_json::Value) -> Option<Command> {
        let verb = value.get("command")?.as_str()?;
        match verb {
            verbs::ENQUEUE => serde_json::from_value(value.clone()).ok().map(Command::Enqueue),
            verbs::UPVOTE => serde_json::from_value(value.clone()).ok().map(Command::Upvote),
            verbs::REMOVE => serde_json::from_value(value.clone()).ok().map(Command::Remove),
            verbs::MOVE_UP => serde_json::from_value(value.clone()).ok().map(Command::MoveUp),
            verbs::MOVE_DOWN => serde_json::from_value(value.clone()).ok().map(Command::MoveDown),
            verbs::PLAY => Some(Command::Play),
            verbs::PAUSE => Some(Command::Pause),
            verbs::NEXT => Some(Command::Next),
            verbs::SET_VOLUME => serde_json::from_value(value.clone()).ok().map(Command::SetVolume),
            verbs::CHANGE_KEY => serde_json::from_value(value.clone()).ok().map(Command::ChangeKey),
            verbs::CHANGE_TEMPO => serde_json::from_value(value.clone()).ok().map(Command::ChangeTempo),
            _ => None,
        }
    }
}

/// The verb names recognized on the wire, exactly as spec.md's table spells them.
pub mod verbs {
    pub const ENQUEUE: &str = "enqueue";
    pub const UPVOTE: &str = "upvote";
    pub const REMOVE: &str = "remove";
    pub const MOVE_UP: &str = "move-up";
    pub const MOVE_DOWN: &str = "move-down";
    pub const PLAY: &str = "play";
    pub const PAUSE: &str = "pause";
    pub const NEXT: &str = "next";
    pub const SET_VOLUME: &str = "set-volume";
    pub const CHANGE_KEY: &str = "change-key";
    pub const CHANGE_TEMPO: &str = "change-tempo";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_frame_serializes_absent_fields_as_null() {
        let frame = UpdateFrame::default();
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"status":null,"queue":null,"permissions":null}"#);
    }

    #[test]
    fn reconcile_key_joins_with_nul() {
        let song = QueueSong {
            artist: "A".into(),
            song: "B".into(),
            singers: vec![],
            min_singers: 0,
            song_id: 1,
            my_queue_id: 2,
            can_move_up: false,
            can_move_down: false,
            has_been_queued: false,
        };
        assert_eq!(song.reconcile_key(), "A\0B");
    }

    #[test]
    fn sentinel_singer_encodes_my_queue_id() {
        let song = QueueSong {
            artist: String::new(),
            song: String::new(),
            singers: vec![],
            min_singers: 0,
            song_id: 7,
            my_queue_id: 42,
            can_move_up: false,
            can_move_down: false,
            has_been_queued: false,
        };
        assert_eq!(song.sentinel_singer(), "sentinel-42");
        assert!(song.is_unmetadated());
    }

    #[test]
    fn parse_recognizes_enqueue() {
        let v = serde_json::json!({"command": "enqueue", "song_id": 5, "username": "ana"});
        match Command::parse(&v) {
            Some(Command::Enqueue(e)) => {
                assert_eq!(e.song_id, 5);
                assert_eq!(e.username, "ana");
                assert_eq!(e.min_singers, 0);
            }
            _ => panic!("expected Enqueue"),
        }
    }

    #[test]
    fn parse_ignores_unknown_verb() {
        let v = serde_json::json!({"command": "teleport"});
        assert!(Command::parse(&v).is_none());
    }

    #[test]
    fn parse_ignores_malformed_payload_for_known_verb() {
        let v = serde_json::json!({"command": "enqueue"});
        assert!(Command::parse(&v).is_none());
    }

    #[test]
    fn parse_ignores_missing_command_field() {
        let v = serde_json::json!({"username": "ana"});
        assert!(Command::parse(&v).is_none());
    }

    #[test]
    fn is_gated_compares_min_singers_to_len() {
        let mut song = QueueSong {
            artist: "A".into(),
            song: "B".into(),
            singers: vec!["ana".into()],
            min_singers: 2,
            song_id: 1,
            my_queue_id: 1,
            can_move_up: false,
            can_move_down: false,
            has_been_queued: false,
        };
        assert!(song.is_gated());
        song.singers.push("bo".into());
        assert!(!song.is_gated());
    }
}
