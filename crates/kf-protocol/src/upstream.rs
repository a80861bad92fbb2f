//! The karafun upstream WebSocket protocol: inbound events tagged by `type`,
//! outbound commands as a `{id, type, payload}` envelope.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::client::Permissions;

/// An upstream queue-item identifier.
///
/// Observed upstream messages encode `id` as either a JSON string or a
/// bare number; spec.md treats it as opaque and requires it to round-trip
/// identically either way, so it is captured as a string regardless of
/// the wire representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct KfItemId(pub String);

impl<'de> Deserialize<'de> for KfItemId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::String(s) => Ok(KfItemId(s)),
            serde_json::Value::Number(n) => Ok(KfItemId(n.to_string())),
            other => Err(D::Error::custom(format!(
                "expected string or number queue item id, got {other}"
            ))),
        }
    }
}

impl std::fmt::Display for KfItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The fixed song-identifier `type` karafun uses for all local add requests.
pub const SONG_IDENTIFIER_TYPE: i32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KfSongIdentifier {
    #[serde(rename = "type")]
    pub kind: i32,
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KfSongRef {
    pub id: KfSongIdentifier,
    pub title: String,
    pub artist: String,
}

/// One entry in the upstream queue as reported by a `remote.QueueEvent`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KfQueueItem {
    pub id: KfItemId,
    #[serde(default)]
    pub singer: String,
    pub song: KfSongRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KfQueuePayload {
    pub items: Vec<KfQueueItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueEventPayload {
    pub queue: KfQueuePayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PermissionsUpdatePayload {
    pub permissions: Permissions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KfColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KfTrackInfo {
    #[serde(rename = "type")]
    pub kind: i32,
    #[serde(default)]
    pub caption: String,
    pub color: KfColor,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KfTrackEntry {
    pub track: KfTrackInfo,
    pub volume: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KfStatusPayload {
    pub state: i32,
    pub tempo: i32,
    pub pitch: i32,
    #[serde(default)]
    pub tracks: Vec<KfTrackEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusEventPayload {
    pub status: KfStatusPayload,
}

/// The karafun player state meaning "actively playing"; states below it are
/// various stages of loading (spec §4.3 note on the `state` enum).
const STATE_PLAYING: i32 = 4;

/// Karafun's fixed track-type codes that get a friendlier default caption
/// than the generic fallback (spec §3's `Status` caption-default rule).
const TRACK_TYPE_GENERAL_VOLUME: i32 = 1;
const TRACK_TYPE_VOCALS: i32 = 4;

fn default_caption(track_type: i32) -> &'static str {
    match track_type {
        TRACK_TYPE_GENERAL_VOLUME => "General volume",
        TRACK_TYPE_VOCALS => "Vocals",
        _ => "Audio",
    }
}

impl From<KfStatusPayload> for crate::client::Status {
    fn from(payload: KfStatusPayload) -> Self {
        let mut tracks: Vec<crate::client::Track> = payload
            .tracks
            .into_iter()
            .map(|entry| {
                let caption = if entry.track.caption.is_empty() {
                    default_caption(entry.track.kind).to_owned()
                } else {
                    entry.track.caption
                };
                crate::client::Track {
                    track_id: entry.track.kind,
                    volume: entry.volume,
                    caption,
                    color: format!(
                        "{:02x}{:02x}{:02x}",
                        entry.track.color.red, entry.track.color.green, entry.track.color.blue
                    ),
                }
            })
            .collect();
        tracks.sort_by_key(|t| t.track_id);
        crate::client::Status {
            playing: payload.state == STATE_PLAYING,
            loading: payload.state < STATE_PLAYING,
            tempo: payload.tempo,
            pitch: payload.pitch,
            tracks,
        }
    }
}

/// Inbound upstream message, dispatched by its `type` tag.
///
/// Message types not named here (e.g. karafun's preference/configuration
/// pushes) fail to deserialize against this enum; the listener logs and
/// ignores them rather than treating that as fatal (spec §4.3).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum UpstreamEvent {
    #[serde(rename = "remote.QueueEvent")]
    QueueEvent { payload: QueueEventPayload },
    #[serde(rename = "remote.PermissionsUpdateEvent")]
    PermissionsUpdateEvent { payload: PermissionsUpdatePayload },
    #[serde(rename = "remote.StatusEvent")]
    StatusEvent { payload: StatusEventPayload },
}

// ---------------------------------------------------------------------------
// Outbound commands (server -> upstream)
// ---------------------------------------------------------------------------

/// One outbound upstream command, strongly typed over the methods the
/// reconciler and client-command dispatcher are allowed to emit.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamMethod {
    Play,
    Pause,
    Next,
    TrackVolume { track_id: i32, volume: f32 },
    Pitch { pitch: i32 },
    Tempo { pitch: i32 },
    AddToQueue {
        song_id: u64,
        position: u32,
        singer: Option<String>,
    },
    RemoveFromQueue { queue_item_id: KfItemId },
    MoveInQueue {
        queue_item_id: KfItemId,
        from: u32,
        to: u32,
    },
}

/// Position sentinel meaning "append at the end", matching the upstream's
/// own convention for a fresh add (spec §4.4 step 4).
pub const APPEND_POSITION: u32 = 99999;

impl UpstreamMethod {
    pub fn type_name(&self) -> &'static str {
        match self {
            UpstreamMethod::Play => "remote.PlayRequest",
            UpstreamMethod::Pause => "remote.PauseRequest",
            UpstreamMethod::Next => "remote.NextRequest",
            UpstreamMethod::TrackVolume { .. } => "remote.TrackVolumeRequest",
            UpstreamMethod::Pitch { .. } => "remote.PitchRequest",
            UpstreamMethod::Tempo { .. } => "remote.TempoRequest",
            UpstreamMethod::AddToQueue { .. } => "remote.AddToQueueRequest",
            UpstreamMethod::RemoveFromQueue { .. } => "remote.RemoveFromQueueRequest",
            UpstreamMethod::MoveInQueue { .. } => "remote.MoveInQueueRequest",
        }
    }

    pub fn payload(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            UpstreamMethod::Play | UpstreamMethod::Pause | UpstreamMethod::Next => json!({}),
            UpstreamMethod::TrackVolume { track_id, volume } => json!({
                "type": track_id,
                "volume": volume,
            }),
            // The upstream's field is literally named `pitch` for both
            // pitch and tempo requests (spec §4.5 note).
            UpstreamMethod::Pitch { pitch } | UpstreamMethod::Tempo { pitch } => json!({
                "pitch": pitch,
            }),
            UpstreamMethod::AddToQueue {
                song_id,
                position,
                singer,
            } => {
                let mut payload = json!({
                    "identifier": { "type": SONG_IDENTIFIER_TYPE, "id": song_id },
                    "position": position,
                });
                if let Some(singer) = singer {
                    payload["singer"] = json!(singer);
                }
                payload
            }
            UpstreamMethod::RemoveFromQueue { queue_item_id } => json!({
                "queueItemId": queue_item_id.0,
            }),
            UpstreamMethod::MoveInQueue {
                queue_item_id,
                from,
                to,
            } => json!({
                "queueItemId": queue_item_id.0,
                "from": from,
                "to": to,
            }),
        }
    }
}

/// The `{id, type, payload}` envelope actually written to the upstream socket.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundCommandEnvelope {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: serde_json::Value,
}

impl OutboundCommandEnvelope {
    pub fn new(id: u64, method: &UpstreamMethod) -> Self {
        Self {
            id,
            kind: method.type_name().to_owned(),
            payload: method.payload(),
        }
    }
}
