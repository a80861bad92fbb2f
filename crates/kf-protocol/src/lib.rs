//! kf-protocol: wire types for the karaoke session mediator.
//!
//! Two independent protocols share this crate:
//! - the **client protocol**: JSON command frames in, `UpdateFrame` deltas out,
//!   carried over the `/ws` WebSocket (see `client` module).
//! - the **upstream protocol**: the karafun remote-control WebSocket, whose
//!   inbound events are tagged by a `type` field and whose outbound commands
//!   are a `{id, type, payload}` envelope (see `upstream` module).
//!
//! Field names are chosen to match what each side actually sends on the
//! wire; they are intentionally not unified into one shared case convention.

pub mod client;
pub mod upstream;

pub use client::{
    ChangeKeyCommand, ChangeTempoCommand, Command, EnqueueCommand, MoveCommand, Permissions,
    QueueSong, RemoveCommand, SetVolumeCommand, Status, Track, UpdateFrame, UpvoteCommand,
    ADOPTED_SINGER, SENTINEL_PREFIX,
};
pub use upstream::{
    KfItemId, KfQueuePayload, KfQueueItem, KfSongIdentifier, KfSongRef, KfStatusPayload,
    OutboundCommandEnvelope, PermissionsUpdatePayload, QueueEventPayload, StatusEventPayload,
    UpstreamEvent, UpstreamMethod, APPEND_POSITION, SONG_IDENTIFIER_TYPE,
};
