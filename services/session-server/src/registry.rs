//! The channel -> session registry (spec §4, §5): dials upstream and
//! spawns a session's background tasks exactly once per channel, no
//! matter how many clients race to be first.
//!
//! Grounded on the teacher's baton-style concurrent map of live sessions
//! (a `DashMap` keyed by session id), generalized from "one entry per race
//! bib" to "one entry per karafun channel code".

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{info, warn};

use crate::config::Config;
use crate::session::Session;
use crate::upstream;

pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
    config: Config,
}

impl SessionRegistry {
    pub fn new(config: Config) -> Self {
        Self { sessions: DashMap::new(), config }
    }

    /// Return the session for `channel`, dialing upstream and spawning its
    /// listener/reconciler tasks on first sight. Concurrent first-sighters
    /// race to dial; only the winner's connection survives (spec §5's
    /// "exactly once" initialization guarantee), at the cost of the loser
    /// having dialed and then dropped one extra upstream connection.
    ///
    /// A dial failure does not leave `channel` unregistered: the session is
    /// still created and inserted, with `SessionError` latched, so it stays
    /// permanently degraded rather than letting every subsequent client
    /// re-attempt the same doomed dial (spec §3, §7 class 1 — mirrors the
    /// original `LoadOrStore`-before-`init` ordering). Degradation is
    /// surfaced to the caller through `Session::session_error`, not through
    /// this method's return type.
    pub async fn get_or_init(&self, channel: &str) -> Arc<Session> {
        if let Some(existing) = self.sessions.get(channel) {
            return existing.clone();
        }

        let dialed = upstream::connect(&self.config.upstream_url, channel).await;
        let (writer, reader, dial_error) = match dialed {
            Ok((reader, writer)) => (writer, Some(reader), None),
            Err(e) => (upstream::UpstreamWriter::disconnected(), None, Some(e.to_string())),
        };
        let (session, upstream_rx) = Session::new(
            channel.to_owned(),
            self.config.data_dir.clone(),
            writer,
            Duration::from_millis(self.config.reconcile_pacing_ms),
        );
        if let Some(error) = &dial_error {
            session.latch_session_error(error.clone()).await;
        } else {
            session.load_persisted().await;
        }

        match self.sessions.entry(channel.to_owned()) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
                match reader {
                    Some(reader) => {
                        info!(channel, "initialized new session");
                        tokio::spawn(session.clone().run_listener(reader));
                        tokio::spawn(session.clone().run_reconciler(upstream_rx));
                    }
                    None => {
                        warn!(channel, error = %dial_error.unwrap_or_default(), "session permanently degraded: upstream dial failed");
                    }
                }
                session
            }
        }
    }
}
