// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::library::{Track, TrackId};

/// What is selected and whether it should be playing. The intent is never true while nothing
/// is selected.
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    selected: Option<Arc<Track>>,
    intent: bool,
}

impl SessionState {
    /// The currently selected track.
    pub fn selected(&self) -> Option<&Arc<Track>> {
        self.selected.as_ref()
    }

    /// The id of the currently selected track.
    pub fn selected_id(&self) -> Option<&TrackId> {
        self.selected.as_ref().map(|track| track.id())
    }

    /// Whether the selected track should be playing.
    pub fn intent(&self) -> bool {
        self.intent
    }
}

/// The session-wide authority for the selected track and the playback intent. Clones share the
/// same state. Changes are published to subscribers.
#[derive(Clone)]
pub struct PlaybackStore {
    state: Arc<watch::Sender<SessionState>>,
}

impl PlaybackStore {
    /// Creates a new store with nothing selected.
    pub fn new() -> PlaybackStore {
        let (state, _) = watch::channel(SessionState::default());
        PlaybackStore {
            state: Arc::new(state),
        }
    }

    /// Selects a track and asks for it to be played.
    pub fn select_track(&self, track: Arc<Track>) {
        debug!(track = track.id().as_str(), "Selecting track.");
        self.state.send_modify(|state| {
            state.selected = Some(track);
            state.intent = true;
        });
    }

    /// Clears the selection. Playback intent is forced off.
    pub fn clear_track(&self) {
        debug!("Clearing track.");
        self.state.send_if_modified(|state| {
            let modified = state.selected.is_some() || state.intent;
            state.selected = None;
            state.intent = false;
            modified
        });
    }

    /// Sets the playback intent. Asking to play with nothing selected is ignored.
    pub fn set_playback_intent(&self, playing: bool) {
        self.state.send_if_modified(|state| {
            if state.selected.is_none() && playing {
                return false;
            }
            if state.intent == playing {
                return false;
            }
            state.intent = playing;
            true
        });
    }

    /// Flips the playback intent. Does nothing while no track is selected.
    pub fn toggle_playback_intent(&self) {
        self.state.send_if_modified(|state| {
            if state.selected.is_none() {
                return false;
            }
            state.intent = !state.intent;
            true
        });
    }

    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }
}

impl Default for PlaybackStore {
    fn default() -> Self {
        PlaybackStore::new()
    }
}
