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
use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::controller::{keyboard, Controller};
use crate::library::{LibraryError, TrackId};
use crate::playlist::Tape;
use crate::session::MediaSession;
use crate::source::{BlobRegistry, SourceResolver};
use crate::store::PlaybackStore;

pub use self::error::ConfigError;
pub use self::player::Player;
pub use self::speaker::Speaker;

mod error;
mod library;
mod player;
mod speaker;

/// A parsed library file: the tracks and the tapes made from them.
pub struct Catalog {
    library: Arc<crate::library::Library>,
    tapes: Vec<Arc<Tape>>,
}

impl Catalog {
    pub fn library(&self) -> Arc<crate::library::Library> {
        Arc::clone(&self.library)
    }

    pub fn tapes(&self) -> &[Arc<Tape>] {
        &self.tapes
    }

    /// Gets the tape with the given id.
    pub fn tape(&self, id: &str) -> Result<Arc<Tape>, ConfigError> {
        self.tapes
            .iter()
            .find(|tape| tape.id() == id)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownTape(id.to_string()))
    }
}

/// Parse a library and its tapes from a YAML file.
pub fn parse_library(path: &Path) -> Result<Catalog, ConfigError> {
    let config = library::Library::deserialize(path)?;
    let base = path.parent().unwrap_or(Path::new("."));
    let library = Arc::new(config.to_library(base)?);

    let tapes = config
        .tapes()
        .iter()
        .map(|tape| {
            let songs = tape.songs().iter().map(TrackId::new).collect();
            Tape::new(
                tape.id(),
                tape.name(),
                tape.description(),
                songs,
                Arc::clone(&library),
            )
            .map(Arc::new)
            .map_err(|e| match e {
                LibraryError::UnknownTrack(track) => ConfigError::UnknownTapeTrack {
                    tape: tape.id().to_string(),
                    track: track.to_string(),
                },
                e => ConfigError::Library(e),
            })
        })
        .collect::<Result<Vec<Arc<Tape>>, ConfigError>>()?;

    info!(
        library = %path.display(),
        tracks = library.len(),
        tapes = tapes.len(),
        "Loaded library."
    );
    Ok(Catalog { library, tapes })
}

/// Initializes the media session and controller from the given player config file and returns
/// the controller. The controller owns the session, which can be waited on until it exits.
pub fn init_session_and_controller(player_path: &Path) -> Result<Controller, Box<dyn Error>> {
    let player = Player::deserialize(player_path)?;
    let base = player_path.parent().unwrap_or(Path::new("."));
    let catalog = parse_library(Path::new(&library::resolve_path(
        base,
        player.library(),
    )))?;

    let all_songs = Arc::new(Tape::from_library(catalog.library()));
    let tape = match player.tape() {
        Some(id) => catalog.tape(id)?,
        None => Arc::clone(&all_songs),
    };

    let registry = BlobRegistry::new();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let output = crate::output::get_output(
        player.output(),
        &player.speaker(),
        registry.clone(),
        events_tx,
    )?;
    let (notices_tx, notices_rx) = mpsc::unbounded_channel();
    let session = MediaSession::new(
        output,
        PlaybackStore::new(),
        SourceResolver::new(registry),
        notices_tx,
    );
    let (session, session_join) = session.spawn(events_rx);

    Controller::new(
        session,
        session_join,
        notices_rx,
        tape,
        all_songs,
        Arc::new(keyboard::Driver::new()),
    )
}
