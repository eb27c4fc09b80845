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
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, span, Level, Span};

use crate::library::{Library, LibraryError, Track, TrackId};

const ALL_SONGS_ID: &str = "all";
const ALL_SONGS_NAME: &str = "All Songs";

/// Tape is an ordered list of tracks with a cursor.
pub struct Tape {
    id: String,
    name: String,
    description: Option<String>,
    /// The tracks on this tape.
    songs: Vec<TrackId>,
    /// The current position on the tape.
    position: RwLock<usize>,
    /// The track registry.
    library: Arc<Library>,
    /// The logging span.
    span: Span,
}

impl fmt::Display for Tape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({} songs):", self.name, self.songs.len())?;
        if let Some(description) = &self.description {
            writeln!(f, "  {}", description)?;
        }
        for id in self.songs.iter() {
            match self.library.get(id) {
                Ok(track) => writeln!(f, "  - {} - {}", track.title(), track.artist())?,
                Err(_) => writeln!(f, "  - {} (unable to find track)", id)?,
            };
        }

        Ok(())
    }
}

impl Tape {
    /// Creates a new tape. Every track must be in the library.
    pub fn new(
        id: &str,
        name: &str,
        description: Option<&str>,
        songs: Vec<TrackId>,
        library: Arc<Library>,
    ) -> Result<Tape, LibraryError> {
        for song in songs.iter() {
            library.get(song)?;
        }

        Ok(Tape {
            id: id.to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
            songs,
            position: RwLock::new(0),
            library,
            span: span!(Level::INFO, "tape"),
        })
    }

    /// Creates a tape of every track in the library, in library order.
    pub fn from_library(library: Arc<Library>) -> Tape {
        let songs = library
            .list()
            .iter()
            .map(|track| track.id().clone())
            .collect();
        Tape {
            id: ALL_SONGS_ID.to_string(),
            name: ALL_SONGS_NAME.to_string(),
            description: None,
            songs,
            position: RwLock::new(0),
            library,
            span: span!(Level::INFO, "tape"),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.songs.len()
    }

    /// Move to the next track on the tape. If we're at the end of the tape, the position will not
    /// increment. The track at the current position will be returned.
    pub fn next(&self) -> Option<Arc<Track>> {
        let _enter = self.span.enter();

        let mut position = self.position.write();
        if *position + 1 < self.songs.len() {
            *position += 1;
        }

        let current = self.at(*position)?;
        info!(
            tape = self.id,
            position = *position,
            track = current.id().as_str(),
            "Moving to next tape position."
        );
        Some(current)
    }

    /// Move to the previous track on the tape. If we're at the beginning of the tape, the position
    /// will not decrement. The track at the current position will be returned.
    pub fn prev(&self) -> Option<Arc<Track>> {
        let _enter = self.span.enter();

        let mut position = self.position.write();
        if *position > 0 {
            *position -= 1;
        }

        let current = self.at(*position)?;
        info!(
            tape = self.id,
            position = *position,
            track = current.id().as_str(),
            "Moving to previous tape position."
        );
        Some(current)
    }

    /// Return the track at the current position of the tape. Empty tapes have no current track.
    pub fn current(&self) -> Option<Arc<Track>> {
        self.at(*self.position.read())
    }

    fn at(&self, position: usize) -> Option<Arc<Track>> {
        self.songs
            .get(position)
            .and_then(|id| self.library.get(id).ok())
    }
}
