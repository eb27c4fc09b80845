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
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::util::filename_display;

/// Errors raised while building or querying a library.
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("duplicate track id {0}")]
    DuplicateTrack(TrackId),

    #[error("unknown track {0}")]
    UnknownTrack(TrackId),
}

/// Identifies a track. Opaque and stable for a logical song.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> TrackId {
        TrackId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(id: &str) -> Self {
        TrackId::new(id)
    }
}

impl From<String> for TrackId {
    fn from(id: String) -> Self {
        TrackId(id)
    }
}

/// The contents of a file that was handed to the player directly rather than referenced by path.
#[derive(Clone)]
pub struct FileBlob {
    /// The original file name.
    name: String,
    /// The raw, still encoded, file contents.
    bytes: Arc<[u8]>,
}

impl FileBlob {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> FileBlob {
        FileBlob {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}

impl fmt::Debug for FileBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileBlob")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Where a track's audio comes from.
#[derive(Clone, Debug)]
pub enum TrackSource {
    /// A stable path or URL.
    Path(String),
    /// In-memory file contents.
    File(FileBlob),
}

/// A playable song record.
#[derive(Clone, Debug)]
pub struct Track {
    id: TrackId,
    title: String,
    artist: String,
    album: String,
    /// The display duration, e.g. 3:45.
    duration: String,
    album_art_url: String,
    genre: Option<String>,
    bpm: Option<u32>,
    /// None when the track has nothing to play.
    source: Option<TrackSource>,
}

impl Track {
    /// Creates a track with no source.
    pub fn new(id: impl Into<TrackId>, title: &str, artist: &str, album: &str) -> Track {
        Track {
            id: id.into(),
            title: title.to_string(),
            artist: artist.to_string(),
            album: album.to_string(),
            duration: "0:00".to_string(),
            album_art_url: String::default(),
            genre: None,
            bpm: None,
            source: None,
        }
    }

    /// Reads a file from disk into memory and wraps it as a file-backed track. The title is
    /// taken from the file stem, since tags aren't read.
    pub fn import(path: &Path) -> io::Result<Track> {
        let bytes = fs::read(path)?;
        let name = filename_display(path).to_string();
        let title = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(name.as_str())
            .to_string();

        Ok(Track::new(format!("file:{}", name), &title, "Unknown Artist", "Imports")
            .with_file(FileBlob::new(name, bytes)))
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Track {
        self.source = Some(TrackSource::Path(path.into()));
        self
    }

    pub fn with_file(mut self, file: FileBlob) -> Track {
        self.source = Some(TrackSource::File(file));
        self
    }

    pub fn with_duration(mut self, duration: &str) -> Track {
        self.duration = duration.to_string();
        self
    }

    pub fn with_album_art_url(mut self, album_art_url: &str) -> Track {
        self.album_art_url = album_art_url.to_string();
        self
    }

    pub fn with_genre(mut self, genre: Option<String>) -> Track {
        self.genre = genre;
        self
    }

    pub fn with_bpm(mut self, bpm: Option<u32>) -> Track {
        self.bpm = bpm;
        self
    }

    pub fn id(&self) -> &TrackId {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn artist(&self) -> &str {
        &self.artist
    }

    #[cfg(test)]
    pub fn duration(&self) -> &str {
        &self.duration
    }

    pub fn album_art_url(&self) -> &str {
        &self.album_art_url
    }

    pub fn genre(&self) -> Option<&str> {
        self.genre.as_deref()
    }

    pub fn bpm(&self) -> Option<u32> {
        self.bpm
    }

    pub fn source(&self) -> Option<&TrackSource> {
        self.source.as_ref()
    }

    /// Returns true if the track has something to play.
    #[cfg(test)]
    pub fn is_playable(&self) -> bool {
        self.source.is_some()
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} ({}, {})",
            self.artist, self.title, self.album, self.duration
        )?;
        match &self.source {
            Some(TrackSource::Path(path)) => write!(f, " [{}]", path),
            Some(TrackSource::File(file)) => {
                write!(f, " [file {}, {} bytes]", file.name, file.len())
            }
            None => write!(f, " [no source]"),
        }
    }
}

/// An ordered registry of tracks.
pub struct Library {
    tracks: Vec<Arc<Track>>,
    index: HashMap<TrackId, usize>,
}

impl Library {
    /// Creates a new library. Track ids must be unique.
    pub fn new(tracks: Vec<Track>) -> Result<Library, LibraryError> {
        let mut index = HashMap::with_capacity(tracks.len());
        for (position, track) in tracks.iter().enumerate() {
            if index.insert(track.id.clone(), position).is_some() {
                return Err(LibraryError::DuplicateTrack(track.id.clone()));
            }
        }

        Ok(Library {
            tracks: tracks.into_iter().map(Arc::new).collect(),
            index,
        })
    }

    /// Gets the track with the given id.
    pub fn get(&self, id: &TrackId) -> Result<Arc<Track>, LibraryError> {
        self.index
            .get(id)
            .map(|position| Arc::clone(&self.tracks[*position]))
            .ok_or_else(|| LibraryError::UnknownTrack(id.clone()))
    }

    /// Lists the tracks in library order.
    pub fn list(&self) -> &[Arc<Track>] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl fmt::Display for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Library ({} tracks):", self.tracks.len())?;
        for track in self.tracks.iter() {
            writeln!(f, "  - {}: {}", track.id, track)?;
        }

        Ok(())
    }
}
