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
use std::path::Path;

use config::{Config, File};
use serde::Deserialize;

use super::error::ConfigError;

/// The configuration for a track library.
#[derive(Deserialize)]
pub struct Library {
    /// The tracks, in display order.
    tracks: Vec<Track>,
    /// Named track lists.
    #[serde(default)]
    tapes: Vec<Tape>,
}

/// A track entry in a library file.
#[derive(Deserialize)]
struct Track {
    id: String,
    title: String,
    artist: String,
    album: String,
    /// The display duration, e.g. "3:45".
    #[serde(default)]
    duration: String,
    #[serde(default)]
    album_art_url: String,
    genre: Option<String>,
    bpm: Option<u32>,
    /// Where the audio lives. Tracks without a path are listed but can't be played.
    path: Option<String>,
}

/// A named list of track ids.
#[derive(Deserialize)]
pub struct Tape {
    id: String,
    name: String,
    description: Option<String>,
    songs: Vec<String>,
}

impl Library {
    /// Parse a library from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Library, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Library>()?)
    }

    /// Builds the track library. Relative track paths are resolved against the given directory.
    pub fn to_library(&self, base: &Path) -> Result<crate::library::Library, ConfigError> {
        let tracks = self
            .tracks
            .iter()
            .map(|track| {
                let mut built = crate::library::Track::new(
                    track.id.as_str(),
                    &track.title,
                    &track.artist,
                    &track.album,
                )
                .with_duration(&track.duration)
                .with_album_art_url(&track.album_art_url)
                .with_genre(track.genre.clone())
                .with_bpm(track.bpm);
                if let Some(path) = &track.path {
                    built = built.with_path(resolve_path(base, path));
                }
                built
            })
            .collect();

        Ok(crate::library::Library::new(tracks)?)
    }

    pub fn tapes(&self) -> &[Tape] {
        &self.tapes
    }
}

impl Tape {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn songs(&self) -> &[String] {
        &self.songs
    }
}

/// Resolves a path relative to the given directory. URLs and absolute paths are left alone.
pub(super) fn resolve_path(base: &Path, path: &str) -> String {
    if path.contains("://") || Path::new(path).is_absolute() {
        return path.to_string();
    }
    base.join(path).to_string_lossy().into_owned()
}
