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
use super::speaker::Speaker;

/// The configuration for the player.
#[derive(Deserialize)]
pub struct Player {
    /// The output to play through: "default", part of a device name, or a mock.
    output: String,
    /// The path to the library file. Relative paths are relative to this file.
    library: String,
    /// The tape to start on. Defaults to every track in the library.
    tape: Option<String>,
    /// Speaker output settings.
    speaker: Option<Speaker>,
}

impl Player {
    /// Parse a player configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Player, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Player>()?)
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn library(&self) -> &str {
        &self.library
    }

    pub fn tape(&self) -> Option<&str> {
        self.tape.as_deref()
    }

    /// Returns the speaker settings, or the defaults if none were given.
    pub fn speaker(&self) -> Speaker {
        self.speaker.clone().unwrap_or_default()
    }
}
