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
use std::{error::Error, fmt, time::Duration};

use tokio::sync::mpsc;

use crate::config;
use crate::library::TrackId;
use crate::source::BlobRegistry;

pub mod mock;
pub mod speaker;

const MOCK_LIVE: &str = "mock-live";

/// Identifies one load of one track into an output. Every event an output emits carries the tag
/// of the load it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LoadTag {
    track_id: TrackId,
    generation: u64,
}

impl LoadTag {
    pub fn new(track_id: TrackId, generation: u64) -> LoadTag {
        LoadTag {
            track_id,
            generation,
        }
    }

    pub fn track_id(&self) -> &TrackId {
        &self.track_id
    }
}

impl fmt::Display for LoadTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.track_id, self.generation)
    }
}

/// Media element style error codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaErrorCode {
    Aborted,
    Network,
    Decode,
    SourceNotSupported,
}

impl fmt::Display for MediaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MediaErrorCode::Aborted => "aborted",
            MediaErrorCode::Network => "network",
            MediaErrorCode::Decode => "decode",
            MediaErrorCode::SourceNotSupported => "source not supported",
        })
    }
}

/// A failure to fetch, decode, or render the attached source.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("media error ({code}): {message}")]
pub struct MediaError {
    pub code: MediaErrorCode,
    pub message: String,
}

impl MediaError {
    pub fn new(code: MediaErrorCode, message: impl Into<String>) -> MediaError {
        MediaError {
            code,
            message: message.into(),
        }
    }
}

/// Why a play request was rejected.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PlayError {
    /// A newer request superseded this one. Not a failure worth reporting.
    #[error("play request was aborted by a newer request")]
    Aborted,

    #[error("playback is not allowed: {0}")]
    NotAllowed(String),

    #[error("playback is not supported: {0}")]
    Unsupported(String),

    #[error("output is disconnected")]
    Disconnected,
}

/// What happened on an output.
#[derive(Clone, Debug, PartialEq)]
pub enum OutputEventKind {
    /// Enough data is buffered to play through.
    CanPlayThrough,
    /// Playback started.
    Started,
    /// Playback paused.
    Paused,
    /// The duration, in seconds, is known. May be NaN or infinite for streams.
    MetadataReady { duration: f64 },
    /// The playback position moved. Both values are in seconds.
    TimeUpdate { elapsed: f64, duration: f64 },
    /// Playback reached the end of the source.
    Ended,
    /// Loading or playback failed.
    Error(MediaError),
}

/// An event emitted by an output for a particular load.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputEvent {
    pub tag: LoadTag,
    pub kind: OutputEventKind,
}

/// The channel outputs emit their events on.
pub type OutputEvents = mpsc::UnboundedSender<OutputEvent>;

/// The single shared audio rendering primitive. None of these calls block. Outcomes are reported
/// as [OutputEvent]s tagged with the load that was attached when they happened.
///
/// An output reports [OutputEventKind::Started] once for every play request that found it paused
/// and [OutputEventKind::Paused] once for every pause request that found it playing, plus once
/// for every transition it makes on its own.
pub trait Output: fmt::Display + Send {
    /// Attaches a source under the given tag. Loading doesn't start until [Output::load].
    fn attach(&mut self, tag: LoadTag, source: &str);

    /// Removes the attached source, stopping any playback or in-flight load.
    fn detach(&mut self);

    /// Starts loading the attached source.
    fn load(&mut self);

    /// Starts playback.
    fn play(&mut self) -> Result<(), PlayError>;

    /// Pauses playback.
    fn pause(&mut self);

    /// Moves the playback position.
    fn seek(&mut self, position: Duration);
}

impl<O: Output + ?Sized> Output for Box<O> {
    fn attach(&mut self, tag: LoadTag, source: &str) {
        (**self).attach(tag, source)
    }

    fn detach(&mut self) {
        (**self).detach()
    }

    fn load(&mut self) {
        (**self).load()
    }

    fn play(&mut self) -> Result<(), PlayError> {
        (**self).play()
    }

    fn pause(&mut self) {
        (**self).pause()
    }

    fn seek(&mut self, position: Duration) {
        (**self).seek(position)
    }
}

/// Gets an output by name. "mock-live" gets a mock output that plays until it's paused, other
/// names starting with "mock" get one that plays every track through instantly. Anything else
/// opens an audio device.
pub fn get_output(
    name: &str,
    speaker: &config::Speaker,
    registry: BlobRegistry,
    events: OutputEvents,
) -> Result<Box<dyn Output>, Box<dyn Error>> {
    if name == MOCK_LIVE {
        return Ok(Box::new(mock::Output::auto(name, registry, events)));
    }
    if name.starts_with("mock") {
        return Ok(Box::new(mock::Output::playthrough(name, registry, events)));
    }

    Ok(Box::new(speaker::Output::new(
        name,
        speaker.progress_interval()?,
        registry,
        events,
    )?))
}
