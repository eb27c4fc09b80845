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
use std::{
    collections::{HashSet, VecDeque},
    fmt,
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use tracing::{info, span, Level};

use crate::output::{
    LoadTag, MediaError, MediaErrorCode, OutputEvent, OutputEventKind, OutputEvents, PlayError,
};
use crate::source::{BlobRegistry, OBJECT_URL_PREFIX};

const DEFAULT_DURATION_SECS: f64 = 180.0;

/// A primitive call made on the mock.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Attach(LoadTag, String),
    Detach,
    Load,
    Play,
    Pause,
    Seek(Duration),
}

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    /// Emits nothing. Events are injected by whoever drives the session.
    Manual,
    /// Emits the events a real output would for each call.
    Auto,
    /// Like Auto, but every play runs straight through to the end.
    Playthrough,
}

struct State {
    mode: Mode,
    calls: Vec<Call>,
    tag: Option<LoadTag>,
    source: Option<String>,
    playing: bool,
    duration: f64,
    play_errors: VecDeque<PlayError>,
    failing_sources: HashSet<String>,
    /// Live object URLs observed at each attach.
    live_blobs_at_attach: Vec<u64>,
    registry: Option<BlobRegistry>,
    events: Option<OutputEvents>,
}

impl State {
    fn emit(&self, kind: OutputEventKind) {
        if self.mode == Mode::Manual {
            return;
        }
        if let (Some(events), Some(tag)) = (&self.events, &self.tag) {
            // The session may already be gone, which is fine for a mock.
            let _ = events.send(OutputEvent {
                tag: tag.clone(),
                kind,
            });
        }
    }

    fn load_error(&self, source: &str) -> Option<MediaError> {
        if self.failing_sources.contains(source) {
            return Some(MediaError::new(
                MediaErrorCode::SourceNotSupported,
                format!("unable to open {}", source),
            ));
        }
        if source.starts_with(OBJECT_URL_PREFIX) {
            let fetched = self
                .registry
                .as_ref()
                .and_then(|registry| registry.fetch(source));
            if fetched.is_none() {
                return Some(MediaError::new(
                    MediaErrorCode::Network,
                    format!("object URL {} is not live", source),
                ));
            }
        }
        None
    }
}

/// A mock output. Doesn't actually play anything. Clones share state, so a test can keep a
/// clone to inspect what a session did with the one it owns.
#[derive(Clone)]
pub struct Output {
    name: String,
    state: Arc<Mutex<State>>,
}

impl Output {
    /// Gets a mock output that records calls and emits nothing.
    #[cfg(test)]
    pub fn new(name: &str) -> Output {
        Output::with_mode(name, Mode::Manual, None, None)
    }

    /// Gets a mock output that emits events in response to calls.
    pub fn auto(name: &str, registry: BlobRegistry, events: OutputEvents) -> Output {
        Output::with_mode(name, Mode::Auto, Some(registry), Some(events))
    }

    /// Gets a mock output that plays every track to its end as soon as it's asked to play.
    pub fn playthrough(name: &str, registry: BlobRegistry, events: OutputEvents) -> Output {
        Output::with_mode(name, Mode::Playthrough, Some(registry), Some(events))
    }

    fn with_mode(
        name: &str,
        mode: Mode,
        registry: Option<BlobRegistry>,
        events: Option<OutputEvents>,
    ) -> Output {
        Output {
            name: name.to_string(),
            state: Arc::new(Mutex::new(State {
                mode,
                calls: Vec::new(),
                tag: None,
                source: None,
                playing: false,
                duration: DEFAULT_DURATION_SECS,
                play_errors: VecDeque::new(),
                failing_sources: HashSet::new(),
                live_blobs_at_attach: Vec::new(),
                registry,
                events,
            })),
        }
    }

    /// Watches the given registry so attach can record how many object URLs were live.
    #[cfg(test)]
    pub fn with_registry(self, registry: BlobRegistry) -> Output {
        self.state.lock().registry = Some(registry);
        self
    }

    /// Returns every call made so far.
    #[cfg(test)]
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Forgets the calls made so far.
    #[cfg(test)]
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// The tag of the attached load.
    #[cfg(test)]
    pub fn tag(&self) -> Option<LoadTag> {
        self.state.lock().tag.clone()
    }

    /// The attached source.
    #[cfg(test)]
    pub fn source(&self) -> Option<String> {
        self.state.lock().source.clone()
    }

    /// Returns true if the mock is currently playing.
    #[cfg(test)]
    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    /// Rejects the next play request with the given error.
    #[cfg(test)]
    pub fn fail_next_play(&self, err: PlayError) {
        self.state.lock().play_errors.push_back(err);
    }

    /// Makes loads of the given source fail.
    #[cfg(test)]
    pub fn fail_source(&self, source: &str) {
        self.state.lock().failing_sources.insert(source.to_string());
    }

    /// Sets the duration reported for loaded sources.
    #[cfg(test)]
    pub fn set_duration(&self, duration: f64) {
        self.state.lock().duration = duration;
    }

    /// Live object URL counts, one per attach.
    #[cfg(test)]
    pub fn live_blobs_at_attach(&self) -> Vec<u64> {
        self.state.lock().live_blobs_at_attach.clone()
    }

    /// Plays the attached source to its end.
    #[cfg(test)]
    pub fn finish(&self) {
        let mut state = self.state.lock();
        state.playing = false;
        let duration = state.duration;
        state.emit(OutputEventKind::TimeUpdate {
            elapsed: duration,
            duration,
        });
        state.emit(OutputEventKind::Ended);
    }
}

impl crate::output::Output for Output {
    fn attach(&mut self, tag: LoadTag, source: &str) {
        let mut state = self.state.lock();
        state.calls.push(Call::Attach(tag.clone(), source.to_string()));
        let live = state
            .registry
            .as_ref()
            .map(|registry| registry.stats().live())
            .unwrap_or_default();
        state.live_blobs_at_attach.push(live);
        state.tag = Some(tag);
        state.source = Some(source.to_string());
        state.playing = false;
    }

    fn detach(&mut self) {
        let mut state = self.state.lock();
        state.calls.push(Call::Detach);
        state.tag = None;
        state.source = None;
        state.playing = false;
    }

    fn load(&mut self) {
        let mut state = self.state.lock();
        state.calls.push(Call::Load);
        let Some(source) = state.source.clone() else {
            return;
        };

        match state.load_error(&source) {
            Some(err) => state.emit(OutputEventKind::Error(err)),
            None => {
                let duration = state.duration;
                state.emit(OutputEventKind::MetadataReady { duration });
                state.emit(OutputEventKind::CanPlayThrough);
            }
        }
    }

    fn play(&mut self) -> Result<(), PlayError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Play);
        if let Some(err) = state.play_errors.pop_front() {
            return Err(err);
        }
        if state.source.is_none() {
            return Err(PlayError::Unsupported("no source is attached".to_string()));
        }
        if state.playing {
            return Ok(());
        }

        state.playing = true;
        info!(
            output = self.name,
            source = state.source.as_deref(),
            "Playing (mock)."
        );
        state.emit(OutputEventKind::Started);

        if state.mode == Mode::Playthrough {
            let span = span!(Level::INFO, "play through (mock)");
            let _enter = span.enter();

            let duration = state.duration;
            state.playing = false;
            state.emit(OutputEventKind::TimeUpdate {
                elapsed: duration / 2.0,
                duration,
            });
            state.emit(OutputEventKind::TimeUpdate {
                elapsed: duration,
                duration,
            });
            state.emit(OutputEventKind::Ended);
        }
        Ok(())
    }

    fn pause(&mut self) {
        let mut state = self.state.lock();
        state.calls.push(Call::Pause);
        if state.playing {
            state.playing = false;
            state.emit(OutputEventKind::Paused);
        }
    }

    fn seek(&mut self, position: Duration) {
        let mut state = self.state.lock();
        state.calls.push(Call::Seek(position));
        let duration = state.duration;
        state.emit(OutputEventKind::TimeUpdate {
            elapsed: position.as_secs_f64(),
            duration,
        });
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
