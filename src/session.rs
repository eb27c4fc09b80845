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
use std::{fmt, sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, error, info, span, warn, Level, Span};

use crate::library::{Track, TrackId};
use crate::output::{LoadTag, MediaError, Output, OutputEvent, OutputEventKind, PlayError};
use crate::source::{BlobStats, ResolvedSource, SourceResolver};
use crate::store::PlaybackStore;

pub use telemetry::Telemetry;

mod telemetry;
#[cfg(test)]
mod tests;

/// Where the bound track is in its life.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Nothing is bound.
    Idle,
    /// The source is attached and loading.
    Loading,
    /// The source can play through but isn't playing.
    Ready,
    Playing,
    Paused,
    /// Playback reached the end of the source.
    Ended,
    /// The source failed to load or play.
    Errored,
}

/// An advisory message for the user. Nothing else is reported across the session boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub track_title: Option<String>,
    pub message: String,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.track_title {
            Some(title) => write!(f, "{}: {}", title, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Commands accepted by a running session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionCommand {
    /// The main play/pause button.
    PlayPause,
    /// Stops the session.
    Shutdown,
}

/// The track currently attached to the output. Dropping a binding releases its source.
struct Binding {
    tag: LoadTag,
    title: String,
    source: Option<ResolvedSource>,
}

/// Keeps a single output in step with a playback store. Selection changes rebind the output,
/// intent changes start and pause it, and output events flow back into the telemetry and, when
/// the output changes state on its own, into the store.
pub struct MediaSession<O: Output> {
    output: O,
    store: PlaybackStore,
    resolver: SourceResolver,
    binding: Option<Binding>,
    phase: Phase,
    /// The selection seen by the last reconciliation.
    observed: Option<TrackId>,
    generation: u64,
    /// Play requests whose Started hasn't come back yet.
    pending_starts: u32,
    /// Pause requests whose Paused hasn't come back yet.
    pending_pauses: u32,
    telemetry: watch::Sender<Telemetry>,
    notices: mpsc::UnboundedSender<Notice>,
    span: Span,
}

impl<O: Output> MediaSession<O> {
    /// Creates a new session. Nothing happens until the session reconciles or runs.
    pub fn new(
        output: O,
        store: PlaybackStore,
        resolver: SourceResolver,
        notices: mpsc::UnboundedSender<Notice>,
    ) -> MediaSession<O> {
        let (telemetry, _) = watch::channel(Telemetry::default());
        MediaSession {
            output,
            store,
            resolver,
            binding: None,
            phase: Phase::Idle,
            observed: None,
            generation: 0,
            pending_starts: 0,
            pending_pauses: 0,
            telemetry,
            notices,
            span: span!(Level::INFO, "media session"),
        }
    }

    #[cfg(test)]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Subscribes to the displayed playback telemetry.
    pub fn telemetry(&self) -> watch::Receiver<Telemetry> {
        self.telemetry.subscribe()
    }

    /// The output this session drives.
    #[cfg(test)]
    pub fn output(&self) -> &O {
        &self.output
    }

    /// Brings the output in line with the store: rebinds it if the selection changed, then
    /// starts or pauses it to match the intent.
    pub fn reconcile(&mut self) {
        let span = self.span.clone();
        let _enter = span.enter();

        let state = self.store.snapshot();
        let selected_id = state.selected_id().cloned();
        if selected_id != self.observed {
            self.observed = selected_id;
            match state.selected() {
                Some(track) => self.bind(Arc::clone(track)),
                None => self.unbind(),
            }
        }

        self.reconcile_intent();
    }

    /// Handles an event from the output. Events issued under any load but the current one are
    /// dropped.
    pub fn handle_output_event(&mut self, event: OutputEvent) {
        let span = self.span.clone();
        let _enter = span.enter();

        let current = self.binding.as_ref().map(|binding| &binding.tag);
        if current != Some(&event.tag) {
            debug!(
                tag = %event.tag,
                event = ?event.kind,
                "Discarding event for a stale load."
            );
            return;
        }
        // The binding trails the store until the next reconcile.
        if self.store.snapshot().selected_id() != Some(event.tag.track_id()) {
            debug!(
                tag = %event.tag,
                event = ?event.kind,
                "Discarding event for a track that is no longer selected."
            );
            return;
        }

        match event.kind {
            OutputEventKind::CanPlayThrough => {
                if self.phase == Phase::Loading {
                    debug!(tag = %event.tag, "Source can play through.");
                    self.set_phase(Phase::Ready);
                }
            }
            OutputEventKind::Started => {
                if self.pending_starts > 0 {
                    self.pending_starts -= 1;
                } else {
                    info!(tag = %event.tag, "Output started on its own.");
                    self.set_phase(Phase::Playing);
                    if !self.store.snapshot().intent() {
                        self.correct_intent(true);
                    }
                }
            }
            OutputEventKind::Paused => {
                if self.pending_pauses > 0 {
                    self.pending_pauses -= 1;
                } else {
                    info!(tag = %event.tag, "Output paused on its own.");
                    let previous = self.phase;
                    self.set_phase(Phase::Paused);
                    if self.store.snapshot().intent()
                        && previous != Phase::Ended
                        && previous != Phase::Loading
                    {
                        self.correct_intent(false);
                    }
                }
            }
            OutputEventKind::MetadataReady { duration } => {
                self.update_telemetry(|telemetry| telemetry.set_duration(duration));
            }
            OutputEventKind::TimeUpdate { elapsed, duration } => {
                let attached = self
                    .binding
                    .as_ref()
                    .is_some_and(|binding| binding.source.is_some());
                self.update_telemetry(|telemetry| {
                    telemetry.set_progress(elapsed, duration, attached)
                });
            }
            OutputEventKind::Ended => {
                info!(tag = %event.tag, "Track ended.");
                self.pending_starts = 0;
                self.pending_pauses = 0;
                self.set_phase(Phase::Ended);
                self.update_telemetry(|telemetry| telemetry.progress_percent = 100.0);
                if self.store.snapshot().intent() {
                    self.correct_intent(false);
                }
            }
            OutputEventKind::Error(err) => self.fail(err),
        }

        self.reconcile_intent();
    }

    /// The main play/pause button. A finished track is rewound first so that playing it again
    /// starts from the top.
    pub fn play_pause(&mut self) {
        let span = self.span.clone();
        let _enter = span.enter();

        let state = self.store.snapshot();
        if state.selected().is_none() || self.phase == Phase::Loading {
            debug!(phase = ?self.phase, "Ignoring play/pause.");
            return;
        }

        if self.phase == Phase::Ended && !state.intent() {
            self.rewind();
            self.set_phase(Phase::Paused);
        }
        self.store.toggle_playback_intent();
        self.reconcile();
    }

    /// Runs the session until it's shut down or every command sender is gone. Returns the object
    /// URL statistics after the last binding is released.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
        mut events: mpsc::UnboundedReceiver<OutputEvent>,
    ) -> BlobStats {
        let mut state_rx = self.store.subscribe();
        state_rx.borrow_and_update();
        self.reconcile();

        info!("Media session started.");
        loop {
            tokio::select! {
                biased;

                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    state_rx.borrow_and_update();
                    self.reconcile();
                }
                Some(event) = events.recv() => self.handle_output_event(event),
                command = commands.recv() => match command {
                    Some(SessionCommand::PlayPause) => self.play_pause(),
                    Some(SessionCommand::Shutdown) | None => break,
                },
            }
        }

        self.shutdown()
    }

    /// Releases the output and returns the object URL statistics.
    pub fn shutdown(mut self) -> BlobStats {
        let span = self.span.clone();
        let _enter = span.enter();

        self.release();
        self.set_phase(Phase::Idle);
        let stats = self.resolver.registry().stats();
        info!(
            created = stats.created,
            revoked = stats.revoked,
            "Media session stopped."
        );
        stats
    }

    fn bind(&mut self, track: Arc<Track>) {
        self.release();
        self.update_telemetry(Telemetry::reset_position);
        self.generation += 1;
        let tag = LoadTag::new(track.id().clone(), self.generation);

        let Some(source) = self.resolver.resolve(&track) else {
            warn!(track = track.id().as_str(), "Track has no playable source.");
            self.binding = Some(Binding {
                tag,
                title: track.title().to_string(),
                source: None,
            });
            self.set_phase(Phase::Errored);
            if self.store.snapshot().intent() {
                self.correct_intent(false);
            }
            self.notify("could not load: the track has no playable source".to_string());
            return;
        };

        info!(tag = %tag, source = source.url(), "Loading track.");
        self.output.attach(tag.clone(), source.url());
        self.binding = Some(Binding {
            tag,
            title: track.title().to_string(),
            source: Some(source),
        });
        self.set_phase(Phase::Loading);
        self.output.load();
    }

    fn unbind(&mut self) {
        self.release();
        self.update_telemetry(Telemetry::reset_position);
        if self.store.snapshot().intent() {
            self.correct_intent(false);
        }
        self.set_phase(Phase::Idle);
    }

    /// Stops the output and drops the binding, which revokes any object URL it holds.
    fn release(&mut self) {
        if let Some(binding) = self.binding.take() {
            debug!(tag = %binding.tag, "Releasing binding.");
            if binding.source.is_some() {
                self.output.pause();
                self.output.detach();
            }
        }
        self.pending_starts = 0;
        self.pending_pauses = 0;
    }

    /// Starts or pauses the bound track to match the intent.
    fn reconcile_intent(&mut self) {
        let state = self.store.snapshot();
        let Some(binding) = &self.binding else {
            return;
        };
        if state.selected_id() != Some(binding.tag.track_id()) || self.phase == Phase::Loading {
            return;
        }

        match (state.intent(), self.phase) {
            (true, Phase::Ready | Phase::Paused) => self.start(),
            (true, Phase::Ended) => {
                self.rewind();
                self.start();
            }
            (true, Phase::Errored) => {
                debug!("Bound track is errored, turning intent back off.");
                self.store.set_playback_intent(false);
            }
            (false, Phase::Playing) => {
                self.output.pause();
                self.pending_pauses += 1;
                self.set_phase(Phase::Paused);
            }
            _ => {}
        }
    }

    fn start(&mut self) {
        match self.output.play() {
            Ok(()) => {
                self.pending_starts += 1;
                self.set_phase(Phase::Playing);
            }
            Err(PlayError::Aborted) => debug!("Play request was aborted."),
            Err(err) => {
                error!(err = %err, "Unable to start playback.");
                self.correct_intent(false);
                self.notify(format!("could not start playback: {}", err));
            }
        }
    }

    fn rewind(&mut self) {
        self.output.seek(Duration::ZERO);
        self.update_telemetry(|telemetry| {
            telemetry.elapsed_display = telemetry::ZERO_DISPLAY.to_string();
            telemetry.progress_percent = 0.0;
        });
    }

    fn fail(&mut self, err: MediaError) {
        let message = if self.phase == Phase::Loading {
            format!("could not load: {}", err.message)
        } else {
            format!("error playing: {}", err.message)
        };
        error!(err = %err, phase = ?self.phase, "Output reported an error.");

        self.pending_starts = 0;
        self.pending_pauses = 0;
        self.set_phase(Phase::Errored);
        if self.store.snapshot().intent() {
            self.correct_intent(false);
        }
        self.update_telemetry(Telemetry::reset_position);
        self.notify(message);
    }

    fn correct_intent(&self, playing: bool) {
        info!(playing, "Correcting playback intent.");
        self.store.set_playback_intent(playing);
    }

    fn notify(&self, message: String) {
        let notice = Notice {
            track_title: self.binding.as_ref().map(|binding| binding.title.clone()),
            message,
        };
        if self.notices.send(notice).is_err() {
            debug!("Nobody is listening for notices.");
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!(from = ?self.phase, to = ?phase, "Phase change.");
        }
        self.phase = phase;
        self.update_telemetry(|telemetry| {
            telemetry.is_loading = phase == Phase::Loading;
            telemetry.is_playing = phase == Phase::Playing;
        });
    }

    fn update_telemetry(&self, update: impl FnOnce(&mut Telemetry)) {
        self.telemetry.send_if_modified(|telemetry| {
            let before = telemetry.clone();
            update(telemetry);
            *telemetry != before
        });
    }
}

impl<O: Output + 'static> MediaSession<O> {
    /// Spawns the session onto the runtime.
    pub fn spawn(
        self,
        events: mpsc::UnboundedReceiver<OutputEvent>,
    ) -> (SessionHandle, JoinHandle<BlobStats>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let handle = SessionHandle {
            commands: commands_tx,
            telemetry: self.telemetry(),
            store: self.store.clone(),
        };
        (handle, tokio::spawn(self.run(commands_rx, events)))
    }
}

/// A clonable front end for a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    telemetry: watch::Receiver<Telemetry>,
    store: PlaybackStore,
}

impl SessionHandle {
    /// Presses play/pause.
    pub fn play_pause(&self) {
        self.send(SessionCommand::PlayPause);
    }

    /// Asks the session to stop.
    pub fn shutdown(&self) {
        self.send(SessionCommand::Shutdown);
    }

    pub fn telemetry(&self) -> watch::Receiver<Telemetry> {
        self.telemetry.clone()
    }

    pub fn store(&self) -> &PlaybackStore {
        &self.store
    }

    fn send(&self, command: SessionCommand) {
        if self.commands.send(command).is_err() {
            warn!(command = ?command, "Media session is no longer running.");
        }
    }
}
