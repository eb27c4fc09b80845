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
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{error, info, span, warn, Level};

use crate::library::Track;
use crate::playlist::Tape;
use crate::session::{Notice, SessionHandle};
use crate::source::BlobStats;

pub mod keyboard;

/// Controller events that will trigger behavior in the session.
#[derive(Debug, PartialEq, Eq)]
pub enum Event {
    /// Plays the track at the current tape position, or toggles play/pause if it's already
    /// selected.
    PlayPause,

    /// Moves the current tape position to the previous position. If a track is selected, the
    /// track at the new position replaces it.
    Prev,

    /// Moves the current tape position to the next position. If a track is selected, the track
    /// at the new position replaces it.
    Next,

    /// Clears the selected track.
    Stop,

    /// Switches to the all songs tape, which holds every track in the library.
    AllSongs,

    /// Switches to the configured tape.
    Tape,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Controls a media session.
pub struct Controller {
    handle: JoinHandle<()>,
}

/// The tapes the controller navigates.
struct Deck {
    tape: Arc<Tape>,
    all_songs: Arc<Tape>,
    on_tape: bool,
}

impl Deck {
    fn active(&self) -> &Arc<Tape> {
        if self.on_tape {
            &self.tape
        } else {
            &self.all_songs
        }
    }

    fn handle(&mut self, event: Event, session: &SessionHandle) {
        let store = session.store();
        let selected = store.snapshot().selected_id().cloned();

        match event {
            Event::PlayPause => match self.active().current() {
                Some(track) if selected.as_ref() == Some(track.id()) => session.play_pause(),
                Some(track) => store.select_track(track),
                None => warn!(tape = self.active().id(), "Tape is empty."),
            },
            Event::Prev => {
                let track = self.active().prev();
                Deck::cue(session, selected.is_some(), track);
            }
            Event::Next => {
                let track = self.active().next();
                Deck::cue(session, selected.is_some(), track);
            }
            Event::Stop => store.clear_track(),
            Event::AllSongs => {
                self.on_tape = false;
                info!(tape = self.all_songs.id(), "Switched to all songs.");
            }
            Event::Tape => {
                self.on_tape = true;
                info!(tape = self.tape.id(), "Switched to tape.");
            }
        }
    }

    /// Selects the track if something is already selected and it's a different track.
    fn cue(session: &SessionHandle, replace: bool, track: Option<Arc<Track>>) {
        let Some(track) = track else {
            return;
        };
        let store = session.store();
        if replace && store.snapshot().selected_id() != Some(track.id()) {
            store.select_track(track);
        }
    }
}

impl Controller {
    /// Creates a new controller with the given driver.
    pub fn new(
        session: SessionHandle,
        session_join: JoinHandle<BlobStats>,
        notices: mpsc::UnboundedReceiver<Notice>,
        tape: Arc<Tape>,
        all_songs: Arc<Tape>,
        driver: Arc<dyn Driver>,
    ) -> Result<Controller, Box<dyn Error>> {
        let deck = Deck {
            tape,
            all_songs,
            on_tape: true,
        };
        Ok(Controller {
            handle: tokio::spawn(async move {
                Controller::trigger_events(session, session_join, notices, deck, driver).await
            }),
        })
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Drives the session by watching the driver and getting events from it. Notices raised by
    /// the session are reported as they arrive.
    async fn trigger_events(
        session: SessionHandle,
        session_join: JoinHandle<BlobStats>,
        mut notices: mpsc::UnboundedReceiver<Notice>,
        mut deck: Deck,
        driver: Arc<dyn Driver>,
    ) {
        let span = span!(Level::INFO, "controller");
        let _enter = span.enter();

        let (events_tx, mut events_rx) = mpsc::channel(1);
        let join_handle = driver.monitor_events(events_tx);

        info!(
            tape = deck.active().name(),
            first_track = ?deck.active().current().map(|track| track.title().to_string()),
            "Controller started."
        );

        loop {
            tokio::select! {
                event = events_rx.recv() => match event {
                    Some(event) => {
                        info!(event = format!("{:?}", event), "Received event.");
                        deck.handle(event, &session);
                    }
                    None => break,
                },
                Some(notice) = notices.recv() => warn!(notice = %notice, "Playback notice."),
            }
        }

        info!("Controller closing.");
        session.shutdown();
        match session_join.await {
            Ok(stats) => info!(
                created = stats.created,
                revoked = stats.revoked,
                "Media session finished."
            ),
            Err(e) => error!("Error waiting for media session to stop: {}", e),
        }
        match join_handle.await {
            Ok(Err(e)) => error!("Event monitor failed: {}", e),
            Err(e) => error!("Error waiting for event monitor to stop: {}", e),
            Ok(Ok(())) => {}
        }
    }
}
