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
use std::{error::Error, sync::Arc, time::Duration};

use tokio::sync::{mpsc, watch};

use crate::library::{FileBlob, Track};
use crate::output::{
    mock::{self, Call},
    LoadTag, MediaError, MediaErrorCode, OutputEvent, OutputEventKind, PlayError,
};
use crate::source::{BlobRegistry, BlobStats, SourceResolver};
use crate::store::PlaybackStore;
use crate::test::eventually;

use super::{MediaSession, Notice, Phase, Telemetry};

/// A session wired to a manual mock output. Output events are injected by the test.
struct Harness {
    session: MediaSession<mock::Output>,
    output: mock::Output,
    store: PlaybackStore,
    registry: BlobRegistry,
    telemetry: watch::Receiver<Telemetry>,
    notices: mpsc::UnboundedReceiver<Notice>,
}

impl Harness {
    fn new() -> Harness {
        let registry = BlobRegistry::new();
        let output = mock::Output::new("mock-output").with_registry(registry.clone());
        let store = PlaybackStore::new();
        let (notices_tx, notices) = mpsc::unbounded_channel();
        let session = MediaSession::new(
            output.clone(),
            store.clone(),
            SourceResolver::new(registry.clone()),
            notices_tx,
        );
        let telemetry = session.telemetry();

        Harness {
            session,
            output,
            store,
            registry,
            telemetry,
            notices,
        }
    }

    fn select(&mut self, track: Track) {
        self.store.select_track(Arc::new(track));
        self.session.reconcile();
    }

    /// Emits an event under the currently attached load.
    fn emit(&mut self, kind: OutputEventKind) {
        let tag = self.output.tag().expect("a source should be attached");
        self.emit_for(tag, kind);
    }

    fn emit_for(&mut self, tag: LoadTag, kind: OutputEventKind) {
        self.session
            .handle_output_event(OutputEvent { tag, kind });
    }

    /// Loads the attached source, which starts it playing if the intent is set.
    fn ready(&mut self) {
        self.emit(OutputEventKind::MetadataReady { duration: 180.0 });
        self.emit(OutputEventKind::CanPlayThrough);
    }

    /// Loads and starts the attached source.
    fn playing(&mut self) {
        self.ready();
        self.emit(OutputEventKind::Started);
    }

    fn telemetry(&self) -> Telemetry {
        self.telemetry.borrow().clone()
    }

    fn intent(&self) -> bool {
        self.store.snapshot().intent()
    }

    fn notices(&mut self) -> Vec<Notice> {
        std::iter::from_fn(|| self.notices.try_recv().ok()).collect()
    }

    fn count(&self, call: &Call) -> usize {
        self.output.calls().iter().filter(|c| *c == call).count()
    }
}

fn path_track(id: &str, path: &str) -> Track {
    Track::new(id, &format!("Title {}", id), "Artist", "Album").with_path(path)
}

fn file_track(id: &str) -> Track {
    Track::new(id, &format!("Title {}", id), "Artist", "Album")
        .with_file(FileBlob::new(format!("{}.wav", id), vec![0u8; 64]))
}

fn tag(id: &str, generation: u64) -> LoadTag {
    LoadTag::new(id.into(), generation)
}

#[test]
fn test_select_path_track_plays() {
    let mut h = Harness::new();
    h.select(path_track("s1", "/audio/a.mp3"));

    assert_eq!(
        vec![
            Call::Attach(tag("s1", 1), "/audio/a.mp3".to_string()),
            Call::Load
        ],
        h.output.calls()
    );
    assert!(h.intent());
    assert_eq!(Phase::Loading, h.session.phase());
    assert!(h.telemetry().is_loading);

    h.ready();
    assert_eq!(Some(&Call::Play), h.output.calls().last());
    assert!(h.output.is_playing());
    assert_eq!(Phase::Playing, h.session.phase());

    h.emit(OutputEventKind::Started);
    h.emit(OutputEventKind::TimeUpdate {
        elapsed: 90.0,
        duration: 180.0,
    });

    let telemetry = h.telemetry();
    assert!(!telemetry.is_loading);
    assert!(telemetry.is_playing);
    assert_eq!("1:30", telemetry.elapsed_display);
    assert_eq!("3:00", telemetry.duration_display);
    assert_eq!(50.0, telemetry.progress_percent);
    assert!(h.notices().is_empty());
}

#[test]
fn test_reselect_before_load_releases_file() {
    let mut h = Harness::new();
    h.select(file_track("s2"));
    let url = h.output.source().expect("object URL should be attached");
    assert_eq!(1, h.registry.stats().live());

    h.select(path_track("s3", "/audio/c.mp3"));
    assert_eq!(
        vec![
            Call::Attach(tag("s2", 1), url.clone()),
            Call::Load,
            Call::Pause,
            Call::Detach,
            Call::Attach(tag("s3", 2), "/audio/c.mp3".to_string()),
            Call::Load,
        ],
        h.output.calls()
    );
    assert_eq!(
        BlobStats {
            created: 1,
            revoked: 1
        },
        h.registry.stats()
    );
    assert!(h.registry.fetch(&url).is_none());

    // s2 becoming ready late does nothing.
    h.emit_for(tag("s2", 1), OutputEventKind::CanPlayThrough);
    assert_eq!(0, h.count(&Call::Play));
    assert_eq!(Phase::Loading, h.session.phase());

    h.emit(OutputEventKind::CanPlayThrough);
    assert_eq!(1, h.count(&Call::Play));
    assert_eq!(Phase::Playing, h.session.phase());
}

#[test]
fn test_teardown_precedes_next_attach() {
    let mut h = Harness::new();
    h.select(file_track("s2"));
    h.playing();
    h.select(file_track("s5"));

    // Only the new object URL was live when s5 attached.
    assert_eq!(vec![1, 1], h.output.live_blobs_at_attach());
    assert_eq!(
        BlobStats {
            created: 2,
            revoked: 1
        },
        h.registry.stats()
    );

    let calls = h.output.calls();
    let second_attach = calls
        .iter()
        .rposition(|call| matches!(call, Call::Attach(..)))
        .expect("s5 should be attached");
    assert_eq!(
        &[Call::Pause, Call::Detach],
        &calls[second_attach - 2..second_attach]
    );
    assert_eq!(1, h.count(&Call::Detach));
}

#[test]
fn test_load_error() {
    let mut h = Harness::new();
    h.select(path_track("s4", "/audio/missing.mp3"));
    h.emit(OutputEventKind::MetadataReady { duration: 200.0 });
    h.emit(OutputEventKind::Error(MediaError::new(
        MediaErrorCode::SourceNotSupported,
        "unable to open /audio/missing.mp3",
    )));

    assert!(!h.intent());
    assert_eq!(Phase::Errored, h.session.phase());
    let telemetry = h.telemetry();
    assert_eq!("0:00", telemetry.elapsed_display);
    assert_eq!("0:00", telemetry.duration_display);
    assert_eq!(0.0, telemetry.progress_percent);
    assert!(!telemetry.is_loading);
    assert!(!telemetry.is_playing);

    let notices = h.notices();
    assert_eq!(1, notices.len());
    assert_eq!(Some("Title s4".to_string()), notices[0].track_title);
    assert!(notices[0].message.starts_with("could not load"));

    // Asking an errored track to play is turned back off without another notice.
    h.store.set_playback_intent(true);
    h.session.reconcile();
    assert!(!h.intent());
    assert!(h.notices().is_empty());
    assert_eq!(0, h.count(&Call::Play));
}

#[test]
fn test_runtime_error() {
    let mut h = Harness::new();
    h.select(path_track("s1", "/audio/a.mp3"));
    h.playing();
    h.emit(OutputEventKind::Error(MediaError::new(
        MediaErrorCode::Decode,
        "corrupt frame",
    )));

    assert!(!h.intent());
    let notices = h.notices();
    assert_eq!(1, notices.len());
    assert!(notices[0].message.starts_with("error playing"));
}

#[test]
fn test_track_without_source() {
    let mut h = Harness::new();
    h.select(Track::new("s6", "Nothing", "Artist", "Album"));

    assert!(h.output.calls().is_empty());
    assert_eq!(Phase::Errored, h.session.phase());
    assert!(!h.intent());
    let notices = h.notices();
    assert_eq!(1, notices.len());
    assert_eq!(Some("Nothing".to_string()), notices[0].track_title);
    assert!(notices[0].message.starts_with("could not load"));

    h.session.play_pause();
    h.session.reconcile();
    assert!(!h.intent());
    assert!(h.notices().is_empty());
    assert!(h.output.calls().is_empty());
}

#[test]
fn test_ended_does_not_advance() {
    let mut h = Harness::new();
    h.select(path_track("s1", "/audio/a.mp3"));
    h.playing();
    h.emit(OutputEventKind::TimeUpdate {
        elapsed: 180.0,
        duration: 180.0,
    });
    h.emit(OutputEventKind::Ended);

    assert!(!h.intent());
    assert_eq!(Phase::Ended, h.session.phase());
    let telemetry = h.telemetry();
    assert_eq!(100.0, telemetry.progress_percent);
    assert_eq!("3:00", telemetry.elapsed_display);
    assert!(!telemetry.is_playing);

    assert_eq!(
        Some("s1"),
        h.store.snapshot().selected_id().map(|id| id.as_str())
    );
    assert_eq!(
        1,
        h.output
            .calls()
            .iter()
            .filter(|call| matches!(call, Call::Attach(..)))
            .count()
    );
}

#[test]
fn test_replay_after_end_rewinds() {
    let mut h = Harness::new();
    h.select(path_track("s1", "/audio/a.mp3"));
    h.playing();
    h.emit(OutputEventKind::Ended);
    h.output.clear_calls();

    h.session.play_pause();
    assert_eq!(vec![Call::Seek(Duration::ZERO), Call::Play], h.output.calls());
    assert!(h.intent());
    let telemetry = h.telemetry();
    assert_eq!("0:00", telemetry.elapsed_display);
    assert_eq!(0.0, telemetry.progress_percent);
    assert!(telemetry.is_playing);
}

#[test]
fn test_intent_after_end_rewinds() {
    let mut h = Harness::new();
    h.select(path_track("s1", "/audio/a.mp3"));
    h.playing();
    h.emit(OutputEventKind::Ended);
    h.output.clear_calls();

    h.store.set_playback_intent(true);
    h.session.reconcile();
    assert_eq!(vec![Call::Seek(Duration::ZERO), Call::Play], h.output.calls());
    assert_eq!(0.0, h.telemetry().progress_percent);
}

#[test]
fn test_toggle_without_selection() {
    let mut h = Harness::new();
    h.store.toggle_playback_intent();
    h.session.reconcile();
    h.session.play_pause();

    assert!(!h.intent());
    assert!(h.output.calls().is_empty());
    assert_eq!(Telemetry::default(), h.telemetry());
    assert_eq!(Phase::Idle, h.session.phase());
}

#[test]
fn test_play_pause_ignored_while_loading() {
    let mut h = Harness::new();
    h.select(path_track("s1", "/audio/a.mp3"));
    h.session.play_pause();
    assert!(h.intent());
    assert_eq!(Phase::Loading, h.session.phase());
}

#[test]
fn test_play_pause_toggles() {
    let mut h = Harness::new();
    h.select(path_track("s1", "/audio/a.mp3"));
    h.playing();
    h.output.clear_calls();

    h.session.play_pause();
    assert!(!h.intent());
    assert_eq!(vec![Call::Pause], h.output.calls());
    h.emit(OutputEventKind::Paused);
    assert!(!h.intent());

    h.session.play_pause();
    assert!(h.intent());
    assert_eq!(vec![Call::Pause, Call::Play], h.output.calls());
}

#[test]
fn test_set_intent_twice() {
    let mut h = Harness::new();
    h.select(path_track("s1", "/audio/a.mp3"));
    h.playing();
    h.output.clear_calls();

    h.store.set_playback_intent(true);
    h.store.set_playback_intent(true);
    h.session.reconcile();
    assert!(h.output.calls().is_empty());

    h.store.set_playback_intent(false);
    h.session.reconcile();
    h.store.set_playback_intent(false);
    h.session.reconcile();
    assert_eq!(vec![Call::Pause], h.output.calls());
}

#[test]
fn test_clear_track() {
    let mut h = Harness::new();
    h.select(file_track("s2"));
    h.playing();
    h.emit(OutputEventKind::TimeUpdate {
        elapsed: 45.0,
        duration: 180.0,
    });
    h.output.clear_calls();

    h.store.clear_track();
    h.session.reconcile();
    assert_eq!(vec![Call::Pause, Call::Detach], h.output.calls());
    assert_eq!(Phase::Idle, h.session.phase());
    assert!(!h.intent());
    assert_eq!(Telemetry::default(), h.telemetry());
    assert_eq!(0, h.registry.stats().live());
}

#[test]
fn test_stale_telemetry_ignored() {
    let mut h = Harness::new();
    h.select(path_track("s1", "/audio/a.mp3"));
    h.playing();
    h.select(path_track("s3", "/audio/c.mp3"));

    let before = h.telemetry();
    h.emit_for(
        tag("s1", 1),
        OutputEventKind::TimeUpdate {
            elapsed: 170.0,
            duration: 180.0,
        },
    );
    h.emit_for(tag("s1", 1), OutputEventKind::Ended);
    assert_eq!(before, h.telemetry());
    assert!(h.intent());
}

#[test]
fn test_events_after_reselect_leave_new_intent() {
    let mut h = Harness::new();
    h.select(path_track("s1", "/audio/a.mp3"));
    h.playing();
    h.output.clear_calls();

    // s3 is selected, but the session hasn't caught up with the store yet.
    h.store.select_track(Arc::new(path_track("s3", "/audio/c.mp3")));
    h.emit_for(tag("s1", 1), OutputEventKind::Paused);
    h.emit_for(
        tag("s1", 1),
        OutputEventKind::Error(MediaError::new(
            MediaErrorCode::Decode,
            "corrupt frame in /audio/a.mp3",
        )),
    );
    h.emit_for(tag("s1", 1), OutputEventKind::Ended);
    assert!(h.intent());
    assert!(h.notices().is_empty());
    assert_eq!(Phase::Playing, h.session.phase());

    h.session.reconcile();
    assert_eq!(Phase::Loading, h.session.phase());
    h.ready();
    assert_eq!(1, h.count(&Call::Play));
    assert_eq!(Phase::Playing, h.session.phase());
    assert!(h.intent());
}

#[test]
fn test_events_after_clear_are_dropped() {
    let mut h = Harness::new();
    h.select(path_track("s1", "/audio/a.mp3"));
    h.playing();

    h.store.clear_track();
    h.emit_for(
        tag("s1", 1),
        OutputEventKind::Error(MediaError::new(MediaErrorCode::Network, "stream dropped")),
    );
    assert!(h.notices().is_empty());

    h.session.reconcile();
    assert_eq!(Phase::Idle, h.session.phase());
    assert!(!h.intent());
}

#[test]
fn test_external_pause_clears_intent() {
    let mut h = Harness::new();
    h.select(path_track("s1", "/audio/a.mp3"));
    h.playing();
    h.output.clear_calls();

    h.emit(OutputEventKind::Paused);
    assert!(!h.intent());
    assert_eq!(Phase::Paused, h.session.phase());
    assert!(!h.telemetry().is_playing);

    h.session.reconcile();
    assert!(h.output.calls().is_empty());
}

#[test]
fn test_external_play_sets_intent() {
    let mut h = Harness::new();
    h.select(path_track("s1", "/audio/a.mp3"));
    h.playing();
    h.store.set_playback_intent(false);
    h.session.reconcile();
    h.emit(OutputEventKind::Paused);
    assert!(!h.intent());
    h.output.clear_calls();

    h.emit(OutputEventKind::Started);
    assert!(h.intent());
    assert!(h.telemetry().is_playing);
    h.session.reconcile();
    assert!(h.output.calls().is_empty());
}

#[test]
fn test_autoplay_rejected() {
    let mut h = Harness::new();
    h.output
        .fail_next_play(PlayError::NotAllowed("autoplay blocked".to_string()));
    h.select(path_track("s1", "/audio/a.mp3"));
    h.ready();

    assert!(!h.intent());
    assert_eq!(Phase::Ready, h.session.phase());
    let notices = h.notices();
    assert_eq!(1, notices.len());
    assert!(notices[0].message.contains("autoplay blocked"));

    h.session.reconcile();
    assert!(h.notices().is_empty());

    // The user can still start it.
    h.session.play_pause();
    assert!(h.intent());
    assert!(h.output.is_playing());
}

#[test]
fn test_aborted_play_is_quiet() {
    let mut h = Harness::new();
    h.output.fail_next_play(PlayError::Aborted);
    h.select(path_track("s1", "/audio/a.mp3"));
    h.ready();

    assert!(h.intent());
    assert!(h.notices().is_empty());
    assert!(!h.output.is_playing());
}

#[test]
fn test_shutdown_revokes() {
    let mut h = Harness::new();
    h.select(file_track("s2"));
    h.playing();

    let Harness {
        session,
        output,
        registry,
        ..
    } = h;
    let stats = session.shutdown();
    assert_eq!(
        BlobStats {
            created: 1,
            revoked: 1
        },
        stats
    );
    assert_eq!(stats, registry.stats());
    assert_eq!(Some(&Call::Detach), output.calls().last());
}

#[test]
fn test_drop_revokes() {
    let mut h = Harness::new();
    h.select(file_track("s2"));

    let Harness {
        session, registry, ..
    } = h;
    assert_eq!(1, registry.stats().live());
    drop(session);
    assert_eq!(
        BlobStats {
            created: 1,
            revoked: 1
        },
        registry.stats()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_run() -> Result<(), Box<dyn Error>> {
    let registry = BlobRegistry::new();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (notices_tx, _notices_rx) = mpsc::unbounded_channel();
    let output = mock::Output::auto("mock-live", registry.clone(), events_tx);
    let store = PlaybackStore::new();
    let session = MediaSession::new(
        output.clone(),
        store.clone(),
        SourceResolver::new(registry.clone()),
        notices_tx,
    );

    let (handle, join) = session.spawn(events_rx);
    let telemetry = handle.telemetry();

    handle.store().select_track(Arc::new(file_track("s2")));
    eventually(
        || telemetry.borrow().is_playing && output.is_playing(),
        "Track never started playing",
    )
    .await;
    assert_eq!("3:00", telemetry.borrow().duration_display);

    handle.play_pause();
    eventually(
        || !telemetry.borrow().is_playing && !output.is_playing(),
        "Track never paused",
    )
    .await;
    assert!(!store.snapshot().intent());

    handle.shutdown();
    let stats = join.await?;
    assert_eq!(
        BlobStats {
            created: 1,
            revoked: 1
        },
        stats
    );
    Ok(())
}
