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
mod config;
mod controller;
mod library;
mod output;
mod playlist;
mod session;
mod source;
mod store;
mod util;

use clap::{crate_version, Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::init_session_and_controller;
use crate::library::{Track, TrackId};
use crate::session::MediaSession;
use crate::source::{BlobRegistry, SourceResolver};
use crate::store::PlaybackStore;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A retro tape deck music player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the tracks and tapes in a library file.
    Tracks {
        /// The path to the library file.
        library_path: String,
    },
    /// Lists the available audio output devices.
    Devices {},
    /// Plays a track from a library.
    Play {
        /// The path to the library file.
        library_path: String,
        /// The id of the track to play.
        track_id: String,
        /// The output to play through.
        #[arg[short, long, default_value = output::speaker::DEFAULT_DEVICE]]
        output: String,
    },
    /// Reads an audio file into memory and plays it.
    PlayFile {
        /// The path to the audio file.
        path: String,
        /// The output to play through.
        #[arg[short, long, default_value = output::speaker::DEFAULT_DEVICE]]
        output: String,
    },
    /// Start will start the interactive player.
    Start {
        /// The path to the player config.
        player_path: String,
    },
}

/// Plays a single track until it ends or fails.
async fn play(track: Arc<Track>, output_name: &str) -> Result<(), Box<dyn Error>> {
    let registry = BlobRegistry::new();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let output = output::get_output(
        output_name,
        &config::Speaker::default(),
        registry.clone(),
        events_tx,
    )?;
    println!("Playing {} through {}.", track, output);

    let (notices_tx, mut notices_rx) = mpsc::unbounded_channel();
    let session = MediaSession::new(
        output,
        PlaybackStore::new(),
        SourceResolver::new(registry),
        notices_tx,
    );
    let (session, join) = session.spawn(events_rx);
    let mut telemetry = session.telemetry();
    let mut state = session.store().subscribe();

    session.store().select_track(track);
    state.borrow_and_update();

    // The intent only drops once the track ends or can't be played.
    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() || !state.borrow_and_update().intent() {
                    break;
                }
            }
            changed = telemetry.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("{}", *telemetry.borrow_and_update());
            }
            Some(notice) = notices_rx.recv() => println!("{}", notice),
        }
    }

    session.shutdown();
    let stats = join.await?;
    while let Ok(notice) = notices_rx.try_recv() {
        println!("{}", notice);
    }
    info!(
        created = stats.created,
        revoked = stats.revoked,
        "Playback finished."
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Tracks { library_path } => {
            let catalog = config::parse_library(&PathBuf::from(&library_path))?;
            let library = catalog.library();

            if library.is_empty() {
                println!("No tracks found in {}.", library_path);
                return Ok(());
            }

            println!("Tracks (count: {}):", library.len());
            for track in library.list() {
                println!("- {}: {}", track.id(), track);
                if let Some(genre) = track.genre() {
                    println!("    genre: {}", genre);
                }
                if let Some(bpm) = track.bpm() {
                    println!("    bpm: {}", bpm);
                }
                if !track.album_art_url().is_empty() {
                    println!("    art: {}", track.album_art_url());
                }
            }
            for tape in catalog.tapes() {
                println!();
                println!("{}", tape);
            }
        }
        Commands::Devices {} => {
            let devices = output::speaker::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Play {
            library_path,
            track_id,
            output,
        } => {
            let catalog = config::parse_library(&PathBuf::from(library_path))?;
            let track = catalog.library().get(&TrackId::new(track_id))?;
            play(track, &output).await?;
        }
        Commands::PlayFile { path, output } => {
            let track = Track::import(&PathBuf::from(path))?;
            play(Arc::new(track), &output).await?;
        }
        Commands::Start { player_path } => {
            init_session_and_controller(&PathBuf::from(player_path))?
                .join()
                .await?;
        }
    }

    Ok(())
}
