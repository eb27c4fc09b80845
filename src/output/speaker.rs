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
    error::Error,
    fmt,
    fs::File,
    io::{self, BufReader, Cursor, Read, Seek, SeekFrom},
    sync::{
        mpsc::{self, RecvTimeoutError},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use rodio::{
    cpal::traits::{DeviceTrait, HostTrait},
    Decoder, OutputStream, OutputStreamBuilder, Sink, Source,
};
use tracing::{debug, error, info, span, warn, Level};

use crate::output::{
    LoadTag, MediaError, MediaErrorCode, OutputEvent, OutputEventKind, OutputEvents, PlayError,
};
use crate::source::{BlobRegistry, OBJECT_URL_PREFIX};

/// The device name that selects the system default output.
pub const DEFAULT_DEVICE: &str = "default";

/// Progress is never reported more often than this.
const MIN_PROGRESS_INTERVAL: Duration = Duration::from_millis(10);

const FILE_URL_PREFIX: &str = "file://";

enum Command {
    Attach(LoadTag, String),
    Detach,
    Load,
    Play,
    Pause,
    Seek(Duration),
    Shutdown,
}

/// Plays audio through a system output device. The device is owned by a dedicated thread. This
/// handle only forwards commands to it.
pub struct Output {
    name: String,
    commands: mpsc::Sender<Command>,
    join: Option<thread::JoinHandle<()>>,
}

impl Output {
    /// Opens the named device. "default" selects the system default, any other name selects the
    /// first device whose name contains it.
    pub fn new(
        name: &str,
        progress_interval: Duration,
        registry: BlobRegistry,
        events: OutputEvents,
    ) -> Result<Output, Box<dyn Error>> {
        let (commands_tx, commands_rx) = mpsc::channel::<Command>();
        let (opened_tx, opened_rx) = mpsc::channel::<Result<(), String>>();

        let join = {
            let device_name = name.to_string();
            thread::Builder::new()
                .name("speaker".to_string())
                .spawn(move || {
                    let span = span!(Level::INFO, "speaker");
                    let _enter = span.enter();

                    // The stream has to stay on the thread that opened it.
                    let stream = match open_stream(&device_name) {
                        Ok(stream) => {
                            let _ = opened_tx.send(Ok(()));
                            stream
                        }
                        Err(e) => {
                            let _ = opened_tx.send(Err(e.to_string()));
                            return;
                        }
                    };

                    Worker::new(stream, registry, events, progress_interval).run(commands_rx);
                })?
        };

        if let Err(e) = opened_rx.recv()? {
            let _ = join.join();
            return Err(format!("unable to open output device {}: {}", name, e).into());
        }

        info!(device = name, "Opened speaker output.");
        Ok(Output {
            name: name.to_string(),
            commands: commands_tx,
            join: Some(join),
        })
    }

    fn send(&self, command: Command) -> Result<(), PlayError> {
        self.commands
            .send(command)
            .map_err(|_| PlayError::Disconnected)
    }

    fn send_or_warn(&self, command: Command) {
        if self.send(command).is_err() {
            warn!(device = self.name, "Speaker thread is gone.");
        }
    }
}

impl crate::output::Output for Output {
    fn attach(&mut self, tag: LoadTag, source: &str) {
        self.send_or_warn(Command::Attach(tag, source.to_string()));
    }

    fn detach(&mut self) {
        self.send_or_warn(Command::Detach);
    }

    fn load(&mut self) {
        self.send_or_warn(Command::Load);
    }

    fn play(&mut self) -> Result<(), PlayError> {
        self.send(Command::Play)
    }

    fn pause(&mut self) {
        self.send_or_warn(Command::Pause);
    }

    fn seek(&mut self, position: Duration) {
        self.send_or_warn(Command::Seek(position));
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!(device = self.name, "Speaker thread panicked.");
            }
        }
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Speaker)", self.name)
    }
}

/// Lists the names of the available output devices.
pub fn list_devices() -> Result<Vec<String>, Box<dyn Error>> {
    let mut names = rodio::cpal::default_host()
        .output_devices()?
        .filter_map(|device| device.name().ok())
        .collect::<Vec<String>>();
    names.sort();
    Ok(names)
}

fn open_stream(name: &str) -> Result<OutputStream, Box<dyn Error>> {
    let mut stream = if name == DEFAULT_DEVICE {
        OutputStreamBuilder::open_default_stream()?
    } else {
        let device = rodio::cpal::default_host()
            .output_devices()?
            .find(|device| {
                device
                    .name()
                    .map(|device_name| device_name.contains(name))
                    .unwrap_or(false)
            })
            .ok_or_else(|| format!("no output device matching {}", name))?;
        OutputStreamBuilder::from_device(device)?.open_stream()?
    };
    // rodio logs to stderr when the stream is dropped.
    stream.log_on_drop(false);
    Ok(stream)
}

/// Owns the output stream and the sink for the attached source.
struct Worker {
    stream: OutputStream,
    registry: BlobRegistry,
    events: OutputEvents,
    progress_interval: Duration,
    last_progress: Instant,
    tag: Option<LoadTag>,
    source: Option<String>,
    sink: Option<Sink>,
    duration: Option<Duration>,
    playing: bool,
    ended: bool,
}

impl Worker {
    fn new(
        stream: OutputStream,
        registry: BlobRegistry,
        events: OutputEvents,
        progress_interval: Duration,
    ) -> Worker {
        Worker {
            stream,
            registry,
            events,
            progress_interval: progress_interval.max(MIN_PROGRESS_INTERVAL),
            last_progress: Instant::now(),
            tag: None,
            source: None,
            sink: None,
            duration: None,
            playing: false,
            ended: false,
        }
    }

    fn run(mut self, commands: mpsc::Receiver<Command>) {
        loop {
            let timeout = self
                .progress_interval
                .saturating_sub(self.last_progress.elapsed());
            match commands.recv_timeout(timeout) {
                Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(command) => self.handle(command),
                Err(RecvTimeoutError::Timeout) => {}
            }

            if self.last_progress.elapsed() >= self.progress_interval {
                self.progress();
                self.last_progress = Instant::now();
            }
        }

        self.stop();
        debug!("Speaker thread stopped.");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Attach(tag, source) => {
                self.stop();
                debug!(tag = %tag, source, "Attached source.");
                self.tag = Some(tag);
                self.source = Some(source);
            }
            Command::Detach => {
                self.stop();
                self.tag = None;
                self.source = None;
            }
            Command::Load => self.load(),
            Command::Play => self.play(),
            Command::Pause => {
                if let (true, Some(sink)) = (self.playing, &self.sink) {
                    sink.pause();
                    self.playing = false;
                    self.emit(OutputEventKind::Paused);
                }
            }
            Command::Seek(position) => self.seek(position),
            Command::Shutdown => {}
        }
    }

    fn load(&mut self) {
        let Some(source) = self.source.clone() else {
            warn!("Load requested with nothing attached.");
            return;
        };

        match self.open(&source) {
            Ok(()) => {
                let duration = self.duration_secs();
                self.emit(OutputEventKind::MetadataReady { duration });
                self.emit(OutputEventKind::CanPlayThrough);
            }
            Err(err) => {
                error!(source, err = %err, "Unable to load source.");
                self.emit(OutputEventKind::Error(err));
            }
        }
    }

    fn play(&mut self) {
        if self.playing {
            return;
        }
        if self.ended && !self.reopen() {
            return;
        }
        let Some(sink) = &self.sink else {
            warn!("Play requested before a source was loaded.");
            return;
        };

        sink.play();
        self.playing = true;
        self.ended = false;
        self.emit(OutputEventKind::Started);
    }

    fn seek(&mut self, position: Duration) {
        if self.ended && !self.reopen() {
            return;
        }
        let Some(sink) = &self.sink else {
            return;
        };

        if let Err(e) = sink.try_seek(position) {
            warn!(position = ?position, err = ?e, "Unable to seek.");
            return;
        }
        let duration = self.duration_secs();
        self.emit(OutputEventKind::TimeUpdate {
            elapsed: position.as_secs_f64(),
            duration,
        });
    }

    /// Reports the position, or the end of the source once the sink runs dry.
    fn progress(&mut self) {
        if !self.playing {
            return;
        }
        let Some(sink) = &self.sink else {
            return;
        };

        let duration = self.duration_secs();
        if sink.empty() {
            self.playing = false;
            self.ended = true;
            self.emit(OutputEventKind::TimeUpdate {
                elapsed: duration,
                duration,
            });
            self.emit(OutputEventKind::Ended);
        } else {
            let elapsed = sink.get_pos().as_secs_f64();
            self.emit(OutputEventKind::TimeUpdate { elapsed, duration });
        }
    }

    /// Decodes the attached source into a fresh, paused sink.
    fn open(&mut self, source: &str) -> Result<(), MediaError> {
        self.stop();
        let decoder = decode(source, &self.registry)?;
        let duration = decoder.total_duration();

        let sink = Sink::connect_new(self.stream.mixer());
        sink.pause();
        sink.append(decoder);

        self.sink = Some(sink);
        self.duration = duration;
        Ok(())
    }

    /// A sink that ran dry has nothing left to play or seek in, so it's rebuilt from the source.
    fn reopen(&mut self) -> bool {
        let Some(source) = self.source.clone() else {
            return false;
        };

        match self.open(&source) {
            Ok(()) => true,
            Err(err) => {
                error!(source, err = %err, "Unable to reopen source.");
                self.emit(OutputEventKind::Error(err));
                false
            }
        }
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.duration = None;
        self.playing = false;
        self.ended = false;
    }

    fn duration_secs(&self) -> f64 {
        self.duration
            .map(|duration| duration.as_secs_f64())
            .unwrap_or(f64::NAN)
    }

    fn emit(&self, kind: OutputEventKind) {
        let Some(tag) = &self.tag else {
            return;
        };
        if self
            .events
            .send(OutputEvent {
                tag: tag.clone(),
                kind,
            })
            .is_err()
        {
            debug!("Nobody is listening to output events.");
        }
    }
}

/// A readable, seekable view of a source.
enum SourceReader {
    File(BufReader<File>),
    Memory(Cursor<Arc<[u8]>>),
}

impl Read for SourceReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            SourceReader::File(reader) => reader.read(buf),
            SourceReader::Memory(reader) => reader.read(buf),
        }
    }
}

impl Seek for SourceReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            SourceReader::File(reader) => reader.seek(pos),
            SourceReader::Memory(reader) => reader.seek(pos),
        }
    }
}

/// Opens a source string. Object URLs are read from the registry, anything else is treated as
/// a local path.
fn open_source(source: &str, registry: &BlobRegistry) -> Result<SourceReader, MediaError> {
    if source.starts_with(OBJECT_URL_PREFIX) {
        return registry
            .fetch(source)
            .map(|bytes| SourceReader::Memory(Cursor::new(bytes)))
            .ok_or_else(|| {
                MediaError::new(
                    MediaErrorCode::Network,
                    format!("object URL {} has been revoked", source),
                )
            });
    }

    let path = source.strip_prefix(FILE_URL_PREFIX).unwrap_or(source);
    if path.contains("://") {
        return Err(MediaError::new(
            MediaErrorCode::SourceNotSupported,
            format!("remote source {} can't be played offline", source),
        ));
    }

    File::open(path)
        .map(|file| SourceReader::File(BufReader::new(file)))
        .map_err(|e| {
            MediaError::new(
                MediaErrorCode::SourceNotSupported,
                format!("unable to open {}: {}", path, e),
            )
        })
}

fn decode(source: &str, registry: &BlobRegistry) -> Result<Decoder<SourceReader>, MediaError> {
    Decoder::new(open_source(source, registry)?).map_err(|e| {
        MediaError::new(
            MediaErrorCode::Decode,
            format!("unable to decode {}: {}", source, e),
        )
    })
}

#[cfg(test)]
mod test {
    use std::{error::Error, io::Cursor};

    use hound::{SampleFormat, WavSpec, WavWriter};
    use rodio::Source;

    use crate::library::{FileBlob, Track};
    use crate::output::MediaErrorCode;
    use crate::source::{BlobRegistry, SourceResolver};

    use super::decode;

    /// One second of silence at 8kHz.
    fn silent_wav() -> Result<Vec<u8>, Box<dyn Error>> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(
                &mut cursor,
                WavSpec {
                    channels: 1,
                    sample_rate: 8000,
                    bits_per_sample: 16,
                    sample_format: SampleFormat::Int,
                },
            )?;
            for _ in 0..8000 {
                writer.write_sample(0i16)?;
            }
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }

    #[test]
    fn test_decode_object_url() -> Result<(), Box<dyn Error>> {
        let registry = BlobRegistry::new();
        let track =
            Track::new("s2", "A", "B", "C").with_file(FileBlob::new("b.wav", silent_wav()?));
        let source = SourceResolver::new(registry.clone())
            .resolve(&track)
            .expect("track should resolve");

        let decoder = match decode(source.url(), &registry) {
            Ok(decoder) => decoder,
            Err(e) => panic!("expected the wav to decode: {}", e),
        };
        if let Some(duration) = decoder.total_duration() {
            assert!((duration.as_secs_f64() - 1.0).abs() < 0.01);
        }

        // Once revoked, the same URL no longer loads.
        let url = source.url().to_string();
        drop(source);
        match decode(&url, &registry) {
            Err(e) => assert_eq!(MediaErrorCode::Network, e.code),
            Ok(_) => panic!("revoked object URL should not decode"),
        }
        Ok(())
    }

    #[test]
    fn test_decode_file() -> Result<(), Box<dyn Error>> {
        let tempdir = tempfile::tempdir()?;
        let path = tempdir.path().join("silence.wav");
        std::fs::write(&path, silent_wav()?)?;

        let path = path.to_str().expect("temp path should be UTF-8");
        assert!(decode(path, &BlobRegistry::new()).is_ok());
        assert!(decode(&format!("file://{}", path), &BlobRegistry::new()).is_ok());
        Ok(())
    }

    #[test]
    fn test_decode_failures() -> Result<(), Box<dyn Error>> {
        let registry = BlobRegistry::new();

        match decode("/no/such/file.mp3", &registry) {
            Err(e) => assert_eq!(MediaErrorCode::SourceNotSupported, e.code),
            Ok(_) => panic!("missing file should not decode"),
        }
        match decode("https://example.com/a.mp3", &registry) {
            Err(e) => assert_eq!(MediaErrorCode::SourceNotSupported, e.code),
            Ok(_) => panic!("remote source should not decode"),
        }

        let tempdir = tempfile::tempdir()?;
        let path = tempdir.path().join("garbage.mp3");
        std::fs::write(&path, b"this is not audio")?;
        match decode(path.to_str().expect("temp path should be UTF-8"), &registry) {
            Err(e) => assert_eq!(MediaErrorCode::Decode, e.code),
            Ok(_) => panic!("garbage should not decode"),
        }
        Ok(())
    }
}
