//! Player thread.
//!
//! Owns the audio output and the song queue, drives the decoder through its control
//! block and drains the music pipe into the output.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use playd_decoder::control::DecoderControl;
use playd_decoder::format::{AudioFormat, encode_samples};
use playd_decoder::output::{AudioOutput, play_all};
use playd_decoder::pipe::{MusicChunk, MusicPipe};
use playd_decoder::song::Song;
use playd_types::{PlaybackEndReason, PlayerState, PlayerStatus};

/// How long the player sleeps on the command channel while nothing is playing.
const IDLE_POLL: Duration = Duration::from_millis(100);
/// How long the player waits for decoded audio before re-checking commands.
const PIPE_POLL: Duration = Duration::from_millis(20);

/// Commands accepted by the player thread.
#[derive(Debug)]
pub enum PlayerCommand {
    /// Replace the current song and start playing immediately.
    Play(Song),
    /// Append to the queue; starts playback when stopped.
    Enqueue(Song),
    Stop,
    /// Seek within the current song (seconds).
    Seek(f64),
    PauseToggle,
    /// Skip to the next queued song.
    Next,
    Status(Sender<PlayerStatus>),
    Quit,
}

/// Builds the output on the player thread.
pub type OutputFactory = Box<dyn FnOnce() -> Result<Box<dyn AudioOutput>> + Send>;

/// Handle for sending commands to the player thread.
pub struct PlayerHandle {
    pub cmd_tx: Sender<PlayerCommand>,
    join: JoinHandle<()>,
}

impl PlayerHandle {
    /// Wait for the player thread to exit.
    pub fn join(self) {
        if self.join.join().is_err() {
            tracing::error!("player thread panicked");
        }
    }
}

/// Spawn the player thread. With `exit_when_idle` the thread exits once the queue
/// has played out.
pub fn spawn_player(
    control: Arc<DecoderControl>,
    pipe: Arc<MusicPipe>,
    make_output: OutputFactory,
    exit_when_idle: bool,
) -> Result<PlayerHandle> {
    let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
    let join = thread::Builder::new()
        .name("player".into())
        .spawn(move || {
            let output = match make_output() {
                Ok(output) => output,
                Err(err) => {
                    tracing::error!("output setup failed: {err:#}");
                    return;
                }
            };
            let mut player = Player::new(control, pipe, output, exit_when_idle);
            player.run(&cmd_rx);
            player.shutdown();
        })?;
    Ok(PlayerHandle { cmd_tx, join })
}

struct Player {
    control: Arc<DecoderControl>,
    pipe: Arc<MusicPipe>,
    output: Box<dyn AudioOutput>,
    /// Source format the output was opened for, and the format it accepted.
    opened: Option<(AudioFormat, AudioFormat)>,
    queue: VecDeque<Song>,
    current: Option<Arc<Song>>,
    state: PlayerState,
    elapsed: Option<f64>,
    end_reason: Option<PlaybackEndReason>,
    exit_when_idle: bool,
    /// Set once the first song has been started.
    started: bool,
    bytes: Vec<u8>,
}

impl Player {
    fn new(
        control: Arc<DecoderControl>,
        pipe: Arc<MusicPipe>,
        output: Box<dyn AudioOutput>,
        exit_when_idle: bool,
    ) -> Self {
        Self {
            control,
            pipe,
            output,
            opened: None,
            queue: VecDeque::new(),
            current: None,
            state: PlayerState::Stop,
            elapsed: None,
            end_reason: None,
            exit_when_idle,
            started: false,
            bytes: Vec::new(),
        }
    }

    /// Main loop. Returns on `Quit`, a closed channel, or (with `exit_when_idle`) once
    /// everything has played.
    fn run(&mut self, cmd_rx: &Receiver<PlayerCommand>) {
        loop {
            let cmd = if self.state == PlayerState::Play {
                match cmd_rx.try_recv() {
                    Ok(cmd) => Some(cmd),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => return,
                }
            } else {
                match cmd_rx.recv_timeout(IDLE_POLL) {
                    Ok(cmd) => Some(cmd),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            };
            if let Some(cmd) = cmd {
                if !self.handle(cmd) {
                    return;
                }
                continue;
            }

            if self.state == PlayerState::Play {
                self.pump();
            }
            if self.exit_when_idle
                && self.started
                && self.state == PlayerState::Stop
                && self.queue.is_empty()
            {
                return;
            }
        }
    }

    /// Apply one command. Returns `false` to leave the loop.
    fn handle(&mut self, cmd: PlayerCommand) -> bool {
        match cmd {
            PlayerCommand::Play(song) => {
                tracing::info!(song = %song.uri(), "play");
                self.start(song);
            }
            PlayerCommand::Enqueue(song) => {
                tracing::info!(song = %song.uri(), queued = self.queue.len() + 1, "enqueue");
                self.queue.push_back(song);
                if self.state == PlayerState::Stop {
                    self.advance();
                }
            }
            PlayerCommand::Stop => {
                self.stop();
                self.end_reason = Some(PlaybackEndReason::Stopped);
            }
            PlayerCommand::Seek(secs) => self.seek(secs),
            PlayerCommand::PauseToggle => {
                self.state = match self.state {
                    PlayerState::Play => PlayerState::Pause,
                    PlayerState::Pause => PlayerState::Play,
                    PlayerState::Stop => PlayerState::Stop,
                };
                self.output.pause(self.state == PlayerState::Pause);
                tracing::info!(state = ?self.state, "pause toggled");
            }
            PlayerCommand::Next => {
                self.stop();
                self.end_reason = Some(PlaybackEndReason::Stopped);
                self.advance();
            }
            PlayerCommand::Status(reply) => {
                let _ = reply.send(self.status());
            }
            PlayerCommand::Quit => return false,
        }
        true
    }

    /// Stop whatever plays and start `song`.
    fn start(&mut self, song: Song) {
        self.halt_decoder();
        let song = Arc::new(song);
        self.control.start(song.clone());
        self.current = Some(song);
        self.started = true;
        self.state = PlayerState::Play;
        self.elapsed = None;
        self.output.pause(false);
    }

    /// Stop the decoder and drop buffered audio, keeping the output open.
    fn halt_decoder(&mut self) {
        self.control.stop();
        self.pipe.clear();
        self.output.cancel();
    }

    fn stop(&mut self) {
        self.halt_decoder();
        self.output.close();
        self.opened = None;
        self.current = None;
        self.elapsed = None;
        self.state = PlayerState::Stop;
    }

    fn advance(&mut self) {
        match self.queue.pop_front() {
            Some(song) => {
                tracing::info!(song = %song.uri(), "next song");
                self.start(song);
            }
            None => {
                if self.state != PlayerState::Stop {
                    self.stop();
                }
            }
        }
    }

    fn seek(&mut self, secs: f64) {
        let Some(song) = self.current.clone() else {
            tracing::warn!("seek without a current song");
            return;
        };
        if !secs.is_finite() || secs < 0.0 {
            tracing::warn!(secs, "invalid seek target");
            return;
        }
        if self.control.seek(song, secs) {
            self.output.cancel();
            self.elapsed = Some(secs);
            tracing::info!(secs, "seeked");
        } else {
            tracing::warn!(secs, "seek failed");
        }
    }

    /// Move one chunk from the pipe to the output, or notice that the song ended.
    fn pump(&mut self) {
        match self.pipe.pop_timeout(PIPE_POLL) {
            Some(chunk) => {
                if let Err(err) = self.play_chunk(&chunk) {
                    tracing::error!("output failed: {err:#}");
                    self.stop();
                    self.end_reason = Some(PlaybackEndReason::Error);
                }
            }
            None => {
                if self.control.is_idle() && self.pipe.is_empty() {
                    self.song_finished();
                }
            }
        }
    }

    fn play_chunk(&mut self, chunk: &MusicChunk) -> Result<()> {
        let out_format = match self.opened {
            Some((src, out)) if src == chunk.format => out,
            _ => {
                let mut out = chunk.format;
                self.output.open(&mut out)?;
                tracing::info!(
                    output = self.output.name(),
                    source = %chunk.format,
                    accepted = %out,
                    "output opened"
                );
                self.opened = Some((chunk.format, out));
                out
            }
        };
        encode_samples(&chunk.samples, out_format.sample_format, &mut self.bytes);
        play_all(self.output.as_mut(), &self.bytes)?;
        self.elapsed = Some(chunk.elapsed);
        Ok(())
    }

    fn song_finished(&mut self) {
        let song = self.current.as_ref().map(|s| s.uri()).unwrap_or_default();
        match self.control.error() {
            Some(err) => {
                tracing::warn!(song = %song, error = %err, "decoder error");
                self.end_reason = Some(PlaybackEndReason::Error);
            }
            None => {
                tracing::info!(song = %song, "song finished");
                self.end_reason = Some(PlaybackEndReason::Eof);
            }
        }
        self.current = None;
        self.state = PlayerState::Stop;
        if self.queue.is_empty() {
            self.output.close();
            self.opened = None;
        } else {
            self.advance();
        }
    }

    fn status(&self) -> PlayerStatus {
        let dc = self.control.snapshot();
        PlayerStatus {
            state: self.state,
            decoder_state: dc.state,
            now_playing: self.current.as_ref().map(|s| s.uri()),
            decoder_plugin: dc.plugin.map(str::to_string),
            elapsed_secs: self.elapsed,
            total_secs: dc.total_time,
            sample_rate: dc.audio_format.map(|f| f.sample_rate),
            channels: dc.audio_format.map(|f| f.channels),
            seekable: dc.seekable,
            queued: self.queue.len(),
            error: dc.error,
            end_reason: self.end_reason,
        }
    }

    fn shutdown(&mut self) {
        self.halt_decoder();
        self.output.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use playd_decoder::control::PlayerControl;
    use playd_decoder::format::{SampleFormat, decode_f32_samples};
    use std::io::{self, Cursor, Read, Seek, SeekFrom};

    use playd_decoder::input::{InputFactory, InputStream};
    use playd_decoder::plugin::{DecoderPlugin, StreamKinds};
    use playd_decoder::registry::DecoderRegistry;
    use playd_decoder::song::SongMapper;
    use playd_decoder::thread::DecoderThread;
    use playd_types::{DecoderCommand, DecoderError, DecoderState};

    #[derive(Default)]
    struct Recorded {
        opened: Vec<AudioFormat>,
        samples: Vec<f32>,
        closes: usize,
    }

    /// Output recording everything it is given, in F32.
    struct RecordingOutput(Arc<Mutex<Recorded>>);

    impl AudioOutput for RecordingOutput {
        fn name(&self) -> &str {
            "recording"
        }

        fn open(&mut self, format: &mut AudioFormat) -> Result<()> {
            format.sample_format = SampleFormat::F32;
            self.0.lock().unwrap().opened.push(*format);
            Ok(())
        }

        fn play(&mut self, bytes: &[u8]) -> Result<usize> {
            let mut samples = Vec::new();
            decode_f32_samples(bytes, &mut samples);
            self.0.lock().unwrap().samples.extend(samples);
            Ok(bytes.len())
        }

        fn close(&mut self) {
            self.0.lock().unwrap().closes += 1;
        }
    }

    struct EmptyInput(Cursor<Vec<u8>>);

    impl Read for EmptyInput {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.read(buf)
        }
    }

    impl Seek for EmptyInput {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.0.seek(pos)
        }
    }

    impl InputStream for EmptyInput {
        fn is_ready(&self) -> bool {
            true
        }

        fn is_seekable(&self) -> bool {
            true
        }

        fn mime_type(&self) -> Option<&str> {
            None
        }

        fn size(&self) -> Option<u64> {
            Some(0)
        }

        fn offset(&self) -> u64 {
            self.0.position()
        }

        fn buffer(&mut self) -> io::Result<usize> {
            Ok(0)
        }
    }

    /// Opens every locator as an empty stream; `missing*` fails.
    struct Inputs;

    impl InputFactory for Inputs {
        fn open(&self, locator: &str) -> Result<Box<dyn InputStream>> {
            if locator.starts_with("missing") {
                anyhow::bail!("no such file: {locator}");
            }
            Ok(Box::new(EmptyInput(Cursor::new(Vec::new()))))
        }
    }

    /// Backend producing `frames` stereo frames of a constant value at 8 kHz.
    fn tone(name: &'static str, suffix: &'static [&'static str], value: f32, frames: usize) -> DecoderPlugin {
        DecoderPlugin::new(name, StreamKinds::FILE)
            .with_suffixes(suffix)
            .with_stream_decode(move |decoder, _input| {
                decoder.initialized(8_000, 2, true, Some(frames as f64 / 8_000.0));
                let block = vec![value; 2 * 100];
                let mut written = 0;
                while written < frames {
                    let n = (frames - written).min(100);
                    if decoder.data(&block[..n * 2], written as f64 / 8_000.0) == DecoderCommand::Stop {
                        break;
                    }
                    written += n;
                }
                Ok(())
            })
    }

    struct Setup {
        handle: PlayerHandle,
        recorded: Arc<Mutex<Recorded>>,
    }

    fn setup(exit_when_idle: bool) -> Setup {
        let mut registry = DecoderRegistry::new();
        registry.register(tone("ones", &["one"], 1.0, 300));
        registry.register(tone("halves", &["half"], 0.5, 200));

        let player = PlayerControl::new();
        let control = Arc::new(DecoderControl::new(player.notify().clone()));
        let pipe = Arc::new(MusicPipe::new(4096));
        DecoderThread::new(
            control.clone(),
            Arc::new(registry),
            Arc::new(Inputs),
            SongMapper::default(),
            pipe.clone(),
        )
        .spawn()
        .unwrap();

        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let out = recorded.clone();
        let handle = spawn_player(
            control,
            pipe,
            Box::new(move || Ok(Box::new(RecordingOutput(out)) as Box<dyn AudioOutput>)),
            exit_when_idle,
        )
        .unwrap();
        Setup { handle, recorded }
    }

    fn status(handle: &PlayerHandle) -> PlayerStatus {
        let (tx, rx) = crossbeam_channel::bounded(1);
        handle.cmd_tx.send(PlayerCommand::Status(tx)).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn plays_queue_in_order_and_exits() {
        let s = setup(true);
        s.handle.cmd_tx.send(PlayerCommand::Enqueue(Song::file("a.one"))).unwrap();
        s.handle.cmd_tx.send(PlayerCommand::Enqueue(Song::file("b.half"))).unwrap();
        s.handle.join();

        let rec = s.recorded.lock().unwrap();
        assert_eq!(rec.samples.len(), (300 + 200) * 2);
        assert!(rec.samples[..600].iter().all(|v| *v == 1.0));
        assert!(rec.samples[600..].iter().all(|v| *v == 0.5));
        assert_eq!(rec.opened[0], AudioFormat::new(8_000, 2, SampleFormat::F32));
        assert!(rec.closes >= 1);
    }

    #[test]
    fn decoder_errors_are_reported_and_skipped() {
        let s = setup(false);
        s.handle.cmd_tx.send(PlayerCommand::Enqueue(Song::file("missing.one"))).unwrap();
        s.handle.cmd_tx.send(PlayerCommand::Enqueue(Song::file("x.unknown"))).unwrap();
        s.handle.cmd_tx.send(PlayerCommand::Enqueue(Song::file("b.half"))).unwrap();

        let mut last = status(&s.handle);
        for _ in 0..200 {
            if last.state == PlayerState::Stop && last.queued == 0 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
            last = status(&s.handle);
        }
        assert_eq!(last.state, PlayerState::Stop);
        assert_eq!(last.decoder_state, DecoderState::Stop);
        assert_eq!(last.end_reason, Some(PlaybackEndReason::Eof));
        assert_eq!(s.recorded.lock().unwrap().samples.len(), 400);

        s.handle.cmd_tx.send(PlayerCommand::Play(Song::file("missing.one"))).unwrap();
        let mut last = status(&s.handle);
        for _ in 0..200 {
            if last.state == PlayerState::Stop {
                break;
            }
            thread::sleep(Duration::from_millis(10));
            last = status(&s.handle);
        }
        assert_eq!(last.error, Some(DecoderError::File));
        assert_eq!(last.end_reason, Some(PlaybackEndReason::Error));

        s.handle.cmd_tx.send(PlayerCommand::Quit).unwrap();
        s.handle.join();
    }

    #[test]
    fn stop_clears_current_song() {
        let s = setup(false);
        s.handle.cmd_tx.send(PlayerCommand::Play(Song::file("a.one"))).unwrap();
        s.handle.cmd_tx.send(PlayerCommand::Stop).unwrap();
        let st = status(&s.handle);
        assert_eq!(st.state, PlayerState::Stop);
        assert!(st.now_playing.is_none());
        assert_eq!(st.end_reason, Some(PlaybackEndReason::Stopped));
        s.handle.cmd_tx.send(PlayerCommand::Quit).unwrap();
        s.handle.join();
    }
}
