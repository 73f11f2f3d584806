//! Control blocks shared between the player thread and the decoder thread.
//!
//! [`DecoderControl`] is the decoder's control block. Every field has exactly one
//! writer:
//! - `command`, `next_song` and `seek_where` are written by the player;
//!   `command` is cleared (set back to `None`) by the decoder once it has acted on it.
//! - `state`, `error`, `seekable`, `current_song`, `audio_format`, `total_time`,
//!   `plugin` and `seek_error` are written by the decoder.
//!
//! All fields live behind one mutex, which is also the memory barrier for cross-thread
//! visibility. The decoder sleeps on the block's condvar; the player sleeps on its own
//! [`Notify`], which the decoder signals after every transition. Waiters always
//! re-check their condition after waking: a signal does not imply any particular
//! transition happened.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use playd_types::{DecoderCommand, DecoderError, DecoderState};

use crate::format::AudioFormat;
use crate::song::Song;

/// Level-triggered wakeup flag: a signal sent while nobody waits is not lost.
#[derive(Debug, Default)]
pub struct Notify {
    pending: Mutex<bool>,
    cond: Condvar,
}

impl Notify {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        *pending = true;
        drop(pending);
        self.cond.notify_one();
    }

    /// Block until signaled, consuming the signal.
    pub fn wait(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        while !*pending {
            pending = self.cond.wait(pending).unwrap_or_else(|e| e.into_inner());
        }
        *pending = false;
    }

    /// Like [`wait`](Self::wait) with an upper bound. Returns `true` if signaled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let (mut pending, _) = self
            .cond
            .wait_timeout_while(pending, timeout, |p| !*p)
            .unwrap_or_else(|e| e.into_inner());
        let signaled = *pending;
        *pending = false;
        signaled
    }
}

/// Player-owned control block. The decoder only ever signals its notify handle.
#[derive(Debug, Default)]
pub struct PlayerControl {
    notify: Arc<Notify>,
}

impl PlayerControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) -> &Arc<Notify> {
        &self.notify
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: DecoderState,
    command: DecoderCommand,
    error: Option<DecoderError>,
    seekable: bool,
    seek_error: bool,
    seek_where: f64,
    current_song: Option<Arc<Song>>,
    next_song: Option<Arc<Song>>,
    audio_format: Option<AudioFormat>,
    total_time: Option<f64>,
    plugin: Option<&'static str>,
}

/// Point-in-time copy of the decoder control block.
#[derive(Clone, Debug, Default)]
pub struct DecoderSnapshot {
    pub state: DecoderState,
    pub command: DecoderCommand,
    pub error: Option<DecoderError>,
    pub seekable: bool,
    pub current_song: Option<Arc<Song>>,
    pub audio_format: Option<AudioFormat>,
    pub total_time: Option<f64>,
    pub plugin: Option<&'static str>,
}

/// What the decoder thread picked up when it began a decode attempt.
#[derive(Debug)]
pub(crate) struct StartRequest {
    pub(crate) song: Arc<Song>,
    pub(crate) seek_to: Option<f64>,
}

/// Decoder control block.
#[derive(Debug)]
pub struct DecoderControl {
    shared: Mutex<Shared>,
    cond: Condvar,
    player: Arc<Notify>,
}

impl DecoderControl {
    pub fn new(player: Arc<Notify>) -> Self {
        Self {
            shared: Mutex::new(Shared::default()),
            cond: Condvar::new(),
            player,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn signal_decoder(&self) {
        self.cond.notify_all();
    }

    pub(crate) fn signal_player(&self) {
        self.player.signal();
    }

    // ---- player side -------------------------------------------------------

    pub fn state(&self) -> DecoderState {
        self.lock().state
    }

    pub fn command(&self) -> DecoderCommand {
        self.lock().command
    }

    pub fn error(&self) -> Option<DecoderError> {
        self.lock().error
    }

    pub fn seekable(&self) -> bool {
        self.lock().seekable
    }

    pub fn current_song(&self) -> Option<Arc<Song>> {
        self.lock().current_song.clone()
    }

    pub fn audio_format(&self) -> Option<AudioFormat> {
        self.lock().audio_format
    }

    pub fn seek_where(&self) -> f64 {
        self.lock().seek_where
    }

    pub fn snapshot(&self) -> DecoderSnapshot {
        let s = self.lock();
        DecoderSnapshot {
            state: s.state,
            command: s.command,
            error: s.error,
            seekable: s.seekable,
            current_song: s.current_song.clone(),
            audio_format: s.audio_format,
            total_time: s.total_time,
            plugin: s.plugin,
        }
    }

    /// `true` when the decoder is idle and has no command pending.
    pub fn is_idle(&self) -> bool {
        let s = self.lock();
        s.state == DecoderState::Stop && s.command == DecoderCommand::None
    }

    /// Issue a command without waiting for the decoder to pick it up.
    ///
    /// `Start`/`Seek` from an idle decoder use `song` as the next song; `song` must be
    /// provided in that case or the decoder has nothing to start.
    pub fn request(&self, command: DecoderCommand, song: Option<Arc<Song>>, seek_where: f64) {
        {
            let mut s = self.lock();
            if matches!(command, DecoderCommand::Start | DecoderCommand::Seek)
                && s.state == DecoderState::Stop
            {
                s.next_song = song;
            }
            if command == DecoderCommand::Seek {
                s.seek_where = seek_where;
            }
            s.command = command;
        }
        self.signal_decoder();
    }

    /// Block until the decoder has cleared the pending command.
    pub fn wait_command_done(&self) {
        loop {
            if self.command() == DecoderCommand::None {
                return;
            }
            self.player.wait();
        }
    }

    /// Start decoding `song` and wait until the decoder has acknowledged.
    pub fn start(&self, song: Arc<Song>) {
        self.request(DecoderCommand::Start, Some(song), 0.0);
        self.wait_command_done();
    }

    /// Stop the current decode attempt and wait for the acknowledgement.
    pub fn stop(&self) {
        self.request(DecoderCommand::Stop, None, 0.0);
        self.wait_command_done();
    }

    /// Seek to `secs`. An idle decoder starts `song` and seeks once the backend is up.
    ///
    /// Returns `false` if the backend reported a seek failure or the attempt ended
    /// before the seek was carried out.
    pub fn seek(&self, song: Arc<Song>, secs: f64) -> bool {
        self.request(DecoderCommand::Seek, Some(song), secs);
        self.wait_command_done();
        !self.lock().seek_error
    }

    // ---- decoder side ------------------------------------------------------

    /// Current command; asserts the loop invariant that the decoder is idle.
    pub(crate) fn idle_command(&self) -> DecoderCommand {
        let s = self.lock();
        assert_eq!(
            s.state,
            DecoderState::Stop,
            "decoder loop re-entered outside STOP"
        );
        s.command
    }

    /// Sleep until a command is pending.
    pub(crate) fn wait_for_command(&self) {
        let mut s = self.lock();
        while s.command == DecoderCommand::None {
            s = self.cond.wait(s).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Clear the pending command (idle STOP acknowledgement).
    pub(crate) fn acknowledge(&self) {
        self.lock().command = DecoderCommand::None;
    }

    /// Promote `next_song` to `current_song`. Returns `None` if no song was queued.
    pub(crate) fn begin(&self) -> Option<StartRequest> {
        let mut s = self.lock();
        let song = s.next_song.clone()?;
        s.error = None;
        s.seek_error = false;
        s.current_song = Some(song.clone());
        s.audio_format = None;
        s.total_time = None;
        s.plugin = None;
        s.seekable = false;
        let seek_to = (s.command == DecoderCommand::Seek).then_some(s.seek_where);
        Some(StartRequest { song, seek_to })
    }

    /// Input opened: enter START and clear the command.
    pub(crate) fn set_started(&self) {
        {
            let mut s = self.lock();
            s.state = DecoderState::Start;
            s.command = DecoderCommand::None;
        }
        self.signal_player();
    }

    pub(crate) fn set_seekable(&self, seekable: bool) {
        self.lock().seekable = seekable;
    }

    pub(crate) fn set_error(&self, error: DecoderError) {
        self.lock().error = Some(error);
    }

    pub(crate) fn set_plugin(&self, plugin: &'static str) {
        self.lock().plugin = Some(plugin);
    }

    /// Backend reported its output format: enter DECODE.
    pub(crate) fn set_decoding(&self, format: AudioFormat, seekable: bool, total_time: Option<f64>) {
        {
            let mut s = self.lock();
            s.state = DecoderState::Decode;
            s.audio_format = Some(format);
            s.seekable = seekable;
            s.total_time = total_time;
        }
        self.signal_player();
    }

    /// Backend finished handling a SEEK command.
    pub(crate) fn finish_seek(&self, ok: bool) {
        {
            let mut s = self.lock();
            s.seek_error = !ok;
            if s.command == DecoderCommand::Seek {
                s.command = DecoderCommand::None;
            }
        }
        self.signal_player();
    }

    /// End of a decode attempt: back to STOP with no command pending.
    ///
    /// A SEEK still pending here was never carried out and is reported as failed.
    pub(crate) fn finish(&self) {
        {
            let mut s = self.lock();
            if s.command == DecoderCommand::Seek {
                s.seek_error = true;
            }
            s.state = DecoderState::Stop;
            s.command = DecoderCommand::None;
        }
        self.signal_player();
    }
}
