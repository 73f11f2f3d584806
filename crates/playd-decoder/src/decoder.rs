//! Per-attempt decoder context handed to backends.
//!
//! A [`Decoder`] lives for exactly one decode attempt. Backends use it to announce
//! their output format, push PCM into the music pipe and react to STOP/SEEK commands
//! from the player.

use playd_types::DecoderCommand;

use crate::control::DecoderControl;
use crate::format::{AudioFormat, SampleFormat};
use crate::pipe::{MusicChunk, MusicPipe};

pub struct Decoder<'a> {
    control: &'a DecoderControl,
    pipe: &'a MusicPipe,
    plugin: Option<&'static str>,
    format: Option<AudioFormat>,
    /// Seek requested together with the start of this song, applied once the
    /// backend has initialized.
    initial_seek: Option<f64>,
    seeking: bool,
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(
        control: &'a DecoderControl,
        pipe: &'a MusicPipe,
        initial_seek: Option<f64>,
    ) -> Self {
        Self {
            control,
            pipe,
            plugin: None,
            format: None,
            initial_seek: initial_seek.filter(|secs| *secs > 0.0),
            seeking: false,
        }
    }

    pub(crate) fn set_plugin(&mut self, name: &'static str) {
        self.plugin = Some(name);
        self.control.set_plugin(name);
    }

    pub fn plugin_name(&self) -> Option<&'static str> {
        self.plugin
    }

    pub fn is_seeking(&self) -> bool {
        self.seeking
    }

    pub fn is_initialized(&self) -> bool {
        self.format.is_some()
    }

    /// Report the stream's sample rate and channel count; enters DECODE.
    ///
    /// Chunks are always carried as `f32` regardless of the source encoding.
    pub fn initialized(&mut self, sample_rate: u32, channels: u16, seekable: bool, total_time: Option<f64>) {
        let format = AudioFormat::new(sample_rate, channels, SampleFormat::F32);
        tracing::debug!(
            plugin = self.plugin.unwrap_or(""),
            format = %format,
            seekable,
            total_time = ?total_time,
            "decoder initialized"
        );
        self.format = Some(format);
        self.control.set_decoding(format, seekable, total_time);
    }

    /// Command the backend should act on next.
    pub fn command(&self) -> DecoderCommand {
        let command = self.control.command();
        if command == DecoderCommand::None && self.initial_seek.is_some() && self.format.is_some()
        {
            return DecoderCommand::Seek;
        }
        command
    }

    /// Target of the pending SEEK, in seconds.
    pub fn seek_where(&mut self) -> f64 {
        self.seeking = true;
        self.initial_seek
            .unwrap_or_else(|| self.control.seek_where())
    }

    /// The pending SEEK succeeded; buffered audio from before the seek is dropped.
    pub fn command_finished(&mut self) {
        self.finish_seek(true);
    }

    /// The pending SEEK could not be performed.
    pub fn seek_error(&mut self) {
        self.finish_seek(false);
    }

    fn finish_seek(&mut self, ok: bool) {
        self.seeking = false;
        if ok {
            self.pipe.clear();
        }
        if self.initial_seek.take().is_none() {
            self.control.finish_seek(ok);
        } else if !ok {
            tracing::warn!(plugin = self.plugin.unwrap_or(""), "initial seek failed");
        }
    }

    /// Push interleaved samples for the song time `elapsed`.
    ///
    /// Blocks while the pipe is full but returns early once any command is pending.
    /// Returns the command the backend should act on.
    pub fn data(&mut self, samples: &[f32], elapsed: f64) -> DecoderCommand {
        let command = self.command();
        if command != DecoderCommand::None || samples.is_empty() {
            return command;
        }
        let Some(format) = self.format else {
            tracing::warn!(
                plugin = self.plugin.unwrap_or(""),
                "decoder data before initialization dropped"
            );
            return command;
        };
        let control = self.control;
        self.pipe.push_blocking(
            MusicChunk {
                format,
                samples: samples.to_vec(),
                elapsed,
            },
            || control.command() != DecoderCommand::None,
        );
        self.command()
    }
}
