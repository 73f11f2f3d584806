//! The decoder thread: command loop, input setup and backend selection.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use playd_types::{DecoderCommand, DecoderError};

use crate::control::{DecoderControl, StartRequest};
use crate::decoder::Decoder;
use crate::input::{InputFactory, InputStream};
use crate::pipe::MusicPipe;
use crate::plugin::{DecoderPlugin, PluginError, PluginResult, StreamKinds};
use crate::registry::DecoderRegistry;
use crate::song::{SongMapper, locator_suffix};

pub const DEFAULT_DECODER: &str = "mp3";

/// How a decode attempt ended after the input became ready.
#[derive(Debug)]
enum Selection {
    /// A backend was invoked and returned.
    Decoded(PluginResult),
    /// STOP arrived while candidates were still being considered.
    Stopped,
    /// No candidate matched.
    NoBackend,
}

/// STOP observed between two candidates.
struct Stopped;

pub struct DecoderThread {
    control: Arc<DecoderControl>,
    registry: Arc<DecoderRegistry>,
    inputs: Arc<dyn InputFactory>,
    mapper: SongMapper,
    pipe: Arc<MusicPipe>,
    default_decoder: String,
}

impl DecoderThread {
    pub fn new(
        control: Arc<DecoderControl>,
        registry: Arc<DecoderRegistry>,
        inputs: Arc<dyn InputFactory>,
        mapper: SongMapper,
        pipe: Arc<MusicPipe>,
    ) -> Self {
        Self {
            control,
            registry,
            inputs,
            mapper,
            pipe,
            default_decoder: DEFAULT_DECODER.to_string(),
        }
    }

    /// Backend used for remote streams nothing else claimed.
    pub fn with_default_decoder(mut self, name: impl Into<String>) -> Self {
        self.default_decoder = name.into();
        self
    }

    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("decoder".into())
            .spawn(move || self.run())
    }

    /// Serve commands forever.
    pub fn run(&self) {
        tracing::debug!(
            plugins = self.registry.len(),
            default_decoder = %self.default_decoder,
            "decoder thread started"
        );
        loop {
            self.step();
        }
    }

    /// One loop iteration: act on the pending command or sleep until there is one.
    pub(crate) fn step(&self) {
        match self.control.idle_command() {
            DecoderCommand::Start | DecoderCommand::Seek => self.decode_start(),
            DecoderCommand::Stop => self.control.acknowledge(),
            DecoderCommand::None => self.control.wait_for_command(),
        }
        self.control.signal_player();
    }

    fn decode_start(&self) {
        match self.control.begin() {
            Some(request) => self.attempt(&request),
            None => tracing::warn!("start requested without a song"),
        }
        self.control.finish();
    }

    /// Everything between publishing the song and teardown. Any input still owned
    /// here is closed when this returns.
    fn attempt(&self, request: &StartRequest) {
        let song = &request.song;
        let locator = self.mapper.locator(song);

        let mut input = match self.inputs.open(&locator) {
            Ok(input) => input,
            Err(err) => {
                tracing::warn!(song = %song.uri(), error = %format!("{err:#}"), "failed to open input");
                self.control.set_error(DecoderError::File);
                return;
            }
        };

        self.control.set_started();

        while !input.is_ready() {
            if self.control.command() != DecoderCommand::None {
                tracing::debug!(song = %song.uri(), "command pending before input ready");
                return;
            }
            if let Err(err) = input.buffer() {
                tracing::warn!(song = %song.uri(), error = %err, "input buffering failed");
                self.control.set_error(DecoderError::File);
                return;
            }
        }

        self.control.set_seekable(input.is_seekable());
        if self.stop_pending() {
            return;
        }

        let mut decoder = Decoder::new(&self.control, &self.pipe, request.seek_to);
        let selection = if song.is_file() {
            self.decode_file_song(&mut decoder, input, &locator)
        } else {
            self.decode_url_song(&mut decoder, input, &locator)
        };

        match selection {
            Selection::Decoded(Ok(())) => {
                tracing::debug!(song = %song.uri(), plugin = decoder.plugin_name().unwrap_or(""), "decode finished");
            }
            Selection::Decoded(Err(PluginError::UnknownType)) => {
                tracing::warn!(song = %song.uri(), plugin = decoder.plugin_name().unwrap_or(""), "backend did not recognize input");
                self.control.set_error(DecoderError::UnknownType);
            }
            Selection::Decoded(Err(PluginError::Failed(err))) => {
                tracing::warn!(
                    song = %song.uri(),
                    plugin = decoder.plugin_name().unwrap_or(""),
                    error = %format!("{err:#}"),
                    "decode failed"
                );
                self.control.set_error(DecoderError::File);
            }
            Selection::NoBackend => {
                tracing::warn!(song = %song.uri(), "no decoder plugin for input");
                self.control.set_error(DecoderError::UnknownType);
            }
            Selection::Stopped => {
                tracing::debug!(song = %song.uri(), "stopped during plugin selection");
            }
        }
    }

    fn stop_pending(&self) -> bool {
        self.control.command() == DecoderCommand::Stop
    }

    /// First usable candidate whose probe accepts the input.
    fn first_accepting<'r>(
        &self,
        candidates: impl Iterator<Item = &'r DecoderPlugin>,
        usable: impl Fn(&DecoderPlugin) -> bool,
        input: &mut dyn InputStream,
    ) -> Result<Option<&'r DecoderPlugin>, Stopped> {
        for plugin in candidates.filter(|p| usable(*p)) {
            if self.stop_pending() {
                return Err(Stopped);
            }
            if plugin.accepts(input) {
                return Ok(Some(plugin));
            }
            tracing::debug!(plugin = plugin.name(), "probe rejected input");
        }
        Ok(None)
    }

    fn decode_url_song(
        &self,
        decoder: &mut Decoder<'_>,
        mut input: Box<dyn InputStream>,
        locator: &str,
    ) -> Selection {
        let usable = |p: &DecoderPlugin| {
            p.has_stream_decode() && p.stream_kinds().contains(StreamKinds::URL)
        };
        let mime = input.mime_type().map(str::to_owned);
        let suffix = locator_suffix(locator);

        let by_mime = self.first_accepting(
            self.registry.by_mime_type(mime.as_deref()),
            usable,
            &mut *input,
        );
        let found = match by_mime {
            Err(Stopped) => return Selection::Stopped,
            Ok(Some(plugin)) => Some(plugin),
            Ok(None) => match self.first_accepting(
                self.registry.by_suffix(suffix.as_deref()),
                usable,
                &mut *input,
            ) {
                Err(Stopped) => return Selection::Stopped,
                Ok(found) => found,
            },
        };

        let plugin = match found {
            Some(plugin) => plugin,
            None => {
                if self.stop_pending() {
                    return Selection::Stopped;
                }
                let Some(plugin) = self.registry.by_name(&self.default_decoder) else {
                    return Selection::NoBackend;
                };
                tracing::info!(
                    plugin = plugin.name(),
                    mime = mime.as_deref().unwrap_or(""),
                    "no plugin matched stream, using default decoder"
                );
                plugin
            }
        };

        decoder.set_plugin(plugin.name());
        tracing::info!(plugin = plugin.name(), url = locator, "decoding stream");
        match plugin.decode_stream(decoder, input) {
            Some(result) => Selection::Decoded(result),
            None => Selection::NoBackend,
        }
    }

    fn decode_file_song(
        &self,
        decoder: &mut Decoder<'_>,
        mut input: Box<dyn InputStream>,
        path: &str,
    ) -> Selection {
        let usable = |p: &DecoderPlugin| {
            p.stream_kinds().contains(StreamKinds::FILE)
                && (p.has_file_decode() || p.has_stream_decode())
        };
        let suffix = locator_suffix(path);

        let plugin = match self.first_accepting(
            self.registry.by_suffix(suffix.as_deref()),
            usable,
            &mut *input,
        ) {
            Err(Stopped) => return Selection::Stopped,
            Ok(None) => return Selection::NoBackend,
            Ok(Some(plugin)) => plugin,
        };

        decoder.set_plugin(plugin.name());
        let result = if plugin.has_file_decode() {
            drop(input);
            tracing::info!(plugin = plugin.name(), path, "decoding file");
            plugin.decode_file(decoder, Path::new(path))
        } else {
            tracing::info!(plugin = plugin.name(), path, "decoding file stream");
            plugin.decode_stream(decoder, input)
        };
        match result {
            Some(result) => Selection::Decoded(result),
            None => Selection::NoBackend,
        }
    }
}
