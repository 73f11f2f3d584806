//! Decoder plugin descriptors.
//!
//! A [`DecoderPlugin`] is an immutable capability table: the formats it claims, the
//! stream kinds it accepts, an optional probe and up to two entry points. The decoder
//! thread only ever talks to backends through this table.

use std::fmt;
use std::ops::BitOr;
use std::path::Path;
use std::sync::Arc;

use crate::decoder::Decoder;
use crate::input::InputStream;

/// Set of stream kinds a plugin accepts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamKinds(u8);

impl StreamKinds {
    pub const NONE: StreamKinds = StreamKinds(0);
    /// Generic buffered byte streams (remote URLs).
    pub const URL: StreamKinds = StreamKinds(1);
    /// Local files.
    pub const FILE: StreamKinds = StreamKinds(2);

    pub const fn contains(self, other: StreamKinds) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for StreamKinds {
    type Output = StreamKinds;

    fn bitor(self, rhs: StreamKinds) -> StreamKinds {
        StreamKinds(self.0 | rhs.0)
    }
}

/// Why a backend gave up on an input.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// The input is not in a format this backend understands.
    #[error("unrecognized format")]
    UnknownType,
    /// Any other failure (I/O, corrupt data, codec setup).
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

pub type PluginResult = Result<(), PluginError>;

pub type ProbeFn = Arc<dyn Fn(&mut dyn InputStream) -> bool + Send + Sync>;
pub type StreamDecodeFn =
    Arc<dyn Fn(&mut Decoder<'_>, Box<dyn InputStream>) -> PluginResult + Send + Sync>;
pub type FileDecodeFn = Arc<dyn Fn(&mut Decoder<'_>, &Path) -> PluginResult + Send + Sync>;

/// Capability descriptor and entry points of one decoding backend.
#[derive(Clone)]
pub struct DecoderPlugin {
    name: &'static str,
    stream_kinds: StreamKinds,
    suffixes: &'static [&'static str],
    mime_types: &'static [&'static str],
    probe: Option<ProbeFn>,
    stream_decode: Option<StreamDecodeFn>,
    file_decode: Option<FileDecodeFn>,
}

impl DecoderPlugin {
    pub fn new(name: &'static str, stream_kinds: StreamKinds) -> Self {
        Self {
            name,
            stream_kinds,
            suffixes: &[],
            mime_types: &[],
            probe: None,
            stream_decode: None,
            file_decode: None,
        }
    }

    pub fn with_suffixes(mut self, suffixes: &'static [&'static str]) -> Self {
        self.suffixes = suffixes;
        self
    }

    pub fn with_mime_types(mut self, mime_types: &'static [&'static str]) -> Self {
        self.mime_types = mime_types;
        self
    }

    pub fn with_probe<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut dyn InputStream) -> bool + Send + Sync + 'static,
    {
        self.probe = Some(Arc::new(f));
        self
    }

    pub fn with_stream_decode<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Decoder<'_>, Box<dyn InputStream>) -> PluginResult + Send + Sync + 'static,
    {
        self.stream_decode = Some(Arc::new(f));
        self
    }

    pub fn with_file_decode<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Decoder<'_>, &Path) -> PluginResult + Send + Sync + 'static,
    {
        self.file_decode = Some(Arc::new(f));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stream_kinds(&self) -> StreamKinds {
        self.stream_kinds
    }

    pub fn suffixes(&self) -> &'static [&'static str] {
        self.suffixes
    }

    pub fn mime_types(&self) -> &'static [&'static str] {
        self.mime_types
    }

    pub fn has_probe(&self) -> bool {
        self.probe.is_some()
    }

    pub fn has_stream_decode(&self) -> bool {
        self.stream_decode.is_some()
    }

    pub fn has_file_decode(&self) -> bool {
        self.file_decode.is_some()
    }

    /// Run the probe; a plugin without one accepts everything.
    pub fn accepts(&self, input: &mut dyn InputStream) -> bool {
        match &self.probe {
            Some(probe) => probe(input),
            None => true,
        }
    }

    pub fn supports_suffix(&self, suffix: &str) -> bool {
        self.suffixes.iter().any(|s| s.eq_ignore_ascii_case(suffix))
    }

    pub fn supports_mime_type(&self, mime: &str) -> bool {
        self.mime_types.iter().any(|m| m.eq_ignore_ascii_case(mime))
    }

    /// Invoke the stream entry point. Returns `None` when the plugin has none.
    pub fn decode_stream(
        &self,
        decoder: &mut Decoder<'_>,
        input: Box<dyn InputStream>,
    ) -> Option<PluginResult> {
        self.stream_decode.as_ref().map(|f| f(decoder, input))
    }

    /// Invoke the file entry point. Returns `None` when the plugin has none.
    pub fn decode_file(&self, decoder: &mut Decoder<'_>, path: &Path) -> Option<PluginResult> {
        self.file_decode.as_ref().map(|f| f(decoder, path))
    }
}

impl fmt::Debug for DecoderPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderPlugin")
            .field("name", &self.name)
            .field("stream_kinds", &self.stream_kinds)
            .field("suffixes", &self.suffixes)
            .field("mime_types", &self.mime_types)
            .field("probe", &self.probe.is_some())
            .field("stream_decode", &self.stream_decode.is_some())
            .field("file_decode", &self.file_decode.is_some())
            .finish()
    }
}
