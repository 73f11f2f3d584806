use crate::input::HttpInputConfig;
use crate::pipe::{MusicPipe, calc_max_buffered_samples};
use crate::thread::DEFAULT_DECODER;

/// Rate and channel count used to size the music pipe, independent of the song.
const PIPE_SIZING_RATE: u32 = 48_000;
const PIPE_SIZING_CHANNELS: usize = 2;

/// Decoder subsystem tuning.
#[derive(Clone, Debug)]
pub struct DecoderConfig {
    /// Decoded audio buffered ahead of the output.
    pub buffer_seconds: f32,
    /// Backend for remote streams that no MIME type or suffix claimed.
    pub default_decoder: String,
    /// Limit the registry to these backends; empty keeps all.
    pub enabled_plugins: Vec<String>,
    pub http: HttpInputConfig,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            buffer_seconds: 2.0,
            default_decoder: DEFAULT_DECODER.to_string(),
            enabled_plugins: Vec::new(),
            http: HttpInputConfig::default(),
        }
    }
}

impl DecoderConfig {
    pub fn pipe(&self) -> MusicPipe {
        MusicPipe::new(calc_max_buffered_samples(
            PIPE_SIZING_RATE,
            PIPE_SIZING_CHANNELS,
            self.buffer_seconds,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pipe_holds_two_seconds() {
        let config = DecoderConfig::default();
        assert_eq!(config.default_decoder, "mp3");
        assert_eq!(config.pipe().max_samples(), 192_000);
    }
}
