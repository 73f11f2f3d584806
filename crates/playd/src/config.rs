//! Configuration loading and parsing.
//!
//! Every key is optional; [`Settings::resolve`] fills in defaults and applies CLI
//! overrides on top of the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::cli::Args;
use playd_decoder::config::DecoderConfig;
use playd_decoder::format::SampleFormat;

/// Top-level config loaded from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct PlaydConfig {
    /// Root for relative song paths.
    pub music_directory: Option<String>,
    /// Fallback decoder for unmatched remote streams.
    pub default_decoder: Option<String>,
    /// Seconds of decoded audio buffered ahead of the output.
    pub buffer_seconds: Option<f32>,
    /// Enabled decoder plugins (all when unset).
    pub decoders: Option<Vec<String>>,
    pub output: Option<OutputConfig>,
    pub http: Option<HttpConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OutputConfig {
    /// `device` (default) or `pipe`.
    pub kind: Option<OutputKind>,
    /// Shell command for the pipe output.
    pub command: Option<String>,
    /// Device name substring for the device output.
    pub device: Option<String>,
    /// Sample encoding written to the pipe: `s16` (default) or `f32`.
    pub format: Option<String>,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Device,
    Pipe,
}

#[derive(Debug, Default, Deserialize)]
pub struct HttpConfig {
    /// Bytes fetched per range request.
    pub block_size: Option<usize>,
    /// Connect/response timeout in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl PlaydConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        Self::parse(&raw).with_context(|| format!("parse config {:?}", path))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str::<PlaydConfig>(raw)?)
    }
}

/// Where decoded audio goes.
#[derive(Clone, Debug, PartialEq)]
pub enum OutputSettings {
    Device { device: Option<String> },
    Pipe { command: String, sample_format: SampleFormat },
}

/// Fully resolved runtime settings.
#[derive(Clone, Debug)]
pub struct Settings {
    pub music_dir: Option<PathBuf>,
    pub decoder: DecoderConfig,
    pub output: OutputSettings,
}

impl Settings {
    /// Merge the config file with CLI flags; flags win.
    pub fn resolve(cfg: PlaydConfig, args: &Args) -> Result<Self> {
        let mut decoder = DecoderConfig::default();
        if let Some(name) = args.default_decoder.clone().or(cfg.default_decoder) {
            decoder.default_decoder = name;
        }
        if let Some(secs) = args.buffer_seconds.or(cfg.buffer_seconds) {
            if !(secs.is_finite() && secs > 0.0) {
                bail!("buffer_seconds must be positive, got {secs}");
            }
            decoder.buffer_seconds = secs;
        }
        if let Some(names) = cfg.decoders {
            decoder.enabled_plugins = names;
        }
        if let Some(http) = cfg.http {
            if let Some(block_size) = http.block_size {
                if block_size == 0 {
                    bail!("http.block_size must be positive");
                }
                decoder.http.block_size = block_size;
            }
            if let Some(ms) = http.timeout_ms {
                decoder.http.timeout = Duration::from_millis(ms);
            }
        }

        let music_dir = args
            .music_dir
            .clone()
            .or_else(|| cfg.music_directory.map(PathBuf::from));

        let output_cfg = cfg.output.unwrap_or_default();
        let output = if let Some(command) = args.pipe.clone() {
            OutputSettings::Pipe {
                command,
                sample_format: pipe_sample_format(output_cfg.format.as_deref())?,
            }
        } else if args.device.is_some() {
            OutputSettings::Device {
                device: normalize_device_name(args.device.clone()),
            }
        } else {
            match output_cfg.kind.unwrap_or(OutputKind::Device) {
                OutputKind::Device => OutputSettings::Device {
                    device: normalize_device_name(output_cfg.device),
                },
                OutputKind::Pipe => {
                    let Some(command) = output_cfg.command else {
                        bail!("output.command is required for the pipe output");
                    };
                    OutputSettings::Pipe {
                        command,
                        sample_format: pipe_sample_format(output_cfg.format.as_deref())?,
                    }
                }
            }
        };

        Ok(Self {
            music_dir,
            decoder,
            output,
        })
    }
}

fn pipe_sample_format(raw: Option<&str>) -> Result<SampleFormat> {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        None | Some("s16") => Ok(SampleFormat::S16),
        Some("f32") => Ok(SampleFormat::F32),
        Some(other) => bail!("unsupported pipe sample format: {other}"),
    }
}

fn normalize_device_name(name: Option<String>) -> Option<String> {
    name.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
