//! Shared Symphonia decode loop used by every built-in backend.
//!
//! Probes the container, decodes the first audio track into interleaved `f32` and
//! pushes it into the music pipe through [`Decoder::data`], handling STOP and SEEK
//! between packets.

use std::fs::File;
use std::io;
use std::path::Path;

use anyhow::{Context, anyhow};
use playd_types::DecoderCommand;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, CodecParameters, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo, SeekedTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use crate::decoder::Decoder;
use crate::input::{InputSource, InputStream};
use crate::plugin::{PluginError, PluginResult};

/// Decode an input stream. `extension` is passed to Symphonia as a format hint.
pub(crate) fn decode_stream(
    decoder: &mut Decoder<'_>,
    input: Box<dyn InputStream>,
    extension: &str,
) -> PluginResult {
    let mut hint = Hint::new();
    hint.with_extension(extension);
    if let Some(mime) = input.mime_type() {
        hint.mime_type(mime);
    }
    decode_source(decoder, Box::new(InputSource::new(input)), hint)
}

/// Open `path` directly and decode it.
pub(crate) fn decode_file(decoder: &mut Decoder<'_>, path: &Path) -> PluginResult {
    let file = File::open(path).with_context(|| format!("open {:?}", path))?;
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    decode_source(decoder, Box::new(file), hint)
}

fn decode_source(
    decoder: &mut Decoder<'_>,
    source: Box<dyn MediaSource>,
    hint: Hint,
) -> PluginResult {
    let seekable = source.is_seekable();
    let mss = MediaSourceStream::new(source, Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(plugin_error)?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(PluginError::UnknownType)?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let rate = codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("unknown sample rate"))?;
    let channels = codec_params
        .channels
        .ok_or_else(|| anyhow!("unknown channel layout"))?
        .count();
    let channels = u16::try_from(channels).context("too many channels")?;

    let mut codec = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(plugin_error)?;

    decoder.initialized(rate, channels, seekable, duration_secs(&codec_params));

    // Frames still to drop after an accurate seek landed before its target.
    let mut skip_frames: u64 = 0;
    loop {
        match decoder.command() {
            DecoderCommand::Stop => return Ok(()),
            DecoderCommand::Seek => {
                let target = decoder.seek_where();
                match seek(&mut *format, track_id, target) {
                    Ok(seeked) => {
                        codec.reset();
                        skip_frames = seeked.required_ts.saturating_sub(seeked.actual_ts);
                        decoder.command_finished();
                    }
                    Err(err) => {
                        tracing::warn!(target_secs = target, error = %err, "seek failed");
                        decoder.seek_error();
                    }
                }
                continue;
            }
            DecoderCommand::Start | DecoderCommand::None => {}
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Ok(());
            }
            Err(SymphoniaError::ResetRequired) => {
                tracing::debug!("stream parameters changed, ending track");
                return Ok(());
            }
            Err(err) => return Err(plugin_error(err)),
        };
        if packet.track_id() != track_id {
            continue;
        }
        if skip_frames > 0 && packet.dur() <= skip_frames {
            skip_frames -= packet.dur();
            continue;
        }
        let skip = std::mem::take(&mut skip_frames);
        let elapsed = codec_params
            .time_base
            .map(|tb| {
                let t = tb.calc_time(packet.ts() + skip);
                t.seconds as f64 + t.frac
            })
            .unwrap_or(0.0);

        let decoded = match codec.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(err)) => {
                tracing::debug!(error = err, "skipping undecodable packet");
                continue;
            }
            Err(err) => return Err(plugin_error(err)),
        };

        let spec = *decoded.spec();
        let mut samples = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
        samples.copy_interleaved_ref(decoded);
        let samples = samples.samples();
        let skip = (skip as usize)
            .saturating_mul(spec.channels.count())
            .min(samples.len());

        if decoder.data(&samples[skip..], elapsed) == DecoderCommand::Stop {
            return Ok(());
        }
    }
}

fn seek(format: &mut dyn FormatReader, track_id: u32, secs: f64) -> Result<SeekedTo, SymphoniaError> {
    format.seek(
        SeekMode::Accurate,
        SeekTo::Time {
            time: Time::from(secs.max(0.0)),
            track_id: Some(track_id),
        },
    )
}

/// Unsupported containers and codecs mean "not my format"; everything else is a failure.
fn plugin_error(err: SymphoniaError) -> PluginError {
    match err {
        SymphoniaError::Unsupported(what) => {
            tracing::debug!(what, "symphonia: unsupported");
            PluginError::UnknownType
        }
        other => PluginError::Failed(anyhow::Error::new(other)),
    }
}

/// Track length in seconds when the container knows the frame count.
fn duration_secs(params: &CodecParameters) -> Option<f64> {
    let frames = params.n_frames?;
    let rate = params.sample_rate?;
    if rate == 0 {
        return None;
    }
    Some(frames as f64 / rate as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use playd_types::DecoderState;

    use crate::control::{DecoderControl, Notify};
    use crate::pipe::MusicPipe;
    use crate::plugin::DecoderPlugin;
    use crate::plugins::builtin_plugins;
    use crate::testing::MemInput;

    const RATE: u32 = 8_000;
    const FRAMES: u32 = 4_000;

    /// 16-bit stereo PCM WAV whose left channel counts frames and right channel is silent.
    fn wav_bytes() -> Vec<u8> {
        let data_len = FRAMES * 4;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(4 + 8 + 16 + 8 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&RATE.to_le_bytes());
        out.extend_from_slice(&(RATE * 4).to_le_bytes());
        out.extend_from_slice(&4u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for frame in 0..FRAMES {
            out.extend_from_slice(&(frame as i16).to_le_bytes());
            out.extend_from_slice(&0i16.to_le_bytes());
        }
        out
    }

    fn wav_plugin() -> DecoderPlugin {
        builtin_plugins()
            .into_iter()
            .find(|p| p.name() == "wav")
            .unwrap()
    }

    fn setup() -> (DecoderControl, MusicPipe) {
        (
            DecoderControl::new(Arc::new(Notify::new())),
            MusicPipe::new(1 << 16),
        )
    }

    fn drain(pipe: &MusicPipe) -> Vec<crate::pipe::MusicChunk> {
        std::iter::from_fn(|| pipe.pop()).collect()
    }

    fn frame_index(sample: f32) -> i32 {
        (sample * 32_768.0).round() as i32
    }

    #[test]
    fn wav_stream_decodes_into_pipe() {
        let (dc, pipe) = setup();
        let mut decoder = Decoder::new(&dc, &pipe, None);

        let result = wav_plugin().decode_stream(&mut decoder, Box::new(MemInput::new(wav_bytes())));

        assert!(matches!(result, Some(Ok(()))));
        assert_eq!(dc.state(), DecoderState::Decode);
        let format = dc.audio_format().unwrap();
        assert_eq!((format.sample_rate, format.channels), (RATE, 2));
        assert_eq!(dc.snapshot().total_time, Some(0.5));
        assert!(dc.seekable());

        let chunks = drain(&pipe);
        assert_eq!(chunks[0].elapsed, 0.0);
        let samples: Vec<f32> = chunks.iter().flat_map(|c| c.samples.iter().copied()).collect();
        assert_eq!(samples.len(), FRAMES as usize * 2);
        assert_eq!(frame_index(samples[0]), 0);
        assert_eq!(frame_index(samples[200]), 100);
        assert_eq!(samples[201], 0.0);
    }

    #[test]
    fn pending_stop_ends_before_first_packet() {
        let (dc, pipe) = setup();
        dc.request(DecoderCommand::Stop, None, 0.0);
        let mut decoder = Decoder::new(&dc, &pipe, None);

        let result = wav_plugin().decode_stream(&mut decoder, Box::new(MemInput::new(wav_bytes())));

        assert!(matches!(result, Some(Ok(()))));
        assert_eq!(dc.state(), DecoderState::Decode);
        assert!(pipe.is_empty());
    }

    #[test]
    fn initial_seek_starts_at_exact_frame() {
        let (dc, pipe) = setup();
        let mut decoder = Decoder::new(&dc, &pipe, Some(0.25));

        let result = wav_plugin().decode_stream(&mut decoder, Box::new(MemInput::new(wav_bytes())));

        assert!(matches!(result, Some(Ok(()))));
        let chunks = drain(&pipe);
        assert!((chunks[0].elapsed - 0.25).abs() < 1e-9);
        assert_eq!(frame_index(chunks[0].samples[0]), 2_000);
        let total: usize = chunks.iter().map(|c| c.samples.len()).sum();
        assert_eq!(total, (FRAMES as usize - 2_000) * 2);
    }

    #[test]
    fn non_wave_riff_is_unknown_type() {
        let (dc, pipe) = setup();
        let mut decoder = Decoder::new(&dc, &pipe, None);
        let mut junk = Vec::new();
        junk.extend_from_slice(b"RIFF");
        junk.extend_from_slice(&68u32.to_le_bytes());
        junk.extend_from_slice(b"JUNK");
        junk.extend_from_slice(&[0u8; 64]);

        let result = wav_plugin().decode_stream(&mut decoder, Box::new(MemInput::new(junk)));

        assert!(matches!(result, Some(Err(PluginError::UnknownType))));
        assert!(pipe.is_empty());
    }

    #[test]
    fn duration_secs_handles_zero_rate() {
        let mut params = CodecParameters::new();
        params.sample_rate = Some(0);
        params.n_frames = Some(100);
        assert!(duration_secs(&params).is_none());
    }

    #[test]
    fn duration_secs_computes() {
        let mut params = CodecParameters::new();
        params.sample_rate = Some(48_000);
        params.n_frames = Some(96_000);
        assert_eq!(duration_secs(&params), Some(2.0));
    }

    #[test]
    fn unsupported_maps_to_unknown_type() {
        assert!(matches!(
            plugin_error(SymphoniaError::Unsupported("core (probe): no suitable format reader found")),
            PluginError::UnknownType
        ));
        assert!(matches!(
            plugin_error(SymphoniaError::DecodeError("bad frame")),
            PluginError::Failed(_)
        ));
    }
}
