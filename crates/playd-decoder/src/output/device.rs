//! CPAL sound-device output.
//!
//! `play` feeds a bounded sample queue; the real-time callback drains it without
//! blocking and plays silence on underrun. The stream runs at the source sample rate
//! (no resampling), so devices that cannot do that rate are refused at `open`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::AudioOutput;
use crate::format::{AudioFormat, SampleFormat, decode_f32_samples};

/// Seconds of audio the device queue holds.
const QUEUE_SECONDS: f32 = 0.5;
const PUSH_POLL: Duration = Duration::from_millis(20);

/// Pick the first output device whose name contains `needle` (case-insensitive), or
/// the default device.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle {
        let mut devices = host.output_devices().context("No output devices")?;
        return devices
            .find(|d| {
                d.description()
                    .ok()
                    .map(|n| matches_device_name(&n.name(), needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Print available output devices to stdout.
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let devices = host.output_devices().context("No output devices")?;
    for (i, d) in devices.enumerate() {
        println!("#{i}: {}", d.description()?);
    }
    Ok(())
}

/// Pick a supported output config at exactly `rate`, preferring the source channel
/// count and then float sample formats.
fn pick_output_config(
    device: &cpal::Device,
    rate: u32,
    channels: u16,
) -> Result<cpal::SupportedStreamConfig> {
    let mut best: Option<(u8, u8, cpal::SupportedStreamConfigRange)> = None;
    for range in device.supported_output_configs()? {
        if rate < range.min_sample_rate() || rate > range.max_sample_rate() {
            continue;
        }
        let channel_rank = u8::from(range.channels() != channels);
        let format_rank = sample_format_rank(range.sample_format());
        let replace = match &best {
            None => true,
            Some((b_channels, b_format, _)) => {
                (channel_rank, format_rank) < (*b_channels, *b_format)
            }
        };
        if replace {
            best = Some((channel_rank, format_rank, range));
        }
    }
    best.map(|(_, _, range)| range.with_sample_rate(rate))
        .ok_or_else(|| anyhow!("device cannot play at {rate} Hz"))
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}

/// Bounded interleaved sample queue between `play` and the device callback.
struct SampleQueue {
    samples: Mutex<VecDeque<f32>>,
    space: Condvar,
    capacity: usize,
    closed: AtomicBool,
}

impl SampleQueue {
    fn new(capacity: usize) -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            space: Condvar::new(),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<f32>> {
        self.samples.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append as many samples as fit, waiting while the queue is full. Returns the
    /// number accepted; zero only once the queue is closed.
    fn push(&self, samples: &[f32]) -> usize {
        let mut q = self.lock();
        loop {
            if self.closed.load(Ordering::Relaxed) {
                return 0;
            }
            if q.len() < self.capacity {
                break;
            }
            let (nq, _) = self
                .space
                .wait_timeout(q, PUSH_POLL)
                .unwrap_or_else(|e| e.into_inner());
            q = nq;
        }
        let n = samples.len().min(self.capacity - q.len());
        q.extend(&samples[..n]);
        n
    }

    /// Fill `out` without blocking; returns how many samples were available.
    fn pop_into(&self, out: &mut [f32]) -> usize {
        let mut q = self.lock();
        let n = out.len().min(q.len());
        for (dst, src) in out.iter_mut().zip(q.drain(..n)) {
            *dst = src;
        }
        drop(q);
        if n > 0 {
            self.space.notify_all();
        }
        n
    }

    fn clear(&self) {
        self.lock().clear();
        self.space.notify_all();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.clear();
    }
}

struct OpenStream {
    // Held for its lifetime; dropping stops playback.
    stream: cpal::Stream,
    queue: Arc<SampleQueue>,
}

/// Output to a sound device through CPAL.
///
/// Not `Send`: create it on the thread that plays through it.
pub struct DeviceOutput {
    needle: Option<String>,
    open: Option<OpenStream>,
    paused: Arc<AtomicBool>,
    scratch: Vec<f32>,
}

impl DeviceOutput {
    pub fn new(needle: Option<String>) -> Self {
        Self {
            needle,
            open: None,
            paused: Arc::new(AtomicBool::new(false)),
            scratch: Vec::new(),
        }
    }
}

impl AudioOutput for DeviceOutput {
    fn name(&self) -> &str {
        "device"
    }

    fn open(&mut self, format: &mut AudioFormat) -> Result<()> {
        self.close();
        format.sample_format = SampleFormat::F32;

        let host = cpal::default_host();
        let device = pick_device(&host, self.needle.as_deref())?;
        let supported = pick_output_config(&device, format.sample_rate, format.channels)?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        if config.sample_rate != format.sample_rate {
            bail!(
                "device runs at {} Hz, source is {} Hz",
                config.sample_rate,
                format.sample_rate
            );
        }

        let capacity = (format.sample_rate as f32 * QUEUE_SECONDS).ceil() as usize
            * format.channels as usize;
        let queue = Arc::new(SampleQueue::new(capacity));
        self.paused.store(false, Ordering::Relaxed);
        let stream = build_output_stream(
            &device,
            &config,
            sample_format,
            format.channels as usize,
            queue.clone(),
            self.paused.clone(),
        )?;
        stream.play().context("start output stream")?;

        tracing::info!(
            device = %device.description().map(|d| d.to_string()).unwrap_or_default(),
            format = %format,
            device_channels = config.channels,
            device_format = ?sample_format,
            "device output opened"
        );
        self.open = Some(OpenStream { stream, queue });
        Ok(())
    }

    fn play(&mut self, bytes: &[u8]) -> Result<usize> {
        let open = self
            .open
            .as_ref()
            .ok_or_else(|| anyhow!("device output is not open"))?;
        decode_f32_samples(bytes, &mut self.scratch);
        let n = open.queue.push(&self.scratch);
        if n == 0 && !self.scratch.is_empty() {
            bail!("device output closed");
        }
        Ok(n * 4)
    }

    fn close(&mut self) {
        if let Some(open) = self.open.take() {
            open.queue.close();
            drop(open.stream);
            tracing::debug!("device output closed");
        }
    }

    fn cancel(&mut self) {
        if let Some(open) = &self.open {
            open.queue.clear();
        }
    }

    fn pause(&mut self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }
}

fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    src_channels: usize,
    queue: Arc<SampleQueue>,
    paused: Arc<AtomicBool>,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, src_channels, queue, paused),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, src_channels, queue, paused),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, src_channels, queue, paused),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, src_channels, queue, paused),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    src_channels: usize,
    queue: Arc<SampleQueue>,
    paused: Arc<AtomicBool>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let dst_channels = config.channels as usize;
    let src_channels = src_channels.max(1);
    let mut src = Vec::new();

    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            if paused.load(Ordering::Relaxed) {
                data.fill(<T as cpal::Sample>::from_sample::<f32>(0.0));
                return;
            }
            let frames = data.len() / dst_channels;
            src.resize(frames * src_channels, 0.0);
            let got = queue.pop_into(&mut src) / src_channels;
            for frame in 0..frames {
                for ch in 0..dst_channels {
                    let sample = if frame < got {
                        map_channel(&src[frame * src_channels..][..src_channels], dst_channels, ch)
                    } else {
                        0.0
                    };
                    data[frame * dst_channels + ch] = <T as cpal::Sample>::from_sample::<f32>(sample);
                }
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Output sample for `dst_ch` from one source frame.
///
/// Mono is duplicated, stereo to mono is averaged, anything else clamps to the last
/// available source channel.
fn map_channel(frame: &[f32], dst_channels: usize, dst_ch: usize) -> f32 {
    match (frame.len(), dst_channels) {
        (2, 1) => 0.5 * (frame[0] + frame[1]),
        (1, _) => frame[0],
        (n, _) => frame[dst_ch.min(n - 1)],
    }
}
