//! Bounded queue of decoded PCM chunks between the decoder and player threads.
//!
//! The decoder pushes [`MusicChunk`]s (blocking while the pipe is full); the player
//! pops them without blocking and hands them to the output. Capacity is counted in
//! samples so that memory and latency stay bounded regardless of chunk sizes.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use crate::format::AudioFormat;

/// How often a blocked producer re-checks its abort condition.
const PUSH_POLL: Duration = Duration::from_millis(20);

/// Interleaved `f32` samples in a fixed format.
#[derive(Clone, Debug, PartialEq)]
pub struct MusicChunk {
    pub format: AudioFormat,
    pub samples: Vec<f32>,
    /// Song time (seconds) at the start of this chunk.
    pub elapsed: f64,
}

impl MusicChunk {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.format.channels.max(1) as usize
    }
}

pub struct MusicPipe {
    inner: Mutex<PipeInner>,
    cv: Condvar,
    max_samples: usize,
}

struct PipeInner {
    chunks: VecDeque<MusicChunk>,
    samples: usize,
}

/// Queue capacity in samples for `seconds` of audio at `rate_hz` and `channels`.
///
/// Non-finite or non-positive durations fall back to two seconds.
pub fn calc_max_buffered_samples(rate_hz: u32, channels: usize, buffer_seconds: f32) -> usize {
    let secs = if buffer_seconds.is_finite() && buffer_seconds > 0.0 {
        buffer_seconds
    } else {
        2.0
    };

    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.saturating_mul(channels)
}

impl MusicPipe {
    pub fn new(max_samples: usize) -> Self {
        Self {
            inner: Mutex::new(PipeInner {
                chunks: VecDeque::new(),
                samples: 0,
            }),
            cv: Condvar::new(),
            max_samples: max_samples.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PipeInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }

    pub fn len_samples(&self) -> usize {
        self.lock().samples
    }

    pub fn len_chunks(&self) -> usize {
        self.lock().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().chunks.is_empty()
    }

    /// Append a chunk, blocking while the pipe is full.
    ///
    /// `abort` is polled while waiting; returns `false` (chunk dropped) once it
    /// reports `true`. A chunk larger than the whole pipe is accepted when the pipe is
    /// empty, so an oversized chunk cannot wedge the producer.
    pub fn push_blocking(&self, chunk: MusicChunk, abort: impl Fn() -> bool) -> bool {
        let mut g = self.lock();
        while g.samples > 0 && g.samples + chunk.samples.len() > self.max_samples {
            if abort() {
                return false;
            }
            let (ng, _timeout) = self
                .cv
                .wait_timeout(g, PUSH_POLL)
                .unwrap_or_else(|e| e.into_inner());
            g = ng;
        }
        g.samples += chunk.samples.len();
        g.chunks.push_back(chunk);
        drop(g);
        self.cv.notify_all();
        true
    }

    /// Take the oldest chunk, or `None` if the pipe is empty.
    pub fn pop(&self) -> Option<MusicChunk> {
        let mut g = self.lock();
        let chunk = g.chunks.pop_front()?;
        g.samples -= chunk.samples.len();
        drop(g);
        self.cv.notify_all();
        Some(chunk)
    }

    /// Wait up to `timeout` for a chunk.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<MusicChunk> {
        let g = self.lock();
        let (mut g, _timeout) = self
            .cv
            .wait_timeout_while(g, timeout, |inner| inner.chunks.is_empty())
            .unwrap_or_else(|e| e.into_inner());
        let chunk = g.chunks.pop_front()?;
        g.samples -= chunk.samples.len();
        drop(g);
        self.cv.notify_all();
        Some(chunk)
    }

    /// Drop everything buffered (seek/stop) and wake a blocked producer.
    pub fn clear(&self) {
        let mut g = self.lock();
        g.chunks.clear();
        g.samples = 0;
        drop(g);
        self.cv.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SampleFormat;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn chunk(n: usize, elapsed: f64) -> MusicChunk {
        MusicChunk {
            format: AudioFormat::new(48_000, 2, SampleFormat::F32),
            samples: vec![0.0; n],
            elapsed,
        }
    }

    #[test]
    fn calc_max_buffered_samples_fallbacks() {
        assert_eq!(calc_max_buffered_samples(48_000, 2, 2.0), 192_000);
        assert_eq!(calc_max_buffered_samples(48_000, 2, -1.0), 192_000);
        assert_eq!(calc_max_buffered_samples(48_000, 2, f32::NAN), 192_000);
    }

    #[test]
    fn pop_returns_chunks_in_order() {
        let pipe = MusicPipe::new(64);
        assert!(pipe.push_blocking(chunk(4, 0.0), || false));
        assert!(pipe.push_blocking(chunk(6, 1.0), || false));
        assert_eq!(pipe.len_samples(), 10);
        assert_eq!(pipe.pop().unwrap().elapsed, 0.0);
        assert_eq!(pipe.pop().unwrap().elapsed, 1.0);
        assert!(pipe.pop().is_none());
        assert_eq!(pipe.len_samples(), 0);
    }

    #[test]
    fn push_blocks_until_space_frees() {
        let pipe = Arc::new(MusicPipe::new(8));
        assert!(pipe.push_blocking(chunk(8, 0.0), || false));

        let consumer = pipe.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            consumer.pop().unwrap()
        });

        assert!(pipe.push_blocking(chunk(4, 1.0), || false));
        assert_eq!(handle.join().unwrap().elapsed, 0.0);
        assert_eq!(pipe.len_chunks(), 1);
    }

    #[test]
    fn push_aborts_when_requested() {
        let pipe = MusicPipe::new(4);
        assert!(pipe.push_blocking(chunk(4, 0.0), || false));
        let abort = AtomicBool::new(true);
        assert!(!pipe.push_blocking(chunk(4, 1.0), || abort.load(Ordering::Relaxed)));
        assert_eq!(pipe.len_chunks(), 1);
    }

    #[test]
    fn oversized_chunk_accepted_into_empty_pipe() {
        let pipe = MusicPipe::new(4);
        assert!(pipe.push_blocking(chunk(10, 0.0), || true));
        assert_eq!(pipe.len_samples(), 10);
    }

    #[test]
    fn clear_empties_pipe() {
        let pipe = MusicPipe::new(64);
        pipe.push_blocking(chunk(4, 0.0), || false);
        pipe.clear();
        assert!(pipe.is_empty());
        assert!(pipe.pop_timeout(Duration::from_millis(5)).is_none());
    }

    #[test]
    fn frames_counts_per_channel() {
        assert_eq!(chunk(8, 0.0).frames(), 4);
    }
}
