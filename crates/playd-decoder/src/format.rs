//! PCM format description and sample conversion.

use std::fmt;

/// Sample encoding of interleaved PCM bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleFormat {
    /// Signed 16-bit, native endian.
    S16,
    /// 32-bit float, native endian.
    F32,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::S16 => 2,
            SampleFormat::F32 => 4,
        }
    }
}

/// Format of a PCM stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u16, sample_format: SampleFormat) -> Self {
        Self {
            sample_rate,
            channels,
            sample_format,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.sample_format.bytes_per_sample() * self.channels as usize
    }

    /// Same rate and channel layout, ignoring the sample encoding.
    pub fn same_layout(&self, other: &AudioFormat) -> bool {
        self.sample_rate == other.sample_rate && self.channels == other.channels
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{:?}:{}",
            self.sample_rate, self.sample_format, self.channels
        )
    }
}

/// Encode interleaved `f32` samples into `out` using `format`.
pub fn encode_samples(samples: &[f32], format: SampleFormat, out: &mut Vec<u8>) {
    out.clear();
    out.reserve(samples.len() * format.bytes_per_sample());
    match format {
        SampleFormat::S16 => {
            for s in samples {
                let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
                out.extend_from_slice(&v.to_ne_bytes());
            }
        }
        SampleFormat::F32 => {
            for s in samples {
                out.extend_from_slice(&s.to_ne_bytes());
            }
        }
    }
}

/// Decode native-endian `f32` bytes back into samples. Trailing partial samples are dropped.
pub fn decode_f32_samples(bytes: &[u8], out: &mut Vec<f32>) {
    out.clear();
    out.extend(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]])),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_s16_clamps() {
        let mut out = Vec::new();
        encode_samples(&[0.0, 1.0, -1.0, 2.0, -3.0], SampleFormat::S16, &mut out);
        let decoded: Vec<i16> = out
            .chunks_exact(2)
            .map(|c| i16::from_ne_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(decoded, vec![0, i16::MAX, -i16::MAX, i16::MAX, -i16::MAX]);
    }

    #[test]
    fn f32_bytes_survive_encoding() {
        let mut bytes = Vec::new();
        encode_samples(&[0.25, -0.5], SampleFormat::F32, &mut bytes);
        assert_eq!(bytes.len(), 8);
        let mut samples = Vec::new();
        decode_f32_samples(&bytes, &mut samples);
        assert_eq!(samples, vec![0.25, -0.5]);
    }

    #[test]
    fn frame_size_and_layout() {
        let a = AudioFormat::new(44_100, 2, SampleFormat::S16);
        let b = AudioFormat::new(44_100, 2, SampleFormat::F32);
        assert_eq!(a.frame_size(), 4);
        assert_eq!(b.frame_size(), 8);
        assert!(a.same_layout(&b));
        assert_eq!(a.to_string(), "44100:S16:2");
    }
}
