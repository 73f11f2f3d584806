//! Audio outputs the player feeds decoded PCM into.

mod device;
mod pipe;

use anyhow::Result;

use crate::format::AudioFormat;

pub use device::{DeviceOutput, list_devices, pick_device};
pub use pipe::PipeOutput;

/// Sink for interleaved PCM.
pub trait AudioOutput {
    fn name(&self) -> &str;

    /// Prepare for `format`. The output may rewrite the format (typically the sample
    /// encoding) to what it will accept; callers must convert to the returned format.
    fn open(&mut self, format: &mut AudioFormat) -> Result<()>;

    /// Write native-endian samples in the opened format. Returns the number of bytes
    /// consumed, which is always a positive amount on success.
    fn play(&mut self, bytes: &[u8]) -> Result<usize>;

    /// Release the sink. Safe to call when not open.
    fn close(&mut self);

    /// Drop any audio buffered inside the output (seek, stop).
    fn cancel(&mut self) {}

    fn pause(&mut self, _paused: bool) {}
}

/// Write all of `bytes`, looping over partial writes.
pub fn play_all(output: &mut dyn AudioOutput, mut bytes: &[u8]) -> Result<()> {
    while !bytes.is_empty() {
        let n = output.play(bytes)?;
        if n == 0 {
            anyhow::bail!("output {} accepted no data", output.name());
        }
        bytes = &bytes[n.min(bytes.len())..];
    }
    Ok(())
}
