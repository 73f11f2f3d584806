use std::io::Write;
use std::process::{Child, ChildStdin, Command, Stdio};

use anyhow::{Context, Result, anyhow, bail};

use super::AudioOutput;
use crate::format::{AudioFormat, SampleFormat};

/// Writes raw PCM to the stdin of a shell command, e.g. `aplay -f cd` or `cat > dump.pcm`.
pub struct PipeOutput {
    command: String,
    sample_format: SampleFormat,
    child: Option<(Child, ChildStdin)>,
}

impl PipeOutput {
    pub fn new(command: impl Into<String>, sample_format: SampleFormat) -> Result<Self> {
        let command = command.into();
        if command.trim().is_empty() {
            bail!("pipe output requires a command");
        }
        Ok(Self {
            command,
            sample_format,
            child: None,
        })
    }
}

impl AudioOutput for PipeOutput {
    fn name(&self) -> &str {
        "pipe"
    }

    fn open(&mut self, format: &mut AudioFormat) -> Result<()> {
        self.close();
        format.sample_format = self.sample_format;

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn pipe command {:?}", self.command))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("pipe command has no stdin"))?;
        tracing::info!(command = %self.command, format = %format, "pipe output opened");
        self.child = Some((child, stdin));
        Ok(())
    }

    fn play(&mut self, bytes: &[u8]) -> Result<usize> {
        let (_, stdin) = self
            .child
            .as_mut()
            .ok_or_else(|| anyhow!("pipe output is not open"))?;
        let n = stdin.write(bytes).context("write to pipe command")?;
        if n == 0 && !bytes.is_empty() {
            bail!("pipe command closed its input");
        }
        Ok(n)
    }

    fn close(&mut self) {
        let Some((mut child, stdin)) = self.child.take() else {
            return;
        };
        drop(stdin);
        match child.wait() {
            Ok(status) if !status.success() => {
                tracing::warn!(command = %self.command, %status, "pipe command exited with failure");
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(command = %self.command, error = %err, "pipe command wait failed"),
        }
    }
}

impl Drop for PipeOutput {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_command_is_rejected() {
        assert!(PipeOutput::new("  ", SampleFormat::S16).is_err());
    }

    #[test]
    fn play_requires_open() {
        let mut out = PipeOutput::new("cat > /dev/null", SampleFormat::S16).unwrap();
        assert!(out.play(&[0, 0]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn writes_into_command() {
        let dir = std::env::temp_dir().join(format!("playd-pipe-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let target = dir.join("out.pcm");
        let mut out =
            PipeOutput::new(format!("cat > '{}'", target.display()), SampleFormat::S16).unwrap();

        let mut format = AudioFormat::new(44_100, 2, SampleFormat::F32);
        out.open(&mut format).unwrap();
        assert_eq!(format.sample_format, SampleFormat::S16);
        crate::output::play_all(&mut out, &[1, 2, 3, 4]).unwrap();
        out.close();

        assert_eq!(std::fs::read(&target).unwrap(), vec![1, 2, 3, 4]);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
