use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use anyhow::{Context, Result};

use super::InputStream;

/// Local file input. Ready and seekable as soon as it is opened.
pub struct FileInput {
    file: File,
    size: Option<u64>,
    offset: u64,
}

impl FileInput {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("open {:?}", path))?;
        let meta = file
            .metadata()
            .with_context(|| format!("stat {:?}", path))?;
        if meta.is_dir() {
            anyhow::bail!("{:?} is a directory", path);
        }
        Ok(Self {
            file,
            size: Some(meta.len()),
            offset: 0,
        })
    }
}

impl Read for FileInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.file.read(buf)?;
        self.offset = self.offset.saturating_add(n as u64);
        Ok(n)
    }
}

impl Seek for FileInput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.offset = self.file.seek(pos)?;
        Ok(self.offset)
    }
}

impl InputStream for FileInput {
    fn is_ready(&self) -> bool {
        true
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn mime_type(&self) -> Option<&str> {
        None
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn buffer(&mut self) -> io::Result<usize> {
        Ok(0)
    }
}
