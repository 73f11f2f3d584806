//! Byte sources the decoder reads songs from.
//!
//! An [`InputStream`] is opened against a resolved locator and then buffered until it
//! reports readiness, at which point its metadata (MIME type, seekability, size) is
//! reliable. Dropping the stream closes it.

mod file;
mod http;

use std::io::{self, Read, Seek};
use std::sync::Mutex;

use anyhow::{Result, bail};
use symphonia::core::io::MediaSource;

pub use file::FileInput;
pub use http::{HttpInput, HttpInputConfig};

/// A readable song source.
pub trait InputStream: Read + Seek + Send {
    /// `true` once metadata is available.
    fn is_ready(&self) -> bool;

    /// Whether `seek` can move to arbitrary offsets.
    fn is_seekable(&self) -> bool;

    /// MIME type announced by the source, if any.
    fn mime_type(&self) -> Option<&str>;

    /// Total size in bytes when known.
    fn size(&self) -> Option<u64>;

    /// Current read offset.
    fn offset(&self) -> u64;

    /// Buffer more data, blocking briefly while it becomes available.
    ///
    /// Returns the number of bytes added; an error aborts the decode attempt.
    fn buffer(&mut self) -> io::Result<usize>;
}

/// Opens input streams for locators.
pub trait InputFactory: Send + Sync {
    fn open(&self, locator: &str) -> Result<Box<dyn InputStream>>;
}

/// Opens local files and HTTP(S) URLs.
#[derive(Clone, Debug, Default)]
pub struct DefaultInputFactory {
    http: HttpInputConfig,
}

impl DefaultInputFactory {
    pub fn new(http: HttpInputConfig) -> Self {
        Self { http }
    }
}

impl InputFactory for DefaultInputFactory {
    fn open(&self, locator: &str) -> Result<Box<dyn InputStream>> {
        if is_http(locator) {
            return Ok(Box::new(HttpInput::new(
                locator.to_string(),
                self.http.clone(),
            )));
        }
        if locator.contains("://") {
            bail!("unsupported URI scheme: {locator}");
        }
        Ok(Box::new(FileInput::open(locator)?))
    }
}

fn is_http(locator: &str) -> bool {
    let lower = locator.get(..8).unwrap_or(locator).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Symphonia [`MediaSource`] over an owned input stream.
///
/// Symphonia requires `Sync`; the mutex is only ever accessed through `get_mut`.
pub struct InputSource {
    inner: Mutex<Box<dyn InputStream>>,
    seekable: bool,
    len: Option<u64>,
}

impl InputSource {
    pub fn new(input: Box<dyn InputStream>) -> Self {
        let seekable = input.is_seekable();
        let len = input.size();
        Self {
            inner: Mutex::new(input),
            seekable,
            len,
        }
    }

    fn stream(&mut self) -> &mut Box<dyn InputStream> {
        self.inner.get_mut().unwrap_or_else(|e| e.into_inner())
    }
}

impl Read for InputSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream().read(buf)
    }
}

impl Seek for InputSource {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.stream().seek(pos)
    }
}

impl MediaSource for InputSource {
    fn is_seekable(&self) -> bool {
        self.seekable
    }

    fn byte_len(&self) -> Option<u64> {
        self.len
    }
}

/// Read up to `buf.len()` bytes from the start of a seekable stream, then rewind.
///
/// Used by probes; returns the number of bytes read.
pub fn peek_head(input: &mut dyn InputStream, buf: &mut [u8]) -> io::Result<usize> {
    input.seek(io::SeekFrom::Start(0))?;
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    input.seek(io::SeekFrom::Start(0))?;
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemInput;

    #[test]
    fn peek_head_rewinds() {
        let mut input = MemInput::new(b"fLaC\0\0\0\x22rest".to_vec());
        input.seek(io::SeekFrom::Start(5)).unwrap();
        let mut head = [0u8; 4];
        let n = peek_head(&mut input, &mut head).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&head, b"fLaC");
        assert_eq!(input.offset(), 0);
    }

    #[test]
    fn peek_head_short_stream() {
        let mut input = MemInput::new(b"ab".to_vec());
        let mut head = [0u8; 8];
        assert_eq!(peek_head(&mut input, &mut head).unwrap(), 2);
    }

    #[test]
    fn factory_rejects_unknown_scheme() {
        let factory = DefaultInputFactory::default();
        assert!(factory.open("ftp://example/a.mp3").is_err());
    }

    #[test]
    fn factory_fails_on_missing_file() {
        let factory = DefaultInputFactory::default();
        assert!(factory.open("/definitely/not/here.flac").is_err());
    }

    #[test]
    fn is_http_is_case_insensitive() {
        assert!(is_http("HTTP://example/a"));
        assert!(is_http("https://example/a"));
        assert!(!is_http("file:///a"));
        assert!(!is_http("http"));
    }

    #[test]
    fn input_source_reports_seekability() {
        let input = MemInput::new(vec![0u8; 16]);
        let source = InputSource::new(Box::new(input));
        assert!(source.is_seekable());
        assert_eq!(source.byte_len(), Some(16));
    }
}
