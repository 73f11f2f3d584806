//! HTTP input stream.
//!
//! The first `buffer()` call issues a ranged GET for the first block. A `206` answer
//! means the server honours ranges: the stream is seekable and later reads fetch
//! further blocks on demand. A `200` answer means the body is streamed as-is and the
//! input is not seekable (typical for internet radio).

use std::io::{self, Read, Seek, SeekFrom};
use std::time::{Duration, Instant};

use super::InputStream;

/// Configuration for HTTP inputs.
#[derive(Clone, Debug)]
pub struct HttpInputConfig {
    /// Bytes per fetched block.
    pub block_size: usize,
    /// Connect/response timeout per request.
    pub timeout: Duration,
}

impl Default for HttpInputConfig {
    fn default() -> Self {
        Self {
            block_size: 512 * 1024,
            timeout: Duration::from_secs(10),
        }
    }
}

struct Fetched {
    partial: bool,
    total: Option<u64>,
    mime: Option<String>,
    body: Box<dyn Read + Send>,
}

/// HTTP(S) byte source with a single-block cache.
pub struct HttpInput {
    url: String,
    config: HttpInputConfig,
    ready: bool,
    seekable: bool,
    mime: Option<String>,
    pos: u64,
    len: Option<u64>,
    buf: Vec<u8>,
    buf_start: u64,
    live: Option<Box<dyn Read + Send>>,
}

impl HttpInput {
    pub fn new(url: String, config: HttpInputConfig) -> Self {
        Self {
            url,
            config,
            ready: false,
            seekable: false,
            mime: None,
            pos: 0,
            len: None,
            buf: Vec::new(),
            buf_start: 0,
            live: None,
        }
    }

    fn fetch(&self, start: u64, end: u64) -> io::Result<Fetched> {
        let range = format!("bytes={start}-{end}");
        let resp = ureq::get(&self.url)
            .config()
            .timeout_connect(Some(self.config.timeout))
            .timeout_recv_response(Some(self.config.timeout))
            .build()
            .header("Range", &range)
            .header("Icy-MetaData", "0")
            .call()
            .map_err(|e| io::Error::other(format!("http request failed: {e}")))?;

        let header = |name: &str| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };
        let content_range = header("Content-Range");
        let content_length = header("Content-Length").and_then(|s| s.parse::<u64>().ok());
        let mime = header("Content-Type").and_then(|s| normalize_mime(&s));
        let partial = resp.status() == ureq::http::StatusCode::PARTIAL_CONTENT;
        let total = if partial {
            content_range
                .as_deref()
                .and_then(parse_content_range_total)
        } else {
            content_length
        };

        let (_, body) = resp.into_parts();
        Ok(Fetched {
            partial,
            total,
            mime,
            body: Box::new(body.into_reader()),
        })
    }

    /// Issue the initial request and capture the stream metadata.
    fn open(&mut self) -> io::Result<usize> {
        let block_end = (self.config.block_size.max(1) as u64).saturating_sub(1);
        let fetched = self.fetch(0, block_end)?;
        self.mime = fetched.mime;
        self.len = fetched.total;
        self.seekable = fetched.partial;

        let buffered = if fetched.partial {
            let mut data = Vec::new();
            let mut body = fetched.body;
            body.read_to_end(&mut data)
                .map_err(|e| io::Error::other(format!("http read failed: {e}")))?;
            self.buf = data;
            self.buf_start = 0;
            self.buf.len()
        } else {
            self.live = Some(fetched.body);
            0
        };
        self.ready = true;
        tracing::debug!(
            url = %self.url,
            seekable = self.seekable,
            mime = self.mime.as_deref().unwrap_or(""),
            len = ?self.len,
            "http input ready"
        );
        Ok(buffered)
    }

    /// Fill the block cache starting at the current position.
    fn refill(&mut self) -> io::Result<()> {
        let start = self.pos;
        let mut end = start
            .saturating_add(self.config.block_size.max(1) as u64)
            .saturating_sub(1);
        if let Some(len) = self.len {
            if len > 0 {
                end = end.min(len.saturating_sub(1));
            }
        }

        let started = Instant::now();
        let fetched = self.fetch(start, end)?;
        let mut data = Vec::new();
        let mut body = fetched.body;
        body.read_to_end(&mut data)
            .map_err(|e| io::Error::other(format!("http read failed: {e}")))?;
        let elapsed = started.elapsed();
        if elapsed > Duration::from_millis(250) {
            tracing::warn!(
                took_ms = elapsed.as_millis() as u64,
                bytes = data.len(),
                start,
                "http range fetch slow"
            );
        }
        if let Some(total) = fetched.total {
            self.len = Some(total);
        }
        self.buf = data;
        self.buf_start = start;
        Ok(())
    }
}

impl Read for HttpInput {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        if !self.ready {
            self.open()?;
        }
        if let Some(live) = self.live.as_mut() {
            let n = live.read(out)?;
            self.pos = self.pos.saturating_add(n as u64);
            return Ok(n);
        }
        if let Some(len) = self.len {
            if self.pos >= len {
                return Ok(0);
            }
        }

        if self.buf.is_empty()
            || self.pos < self.buf_start
            || self.pos >= self.buf_start.saturating_add(self.buf.len() as u64)
        {
            self.refill()?;
        }

        let offset = self.pos.saturating_sub(self.buf_start) as usize;
        if offset >= self.buf.len() {
            return Ok(0);
        }

        let to_copy = (self.buf.len() - offset).min(out.len());
        out[..to_copy].copy_from_slice(&self.buf[offset..offset + to_copy]);
        self.pos = self.pos.saturating_add(to_copy as u64);
        Ok(to_copy)
    }
}

impl Seek for HttpInput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(x) => x,
            SeekFrom::Current(d) => add_signed(self.pos, d),
            SeekFrom::End(d) => {
                let len = self.len.ok_or_else(|| {
                    io::Error::new(io::ErrorKind::Unsupported, "content length unavailable")
                })?;
                add_signed(len, d)
            }
        };
        if target != self.pos && !self.seekable {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "http stream is not seekable",
            ));
        }
        self.pos = target;
        Ok(self.pos)
    }
}

impl InputStream for HttpInput {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn is_seekable(&self) -> bool {
        self.seekable
    }

    fn mime_type(&self) -> Option<&str> {
        self.mime.as_deref()
    }

    fn size(&self) -> Option<u64> {
        self.len
    }

    fn offset(&self) -> u64 {
        self.pos
    }

    fn buffer(&mut self) -> io::Result<usize> {
        if self.ready {
            return Ok(0);
        }
        self.open()
    }
}

/// Strip parameters (`; charset=...`) and lowercase a Content-Type value.
fn normalize_mime(value: &str) -> Option<String> {
    let mime = value.split(';').next().unwrap_or(value).trim();
    if mime.is_empty() {
        None
    } else {
        Some(mime.to_ascii_lowercase())
    }
}

/// Extract the total length from a Content-Range header.
fn parse_content_range_total(header: &str) -> Option<u64> {
    // Format: "bytes start-end/total"
    let (_, total) = header.split_once('/')?;
    total.parse::<u64>().ok()
}

/// Add a signed delta to an unsigned base with saturation.
fn add_signed(base: u64, delta: i64) -> u64 {
    if delta >= 0 {
        base.saturating_add(delta as u64)
    } else {
        base.saturating_sub(delta.unsigned_abs())
    }
}
