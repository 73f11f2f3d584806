//! In-memory inputs and factories for unit tests.

use std::collections::VecDeque;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};

use crate::input::{InputFactory, InputStream};

type BufferHook = Box<dyn FnMut() + Send>;

/// In-memory input stream. Ready and seekable unless configured otherwise.
pub(crate) struct MemInput {
    data: Cursor<Vec<u8>>,
    ready: bool,
    /// Stay unready through every `buffer` call.
    never_ready: bool,
    seekable: bool,
    mime: Option<String>,
    fail_buffer: bool,
    on_buffer: Option<BufferHook>,
    buffer_calls: Arc<AtomicUsize>,
    dropped: Arc<AtomicBool>,
}

impl MemInput {
    pub(crate) fn new(data: Vec<u8>) -> Self {
        Self {
            data: Cursor::new(data),
            ready: true,
            never_ready: false,
            seekable: true,
            mime: None,
            fail_buffer: false,
            on_buffer: None,
            buffer_calls: Arc::new(AtomicUsize::new(0)),
            dropped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn with_mime(mut self, mime: &str) -> Self {
        self.mime = Some(mime.to_string());
        self
    }

    pub(crate) fn unseekable(mut self) -> Self {
        self.seekable = false;
        self
    }

    /// Becomes ready after the first `buffer` call.
    pub(crate) fn not_ready(mut self) -> Self {
        self.ready = false;
        self
    }

    pub(crate) fn never_ready(mut self) -> Self {
        self.ready = false;
        self.never_ready = true;
        self
    }

    pub(crate) fn failing_buffer(mut self) -> Self {
        self.ready = false;
        self.fail_buffer = true;
        self
    }

    /// Run `hook` at the start of every `buffer` call.
    pub(crate) fn on_buffer(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.on_buffer = Some(Box::new(hook));
        self
    }

    pub(crate) fn buffer_calls(&self) -> Arc<AtomicUsize> {
        self.buffer_calls.clone()
    }

    /// Flag set when the stream is dropped (closed).
    pub(crate) fn drop_flag(&self) -> Arc<AtomicBool> {
        self.dropped.clone()
    }
}

impl Read for MemInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.data.read(buf)
    }
}

impl Seek for MemInput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if !self.seekable {
            return Err(io::Error::new(io::ErrorKind::Unsupported, "not seekable"));
        }
        self.data.seek(pos)
    }
}

impl InputStream for MemInput {
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
        Some(self.data.get_ref().len() as u64)
    }

    fn offset(&self) -> u64 {
        self.data.position()
    }

    fn buffer(&mut self) -> io::Result<usize> {
        self.buffer_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self.on_buffer.as_mut() {
            hook();
        }
        if self.fail_buffer {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        }
        if !self.never_ready {
            self.ready = true;
        }
        Ok(0)
    }
}

impl Drop for MemInput {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

/// Factory handing out queued inputs in order; fails once the queue is empty.
#[derive(Default)]
pub(crate) struct MemFactory {
    inputs: Mutex<VecDeque<MemInput>>,
    opened: Mutex<Vec<String>>,
}

impl MemFactory {
    pub(crate) fn new(inputs: impl IntoIterator<Item = MemInput>) -> Self {
        Self {
            inputs: Mutex::new(inputs.into_iter().collect()),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Locators passed to `open`, including failed ones.
    pub(crate) fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl InputFactory for MemFactory {
    fn open(&self, locator: &str) -> Result<Box<dyn InputStream>> {
        self.opened.lock().unwrap().push(locator.to_string());
        let input = self
            .inputs
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("no such input: {locator}"))?;
        Ok(Box::new(input))
    }
}
