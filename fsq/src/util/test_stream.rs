//! In-memory stream for exercising the protocol without sockets
// (c) 2025 fsq contributors

use std::io::{self, Cursor, ErrorKind, Read, Write};
use std::sync::{Arc, Mutex};

/// Misbehaviours a [`MockStream`] can be told to exhibit
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Quirks {
    /// Move at most this many bytes per read or write call
    pub(crate) chunk: Option<usize>,
    /// Every Nth call returns `Interrupted`
    pub(crate) interrupt_every: Option<usize>,
    /// Accept this many bytes in total, then report zero-length writes
    pub(crate) write_limit: Option<usize>,
    /// Accept this many bytes in total, then fail with `BrokenPipe`
    pub(crate) fail_after: Option<usize>,
}

/// Reads from a canned buffer; writes into a shared sink which outlives the stream
#[derive(Debug)]
pub(crate) struct MockStream {
    input: Cursor<Vec<u8>>,
    sink: Arc<Mutex<Vec<u8>>>,
    quirks: Quirks,
    calls: usize,
}

impl MockStream {
    pub(crate) fn new(input: Vec<u8>, quirks: Quirks) -> Self {
        Self {
            input: Cursor::new(input),
            sink: Arc::default(),
            quirks,
            calls: 0,
        }
    }

    /// A handle on everything written so far, which stays valid after the stream is dropped
    pub(crate) fn sink(&self) -> Arc<Mutex<Vec<u8>>> {
        self.sink.clone()
    }

    pub(crate) fn written(&self) -> Vec<u8> {
        self.sink.lock().unwrap().clone()
    }

    fn interrupt(&mut self) -> bool {
        self.calls += 1;
        self.quirks
            .interrupt_every
            .is_some_and(|n| self.calls % n == 0)
    }

    fn clamp(&self, len: usize) -> usize {
        self.quirks.chunk.map_or(len, |c| len.min(c))
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.interrupt() {
            return Err(ErrorKind::Interrupted.into());
        }
        let n = self.clamp(buf.len());
        self.input.read(&mut buf[..n])
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.interrupt() {
            return Err(ErrorKind::Interrupted.into());
        }
        let mut sink = self.sink.lock().unwrap();
        let mut n = self.clamp(buf.len());
        if let Some(limit) = self.quirks.fail_after {
            if sink.len() >= limit {
                return Err(ErrorKind::BrokenPipe.into());
            }
            n = n.min(limit - sink.len());
        }
        if let Some(limit) = self.quirks.write_limit {
            n = n.min(limit.saturating_sub(sink.len()));
        }
        sink.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
