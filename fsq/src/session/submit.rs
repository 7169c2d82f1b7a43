//! File submission: the open / write / close cycle
// (c) 2025 fsq contributors
//!
//! None of these steps read from the connection. A daemon that rejects a
//! file answers with an error report, which stays queued on the socket until
//! the caller asks for it with [`Session::receive`]; that call then fails with
//! [`Error::Protocol`] and the report is available from [`Session::packet`].

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use tracing::{debug, trace, warn};

use super::{Session, SessionState};
use crate::error::{Error, Result, Transfer};
use crate::protocol::{ProtocolState, StorageDest, StorageInfo, read_size, write_size};

/// Chunk size used by [`Session::submit_file`]
pub const COPY_CHUNK_SIZE: usize = 1 << 20;

impl<S: Read + Write> Session<S> {
    /// Announces a new file to the daemon.
    ///
    /// `fs` and `fpath` must not be empty. Over-long fields are truncated.
    /// The connection is closed if sending fails.
    pub fn open(
        &mut self,
        fs: &str,
        fpath: &str,
        desc: Option<&str>,
        destination: StorageDest,
    ) -> Result<()> {
        self.require("open", &[SessionState::Idle])?;
        if fs.is_empty() {
            return Err(Error::InvalidArgument("filesystem name is empty"));
        }
        if fpath.is_empty() {
            return Err(Error::InvalidArgument("remote path is empty"));
        }
        self.info = StorageInfo::new(fs, fpath, desc, destination);
        self.packet.set_info(&self.info);
        if let Err(e) = self.send(ProtocolState::OPEN) {
            self.info = StorageInfo::default();
            return Err(e);
        }
        self.state = SessionState::Open;
        debug!("open {} on {} for {destination}", self.info.fpath, self.info.fs);
        Ok(())
    }

    /// Sends all of `buf` as one DATA step.
    ///
    /// See [`write_elements`](Self::write_elements).
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.write_elements(buf, 1, buf.len())
    }

    /// Sends the first `size * count` bytes of `buf` as one DATA step.
    ///
    /// # Return
    /// The number of raw bytes the stream accepted. If that is short of
    /// `size * count`, the connection has been closed, as the daemon can no
    /// longer find the next packet boundary.
    pub fn write_elements(&mut self, buf: &[u8], size: usize, count: usize) -> Result<usize> {
        self.require("write", &[SessionState::Open, SessionState::Streaming])?;
        let total = size
            .checked_mul(count)
            .ok_or(Error::InvalidArgument("element size times count overflows"))?;
        if total > buf.len() {
            return Err(Error::InvalidArgument(
                "element size times count exceeds the buffer",
            ));
        }
        self.size = total as u64;
        self.packet.set_data_size(self.size);
        self.send(ProtocolState::DATA)?;
        self.state = SessionState::Streaming;

        let stream = self.stream_mut()?;
        let written = write_size(stream, &buf[..total]).and_then(|n| stream.flush().map(|()| n));
        match written {
            Ok(n) if n == total => {
                trace!("wrote {n} bytes");
                Ok(n)
            }
            Ok(n) => {
                warn!("short data write ({n} of {total} bytes); closing connection");
                self.drop_stream();
                Ok(n)
            }
            Err(e) => {
                self.drop_stream();
                Err(e.into())
            }
        }
    }

    /// Tells the daemon the open file is complete.
    ///
    /// The packet buffer and the stored file metadata are cleared whether or
    /// not sending succeeds. The connection is closed if sending fails.
    pub fn close(&mut self) -> Result<()> {
        self.require("close", &[SessionState::Open, SessionState::Streaming])?;
        let result = self.send(ProtocolState::CLOSE);
        debug!("close {}", self.info.fpath);
        self.packet.clear();
        self.info = StorageInfo::default();
        self.size = 0;
        self.state = SessionState::Idle;
        result
    }

    /// Streams everything `reader` yields into the open file, one DATA step per chunk.
    ///
    /// # Return
    /// The total number of bytes sent
    pub fn copy_from<R: Read + ?Sized>(&mut self, reader: &mut R, chunk_size: usize) -> Result<u64> {
        if chunk_size == 0 {
            return Err(Error::InvalidArgument("chunk size is zero"));
        }
        self.require("write", &[SessionState::Open, SessionState::Streaming])?;
        let mut buf = vec![0u8; chunk_size];
        let mut total = 0u64;
        loop {
            let n = read_size(reader, &mut buf)?;
            if n == 0 {
                break;
            }
            let sent = self.write(&buf[..n])?;
            total += sent as u64;
            if sent != n {
                return Err(Error::ShortTransfer {
                    direction: Transfer::Send,
                    actual: sent,
                    expected: n,
                });
            }
            if n < chunk_size {
                break;
            }
        }
        Ok(total)
    }

    /// Submits one local file: open, copy its contents, close.
    ///
    /// If copying fails while the connection is still up, the remote file is
    /// abandoned: DISCONNECT is sent in place of CLOSE and the connection is
    /// dropped, so the daemon never sees a partial file as complete.
    ///
    /// # Return
    /// The number of bytes sent
    pub fn submit_file(
        &mut self,
        local: &Path,
        fs: &str,
        fpath: &str,
        desc: Option<&str>,
        destination: StorageDest,
    ) -> Result<u64> {
        self.require("open", &[SessionState::Idle])?;
        let mut file = File::open(local)?;
        self.open(fs, fpath, desc, destination)?;
        let sent = match self.copy_from(&mut file, COPY_CHUNK_SIZE) {
            Ok(n) => n,
            Err(e) => {
                if self.is_connected() {
                    warn!("abandoning {fpath}: {e}");
                    self.hang_up();
                }
                return Err(e);
            }
        };
        self.close()?;
        debug!("submitted {} ({sent} bytes) as {fpath}", local.display());
        Ok(sent)
    }
}
