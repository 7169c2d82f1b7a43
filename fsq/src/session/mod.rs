//! Client sessions with the storage-queue daemon
// (c) 2025 fsq contributors
//!
//! A [`Session`] owns one connection and the packet buffer used for every
//! step on it. Connecting sends the login; file submission is layered on top
//! in [`submit`].

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};

use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{Login, Packet, ProtocolState, StorageInfo};

mod submit;
pub use submit::COPY_CHUNK_SIZE;

/// Where a connected session is in the per-file cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SessionState {
    /// Connected, no file open
    #[default]
    Idle,
    /// A file has been opened but no data sent yet
    Open,
    /// At least one DATA step has been sent for the open file
    Streaming,
}

/// A connection to the storage-queue daemon.
///
/// Every operation takes `&mut self`; a session is never shared.
/// Once an operation has failed with a transport or protocol error the
/// connection is closed, and all further operations return [`Error::NotConnected`].
#[derive(Debug)]
pub struct Session<S: Read + Write = TcpStream> {
    state: SessionState,
    login: Login,
    info: StorageInfo,
    stream: Option<S>,
    packet: Packet,
    size: u64,
}

impl Session<TcpStream> {
    /// Connects to the daemon named in `login` and sends the login.
    ///
    /// Any failure closes the socket before returning.
    pub fn connect(login: &Login) -> Result<Self> {
        let host = login.hostname.to_str_lossy();
        let ip = crate::util::lookup_host(&host)?;
        let addr = SocketAddr::new(ip, login.port);
        debug!("connecting to {host} ({addr})");
        let stream = TcpStream::connect(addr)?;
        Self::handshake(stream, login)
    }
}

impl<S: Read + Write> Session<S> {
    /// Sends the login over an already established stream.
    ///
    /// The stream is dropped if this fails.
    pub fn handshake(stream: S, login: &Login) -> Result<Self> {
        let mut session = Self {
            state: SessionState::Idle,
            login: login.clone(),
            info: StorageInfo::default(),
            stream: Some(stream),
            packet: Packet::new(),
            size: 0,
        };
        session.packet.set_login(login);
        session.send(ProtocolState::CONNECT)?;
        debug!("logged in as node {}", login.node);
        Ok(session)
    }

    /// Says goodbye and closes the connection.
    ///
    /// Sending DISCONNECT is best effort: a failure is logged, not returned.
    pub fn disconnect(mut self) {
        if self.stream.is_none() {
            debug!("disconnect: connection already closed");
            return;
        }
        if self.state != SessionState::Idle {
            warn!(
                "disconnecting with {} still {}",
                self.info.fpath, self.state
            );
        }
        self.hang_up();
    }

    /// Sends the packet buffer with the given state.
    ///
    /// The connection is closed if this fails.
    pub fn send(&mut self, state: ProtocolState) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        if let Err(e) = self.packet.send_to(stream, state) {
            self.drop_stream();
            return Err(e);
        }
        Ok(())
    }

    /// Receives a packet into the buffer and checks its state against `expected`.
    ///
    /// An error report from the peer is logged and returned as [`Error::Protocol`]
    /// with an empty received state; the report itself stays readable through
    /// [`packet`](Self::packet). The connection is closed on any failure.
    pub fn receive(&mut self, expected: ProtocolState) -> Result<ProtocolState> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        match self.packet.receive_from(stream, expected) {
            Ok(state) => Ok(state),
            Err(e) => {
                if let Error::Protocol { received, .. } = &e {
                    if received.is_error_report() {
                        warn!("daemon reported {}", self.packet.error_report());
                    }
                }
                self.drop_stream();
                Err(e)
            }
        }
    }

    /// Current position in the per-file cycle
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the connection is still open
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// The login this session was established with
    #[must_use]
    pub fn login(&self) -> &Login {
        &self.login
    }

    /// Metadata of the currently open file; empty when idle
    #[must_use]
    pub fn info(&self) -> &StorageInfo {
        &self.info
    }

    /// The most recently announced DATA size
    #[must_use]
    pub fn last_data_size(&self) -> u64 {
        self.size
    }

    /// The packet buffer as last sent or received
    #[must_use]
    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    /// Checks the connection, then the cycle position
    fn require(&self, op: &'static str, allowed: &[SessionState]) -> Result<()> {
        if self.stream.is_none() {
            return Err(Error::NotConnected);
        }
        if !allowed.contains(&self.state) {
            return Err(Error::OutOfSequence {
                op,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Sends DISCONNECT (best effort) and drops the stream, forgetting any open file.
    ///
    /// The receiver treats a DISCONNECT while a file is open as an abnormal close.
    fn hang_up(&mut self) {
        self.packet.clear();
        if let Err(e) = self.send(ProtocolState::DISCONNECT) {
            warn!("disconnect: {e}");
        }
        self.drop_stream();
        self.info = StorageInfo::default();
        self.size = 0;
    }

    fn stream_mut(&mut self) -> Result<&mut S> {
        self.stream.as_mut().ok_or(Error::NotConnected)
    }

    fn drop_stream(&mut self) {
        if self.stream.take().is_some() {
            trace!("connection closed");
        }
        self.state = SessionState::Idle;
    }
}
