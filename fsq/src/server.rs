//! The receiving side of the protocol
// (c) 2025 fsq contributors
//!
//! [`Inbound`] decodes the step sequence a [`Session`](crate::Session) produces.
//! It does no storage of its own: a daemon (or a test) drives it with
//! [`Inbound::next`] and decides what to do with each [`Event`].

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::TcpStream;

use tracing::{debug, trace, warn};

use crate::error::{Error, Result, Transfer};
use crate::protocol::{ErrorReport, Login, Packet, ProtocolState, StorageInfo};

/// One decoded protocol step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The client opened a file
    Open(StorageInfo),
    /// Raw content for the open file
    Data(Vec<u8>),
    /// The open file is complete
    Close,
    /// The client is done; no further events follow
    Disconnect,
}

/// An accepted client connection
#[derive(Debug)]
pub struct Inbound<S: Read + Write = TcpStream> {
    stream: S,
    packet: Packet,
    login: Login,
    open: bool,
    pending: VecDeque<Event>,
    finished: bool,
}

impl<S: Read + Write> Inbound<S> {
    /// Waits for the client's login on a freshly accepted stream
    pub fn accept(mut stream: S) -> Result<Self> {
        let mut packet = Packet::new();
        let _ = packet.receive_from(&mut stream, ProtocolState::CONNECT)?;
        let login = packet.login()?;
        debug!("login from node {}", login.node);
        Ok(Self {
            stream,
            packet,
            login,
            open: false,
            pending: VecDeque::new(),
            finished: false,
        })
    }

    /// The login the client presented
    #[must_use]
    pub fn login(&self) -> &Login {
        &self.login
    }

    /// Receives the next step.
    ///
    /// A packet with several state bits yields one event per bit, in the
    /// order open, data, close, disconnect. DISCONNECT while a file is open
    /// is an abnormal close: [`Event::Close`] comes first, then
    /// [`Event::Disconnect`].
    /// After [`Event::Disconnect`] further calls fail with [`Error::NotConnected`].
    pub fn next(&mut self) -> Result<Event> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(event);
        }
        if self.finished {
            return Err(Error::NotConnected);
        }
        let expected = if self.open {
            ProtocolState::DATA | ProtocolState::CLOSE | ProtocolState::DISCONNECT
        } else {
            ProtocolState::OPEN | ProtocolState::DISCONNECT
        };
        let state = self.packet.receive_from(&mut self.stream, expected)?;
        if !expected.contains(state) {
            return Err(Error::Protocol {
                received: state,
                expected,
            });
        }

        if state.contains(ProtocolState::OPEN) {
            let info = self.packet.info()?;
            debug!("open {} on {} for {}", info.fpath, info.fs, info.destination);
            self.open = true;
            self.pending.push_back(Event::Open(info));
        }
        if state.contains(ProtocolState::DATA) {
            let data = self.read_data()?;
            self.pending.push_back(Event::Data(data));
        }
        if state.contains(ProtocolState::CLOSE) {
            self.open = false;
            self.pending.push_back(Event::Close);
        }
        if state.contains(ProtocolState::DISCONNECT) {
            if self.open {
                warn!("node {} disconnected with a file open", self.login.node);
                self.open = false;
                self.pending.push_back(Event::Close);
            }
            debug!("node {} disconnected", self.login.node);
            self.finished = true;
            self.pending.push_back(Event::Disconnect);
        }
        self.pending
            .pop_front()
            .ok_or_else(|| Error::Malformed(format!("no step in state {state}")))
    }

    fn read_data(&mut self) -> Result<Vec<u8>> {
        let size = self.packet.data_size();
        let expected = usize::try_from(size)
            .map_err(|_| Error::Malformed(format!("data size {size} too large")))?;
        let mut data = Vec::new();
        let got = (&mut self.stream).take(size).read_to_end(&mut data)?;
        trace!("data: {got} of {size} bytes");
        if got != expected {
            return Err(Error::ShortTransfer {
                direction: Transfer::Receive,
                actual: got,
                expected,
            });
        }
        Ok(data)
    }

    /// Reports a failure to the client. The caller should then drop the connection.
    pub fn send_error(&mut self, report: &ErrorReport) -> Result<()> {
        debug!("sending {report}");
        self.packet.set_error_report(report);
        self.packet
            .send_to(&mut self.stream, ProtocolState::empty())
    }

    /// Gives back the underlying stream
    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[cfg(test)]
mod test {
    use assertables::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::{Event, Inbound};
    use crate::error::{Error, Transfer};
    use crate::protocol::{
        ErrorReport, Login, Packet, ProtocolState, ProtocolState as P, StorageDest, StorageInfo,
    };
    use crate::session::Session;
    use crate::util::test_stream::{MockStream, Quirks};

    fn client_bytes<F>(f: F) -> Vec<u8>
    where
        F: FnOnce(&mut Session<MockStream>),
    {
        let stream = MockStream::new(Vec::new(), Quirks::default());
        let sink = stream.sink();
        let mut s = Session::handshake(stream, &Login::new("n", "p", "h", 1)).unwrap();
        f(&mut s);
        s.disconnect();
        sink.lock().unwrap().clone()
    }

    fn inbound(wire: Vec<u8>) -> Inbound<MockStream> {
        Inbound::accept(MockStream::new(wire, Quirks {
            chunk: Some(333),
            ..Default::default()
        }))
        .unwrap()
    }

    #[test]
    fn decodes_a_session() {
        let wire = client_bytes(|s| {
            s.open("/lustre", "/lustre/a", Some("first"), StorageDest::Lustre)
                .unwrap();
            let _ = s.write(b"abc").unwrap();
            let _ = s.write(b"").unwrap();
            s.close().unwrap();
        });
        let mut rx = inbound(wire);
        assert_eq!(rx.login().node, "n");
        assert_eq!(
            rx.next().unwrap(),
            Event::Open(StorageInfo::new(
                "/lustre",
                "/lustre/a",
                Some("first"),
                StorageDest::Lustre
            ))
        );
        assert_eq!(rx.next().unwrap(), Event::Data(b"abc".to_vec()));
        assert_eq!(rx.next().unwrap(), Event::Data(Vec::new()));
        assert_eq!(rx.next().unwrap(), Event::Close);
        assert_eq!(rx.next().unwrap(), Event::Disconnect);
        assert_matches!(rx.next(), Err(Error::NotConnected));
    }

    #[test]
    fn disconnect_with_file_open_is_abnormal_close() {
        let wire = client_bytes(|s| {
            s.open("/lustre", "/lustre/partial", None, StorageDest::Lustre)
                .unwrap();
            let _ = s.write(b"abc").unwrap();
        });
        let mut rx = inbound(wire);
        assert_matches!(rx.next().unwrap(), Event::Open(_));
        assert_eq!(rx.next().unwrap(), Event::Data(b"abc".to_vec()));
        assert_eq!(rx.next().unwrap(), Event::Close);
        assert_eq!(rx.next().unwrap(), Event::Disconnect);
        assert_matches!(rx.next(), Err(Error::NotConnected));
    }

    #[rstest]
    #[case::close_disconnect(
        P::CLOSE | P::DISCONNECT,
        vec![Event::Close, Event::Disconnect]
    )]
    #[case::data_close(
        P::DATA | P::CLOSE,
        vec![Event::Data(b"hi".to_vec()), Event::Close]
    )]
    #[case::data_disconnect(
        P::DATA | P::DISCONNECT,
        vec![Event::Data(b"hi".to_vec()), Event::Close, Event::Disconnect]
    )]
    #[case::data_close_disconnect(
        P::DATA | P::CLOSE | P::DISCONNECT,
        vec![Event::Data(b"hi".to_vec()), Event::Close, Event::Disconnect]
    )]
    fn combined_states_while_open(#[case] state: P, #[case] events: Vec<Event>) {
        let mut wire = Vec::new();
        let mut p = Packet::new();
        p.set_login(&Login::new("n", "p", "h", 1));
        p.send_to(&mut wire, P::CONNECT).unwrap();
        p.set_info(&StorageInfo::new("/fs", "/fs/x", None, StorageDest::Null));
        p.send_to(&mut wire, P::OPEN).unwrap();
        p.set_data_size(2);
        p.send_to(&mut wire, state).unwrap();
        if state.contains(P::DATA) {
            wire.extend_from_slice(b"hi");
        }

        let mut rx = inbound(wire);
        assert_matches!(rx.next().unwrap(), Event::Open(_));
        let got: Vec<Event> = (0..events.len()).map(|_| rx.next().unwrap()).collect();
        assert_eq!(got, events);
        let end = rx.next();
        if state.contains(P::DISCONNECT) {
            assert_matches!(end, Err(Error::NotConnected));
        } else {
            // Stream exhausted mid-packet
            assert_matches!(end, Err(Error::ShortTransfer { .. }));
        }
    }

    #[test]
    fn open_and_disconnect_in_one_packet() {
        let mut wire = Vec::new();
        let mut p = Packet::new();
        p.send_to(&mut wire, P::CONNECT).unwrap();
        let info = StorageInfo::new("/fs", "/fs/x", None, StorageDest::Null);
        p.set_info(&info);
        p.send_to(&mut wire, P::OPEN | P::DISCONNECT).unwrap();

        let mut rx = inbound(wire);
        assert_eq!(rx.next().unwrap(), Event::Open(info));
        assert_eq!(rx.next().unwrap(), Event::Close);
        assert_eq!(rx.next().unwrap(), Event::Disconnect);
        assert_matches!(rx.next(), Err(Error::NotConnected));
    }

    #[test]
    fn stray_bits_are_protocol_error() {
        let mut wire = Vec::new();
        let mut p = Packet::new();
        p.send_to(&mut wire, P::CONNECT).unwrap();
        p.set_info(&StorageInfo::new("/fs", "/fs/x", None, StorageDest::Null));
        p.send_to(&mut wire, P::OPEN | P::DATA).unwrap();
        let mut rx = inbound(wire);
        let e = rx.next().unwrap_err();
        let Error::Protocol { received, expected } = e else {
            panic!("expected a protocol error, got {e:?}");
        };
        assert_eq!(received, P::OPEN | P::DATA);
        assert_eq!(expected, P::OPEN | P::DISCONNECT);
    }

    #[test]
    fn truncated_data() {
        let mut wire = client_bytes(|s| {
            s.open("/fs", "/fs/x", None, StorageDest::Null).unwrap();
            let _ = s.write(&[1u8; 50]).unwrap();
        });
        // Drop DISCONNECT and most of the payload
        wire.truncate(wire.len() - Packet::WIDTH - 40);
        let mut rx = inbound(wire);
        assert_matches!(rx.next().unwrap(), Event::Open(_));
        assert_matches!(
            rx.next(),
            Err(Error::ShortTransfer {
                direction: Transfer::Receive,
                actual: 10,
                expected: 50
            })
        );
    }

    #[test]
    fn data_before_open_is_protocol_error() {
        let mut wire = Vec::new();
        let mut p = Packet::new();
        p.send_to(&mut wire, ProtocolState::CONNECT).unwrap();
        p.set_data_size(0);
        p.send_to(&mut wire, ProtocolState::DATA).unwrap();
        let mut rx = inbound(wire);
        assert_matches!(rx.next(), Err(Error::Protocol { .. }));
    }

    #[test]
    fn error_report_has_empty_state() {
        let mut rx = inbound(client_bytes(|_| ()));
        rx.send_error(&ErrorReport::new(-5, "I/O error")).unwrap();
        let written = rx.into_inner().written();
        assert_eq!(written.len(), Packet::WIDTH);
        assert_eq!(&written[..4], &[0, 0, 0, 0]);
    }
}
