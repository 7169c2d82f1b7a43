//! Exact-size packet transport over blocking streams
// (c) 2025 fsq contributors

use std::io::{ErrorKind, Read, Write};

use tracing::trace;

use super::{Packet, ProtocolState};
use crate::error::{Error, Result, Transfer};

/// Writes as much of `buf` as the stream will take.
///
/// Partial writes are continued and `Interrupted` is retried.
/// Stops early if the stream accepts zero bytes.
///
/// # Return
/// The number of bytes written. This is short of `buf.len()` only if the stream stopped accepting data.
pub(crate) fn write_size<W: Write + ?Sized>(w: &mut W, buf: &[u8]) -> std::io::Result<usize> {
    let mut done = 0;
    while done < buf.len() {
        match w.write(&buf[done..]) {
            Ok(0) => break,
            Ok(n) => done += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => (),
            Err(e) => return Err(e),
        }
    }
    Ok(done)
}

/// Reads until `buf` is full or the stream reaches end of file.
///
/// Partial reads are continued and `Interrupted` is retried.
///
/// # Return
/// The number of bytes read. This is short of `buf.len()` only at end of file.
pub(crate) fn read_size<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut done = 0;
    while done < buf.len() {
        match r.read(&mut buf[done..]) {
            Ok(0) => break,
            Ok(n) => done += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => (),
            Err(e) => return Err(e),
        }
    }
    Ok(done)
}

impl Packet {
    /// Stamps `state` into this packet and writes the whole packet to `w`.
    ///
    /// Fails unless exactly [`Packet::WIDTH`] bytes were written.
    pub fn send_to<W: Write + ?Sized>(&mut self, w: &mut W, state: ProtocolState) -> Result<()> {
        self.set_state(state);
        let sent = write_size(w, self.as_bytes())?;
        trace!("send {state}: {sent} of {} bytes", Self::WIDTH);
        if sent != Self::WIDTH {
            return Err(Error::ShortTransfer {
                direction: Transfer::Send,
                actual: sent,
                expected: Self::WIDTH,
            });
        }
        w.flush()?;
        Ok(())
    }

    /// Reads exactly [`Packet::WIDTH`] bytes from `r` into this packet and checks its state.
    ///
    /// The packet is overwritten as the bytes arrive, so its content is unspecified after a failure.
    ///
    /// # Return
    /// The received state, which shares at least one bit with `expected`.
    pub fn receive_from<R: Read + ?Sized>(
        &mut self,
        r: &mut R,
        expected: ProtocolState,
    ) -> Result<ProtocolState> {
        let received = read_size(r, self.as_bytes_mut())?;
        trace!(
            "receive {received} of {} bytes, state {}, expected {expected}",
            Self::WIDTH,
            self.state()
        );
        if received != Self::WIDTH {
            return Err(Error::ShortTransfer {
                direction: Transfer::Receive,
                actual: received,
                expected: Self::WIDTH,
            });
        }
        let state = self.state();
        if !expected.accepts(state) {
            return Err(Error::Protocol {
                received: state,
                expected,
            });
        }
        Ok(state)
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use assertables::assert_matches;
    use pretty_assertions::assert_eq;

    use super::{read_size, write_size};
    use crate::error::{Error, Transfer};
    use crate::protocol::{ErrorReport, Packet, ProtocolState, StorageDest, StorageInfo};
    use crate::util::test_stream::{MockStream, Quirks};

    #[test]
    fn sync_packet_roundtrip() {
        let mut out = Packet::new();
        out.set_info(&StorageInfo::new(
            "/lustre",
            "/lustre/a/b",
            None,
            StorageDest::LustreTsm,
        ));
        let mut wire = Vec::new();
        out.send_to(&mut wire, ProtocolState::OPEN).unwrap();
        assert_eq!(wire.len(), Packet::WIDTH);

        let mut inbound = Packet::new();
        let st = inbound
            .receive_from(&mut Cursor::new(wire), ProtocolState::OPEN | ProtocolState::DISCONNECT)
            .unwrap();
        assert_eq!(st, ProtocolState::OPEN);
        assert_eq!(inbound.info().unwrap().fpath, "/lustre/a/b");
    }

    #[test]
    fn combined_state_is_accepted() {
        let mut out = Packet::new();
        let mut wire = Vec::new();
        out.send_to(&mut wire, ProtocolState::DATA | ProtocolState::CLOSE)
            .unwrap();
        let mut inbound = Packet::new();
        let st = inbound
            .receive_from(&mut Cursor::new(wire), ProtocolState::CLOSE)
            .unwrap();
        assert_eq!(st, ProtocolState::DATA | ProtocolState::CLOSE);
    }

    #[test]
    fn disjoint_state_is_protocol_error() {
        let mut out = Packet::new();
        let mut wire = Vec::new();
        out.send_to(&mut wire, ProtocolState::OPEN).unwrap();
        let mut inbound = Packet::new();
        let e = inbound
            .receive_from(&mut Cursor::new(wire), ProtocolState::CLOSE)
            .unwrap_err();
        let Error::Protocol { received, expected } = e else {
            panic!("expected a protocol error, got {e:?}");
        };
        assert_eq!(received, ProtocolState::OPEN);
        assert_eq!(expected, ProtocolState::CLOSE);
    }

    #[test]
    fn error_report_does_not_match_close() {
        let mut out = Packet::new();
        out.set_error_report(&ErrorReport::new(-5, "EIO"));
        let mut wire = Vec::new();
        out.send_to(&mut wire, ProtocolState::empty()).unwrap();
        let mut inbound = Packet::new();
        let e = inbound
            .receive_from(&mut Cursor::new(wire), ProtocolState::CLOSE)
            .unwrap_err();
        assert_matches!(e, Error::Protocol { .. });
        // The buffer was still overwritten with what arrived
        assert_eq!(inbound.error_report().code, -5);
    }

    #[test]
    fn truncated_receive_fails() {
        let mut out = Packet::new();
        let mut wire = Vec::new();
        out.send_to(&mut wire, ProtocolState::CLOSE).unwrap();
        wire.truncate(100);
        let mut inbound = Packet::new();
        let e = inbound
            .receive_from(&mut Cursor::new(wire), ProtocolState::CLOSE)
            .unwrap_err();
        assert_matches!(
            e,
            Error::ShortTransfer {
                direction: Transfer::Receive,
                actual: 100,
                ..
            }
        );
    }

    #[test]
    fn short_send_fails() {
        let mut stream = MockStream::new(Vec::new(), Quirks {
            write_limit: Some(1000),
            ..Default::default()
        });
        let mut p = Packet::new();
        let e = p.send_to(&mut stream, ProtocolState::CONNECT).unwrap_err();
        assert_matches!(
            e,
            Error::ShortTransfer {
                direction: Transfer::Send,
                actual: 1000,
                ..
            }
        );
    }

    #[test]
    fn dribbling_stream_is_reassembled() {
        let mut out = Packet::new();
        out.set_data_size(77);
        let mut wire = Vec::new();
        out.send_to(&mut wire, ProtocolState::DATA).unwrap();

        let mut stream = MockStream::new(wire, Quirks {
            chunk: Some(7),
            interrupt_every: Some(3),
            ..Default::default()
        });
        let mut inbound = Packet::new();
        let _ = inbound
            .receive_from(&mut stream, ProtocolState::DATA)
            .unwrap();
        assert_eq!(inbound.data_size(), 77);

        let mut p = Packet::new();
        p.send_to(&mut stream, ProtocolState::CLOSE).unwrap();
        assert_eq!(stream.written().len(), Packet::WIDTH);
    }

    #[test]
    fn size_helpers() {
        let mut buf = [0u8; 8];
        let n = read_size(&mut Cursor::new(vec![1u8, 2, 3]), &mut buf).unwrap();
        assert_eq!(n, 3);
        let mut sink = Vec::new();
        let n = write_size(&mut sink, &buf).unwrap();
        assert_eq!(n, 8);
    }
}
