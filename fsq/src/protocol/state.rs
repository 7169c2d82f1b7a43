//! Protocol state bitmask
// (c) 2025 fsq contributors

use std::fmt;

bitflags::bitflags! {
    /// Which protocol step(s) a packet represents.
    ///
    /// A packet may carry several bits at once, for example `DATA | CLOSE` on the
    /// final chunk of a file, so packets are matched by containment
    /// ([`accepts`](Self::accepts)), never by equality.
    ///
    /// A packet with no bits set carries an error report.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ProtocolState: u32 {
        /// Login; payload is a [`Login`](super::Login)
        const CONNECT = 0x01;
        /// Open a remote file; payload is a [`StorageInfo`](super::StorageInfo)
        const OPEN = 0x02;
        /// Raw data follows; payload is its size
        const DATA = 0x04;
        /// Close the remote file
        const CLOSE = 0x08;
        /// End the session
        const DISCONNECT = 0x10;
    }
}

impl ProtocolState {
    /// Does a received state satisfy this expected state?
    ///
    /// True if the two share at least one bit.
    #[must_use]
    pub fn accepts(self, received: ProtocolState) -> bool {
        self.intersects(received)
    }

    /// Is this the (empty) state carried by an error report?
    #[must_use]
    pub fn is_error_report(self) -> bool {
        self.bits() == 0
    }
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("ERROR");
        }
        bitflags::parser::to_writer(self, f)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::ProtocolState as P;

    #[rstest]
    #[case(P::DATA | P::CLOSE, P::CLOSE, true)]
    #[case(P::DATA | P::CLOSE, P::DATA, true)]
    #[case(P::DISCONNECT | P::OPEN, P::OPEN | P::DISCONNECT, true)]
    #[case(P::CONNECT, P::CONNECT, true)]
    #[case(P::OPEN, P::CLOSE, false)]
    #[case(P::empty(), P::CLOSE, false)]
    #[case(P::DATA, P::OPEN | P::DISCONNECT, false)]
    fn containment(#[case] received: P, #[case] expected: P, #[case] ok: bool) {
        assert_eq!(expected.accepts(received), ok);
    }

    #[test]
    fn wire_values() {
        assert_eq!(P::CONNECT.bits(), 0x1);
        assert_eq!(P::OPEN.bits(), 0x2);
        assert_eq!(P::DATA.bits(), 0x4);
        assert_eq!(P::CLOSE.bits(), 0x8);
        assert_eq!(P::DISCONNECT.bits(), 0x10);
    }

    #[test]
    fn display() {
        assert_eq!(P::OPEN.to_string(), "OPEN");
        assert_eq!((P::DATA | P::CLOSE).to_string(), "DATA | CLOSE");
        assert_eq!(P::empty().to_string(), "ERROR");
        assert!(P::empty().is_error_report());
        assert_eq!(P::from_bits_retain(0x40).to_string(), "0x40");
    }
}
