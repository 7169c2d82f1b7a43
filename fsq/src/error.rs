//! Error type shared by the protocol, session and lifecycle layers
// (c) 2025 fsq contributors

use std::io;
use std::path::PathBuf;

use crate::protocol::ProtocolState;
use crate::session::SessionState;

/// Which way a short transfer was going
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
#[allow(missing_docs)]
pub enum Transfer {
    Send,
    Receive,
}

/// Everything that can go wrong in this crate.
///
/// Variants fall into four groups:
/// * argument errors ([`InvalidArgument`](Error::InvalidArgument), [`OutOfSequence`](Error::OutOfSequence)),
///   which are raised before any I/O and leave a session usable;
/// * transport errors ([`Resolve`](Error::Resolve), [`Io`](Error::Io),
///   [`ShortTransfer`](Error::ShortTransfer), [`NotConnected`](Error::NotConnected));
/// * protocol errors ([`Protocol`](Error::Protocol), [`Malformed`](Error::Malformed));
/// * lifecycle store errors ([`NotFound`](Error::NotFound), [`Store`](Error::Store)).
///
/// After a transport or protocol error the session's socket has been closed.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A required argument was missing or inconsistent
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The operation is not valid in the session's current state
    #[error("{op} is not permitted while the session is {state}")]
    OutOfSequence {
        /// The attempted operation
        op: &'static str,
        /// State of the session at the time
        state: SessionState,
    },

    /// The session's socket has already been closed
    #[error("session is not connected")]
    NotConnected,

    /// Host name resolution failed
    #[error("host name lookup for {host} failed")]
    Resolve {
        /// The name we tried to resolve
        host: String,
        /// Underlying cause
        #[source]
        source: io::Error,
    },

    /// A socket or stream operation failed
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Fewer bytes were transferred than the protocol requires
    #[error("short {direction}: {actual} of {expected} bytes")]
    ShortTransfer {
        /// Direction of the transfer
        direction: Transfer,
        /// Bytes actually moved
        actual: usize,
        /// Bytes required
        expected: usize,
    },

    /// The peer sent a state that shares no bit with what we expected
    #[error("protocol error: received state {received}, expected {expected}")]
    Protocol {
        /// State bitmask found in the packet
        received: ProtocolState,
        /// State bitmask we would have accepted
        expected: ProtocolState,
    },

    /// A packet or stored attribute could not be decoded
    #[error("malformed data: {0}")]
    Malformed(String),

    /// No lifecycle record exists for the path
    #[error("no lifecycle record for {}", .0.display())]
    NotFound(PathBuf),

    /// The attribute store reported an error
    #[error("attribute store {op} of {name} on {} failed", .path.display())]
    Store {
        /// `get`, `set` or `update`
        op: &'static str,
        /// File the attribute belongs to
        path: PathBuf,
        /// Attribute name
        name: String,
        /// Underlying cause
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// The operating system error code behind this error, if there is one
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::Io(e) | Error::Resolve { source: e, .. } | Error::Store { source: e, .. } => {
                e.raw_os_error()
            }
            _ => None,
        }
    }

    /// Returns true if the session that produced this error can no longer be used
    #[must_use]
    pub fn is_fatal_to_session(&self) -> bool {
        !matches!(
            self,
            Error::InvalidArgument(_) | Error::OutOfSequence { .. }
        )
    }
}

/// Result type used throughout this crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod test {
    use std::io;

    use assertables::assert_contains;
    use pretty_assertions::assert_eq;

    use super::{Error, Transfer};
    use crate::protocol::ProtocolState;
    use crate::session::SessionState;

    #[test]
    fn os_error_is_surfaced() {
        let e = Error::from(io::Error::from_raw_os_error(111));
        assert_eq!(e.raw_os_error(), Some(111));
        let e = Error::NotConnected;
        assert_eq!(e.raw_os_error(), None);
    }

    #[test]
    fn display() {
        let e = Error::Protocol {
            received: ProtocolState::OPEN,
            expected: ProtocolState::CLOSE,
        };
        let s = e.to_string();
        assert_contains!(s, "OPEN");
        assert_contains!(s, "CLOSE");

        let e = Error::ShortTransfer {
            direction: Transfer::Receive,
            actual: 3,
            expected: 9,
        };
        assert_eq!(e.to_string(), "short receive: 3 of 9 bytes");

        let e = Error::OutOfSequence {
            op: "write",
            state: SessionState::Idle,
        };
        assert_eq!(e.to_string(), "write is not permitted while the session is idle");
    }

    #[test]
    fn fatality() {
        assert!(!Error::InvalidArgument("x").is_fatal_to_session());
        assert!(Error::NotConnected.is_fatal_to_session());
    }
}
