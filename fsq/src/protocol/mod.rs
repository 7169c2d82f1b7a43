//! The fsq wire protocol
// (c) 2025 fsq contributors
//!
//! A session runs over one persistent TCP connection. Every protocol step is a
//! single fixed-width [`Packet`]; there is no length prefix, as both peers know
//! [`PACKET_WIDTH`] statically. The packet's [`ProtocolState`] says which step(s) it
//! represents and so which payload is meaningful.
//!
//! * Client ➡️ Daemon: `CONNECT` with [`Login`]
//! * then, for each file:
//!   * C ➡️ D: `OPEN` with [`StorageInfo`]
//!   * C ➡️ D: zero or more times, `DATA` with a size, immediately followed by
//!     exactly that many raw bytes (unframed)
//!   * C ➡️ D: `CLOSE`
//! * C ➡️ D: `DISCONNECT`
//!
//! The client does not wait for acknowledgements. If the daemon needs to report
//! a failure it sends a packet with an empty state and an [`ErrorReport`] payload,
//! then closes the connection.
//!
//! State fields may combine bits (e.g. `DATA | CLOSE`), so a receiver matches
//! against a set of acceptable states by containment; see [`ProtocolState::accepts`].
//!
//! All integers are little-endian. Strings are fixed-width, null-padded
//! [`FixedStr`] fields; over-long values are truncated, never rejected.

mod codec;
pub(crate) use codec::{read_size, write_size};

mod fixed_str;
pub use fixed_str::FixedStr;

mod packet;
pub use packet::{
    DESCRIPTION_MAX, Description, ERRMSG_MAX, ErrorMessage, ErrorReport, FSNAME_MAX, FsName,
    HOSTNAME_MAX, HostName, Login, NODE_MAX, NodeName, PACKET_WIDTH, PATH_MAX, PASSWORD_MAX,
    PAYLOAD_WIDTH, Packet, Password, RemotePath, StorageDest, StorageInfo,
};

mod state;
pub use state::ProtocolState;
