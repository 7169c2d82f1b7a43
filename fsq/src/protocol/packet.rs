//! Fixed-layout packet and its payload variants
// (c) 2025 fsq contributors

use std::fmt;

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

use super::{FixedStr, ProtocolState};
use crate::error::{Error, Result};

/// Maximum node name length
pub const NODE_MAX: usize = 64;
/// Maximum password length
pub const PASSWORD_MAX: usize = 64;
/// Maximum host name length
pub const HOSTNAME_MAX: usize = 64;
/// Maximum filesystem name length
pub const FSNAME_MAX: usize = 1024;
/// Maximum remote path length
pub const PATH_MAX: usize = 4096;
/// Maximum description length
pub const DESCRIPTION_MAX: usize = 255;
/// Maximum error message length
pub const ERRMSG_MAX: usize = 1024;

/// Node name field
pub type NodeName = FixedStr<{ NODE_MAX + 1 }>;
/// Password field
pub type Password = FixedStr<{ PASSWORD_MAX + 1 }>;
/// Host name field
pub type HostName = FixedStr<{ HOSTNAME_MAX + 1 }>;
/// Filesystem name field
pub type FsName = FixedStr<{ FSNAME_MAX + 1 }>;
/// Remote path field
pub type RemotePath = FixedStr<{ PATH_MAX + 1 }>;
/// Description field
pub type Description = FixedStr<{ DESCRIPTION_MAX + 1 }>;
/// Error message field
pub type ErrorMessage = FixedStr<{ ERRMSG_MAX + 1 }>;

const STATE_WIDTH: usize = 4;
const LOGIN_WIDTH: usize = NodeName::WIDTH + Password::WIDTH + HostName::WIDTH + 4;
const INFO_WIDTH: usize = FsName::WIDTH + RemotePath::WIDTH + Description::WIDTH + 4;
const DATA_WIDTH: usize = 8;
const ERROR_WIDTH: usize = 4 + ErrorMessage::WIDTH;

const fn max(a: usize, b: usize) -> usize {
    if a > b { a } else { b }
}

/// Width of the payload union: that of its largest member
pub const PAYLOAD_WIDTH: usize = max(max(LOGIN_WIDTH, INFO_WIDTH), max(DATA_WIDTH, ERROR_WIDTH));
/// Total on-wire width of every packet
pub const PACKET_WIDTH: usize = STATE_WIDTH + PAYLOAD_WIDTH;

const_assert!(LOGIN_WIDTH == 199);
const_assert!(INFO_WIDTH == 5382);
const_assert!(ERROR_WIDTH == 1029);
const_assert!(PACKET_WIDTH == 5386);

/////////////////////////////////////////////////////////////////////////////////////////////
// PAYLOADS

/// Credentials and address of the storage-queue daemon
#[derive(Clone, PartialEq, Eq)]
pub struct Login {
    /// Node identifier
    pub node: NodeName,
    /// Shared secret
    pub password: Password,
    /// Daemon host name or IP address
    pub hostname: HostName,
    /// Daemon TCP port
    pub port: u16,
}

impl Login {
    /// Constructor. Over-long fields are truncated.
    #[must_use]
    pub fn new(node: &str, password: &str, hostname: &str, port: u16) -> Self {
        Self {
            node: node.into(),
            password: password.into(),
            hostname: hostname.into(),
            port,
        }
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.node.encode(buf);
        self.password.encode(buf);
        self.hostname.encode(buf);
        buf.put_u32_le(u32::from(self.port));
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        let node = NodeName::decode(buf);
        let password = Password::decode(buf);
        let hostname = HostName::decode(buf);
        let port = buf.get_u32_le();
        let port = u16::try_from(port)
            .map_err(|_| Error::Malformed(format!("port {port} out of range")))?;
        Ok(Self {
            node,
            password,
            hostname,
            port,
        })
    }
}

impl fmt::Debug for Login {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Login")
            .field("node", &self.node)
            .field("password", &"<redacted>")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .finish()
    }
}

/// Where the daemon should land a submitted file
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::FromRepr,
    strum_macros::VariantNames,
)]
#[repr(u32)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StorageDest {
    /// Accept and discard
    Null = 0,
    /// The daemon's local storage only
    Local = 1,
    /// The parallel filesystem only
    Lustre = 2,
    /// The parallel filesystem, then the archive.
    /// This is the only route known to the single-destination protocol variant.
    #[default]
    LustreTsm = 3,
    /// The archive only
    Tsm = 4,
}

impl StorageDest {
    /// Decodes the on-wire representation
    pub fn from_wire(value: u32) -> Result<Self> {
        Self::from_repr(value)
            .ok_or_else(|| Error::Malformed(format!("unknown storage destination {value}")))
    }
}

impl From<StorageDest> for u32 {
    fn from(value: StorageDest) -> Self {
        value as u32
    }
}

/// File-open metadata: where a file goes and what it is called there
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageInfo {
    /// Filesystem (mount point) name
    pub fs: FsName,
    /// Full remote path
    pub fpath: RemotePath,
    /// Free-text description, stored alongside the archive copy
    pub desc: Description,
    /// Routing
    pub destination: StorageDest,
}

impl StorageInfo {
    /// Constructor. Over-long fields are truncated.
    #[must_use]
    pub fn new(fs: &str, fpath: &str, desc: Option<&str>, destination: StorageDest) -> Self {
        Self {
            fs: fs.into(),
            fpath: fpath.into(),
            desc: desc.unwrap_or_default().into(),
            destination,
        }
    }

    pub(crate) fn encode<B: BufMut>(&self, buf: &mut B) {
        self.fs.encode(buf);
        self.fpath.encode(buf);
        self.desc.encode(buf);
        buf.put_u32_le(self.destination.into());
    }

    pub(crate) fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        let fs = FsName::decode(buf);
        let fpath = RemotePath::decode(buf);
        let desc = Description::decode(buf);
        let destination = StorageDest::from_wire(buf.get_u32_le())?;
        Ok(Self {
            fs,
            fpath,
            desc,
            destination,
        })
    }
}

/// An error reported by the peer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorReport {
    /// Numeric code; by convention a negated errno value
    pub code: i32,
    /// Human-readable explanation
    pub message: ErrorMessage,
}

impl ErrorReport {
    /// Constructor. An over-long message is truncated.
    #[must_use]
    pub fn new(code: i32, message: &str) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error {}: {}", self.code, self.message)
    }
}

/////////////////////////////////////////////////////////////////////////////////////////////
// PACKET

/// The unit exchanged once per protocol step.
///
/// On the wire this is always exactly [`PACKET_WIDTH`] bytes:
///
/// | offset | width | content |
/// |---|---|---|
/// | 0 | 4 | [`ProtocolState`], u32 little-endian |
/// | 4 | [`PAYLOAD_WIDTH`] | payload union, zero padded |
///
/// The payload region holds one of [`Login`], [`StorageInfo`], a data size
/// (u64 little-endian) or an [`ErrorReport`]. Which one is meaningful depends on
/// the state bits; the packet itself does not record which setter was last used.
///
/// The buffer is owned and reused across protocol steps. Each payload setter
/// zeroes the payload region first, and [`clear`](Self::clear) zeroes everything.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    buf: BytesMut,
}

impl Packet {
    /// On-wire width
    pub const WIDTH: usize = PACKET_WIDTH;

    /// Creates an all-zero packet
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: BytesMut::zeroed(PACKET_WIDTH),
        }
    }

    /// Zeroes the whole packet
    pub fn clear(&mut self) {
        self.buf.fill(0);
    }

    /// The state bitmask. Unknown bits are preserved.
    #[must_use]
    pub fn state(&self) -> ProtocolState {
        let mut raw = &self.buf[..STATE_WIDTH];
        ProtocolState::from_bits_retain(raw.get_u32_le())
    }

    /// Sets the state bitmask
    pub fn set_state(&mut self, state: ProtocolState) {
        let mut raw = &mut self.buf[..STATE_WIDTH];
        raw.put_u32_le(state.bits());
    }

    fn payload(&self) -> &[u8] {
        &self.buf[STATE_WIDTH..]
    }

    fn payload_mut(&mut self) -> &mut [u8] {
        let p = &mut self.buf[STATE_WIDTH..];
        p.fill(0);
        p
    }

    /// Interprets the payload as login data
    pub fn login(&self) -> Result<Login> {
        Login::decode(&mut self.payload())
    }

    /// Sets login data as the payload
    pub fn set_login(&mut self, login: &Login) {
        login.encode(&mut self.payload_mut());
    }

    /// Interprets the payload as file-open metadata
    pub fn info(&self) -> Result<StorageInfo> {
        StorageInfo::decode(&mut self.payload())
    }

    /// Sets file-open metadata as the payload
    pub fn set_info(&mut self, info: &StorageInfo) {
        info.encode(&mut self.payload_mut());
    }

    /// Interprets the payload as the size of the raw data that follows
    #[must_use]
    pub fn data_size(&self) -> u64 {
        self.payload().get_u64_le()
    }

    /// Sets the announced raw data size as the payload
    pub fn set_data_size(&mut self, size: u64) {
        self.payload_mut().put_u64_le(size);
    }

    /// Interprets the payload as an error report
    #[must_use]
    pub fn error_report(&self) -> ErrorReport {
        let mut p = self.payload();
        let code = p.get_i32_le();
        let message = ErrorMessage::decode(&mut p);
        ErrorReport { code, message }
    }

    /// Sets an error report as the payload
    pub fn set_error_report(&mut self, report: &ErrorReport) {
        let mut p = self.payload_mut();
        p.put_i32_le(report.code);
        report.message.encode(&mut p);
    }

    /// The whole packet, as it goes on the wire
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// The whole packet buffer, for receiving into
    pub(crate) fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("state", &self.state())
            .field("width", &self.buf.len())
            .finish_non_exhaustive()
    }
}
