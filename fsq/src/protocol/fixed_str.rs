//! Fixed-width, null-padded string fields
// (c) 2025 fsq contributors

use std::borrow::Cow;
use std::fmt;

use bytes::{Buf, BufMut};

/// A string field occupying exactly `W` bytes on the wire.
///
/// The content is at most `W - 1` bytes long; the remainder is zero padding,
/// so the field is always NUL-terminated. Copying in is a truncating
/// operation, which is silent: callers that care about exact lengths must
/// check [`fits`](Self::fits) first.
///
/// The content is treated as bytes. It is usually UTF-8 but need not be;
/// [`to_str_lossy`](Self::to_str_lossy) is provided for display.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedStr<const W: usize> {
    bytes: [u8; W],
}

impl<const W: usize> FixedStr<W> {
    /// On-wire width of this field, in bytes
    pub const WIDTH: usize = W;
    /// Maximum content length, in bytes
    pub const CAPACITY: usize = W - 1;

    /// Creates an empty field
    #[must_use]
    pub const fn empty() -> Self {
        Self { bytes: [0; W] }
    }

    /// Creates a field from a byte slice, truncating at the first NUL or at [`CAPACITY`](Self::CAPACITY) bytes
    #[must_use]
    pub fn from_bytes(src: &[u8]) -> Self {
        let mut out = Self::empty();
        out.copy_in(src);
        out
    }

    /// Overwrites the content of this field (see [`from_bytes`](Self::from_bytes) for truncation rules)
    pub fn copy_in(&mut self, src: &[u8]) {
        let end = src.iter().position(|b| *b == 0).unwrap_or(src.len());
        let n = end.min(Self::CAPACITY);
        self.bytes.fill(0);
        self.bytes[..n].copy_from_slice(&src[..n]);
    }

    /// Would this input be stored without truncation?
    #[must_use]
    pub fn fits(src: &str) -> bool {
        src.len() <= Self::CAPACITY && !src.as_bytes().contains(&0)
    }

    /// The content, without padding
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len()]
    }

    /// The content as a string, replacing any invalid UTF-8
    #[must_use]
    pub fn to_str_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    /// Content length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.iter().position(|b| *b == 0).unwrap_or(W)
    }

    /// Is the content empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes[0] == 0
    }

    /// Writes exactly [`WIDTH`](Self::WIDTH) bytes
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(&self.bytes);
    }

    /// Reads exactly [`WIDTH`](Self::WIDTH) bytes.
    ///
    /// The final byte is forced to NUL, so a peer that filled the whole field
    /// is truncated to [`CAPACITY`](Self::CAPACITY) rather than overflowing.
    ///
    /// # Panics
    /// If fewer than [`WIDTH`](Self::WIDTH) bytes remain in `buf`. Packet layouts are fixed, so
    /// callers always hold a whole field.
    pub fn decode<B: Buf>(buf: &mut B) -> Self {
        let mut out = Self::empty();
        buf.copy_to_slice(&mut out.bytes);
        out.bytes[W - 1] = 0;
        // Anything after an embedded NUL is not part of the content
        let n = out.len();
        out.bytes[n..].fill(0);
        out
    }
}

impl<const W: usize> Default for FixedStr<W> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const W: usize> From<&str> for FixedStr<W> {
    fn from(value: &str) -> Self {
        Self::from_bytes(value.as_bytes())
    }
}

impl<const W: usize> fmt::Debug for FixedStr<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_str_lossy())
    }
}

impl<const W: usize> fmt::Display for FixedStr<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_str_lossy())
    }
}

impl<const W: usize> PartialEq<str> for FixedStr<W> {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl<const W: usize> PartialEq<&str> for FixedStr<W> {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}
