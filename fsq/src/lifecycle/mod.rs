//! Per-file lifecycle records
// (c) 2025 fsq contributors
//!
//! Each stage of the storage pipeline stamps its progress on the local file,
//! so that progress survives restarts and can be read back by whichever
//! process next picks the file up.
//!
//! A record is kept as three independent attributes, named after a
//! configurable prefix (by default [`DEFAULT_PREFIX`]):
//!
//! | attribute | value |
//! |---|---|
//! | `<prefix>.arvid` | state (u32 LE), archive id (i32 LE) |
//! | `<prefix>.info` | destination (u32 LE), then fs, fpath and description, each as a u16 LE length followed by that many bytes |
//! | `<prefix>.state` | state (u32 LE) |
//!
//! Stage updates only ever touch `<prefix>.state`, which is therefore the
//! authoritative copy of the state bits.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use bytes::{Buf, BufMut};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::protocol::{Description, FsName, RemotePath, StorageDest, StorageInfo};

pub mod store;
use store::AttributeStore;

/// Default attribute name prefix
pub const DEFAULT_PREFIX: &str = "user.fsq";

const STATE_SUFFIX: &str = "state";
const ARVID_SUFFIX: &str = "arvid";
const INFO_SUFFIX: &str = "info";

bitflags::bitflags! {
    /// Which pipeline stages a file has reached.
    ///
    /// Flags accumulate; setting one never clears another.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ActionState: u32 {
        /// The file has been copied into the local queue
        const LOCAL_COPY_DONE = 0x01;
        /// Copy to the parallel filesystem is in progress
        const REMOTE_COPY_RUN = 0x02;
        /// Copy to the parallel filesystem failed
        const REMOTE_COPY_ERROR = 0x04;
        /// Copy to the parallel filesystem finished
        const REMOTE_COPY_DONE = 0x08;
        /// Archiving is in progress
        const ARCHIVE_RUN = 0x10;
        /// Archiving failed
        const ARCHIVE_ERROR = 0x20;
        /// Archiving finished
        const ARCHIVE_DONE = 0x40;
        /// The file was deliberately skipped
        const FILE_OMITTED = 0x80;
    }
}

impl ActionState {
    /// Stages that count as errors
    pub const ERRORS: Self = Self::REMOTE_COPY_ERROR.union(Self::ARCHIVE_ERROR);
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        bitflags::parser::to_writer(self, f)
    }
}

/// The points in a file's life at which a time is recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Milestone {
    /// Entered the local queue
    Queued = 0,
    /// Finished copying to the parallel filesystem
    RemoteCopy = 1,
    /// Finished archiving
    Archive = 2,
}

impl Milestone {
    /// The milestone a stage bit marks, if any
    #[must_use]
    pub fn reached_by(bit: ActionState) -> Option<Self> {
        if bit.contains(ActionState::ARCHIVE_DONE) {
            Some(Self::Archive)
        } else if bit.contains(ActionState::REMOTE_COPY_DONE) {
            Some(Self::RemoteCopy)
        } else if bit.contains(ActionState::LOCAL_COPY_DONE) {
            Some(Self::Queued)
        } else {
            None
        }
    }
}

/// A file working its way through the pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionItem {
    /// Stages reached
    pub state: ActionState,
    /// Where the file is going
    pub info: StorageInfo,
    /// The file on local storage
    pub local_path: PathBuf,
    /// Total size in bytes
    pub size: u64,
    /// Bytes handled so far by the current stage.
    ///
    /// Owned by the stage worker: it is not persisted, starts at zero on
    /// [`load`](LifecycleStore::load) and no store operation touches it.
    pub progress_size: u64,
    /// When each [`Milestone`] was reached, indexed by its discriminant
    pub timestamps: [Option<SystemTime>; 3],
    /// Number of error stages recorded by this process
    pub error_count: u32,
    /// Identifier assigned by the archive backend
    pub archive_id: i32,
}

impl ActionItem {
    /// When a milestone was reached
    #[must_use]
    pub fn timestamp(&self, milestone: Milestone) -> Option<SystemTime> {
        self.timestamps[milestone as usize]
    }
}

/// The persisted part of a lifecycle record
#[derive(Debug, Clone, Default, PartialEq, Eq, derive_more::Constructor)]
pub struct Stamp {
    /// Stages reached
    pub state: ActionState,
    /// Archive identifier
    pub archive_id: i32,
    /// Storage routing
    pub info: StorageInfo,
}

/// Reads and writes lifecycle records through an [`AttributeStore`].
///
/// Safe to share between threads. Updates to the state of one file are
/// atomic with respect to each other, as far as the store guarantees.
#[derive(Debug)]
pub struct LifecycleStore<A: AttributeStore> {
    store: A,
    prefix: String,
}

impl<A: AttributeStore> LifecycleStore<A> {
    /// Constructor, using the [default prefix](DEFAULT_PREFIX)
    pub fn new(store: A) -> Self {
        Self::with_prefix(store, DEFAULT_PREFIX)
    }

    /// Constructor with a custom attribute name prefix
    pub fn with_prefix(store: A, prefix: &str) -> Self {
        Self {
            store,
            prefix: prefix.to_owned(),
        }
    }

    /// The underlying attribute store
    pub fn store(&self) -> &A {
        &self.store
    }

    fn name(&self, suffix: &str) -> String {
        format!("{}.{suffix}", self.prefix)
    }

    fn get(&self, path: &Path, suffix: &str) -> Result<Option<Vec<u8>>> {
        let name = self.name(suffix);
        self.store
            .get(path, &name)
            .map_err(|source| store_error("get", path, name, source))
    }

    fn set(&self, path: &Path, suffix: &str, value: &[u8]) -> Result<()> {
        let name = self.name(suffix);
        trace!("set {name} on {}: {} bytes", path.display(), value.len());
        self.store
            .set(path, &name, value)
            .map_err(|source| store_error("set", path, name, source))
    }

    /// Creates or overwrites the whole record for `path`
    pub fn stamp_new(
        &self,
        path: &Path,
        state: ActionState,
        archive_id: i32,
        info: &StorageInfo,
    ) -> Result<()> {
        let mut arvid = Vec::with_capacity(8);
        arvid.put_u32_le(state.bits());
        arvid.put_i32_le(archive_id);
        self.set(path, ARVID_SUFFIX, &arvid)?;
        self.set(path, INFO_SUFFIX, &encode_info(info))?;
        // The state entry marks the record as present, so it goes last
        self.set(path, STATE_SUFFIX, &state.bits().to_le_bytes())?;
        debug!("stamped {} as {state}", path.display());
        Ok(())
    }

    /// Reads back the record for `path`.
    ///
    /// Fails with [`Error::NotFound`] if there is no state entry. A missing
    /// archive id or storage info entry reads as zero or empty.
    pub fn read_record(&self, path: &Path) -> Result<Stamp> {
        let state = self
            .get(path, STATE_SUFFIX)?
            .ok_or_else(|| Error::NotFound(path.to_owned()))?;
        let state = decode_state(&state)?;
        let archive_id = match self.get(path, ARVID_SUFFIX)? {
            Some(v) if v.len() >= 8 => (&v[4..]).get_i32_le(),
            Some(v) => {
                return Err(Error::Malformed(format!(
                    "archive id attribute is {} bytes",
                    v.len()
                )));
            }
            None => 0,
        };
        let info = match self.get(path, INFO_SUFFIX)? {
            Some(v) => decode_info(&v)?,
            None => StorageInfo::default(),
        };
        Ok(Stamp::new(state, archive_id, info))
    }

    /// Builds an [`ActionItem`] from the record for `path` and the file's size
    pub fn load(&self, path: &Path) -> Result<ActionItem> {
        let stamp = self.read_record(path)?;
        let size = std::fs::metadata(path)?.len();
        Ok(ActionItem {
            state: stamp.state,
            info: stamp.info,
            local_path: path.to_owned(),
            size,
            archive_id: stamp.archive_id,
            ..Default::default()
        })
    }

    /// Atomically adds `bit` to the persisted state of `item`.
    ///
    /// Storage info and archive id are left alone. On success `item.state`
    /// becomes the persisted union, which includes bits set by other workers;
    /// error stages bump `item.error_count` and milestone stages record the time.
    ///
    /// # Return
    /// The persisted union
    pub fn update_stage(&self, item: &mut ActionItem, bit: ActionState) -> Result<ActionState> {
        let state = self.modify_state(&item.local_path, |current| current | bit)?;
        item.state = state;
        if bit.intersects(ActionState::ERRORS) {
            item.error_count = item.error_count.saturating_add(1);
        }
        if let Some(m) = Milestone::reached_by(bit) {
            item.timestamps[m as usize] = Some(SystemTime::now());
        }
        debug!("{}: +{bit} -> {state}", item.local_path.display());
        Ok(state)
    }

    /// Atomically removes `bits` from the persisted state of `item`
    ///
    /// # Return
    /// The persisted remainder
    pub fn clear_stage(&self, item: &mut ActionItem, bits: ActionState) -> Result<ActionState> {
        let state = self.modify_state(&item.local_path, |current| current - bits)?;
        item.state = state;
        debug!("{}: -{bits} -> {state}", item.local_path.display());
        Ok(state)
    }

    fn modify_state<F>(&self, path: &Path, f: F) -> Result<ActionState>
    where
        F: Fn(ActionState) -> ActionState,
    {
        let name = self.name(STATE_SUFFIX);
        let mut bad = None;
        let written = self
            .store
            .update(path, &name, &mut |current| match current.map(decode_state) {
                None => f(ActionState::empty()).bits().to_le_bytes().to_vec(),
                Some(Ok(state)) => f(state).bits().to_le_bytes().to_vec(),
                Some(Err(e)) => {
                    // Leave a corrupt value as it was
                    bad = Some(e);
                    current.unwrap_or_default().to_vec()
                }
            })
            .map_err(|source| store_error("update", path, name, source))?;
        if let Some(e) = bad {
            return Err(e);
        }
        decode_state(&written)
    }
}

fn store_error(op: &'static str, path: &Path, name: String, source: std::io::Error) -> Error {
    if source.kind() == std::io::ErrorKind::NotFound && op != "set" {
        // The file itself is missing
        return Error::NotFound(path.to_owned());
    }
    Error::Store {
        op,
        path: path.to_owned(),
        name,
        source,
    }
}

fn decode_state(raw: &[u8]) -> Result<ActionState> {
    let mut raw = raw;
    if raw.len() < 4 {
        return Err(Error::Malformed(format!(
            "state attribute is {} bytes",
            raw.len()
        )));
    }
    Ok(ActionState::from_bits_retain(raw.get_u32_le()))
}

fn encode_info(info: &StorageInfo) -> Vec<u8> {
    let fields = [info.fs.as_bytes(), info.fpath.as_bytes(), info.desc.as_bytes()];
    let mut out = Vec::with_capacity(4 + fields.iter().map(|f| 2 + f.len()).sum::<usize>());
    out.put_u32_le(info.destination.into());
    for field in fields {
        // Every field is shorter than a u16 can count
        #[allow(clippy::cast_possible_truncation)]
        out.put_u16_le(field.len() as u16);
        out.put_slice(field);
    }
    out
}

fn decode_info(raw: &[u8]) -> Result<StorageInfo> {
    fn field<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8]> {
        if buf.remaining() < 2 {
            return Err(Error::Malformed("info attribute is truncated".into()));
        }
        let len = usize::from(buf.get_u16_le());
        if buf.remaining() < len {
            return Err(Error::Malformed("info attribute is truncated".into()));
        }
        let rest: &'a [u8] = *buf;
        let (head, tail) = rest.split_at(len);
        *buf = tail;
        Ok(head)
    }

    let mut buf = raw;
    if buf.remaining() < 4 {
        return Err(Error::Malformed("info attribute is truncated".into()));
    }
    let destination = StorageDest::from_wire(buf.get_u32_le())?;
    let fs = FsName::from_bytes(field(&mut buf)?);
    let fpath = RemotePath::from_bytes(field(&mut buf)?);
    let desc = Description::from_bytes(field(&mut buf)?);
    Ok(StorageInfo {
        fs,
        fpath,
        desc,
        destination,
    })
}
