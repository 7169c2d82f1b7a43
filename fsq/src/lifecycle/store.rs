//! Attribute stores backing lifecycle records
// (c) 2025 fsq contributors

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// A per-file key/value attribute store.
///
/// Implementations must make [`update`](Self::update) atomic with respect to
/// every other `update` of the same attribute, including from other processes
/// where the store is shared between them.
pub trait AttributeStore: Send + Sync {
    /// Reads an attribute; `None` if it is not set
    fn get(&self, path: &Path, name: &str) -> io::Result<Option<Vec<u8>>>;

    /// Writes an attribute, replacing any previous value
    fn set(&self, path: &Path, name: &str, value: &[u8]) -> io::Result<()>;

    /// Atomically replaces an attribute with `f(current value)`.
    ///
    /// # Return
    /// The value written
    fn update(
        &self,
        path: &Path,
        name: &str,
        f: &mut dyn FnMut(Option<&[u8]>) -> Vec<u8>,
    ) -> io::Result<Vec<u8>>;
}

#[cfg(target_os = "linux")]
pub use xattr::XattrStore;

#[cfg(target_os = "linux")]
mod xattr {
    use std::fs::File;
    use std::io;
    use std::path::Path;

    use rustix::fs::{FlockOperation, XattrFlags, flock, getxattr, setxattr};
    use rustix::io::Errno;
    use tracing::trace;

    use super::AttributeStore;

    /// Largest value the kernel will store in a single extended attribute
    const XATTR_SIZE_MAX: usize = 65536;

    /// Extended attributes on the files themselves.
    ///
    /// `update` takes an exclusive `flock` on the file for the duration of the
    /// read-modify-write, so concurrent updates from threads and processes
    /// that all go through this store are serialised.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct XattrStore;

    impl AttributeStore for XattrStore {
        fn get(&self, path: &Path, name: &str) -> io::Result<Option<Vec<u8>>> {
            let mut buf = vec![0u8; XATTR_SIZE_MAX];
            match getxattr(path, name, &mut buf[..]) {
                Ok(n) => {
                    buf.truncate(n);
                    Ok(Some(buf))
                }
                Err(Errno::NODATA) => Ok(None),
                Err(e) => Err(e.into()),
            }
        }

        fn set(&self, path: &Path, name: &str, value: &[u8]) -> io::Result<()> {
            setxattr(path, name, value, XattrFlags::empty())?;
            Ok(())
        }

        fn update(
            &self,
            path: &Path,
            name: &str,
            f: &mut dyn FnMut(Option<&[u8]>) -> Vec<u8>,
        ) -> io::Result<Vec<u8>> {
            let file = File::open(path)?;
            flock(&file, FlockOperation::LockExclusive)?;
            trace!("locked {}", path.display());
            let current = self.get(path, name)?;
            let next = f(current.as_deref());
            self.set(path, name, &next)?;
            // Closing the file releases the lock
            drop(file);
            Ok(next)
        }
    }
}

type AttributeMap = HashMap<(PathBuf, String), Vec<u8>>;

/// An in-memory store, for tests and for hosts without extended attributes
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: Mutex<AttributeMap>,
}

impl MemoryStore {
    /// Constructor
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, AttributeMap>> {
        self.map
            .lock()
            .map_err(|_| io::Error::other("attribute store mutex poisoned"))
    }
}

impl AttributeStore for MemoryStore {
    fn get(&self, path: &Path, name: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self
            .lock()?
            .get(&(path.to_owned(), name.to_owned()))
            .cloned())
    }

    fn set(&self, path: &Path, name: &str, value: &[u8]) -> io::Result<()> {
        let _ = self
            .lock()?
            .insert((path.to_owned(), name.to_owned()), value.to_vec());
        Ok(())
    }

    fn update(
        &self,
        path: &Path,
        name: &str,
        f: &mut dyn FnMut(Option<&[u8]>) -> Vec<u8>,
    ) -> io::Result<Vec<u8>> {
        let mut map = self.lock()?;
        let key = (path.to_owned(), name.to_owned());
        let next = f(map.get(&key).map(Vec::as_slice));
        let _ = map.insert(key, next.clone());
        Ok(next)
    }
}
