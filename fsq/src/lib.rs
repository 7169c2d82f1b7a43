// (c) 2025 fsq contributors

#![allow(clippy::doc_markdown)]
//! Client transport and lifecycle records for the file storage queue (fsq).
//!
//! fsq is the front end of a hierarchical storage pipeline. A client hands a
//! local file to the fsq daemon, which lands it on a parallel filesystem
//! (Lustre) and then on tape through the archive backend (TSM).
//!
//! This crate provides:
//!
//! * the [protocol]: fixed-width packets with a combinable state bitmask,
//!   sent over one persistent TCP connection;
//! * a client [`Session`] that logs in, then submits any number of files with
//!   [`open`](Session::open), [`write`](Session::write) and [`close`](Session::close);
//! * the [receiving side](server) of the same protocol;
//! * per-file [lifecycle] records, kept in extended attributes on the local
//!   file and updated atomically by each pipeline stage;
//! * [configuration](config) and [logging](util::setup_tracing) helpers for
//!   tools that embed the library.
//!
//! ## Example
//!
//! ```no_run
//! use fsq::{Session, config::Manager};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Manager::standard(Some("fsq.toml".as_ref())).configuration()?;
//! let mut session = Session::connect(&config.login())?;
//! session.open("/lustre", "/lustre/projects/run42/data.bin", None, config.destination)?;
//! let _ = session.write(b"payload")?;
//! session.close()?;
//! session.disconnect();
//! # Ok(())
//! # }
//! ```
//!
//! Stamping lifecycle progress:
//!
//! ```no_run
//! # #[cfg(target_os = "linux")]
//! # fn main() -> fsq::Result<()> {
//! use fsq::lifecycle::{ActionState, LifecycleStore, store::XattrStore};
//!
//! let records = LifecycleStore::new(XattrStore);
//! let mut item = records.load("/queue/data.bin".as_ref())?;
//! let state = records.update_stage(&mut item, ActionState::ARCHIVE_RUN)?;
//! println!("now {state}");
//! # Ok(())
//! # }
//! # #[cfg(not(target_os = "linux"))]
//! # fn main() {}
//! ```

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod protocol;
pub mod server;
pub mod session;
pub mod util;

pub use error::{Error, Result};
pub use lifecycle::{ActionItem, ActionState, LifecycleStore};
pub use protocol::{Login, ProtocolState, StorageDest, StorageInfo};
pub use session::{Session, SessionState};
