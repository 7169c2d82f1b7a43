//! General utility code that didn't fit anywhere else
//!
//! Note that most of this module is not exported.
// (c) 2025 fsq contributors

mod dns;
pub(crate) use dns::lookup_host;

mod tracing;
pub use tracing::{TimeFormat, is_initialized as tracing_is_initialised, setup as setup_tracing};

#[cfg(test)]
pub(crate) mod test_stream;
