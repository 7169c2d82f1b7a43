// (c) 2025 fsq contributors
//! # Configuration management
//!
//! Tools that embed fsq obtain their settings from the following sources, highest priority first:
//! 1. Environment variables named `FSQ_<FIELD>`, e.g. `FSQ_HOSTNAME` or `FSQ_XATTR_PREFIX`
//! 2. A TOML configuration file, if one is given and exists
//! 3. Hard-wired defaults
//!
//! ## File format
//!
//! ```toml
//! node = "polaris"
//! password = "polaris1234"
//! hostname = "fsqd.example.org"
//! port = 7625
//! destination = "lustre-tsm"
//! xattr_prefix = "user.fsq"
//! time_format = "utc"
//! ```
//!
//! The set of supported fields is the [`Configuration`] structure.
//! `destination` is one of the kebab-case names of [`StorageDest`].

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::protocol::{HostName, Login, NodeName, Password, StorageDest};
use crate::util::TimeFormat;

mod manager;
pub use manager::Manager;

/// Default daemon TCP port
pub const DEFAULT_PORT: u16 = 7625;

/// The set of configurable options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Node name presented at login
    pub node: String,
    /// Password presented at login
    pub password: String,
    /// Host name or IP address of the storage-queue daemon
    pub hostname: String,
    /// TCP port of the storage-queue daemon
    pub port: u16,
    /// Where submitted files go unless the caller says otherwise
    pub destination: StorageDest,
    /// Prefix of the extended attribute names holding lifecycle records
    pub xattr_prefix: String,
    /// Time stamp format for log output
    pub time_format: TimeFormat,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            node: String::new(),
            password: String::new(),
            hostname: "localhost".into(),
            port: DEFAULT_PORT,
            destination: StorageDest::default(),
            xattr_prefix: crate::lifecycle::DEFAULT_PREFIX.into(),
            time_format: TimeFormat::default(),
        }
    }
}

impl Configuration {
    /// Checks the fields for values that cannot be used
    pub fn validate(&self) -> Result<()> {
        for (field, value, fits) in [
            ("node", &self.node, NodeName::fits(&self.node)),
            ("password", &self.password, Password::fits(&self.password)),
            ("hostname", &self.hostname, HostName::fits(&self.hostname)),
        ] {
            if value.is_empty() {
                bail!("{field} must be set");
            }
            if !fits {
                bail!("{field} is too long");
            }
        }
        if self.port == 0 {
            bail!("port must not be zero");
        }
        if self.xattr_prefix.is_empty() || self.xattr_prefix.ends_with('.') {
            bail!("xattr_prefix {:?} is not usable", self.xattr_prefix);
        }
        Ok(())
    }

    /// Login details for [`Session::connect`](crate::Session::connect)
    #[must_use]
    pub fn login(&self) -> Login {
        Login::new(&self.node, &self.password, &self.hostname, self.port)
    }
}

#[cfg(test)]
mod test {
    use assertables::assert_contains;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::Configuration;
    use crate::protocol::{Login, StorageDest};

    fn valid() -> Configuration {
        Configuration {
            node: "polaris".into(),
            password: "polaris1234".into(),
            ..Default::default()
        }
    }

    #[test]
    fn defaults() {
        let c = Configuration::default();
        assert_eq!(c.hostname, "localhost");
        assert_eq!(c.port, 7625);
        assert_eq!(c.destination, StorageDest::LustreTsm);
        assert_eq!(c.xattr_prefix, "user.fsq");
    }

    #[test]
    fn login() {
        assert_eq!(
            valid().login(),
            Login::new("polaris", "polaris1234", "localhost", 7625)
        );
    }

    #[rstest]
    #[case::no_node(Configuration { node: String::new(), ..valid() }, "node must be set")]
    #[case::long_password(Configuration { password: "x".repeat(65), ..valid() }, "password is too long")]
    #[case::zero_port(Configuration { port: 0, ..valid() }, "port")]
    #[case::bad_prefix(Configuration { xattr_prefix: "user.".into(), ..valid() }, "xattr_prefix")]
    fn invalid(#[case] c: Configuration, #[case] message: &str) {
        let e = c.validate().unwrap_err();
        assert_contains!(e.to_string(), message);
    }

    #[test]
    fn valid_passes() {
        valid().validate().unwrap();
        let longest = Configuration {
            password: "x".repeat(64),
            ..valid()
        };
        longest.validate().unwrap();
    }
}
