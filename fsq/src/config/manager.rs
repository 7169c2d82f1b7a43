//! Configuration source wrangling
// (c) 2025 fsq contributors

use std::path::Path;

use anyhow::{Context as _, Result};
use figment::{
    Figment, Provider,
    providers::{Env, Format as _, Serialized, Toml},
};
use serde::Deserialize;
use tracing::debug;

use super::Configuration;

/// Environment variable prefix
const ENV_PREFIX: &str = "FSQ_";

/// Processes and merges all configuration sources.
///
/// Later merges take priority over earlier ones.
#[derive(Debug)]
pub struct Manager {
    data: Figment,
}

impl Manager {
    /// Constructor holding only the built-in defaults
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Figment::from(Serialized::defaults(Configuration::default())),
        }
    }

    /// General constructor for production use: defaults, then the
    /// configuration file (if given), then the environment.
    #[must_use]
    pub fn standard(config_file: Option<&Path>) -> Self {
        let mut new1 = Self::new();
        if let Some(path) = config_file {
            new1.merge_file(path);
        }
        new1.merge_env();
        new1
    }

    /// Merges in a data set, which is some sort of [figment::Provider](https://docs.rs/figment/latest/figment/trait.Provider.html).
    /// This uses figment's `merge` operation, which prefers to _replace_ existing items.
    pub fn merge_provider<T>(&mut self, provider: T)
    where
        T: Provider,
    {
        let f = std::mem::take(&mut self.data);
        self.data = f.merge(provider); // in the error case, this leaves the provider in a fused state
    }

    /// Merges in a TOML file. A file that does not exist is skipped.
    pub fn merge_file(&mut self, path: &Path) {
        if !path.exists() {
            debug!("configuration file {} not present", path.display());
            return;
        }
        debug!("reading configuration file {}", path.display());
        self.merge_provider(Toml::file(path));
    }

    /// Merges in `FSQ_*` environment variables
    pub fn merge_env(&mut self) {
        self.merge_provider(Env::prefixed(ENV_PREFIX));
    }

    /// Attempts to extract a particular struct from the data.
    ///
    /// `T` is usually [`Configuration`], but it isn't intrinsically required to be.
    pub fn get<'de, T>(&self) -> Result<T>
    where
        T: Deserialize<'de>,
    {
        Ok(self.data.extract::<T>()?)
    }

    /// Extracts and validates the [`Configuration`]
    pub fn configuration(&self) -> Result<Configuration> {
        let config = self.get::<Configuration>()?;
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}
