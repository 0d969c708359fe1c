/*!
Loading a [`Config`] from a file and the environment.

Values come from, lowest priority first: the defaults, an optional TOML,
YAML or JSON file, and `TERRA_BPA_*` environment variables, e.g.
`TERRA_BPA_STATUS_REPORTS=true`.
*/

use super::*;
use ::config::builder::{ConfigBuilder, DefaultState};
use crate::config::Config;
use std::path::Path;
use thiserror::Error;

pub const ENV_PREFIX: &str = "TERRA_BPA";

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to read configuration: {0}")]
    Read(#[source] ::config::ConfigError),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[source] ::config::ConfigError),
}

/// Loads configuration, with the file at `path` if given.  The file must
/// exist when named.
pub fn load(path: Option<&Path>) -> Result<Config, Error> {
    let mut b = ::config::Config::builder();
    if let Some(path) = path {
        info!("Using configuration file '{}'", path.display());
        b = b.add_source(::config::File::from(path));
    }
    parse(b.add_source(::config::Environment::with_prefix(ENV_PREFIX)))
}

/// Builds and deserializes whatever sources `b` has been given
pub fn parse(b: ConfigBuilder<DefaultState>) -> Result<Config, Error> {
    let config: Config = b
        .build()
        .map_err(Error::Read)?
        .try_deserialize()
        .map_err(Error::Parse)?;

    debug!("Loaded configuration: {config:?}");
    Ok(config)
}
