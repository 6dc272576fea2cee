//! Ingest run configuration.
//!
//! Every setting can come from the command line; a TOML file supplies
//! defaults for recurring runs (one delivery station, many sensors).
//! Command-line flags always win over file values.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::Vendor;

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Optional defaults for an ingest run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// The delivering vendor; inferred from the sensor id when absent.
    pub vendor: Option<Vendor>,
    /// The LSST-assigned sensor identifier.
    pub sensor_id: Option<String>,
    /// Base directory for translated files.
    pub output_base: Option<PathBuf>,
    /// Where to write the JSON results report.
    pub report: Option<PathBuf>,
}

impl IngestConfig {
    /// Loads a configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Ok(toml::from_str(&fs::read_to_string(path)?)?)
    }
}
