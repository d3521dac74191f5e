//! Run configuration for the `codearts-migrate` binary.

use std::io::{BufReader, BufWriter};
use std::path::Path;

use codearts_migrate_emit::{MappingConfig, Result};
use codearts_migrate_extract::{ExtractOptions, FetchOptions};
use serde::{Deserialize, Serialize};

/// Everything a conversion run can be tuned with. Sections left out of the
/// file take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrateConfig {
    pub extract: ExtractOptions,
    pub mapping: MappingConfig,
    pub fetch: FetchOptions,
}

impl MigrateConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }
}
