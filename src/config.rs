use std::path::Path;

use serde::Deserialize;

use crate::error::NnsError;
use crate::Float;

/// Geometry of the simulation domain and the hash grid laid over it.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct GridConfig {
    pub domain_width: Float,
    pub domain_height: Float,
    /// Side length of a cell. Also the interaction radius.
    pub cell_length: Float,
    /// Margin added on every side of the domain. Should be at least twice the cell length.
    pub buffer: Float,
    pub n_particles: usize,
}

impl GridConfig {
    pub fn validate(&self) -> Result<(), NnsError> {
        if !(self.cell_length.is_finite() && self.cell_length > 0.) {
            return Err(NnsError::InvalidCellLength(self.cell_length));
        }
        if !(self.buffer.is_finite() && self.buffer >= 0.) {
            return Err(NnsError::InvalidBuffer(self.buffer));
        }
        let positive = |extent: Float| extent.is_finite() && extent > 0.;
        if !(positive(self.domain_width) && positive(self.domain_height)) {
            return Err(NnsError::InvalidDomain {
                width: self.domain_width,
                height: self.domain_height,
            });
        }
        if self.n_particles == 0 {
            return Err(NnsError::NoParticles);
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub grid: GridConfig,
    pub seed: u64,
    /// Record neighbor index lists in addition to counts. Needed for validation, slows the
    /// query down.
    #[serde(default)]
    pub record_neighbor_lists: bool,
    /// Number of timed pipeline and brute-force runs. 0 skips the benchmark.
    #[serde(default)]
    pub iterations: usize,
    /// Log at debug level.
    #[serde(default)]
    pub verbose: bool,
}

/// Read `config/config.toml`, overridden by `NNS__*` environment variables.
pub fn read_config() -> Result<Config, NnsError> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/config.toml");
    let path = if path.exists() {
        path
    } else {
        Path::new("config/config.toml").to_path_buf()
    };
    read_config_from(&path)
}

/// Read the configuration file at `path`, overridden by `NNS__*` environment variables,
/// e.g. `NNS__GRID__CELL_LENGTH=2.5`.
pub fn read_config_from(path: &Path) -> Result<Config, NnsError> {
    let config = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(
            config::Environment::with_prefix("NNS")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let settings: Config = config.try_deserialize()?;
    settings.grid.validate()?;
    Ok(settings)
}
