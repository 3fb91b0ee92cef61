//! Typed errors for grid construction, particle buffers and configuration loading.

use std::fmt;

use crate::Float;

/// Errors arising from invalid configuration or mismatched particle buffers.
#[derive(Debug)]
pub enum NnsError {
    /// Cell length must be finite and strictly positive.
    InvalidCellLength(Float),

    /// Buffer margin must be finite and non-negative.
    InvalidBuffer(Float),

    /// Domain width and height must be finite and strictly positive.
    InvalidDomain { width: Float, height: Float },

    /// At least one particle is required.
    NoParticles,

    /// The buffered domain is smaller than one cell along some axis.
    EmptyGrid { cell_dim_x: usize, cell_dim_y: usize },

    /// The number of cells does not fit in `usize`.
    GridTooLarge { cell_dim_x: usize, cell_dim_y: usize },

    /// Particle buffer and grid were sized for different particle counts.
    ParticleCountMismatch { expected: usize, found: usize },

    /// Flat location buffer does not hold exactly two floats per particle.
    LocationCountMismatch { expected: usize, found: usize },

    /// Position buffer does not have one column per dimension.
    InvalidPositionShape { columns: usize },

    /// Validation needs neighbor lists, but they are not recorded.
    NeighborListsDisabled,

    /// Reading or deserializing the configuration failed.
    Config(config::ConfigError),
}

impl fmt::Display for NnsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCellLength(length) => {
                write!(f, "Cell length must be positive, got {length}")
            }
            Self::InvalidBuffer(buffer) => {
                write!(f, "Buffer margin must not be negative, got {buffer}")
            }
            Self::InvalidDomain { width, height } => {
                write!(f, "Domain must have positive extent, got {width} x {height}")
            }
            Self::NoParticles => write!(f, "Particle count must be positive"),
            Self::EmptyGrid {
                cell_dim_x,
                cell_dim_y,
            } => write!(f, "Grid of {cell_dim_x} x {cell_dim_y} cells has no cells"),
            Self::GridTooLarge {
                cell_dim_x,
                cell_dim_y,
            } => write!(f, "Grid of {cell_dim_x} x {cell_dim_y} cells is too large"),
            Self::ParticleCountMismatch { expected, found } => {
                write!(f, "Expected {expected} particles, found {found}")
            }
            Self::LocationCountMismatch { expected, found } => {
                write!(f, "Expected {expected} location entries, found {found}")
            }
            Self::InvalidPositionShape { columns } => {
                write!(f, "Positions need 2 columns, found {columns}")
            }
            Self::NeighborListsDisabled => {
                write!(f, "Neighbor lists are not recorded, cannot validate")
            }
            Self::Config(e) => write!(f, "Failed to read configuration: {e}"),
        }
    }
}

impl std::error::Error for NnsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for NnsError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e)
    }
}
