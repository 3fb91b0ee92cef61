//! Fixed-radius neighbor search for 2D particles on a uniform spatial hash grid.
//!
//! Particles are hashed into square cells whose side equals the interaction radius, sorted
//! by cell and gathered into cell order, so every neighbor of a particle is found by
//! scanning the 3x3 block of cells around it instead of comparing all pairs.

use ndarray::Array2;

pub mod config;
pub mod coordinates;
pub mod error;
pub mod grid;
pub mod particles;

pub use config::{Config, GridConfig};
pub use coordinates::Point;
pub use error::NnsError;
pub use grid::{CellId, IndexCellPair, NeighborGrid, ParticleIndex, EMPTY_CELL};
pub use particles::{generate_positions, MissedNeighbor, Particles};

/// Choose between f32 and f64 to change precision of floating point numbers.
pub type Float = f32;
/// Number of dimensions of space. Only 2 supported.
pub const DIM: usize = 2;

/// Particle positions with shape (n_particles, DIM), one row per particle.
pub type Positions = Array2<Float>;
pub type NeighborCount = u32;

/// Run one query step: hash, sort, build the cell range table, reorder and count.
///
/// Neighbor counts, and lists if `particles` records them, are left in `particles`.
pub fn find_neighbors(grid: &mut NeighborGrid, particles: &mut Particles) -> Result<(), NnsError> {
    if particles.len() != grid.particle_count() {
        return Err(NnsError::ParticleCountMismatch {
            expected: grid.particle_count(),
            found: particles.len(),
        });
    }

    grid.hash(&particles.positions);
    grid.sort();
    grid.find_cell_start_end();
    grid.reorder(&particles.positions, &mut particles.sorted_positions);

    let neighbor_lists = particles
        .record_neighbor_lists
        .then_some(particles.neighbor_lists.as_mut_slice());
    grid.count_neighbors(
        &particles.sorted_positions,
        &mut particles.neighbor_count,
        neighbor_lists,
    );
    Ok(())
}
