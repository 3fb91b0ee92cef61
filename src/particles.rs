use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::config::GridConfig;
use crate::coordinates::point_at;
use crate::error::NnsError;
use crate::grid::ParticleIndex;
use crate::{Float, NeighborCount, Positions, DIM};

/// A neighbor found by brute force but missing from the grid search result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MissedNeighbor {
    pub particle: ParticleIndex,
    pub neighbor: ParticleIndex,
    pub distance: Float,
}

/// Particle positions and the neighbor search results, indexed by original particle index.
#[derive(Debug, Clone)]
pub struct Particles {
    pub(crate) positions: Positions,
    /// Positions gathered into cell-sorted order by the grid.
    pub(crate) sorted_positions: Positions,
    pub(crate) neighbor_count: Vec<NeighborCount>,
    pub(crate) neighbor_lists: Vec<Vec<ParticleIndex>>,
    pub(crate) record_neighbor_lists: bool,
    // Brute force reference results.
    neighbor_count_brute_force: Vec<NeighborCount>,
    neighbor_lists_brute_force: Vec<Vec<ParticleIndex>>,
}

impl Particles {
    /// Wrap a `(n_particles, DIM)` position buffer.
    pub fn new(positions: Positions, record_neighbor_lists: bool) -> Result<Self, NnsError> {
        let (n_particles, columns) = positions.dim();
        if columns != DIM {
            return Err(NnsError::InvalidPositionShape { columns });
        }
        if n_particles == 0 {
            return Err(NnsError::NoParticles);
        }

        Ok(Self {
            sorted_positions: Positions::zeros(positions.dim()),
            positions,
            neighbor_count: vec![0; n_particles],
            neighbor_lists: vec![Vec::new(); n_particles],
            record_neighbor_lists,
            neighbor_count_brute_force: vec![0; n_particles],
            neighbor_lists_brute_force: vec![Vec::new(); n_particles],
        })
    }

    /// Build from interleaved `x0, y0, x1, y1, ...` locations of `n_particles` particles.
    pub fn from_flat(
        n_particles: usize,
        locations: Vec<Float>,
        record_neighbor_lists: bool,
    ) -> Result<Self, NnsError> {
        let expected = n_particles * DIM;
        let found = locations.len();
        let positions = Positions::from_shape_vec((n_particles, DIM), locations)
            .map_err(|_| NnsError::LocationCountMismatch { expected, found })?;
        Self::new(positions, record_neighbor_lists)
    }

    pub fn len(&self) -> usize {
        self.positions.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn positions(&self) -> &Positions {
        &self.positions
    }

    /// Positions in the cell-sorted order of the last query.
    pub fn sorted_positions(&self) -> &Positions {
        &self.sorted_positions
    }

    pub fn records_neighbor_lists(&self) -> bool {
        self.record_neighbor_lists
    }

    pub fn neighbor_count(&self) -> &[NeighborCount] {
        &self.neighbor_count
    }

    /// Neighbors of every particle. Empty unless neighbor lists are recorded.
    pub fn neighbor_lists(&self) -> &[Vec<ParticleIndex>] {
        &self.neighbor_lists
    }

    pub fn neighbor_count_brute_force(&self) -> &[NeighborCount] {
        &self.neighbor_count_brute_force
    }

    pub fn neighbor_lists_brute_force(&self) -> &[Vec<ParticleIndex>] {
        &self.neighbor_lists_brute_force
    }

    /// Count neighbors closer than `radius` by comparing all pairs, O(n^2).
    pub fn count_neighbors_brute_force(&mut self, radius: Float) {
        for curr_idx in 0..self.len() {
            let this_position = point_at(&self.positions, curr_idx);
            let list = &mut self.neighbor_lists_brute_force[curr_idx];
            list.clear();

            let mut count: NeighborCount = 0;
            for check_idx in 0..self.positions.nrows() {
                if check_idx == curr_idx {
                    continue;
                }
                if this_position.distance(point_at(&self.positions, check_idx)) < radius {
                    count += 1;
                    if self.record_neighbor_lists {
                        list.push(check_idx);
                    }
                }
            }
            self.neighbor_count_brute_force[curr_idx] = count;
        }
    }

    /// Return every brute force neighbor the grid search did not find.
    ///
    /// Run after [`crate::find_neighbors`] and [`Particles::count_neighbors_brute_force`].
    pub fn check(&self) -> Result<Vec<MissedNeighbor>, NnsError> {
        if !self.record_neighbor_lists {
            return Err(NnsError::NeighborListsDisabled);
        }

        let mut missed = vec![];
        for (particle, (expected, found)) in self
            .neighbor_lists_brute_force
            .iter()
            .zip(&self.neighbor_lists)
            .enumerate()
        {
            let this_position = point_at(&self.positions, particle);
            for &neighbor in expected.iter().filter(|&n| !found.contains(n)) {
                let distance = this_position.distance(point_at(&self.positions, neighbor));
                warn!(particle, neighbor, distance, "grid search missed a neighbor");
                missed.push(MissedNeighbor {
                    particle,
                    neighbor,
                    distance,
                });
            }
        }

        if missed.is_empty() {
            info!("grid search found every brute force neighbor");
        }
        Ok(missed)
    }
}

/// Generate random particles uniformly distributed over the domain, which is centered on the
/// origin. Laid out with shape (`n_particles`, DIM).
pub fn generate_positions(config: &GridConfig, seed: u64) -> Positions {
    let mut rng = <StdRng as SeedableRng>::seed_from_u64(seed);
    let half_extent = [config.domain_width / 2., config.domain_height / 2.];
    Positions::from_shape_fn((config.n_particles, DIM), |(_, axis)| {
        rng.gen_range(-half_extent[axis]..half_extent[axis])
    })
}
