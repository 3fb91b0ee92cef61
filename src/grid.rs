//! Uniform spatial hash grid over the buffered simulation domain.
//!
//! Cells are squares of side `cell_length`, which is also the interaction radius, so all
//! neighbors of a particle lie in the 3x3 block of cells around its own cell. One query step
//! runs [`NeighborGrid::hash`], [`NeighborGrid::sort`], [`NeighborGrid::find_cell_start_end`],
//! [`NeighborGrid::reorder`] and [`NeighborGrid::count_neighbors`] in that order, see
//! [`crate::find_neighbors`].

use std::ops::Range;

use itertools::Itertools;
use tracing::{debug, warn};

use crate::config::GridConfig;
use crate::coordinates::{cell_coordinate_from, point_at, CellCoordinate, Point};
use crate::error::NnsError;
use crate::{Float, NeighborCount, Positions};

/// Flat index of a cell, `x + y * cell_dim_x`.
pub type CellId = usize;
/// Index of a particle in the original (unsorted) particle order.
pub type ParticleIndex = usize;

/// Value of `cell_start` for a cell without particles.
pub const EMPTY_CELL: usize = usize::MAX;

/// A particle's original index and the cell it was hashed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexCellPair {
    pub cell: CellId,
    pub index: ParticleIndex,
}

#[derive(Debug)]
pub struct NeighborGrid {
    cell_length: Float,
    buffer: Float,
    /// Domain width plus the buffer on both sides.
    buffered_width: Float,
    /// Domain height plus the buffer on both sides.
    buffered_height: Float,
    cell_dim_x: usize,
    cell_dim_y: usize,
    cell_count: usize,
    non_buffer_cell_estimate: usize,
    /// One pair per particle. Sorted by cell after [`NeighborGrid::sort`].
    pairs: Vec<IndexCellPair>,
    /// First position in cell-sorted order of each cell, or [`EMPTY_CELL`].
    cell_start: Vec<usize>,
    /// One past the last position in cell-sorted order of each cell.
    cell_end: Vec<usize>,
}

impl NeighborGrid {
    /// Create a grid for `config.n_particles` particles.
    ///
    /// The grid has `floor((extent + 2 * buffer) / cell_length)` cells along each axis.
    pub fn new(config: &GridConfig) -> Result<Self, NnsError> {
        config.validate()?;
        let GridConfig {
            domain_width,
            domain_height,
            cell_length,
            buffer,
            n_particles,
        } = *config;

        let buffered_width = domain_width + 2. * buffer;
        let buffered_height = domain_height + 2. * buffer;
        let cell_dim_x = (buffered_width / cell_length).floor() as usize;
        let cell_dim_y = (buffered_height / cell_length).floor() as usize;
        let cell_count = cell_dim_x
            .checked_mul(cell_dim_y)
            .ok_or(NnsError::GridTooLarge {
                cell_dim_x,
                cell_dim_y,
            })?;
        if cell_count == 0 {
            return Err(NnsError::EmptyGrid {
                cell_dim_x,
                cell_dim_y,
            });
        }
        // Not used by the search.
        let non_buffer_cell_estimate = (domain_width / cell_length).floor() as usize
            * (domain_height / cell_length).floor() as usize;

        if buffer < 2. * cell_length {
            warn!(
                buffer,
                cell_length, "buffer is narrower than two cells, particles may be clamped"
            );
        }
        debug!(cell_dim_x, cell_dim_y, cell_count, "created neighbor grid");

        Ok(Self {
            cell_length,
            buffer,
            buffered_width,
            buffered_height,
            cell_dim_x,
            cell_dim_y,
            cell_count,
            non_buffer_cell_estimate,
            pairs: (0..n_particles)
                .map(|index| IndexCellPair { cell: 0, index })
                .collect(),
            cell_start: vec![EMPTY_CELL; cell_count],
            cell_end: vec![EMPTY_CELL; cell_count],
        })
    }

    pub fn cell_length(&self) -> Float {
        self.cell_length
    }

    pub fn buffer(&self) -> Float {
        self.buffer
    }

    /// Number of cells along x and y.
    pub fn cell_dims(&self) -> (usize, usize) {
        (self.cell_dim_x, self.cell_dim_y)
    }

    pub fn cell_count(&self) -> usize {
        self.cell_count
    }

    /// Rough number of cells covering the domain without its buffer.
    pub fn non_buffer_cell_estimate(&self) -> usize {
        self.non_buffer_cell_estimate
    }

    pub fn particle_count(&self) -> usize {
        self.pairs.len()
    }

    /// The last cell. Positions outside the grid are clamped into it and it never takes part
    /// in a neighbor query.
    pub fn overflow_cell(&self) -> CellId {
        self.cell_count - 1
    }

    /// Index-cell pairs in their current order, cell-sorted after [`NeighborGrid::sort`].
    pub fn index_cell_pairs(&self) -> &[IndexCellPair] {
        &self.pairs
    }

    /// Flat cell id of cell coordinates, or `None` if they lie off the grid.
    fn cell_id(&self, x: CellCoordinate, y: CellCoordinate) -> Option<CellId> {
        let x = usize::try_from(x).ok().filter(|&x| x < self.cell_dim_x)?;
        let y = usize::try_from(y).ok().filter(|&y| y < self.cell_dim_y)?;
        Some(x + y * self.cell_dim_x)
    }

    /// Cell containing `position`. The domain center maps to the center of the grid.
    ///
    /// Positions outside the buffered domain, and non-finite ones, go to
    /// [`NeighborGrid::overflow_cell`] and lose their neighbor information.
    pub fn hash_position(&self, position: Point) -> CellId {
        let x_cube = cell_coordinate_from(position.x, self.buffered_width / 2., self.cell_length);
        let y_cube =
            cell_coordinate_from(position.y, self.buffered_height / 2., self.cell_length);
        match x_cube.zip(y_cube).and_then(|(x, y)| self.cell_id(x, y)) {
            Some(cell) => cell,
            None => {
                debug!(
                    x = position.x,
                    y = position.y,
                    ?x_cube,
                    ?y_cube,
                    overflow_cell = self.overflow_cell(),
                    "position outside of grid"
                );
                self.overflow_cell()
            }
        }
    }

    /// Assign every particle its cell. Resets the pairs to original particle order.
    pub fn hash(&mut self, positions: &Positions) {
        debug_assert_eq!(positions.nrows(), self.pairs.len());
        for index in 0..self.pairs.len() {
            let cell = self.hash_position(point_at(positions, index));
            self.pairs[index] = IndexCellPair { cell, index };
        }
    }

    /// Sort pairs by ascending cell. Stable, so particles within a cell stay in index order.
    pub fn sort(&mut self) {
        self.pairs.sort_by_key(|pair| pair.cell);
    }

    /// Rebuild the cell range table from the cell-sorted pairs.
    pub fn find_cell_start_end(&mut self) {
        self.cell_start.fill(EMPTY_CELL);
        self.cell_end.fill(EMPTY_CELL);

        let (Some(first), Some(last)) = (self.pairs.first(), self.pairs.last()) else {
            return;
        };
        self.cell_start[first.cell] = 0;
        for (i, (previous, next)) in self.pairs.iter().tuple_windows().enumerate() {
            if previous.cell != next.cell {
                self.cell_end[previous.cell] = i + 1;
                self.cell_start[next.cell] = i + 1;
            }
        }
        self.cell_end[last.cell] = self.pairs.len();
    }

    /// Gather `positions` into cell-sorted order.
    pub fn reorder(&self, positions: &Positions, sorted_positions: &mut Positions) {
        debug_assert_eq!(positions.dim(), sorted_positions.dim());
        for (mut row, pair) in sorted_positions.outer_iter_mut().zip(&self.pairs) {
            row.assign(&positions.row(pair.index));
        }
    }

    /// Range of cell-sorted positions belonging to `cell`, `None` if the cell is empty.
    pub fn cell_range(&self, cell: CellId) -> Option<Range<usize>> {
        match self.cell_start[cell] {
            EMPTY_CELL => None,
            start => Some(start..self.cell_end[cell]),
        }
    }

    /// Every cell with its range of cell-sorted positions.
    pub fn cell_ranges(&self) -> impl Iterator<Item = (CellId, Option<Range<usize>>)> + '_ {
        (0..self.cell_count).map(|cell| (cell, self.cell_range(cell)))
    }

    /// The cell itself and its up to 8 adjacent cells, in ascending order.
    ///
    /// Cells off the grid are skipped rather than wrapped, as is the overflow cell.
    pub fn neighbor_cells(&self, cell: CellId) -> impl Iterator<Item = CellId> + '_ {
        let x = (cell % self.cell_dim_x) as CellCoordinate;
        let y = (cell / self.cell_dim_x) as CellCoordinate;
        (-1..=1)
            .cartesian_product(-1..=1)
            .filter_map(move |(dy, dx)| self.cell_id(x + dx, y + dy))
            .filter(move |&neighbor| neighbor != self.overflow_cell())
    }

    /// Count the neighbors of every particle closer than the cell length.
    ///
    /// Expects cell-sorted positions from [`NeighborGrid::reorder`]. Counts, and lists if
    /// given, are written at each particle's original index and hold original indices.
    pub fn count_neighbors(
        &self,
        sorted_positions: &Positions,
        neighbor_count: &mut [NeighborCount],
        mut neighbor_lists: Option<&mut [Vec<ParticleIndex>]>,
    ) {
        let overflow_cell = self.overflow_cell();

        for (curr_idx, this) in self.pairs.iter().enumerate() {
            if let Some(lists) = neighbor_lists.as_deref_mut() {
                lists[this.index].clear();
            }
            if this.cell == overflow_cell {
                neighbor_count[this.index] = 0;
                continue;
            }

            let this_position = point_at(sorted_positions, curr_idx);
            let mut count: NeighborCount = 0;
            for cell in self.neighbor_cells(this.cell) {
                let Some(range) = self.cell_range(cell) else {
                    continue;
                };
                for check_idx in range {
                    if check_idx == curr_idx {
                        continue;
                    }
                    let distance = this_position.distance(point_at(sorted_positions, check_idx));
                    if distance < self.cell_length {
                        count += 1;
                        if let Some(lists) = neighbor_lists.as_deref_mut() {
                            lists[this.index].push(self.pairs[check_idx].index);
                        }
                    }
                }
            }
            neighbor_count[this.index] = count;
        }
    }
}

#[cfg(test)]
mod test {
    use ndarray::array;

    use super::*;

    /// 15x15 domain, cell length 5 and buffer 10 give a 7x7 grid.
    fn grid(n_particles: usize) -> NeighborGrid {
        NeighborGrid::new(&GridConfig {
            domain_width: 15.,
            domain_height: 15.,
            cell_length: 5.,
            buffer: 10.,
            n_particles,
        })
        .unwrap()
    }

    fn query(
        grid: &mut NeighborGrid,
        positions: &Positions,
    ) -> (Vec<NeighborCount>, Vec<Vec<ParticleIndex>>) {
        let mut sorted_positions = Positions::zeros(positions.dim());
        let mut counts = vec![NeighborCount::MAX; positions.nrows()];
        let mut lists = vec![vec![usize::MAX]; positions.nrows()];
        grid.hash(positions);
        grid.sort();
        grid.find_cell_start_end();
        grid.reorder(positions, &mut sorted_positions);
        grid.count_neighbors(&sorted_positions, &mut counts, Some(&mut lists));
        (counts, lists)
    }

    #[test]
    fn test_dimensions() {
        let grid = grid(1);
        assert_eq!((7, 7), grid.cell_dims());
        assert_eq!(49, grid.cell_count());
        assert_eq!(48, grid.overflow_cell());
        assert_eq!(9, grid.non_buffer_cell_estimate());
    }

    #[test]
    fn test_dimensions_truncate() {
        let grid = NeighborGrid::new(&GridConfig {
            domain_width: 37.,
            domain_height: 23.,
            cell_length: 4.5,
            buffer: 9.,
            n_particles: 1,
        })
        .unwrap();
        // 55 / 4.5 = 12.2 and 41 / 4.5 = 9.1
        assert_eq!((12, 9), grid.cell_dims());
        assert_eq!(8 * 5, grid.non_buffer_cell_estimate());
    }

    #[test]
    fn test_empty_grid_is_rejected() {
        let result = NeighborGrid::new(&GridConfig {
            domain_width: 4.,
            domain_height: 20.,
            cell_length: 5.,
            buffer: 0.,
            n_particles: 1,
        });
        assert!(matches!(
            result,
            Err(NnsError::EmptyGrid {
                cell_dim_x: 0,
                cell_dim_y: 4
            })
        ));
    }

    #[test]
    fn test_hash_position() {
        let grid = grid(1);
        // Domain center is the center of cell (3, 3).
        assert_eq!(3 + 3 * 7, grid.hash_position(Point::new(0., 0.)));
        assert_eq!(0, grid.hash_position(Point::new(-17.5, -17.5)));
        assert_eq!(1 + 2 * 7, grid.hash_position(Point::new(-10., -5.5)));
        assert_eq!(6 + 5 * 7, grid.hash_position(Point::new(17.4, 12.4)));
    }

    #[test]
    fn test_hash_outside_grid_goes_to_overflow_cell() {
        let grid = grid(1);
        for position in [
            Point::new(100., 100.),
            Point::new(-17.6, 0.),
            Point::new(0., -100.),
            Point::new(17.5, 17.5),
            Point::new(Float::NAN, 0.),
        ] {
            assert_eq!(grid.overflow_cell(), grid.hash_position(position));
        }
    }

    #[test]
    fn test_hash_x_overflow_does_not_alias_into_next_row() {
        let grid = grid(1);
        // x_cube = 7 is one past the last column; 7 + 3 * 7 would be cell (0, 4).
        assert_eq!(grid.overflow_cell(), grid.hash_position(Point::new(18., 0.)));
    }

    #[test]
    fn test_sort_is_stable() {
        let mut grid = grid(5);
        let positions = array![[0., 0.], [-10., -10.], [0.5, 0.5], [-10.5, -10.5], [1., 1.]];
        grid.hash(&positions);
        grid.sort();
        let indices: Vec<_> = grid.index_cell_pairs().iter().map(|p| p.index).collect();
        assert_eq!(vec![1, 3, 0, 2, 4], indices);
    }

    #[test]
    fn test_cell_start_end() {
        let mut grid = grid(5);
        let positions = array![[0., 0.], [-10., -10.], [0.5, 0.5], [-10.5, -10.5], [6., 0.]];
        grid.hash(&positions);
        grid.sort();
        grid.find_cell_start_end();

        assert_eq!(Some(0..2), grid.cell_range(1 + 7));
        assert_eq!(Some(2..4), grid.cell_range(3 + 3 * 7));
        assert_eq!(Some(4..5), grid.cell_range(4 + 3 * 7));
        let non_empty = grid.cell_ranges().filter(|(_, range)| range.is_some()).count();
        assert_eq!(3, non_empty);
    }

    #[test]
    fn test_first_cell_gets_a_range() {
        let mut grid = grid(2);
        let positions = array![[-17., -17.], [0., 0.]];
        grid.hash(&positions);
        grid.sort();
        grid.find_cell_start_end();
        assert_eq!(Some(0..1), grid.cell_range(0));
        assert_eq!(Some(1..2), grid.cell_range(24));
    }

    #[test]
    fn test_range_table_is_rebuilt() {
        let mut grid = grid(2);
        let mut positions = array![[0., 0.], [0., 0.]];
        grid.hash(&positions);
        grid.sort();
        grid.find_cell_start_end();
        assert_eq!(Some(0..2), grid.cell_range(24));

        positions[[1, 0]] = 6.;
        grid.hash(&positions);
        grid.sort();
        grid.find_cell_start_end();
        assert_eq!(Some(0..1), grid.cell_range(24));
        assert_eq!(Some(1..2), grid.cell_range(25));
    }

    #[test]
    fn test_reorder() {
        let mut grid = grid(3);
        let positions = array![[0., 0.], [-10., -10.], [6., 0.]];
        let mut sorted = Positions::zeros((3, 2));
        grid.hash(&positions);
        grid.sort();
        grid.reorder(&positions, &mut sorted);
        let expected: Positions = array![[-10., -10.], [0., 0.], [6., 0.]];
        assert_eq!(expected, sorted);
    }

    #[test]
    fn test_neighbor_cells_interior() {
        let grid = grid(1);
        let cells: Vec<_> = grid.neighbor_cells(24).collect();
        assert_eq!(vec![16, 17, 18, 23, 24, 25, 30, 31, 32], cells);
    }

    #[test]
    fn test_neighbor_cells_corner() {
        let grid = grid(1);
        let cells: Vec<_> = grid.neighbor_cells(0).collect();
        assert_eq!(vec![0, 1, 7, 8], cells);
    }

    #[test]
    fn test_neighbor_cells_do_not_wrap_rows() {
        let grid = grid(1);
        // Cell (0, 3). Cells 20 and 27 are the last columns of rows 2 and 3.
        let cells: Vec<_> = grid.neighbor_cells(21).collect();
        assert_eq!(vec![14, 15, 21, 22, 28, 29], cells);
        // Cell (6, 3).
        let cells: Vec<_> = grid.neighbor_cells(27).collect();
        assert_eq!(vec![19, 20, 26, 27, 33, 34], cells);
    }

    #[test]
    fn test_neighbor_cells_skip_overflow_cell() {
        let grid = grid(1);
        let cells: Vec<_> = grid.neighbor_cells(40).collect();
        assert_eq!(vec![32, 33, 34, 39, 40, 41, 46, 47], cells);
    }

    #[test]
    fn test_single_particle_at_origin() {
        let mut grid = grid(1);
        let (counts, lists) = query(&mut grid, &array![[0., 0.]]);
        assert_eq!(vec![0], counts);
        assert!(lists[0].is_empty());
    }

    #[test]
    fn test_neighbors_across_cell_boundary() {
        let mut grid = grid(3);
        // 0 and 1 sit on either side of the boundary at x = 2.5, 2 is too far from both.
        let positions = array![[2.4, 0.], [2.6, 0.], [-3., 4.]];
        let (counts, lists) = query(&mut grid, &positions);
        assert_eq!(vec![1, 1, 0], counts);
        assert_eq!(vec![vec![1], vec![0], vec![]], lists);
    }

    #[test]
    fn test_radius_is_exclusive() {
        let mut grid = grid(2);
        let (counts, _) = query(&mut grid, &array![[0., 0.], [3., 4.]]);
        assert_eq!(vec![0, 0], counts);
    }

    #[test]
    fn test_tiny_grid_visits_each_cell_once() {
        // Without a buffer the grid is 2x2 and every cell is adjacent to every other.
        let mut grid = NeighborGrid::new(&GridConfig {
            domain_width: 10.,
            domain_height: 10.,
            cell_length: 5.,
            buffer: 0.,
            n_particles: 3,
        })
        .unwrap();
        assert_eq!((2, 2), grid.cell_dims());
        let positions = array![[-2., -2.], [-1., -1.], [1., -2.]];
        let (counts, lists) = query(&mut grid, &positions);
        assert_eq!(vec![2, 2, 2], counts);
        assert_eq!(vec![vec![1, 2], vec![0, 2], vec![0, 1]], lists);
    }

    #[test]
    fn test_overflow_cell_is_excluded() {
        let mut grid = grid(3);
        // 1 lies outside the buffered domain, 2 inside the overflow cell (6, 6).
        let positions = array![[0., 0.], [0.5, 40.], [15., 15.]];
        let (counts, lists) = query(&mut grid, &positions);
        assert_eq!(48, grid.hash_position(Point::new(15., 15.)));
        assert_eq!(vec![0, 0, 0], counts);
        assert!(lists.iter().all(Vec::is_empty));
    }

    #[test]
    fn test_counts_are_overwritten() {
        let mut grid = grid(2);
        let (counts, lists) = query(&mut grid, &array![[0., 0.], [1., 0.]]);
        assert_eq!(vec![1, 1], counts);
        assert_eq!(vec![vec![1], vec![0]], lists);
    }
}
