use crate::{Float, Positions};

/// 1D continuous coordinate.
pub type SpaceCoordinate = Float;
/// 1D discrete coordinate on the cell grid. Signed, so positions left of or below the grid
/// map to negative values instead of wrapping.
pub type CellCoordinate = i64;

/// A point in 2D space.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    pub x: SpaceCoordinate,
    pub y: SpaceCoordinate,
}

impl Point {
    pub const fn new(x: SpaceCoordinate, y: SpaceCoordinate) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(self, other: Point) -> Float {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Read the position of particle `index` out of a `(n, DIM)` position buffer.
///
/// # Panics
/// Panics if `index` is not a row of `positions`.
#[inline]
pub fn point_at(positions: &Positions, index: usize) -> Point {
    Point::new(positions[[index, 0]], positions[[index, 1]])
}

/// Return the cell coordinate of `coord` on a grid with cells of size `cell_length` whose
/// origin lies at `-shift`.
///
/// Returns `None` for non-finite input. The result is not bounds checked against any grid.
pub fn cell_coordinate_from(
    coord: SpaceCoordinate,
    shift: SpaceCoordinate,
    cell_length: Float,
) -> Option<CellCoordinate> {
    let scaled = ((coord + shift) / cell_length).floor();
    scaled.is_finite().then_some(scaled as CellCoordinate)
}
