//! Height-map representation of a partially loaded container.
//!
//! The loading space is cut by coordinate lines along the width axis (rows)
//! and the depth axis (columns). Every cell stores the stacked height of its
//! rectangle. Refining the grid never changes the represented surface: a new
//! line duplicates the heights of the row or column it splits.

use std::fmt;

use thiserror::Error;

/// One of the two horizontal axes of the loading space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Across the container; indexes rows of the height matrix.
    Width,
    /// Along the container length; indexes columns of the height matrix.
    Depth,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Width => write!(f, "width"),
            Axis::Depth => write!(f, "depth"),
        }
    }
}

/// Contract violations on the grid.
///
/// These are programmer errors: the placement pipeline only issues requests
/// that satisfy them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    #[error("{axis} axis needs at least two coordinate lines, got {count}")]
    TooFewCoordinates { axis: Axis, count: usize },

    #[error("{axis} coordinates must start at 0, got {first}")]
    NonZeroOrigin { axis: Axis, first: f64 },

    #[error("{axis} coordinate {value} at index {index} breaks strict ordering")]
    UnorderedCoordinate { axis: Axis, index: usize, value: f64 },

    #[error("height matrix has shape {rows}x{columns}, coordinates require {expected_rows}x{expected_columns}")]
    ShapeMismatch {
        rows: usize,
        columns: usize,
        expected_rows: usize,
        expected_columns: usize,
    },

    #[error("position {position} is out of range for the {axis} axis with {len} lines")]
    PositionOutOfRange {
        axis: Axis,
        position: usize,
        len: usize,
    },

    #[error("the origin line of the {axis} axis cannot be inserted before or removed")]
    OriginLine { axis: Axis },

    #[error("cell ({row}, {column}) is outside the grid")]
    CellOutOfRange { row: usize, column: usize },

    #[error("height {value} is outside [0, {limit}]")]
    HeightOutOfRange { value: f64, limit: f64 },

    #[error("height limit must be positive and finite, got {0}")]
    InvalidHeightLimit(f64),
}

/// Height map over a dynamically refined rectangular grid.
///
/// Invariants:
/// * `heights.len() == width_coordinates.len()`
/// * `heights[r].len() == depth_coordinates.len()` for every row
/// * coordinate lines are strictly increasing
/// * every height lies in `[0, height_limit]`
#[derive(Clone, Debug, PartialEq)]
pub struct HeightGrid {
    width_coordinates: Vec<f64>,
    depth_coordinates: Vec<f64>,
    heights: Vec<Vec<f64>>,
    height_limit: f64,
}

impl HeightGrid {
    /// Creates a grid with a flat floor over the given coordinate lines.
    ///
    /// # Parameters
    /// * `width_coordinates` - Cut lines along the width axis, starting at 0
    /// * `depth_coordinates` - Cut lines along the depth axis, starting at 0
    /// * `height_limit` - Maximum stack height of the container
    pub fn new(
        width_coordinates: Vec<f64>,
        depth_coordinates: Vec<f64>,
        height_limit: f64,
    ) -> Result<Self, GridError> {
        let heights = vec![vec![0.0; depth_coordinates.len()]; width_coordinates.len()];
        Self::from_heights(width_coordinates, depth_coordinates, heights, height_limit)
    }

    /// Creates the coarsest grid for an empty container: two lines per axis.
    pub fn empty(width: f64, depth: f64, height_limit: f64) -> Result<Self, GridError> {
        Self::new(vec![0.0, width], vec![0.0, depth], height_limit)
    }

    /// Creates a grid from an existing height surface.
    ///
    /// Fails fast if the matrix shape does not match the coordinate counts.
    pub fn from_heights(
        width_coordinates: Vec<f64>,
        depth_coordinates: Vec<f64>,
        heights: Vec<Vec<f64>>,
        height_limit: f64,
    ) -> Result<Self, GridError> {
        if !(height_limit.is_finite() && height_limit > 0.0) {
            return Err(GridError::InvalidHeightLimit(height_limit));
        }
        validate_axis(Axis::Width, &width_coordinates)?;
        validate_axis(Axis::Depth, &depth_coordinates)?;

        let expected_rows = width_coordinates.len();
        let expected_columns = depth_coordinates.len();
        let columns = heights.first().map_or(0, Vec::len);
        if heights.len() != expected_rows || heights.iter().any(|row| row.len() != expected_columns)
        {
            return Err(GridError::ShapeMismatch {
                rows: heights.len(),
                columns,
                expected_rows,
                expected_columns,
            });
        }

        if let Some(&value) = heights
            .iter()
            .flatten()
            .find(|&&value| !(0.0..=height_limit).contains(&value))
        {
            return Err(GridError::HeightOutOfRange {
                value,
                limit: height_limit,
            });
        }

        Ok(Self {
            width_coordinates,
            depth_coordinates,
            heights,
            height_limit,
        })
    }

    /// Returns the stacked height of a cell.
    ///
    /// # Panics
    /// Panics if `row` or `column` is outside the grid, like slice indexing.
    #[inline]
    pub fn height(&self, row: usize, column: usize) -> f64 {
        self.heights[row][column]
    }

    /// Sets the stacked height of a cell.
    pub fn set_height(&mut self, row: usize, column: usize, value: f64) -> Result<(), GridError> {
        if !(0.0..=self.height_limit).contains(&value) {
            return Err(GridError::HeightOutOfRange {
                value,
                limit: self.height_limit,
            });
        }
        let cell = self
            .heights
            .get_mut(row)
            .and_then(|cells| cells.get_mut(column))
            .ok_or(GridError::CellOutOfRange { row, column })?;
        *cell = value;
        Ok(())
    }

    /// Inserts a new cut line before index `position` on the given axis.
    ///
    /// The matching row or column copies the heights of its predecessor, so
    /// the represented surface stays unchanged. Position 0 is rejected since
    /// nothing may precede the origin line.
    pub fn insert_coordinate(
        &mut self,
        axis: Axis,
        position: usize,
        value: f64,
    ) -> Result<(), GridError> {
        let coords = self.coordinates(axis);
        let len = coords.len();
        if position == 0 {
            return Err(GridError::OriginLine { axis });
        }
        if position > len {
            return Err(GridError::PositionOutOfRange {
                axis,
                position,
                len,
            });
        }

        let after_previous = coords[position - 1] < value;
        let before_next = position == len || value < coords[position];
        if !(value.is_finite() && value >= 0.0 && after_previous && before_next) {
            return Err(GridError::UnorderedCoordinate {
                axis,
                index: position,
                value,
            });
        }

        let source = position - 1;
        match axis {
            Axis::Width => {
                let copied = self.heights[source].clone();
                self.heights.insert(position, copied);
                self.width_coordinates.insert(position, value);
            }
            Axis::Depth => {
                for row in &mut self.heights {
                    let copied = row[source];
                    row.insert(position, copied);
                }
                self.depth_coordinates.insert(position, value);
            }
        }
        Ok(())
    }

    /// Removes the cut line at `position` together with its row or column.
    ///
    /// Returns the removed coordinate. At least two lines always remain and
    /// the origin line at position 0 is never removed.
    pub fn delete_coordinate(&mut self, axis: Axis, position: usize) -> Result<f64, GridError> {
        let len = self.coordinates(axis).len();
        if position == 0 {
            return Err(GridError::OriginLine { axis });
        }
        if position >= len {
            return Err(GridError::PositionOutOfRange {
                axis,
                position,
                len,
            });
        }
        if len <= 2 {
            return Err(GridError::TooFewCoordinates { axis, count: len });
        }

        let removed = match axis {
            Axis::Width => {
                self.heights.remove(position);
                self.width_coordinates.remove(position)
            }
            Axis::Depth => {
                for row in &mut self.heights {
                    row.remove(position);
                }
                self.depth_coordinates.remove(position)
            }
        };
        Ok(removed)
    }

    /// Cut lines along an axis.
    #[inline]
    pub fn coordinates(&self, axis: Axis) -> &[f64] {
        match axis {
            Axis::Width => &self.width_coordinates,
            Axis::Depth => &self.depth_coordinates,
        }
    }

    /// Cut lines along the width axis.
    #[inline]
    pub fn width_coordinates(&self) -> &[f64] {
        &self.width_coordinates
    }

    /// Cut lines along the depth axis.
    #[inline]
    pub fn depth_coordinates(&self) -> &[f64] {
        &self.depth_coordinates
    }

    /// Number of rows of the height matrix.
    #[inline]
    pub fn rows(&self) -> usize {
        self.heights.len()
    }

    /// Number of columns of the height matrix.
    #[inline]
    pub fn columns(&self) -> usize {
        self.depth_coordinates.len()
    }

    /// Last cut line of an axis.
    #[inline]
    pub fn extent(&self, axis: Axis) -> f64 {
        self.coordinates(axis).last().copied().unwrap_or(0.0)
    }

    #[inline]
    pub fn width_extent(&self) -> f64 {
        self.extent(Axis::Width)
    }

    #[inline]
    pub fn depth_extent(&self) -> f64 {
        self.extent(Axis::Depth)
    }

    #[inline]
    pub fn height_limit(&self) -> f64 {
        self.height_limit
    }

    /// Iterates over the heights of one row.
    pub fn row(&self, row: usize) -> Option<&[f64]> {
        self.heights.get(row).map(Vec::as_slice)
    }
}

impl fmt::Display for HeightGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row, width) in self.heights.iter().zip(&self.width_coordinates) {
            write!(f, "{:>10.2} |", width)?;
            for value in row {
                write!(f, " {:>8.2}", value)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

fn validate_axis(axis: Axis, coords: &[f64]) -> Result<(), GridError> {
    if coords.len() < 2 {
        return Err(GridError::TooFewCoordinates {
            axis,
            count: coords.len(),
        });
    }
    if coords[0] != 0.0 {
        return Err(GridError::NonZeroOrigin {
            axis,
            first: coords[0],
        });
    }
    for (index, pair) in coords.windows(2).enumerate() {
        if !(pair[1].is_finite() && pair[0] < pair[1]) {
            return Err(GridError::UnorderedCoordinate {
                axis,
                index: index + 1,
                value: pair[1],
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_grid() -> HeightGrid {
        HeightGrid::new(vec![0.0, 10.0, 20.0, 40.0], vec![0.0, 10.0, 20.0, 80.0], 100.0)
            .unwrap()
    }

    fn assert_shape(grid: &HeightGrid) {
        assert_eq!(grid.rows(), grid.width_coordinates().len());
        for row in 0..grid.rows() {
            assert_eq!(grid.row(row).unwrap().len(), grid.depth_coordinates().len());
        }
    }

    #[test]
    fn new_grid_is_flat() {
        let grid = sample_grid();
        assert_shape(&grid);
        assert_eq!(grid.width_extent(), 40.0);
        assert_eq!(grid.depth_extent(), 80.0);
        for row in 0..grid.rows() {
            for column in 0..grid.columns() {
                assert_eq!(grid.height(row, column), 0.0);
            }
        }
    }

    #[test]
    fn rejects_malformed_coordinates() {
        assert!(matches!(
            HeightGrid::new(vec![0.0], vec![0.0, 10.0], 10.0),
            Err(GridError::TooFewCoordinates {
                axis: Axis::Width,
                ..
            })
        ));
        assert!(matches!(
            HeightGrid::new(vec![0.0, 10.0], vec![5.0, 10.0], 10.0),
            Err(GridError::NonZeroOrigin {
                axis: Axis::Depth,
                ..
            })
        ));
        assert!(matches!(
            HeightGrid::new(vec![0.0, 10.0, 10.0], vec![0.0, 10.0], 10.0),
            Err(GridError::UnorderedCoordinate { index: 2, .. })
        ));
        assert!(matches!(
            HeightGrid::new(vec![0.0, 10.0], vec![0.0, 10.0], 0.0),
            Err(GridError::InvalidHeightLimit(_))
        ));
    }

    #[test]
    fn from_heights_checks_matrix_shape() {
        let result = HeightGrid::from_heights(
            vec![0.0, 10.0, 20.0],
            vec![0.0, 10.0],
            vec![vec![0.0, 0.0], vec![0.0, 0.0]],
            50.0,
        );
        assert!(matches!(
            result,
            Err(GridError::ShapeMismatch {
                rows: 2,
                expected_rows: 3,
                ..
            })
        ));

        let result = HeightGrid::from_heights(
            vec![0.0, 10.0],
            vec![0.0, 10.0],
            vec![vec![0.0, 60.0], vec![0.0, 0.0]],
            50.0,
        );
        assert!(matches!(result, Err(GridError::HeightOutOfRange { .. })));
    }

    #[test]
    fn set_height_validates_cell_and_value() {
        let mut grid = sample_grid();
        grid.set_height(1, 2, 30.0).unwrap();
        assert_eq!(grid.height(1, 2), 30.0);
        assert!(matches!(
            grid.set_height(9, 0, 1.0),
            Err(GridError::CellOutOfRange { row: 9, column: 0 })
        ));
        assert!(matches!(
            grid.set_height(0, 0, 101.0),
            Err(GridError::HeightOutOfRange { .. })
        ));
        assert!(grid.set_height(0, 0, -1.0).is_err());
    }

    #[test]
    fn inserted_row_copies_preceding_row() {
        let mut grid = sample_grid();
        grid.set_height(1, 0, 30.0).unwrap();
        grid.set_height(1, 1, 30.0).unwrap();
        grid.set_height(1, 2, 30.0).unwrap();

        grid.insert_coordinate(Axis::Width, 2, 15.0).unwrap();

        assert_shape(&grid);
        assert_eq!(grid.width_coordinates(), &[0.0, 10.0, 15.0, 20.0, 40.0]);
        assert_eq!(grid.row(2).unwrap(), grid.row(1).unwrap());
        assert_eq!(grid.row(3).unwrap(), &[0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn inserted_column_copies_preceding_column() {
        let mut grid = sample_grid();
        grid.set_height(0, 2, 12.0).unwrap();
        grid.set_height(2, 2, 7.0).unwrap();

        grid.insert_coordinate(Axis::Depth, 3, 50.0).unwrap();

        assert_shape(&grid);
        assert_eq!(grid.depth_coordinates(), &[0.0, 10.0, 20.0, 50.0, 80.0]);
        for row in 0..grid.rows() {
            assert_eq!(grid.height(row, 3), grid.height(row, 2));
        }
        assert_eq!(grid.height(0, 3), 12.0);
        assert_eq!(grid.height(2, 3), 7.0);
    }

    #[test]
    fn shape_invariant_holds_across_insertions() {
        let mut grid = HeightGrid::empty(100.0, 200.0, 50.0).unwrap();
        let inserts = [
            (Axis::Width, 1, 40.0),
            (Axis::Depth, 1, 120.0),
            (Axis::Width, 1, 10.0),
            (Axis::Depth, 2, 150.0),
            (Axis::Depth, 4, 250.0),
            (Axis::Width, 4, 130.0),
        ];
        for (axis, position, value) in inserts {
            grid.insert_coordinate(axis, position, value).unwrap();
            assert_shape(&grid);
        }
        assert_eq!(grid.width_coordinates(), &[0.0, 10.0, 40.0, 100.0, 130.0]);
        assert_eq!(grid.depth_extent(), 250.0);
    }

    #[test]
    fn insert_rejects_out_of_range_or_unordered_positions() {
        let mut grid = sample_grid();
        assert!(matches!(
            grid.insert_coordinate(Axis::Width, 5, 50.0),
            Err(GridError::PositionOutOfRange {
                position: 5,
                len: 4,
                ..
            })
        ));
        assert!(matches!(
            grid.insert_coordinate(Axis::Depth, 1, 30.0),
            Err(GridError::UnorderedCoordinate { .. })
        ));
        assert!(grid.insert_coordinate(Axis::Width, 2, 10.0).is_err());
        assert_shape(&grid);
    }

    #[test]
    fn insert_before_origin_is_rejected() {
        let mut grid = sample_grid();
        let before = grid.clone();
        assert_eq!(
            grid.insert_coordinate(Axis::Width, 0, 0.0),
            Err(GridError::OriginLine { axis: Axis::Width })
        );
        assert_eq!(
            grid.insert_coordinate(Axis::Depth, 0, 5.0),
            Err(GridError::OriginLine { axis: Axis::Depth })
        );
        assert_eq!(grid, before);
    }

    #[test]
    fn delete_is_inverse_of_insert() {
        let mut grid = sample_grid();
        grid.set_height(1, 1, 5.0).unwrap();
        let before = grid.clone();

        grid.insert_coordinate(Axis::Depth, 2, 15.0).unwrap();
        let removed = grid.delete_coordinate(Axis::Depth, 2).unwrap();

        assert_eq!(removed, 15.0);
        assert_eq!(grid, before);
    }

    #[test]
    fn delete_rejects_invalid_positions() {
        let mut grid = sample_grid();
        assert!(matches!(
            grid.delete_coordinate(Axis::Width, 4),
            Err(GridError::PositionOutOfRange { .. })
        ));

        let mut coarse = HeightGrid::empty(10.0, 10.0, 10.0).unwrap();
        assert!(matches!(
            coarse.delete_coordinate(Axis::Depth, 1),
            Err(GridError::TooFewCoordinates { .. })
        ));
    }

    #[test]
    fn delete_keeps_origin_line() {
        let mut grid = sample_grid();
        let before = grid.clone();
        assert_eq!(
            grid.delete_coordinate(Axis::Width, 0),
            Err(GridError::OriginLine { axis: Axis::Width })
        );
        assert_eq!(
            grid.delete_coordinate(Axis::Depth, 0),
            Err(GridError::OriginLine { axis: Axis::Depth })
        );
        assert_eq!(grid, before);
        assert_eq!(grid.width_coordinates()[0], 0.0);
        assert_eq!(grid.depth_coordinates()[0], 0.0);
    }

    #[test]
    fn display_lists_one_line_per_row() {
        let grid = sample_grid();
        let rendered = grid.to_string();
        assert_eq!(rendered.lines().count(), 4);
    }
}
