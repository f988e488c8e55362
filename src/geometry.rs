//! Geometric helpers for coordinate lines and placed boxes.
//!
//! A coordinate axis is a strictly increasing list of cut lines. Cell `i` on
//! that axis spans `[coords[i], coords[i + 1]]`.

use crate::model::PlacedBox;

/// Finds the cell whose interval contains `value`.
///
/// Returns the first index `i` with `coords[i] < value <= coords[i + 1]`, so a
/// value lying exactly on a line resolves to the cell that ends there.
///
/// # Parameters
/// * `coords` - Strictly increasing coordinate lines
/// * `value` - Real coordinate to locate
/// * `epsilon` - Values within `epsilon` above a line count as lying on it
///
/// # Returns
/// `None` if `value` is not above the first line or beyond the last line
///
/// # Examples
/// ```
/// use load_it_now::geometry::interval_containing;
///
/// let coords = [0.0, 10.0, 20.0, 40.0];
/// assert_eq!(interval_containing(&coords, 13.0, 0.0), Some(1));
/// assert_eq!(interval_containing(&coords, 20.0, 0.0), Some(1));
/// assert_eq!(interval_containing(&coords, 41.0, 0.0), None);
/// ```
pub fn interval_containing(coords: &[f64], value: f64, epsilon: f64) -> Option<usize> {
    coords
        .windows(2)
        .position(|line| value > line[0] + epsilon && value <= line[1] + epsilon)
}

/// Checks whether `value` coincides with the cut line at `index`.
pub fn lies_on_line(coords: &[f64], index: usize, value: f64, epsilon: f64) -> bool {
    coords
        .get(index)
        .is_some_and(|line| (line - value).abs() <= epsilon)
}

/// Distance between the centre of `[lower, upper]` and the middle of `[0, extent]`.
#[inline]
pub fn center_offset(lower: f64, upper: f64, extent: f64) -> f64 {
    ((lower + upper) / 2.0 - extent / 2.0).abs()
}

/// Checks whether two placed boxes share interior volume.
///
/// Boxes that only touch on a face are not considered overlapping.
pub fn intersects(a: &PlacedBox, b: &PlacedBox) -> bool {
    a.bounds.intersects(&b.bounds)
}
