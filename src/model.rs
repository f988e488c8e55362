//! Data models for the container loading simulation.
//!
//! This module defines the fundamental data structures:
//! - `ItemRecord` / `ContainerSpec`: raw input as delivered by the caller
//! - `Package`: a single box to be loaded, expanded from an item record
//! - `PlacedBox`: a committed placement with lower and upper corner
//! - `Container`: the height grid plus the list of committed boxes

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::grid::{GridError, HeightGrid};
use crate::types::{BoundingBox, Dimensional, Vec3, validation};

/// Display colours assigned to item groups, in group order.
///
/// Groups beyond the palette length wrap around.
pub const PALETTE: [&str; 17] = [
    "red", "green", "blue", "yellow", "purple", "white", "black", "orange", "violet", "cyan",
    "gray", "pink", "brown", "lime", "maroon", "olive", "navy",
];

/// Upper bound on the number of packages a single request may expand to.
pub const MAX_PACKAGES: usize = 10_000;

/// Returns the palette colour of a group.
pub fn palette_color(group_id: usize) -> &'static str {
    PALETTE[group_id % PALETTE.len()]
}

/// Validation error for input data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),
}

/// Dimensions of the target container.
///
/// `length` runs along the depth axis of the height grid (loading meters),
/// `width` across it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "length": 13620.0, "width": 2480.0, "height": 2670.0 }))]
pub struct ContainerSpec {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

impl ContainerSpec {
    /// Creates a validated container specification.
    pub fn new(length: f64, width: f64, height: f64) -> Result<Self, ValidationError> {
        let spec = Self {
            length,
            width,
            height,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Checks that all three extents are positive and finite.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_dimension(self.length, "Container length")
            .and_then(|_| validation::validate_dimension(self.width, "Container width"))
            .and_then(|_| validation::validate_dimension(self.height, "Container height"))
            .map_err(ValidationError::InvalidDimension)
    }
}

fn default_quantity() -> usize {
    1
}

fn default_stackable() -> bool {
    true
}

/// One line of a delivery: a box type and how many of it to load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "length": 660.0, "width": 940.0, "height": 1203.0, "quantity": 6 }))]
pub struct ItemRecord {
    pub length: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default = "default_quantity")]
    pub quantity: usize,
    #[serde(default = "default_stackable")]
    pub stackable: bool,
    #[serde(default)]
    #[schema(nullable = true)]
    pub kind: Option<String>,
}

impl ItemRecord {
    /// Creates a stackable record without a type annotation.
    pub fn new(length: f64, width: f64, height: f64, quantity: usize) -> Self {
        Self {
            length,
            width,
            height,
            quantity,
            stackable: true,
            kind: None,
        }
    }
}

/// A single box to be loaded.
///
/// Boxes are never rotated: `width` runs along the container width, `depth`
/// along the container length.
#[derive(Clone, Debug, PartialEq)]
pub struct Package {
    pub item_id: usize,
    pub width: f64,
    pub depth: f64,
    pub height: f64,
    pub stackable: bool,
    pub group_id: usize,
    pub color: String,
    pub kind: Option<String>,
}

impl Package {
    /// Creates a new package with validated dimensions.
    ///
    /// # Examples
    /// ```
    /// use load_it_now::model::Package;
    ///
    /// assert!(Package::new(0, 940.0, 660.0, 1203.0, 0).is_ok());
    /// assert!(Package::new(0, -1.0, 660.0, 1203.0, 0).is_err());
    /// ```
    pub fn new(
        item_id: usize,
        width: f64,
        depth: f64,
        height: f64,
        group_id: usize,
    ) -> Result<Self, ValidationError> {
        validation::validate_dimensions_3d((width, depth, height))
            .map_err(ValidationError::InvalidDimension)?;
        Ok(Self {
            item_id,
            width,
            depth,
            height,
            stackable: true,
            group_id,
            color: palette_color(group_id).to_string(),
            kind: None,
        })
    }
}

impl Dimensional for Package {
    fn dimensions(&self) -> Vec3 {
        Vec3::new(self.width, self.depth, self.height)
    }
}

/// Expands item records into individual packages.
///
/// Record `i` yields `quantity` packages that share group id `i` and the
/// group's palette colour. Item ids are sequential across all records.
/// The total package count is capped at [`MAX_PACKAGES`].
pub fn expand_items(records: &[ItemRecord]) -> Result<Vec<Package>, ValidationError> {
    let mut total: usize = 0;
    for (group_id, record) in records.iter().enumerate() {
        if record.quantity == 0 {
            return Err(ValidationError::InvalidQuantity(format!(
                "item {} must have a quantity of at least 1",
                group_id
            )));
        }
        total = total
            .checked_add(record.quantity)
            .filter(|&sum| sum <= MAX_PACKAGES)
            .ok_or_else(|| {
                ValidationError::InvalidQuantity(format!(
                    "total quantity exceeds the limit of {} packages",
                    MAX_PACKAGES
                ))
            })?;
    }

    let mut packages = Vec::with_capacity(total);
    for (group_id, record) in records.iter().enumerate() {
        for _ in 0..record.quantity {
            let mut package = Package::new(
                packages.len(),
                record.width,
                record.length,
                record.height,
                group_id,
            )?;
            package.stackable = record.stackable;
            package.kind = record.kind.clone();
            packages.push(package);
        }
    }

    Ok(packages)
}

/// A committed placement inside a container.
///
/// Created once per accepted box and never mutated afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct PlacedBox {
    /// Sequential insertion index within the container.
    pub index: usize,
    /// Size as (width, depth, height).
    pub size: Vec3,
    /// Lower and upper corner in loading-space coordinates.
    pub bounds: BoundingBox,
}

impl PlacedBox {
    /// Lower corner (width, depth, height).
    #[inline]
    pub fn lower_corner(&self) -> Vec3 {
        self.bounds.min
    }

    /// Upper corner (width, depth, height).
    #[inline]
    pub fn upper_corner(&self) -> Vec3 {
        self.bounds.max
    }
}

impl Dimensional for PlacedBox {
    fn dimensions(&self) -> Vec3 {
        self.size
    }
}

/// A container being loaded: height grid plus committed boxes.
#[derive(Clone, Debug)]
pub struct Container {
    pub grid: HeightGrid,
    pub placed: Vec<PlacedBox>,
}

impl Container {
    /// Wraps an existing grid; the box list starts empty.
    pub fn new(grid: HeightGrid) -> Self {
        Self {
            grid,
            placed: Vec::new(),
        }
    }

    /// Creates an empty container with the coarsest two-line grid.
    pub fn empty(spec: &ContainerSpec) -> Result<Self, GridError> {
        HeightGrid::empty(spec.width, spec.length, spec.height).map(Self::new)
    }

    /// Container dimensions as (width, depth, height).
    pub fn dims_as_vec3(&self) -> Vec3 {
        Vec3::new(
            self.grid.width_extent(),
            self.grid.depth_extent(),
            self.grid.height_limit(),
        )
    }

    /// Checks if a package could fit an empty container of this size.
    pub fn can_fit(&self, package: &Package, tolerance: f64) -> bool {
        package.fits_in(&self.dims_as_vec3(), tolerance)
    }

    /// Sum of the volumes of all placed boxes.
    pub fn used_volume(&self) -> f64 {
        self.placed.iter().map(|b| b.volume()).sum()
    }

    /// Total volume of the loading space.
    pub fn total_volume(&self) -> f64 {
        self.dims_as_vec3().volume()
    }

    /// Volume utilisation in percent (0.0 to 100.0).
    pub fn utilization_percent(&self) -> f64 {
        let total = self.total_volume();
        if total <= 0.0 {
            return 0.0;
        }
        (self.used_volume() / total) * 100.0
    }

    /// Furthest depth coordinate reached by any box.
    pub fn loading_meters(&self) -> f64 {
        self.placed
            .iter()
            .map(|b| b.upper_corner().y)
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_items_assigns_groups_and_colors() {
        let records = vec![
            ItemRecord::new(660.0, 940.0, 1203.0, 3),
            ItemRecord::new(660.0, 920.0, 1248.0, 2),
        ];

        let packages = expand_items(&records).unwrap();
        assert_eq!(packages.len(), 5);
        let ids: Vec<_> = packages.iter().map(|p| p.item_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert!(packages[..3].iter().all(|p| p.group_id == 0 && p.color == "red"));
        assert!(packages[3..].iter().all(|p| p.group_id == 1 && p.color == "green"));
        assert_eq!(packages[0].depth, 660.0);
        assert_eq!(packages[0].width, 940.0);
    }

    #[test]
    fn palette_wraps_around() {
        assert_eq!(palette_color(0), "red");
        assert_eq!(palette_color(16), "navy");
        assert_eq!(palette_color(17), "red");
        assert_eq!(palette_color(19), "blue");
    }

    #[test]
    fn expand_items_rejects_invalid_records() {
        let zero_quantity = vec![ItemRecord::new(1.0, 1.0, 1.0, 0)];
        assert!(matches!(
            expand_items(&zero_quantity),
            Err(ValidationError::InvalidQuantity(_))
        ));

        let negative = vec![ItemRecord::new(1.0, -1.0, 1.0, 1)];
        assert!(matches!(
            expand_items(&negative),
            Err(ValidationError::InvalidDimension(_))
        ));
    }

    #[test]
    fn container_spec_validation() {
        assert!(ContainerSpec::new(100.0, 50.0, 40.0).is_ok());
        assert!(ContainerSpec::new(0.0, 50.0, 40.0).is_err());
        assert!(ContainerSpec::new(100.0, f64::NAN, 40.0).is_err());
    }

    #[test]
    fn empty_container_uses_two_lines_per_axis() {
        let spec = ContainerSpec::new(80.0, 40.0, 30.0).unwrap();
        let container = Container::empty(&spec).unwrap();
        assert_eq!(container.grid.width_coordinates(), &[0.0, 40.0]);
        assert_eq!(container.grid.depth_coordinates(), &[0.0, 80.0]);
        assert_eq!(container.grid.height_limit(), 30.0);
        assert!(container.placed.is_empty());
        assert_eq!(container.utilization_percent(), 0.0);
    }

    #[test]
    fn can_fit_compares_against_extents() {
        let spec = ContainerSpec::new(80.0, 40.0, 30.0).unwrap();
        let container = Container::empty(&spec).unwrap();
        let fits = Package::new(0, 40.0, 80.0, 30.0, 0).unwrap();
        let too_wide = Package::new(1, 41.0, 10.0, 10.0, 0).unwrap();
        assert!(container.can_fit(&fits, 1e-9));
        assert!(!container.can_fit(&too_wide, 1e-9));
    }

    #[test]
    fn can_fit_honours_tolerance() {
        let spec = ContainerSpec::new(80.0, 40.0, 30.0).unwrap();
        let container = Container::empty(&spec).unwrap();
        let slightly_wide = Package::new(0, 40.05, 10.0, 10.0, 0).unwrap();
        assert!(!container.can_fit(&slightly_wide, 1e-9));
        assert!(container.can_fit(&slightly_wide, 0.1));
    }

    #[test]
    fn expand_items_rejects_oversized_totals() {
        let overflowing = vec![ItemRecord::new(1.0, 1.0, 1.0, usize::MAX / 2 + 1); 2];
        assert!(matches!(
            expand_items(&overflowing),
            Err(ValidationError::InvalidQuantity(_))
        ));

        let huge = vec![ItemRecord::new(1.0, 1.0, 1.0, 1usize << 44)];
        assert!(matches!(
            expand_items(&huge),
            Err(ValidationError::InvalidQuantity(_))
        ));

        let split = vec![
            ItemRecord::new(1.0, 1.0, 1.0, MAX_PACKAGES / 2),
            ItemRecord::new(1.0, 1.0, 1.0, MAX_PACKAGES / 2 + 1),
        ];
        assert!(matches!(
            expand_items(&split),
            Err(ValidationError::InvalidQuantity(_))
        ));

        let at_limit = vec![ItemRecord::new(1.0, 1.0, 1.0, MAX_PACKAGES)];
        assert_eq!(expand_items(&at_limit).unwrap().len(), MAX_PACKAGES);
    }
}
