//! Common types and traits for the loading grid.
//!
//! This module defines the value types shared by every planning stage:
//! grid coordinates, grid bounds, package categories and the small trait
//! abstractions over "things with a length" and "things with a weight".

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Global numerical tolerance for length comparisons.
///
/// Used for row capacity checks. Category classification is exact.
pub const EPSILON_LENGTH: f64 = 1e-6;

/// Number of physical floors on the loading grid.
pub const FLOORS: u32 = 4;

/// Number of rows per floor.
pub const ROWS: u32 = 3;

/// Smallest column bound a planning request may use.
pub const MIN_COLUMNS: u32 = 3;

/// Largest column bound a planning request may use.
pub const MAX_COLUMNS: u32 = 50;

/// Length at and above which an item is packed as a large-category bundle.
pub const LARGE_LENGTH_THRESHOLD: f64 = 5.80;

/// Units per package for large-category items.
pub const LARGE_PACKAGE_SIZE: u64 = 10;

/// Units per package for small-category items.
pub const SMALL_PACKAGE_SIZE: u64 = 20;

/// A cell on the loading grid.
///
/// All three axes are 1-based; floor 1 is the lowest physical level.
///
/// # Examples
/// ```
/// use beam_stacker::types::{GridBounds, GridPosition};
///
/// let pos = GridPosition::new(2, 1, 3);
/// assert!(pos.is_within(&GridBounds::with_columns(3)));
/// assert!(!pos.is_ground());
/// ```
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
pub struct GridPosition {
    pub floor: u32,
    pub row: u32,
    pub column: u32,
}

impl GridPosition {
    /// Creates a new grid position.
    ///
    /// # Parameters
    /// * `floor` - Floor (1 = lowest)
    /// * `row` - Row within the floor
    /// * `column` - Column within the row
    #[inline]
    pub const fn new(floor: u32, row: u32, column: u32) -> Self {
        Self { floor, row, column }
    }

    /// Returns `true` for positions on the lowest floor.
    #[inline]
    pub const fn is_ground(&self) -> bool {
        self.floor == 1
    }

    /// Returns a copy of this position moved to another row.
    #[inline]
    pub const fn with_row(self, row: u32) -> Self {
        Self::new(self.floor, row, self.column)
    }

    /// Checks whether the position lies inside the given bounds.
    #[inline]
    pub fn is_within(&self, bounds: &GridBounds) -> bool {
        (1..=bounds.floors).contains(&self.floor)
            && (1..=bounds.rows).contains(&self.row)
            && (1..=bounds.columns).contains(&self.column)
    }
}

impl std::fmt::Display for GridPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "F{}/R{}/C{}", self.floor, self.row, self.column)
    }
}

/// Dimensions of a loading grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct GridBounds {
    pub floors: u32,
    pub rows: u32,
    pub columns: u32,
}

impl GridBounds {
    /// Standard grid (4 floors × 3 rows) with a request-specific column bound.
    ///
    /// The column bound is clamped to `MIN_COLUMNS..=MAX_COLUMNS`.
    #[inline]
    pub fn with_columns(columns: u32) -> Self {
        Self {
            floors: FLOORS,
            rows: ROWS,
            columns: columns.clamp(MIN_COLUMNS, MAX_COLUMNS),
        }
    }

    /// Total number of cells.
    #[inline]
    pub fn cell_count(&self) -> usize {
        (self.floors * self.rows * self.columns) as usize
    }
}

/// Packaging category of an item, derived from its length.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Long beams, bundled in tens. May rest on anything.
    Large,
    /// Short beams, bundled in twenties. Must rest on small bundles.
    Small,
}

impl Category {
    /// Classifies a length against the large-category threshold.
    ///
    /// The comparison is exact: anything below the threshold is small.
    #[inline]
    pub fn from_length(length: f64, threshold: f64) -> Self {
        if length >= threshold {
            Category::Large
        } else {
            Category::Small
        }
    }

    /// Units bundled into one package of this category.
    #[inline]
    pub const fn package_size(self) -> u64 {
        match self {
            Category::Large => LARGE_PACKAGE_SIZE,
            Category::Small => SMALL_PACKAGE_SIZE,
        }
    }

    #[inline]
    pub const fn is_large(self) -> bool {
        matches!(self, Category::Large)
    }

    /// Whether a package of this category may rest on `below`.
    ///
    /// Large bundles rest on anything; small bundles only on small ones.
    #[inline]
    pub const fn can_rest_on(self, below: Category) -> bool {
        match self {
            Category::Large => true,
            Category::Small => matches!(below, Category::Small),
        }
    }
}

/// Number of packages needed for `quantity` units at the given package size.
#[inline]
pub fn package_count(quantity: u64, package_size: u64) -> u64 {
    if package_size == 0 {
        return 0;
    }
    quantity.div_ceil(package_size)
}

/// Trait for objects with a length along the row axis.
pub trait Measured {
    /// Returns the length in meters.
    fn length(&self) -> f64;

    /// Checks whether this object fits into the remaining row capacity.
    fn fits_in(&self, remaining: f64, tolerance: f64) -> bool {
        self.length() <= remaining + tolerance
    }
}

/// Trait for objects with weight.
pub trait Weighted {
    /// Returns the weight in kg.
    fn weight(&self) -> f64;
}

/// Validation functions shared by the model types.
pub mod validation {

    /// Validates a length in meters.
    ///
    /// # Returns
    /// `Ok(())` for valid values, otherwise error text
    pub fn validate_length(value: f64, name: &str) -> Result<(), String> {
        if value.is_nan() {
            return Err(format!("{} must not be NaN", name));
        }
        if value.is_infinite() {
            return Err(format!("{} must not be infinite", name));
        }
        if value <= 0.0 {
            return Err(format!("{} must be positive, got: {}", name, value));
        }
        Ok(())
    }

    /// Validates an optional weight capacity.
    pub fn validate_capacity(value: Option<f64>, name: &str) -> Result<(), String> {
        match value {
            Some(v) if !v.is_finite() || v <= 0.0 => {
                Err(format!("{} must be positive, got: {}", name, v))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_threshold() {
        assert_eq!(Category::from_length(5.80, LARGE_LENGTH_THRESHOLD), Category::Large);
        assert_eq!(Category::from_length(12.0, LARGE_LENGTH_THRESHOLD), Category::Large);
        assert_eq!(Category::from_length(5.79, LARGE_LENGTH_THRESHOLD), Category::Small);
        assert_eq!(Category::from_length(5.7999995, LARGE_LENGTH_THRESHOLD), Category::Small);
        assert_eq!(Category::from_length(0.0, LARGE_LENGTH_THRESHOLD), Category::Small);
    }

    #[test]
    fn test_package_sizes_and_counts() {
        assert_eq!(Category::Large.package_size(), 10);
        assert_eq!(Category::Small.package_size(), 20);
        assert_eq!(package_count(25, 10), 3);
        assert_eq!(package_count(20, 20), 1);
        assert_eq!(package_count(21, 20), 2);
        assert_eq!(package_count(1, 10), 1);
        assert_eq!(package_count(u64::from(u32::MAX) + 7, 10), 429_496_731);
    }

    #[test]
    fn test_stacking_compatibility() {
        assert!(Category::Large.can_rest_on(Category::Large));
        assert!(Category::Large.can_rest_on(Category::Small));
        assert!(Category::Small.can_rest_on(Category::Small));
        assert!(!Category::Small.can_rest_on(Category::Large));
    }

    #[test]
    fn test_grid_bounds_clamp_columns() {
        assert_eq!(GridBounds::with_columns(1).columns, MIN_COLUMNS);
        assert_eq!(GridBounds::with_columns(7).columns, 7);
        assert_eq!(GridBounds::with_columns(500).columns, MAX_COLUMNS);
        assert_eq!(GridBounds::with_columns(3).cell_count(), 36);
    }

    #[test]
    fn test_position_within_bounds() {
        let bounds = GridBounds::with_columns(4);
        assert!(GridPosition::new(1, 1, 1).is_within(&bounds));
        assert!(GridPosition::new(4, 3, 4).is_within(&bounds));
        assert!(!GridPosition::new(0, 1, 1).is_within(&bounds));
        assert!(!GridPosition::new(5, 1, 1).is_within(&bounds));
        assert!(!GridPosition::new(1, 4, 1).is_within(&bounds));
        assert!(!GridPosition::new(1, 1, 5).is_within(&bounds));
    }

    #[test]
    fn test_validation_length() {
        assert!(validation::validate_length(13.6, "Length").is_ok());
        assert!(validation::validate_length(0.0, "Length").is_err());
        assert!(validation::validate_length(-1.0, "Length").is_err());
        assert!(validation::validate_length(f64::NAN, "Length").is_err());
        assert!(validation::validate_length(f64::INFINITY, "Length").is_err());
    }

    #[test]
    fn test_validation_capacity() {
        assert!(validation::validate_capacity(None, "Max weight").is_ok());
        assert!(validation::validate_capacity(Some(24000.0), "Max weight").is_ok());
        assert!(validation::validate_capacity(Some(0.0), "Max weight").is_err());
    }
}
