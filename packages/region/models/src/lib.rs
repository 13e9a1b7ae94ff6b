#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Bounding box and region grid types.
//!
//! A [`BoundingBox`] is whatever rectangle the map happens to show. A
//! [`Region`] is one cell of a fixed lat/lon grid and is the unit that
//! incidents are fetched and cached by. Regions compare by exact bound
//! values; [`RegionKey`] gives them a hashable identity.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Largest valid absolute latitude.
pub const MAX_LATITUDE: f64 = 90.0;

/// Largest valid absolute longitude.
pub const MAX_LONGITUDE: f64 = 180.0;

/// Errors produced while decomposing or validating regions.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegionError {
    /// Grid cell size was zero, negative or not finite.
    #[error("invalid cell size {cell_size}: must be a positive finite number")]
    InvalidCellSize {
        /// The rejected cell size.
        cell_size: f64,
    },

    /// One of the bounds was NaN or infinite.
    #[error("bounds must be finite")]
    NonFiniteBounds,

    /// A bound lies outside the valid range of Earth coordinates.
    #[error("{direction} ({value:.4}): not a valid earth coordinate")]
    OutOfBounds {
        /// Which bound failed.
        direction: &'static str,
        /// The offending value.
        value: f64,
    },

    /// Opposite bounds are in the wrong order.
    #[error("{direction} ({value:.4}): invalid bounds")]
    InvalidBounds {
        /// Which pair of bounds failed.
        direction: &'static str,
        /// The (negative) span between them.
        value: f64,
    },

    /// The region spans more than one grid cell.
    #[error("{direction} ({value:.4}): region is too big")]
    TooBig {
        /// Which axis is too wide.
        direction: &'static str,
        /// The span along that axis.
        value: f64,
    },

    /// The cell size is so small that the grid indices of the bounds do
    /// not fit in an `i64`.
    #[error("cell size {cell_size} is too small for these bounds")]
    CellSizeTooSmall {
        /// The rejected cell size.
        cell_size: f64,
    },
}

/// A geographic bounding box in WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western longitude boundary.
    pub west: f64,
    /// Southern latitude boundary.
    pub south: f64,
    /// Eastern longitude boundary.
    pub east: f64,
    /// Northern latitude boundary.
    pub north: f64,
}

impl BoundingBox {
    /// Creates a new bounding box from the given coordinates.
    #[must_use]
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Whether all four bounds are finite numbers.
    #[must_use]
    pub const fn is_finite(&self) -> bool {
        self.west.is_finite()
            && self.south.is_finite()
            && self.east.is_finite()
            && self.north.is_finite()
    }

    /// Returns `true` if `other` lies entirely within this box.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.west <= other.west
            && self.east >= other.east
            && self.south <= other.south
            && self.north >= other.north
    }
}

/// Parses `"west,south,east,north"`.
impl FromStr for BoundingBox {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<f64>().map_err(|e| format!("{p:?}: {e}")))
            .collect::<Result<Vec<_>, _>>()?;

        match parts.as_slice() {
            [west, south, east, north] => Ok(Self::new(*west, *south, *east, *north)),
            _ => Err(format!(
                "expected 4 comma-separated values (west,south,east,north), got {}",
                parts.len()
            )),
        }
    }
}

/// One cell of the region grid.
///
/// Equality is exact on all four bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Northern latitude boundary.
    pub north: f64,
    /// Southern latitude boundary.
    pub south: f64,
    /// Eastern longitude boundary.
    pub east: f64,
    /// Western longitude boundary.
    pub west: f64,
}

impl Region {
    /// Creates a new region.
    #[must_use]
    pub const fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    /// Builds the grid cell whose north-west corner sits at row `lat`,
    /// column `lon`, for cells of `cell_size` degrees.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_cell(lat: i64, lon: i64, cell_size: f64) -> Self {
        Self {
            north: lat as f64 * cell_size,
            south: (lat - 1) as f64 * cell_size,
            west: lon as f64 * cell_size,
            east: (lon + 1) as f64 * cell_size,
        }
    }

    /// The single grid cell around a position.
    ///
    /// Rounds the position to the nearest grid corner and takes the cell
    /// to its south-west, which is how nearby alerts are looked up.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn around(lat: f64, lon: f64, cell_size: f64) -> Self {
        let row = round_half_up(lat / cell_size) as i64;
        let col = round_half_up(lon / cell_size) as i64;
        Self::from_cell(row, col - 1, cell_size)
    }

    /// Hashable identity of this region.
    #[must_use]
    pub fn key(&self) -> RegionKey {
        RegionKey([
            normalized_bits(self.north),
            normalized_bits(self.south),
            normalized_bits(self.east),
            normalized_bits(self.west),
        ])
    }

    /// This region as a bounding box.
    #[must_use]
    pub const fn bounds(&self) -> BoundingBox {
        BoundingBox::new(self.west, self.south, self.east, self.north)
    }

    /// Whether a position falls inside this region (edges inclusive).
    #[must_use]
    pub fn contains_point(&self, lat: f64, lon: f64) -> bool {
        (self.south..=self.north).contains(&lat) && (self.west..=self.east).contains(&lon)
    }

    /// Checks the region is on Earth, correctly ordered, and at most one
    /// cell of `cell_size` degrees along each axis.
    ///
    /// Up to a tenth of a cell of slack is allowed on the size check so
    /// that floating point drift in `lat * cell_size` does not reject
    /// regions built by [`Region::from_cell`].
    ///
    /// # Errors
    ///
    /// Returns the first [`RegionError`] found.
    pub fn validate(&self, cell_size: f64) -> Result<(), RegionError> {
        if !self.bounds().is_finite() {
            return Err(RegionError::NonFiniteBounds);
        }
        check_range("north", self.north, MAX_LATITUDE)?;
        check_range("south", self.south, MAX_LATITUDE)?;
        if self.north < self.south {
            return Err(RegionError::InvalidBounds {
                direction: "north-south",
                value: self.north - self.south,
            });
        }

        check_range("east", self.east, MAX_LONGITUDE)?;
        check_range("west", self.west, MAX_LONGITUDE)?;
        if self.east < self.west {
            return Err(RegionError::InvalidBounds {
                direction: "east-west",
                value: self.east - self.west,
            });
        }

        let max_span = cell_size * 1.1;
        let lat_span = self.north - self.south;
        if lat_span > max_span {
            return Err(RegionError::TooBig {
                direction: "north-south",
                value: lat_span,
            });
        }
        let lon_span = self.east - self.west;
        if lon_span > max_span {
            return Err(RegionError::TooBig {
                direction: "east-west",
                value: lon_span,
            });
        }

        Ok(())
    }
}

/// Hashable identity of a [`Region`].
///
/// Built from the raw bits of each bound with `-0.0` folded into `0.0`,
/// so two keys are equal exactly when the regions compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionKey([u64; 4]);

/// Rounds to the nearest integer with halves going toward +∞, the way
/// the viewer's web client rounds.
///
/// `f64::round` sends halves away from zero, which would shift negative
/// longitudes by a whole cell. `(value + 0.5).floor()` is not used
/// either: the addition itself rounds, so `0.49999999999999994` would
/// come out as `1`.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn round_half_up(value: f64) -> f64 {
    let rounded = value.round();
    // exact whenever the fractional part is one half
    if value - rounded == 0.5 {
        rounded + 1.0
    } else {
        rounded
    }
}

fn normalized_bits(value: f64) -> u64 {
    (value + 0.0).to_bits()
}

fn check_range(direction: &'static str, value: f64, max: f64) -> Result<(), RegionError> {
    if (-max..=max).contains(&value) {
        Ok(())
    } else {
        Err(RegionError::OutOfBounds { direction, value })
    }
}
