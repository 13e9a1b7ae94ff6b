//! Splits a viewport into the grid cells that cover it.

use saferplace_region_models::{BoundingBox, Region, RegionError, round_half_up};

/// Grid cell size, in degrees, used when none is configured.
pub const DEFAULT_CELL_SIZE: f64 = 1.0;

/// Maximum number of rows or columns a viewport may span before the
/// decomposer refuses to enumerate it.
pub const DEFAULT_REGION_LIMIT: u32 = 10;

/// Largest grid index accepted; leaves headroom for the padding row and
/// column.
const MAX_GRID_INDEX: f64 = 4_611_686_018_427_387_904.0; // 2^62

/// Upper bound on the preallocated region list.
const MAX_CAPACITY_HINT: usize = 1 << 12;

/// Outcome of decomposing a viewport.
#[derive(Debug, Clone, PartialEq)]
pub enum Decomposition {
    /// The regions covering the viewport, north to south then west to
    /// east. Empty when there was no viewport.
    Regions(Vec<Region>),
    /// The viewport spans more rows or columns than allowed. Nothing is
    /// enumerated; callers should ask the user to zoom in.
    TooManyRegions {
        /// Rows spanned by the rounded viewport.
        rows: i64,
        /// Columns spanned by the rounded viewport.
        columns: i64,
        /// The limit that was exceeded.
        limit: u32,
    },
}

impl Decomposition {
    /// The regions to fetch, empty when the limit was exceeded.
    #[must_use]
    pub fn into_regions(self) -> Vec<Region> {
        match self {
            Self::Regions(regions) => regions,
            Self::TooManyRegions { .. } => Vec::new(),
        }
    }
}

/// Returns all the regions needed to show `bounds`.
///
/// An empty result means either no viewport or a viewport larger than
/// `limit` cells along some axis. Use [`decompose`] to tell them apart.
///
/// # Errors
///
/// * [`RegionError::InvalidCellSize`] if `cell_size` is not a positive
///   finite number
/// * [`RegionError::NonFiniteBounds`] if any bound is NaN or infinite
/// * [`RegionError::CellSizeTooSmall`] if a bound divided by `cell_size`
///   is beyond the range of grid indices
pub fn regions_in_bounds(
    bounds: Option<&BoundingBox>,
    cell_size: f64,
    limit: u32,
) -> Result<Vec<Region>, RegionError> {
    decompose(bounds, cell_size, limit).map(Decomposition::into_regions)
}

/// Decomposes `bounds` into grid cells of `cell_size` degrees.
///
/// Each bound is rounded to the nearest cell boundary, then the grid is
/// padded by one row to the north and one column to the west. With the
/// inclusive south and east edges this covers partially visible cells on
/// every side.
///
/// # Errors
///
/// * [`RegionError::InvalidCellSize`] if `cell_size` is not a positive
///   finite number
/// * [`RegionError::NonFiniteBounds`] if any bound is NaN or infinite
/// * [`RegionError::CellSizeTooSmall`] if a bound divided by `cell_size`
///   is beyond the range of grid indices
pub fn decompose(
    bounds: Option<&BoundingBox>,
    cell_size: f64,
    limit: u32,
) -> Result<Decomposition, RegionError> {
    if !(cell_size.is_finite() && cell_size > 0.0) {
        return Err(RegionError::InvalidCellSize { cell_size });
    }
    let Some(bounds) = bounds else {
        return Ok(Decomposition::Regions(Vec::new()));
    };
    if !bounds.is_finite() {
        return Err(RegionError::NonFiniteBounds);
    }

    let max_north = grid_index(bounds.north, cell_size)?;
    let max_south = grid_index(bounds.south, cell_size)?;
    let max_west = grid_index(bounds.west, cell_size)?;
    let max_east = grid_index(bounds.east, cell_size)?;

    log::debug!(
        "getting all regions between n:{max_north}, s:{max_south}, w:{max_west}, e:{max_east}"
    );

    let rows = max_north.saturating_sub(max_south);
    let columns = max_east.saturating_sub(max_west);
    if rows > i64::from(limit) || columns > i64::from(limit) {
        log::info!("trying to get too many regions ({rows} rows, {columns} columns, limit {limit})");
        return Ok(Decomposition::TooManyRegions {
            rows,
            columns,
            limit,
        });
    }

    let capacity = usize::try_from((rows + 2).max(0).saturating_mul((columns + 2).max(0)))
        .unwrap_or(0)
        .min(MAX_CAPACITY_HINT);
    let mut regions = Vec::with_capacity(capacity);
    for lat in (max_south..=max_north + 1).rev() {
        for lon in (max_west - 1)..=max_east {
            regions.push(Region::from_cell(lat, lon, cell_size));
        }
    }

    Ok(Decomposition::Regions(regions))
}

/// Rounds `value / cell_size` to its grid index.
#[allow(clippy::cast_possible_truncation)]
fn grid_index(value: f64, cell_size: f64) -> Result<i64, RegionError> {
    let index = round_half_up(value / cell_size);
    if index.abs() <= MAX_GRID_INDEX {
        Ok(index as i64)
    } else {
        Err(RegionError::CellSizeTooSmall { cell_size })
    }
}
