#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Region tiling and per-region incident caching for the map view.
//!
//! The visible map rectangle is split into fixed-size grid cells by
//! [`decompose::regions_in_bounds`]. [`loader::IncidentLoader`] fetches
//! each cell through an [`fetch::IncidentFetcher`] at most once per
//! session, keeps the results in a [`cache::RegionCache`], and merges
//! them into the list of incidents to render.

pub mod cache;
pub mod decompose;
pub mod fetch;
pub mod loader;

pub use cache::{CachePolicy, RegionCache, RegionEntry};
pub use decompose::{
    DEFAULT_CELL_SIZE, DEFAULT_REGION_LIMIT, Decomposition, decompose, regions_in_bounds,
};
pub use fetch::{FetchError, IncidentFetcher};
pub use loader::{CycleToken, IncidentLoader, LoadPhase, LoaderOptions, ViewportCycle};
