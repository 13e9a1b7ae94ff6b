//! The seam between the loader and whatever serves incidents by region.

use async_trait::async_trait;
use saferplace_incident_models::Incident;
use saferplace_region_models::{Region, RegionError};

/// Errors a fetcher can report for a single region.
///
/// The loader never propagates these; it logs them and leaves the
/// region uncached so a later viewport change retries it.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request never got a usable response (network, timeout, decode).
    #[error("transport error: {message}")]
    Transport {
        /// Description of what went wrong.
        message: String,
    },

    /// The service answered with an error.
    #[error("service error: {message}")]
    Service {
        /// Description of what went wrong.
        message: String,
    },

    /// The region was rejected before being sent.
    #[error("invalid region: {0}")]
    InvalidRegion(#[from] RegionError),
}

/// Source of incidents for a single region.
///
/// Implemented over HTTP by the viewer client, and by in-memory fakes
/// in tests.
#[async_trait]
pub trait IncidentFetcher: Send + Sync {
    /// Fetches every incident inside `region`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the incidents could not be retrieved.
    async fn fetch_incidents(&self, region: &Region) -> Result<Vec<Incident>, FetchError>;
}
