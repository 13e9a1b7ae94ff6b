#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! HTTP client for the SaferPlace viewer service.
//!
//! [`client::ViewerClient`] implements
//! [`saferplace_region::IncidentFetcher`] so it can back an
//! [`saferplace_region::IncidentLoader`] directly. Connection settings
//! come from [`config::ClientConfig`].

pub mod client;
pub mod config;
pub mod retry;

pub use client::ViewerClient;
pub use config::ClientConfig;

use saferplace_region::FetchError;
use saferplace_region_models::RegionError;

/// Errors that can occur while talking to the viewer service.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The service answered with a non-success status.
    #[error("HTTP {status} ({code}): {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Connect error code, empty if the body had none.
        code: String,
        /// Error message from the service.
        message: String,
    },

    /// The region was rejected before being sent.
    #[error("invalid region: {0}")]
    InvalidRegion(#[from] RegionError),

    /// No incident exists with the requested ID.
    #[error("incident {id} not found")]
    NotFound {
        /// The ID that was looked up.
        id: String,
    },

    /// I/O error (reading the config file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML.
    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The configuration is incomplete or inconsistent.
    #[error("configuration error: {message}")]
    Config {
        /// Description of what went wrong.
        message: String,
    },
}

impl From<ClientError> for FetchError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::InvalidRegion(e) => Self::InvalidRegion(e),
            ClientError::Status { .. } | ClientError::NotFound { .. } => Self::Service {
                message: e.to_string(),
            },
            _ => Self::Transport {
                message: e.to_string(),
            },
        }
    }
}
