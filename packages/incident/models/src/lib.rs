#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Incident value types shared by the SaferPlace map client.
//!
//! Incidents are produced by the remote viewer service and forwarded
//! untouched to whatever renders them. The shapes here follow the
//! service's JSON encoding: camelCase field names, omitted defaults and
//! `RESOLUTION_*` enum names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Review outcome of an incident.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum Resolution {
    /// Not reviewed yet.
    #[default]
    #[serde(rename = "RESOLUTION_UNSPECIFIED")]
    Unspecified,
    /// Reviewed and shown on the map.
    #[serde(rename = "RESOLUTION_ACCEPTED")]
    Accepted,
    /// Reviewed and hidden.
    #[serde(rename = "RESOLUTION_REJECTED")]
    Rejected,
    /// Reviewed, shown, and pushed to nearby users as an alert.
    #[serde(rename = "RESOLUTION_ALERTED")]
    Alerted,
}

/// A WGS84 position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees.
    #[serde(default)]
    pub lat: f64,
    /// Longitude in degrees.
    #[serde(default)]
    pub lon: f64,
}

impl Coordinates {
    /// Creates a new position.
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// A reviewer comment attached to an incident.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Reviewer who left the comment.
    #[serde(default)]
    pub author_id: String,
    /// Comment body.
    #[serde(default)]
    pub message: String,
    /// When the comment was left.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A reported incident as returned by the viewer service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    /// Unique incident ID.
    pub id: String,
    /// When the incident was reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Free-text description from the reporter.
    #[serde(default)]
    pub description: String,
    /// Where the incident happened.
    #[serde(default)]
    pub coordinates: Coordinates,
    /// Review outcome.
    #[serde(default)]
    pub resolution: Resolution,
    /// Uploaded image, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    /// Reviewer comments, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reviewer_comments: Vec<Comment>,
}

impl Incident {
    /// Creates an incident with only the fields the map needs.
    #[must_use]
    pub fn new(id: impl Into<String>, coordinates: Coordinates, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            coordinates,
            description: description.into(),
            ..Self::default()
        }
    }

    /// Whether this incident was escalated to an alert.
    #[must_use]
    pub fn is_alerting(&self) -> bool {
        self.resolution == Resolution::Alerted
    }
}
