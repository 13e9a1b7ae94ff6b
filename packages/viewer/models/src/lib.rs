#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Request and response types for the SaferPlace viewer service.
//!
//! The service speaks the Connect protocol with JSON bodies: every call
//! is a `POST` to `/<service>/<method>` and omitted fields take their
//! default values.

use chrono::{DateTime, Duration, Utc};
use saferplace_incident_models::Incident;
use saferplace_region_models::Region;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Fully qualified name of the viewer service.
pub const VIEWER_SERVICE: &str = "viewer.v1.ViewerService";

/// How far back the service looks when a request carries no `since`.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 7;

/// Methods exposed by the viewer service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
pub enum ViewerMethod {
    /// Incidents inside one region.
    ViewInRegion,
    /// A single incident by ID.
    ViewIncident,
    /// Alerting incidents inside one region.
    ViewAlerting,
}

impl ViewerMethod {
    /// URL path of this method relative to the backend base URL.
    #[must_use]
    pub fn path(self) -> String {
        format!("{VIEWER_SERVICE}/{}", self.as_ref())
    }
}

/// Request body for [`ViewerMethod::ViewInRegion`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewInRegionRequest {
    /// The region to list.
    pub region: Region,
    /// Only incidents reported after this instant. The service defaults
    /// to the last [`DEFAULT_LOOKBACK_DAYS`] days.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
}

/// Response body for [`ViewerMethod::ViewInRegion`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewInRegionResponse {
    /// Incidents inside the region.
    #[serde(default)]
    pub incidents: Vec<Incident>,
}

/// Request body for [`ViewerMethod::ViewIncident`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewIncidentRequest {
    /// Incident ID.
    pub id: String,
}

/// Response body for [`ViewerMethod::ViewIncident`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewIncidentResponse {
    /// The incident, absent if the service returned an empty message.
    #[serde(default)]
    pub incident: Option<Incident>,
}

/// Request body for [`ViewerMethod::ViewAlerting`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewAlertingRequest {
    /// The region around the user.
    pub region: Region,
    /// Only alerts raised after this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
}

/// Response body for [`ViewerMethod::ViewAlerting`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewAlertingResponse {
    /// Alerting incidents inside the region.
    #[serde(default)]
    pub incidents: Vec<Incident>,
}

/// Error body returned by a Connect endpoint on a non-2xx status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectError {
    /// Connect error code (`not_found`, `invalid_argument`, ...).
    #[serde(default)]
    pub code: String,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

/// How far back to look for alerts near the user.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AlertWindow {
    /// The last hour.
    Hour,
    /// The last 24 hours.
    #[default]
    Day,
    /// The last 7 days.
    Week,
}

impl AlertWindow {
    /// Length of the window.
    #[must_use]
    pub const fn duration(self) -> Duration {
        match self {
            Self::Hour => Duration::hours(1),
            Self::Day => Duration::hours(24),
            Self::Week => Duration::hours(24 * 7),
        }
    }

    /// Start of the window ending at `now`.
    #[must_use]
    pub fn since(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.duration()
    }
}
