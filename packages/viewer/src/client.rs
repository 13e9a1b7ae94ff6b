//! Viewer service client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use saferplace_incident_models::Incident;
use saferplace_region::{FetchError, IncidentFetcher};
use saferplace_region_models::Region;
use saferplace_viewer_models::{
    AlertWindow, ViewAlertingRequest, ViewAlertingResponse, ViewInRegionRequest,
    ViewInRegionResponse, ViewIncidentRequest, ViewIncidentResponse, ViewerMethod,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::retry::{self, RetryPolicy};
use crate::ClientError;

/// Client for the viewer service's Connect JSON endpoints.
pub struct ViewerClient {
    http: reqwest::Client,
    backend: String,
    retry: RetryPolicy,
    cell_size: f64,
}

impl ViewerClient {
    /// Builds a client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        log::debug!(
            "connecting to {}/{}",
            config.backend,
            saferplace_viewer_models::VIEWER_SERVICE
        );

        Ok(Self {
            http,
            backend: config.backend.clone(),
            retry: config.retry,
            cell_size: config.cell_size,
        })
    }

    /// Lists the incidents inside `region`, optionally only those
    /// reported after `since`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidRegion`] without sending anything if
    /// the region is not a single valid grid cell, or any transport or
    /// service error.
    pub async fn view_in_region(
        &self,
        region: &Region,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Incident>, ClientError> {
        region.validate(self.cell_size)?;

        let response: ViewInRegionResponse = self
            .call(
                ViewerMethod::ViewInRegion,
                &ViewInRegionRequest {
                    region: *region,
                    since,
                },
            )
            .await?;

        Ok(response.incidents)
    }

    /// Fetches one incident by ID.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] if the service has no such
    /// incident, or any transport or service error.
    pub async fn view_incident(&self, id: &str) -> Result<Incident, ClientError> {
        let request = ViewIncidentRequest { id: id.to_string() };
        let response: ViewIncidentResponse = match self
            .call(ViewerMethod::ViewIncident, &request)
            .await
        {
            Err(ClientError::Status { status: 404, .. }) => {
                return Err(ClientError::NotFound { id: request.id });
            }
            other => other?,
        };

        response
            .incident
            .ok_or(ClientError::NotFound { id: request.id })
    }

    /// Lists the alerting incidents inside `region`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidRegion`] if the region is not a
    /// single valid grid cell, or any transport or service error.
    pub async fn view_alerting(
        &self,
        region: &Region,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Incident>, ClientError> {
        region.validate(self.cell_size)?;

        let response: ViewAlertingResponse = self
            .call(
                ViewerMethod::ViewAlerting,
                &ViewAlertingRequest {
                    region: *region,
                    since,
                },
            )
            .await?;

        Ok(response.incidents)
    }

    /// Lists alerts raised within `window` in the grid cell around a
    /// position. Only the cell is sent, never the position itself.
    ///
    /// # Errors
    ///
    /// See [`ViewerClient::view_alerting`].
    pub async fn alerts_near(
        &self,
        lat: f64,
        lon: f64,
        window: AlertWindow,
    ) -> Result<Vec<Incident>, ClientError> {
        let region = Region::around(lat, lon, self.cell_size);
        let since = window.since(Utc::now());
        log::info!("alerts in region {region:?} since {since}");
        self.view_alerting(&region, Some(since)).await
    }

    fn url(&self, method: ViewerMethod) -> String {
        format!("{}/{}", self.backend, method.path())
    }

    async fn call<Req, Resp>(&self, method: ViewerMethod, body: &Req) -> Result<Resp, ClientError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = self.url(method);
        log::debug!("POST {url}");
        retry::send_json(|| self.http.post(&url).json(body), &self.retry).await
    }
}

#[async_trait]
impl IncidentFetcher for ViewerClient {
    async fn fetch_incidents(&self, region: &Region) -> Result<Vec<Incident>, FetchError> {
        Ok(self.view_in_region(region, None).await?)
    }
}
