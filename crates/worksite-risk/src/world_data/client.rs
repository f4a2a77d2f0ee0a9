use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use super::{WorldDataClient, WorldDataError, WorldDataQuery, WorldDataResponse, WorldDataSource};
use crate::config::WorldDataConfig;

#[derive(Serialize)]
struct WirePoint {
    lat: f64,
    lon: f64,
}

#[derive(Serialize)]
struct WireQuery<'a> {
    point: WirePoint,
    date: NaiveDate,
    sources: &'a [WorldDataSource],
}

impl<'a> From<&'a WorldDataQuery> for WireQuery<'a> {
    fn from(query: &'a WorldDataQuery) -> Self {
        Self {
            point: WirePoint {
                lat: query.point.latitude,
                lon: query.point.longitude,
            },
            date: query.date,
            sources: &query.sources,
        }
    }
}

/// `reqwest`-backed client; the configured timeout bounds the whole request.
#[derive(Debug, Clone)]
pub struct HttpWorldDataClient {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpWorldDataClient {
    pub fn new(config: &WorldDataConfig) -> Result<Self, WorldDataError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("worksite-risk/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| WorldDataError::Unavailable(err.to_string()))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
        })
    }

    fn map_transport(err: reqwest::Error) -> WorldDataError {
        if err.is_timeout() {
            WorldDataError::Timeout
        } else if err.is_decode() {
            WorldDataError::Decode(err.to_string())
        } else {
            WorldDataError::Unavailable(err.to_string())
        }
    }
}

#[async_trait]
impl WorldDataClient for HttpWorldDataClient {
    async fn location_bulk(
        &self,
        queries: &[WorldDataQuery],
    ) -> Result<BTreeMap<usize, WorldDataResponse>, WorldDataError> {
        if queries.is_empty() {
            return Ok(BTreeMap::new());
        }

        let payload: Vec<WireQuery<'_>> = queries.iter().map(WireQuery::from).collect();
        debug!(queries = payload.len(), endpoint = %self.endpoint, "requesting world data");

        let response = self
            .http
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(Self::map_transport)?
            .error_for_status()
            .map_err(Self::map_transport)?;

        let body: Vec<WorldDataResponse> = response.json().await.map_err(Self::map_transport)?;
        if body.len() != queries.len() {
            warn!(
                expected = queries.len(),
                found = body.len(),
                "world data response count mismatch"
            );
            return Err(WorldDataError::ResponseMismatch {
                expected: queries.len(),
                found: body.len(),
            });
        }

        Ok(body.into_iter().enumerate().collect())
    }
}
