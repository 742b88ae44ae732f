//! Production routing provider backed by the Mapbox Directions API.

use async_trait::async_trait;
use tracing::debug;

use crate::error::EnvError;
use crate::routing::{DirectionsResponse, RouteRequest, RoutingProvider};

/// Connection settings for the directions service.
#[derive(Debug, Clone)]
pub struct MapboxConfig {
    /// Base URL (e.g. `https://api.mapbox.com`)
    pub base_url: String,
    
    pub access_token: String,
    
    /// Instruction language; overrides the language on each request when set
    pub language: Option<String>,
}

impl MapboxConfig {
    /// Load configuration from environment variables.
    ///
    /// Required variables:
    /// - `MAPBOX_ACCESS_TOKEN` -- API access token
    ///
    /// Optional variables:
    /// - `MAPBOX_BASE_URL` -- API base URL (default `https://api.mapbox.com`)
    /// - `WAYPOINT_LANGUAGE` -- instruction language (default: the request's)
    pub fn from_env() -> Result<Self, EnvError> {
        let access_token = std::env::var("MAPBOX_ACCESS_TOKEN")
            .map_err(|_| EnvError::Config("MAPBOX_ACCESS_TOKEN is not set".to_owned()))?;
        if access_token.trim().is_empty() {
            return Err(EnvError::Config("MAPBOX_ACCESS_TOKEN is empty".to_owned()));
        }
        
        let base_url = std::env::var("MAPBOX_BASE_URL")
            .unwrap_or_else(|_| "https://api.mapbox.com".to_owned());
        let language = std::env::var("WAYPOINT_LANGUAGE")
            .ok()
            .filter(|l| !l.trim().is_empty());
        
        Ok(Self {
            base_url,
            access_token,
            language,
        })
    }
}

/// Directions over HTTP via `reqwest`.
pub struct MapboxRouter {
    client: reqwest::Client,
    config: MapboxConfig,
}

impl MapboxRouter {
    pub fn new(config: MapboxConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
    
    /// Builds the request URL; coordinates go on the wire as `lng,lat`.
    pub fn directions_url(&self, request: &RouteRequest) -> String {
        let language = self.config.language.as_deref().unwrap_or(&request.language);
        format!(
            "{}/directions/v5/mapbox/{}/{},{};{},{}?alternatives=false&geometries=geojson&overview=full&steps=true&voice_instructions=true&language={}&access_token={}",
            self.config.base_url.trim_end_matches('/'),
            request.profile,
            request.origin.lng,
            request.origin.lat,
            request.destination.lng,
            request.destination.lat,
            language,
            self.config.access_token,
        )
    }
}

#[async_trait]
impl RoutingProvider for MapboxRouter {
    async fn directions(&self, request: RouteRequest) -> Result<DirectionsResponse, EnvError> {
        let url = self.directions_url(&request);
        debug!(profile = %request.profile, "requesting directions");
        
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EnvError::routing(format!("directions request failed: {e}")))?;
        
        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(EnvError::routing(format!(
                "directions returned {status}: {error_body}"
            )));
        }
        
        response
            .json::<DirectionsResponse>()
            .await
            .map_err(|e| EnvError::routing(format!("directions response parse failed: {e}")))
    }
}
