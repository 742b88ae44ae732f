//! Routing provider contract.
//!
//! The navigation engine never talks HTTP itself. It hands a [`RouteRequest`]
//! to a [`RoutingProvider`] and receives the provider's answer in its native
//! wire shape ([`DirectionsResponse`]); axis swapping and validation happen
//! in the engine.
//!
//! ```text
//! Tracker                   Provider
//!   |                          |
//!   |-- directions(req) ------>|
//!   |      (token kept local)  |-- [network / scripted] --+
//!   |<------------ response ---------------------------- -+
//!   |-- token still current? apply : discard
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EnvError;
use crate::types::Coordinate;

/// Driving profile that includes live traffic.
pub const PROFILE_DRIVING_TRAFFIC: &str = "driving-traffic";

/// A request for step-by-step directions with voice instructions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub profile: String,
    
    /// Language code for instructions and announcements
    pub language: String,
}

impl RouteRequest {
    /// Creates a driving-with-traffic request.
    pub fn driving(origin: Coordinate, destination: Coordinate, language: impl Into<String>) -> Self {
        Self {
            origin,
            destination,
            profile: PROFILE_DRIVING_TRAFFIC.to_string(),
            language: language.into(),
        }
    }
}

/// Abstraction over the external directions service.
///
/// # Implementations
///
/// - **Production**: `MapboxRouter` (HTTP)
/// - **Simulation**: `ScriptedRouter` (straight-line routes, fault injection)
#[async_trait]
pub trait RoutingProvider: Send + Sync + 'static {
    /// Fetches candidate routes for the request.
    ///
    /// # Returns
    /// * `Ok(response)` - The provider answered; it may still contain no routes
    /// * `Err(EnvError::Routing)` - Transport or provider failure
    async fn directions(&self, request: RouteRequest) -> Result<DirectionsResponse, EnvError>;
}

// ============================================================================
// WIRE FORMAT
// ============================================================================

/// Top-level directions answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectionsResponse {
    #[serde(default)]
    pub routes: Vec<DirectionsRoute>,
    
    /// Provider status code (`"Ok"`, `"NoRoute"`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One candidate route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionsRoute {
    /// Meters
    pub distance: f64,
    
    /// Seconds
    pub duration: f64,
    
    pub geometry: LineGeometry,
    
    #[serde(default)]
    pub legs: Vec<RouteLeg>,
}

/// GeoJSON line; coordinates are `[lng, lat]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineGeometry {
    #[serde(default)]
    pub coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    #[serde(default)]
    pub steps: Vec<RouteLegStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteLegStep {
    pub maneuver: Maneuver,
    
    #[serde(default)]
    pub distance: f64,
    
    #[serde(default)]
    pub duration: f64,
    
    #[serde(default, rename = "voiceInstructions")]
    pub voice_instructions: Vec<WireVoiceInstruction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Maneuver {
    pub instruction: String,
    
    /// `[lng, lat]`
    pub location: [f64; 2],
    
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireVoiceInstruction {
    #[serde(rename = "distanceAlongGeometry")]
    pub distance_along_geometry: f64,
    
    #[serde(default)]
    pub announcement: String,
    
    #[serde(default, rename = "ssmlAnnouncement", skip_serializing_if = "Option::is_none")]
    pub ssml_announcement: Option<SsmlAnnouncement>,
}

/// SSML body; providers send either a bare string or `{ "ssml": "..." }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SsmlAnnouncement {
    Text(String),
    Wrapped { ssml: String },
}

impl SsmlAnnouncement {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text(s) => s,
            Self::Wrapped { ssml } => ssml,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_parses_provider_payload() {
        let body = r#"{
            "code": "Ok",
            "routes": [{
                "distance": 1234.5,
                "duration": 300.0,
                "geometry": { "coordinates": [[-118.24, 34.05], [-118.25, 34.06]] },
                "legs": [{ "steps": [{
                    "maneuver": { "instruction": "Turn left onto Main St", "location": [-118.245, 34.055], "type": "turn", "modifier": "left" },
                    "distance": 600.0,
                    "duration": 120.0,
                    "voiceInstructions": [
                        { "distanceAlongGeometry": 40.0, "announcement": "Turn left onto Main St", "ssmlAnnouncement": "<speak>Turn left</speak>" }
                    ]
                }, {
                    "maneuver": { "instruction": "Arrive", "location": [-118.25, 34.06] },
                    "voiceInstructions": [
                        { "distanceAlongGeometry": 10.0, "announcement": "You have arrived", "ssmlAnnouncement": { "ssml": "<speak>Arrived</speak>" } }
                    ]
                }]}]
            }]
        }"#;
        
        let parsed: DirectionsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.routes.len(), 1);
        
        let steps = &parsed.routes[0].legs[0].steps;
        assert_eq!(steps[0].maneuver.kind.as_deref(), Some("turn"));
        assert_eq!(steps[0].voice_instructions[0].ssml_announcement.as_ref().unwrap().as_str(), "<speak>Turn left</speak>");
        assert_eq!(steps[1].voice_instructions[0].ssml_announcement.as_ref().unwrap().as_str(), "<speak>Arrived</speak>");
        assert_eq!(steps[1].distance, 0.0);
    }
    
    #[test]
    fn test_missing_routes_defaults_to_empty() {
        let parsed: DirectionsResponse = serde_json::from_str(r#"{"code":"NoRoute"}"#).unwrap();
        assert!(parsed.routes.is_empty());
    }
}
