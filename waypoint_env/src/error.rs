//! Error types for the Waypoint environment abstraction.

use thiserror::Error;

/// Errors that can occur talking to the environment or an external collaborator.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Routing provider failed (transport error, bad status, empty answer)
    #[error("Routing error: {0}")]
    Routing(String),
    
    /// Coordinate outside the valid latitude/longitude ranges
    #[error("Invalid coordinate: ({lat}, {lng})")]
    InvalidCoordinate { lat: f64, lng: f64 },
    
    /// Key-value store read/write failed
    #[error("Storage error: {0}")]
    Storage(String),
    
    /// Payload serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),
    
    /// Missing or malformed configuration
    #[error("Configuration error: {0}")]
    Config(String),

}

impl EnvError {
    /// Creates a routing error.
    pub fn routing(msg: impl Into<String>) -> Self {
        Self::Routing(msg.into())
    }
    
    /// Creates a storage error.
    pub fn storage(msg: impl std::fmt::Display) -> Self {
        Self::Storage(msg.to_string())
    }
}

impl From<serde_json::Error> for EnvError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
