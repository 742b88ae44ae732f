//! Error types for the tracker core.

use thiserror::Error;
use waypoint_env::{EntityId, EnvError};

use crate::model::ZoneId;

/// Errors surfaced by tracker operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Navigation target is the local user
    #[error("Invalid navigation target: cannot navigate to your own location")]
    InvalidTarget,
    
    #[error("Unknown entity: {0}")]
    UnknownEntity(EntityId),
    
    #[error("Unknown safe zone: {0}")]
    UnknownZone(ZoneId),
    
    /// No local entity on the roster yet
    #[error("No local entity is being tracked")]
    NoLocalEntity,
    
    /// Another device is already ringing
    #[error("Device {0} is already ringing")]
    AlreadyRinging(EntityId),
    
    /// Provider answered but the payload is unusable
    #[error("Malformed route: {0}")]
    MalformedRoute(String),
    
    #[error("Storage error: {0}")]
    Storage(String),
    
    #[error(transparent)]
    Env(#[from] EnvError),
}

impl From<sled::Error> for TrackerError {
    fn from(err: sled::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("encoding failed: {err}"))
    }
}
