//! Events derived by the detectors and the navigation engine.
//!
//! Producers emit [`TrackerEvent`]s; the notification dispatcher turns them
//! into user-facing notifications. Producers never format text themselves.

use serde::{Deserialize, Serialize};
use waypoint_env::{ConversationId, EntityId};

use crate::model::ZoneId;

/// Why a location fix could not be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationErrorKind {
    PermissionDenied,
    Unavailable,
    Timeout,
}

/// Everything the tracker can tell the user about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrackerEvent {
    GeofenceEnter {
        entity: EntityId,
        entity_name: String,
        zone: ZoneId,
        zone_name: String,
    },
    
    GeofenceLeave {
        entity: EntityId,
        entity_name: String,
        zone: ZoneId,
        zone_name: String,
    },
    
    /// Battery crossed from above the threshold to at-or-below it
    LowBattery {
        entity: EntityId,
        entity_name: String,
        level: u8,
    },
    
    /// Remaining route shorter than the arrival threshold
    Arrival {
        target_name: String,
    },
    
    /// Attempted to navigate to the local user
    InvalidNavigationTarget,
    
    /// Routing provider failed; the session was cancelled
    NavigationFailed {
        reason: String,
    },
    
    LocationError {
        kind: LocationErrorKind,
    },
    
    MemberJoined {
        entity: EntityId,
        name: String,
    },
    
    MemberLeft {
        entity: EntityId,
        name: String,
    },
    
    ZoneAdded {
        zone: ZoneId,
        name: String,
    },
    
    ZoneUpdated {
        zone: ZoneId,
        name: String,
    },
    
    ZoneDeleted {
        zone: ZoneId,
        name: String,
    },
    
    /// A device started ringing
    FindDevice {
        entity: EntityId,
        name: String,
    },
    
    NotificationPermission {
        granted: bool,
    },
    
    /// Chat message from outside the core
    NewMessage {
        conversation: ConversationId,
        sender_name: String,
        text: String,
    },
}

impl TrackerEvent {
    /// Short machine-readable label, used in logs and exports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::GeofenceEnter { .. } => "geofence-enter",
            Self::GeofenceLeave { .. } => "geofence-leave",
            Self::LowBattery { .. } => "low-battery",
            Self::Arrival { .. } => "arrival",
            Self::InvalidNavigationTarget => "invalid-target",
            Self::NavigationFailed { .. } => "navigation-failed",
            Self::LocationError { .. } => "location-error",
            Self::MemberJoined { .. } => "member-joined",
            Self::MemberLeft { .. } => "member-left",
            Self::ZoneAdded { .. } => "zone-added",
            Self::ZoneUpdated { .. } => "zone-updated",
            Self::ZoneDeleted { .. } => "zone-deleted",
            Self::FindDevice { .. } => "find-device",
            Self::NotificationPermission { .. } => "notification-permission",
            Self::NewMessage { .. } => "new-message",
        }
    }
}
