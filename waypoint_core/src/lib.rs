//! Waypoint Core - Location tracking, geofencing and turn-by-turn guidance
//!
//! This library turns raw position streams into higher-level events:
//! 1. **History Flooding**: adaptive sampling keeps fast travel and slow drift, drops GPS jitter
//! 2. **Alert Storms**: edge-triggered geofence and low-battery detection fires once per crossing
//! 3. **Stale Guidance**: request tokens drop route replies from cancelled or superseded sessions,
//!    and a spoken-instruction ledger announces every maneuver at most once

pub mod error;
pub mod events;
pub mod geo_math;
pub mod geofence;
pub mod model;
pub mod motion;
pub mod navigation;
pub mod notify;
pub mod ringer;
pub mod sampler;
pub mod store;
pub mod tracker;

// Re-export key types for convenience
pub use error::TrackerError;
pub use events::{LocationErrorKind, TrackerEvent};
pub use geo_math::{distance_meters, EARTH_RADIUS_M};
pub use geofence::{detect_transitions, VitalsConfig, VitalsDetector};
pub use model::{Entity, EntityRoster, EntitySnapshot, HistoryPoint, SafeZone, ZoneBook, ZoneId};
pub use motion::{MotionConfig, MotionSimulator, MotionStep};
pub use navigation::{
    NavState, NavigationConfig, NavigationEngine, NavigationOutput, NavigationTarget, PointOfInterest, Route,
    RouteStep, SessionOutcome,
};
pub use notify::{Notification, NotificationConfig, NotificationDispatcher, NotificationKind, ViewContext};
pub use ringer::DeviceRinger;
pub use sampler::{LocationSampler, SampleOutcome, SamplingPolicy};
pub use store::{MemoryStore, SledStore, TrackerStore};
pub use tracker::{Tracker, TrackerConfig};
