//! Waypoint Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing the Waypoint engines
//! to run both on a **Device** (tokio, real clock, HTTP routing) and in
//! **Simulation** (virtual clock, seeded randomness, scripted routing).
//!
//! # Core Concept: The Reactor Pattern
//!
//! For Deterministic Simulation Testing (DST), we intercept every input the
//! engines cannot control:
//! - Time (`now()`, `system_time()`, `sleep()`)
//! - Randomness (`random_u64()`, `random_unit()`)
//! - External collaborators (routing, speech, notifications, storage)
//!
//! By deriving all entropy from a single 64-bit seed, any bug becomes
//! reproducible via its seed number.
//!
//! # Example
//!
//! ```ignore
//! use waypoint_env::{WaypointContext, RoutingProvider};
//!
//! async fn tracker_loop<Ctx: WaypointContext>(ctx: &Ctx) {
//!     loop {
//!         tokio::select! {
//!             fix = positions.recv() => on_fix(fix),
//!             _ = ctx.sleep(Duration::from_secs(5)) => simulate(),
//!         }
//!     }
//! }
//! ```

mod context;
mod error;
mod mapbox;
mod routing;
mod sinks;
mod store;
mod tokio_impl;
mod types;

pub use context::{ContextRng, WaypointContext};
pub use error::EnvError;
pub use mapbox::{MapboxConfig, MapboxRouter};
pub use routing::{
    DirectionsResponse, DirectionsRoute, LineGeometry, Maneuver, RouteLeg, RouteLegStep,
    RouteRequest, RoutingProvider, SsmlAnnouncement, WireVoiceInstruction,
    PROFILE_DRIVING_TRAFFIC,
};
pub use sinks::{NotificationSink, SpeechSink};
pub use store::KeyValueStore;
pub use tokio_impl::TokioContext;
pub use types::{ClickAction, Coordinate, ConversationId, EntityId, SystemNotification, Timestamp};
