//! The "NAVIGATION" Engine - turn-by-turn guidance toward one target.
//!
//! State machine:
//!
//! ```text
//!            start(target)           route ok (>= 30 m)
//!   Idle ─────────────────► Requesting ───────────────► Active
//!    ▲                          │  │                      │ │
//!    │     cancel / failure     │  │ route < 30 m         │ │ route < 30 m
//!    └──────────────────────────┘  └──────► Arrived ◄─────┘ │
//!    ▲                                        │             │ cancel / failure
//!    └────────────────────────────────────────┴─────────────┘
//! ```
//!
//! Terminal states (`Arrived`, `Cancelled`, `Failed`) are reported through
//! [`NavigationEngine::last_outcome`]; the engine itself is back in `Idle`
//! as soon as it reaches one.
//!
//! The engine is Sans-IO. It hands out [`PendingRoute`]s tagged with a
//! [`RequestToken`] and later accepts the reply together with that token.
//! A reply whose token belongs to a cancelled or replaced session, or that
//! is older than a reply already applied, is dropped. Cancellation therefore
//! never needs to abort an in-flight request.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};
use waypoint_env::{Coordinate, DirectionsResponse, EntityId, EnvError, RouteRequest};

use crate::error::TrackerError;
use crate::events::TrackerEvent;
use crate::geo_math::distance_meters;
use crate::model::Entity;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct NavigationConfig {
    /// Remaining route shorter than this counts as arrival (default: 30 m)
    pub arrival_threshold_m: f64,
    
    /// Announce a step once within this distance of its maneuver (default: 50 m)
    pub voice_trigger_m: f64,
    
    /// Language for instructions (default: "en")
    pub language: String,
    
    /// Spoken on arrival
    pub arrival_announcement: String,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            arrival_threshold_m: 30.0,
            voice_trigger_m: 50.0,
            language: "en".to_string(),
            arrival_announcement: "You have arrived at your destination.".to_string(),
        }
    }
}

// ============================================================================
// TARGETS & ROUTES
// ============================================================================

/// A named point of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointOfInterest {
    pub id: String,
    pub name: String,
    pub coord: Coordinate,
}

/// Where the session is heading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NavigationTarget {
    Entity {
        id: EntityId,
        name: String,
        coord: Coordinate,
        is_local: bool,
    },
    Poi(PointOfInterest),
}

impl NavigationTarget {
    pub fn entity(entity: &Entity) -> Self {
        Self::Entity {
            id: entity.id,
            name: entity.name.clone(),
            coord: entity.coord,
            is_local: entity.is_local,
        }
    }
    
    pub fn name(&self) -> &str {
        match self {
            Self::Entity { name, .. } => name,
            Self::Poi(poi) => &poi.name,
        }
    }
    
    pub fn coord(&self) -> Coordinate {
        match self {
            Self::Entity { coord, .. } => *coord,
            Self::Poi(poi) => poi.coord,
        }
    }
    
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Entity { is_local: true, .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceInstruction {
    /// Meters along the step geometry at which the provider suggests speaking
    pub distance_along_geometry: f64,
    pub announcement: String,
    pub ssml: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    pub instruction: String,
    
    /// Maneuver location, already in (lat, lng)
    pub location: Coordinate,
    
    pub maneuver_kind: Option<String>,
    pub modifier: Option<String>,
    
    /// Meters
    pub distance: f64,
    
    /// Seconds
    pub duration: f64,
    
    pub voice_instructions: Vec<VoiceInstruction>,
}

impl RouteStep {
    /// First voice instruction with a non-empty announcement.
    pub fn announcement(&self) -> Option<&str> {
        self.voice_instructions
            .iter()
            .map(|v| v.announcement.as_str())
            .find(|a| !a.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Display polyline in (lat, lng)
    pub path: Vec<Coordinate>,
    
    /// Meters
    pub distance: f64,
    
    /// Seconds
    pub duration: f64,
    
    pub steps: Vec<RouteStep>,
}

impl Route {
    /// Converts the provider answer, taking the first candidate route and
    /// swapping the provider's `[lng, lat]` pairs.
    pub fn from_directions(response: DirectionsResponse) -> Result<Self, TrackerError> {
        let route = response.routes.into_iter().next().ok_or_else(|| {
            let code = response.code.unwrap_or_else(|| "no routes".to_string());
            TrackerError::MalformedRoute(match response.message {
                Some(msg) => format!("{code}: {msg}"),
                None => code,
            })
        })?;
        
        if !route.distance.is_finite() || route.distance < 0.0 {
            return Err(TrackerError::MalformedRoute(format!("distance {}", route.distance)));
        }
        
        let steps = route
            .legs
            .into_iter()
            .next()
            .map(|leg| leg.steps)
            .unwrap_or_default()
            .into_iter()
            .map(|step| RouteStep {
                instruction: step.maneuver.instruction,
                location: Coordinate::from_lng_lat(step.maneuver.location),
                maneuver_kind: step.maneuver.kind,
                modifier: step.maneuver.modifier,
                distance: step.distance,
                duration: step.duration,
                voice_instructions: step
                    .voice_instructions
                    .into_iter()
                    .map(|v| VoiceInstruction {
                        distance_along_geometry: v.distance_along_geometry,
                        announcement: v.announcement,
                        ssml: v.ssml_announcement.map(|s| s.as_str().to_string()),
                    })
                    .collect(),
            })
            .collect();
        
        Ok(Self {
            path: route.geometry.coordinates.into_iter().map(Coordinate::from_lng_lat).collect(),
            distance: route.distance,
            duration: route.duration,
            steps,
        })
    }
}

// ============================================================================
// SESSION STATE
// ============================================================================

/// Tag carried by every route request.
///
/// `session` changes on every start/cancel; `seq` increases with every
/// request inside a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestToken {
    pub session: u64,
    pub seq: u64,
}

/// A route request the caller must execute and report back.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRoute {
    pub token: RequestToken,
    pub request: RouteRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavState {
    Idle,
    Requesting,
    Active,
}

/// How the last session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionOutcome {
    Arrived,
    Cancelled,
    Failed,
}

/// Side effects the caller must perform, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum NavigationOutput {
    Speak(String),
    StopSpeech,
    Event(TrackerEvent),
}

/// Spoken-instruction ledger key.
///
/// Keyed by index and text so a re-fetched route that repeats identical
/// wording at a different index is still announced.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct InstructionKey {
    step_index: usize,
    instruction: String,
}

#[derive(Debug, Clone)]
struct Session {
    target: NavigationTarget,
    state: NavState,
    route: Option<Route>,
    step_index: usize,
    spoken: HashSet<InstructionKey>,
    token_session: u64,
    issued_seq: u64,
    applied_seq: u64,
}

/// Coordinates route requests, progress and voice output for one target.
#[derive(Debug, Clone, Default)]
pub struct NavigationEngine {
    config: NavigationConfig,
    session: Option<Session>,
    
    /// Monotonic; bumped on every start and cancel
    session_counter: u64,
    
    last_outcome: Option<SessionOutcome>,
}

impl NavigationEngine {
    pub fn new(config: NavigationConfig) -> Self {
        Self {
            config,
            session: None,
            session_counter: 0,
            last_outcome: None,
        }
    }
    
    pub fn config(&self) -> &NavigationConfig {
        &self.config
    }
    
    /// Starts guiding toward `target`, replacing any running session.
    ///
    /// # Errors
    /// [`TrackerError::InvalidTarget`] if the target is the local user;
    /// the engine is left untouched in that case.
    pub fn start(&mut self, target: NavigationTarget) -> Result<Vec<NavigationOutput>, TrackerError> {
        if target.is_local() {
            warn!("refusing to navigate to the local user");
            return Err(TrackerError::InvalidTarget);
        }
        
        let mut outputs = Vec::new();
        if self.session.is_some() {
            self.last_outcome = Some(SessionOutcome::Cancelled);
            outputs.push(NavigationOutput::StopSpeech);
        }
        
        self.session_counter += 1;
        info!(destination = target.name(), session = self.session_counter, "navigation started");
        self.session = Some(Session {
            target,
            state: NavState::Requesting,
            route: None,
            step_index: 0,
            spoken: HashSet::new(),
            token_session: self.session_counter,
            issued_seq: 0,
            applied_seq: 0,
        });
        
        Ok(outputs)
    }
    
    /// Ends the session and invalidates every outstanding request.
    ///
    /// A no-op while idle.
    pub fn cancel(&mut self) -> Vec<NavigationOutput> {
        if self.session.take().is_none() {
            return Vec::new();
        }
        self.session_counter += 1;
        self.last_outcome = Some(SessionOutcome::Cancelled);
        info!("navigation cancelled");
        vec![NavigationOutput::StopSpeech]
    }
    
    /// Issues a route request from `origin` when a session is running.
    pub fn request_route(&mut self, origin: Coordinate) -> Option<PendingRoute> {
        let language = self.config.language.clone();
        let session = self.session.as_mut()?;
        
        session.issued_seq += 1;
        let token = RequestToken {
            session: session.token_session,
            seq: session.issued_seq,
        };
        debug!(session = token.session, seq = token.seq, "route requested");
        
        Some(PendingRoute {
            token,
            request: RouteRequest::driving(origin, session.target.coord(), language),
        })
    }
    
    /// Keeps an entity target's destination in step with its live position.
    pub fn retarget(&mut self, id: &EntityId, coord: Coordinate) {
        if let Some(Session {
            target: NavigationTarget::Entity { id: target_id, coord: target_coord, .. },
            ..
        }) = self.session.as_mut()
        {
            if *target_id == *id {
                *target_coord = coord;
            }
        }
    }
    
    /// True if a reply with this token would still be applied.
    pub fn is_current(&self, token: RequestToken) -> bool {
        self.session.as_ref().is_some_and(|s| {
            s.token_session == token.session && token.seq > s.applied_seq && token.seq <= s.issued_seq
        })
    }
    
    /// Applies a provider reply.
    pub fn apply_response(
        &mut self,
        token: RequestToken,
        reply: Result<DirectionsResponse, EnvError>,
    ) -> Vec<NavigationOutput> {
        if !self.is_current(token) {
            debug!(session = token.session, seq = token.seq, "stale route reply discarded");
            return Vec::new();
        }
        
        let route = match reply.map_err(TrackerError::from).and_then(Route::from_directions) {
            Ok(route) => route,
            Err(err) => return self.fail(err.to_string()),
        };
        
        if route.distance < self.config.arrival_threshold_m {
            return self.arrive();
        }
        
        if let Some(session) = self.session.as_mut() {
            debug!(distance = route.distance, steps = route.steps.len(), "route applied");
            session.applied_seq = token.seq;
            session.route = Some(route);
            session.state = NavState::Active;
        }
        Vec::new()
    }
    
    /// Announces the next unspoken step if `position` is close enough to it.
    ///
    /// Scans forward from the current step past every step already spoken;
    /// returns the announcement text and records it in the ledger. Each
    /// (step, instruction) pair is returned at most once per session.
    pub fn dispatch_voice(&mut self, position: Coordinate) -> Option<String> {
        let trigger = self.config.voice_trigger_m;
        let session = self.session.as_mut()?;
        if session.state != NavState::Active {
            return None;
        }
        let route = session.route.as_ref()?;
        
        let mut index = session.step_index;
        let key = loop {
            let step = route.steps.get(index)?;
            let key = InstructionKey {
                step_index: index,
                instruction: step.instruction.clone(),
            };
            if !session.spoken.contains(&key) {
                break key;
            }
            index += 1;
        };
        
        let step = &route.steps[index];
        if distance_meters(position, step.location) >= trigger {
            return None;
        }
        let text = step.announcement()?.to_string();
        
        debug!(step = index, "voice instruction");
        session.spoken.insert(key);
        session.step_index = index;
        Some(text)
    }
    
    fn arrive(&mut self) -> Vec<NavigationOutput> {
        let target_name = self
            .session
            .take()
            .map(|s| s.target.name().to_string())
            .unwrap_or_default();
        self.session_counter += 1;
        self.last_outcome = Some(SessionOutcome::Arrived);
        info!(destination = %target_name, "arrived");
        
        vec![
            NavigationOutput::Event(TrackerEvent::Arrival { target_name }),
            NavigationOutput::Speak(self.config.arrival_announcement.clone()),
        ]
    }
    
    fn fail(&mut self, reason: String) -> Vec<NavigationOutput> {
        self.session = None;
        self.session_counter += 1;
        self.last_outcome = Some(SessionOutcome::Failed);
        warn!(%reason, "navigation failed");
        
        vec![
            NavigationOutput::Event(TrackerEvent::NavigationFailed { reason }),
            NavigationOutput::StopSpeech,
        ]
    }
    
    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------
    
    pub fn state(&self) -> NavState {
        self.session.as_ref().map_or(NavState::Idle, |s| s.state)
    }
    
    pub fn target(&self) -> Option<&NavigationTarget> {
        self.session.as_ref().map(|s| &s.target)
    }
    
    pub fn route(&self) -> Option<&Route> {
        self.session.as_ref().and_then(|s| s.route.as_ref())
    }
    
    pub fn step_index(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.step_index)
    }
    
    pub fn spoken_count(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.spoken.len())
    }
    
    pub fn last_outcome(&self) -> Option<SessionOutcome> {
        self.last_outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_math::offset_north;
    use waypoint_env::{DirectionsRoute, LineGeometry, Maneuver, RouteLeg, RouteLegStep, WireVoiceInstruction};
    
    fn origin() -> Coordinate {
        Coordinate::new(34.0522, -118.2437)
    }
    
    fn poi() -> NavigationTarget {
        NavigationTarget::Poi(PointOfInterest {
            id: "poi-1".into(),
            name: "Grand Park".into(),
            coord: offset_north(origin(), 3_000.0),
        })
    }
    
    fn wire_step(instruction: &str, at: Coordinate, announcement: &str) -> RouteLegStep {
        RouteLegStep {
            maneuver: Maneuver {
                instruction: instruction.into(),
                location: [at.lng, at.lat],
                kind: Some("turn".into()),
                modifier: None,
            },
            distance: 1_000.0,
            duration: 60.0,
            voice_instructions: vec![WireVoiceInstruction {
                distance_along_geometry: 40.0,
                announcement: announcement.into(),
                ssml_announcement: None,
            }],
        }
    }
    
    /// Three steps at 1, 2 and 3 km north of the origin.
    fn three_step_reply(distance: f64) -> DirectionsResponse {
        let steps = (1..=3)
            .map(|i| {
                let at = offset_north(origin(), 1_000.0 * i as f64);
                wire_step(&format!("Step {i}"), at, &format!("In 50 meters, step {i}"))
            })
            .collect();
        DirectionsResponse {
            routes: vec![DirectionsRoute {
                distance,
                duration: 600.0,
                geometry: LineGeometry {
                    coordinates: vec![[origin().lng, origin().lat]],
                },
                legs: vec![RouteLeg { steps }],
            }],
            code: Some("Ok".into()),
            message: None,
        }
    }
    
    fn active_engine() -> NavigationEngine {
        let mut engine = NavigationEngine::default();
        engine.start(poi()).unwrap();
        let pending = engine.request_route(origin()).unwrap();
        assert!(engine.apply_response(pending.token, Ok(three_step_reply(3_000.0))).is_empty());
        assert_eq!(engine.state(), NavState::Active);
        engine
    }
    
    #[test]
    fn test_local_target_rejected() {
        let mut engine = NavigationEngine::default();
        let me = Entity::new(EntityId::from_seed(1), "Me", origin(), 90).local();
        
        let result = engine.start(NavigationTarget::entity(&me));
        
        assert!(matches!(result, Err(TrackerError::InvalidTarget)));
        assert_eq!(engine.state(), NavState::Idle);
        assert!(engine.request_route(origin()).is_none());
    }
    
    #[test]
    fn test_route_converts_axis_order() {
        let route = Route::from_directions(three_step_reply(3_000.0)).unwrap();
        assert_eq!(route.path[0], origin());
        assert!((route.steps[0].location.lat - offset_north(origin(), 1_000.0).lat).abs() < 1e-12);
        assert_eq!(route.steps[0].announcement(), Some("In 50 meters, step 1"));
    }
    
    #[test]
    fn test_empty_route_list_is_malformed() {
        let result = Route::from_directions(DirectionsResponse {
            routes: vec![],
            code: Some("NoRoute".into()),
            message: Some("No route found".into()),
        });
        assert!(matches!(result, Err(TrackerError::MalformedRoute(msg)) if msg == "NoRoute: No route found"));
    }
    
    #[test]
    fn test_short_route_is_arrival() {
        let mut engine = NavigationEngine::default();
        engine.start(poi()).unwrap();
        let pending = engine.request_route(origin()).unwrap();
        
        let outputs = engine.apply_response(pending.token, Ok(three_step_reply(25.0)));
        
        let arrivals = outputs
            .iter()
            .filter(|o| matches!(o, NavigationOutput::Event(TrackerEvent::Arrival { .. })))
            .count();
        assert_eq!(arrivals, 1);
        assert!(outputs.contains(&NavigationOutput::Speak("You have arrived at your destination.".into())));
        assert_eq!(engine.state(), NavState::Idle);
        assert!(engine.route().is_none());
        assert!(engine.target().is_none());
        assert_eq!(engine.last_outcome(), Some(SessionOutcome::Arrived));
    }
    
    #[test]
    fn test_provider_failure_clears_session() {
        let mut engine = NavigationEngine::default();
        engine.start(poi()).unwrap();
        let pending = engine.request_route(origin()).unwrap();
        
        let outputs = engine.apply_response(pending.token, Err(EnvError::routing("offline")));
        
        assert!(matches!(&outputs[0], NavigationOutput::Event(TrackerEvent::NavigationFailed { .. })));
        assert_eq!(engine.state(), NavState::Idle);
        assert_eq!(engine.last_outcome(), Some(SessionOutcome::Failed));
    }
    
    #[test]
    fn test_voice_silent_while_far_then_once_when_near() {
        let mut engine = active_engine();
        
        for _ in 0..10 {
            assert_eq!(engine.dispatch_voice(origin()), None);
        }
        
        let near_step0 = offset_north(origin(), 980.0);
        assert_eq!(engine.dispatch_voice(near_step0), Some("In 50 meters, step 1".into()));
        assert_eq!(engine.dispatch_voice(near_step0), None);
        assert_eq!(engine.spoken_count(), 1);
        assert_eq!(engine.step_index(), 0);
    }
    
    #[test]
    fn test_voice_advances_monotonically() {
        let mut engine = active_engine();
        
        engine.dispatch_voice(offset_north(origin(), 1_000.0)).unwrap();
        let text = engine.dispatch_voice(offset_north(origin(), 2_010.0));
        
        assert_eq!(text.as_deref(), Some("In 50 meters, step 2"));
        assert_eq!(engine.step_index(), 1);
        // Back near step 0: already spoken, scan starts at step 1
        assert_eq!(engine.dispatch_voice(offset_north(origin(), 1_000.0)), None);
    }
    
    #[test]
    fn test_step_without_announcement_is_not_marked() {
        let mut reply = three_step_reply(3_000.0);
        reply.routes[0].legs[0].steps[0].voice_instructions[0].announcement = String::new();
        
        let mut engine = NavigationEngine::default();
        engine.start(poi()).unwrap();
        let pending = engine.request_route(origin()).unwrap();
        engine.apply_response(pending.token, Ok(reply));
        
        assert_eq!(engine.dispatch_voice(offset_north(origin(), 1_000.0)), None);
        assert_eq!(engine.spoken_count(), 0);
    }
    
    #[test]
    fn test_refetch_keeps_spoken_ledger() {
        let mut engine = active_engine();
        let near_step0 = offset_north(origin(), 1_000.0);
        engine.dispatch_voice(near_step0).unwrap();
        
        let pending = engine.request_route(near_step0).unwrap();
        engine.apply_response(pending.token, Ok(three_step_reply(2_000.0)));
        
        assert_eq!(engine.dispatch_voice(near_step0), None);
        assert_eq!(engine.spoken_count(), 1);
    }
    
    #[test]
    fn test_cancel_then_late_reply_is_ignored() {
        let mut engine = NavigationEngine::default();
        engine.start(poi()).unwrap();
        let pending = engine.request_route(origin()).unwrap();
        
        assert_eq!(engine.cancel(), vec![NavigationOutput::StopSpeech]);
        let outputs = engine.apply_response(pending.token, Ok(three_step_reply(3_000.0)));
        
        assert!(outputs.is_empty());
        assert_eq!(engine.state(), NavState::Idle);
        assert!(engine.route().is_none());
        assert_eq!(engine.step_index(), 0);
        assert_eq!(engine.last_outcome(), Some(SessionOutcome::Cancelled));
    }
    
    #[test]
    fn test_restart_invalidates_previous_session_reply() {
        let mut engine = NavigationEngine::default();
        engine.start(poi()).unwrap();
        let old = engine.request_route(origin()).unwrap();
        
        let outputs = engine.start(poi()).unwrap();
        assert_eq!(outputs, vec![NavigationOutput::StopSpeech]);
        
        engine.apply_response(old.token, Ok(three_step_reply(3_000.0)));
        assert_eq!(engine.state(), NavState::Requesting);
        assert!(engine.route().is_none());
    }
    
    #[test]
    fn test_out_of_order_reply_within_session_dropped() {
        let mut engine = NavigationEngine::default();
        engine.start(poi()).unwrap();
        let first = engine.request_route(origin()).unwrap();
        let second = engine.request_route(origin()).unwrap();
        
        engine.apply_response(second.token, Ok(three_step_reply(3_000.0)));
        engine.apply_response(first.token, Ok(three_step_reply(9_000.0)));
        
        assert_eq!(engine.route().unwrap().distance, 3_000.0);
    }
    
    #[test]
    fn test_cancel_while_idle_is_noop() {
        let mut engine = NavigationEngine::default();
        assert!(engine.cancel().is_empty());
        assert_eq!(engine.last_outcome(), None);
    }
    
    #[test]
    fn test_retarget_moves_entity_destination() {
        let mut engine = NavigationEngine::default();
        let jane = Entity::new(EntityId::from_seed(2), "Jane", offset_north(origin(), 500.0), 80);
        engine.start(NavigationTarget::entity(&jane)).unwrap();
        
        let moved = offset_north(origin(), 900.0);
        engine.retarget(&jane.id, moved);
        let pending = engine.request_route(origin()).unwrap();
        
        assert_eq!(pending.request.destination, moved);
        assert_eq!(pending.request.origin, origin());
    }
}
