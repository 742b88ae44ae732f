//! Scripted routing provider with fault injection.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, trace};
use waypoint_core::distance_meters;
use waypoint_env::{
    Coordinate, DirectionsResponse, DirectionsRoute, EnvError, LineGeometry, Maneuver, RouteLeg, RouteLegStep,
    RouteRequest, RoutingProvider, SsmlAnnouncement, WireVoiceInstruction,
};

/// Average driving speed used for durations (m/s)
const CRUISE_SPEED_MPS: f64 = 13.4;

const MANEUVERS: [(&str, &str, &str); 4] = [
    ("Turn left onto Main Street", "turn", "left"),
    ("Turn right onto Oak Avenue", "turn", "right"),
    ("Continue onto Hill Street", "new name", "straight"),
    ("Bear left onto 5th Street", "turn", "slight left"),
];

/// Destination rounded to ~0.1 m, so repeated requests share a corridor
type DestinationKey = (i64, i64);

fn key(c: Coordinate) -> DestinationKey {
    ((c.lat * 1e6).round() as i64, (c.lng * 1e6).round() as i64)
}

fn lerp(a: Coordinate, b: Coordinate, t: f64) -> Coordinate {
    Coordinate::new(a.lat + (b.lat - a.lat) * t, a.lng + (b.lng - a.lng) * t)
}

/// Deterministic routing provider for simulation.
///
/// The first request toward a destination fixes a straight corridor from
/// that origin; every later request toward the same destination returns the
/// same maneuvers (so step indices stay stable across re-fetches) with the
/// remaining distance measured from the new origin.
pub struct ScriptedRouter {
    /// Maneuvers per corridor, the last one being the arrival step
    steps: usize,
    
    corridors: Mutex<HashMap<DestinationKey, Coordinate>>,
    
    /// Requests still to fail (`usize::MAX` = outage)
    failures: AtomicUsize,
    
    /// While set, replies wait for `release`
    holding: AtomicBool,
    held: AtomicUsize,
    gate: Semaphore,
    
    requests: AtomicU64,
}

impl ScriptedRouter {
    /// Creates a router producing `steps` maneuvers per route (at least one).
    pub fn new(steps: usize) -> Self {
        Self {
            steps: steps.max(1),
            corridors: Mutex::new(HashMap::new()),
            failures: AtomicUsize::new(0),
            holding: AtomicBool::new(false),
            held: AtomicUsize::new(0),
            gate: Semaphore::new(0),
            requests: AtomicU64::new(0),
        }
    }
    
    /// Fails the next `count` requests.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }
    
    /// Fails every request until `recover`.
    pub fn outage(&self) {
        self.failures.store(usize::MAX, Ordering::SeqCst);
    }
    
    pub fn recover(&self) {
        self.failures.store(0, Ordering::SeqCst);
    }
    
    /// Holds every reply until `release` is called.
    pub fn hold(&self) {
        self.holding.store(true, Ordering::SeqCst);
    }
    
    /// Lets every held reply through and stops holding.
    pub fn release(&self) {
        self.holding.store(false, Ordering::SeqCst);
        let held = self.held.swap(0, Ordering::SeqCst);
        debug!(held, "releasing held route replies");
        self.gate.add_permits(held);
    }
    
    /// Total requests received.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }
    
    fn take_failure(&self) -> bool {
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }
    
    /// Builds the scripted route for a request.
    pub fn plan(&self, request: &RouteRequest) -> DirectionsResponse {
        let destination = request.destination;
        let start = *self
            .corridors
            .lock()
            .unwrap()
            .entry(key(destination))
            .or_insert(request.origin);
        
        let corridor = distance_meters(start, destination);
        let remaining = distance_meters(request.origin, destination);
        let leg_distance = corridor / self.steps as f64;
        
        let steps = (1..=self.steps)
            .map(|i| {
                let location = lerp(start, destination, i as f64 / self.steps as f64);
                let (instruction, kind, modifier, announcement) = if i == self.steps {
                    (
                        "You have arrived at your destination".to_string(),
                        "arrive",
                        None,
                        "Your destination is ahead".to_string(),
                    )
                } else {
                    let (text, kind, modifier) = MANEUVERS[(i - 1) % MANEUVERS.len()];
                    let lowered = text[..1].to_lowercase() + &text[1..];
                    (text.to_string(), kind, Some(modifier.to_string()), format!("In 50 meters, {lowered}"))
                };
                
                RouteLegStep {
                    maneuver: Maneuver {
                        instruction,
                        location: [location.lng, location.lat],
                        kind: Some(kind.to_string()),
                        modifier,
                    },
                    distance: leg_distance,
                    duration: leg_distance / CRUISE_SPEED_MPS,
                    voice_instructions: vec![WireVoiceInstruction {
                        distance_along_geometry: 50.0,
                        ssml_announcement: Some(SsmlAnnouncement::Text(format!(
                            "<speak>{announcement}</speak>"
                        ))),
                        announcement,
                    }],
                }
            })
            .collect();
        
        DirectionsResponse {
            routes: vec![DirectionsRoute {
                distance: remaining,
                duration: remaining / CRUISE_SPEED_MPS,
                geometry: LineGeometry {
                    coordinates: vec![
                        [request.origin.lng, request.origin.lat],
                        [destination.lng, destination.lat],
                    ],
                },
                legs: vec![RouteLeg { steps }],
            }],
            code: Some("Ok".to_string()),
            message: None,
        }
    }
}

#[async_trait]
impl RoutingProvider for ScriptedRouter {
    async fn directions(&self, request: RouteRequest) -> Result<DirectionsResponse, EnvError> {
        let n = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
        let fail = self.take_failure();
        trace!(request = n, fail, "scripted route request");
        
        if self.holding.load(Ordering::SeqCst) {
            self.held.fetch_add(1, Ordering::SeqCst);
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }
        
        if fail {
            return Err(EnvError::routing("scripted provider outage"));
        }
        Ok(self.plan(&request))
    }
}
