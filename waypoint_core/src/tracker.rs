//! Tracker Runtime - Drives every engine from one event loop.
//!
//! The engines (sampler, motion simulator, vitals detector, navigation,
//! notifications) are plain state machines. The tracker owns them all,
//! feeds them position fixes and timer ticks, and carries their outputs to
//! the speech and notification sinks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Tracker                             │
//! │  live fix ──► Sampler ──► Vitals Detector ──► Dispatcher ──►│ sink
//! │      │                         ▲                            │
//! │      │        timer ──► Motion Simulator                    │
//! │      ▼                                                      │
//! │  Navigation ──► ctx.spawn(route fetch) ──► reply channel    │
//! │      │                                          │           │
//! │      └──────────── voice dispatch ◄─────────────┘      ──►  │ speech
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Route fetches are the only work that runs off the loop. Their replies
//! come back on a channel and are applied in loop order, so a reply from a
//! cancelled or superseded session is dropped by its request token.
//!
//! # Usage
//!
//! ```ignore
//! use waypoint_core::tracker::{Tracker, TrackerConfig};
//! use waypoint_env::{MapboxConfig, MapboxRouter, TokioContext};
//!
//! let router = MapboxRouter::new(MapboxConfig::from_env()?);
//! let mut tracker = Tracker::new(TokioContext::shared(), Arc::new(router), speech, sink, TrackerConfig::default());
//! tracker.run(position_rx, shutdown).await;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use waypoint_env::{
    ContextRng, ConversationId, Coordinate, DirectionsResponse, EntityId, EnvError, KeyValueStore,
    NotificationSink, RoutingProvider, SpeechSink, WaypointContext,
};

use crate::error::TrackerError;
use crate::events::{LocationErrorKind, TrackerEvent};
use crate::geofence::{VitalsConfig, VitalsDetector};
use crate::model::{Entity, EntityRoster, SafeZone, ZoneBook, ZoneId};
use crate::motion::{MotionConfig, MotionSimulator, MotionStep};
use crate::navigation::{
    NavState, NavigationConfig, NavigationEngine, NavigationOutput, NavigationTarget, RequestToken,
};
use crate::notify::{Notification, NotificationConfig, NotificationDispatcher, NotificationId, ViewContext};
use crate::ringer::{DeviceRinger, DEFAULT_RING_DURATION};
use crate::sampler::{LocationSampler, SampleOutcome, SamplingPolicy};
use crate::store::TrackerStore;

/// Configuration for a tracker.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub sampling: SamplingPolicy,
    pub motion: MotionConfig,
    pub vitals: VitalsConfig,
    pub navigation: NavigationConfig,
    pub notifications: NotificationConfig,

    /// How long "find device" rings (default: 10 s)
    pub ring_duration: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            sampling: SamplingPolicy::default(),
            motion: MotionConfig::default(),
            vitals: VitalsConfig::default(),
            navigation: NavigationConfig::default(),
            notifications: NotificationConfig::default(),
            ring_duration: DEFAULT_RING_DURATION,
        }
    }
}

type RouteReply = (RequestToken, Result<DirectionsResponse, EnvError>);

/// Owns all tracker state and serializes every mutation.
///
/// Generic over the context and the collaborators, so the same tracker runs
/// on a device (tokio, HTTP routing) or in the simulator.
pub struct Tracker<Ctx, Router, Speech, Sink>
where
    Ctx: WaypointContext,
    Router: RoutingProvider,
    Speech: SpeechSink,
    Sink: NotificationSink,
{
    ctx: Arc<Ctx>,
    router: Arc<Router>,
    speech: Arc<Speech>,
    sink: Arc<Sink>,
    config: TrackerConfig,

    roster: EntityRoster,
    zones: ZoneBook,
    sampler: LocationSampler,
    motion: MotionSimulator,
    detector: VitalsDetector,
    navigation: NavigationEngine,
    notifications: NotificationDispatcher,
    ringer: DeviceRinger,
    store: Option<TrackerStore<Arc<dyn KeyValueStore>>>,

    replies_tx: mpsc::UnboundedSender<RouteReply>,
    replies_rx: mpsc::UnboundedReceiver<RouteReply>,

    /// Route fetches spawned but not yet applied
    in_flight: usize,

    subscriber: Option<mpsc::UnboundedSender<TrackerEvent>>,
}

impl<Ctx, Router, Speech, Sink> Tracker<Ctx, Router, Speech, Sink>
where
    Ctx: WaypointContext,
    Router: RoutingProvider,
    Speech: SpeechSink,
    Sink: NotificationSink,
{
    pub fn new(
        ctx: Arc<Ctx>,
        router: Arc<Router>,
        speech: Arc<Speech>,
        sink: Arc<Sink>,
        config: TrackerConfig,
    ) -> Self {
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();

        Self {
            sampler: LocationSampler::new(config.sampling.clone()),
            motion: MotionSimulator::new(config.motion.clone()),
            detector: VitalsDetector::new(config.vitals.clone()),
            navigation: NavigationEngine::new(config.navigation.clone()),
            notifications: NotificationDispatcher::new(config.notifications.clone()),
            ringer: DeviceRinger::new(config.ring_duration),
            ctx,
            router,
            speech,
            sink,
            config,
            roster: EntityRoster::new(),
            zones: ZoneBook::new(),
            store: None,
            replies_tx,
            replies_rx,
            in_flight: 0,
            subscriber: None,
        }
    }

    /// Attaches a store and restores whatever it holds.
    ///
    /// Stored entities replace roster entries with the same id (keeping the
    /// roster's `is_local` flag); unknown ones are admitted. Zones are
    /// restored for the local user once one is on the roster.
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        let store = TrackerStore::new(store);

        for stored in store.load_locations() {
            match self.roster.get_mut(&stored.id) {
                Some(existing) => {
                    let is_local = existing.is_local;
                    *existing = stored;
                    existing.is_local = is_local;
                }
                None => {
                    self.roster.admit(stored);
                }
            }
        }
        if let Some(local) = self.roster.local() {
            let zones = store.load_zones(&local.id);
            if !zones.is_empty() {
                self.zones = ZoneBook::from_zones(zones);
            }
        }

        // Restored positions become the new baseline
        self.detector = VitalsDetector::new(self.config.vitals.clone());
        self.detect();

        info!(entities = self.roster.len(), zones = self.zones.len(), "state restored");
        self.store = Some(store);
        self
    }

    /// Returns a receiver for every event the tracker publishes.
    ///
    /// A later call replaces the earlier subscriber.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<TrackerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriber = Some(tx);
        rx
    }

    // ------------------------------------------------------------------------
    // Membership and zones
    // ------------------------------------------------------------------------

    /// Adds an entity to the tracked set; false if the id is already tracked.
    pub fn admit_member(&mut self, entity: Entity) -> bool {
        let (id, name, is_local) = (entity.id, entity.name.clone(), entity.is_local);
        if !self.roster.admit(entity) {
            return false;
        }

        info!(entity = %id, %name, is_local, "member admitted");
        // Prime the detector so the first move is diffed against the admitted position
        self.detect();
        if !is_local {
            self.publish(TrackerEvent::MemberJoined { entity: id, name });
        }
        self.persist_locations();
        true
    }

    /// Removes an entity; navigation toward it is cancelled.
    pub fn remove_member(&mut self, id: &EntityId) -> Result<Entity, TrackerError> {
        let entity = self.roster.remove(id).ok_or(TrackerError::UnknownEntity(*id))?;
        self.detector.forget(id);

        if matches!(self.navigation.target(), Some(NavigationTarget::Entity { id: target, .. }) if target == id) {
            self.cancel_navigation();
        }

        info!(entity = %id, name = %entity.name, "member removed");
        self.publish(TrackerEvent::MemberLeft {
            entity: entity.id,
            name: entity.name.clone(),
        });
        self.persist_locations();
        Ok(entity)
    }

    /// Creates a safe zone with a random display colour.
    pub fn add_zone(&mut self, name: impl Into<String>, center: Coordinate, radius: f64) -> ZoneId {
        let ctx = Arc::clone(&self.ctx);
        let mut rng = ContextRng(ctx.as_ref());
        let name = name.into();
        let id = self.zones.add_at(name.clone(), center, radius, &mut rng);

        self.publish(TrackerEvent::ZoneAdded { zone: id, name });
        self.persist_zones();
        id
    }

    pub fn update_zone(&mut self, zone: SafeZone) -> Result<(), TrackerError> {
        let (id, name) = (zone.id, zone.name.clone());
        if !self.zones.update(zone) {
            return Err(TrackerError::UnknownZone(id));
        }
        self.publish(TrackerEvent::ZoneUpdated { zone: id, name });
        self.persist_zones();
        Ok(())
    }

    pub fn delete_zone(&mut self, id: &ZoneId) -> Result<SafeZone, TrackerError> {
        let zone = self.zones.delete(id).ok_or(TrackerError::UnknownZone(*id))?;
        self.publish(TrackerEvent::ZoneDeleted {
            zone: zone.id,
            name: zone.name.clone(),
        });
        self.persist_zones();
        Ok(zone)
    }

    // ------------------------------------------------------------------------
    // Position feed
    // ------------------------------------------------------------------------

    /// Applies a live fix for the local user.
    ///
    /// Ignored (Ok) while the local user's location sharing is off.
    pub fn on_local_position(&mut self, coord: Coordinate) -> Result<SampleOutcome, TrackerError> {
        let coord = Coordinate::validated(coord.lat, coord.lng)?;
        let now = self.ctx.timestamp();
        self.expire_notifications();

        let local = self.roster.local_mut().ok_or(TrackerError::NoLocalEntity)?;
        if !local.location_sharing {
            debug!("location sharing off, fix ignored");
            return Ok(SampleOutcome::LiveOnly);
        }
        let outcome = self.sampler.sample(local, coord, now);

        self.detect();
        self.persist_locations();

        if self.navigation.state() != NavState::Idle {
            self.request_route(coord);
        }
        self.dispatch_voice();
        Ok(outcome)
    }

    /// Stores a compass heading on the local user.
    pub fn on_heading(&mut self, degrees: f64) -> Result<(), TrackerError> {
        let local = self.roster.local_mut().ok_or(TrackerError::NoLocalEntity)?;
        local.set_heading(degrees);
        self.persist_locations();
        Ok(())
    }

    /// Reports a failed location fix.
    ///
    /// Permission denial also switches the local user's sharing off.
    pub fn on_location_error(&mut self, kind: LocationErrorKind) {
        if kind == LocationErrorKind::PermissionDenied {
            if let Some(local) = self.roster.local_mut() {
                local.location_sharing = false;
                warn!(entity = %local.id, "location permission denied, sharing disabled");
            }
            self.persist_locations();
        }
        self.publish(TrackerEvent::LocationError { kind });
    }

    pub fn set_location_sharing(&mut self, id: &EntityId, enabled: bool) -> Result<(), TrackerError> {
        let entity = self.roster.get_mut(id).ok_or(TrackerError::UnknownEntity(*id))?;
        entity.location_sharing = enabled;
        debug!(entity = %id, enabled, "location sharing changed");
        self.persist_locations();
        Ok(())
    }

    /// One motion simulator tick over every remote, sharing entity.
    pub fn simulate_tick(&mut self) -> Vec<MotionStep> {
        let ctx = Arc::clone(&self.ctx);
        let mut rng = ContextRng(ctx.as_ref());
        let steps = self
            .motion
            .tick(&mut self.roster, &self.sampler, &mut rng, ctx.timestamp());

        for step in &steps {
            self.navigation.retarget(&step.id, step.coord);
        }

        self.detect();
        self.persist_locations();
        self.housekeeping();
        steps
    }

    // ------------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------------

    /// Starts a navigation session, cancelling any running one.
    ///
    /// A route is requested right away if the local position is known.
    pub fn start_navigation(&mut self, target: NavigationTarget) -> Result<(), TrackerError> {
        let outputs = match self.navigation.start(target) {
            Ok(outputs) => outputs,
            Err(err) => {
                if matches!(err, TrackerError::InvalidTarget) {
                    self.publish(TrackerEvent::InvalidNavigationTarget);
                }
                return Err(err);
            }
        };
        self.apply_outputs(outputs);

        if let Some(origin) = self.local_position() {
            self.request_route(origin);
        }
        Ok(())
    }

    /// Navigates to a tracked member.
    pub fn navigate_to_member(&mut self, id: &EntityId) -> Result<(), TrackerError> {
        let entity = self.roster.get(id).ok_or(TrackerError::UnknownEntity(*id))?;
        self.start_navigation(NavigationTarget::entity(entity))
    }

    pub fn cancel_navigation(&mut self) {
        let outputs = self.navigation.cancel();
        self.apply_outputs(outputs);
    }

    fn request_route(&mut self, origin: Coordinate) {
        let Some(pending) = self.navigation.request_route(origin) else {
            return;
        };

        let router = Arc::clone(&self.router);
        let tx = self.replies_tx.clone();
        self.in_flight += 1;

        self.ctx.spawn("route-fetch", async move {
            let reply = router.directions(pending.request).await;
            // Receiver lives as long as the tracker
            let _ = tx.send((pending.token, reply));
        });
    }

    fn apply_reply(&mut self, (token, reply): RouteReply) {
        self.in_flight = self.in_flight.saturating_sub(1);
        let outputs = self.navigation.apply_response(token, reply);
        self.apply_outputs(outputs);
        self.dispatch_voice();
    }

    /// Applies route replies that have already arrived.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(reply) = self.replies_rx.try_recv() {
            self.apply_reply(reply);
            applied += 1;
        }
        applied
    }

    /// Waits for every outstanding route fetch and applies its reply.
    pub async fn settle(&mut self) {
        while self.in_flight > 0 {
            match self.replies_rx.recv().await {
                Some(reply) => self.apply_reply(reply),
                None => break,
            }
        }
    }

    /// Speaks every step announcement that is due at the current position.
    fn dispatch_voice(&mut self) {
        let Some(position) = self.local_position() else {
            return;
        };
        while let Some(text) = self.navigation.dispatch_voice(position) {
            self.speech.speak(&text);
        }
    }

    fn apply_outputs(&mut self, outputs: Vec<NavigationOutput>) {
        for output in outputs {
            match output {
                NavigationOutput::Speak(text) => self.speech.speak(&text),
                NavigationOutput::StopSpeech => self.speech.cancel(),
                NavigationOutput::Event(event) => self.publish(event),
            }
        }
    }

    // ------------------------------------------------------------------------
    // Notifications and devices
    // ------------------------------------------------------------------------

    /// Rings a member's device for the configured duration.
    pub fn find_device(&mut self, id: &EntityId) -> Result<(), TrackerError> {
        let name = self
            .roster
            .get(id)
            .map(|e| e.name.clone())
            .ok_or(TrackerError::UnknownEntity(*id))?;
        self.ringer.ring(*id, self.ctx.now())?;
        self.publish(TrackerEvent::FindDevice { entity: *id, name });
        Ok(())
    }

    pub fn permission_changed(&mut self, granted: bool) {
        self.publish(TrackerEvent::NotificationPermission { granted });
    }

    /// Surfaces a chat message received outside the tracker.
    pub fn receive_message(&mut self, conversation: ConversationId, sender_name: impl Into<String>, text: impl Into<String>) {
        self.publish(TrackerEvent::NewMessage {
            conversation,
            sender_name: sender_name.into(),
            text: text.into(),
        });
    }

    pub fn set_view(&mut self, view: ViewContext) {
        self.notifications.set_view(view);
    }

    pub fn dismiss_notification(&mut self, id: NotificationId) -> bool {
        self.notifications.dismiss(id)
    }

    /// Expires notifications and finished rings.
    pub fn housekeeping(&mut self) {
        self.expire_notifications();
        if let Some(id) = self.ringer.tick(self.ctx.now()) {
            debug!(entity = %id, "device stopped ringing");
        }
    }

    fn detect(&mut self) {
        let snapshot = self.roster.snapshot();
        for event in self.detector.observe(&snapshot, self.zones.as_slice()) {
            self.publish(event);
        }
    }

    fn expire_notifications(&mut self) {
        let expired = self.notifications.expire(self.ctx.now());
        if expired > 0 {
            debug!(expired, "notifications expired");
        }
    }

    fn publish(&mut self, event: TrackerEvent) {
        self.expire_notifications();
        let ctx = Arc::clone(&self.ctx);
        let mut rng = ContextRng(ctx.as_ref());
        self.notifications.notify(&event, ctx.now(), self.sink.as_ref(), &mut rng);
        if let Some(tx) = &self.subscriber {
            if tx.send(event).is_err() {
                self.subscriber = None;
            }
        }
    }

    fn persist_locations(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_locations(self.roster.iter()) {
                warn!(error = %e, "failed to persist locations");
            }
        }
    }

    fn persist_zones(&self) {
        let (Some(store), Some(local)) = (&self.store, self.roster.local()) else {
            return;
        };
        if let Err(e) = store.save_zones(local.id, self.zones.as_slice()) {
            warn!(error = %e, "failed to persist safe zones");
        }
    }

    // ------------------------------------------------------------------------
    // Event loop
    // ------------------------------------------------------------------------

    /// Runs until `shutdown` resolves or the position feed closes.
    ///
    /// Multiplexes live fixes, route replies and one timer. The timer wakes
    /// at the next motion tick or the next notification expiry, whichever
    /// comes first.
    pub async fn run<S>(&mut self, mut positions: mpsc::Receiver<Coordinate>, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let ctx = Arc::clone(&self.ctx);
        let interval = self.config.motion.interval;
        let mut next_tick = ctx.now() + interval;

        info!(interval_ms = interval.as_millis() as u64, seed = ctx.seed(), "tracker running");

        loop {
            let wake = match self.notifications.next_expiry() {
                Some(expiry) => expiry.min(next_tick),
                None => next_tick,
            };
            let until_wake = wake.saturating_sub(ctx.now());

            tokio::select! {
                _ = &mut shutdown => {
                    info!("tracker shutting down");
                    break;
                }
                fix = positions.recv() => match fix {
                    Some(coord) => {
                        if let Err(e) = self.on_local_position(coord) {
                            warn!(error = %e, "position fix rejected");
                        }
                    }
                    None => {
                        info!("position feed closed");
                        break;
                    }
                },
                Some(reply) = self.replies_rx.recv() => {
                    self.apply_reply(reply);
                }
                _ = ctx.sleep(until_wake) => {
                    if ctx.now() >= next_tick {
                        next_tick += interval;
                        self.simulate_tick();
                    } else {
                        self.housekeeping();
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    pub fn context(&self) -> &Arc<Ctx> {
        &self.ctx
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn roster(&self) -> &EntityRoster {
        &self.roster
    }

    pub fn zones(&self) -> &ZoneBook {
        &self.zones
    }

    pub fn navigation(&self) -> &NavigationEngine {
        &self.navigation
    }

    pub fn notifications(&self) -> &NotificationDispatcher {
        &self.notifications
    }

    /// In-app notifications still showing at the current context time.
    pub fn visible_notifications(&self) -> impl Iterator<Item = &Notification> + '_ {
        self.notifications.visible_at(self.ctx.now())
    }

    pub fn ringer(&self) -> &DeviceRinger {
        &self.ringer
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    fn local_position(&self) -> Option<Coordinate> {
        self.roster.local().map(|e| e.coord)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_math::offset_north;
    use crate::navigation::PointOfInterest;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Semaphore;
    use waypoint_env::{RouteRequest, SystemNotification, TokioContext};

    const HOME: Coordinate = Coordinate::new(34.0522, -118.2437);

    #[derive(Default)]
    struct Speech {
        spoken: Mutex<Vec<String>>,
        cancels: AtomicUsize,
    }

    impl SpeechSink for Speech {
        fn speak(&self, text: &str) {
            self.spoken.lock().unwrap().push(text.to_string());
        }

        fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct Sink {
        delivered: Mutex<Vec<SystemNotification>>,
    }

    impl NotificationSink for Sink {
        fn permission_granted(&self) -> bool {
            true
        }

        fn deliver(&self, notification: SystemNotification) {
            self.delivered.lock().unwrap().push(notification);
        }
    }

    impl Sink {
        fn titles(&self) -> Vec<String> {
            self.delivered.lock().unwrap().iter().map(|n| n.title.clone()).collect()
        }
    }

    /// Answers with a fixed response once a permit is released.
    struct FixedRouter {
        response: Result<DirectionsResponse, EnvError>,
        gate: Option<Arc<Semaphore>>,
        calls: AtomicUsize,
    }

    impl FixedRouter {
        fn ok(response: DirectionsResponse) -> Self {
            Self {
                response: Ok(response),
                gate: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                response: Err(EnvError::routing("503 Service Unavailable")),
                gate: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn gated(response: DirectionsResponse, gate: Arc<Semaphore>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::ok(response)
            }
        }
    }

    #[async_trait]
    impl RoutingProvider for FixedRouter {
        async fn directions(&self, _request: RouteRequest) -> Result<DirectionsResponse, EnvError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
            match &self.response {
                Ok(response) => Ok(response.clone()),
                Err(e) => Err(EnvError::routing(e.to_string())),
            }
        }
    }

    /// Three steps 500 m apart heading north from `HOME`.
    fn three_step_route(distance: f64) -> DirectionsResponse {
        let steps: Vec<_> = (1..=3)
            .map(|i| {
                let at = offset_north(HOME, 500.0 * i as f64);
                serde_json::json!({
                    "maneuver": { "instruction": format!("Turn {i}"), "location": [at.lng, at.lat], "type": "turn" },
                    "distance": 500.0,
                    "duration": 60.0,
                    "voiceInstructions": [
                        { "distanceAlongGeometry": 50.0, "announcement": format!("In 50 meters, turn {i}") }
                    ]
                })
            })
            .collect();
        serde_json::from_value(serde_json::json!({
            "code": "Ok",
            "routes": [{
                "distance": distance,
                "duration": 180.0,
                "geometry": { "coordinates": [[HOME.lng, HOME.lat]] },
                "legs": [{ "steps": steps }]
            }]
        }))
        .unwrap()
    }

    type TestTracker = Tracker<TokioContext, FixedRouter, Speech, Sink>;

    fn tracker(router: FixedRouter) -> (TestTracker, Arc<FixedRouter>, Arc<Speech>, Arc<Sink>) {
        tracker_with(router, TrackerConfig::default())
    }

    fn tracker_with(
        router: FixedRouter,
        config: TrackerConfig,
    ) -> (TestTracker, Arc<FixedRouter>, Arc<Speech>, Arc<Sink>) {
        let router = Arc::new(router);
        let speech = Arc::new(Speech::default());
        let sink = Arc::new(Sink::default());
        let mut tracker = Tracker::new(
            TokioContext::shared(),
            Arc::clone(&router),
            Arc::clone(&speech),
            Arc::clone(&sink),
            config,
        );
        tracker.admit_member(Entity::new(EntityId::from_seed(1), "Me", HOME, 90).local());
        tracker.admit_member(Entity::new(EntityId::from_seed(2), "Jane", offset_north(HOME, 2_000.0), 60));
        (tracker, router, speech, sink)
    }

    fn poi() -> NavigationTarget {
        NavigationTarget::Poi(PointOfInterest {
            id: "poi-park".into(),
            name: "Grand Park".into(),
            coord: offset_north(HOME, 1_500.0),
        })
    }

    #[tokio::test]
    async fn test_position_requires_local_entity() {
        let speech = Arc::new(Speech::default());
        let sink = Arc::new(Sink::default());
        let mut tracker = Tracker::new(
            TokioContext::shared(),
            Arc::new(FixedRouter::failing()),
            speech,
            sink,
            TrackerConfig::default(),
        );
        assert!(matches!(tracker.on_local_position(HOME), Err(TrackerError::NoLocalEntity)));
    }

    #[tokio::test]
    async fn test_invalid_fix_rejected() {
        let (mut tracker, ..) = tracker(FixedRouter::failing());
        let result = tracker.on_local_position(Coordinate::new(f64::NAN, 0.0));
        assert!(matches!(result, Err(TrackerError::Env(EnvError::InvalidCoordinate { .. }))));
    }

    #[tokio::test]
    async fn test_member_events_are_notified() {
        let (mut tracker, _, _, sink) = tracker(FixedRouter::failing());
        assert!(!tracker.admit_member(Entity::new(EntityId::from_seed(2), "Jane again", HOME, 50)));

        tracker.remove_member(&EntityId::from_seed(2)).unwrap();
        assert_eq!(sink.titles(), vec!["New Member", "Member Removed"]);
        assert!(matches!(
            tracker.remove_member(&EntityId::from_seed(2)),
            Err(TrackerError::UnknownEntity(_))
        ));
    }

    #[tokio::test]
    async fn test_navigate_to_self_is_rejected() {
        let (mut tracker, router, _, sink) = tracker(FixedRouter::ok(three_step_route(1_500.0)));

        let result = tracker.navigate_to_member(&EntityId::from_seed(1));

        assert!(matches!(result, Err(TrackerError::InvalidTarget)));
        assert_eq!(tracker.navigation().state(), NavState::Idle);
        assert_eq!(router.calls.load(Ordering::SeqCst), 0);
        assert_eq!(sink.titles().last().map(String::as_str), Some("Navigation Error"));
    }

    #[tokio::test]
    async fn test_voice_instructions_spoken_once() {
        let (mut tracker, _, speech, _) = tracker(FixedRouter::ok(three_step_route(1_500.0)));

        tracker.start_navigation(poi()).unwrap();
        tracker.settle().await;
        assert_eq!(tracker.navigation().state(), NavState::Active);

        tracker.on_local_position(offset_north(HOME, 10.0)).unwrap();
        tracker.settle().await;
        assert!(speech.spoken.lock().unwrap().is_empty());

        let near_first = offset_north(HOME, 480.0);
        tracker.on_local_position(near_first).unwrap();
        tracker.settle().await;
        tracker.on_local_position(near_first).unwrap();
        tracker.settle().await;

        assert_eq!(*speech.spoken.lock().unwrap(), vec!["In 50 meters, turn 1".to_string()]);
        assert_eq!(tracker.navigation().step_index(), 0);
    }

    #[tokio::test]
    async fn test_short_route_arrives() {
        let (mut tracker, _, speech, sink) = tracker(FixedRouter::ok(three_step_route(25.0)));

        tracker.start_navigation(poi()).unwrap();
        tracker.settle().await;

        assert_eq!(tracker.navigation().state(), NavState::Idle);
        assert!(tracker.navigation().route().is_none());
        assert_eq!(sink.titles(), vec!["New Member", "You have arrived!"]);
        assert_eq!(
            *speech.spoken.lock().unwrap(),
            vec![NavigationConfig::default().arrival_announcement]
        );
    }

    #[tokio::test]
    async fn test_provider_failure_notifies_once() {
        let (mut tracker, _, speech, sink) = tracker(FixedRouter::failing());

        tracker.start_navigation(poi()).unwrap();
        tracker.on_local_position(offset_north(HOME, 5.0)).unwrap();
        tracker.settle().await;

        let errors = sink.titles().into_iter().filter(|t| t == "Navigation Error").count();
        assert_eq!(errors, 1);
        assert_eq!(tracker.navigation().state(), NavState::Idle);
        assert_eq!(speech.cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_late_reply_after_cancel_is_dropped() {
        let gate = Arc::new(Semaphore::new(0));
        let (mut tracker, _, _, _) = tracker(FixedRouter::gated(three_step_route(1_500.0), Arc::clone(&gate)));

        tracker.start_navigation(poi()).unwrap();
        assert_eq!(tracker.in_flight(), 1);
        tracker.cancel_navigation();

        gate.add_permits(1);
        tracker.settle().await;

        assert_eq!(tracker.in_flight(), 0);
        assert_eq!(tracker.navigation().state(), NavState::Idle);
        assert!(tracker.navigation().route().is_none());
    }

    #[tokio::test]
    async fn test_permission_denied_stops_sampling() {
        let (mut tracker, _, _, sink) = tracker(FixedRouter::failing());

        tracker.on_location_error(LocationErrorKind::PermissionDenied);
        let moved = offset_north(HOME, 500.0);
        assert_eq!(tracker.on_local_position(moved).unwrap(), SampleOutcome::LiveOnly);

        let local = tracker.roster().local().unwrap();
        assert!(!local.location_sharing);
        assert_eq!(local.coord, HOME);
        assert_eq!(sink.titles().last().map(String::as_str), Some("Location Access Denied"));

        tracker.set_location_sharing(&EntityId::from_seed(1), true).unwrap();
        tracker.on_local_position(moved).unwrap();
        assert_eq!(tracker.roster().local().unwrap().coord, moved);
    }

    #[tokio::test]
    async fn test_find_device_rings_one_at_a_time() {
        let (mut tracker, _, _, sink) = tracker(FixedRouter::failing());
        tracker.admit_member(Entity::new(EntityId::from_seed(3), "Leo", HOME, 40));

        tracker.find_device(&EntityId::from_seed(2)).unwrap();
        assert!(matches!(
            tracker.find_device(&EntityId::from_seed(3)),
            Err(TrackerError::AlreadyRinging(_))
        ));
        assert_eq!(sink.titles().last().map(String::as_str), Some("Finding Device"));
    }

    #[tokio::test]
    async fn test_simulated_tick_spares_local_user() {
        let (mut tracker, ..) = tracker(FixedRouter::failing());
        let before = tracker.roster().local().cloned();

        let steps = tracker.simulate_tick();

        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].id, EntityId::from_seed(2));
        assert_eq!(tracker.roster().local().cloned(), before);
    }

    #[tokio::test]
    async fn test_zone_changes_and_persistence() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let (tracker, ..) = tracker(FixedRouter::failing());
        let mut tracker = tracker.with_store(Arc::clone(&store));
        let mut events = tracker.subscribe();

        let id = tracker.add_zone("Home", HOME, 100.0);
        let mut zone = tracker.zones().get(&id).cloned().unwrap();
        zone.radius = 250.0;
        tracker.update_zone(zone).unwrap();
        tracker.on_local_position(offset_north(HOME, 150.0)).unwrap();

        assert!(matches!(events.try_recv(), Ok(TrackerEvent::ZoneAdded { .. })));
        assert!(matches!(events.try_recv(), Ok(TrackerEvent::ZoneUpdated { .. })));

        let (fresh, ..) = self::tracker(FixedRouter::failing());
        let restored = fresh.with_store(store);
        assert_eq!(restored.zones().get(&id).map(|z| z.radius), Some(250.0));
        assert_eq!(restored.roster().local().unwrap().coord, offset_north(HOME, 150.0));
        assert!(restored.roster().local().unwrap().is_local);

        assert!(matches!(
            tracker.delete_zone(&ZoneId::new()),
            Err(TrackerError::UnknownZone(_))
        ));
    }

    #[tokio::test]
    async fn test_heading_survives_restore() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let (tracker, ..) = tracker(FixedRouter::failing());
        let mut tracker = tracker.with_store(Arc::clone(&store));

        tracker.on_heading(90.0).unwrap();

        let (fresh, ..) = self::tracker(FixedRouter::failing());
        let restored = fresh.with_store(store);
        assert_eq!(restored.roster().local().unwrap().heading, Some(90.0));
    }

    #[tokio::test]
    async fn test_overdue_notifications_hidden_and_dropped() {
        let config = TrackerConfig {
            notifications: NotificationConfig {
                display_duration: Duration::from_millis(30),
            },
            ..TrackerConfig::default()
        };
        let (mut tracker, ..) = tracker_with(FixedRouter::failing(), config);
        assert_eq!(tracker.notifications().active().len(), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(tracker.visible_notifications().count(), 0);

        tracker.on_local_position(offset_north(HOME, 10.0)).unwrap();
        assert!(tracker.notifications().active().is_empty());
    }

    #[tokio::test]
    async fn test_run_expires_notifications_between_motion_ticks() {
        let config = TrackerConfig {
            motion: MotionConfig {
                interval: Duration::from_secs(10),
                ..MotionConfig::default()
            },
            notifications: NotificationConfig {
                display_duration: Duration::from_millis(30),
            },
            ..TrackerConfig::default()
        };
        let (mut tracker, ..) = tracker_with(FixedRouter::failing(), config);
        let jane = EntityId::from_seed(2);
        let before = tracker.roster().get(&jane).map(|e| e.coord);

        let (_fixes, positions) = mpsc::channel(1);
        tracker.run(positions, tokio::time::sleep(Duration::from_millis(100))).await;

        assert!(tracker.notifications().active().is_empty());
        assert_eq!(tracker.roster().get(&jane).map(|e| e.coord), before);
    }

    #[tokio::test]
    async fn test_run_loop_handles_fixes_replies_and_ticks() {
        let config = TrackerConfig {
            motion: MotionConfig {
                interval: Duration::from_millis(20),
                ..MotionConfig::default()
            },
            ..TrackerConfig::default()
        };
        let (mut tracker, router, ..) = tracker_with(FixedRouter::ok(three_step_route(1_500.0)), config);
        let jane = EntityId::from_seed(2);
        let before = tracker.roster().get(&jane).map(|e| e.coord);

        tracker.start_navigation(poi()).unwrap();
        assert_eq!(tracker.in_flight(), 1);

        let (fixes, positions) = mpsc::channel(4);
        let fix = offset_north(HOME, 150.0);
        fixes.send(fix).await.unwrap();
        tracker.run(positions, tokio::time::sleep(Duration::from_millis(200))).await;

        let local = tracker.roster().local().unwrap();
        assert_eq!(local.coord, fix);
        assert_eq!(local.history().len(), 1);

        // Initial request plus the one the fix triggered, both applied by the loop
        assert_eq!(router.calls.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.in_flight(), 0);
        assert_eq!(tracker.navigation().state(), NavState::Active);

        assert_ne!(tracker.roster().get(&jane).map(|e| e.coord), before);
        drop(fixes);
    }

    #[tokio::test]
    async fn test_run_ends_when_feed_closes() {
        let (mut tracker, ..) = tracker(FixedRouter::failing());
        let (fixes, positions) = mpsc::channel::<Coordinate>(1);
        drop(fixes);

        let ended = tokio::time::timeout(
            Duration::from_secs(1),
            tracker.run(positions, std::future::pending::<()>()),
        )
        .await;
        assert!(ended.is_ok());
    }
}
