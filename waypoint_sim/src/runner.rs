//! Scenario runner - executes simulation scenarios against a SimWorld.

use crate::exporter::SimExport;
use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld};

use std::collections::HashMap;
use tracing::{debug, info, warn};
use waypoint_core::geo_math::offset_north;
use waypoint_core::{
    distance_meters, NavState, NavigationTarget, PointOfInterest, SessionOutcome, TrackerEvent,
};
use waypoint_env::EntityId;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total motion ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Number of tracked entities at end
    pub final_entity_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioMetrics {
    /// History points across all remote members
    pub history_points: usize,

    /// Geofence enter + leave events
    pub geofence_events: usize,

    pub low_battery_events: usize,

    /// Everything handed to the speech sink
    pub announcements: usize,

    pub route_requests: u64,

    /// System notifications delivered
    pub notifications: usize,
}

impl ScenarioMetrics {
    fn collect(world: &SimWorld) -> Self {
        Self {
            history_points: world
                .tracker
                .roster()
                .iter()
                .filter(|e| !e.is_local)
                .map(|e| e.history().len())
                .sum(),
            geofence_events: world.count("geofence-enter") + world.count("geofence-leave"),
            low_battery_events: world.count("low-battery"),
            announcements: world.speech.spoken().len(),
            route_requests: world.router.requests(),
            notifications: world.sink.delivered().len(),
        }
    }
}

type Outcome = Result<(), String>;

fn ensure(condition: bool, reason: impl FnOnce() -> String) -> Outcome {
    if condition {
        Ok(())
    } else {
        Err(reason())
    }
}

/// Runs simulation scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Number of remote members
    members: usize,

    /// Maximum duration in seconds
    max_duration_secs: f64,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64, members: usize) -> Self {
        Self {
            seed,
            members,
            max_duration_secs: 600.0,
        }
    }

    /// Sets the maximum duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_exported(scenario).0
    }

    /// Runs a scenario and also returns its frame-by-frame export.
    pub fn run_exported(&self, scenario: ScenarioId) -> (ScenarioResult, SimExport) {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                let reason = format!("failed to start runtime: {e}");
                let mut export = SimExport::new(scenario.name(), self.seed);
                export.finalize(false, Some(reason.clone()));
                return (
                    ScenarioResult {
                        scenario,
                        seed: self.seed,
                        passed: false,
                        total_ticks: 0,
                        final_time_secs: 0.0,
                        final_entity_count: 0,
                        failure_reason: Some(reason),
                        metrics: ScenarioMetrics::default(),
                    },
                    export,
                );
            }
        };

        runtime.block_on(self.execute(scenario))
    }

    fn world_config(&self, scenario: ScenarioId) -> SimConfig {
        let base = SimConfig {
            seed: self.seed,
            members: self.members,
            ..SimConfig::default()
        };
        match scenario {
            ScenarioId::BatteryDrain => SimConfig {
                battery: 21..=26,
                ..base
            },
            _ => base,
        }
    }

    fn target_ticks(&self, world: &SimWorld) -> u64 {
        let interval = world.config.tracker.motion.interval.as_secs_f64();
        ((self.max_duration_secs / interval).ceil() as u64).max(1)
    }

    async fn execute(&self, scenario: ScenarioId) -> (ScenarioResult, SimExport) {
        let mut world = SimWorld::new(self.world_config(scenario));
        let mut export = SimExport::new(scenario.name(), self.seed);
        export.add_frame(world.frame());

        let outcome = match scenario {
            ScenarioId::Wander => self.run_wander(&mut world, &mut export).await,
            ScenarioId::BatteryDrain => self.run_battery_drain(&mut world, &mut export).await,
            ScenarioId::Commute => self.run_commute(&mut world, &mut export).await,
            ScenarioId::StaleRoute => self.run_stale_route(&mut world, &mut export).await,
            ScenarioId::Outage => self.run_outage(&mut world, &mut export).await,
        };

        let metrics = ScenarioMetrics::collect(&world);
        let failure_reason = outcome.err();
        let passed = failure_reason.is_none();

        if passed {
            info!("✓ {} complete: {:?}", scenario.name(), metrics);
        } else {
            warn!("✗ {} failed: {}", scenario.name(), failure_reason.as_deref().unwrap_or("unknown"));
        }
        export.finalize(passed, failure_reason.clone());

        let result = ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            total_ticks: world.tick_count(),
            final_time_secs: world.time(),
            final_entity_count: world.tracker.roster().len(),
            failure_reason,
            metrics,
        };
        (result, export)
    }

    async fn step(&self, world: &mut SimWorld, export: &mut SimExport) {
        world.tick().await;
        export.add_frame(world.frame());

        if world.tick_count() % 12 == 0 {
            debug!(
                "  t={:.0}s | events={} | requests={}",
                world.time(),
                world.events().len(),
                world.router.requests()
            );
        }
    }

    fn poi(&self, world: &SimWorld, name: &str, meters: f64) -> PointOfInterest {
        PointOfInterest {
            id: format!("poi-{}", name.to_lowercase().replace(' ', "-")),
            name: name.to_string(),
            coord: offset_north(world.config.home, meters),
        }
    }

    /// Members random-walk around the home zone.
    ///
    /// **Assertion**: enter/leave events alternate per member starting from
    /// its initial side and end on its final side; every history point
    /// satisfies the sampling policy; the local user is never moved.
    async fn run_wander(&self, world: &mut SimWorld, export: &mut SimExport) -> Outcome {
        let zone = world
            .tracker
            .zones()
            .get(&world.home_zone)
            .cloned()
            .ok_or("home zone missing")?;

        let mut inside: HashMap<EntityId, bool> = world
            .member_ids
            .iter()
            .filter_map(|id| world.tracker.roster().get(id))
            .map(|e| (e.id, zone.contains(e.coord)))
            .collect();

        for _ in 0..self.target_ticks(world) {
            self.step(world, export).await;
        }

        for event in world.events() {
            match event {
                TrackerEvent::GeofenceEnter { entity, zone: z, .. } if *z == zone.id => {
                    let state = inside.entry(*entity).or_insert(false);
                    ensure(!*state, || format!("{entity} entered twice without leaving"))?;
                    *state = true;
                }
                TrackerEvent::GeofenceLeave { entity, zone: z, .. } if *z == zone.id => {
                    let state = inside.entry(*entity).or_insert(true);
                    ensure(*state, || format!("{entity} left twice without entering"))?;
                    *state = false;
                }
                _ => {}
            }
        }

        let policy = world.config.tracker.sampling.clone();
        for entity in world.tracker.roster().iter().filter(|e| !e.is_local) {
            ensure(inside.get(&entity.id) == Some(&zone.contains(entity.coord)), || {
                format!("{} geofence state out of sync with position", entity.id)
            })?;

            for pair in entity.history().windows(2) {
                let d = distance_meters(pair[0].coord, pair[1].coord);
                let elapsed = pair[1].timestamp.elapsed_since(pair[0].timestamp);
                ensure(pair[1].timestamp >= pair[0].timestamp, || {
                    format!("{} history not monotonic", entity.id)
                })?;
                ensure(
                    d > policy.large_move_m || (d > policy.drift_move_m && elapsed > policy.drift_interval),
                    || format!("{} recorded a {d:.1} m move after {elapsed:?}", entity.id),
                )?;
            }
        }

        let local = world.local().ok_or("local user missing")?;
        ensure(local.coord == world.config.home && local.history().is_empty(), || {
            "simulator moved the local user".to_string()
        })
    }

    /// Batteries start at 21-26% and drain.
    ///
    /// **Assertion**: each member that ends at or below 20% raised exactly
    /// one low-battery alert, at exactly 20%; the others raised none.
    async fn run_battery_drain(&self, world: &mut SimWorld, export: &mut SimExport) -> Outcome {
        let threshold = world.config.tracker.vitals.low_battery_percent;

        for _ in 0..self.target_ticks(world) {
            self.step(world, export).await;
        }

        let mut alerts: HashMap<EntityId, Vec<u8>> = HashMap::new();
        for event in world.events() {
            if let TrackerEvent::LowBattery { entity, level, .. } = event {
                alerts.entry(*entity).or_default().push(*level);
            }
        }

        for id in &world.member_ids {
            let battery = world.tracker.roster().get(id).map(|e| e.battery).ok_or("member missing")?;
            let levels = alerts.remove(id).unwrap_or_default();
            let expected: Vec<u8> = if battery <= threshold { vec![threshold] } else { Vec::new() };
            ensure(levels == expected, || {
                format!("{id} ended at {battery}% with alerts {levels:?}, expected {expected:?}")
            })?;
        }
        Ok(())
    }

    /// The local user drives 1.2 km north to a point of interest.
    ///
    /// **Assertion**: every maneuver announcement is spoken exactly once,
    /// arrival fires once, and the engine ends idle.
    async fn run_commute(&self, world: &mut SimWorld, export: &mut SimExport) -> Outcome {
        const DISTANCE_M: f64 = 1_200.0;
        const STRIDE_M: f64 = 40.0;

        let poi = self.poi(world, "Grand Park", DISTANCE_M);
        let home = world.config.home;
        world
            .tracker
            .start_navigation(NavigationTarget::Poi(poi.clone()))
            .map_err(|e| e.to_string())?;
        world.settle().await;
        ensure(world.tracker.navigation().state() == NavState::Active, || {
            "route was not applied".to_string()
        })?;

        let expected: Vec<String> = world
            .tracker
            .navigation()
            .route()
            .map(|r| r.steps.iter().filter_map(|s| s.announcement().map(str::to_string)).collect())
            .unwrap_or_default();

        let legs = (DISTANCE_M / STRIDE_M).ceil() as usize;
        for leg in 1..=legs {
            self.step(world, export).await;
            let walked = (leg as f64 * STRIDE_M).min(DISTANCE_M);
            world.move_local(offset_north(home, walked)).await.map_err(|e| e.to_string())?;
            if world.tracker.navigation().state() == NavState::Idle {
                break;
            }
        }
        export.add_frame(world.frame());

        let spoken = world.speech.spoken();
        let final_step = expected.len().saturating_sub(1);
        for (index, announcement) in expected.iter().enumerate() {
            let times = spoken.iter().filter(|s| *s == announcement).count();
            let allowed = if index == final_step { times <= 1 } else { times == 1 };
            ensure(allowed, || format!("\"{announcement}\" spoken {times} times"))?;
        }

        ensure(world.count("arrival") == 1, || format!("{} arrivals", world.count("arrival")))?;
        let arrival_text = &world.config.tracker.navigation.arrival_announcement;
        ensure(spoken.last() == Some(arrival_text), || "arrival not announced last".to_string())?;
        ensure(
            world.tracker.navigation().state() == NavState::Idle
                && world.tracker.navigation().last_outcome() == Some(SessionOutcome::Arrived),
            || "engine not idle after arrival".to_string(),
        )
    }

    /// Route replies are held back while the session is cancelled, and
    /// while one session is replaced by another.
    ///
    /// **Assertion**: a late reply never revives a cancelled session or
    /// overwrites a newer one.
    async fn run_stale_route(&self, world: &mut SimWorld, export: &mut SimExport) -> Outcome {
        let home = world.config.home;
        let park = self.poi(world, "Grand Park", 1_500.0);
        let museum = self.poi(world, "City Museum", 3_000.0);

        // Phase 1: cancel with three requests outstanding
        world.router.hold();
        world
            .tracker
            .start_navigation(NavigationTarget::Poi(park.clone()))
            .map_err(|e| e.to_string())?;
        for i in 1..=2 {
            // No settle while held: the replies cannot arrive yet
            world.context.advance_time(world.config.tracker.motion.interval);
            world
                .tracker
                .on_local_position(offset_north(home, 20.0 * i as f64))
                .map_err(|e| e.to_string())?;
        }
        ensure(world.tracker.in_flight() == 3, || format!("{} requests in flight", world.tracker.in_flight()))?;
        // Let the fetches reach the router and park on the hold
        tokio::task::yield_now().await;

        world.tracker.cancel_navigation();
        world.router.release();
        world.settle().await;
        export.add_frame(world.frame());

        ensure(
            world.tracker.navigation().state() == NavState::Idle && world.tracker.navigation().route().is_none(),
            || "late reply revived a cancelled session".to_string(),
        )?;

        // Phase 2: replace one session with another before its reply lands
        world.router.hold();
        world
            .tracker
            .start_navigation(NavigationTarget::Poi(park))
            .map_err(|e| e.to_string())?;
        world
            .tracker
            .start_navigation(NavigationTarget::Poi(museum.clone()))
            .map_err(|e| e.to_string())?;
        world.router.release();
        world.settle().await;
        self.step(world, export).await;

        let navigation = world.tracker.navigation();
        let local = world.local().map(|e| e.coord).unwrap_or(home);
        let remaining = navigation.route().map(|r| r.distance).unwrap_or_default();
        ensure(navigation.state() == NavState::Active, || "replacement session not active".to_string())?;
        ensure(navigation.target().map(|t| t.name()) == Some(museum.name.as_str()), || {
            "session target changed".to_string()
        })?;
        ensure((remaining - distance_meters(local, museum.coord)).abs() < 1.0, || {
            format!("applied route is {remaining:.0} m, not the museum route")
        })?;
        ensure(world.speech.spoken().is_empty(), || "stale route produced speech".to_string())
    }

    /// The routing provider is down when navigation starts.
    ///
    /// **Assertion**: one error notification, engine idle, no automatic
    /// retry; a later session works once the provider recovers.
    async fn run_outage(&self, world: &mut SimWorld, export: &mut SimExport) -> Outcome {
        let home = world.config.home;
        let park = self.poi(world, "Grand Park", 1_500.0);

        world.router.outage();
        world
            .tracker
            .start_navigation(NavigationTarget::Poi(park.clone()))
            .map_err(|e| e.to_string())?;
        world.settle().await;

        for i in 1..=3 {
            self.step(world, export).await;
            world
                .move_local(offset_north(home, 30.0 * i as f64))
                .await
                .map_err(|e| e.to_string())?;
        }

        ensure(world.count("navigation-failed") == 1, || {
            format!("{} failure events", world.count("navigation-failed"))
        })?;
        ensure(world.sink.count_titled("Navigation Error") == 1, || {
            "expected exactly one navigation error notification".to_string()
        })?;
        ensure(world.router.requests() == 1, || format!("{} requests, expected no retry", world.router.requests()))?;
        ensure(
            world.tracker.navigation().state() == NavState::Idle
                && world.tracker.navigation().last_outcome() == Some(SessionOutcome::Failed),
            || "engine not idle after failure".to_string(),
        )?;

        world.router.recover();
        world
            .tracker
            .start_navigation(NavigationTarget::Poi(park))
            .map_err(|e| e.to_string())?;
        world.settle().await;
        export.add_frame(world.frame());
        ensure(world.tracker.navigation().state() == NavState::Active, || {
            "navigation did not recover".to_string()
        })
    }
}
