//! SimWorld - The simulation harness container.

use crate::context::SimContext;
use crate::exporter::{EntityFrame, NavigationFrame, SimEvent, SimFrame};
use crate::recorders::{RecordingSink, RecordingSpeech};
use crate::routing::ScriptedRouter;

use rand::Rng;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use waypoint_core::{
    Entity, MotionStep, SampleOutcome, Tracker, TrackerConfig, TrackerError, TrackerEvent, ZoneId,
};
use waypoint_env::{ContextRng, Coordinate, EntityId, WaypointContext};

pub type SimTracker = Tracker<SimContext, ScriptedRouter, RecordingSpeech, RecordingSink>;

const MEMBER_NAMES: [&str; 8] = ["Jane", "John", "Leo", "Mia", "Ava", "Noah", "Iris", "Omar"];

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,
    
    /// Remote members besides the local user
    pub members: usize,
    
    /// Local user's starting point and the home zone's center
    pub home: Coordinate,
    
    /// Home zone radius in meters
    pub zone_radius_m: f64,
    
    /// Members start uniformly within ±this many degrees of home
    pub scatter_deg: f64,
    
    /// Starting battery range for members
    pub battery: RangeInclusive<u8>,
    
    /// Maneuvers per scripted route
    pub route_steps: usize,
    
    pub tracker: TrackerConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            members: 4,
            home: Coordinate::new(34.0522, -118.2437),
            zone_radius_m: 150.0,
            scatter_deg: 0.002,
            battery: 40..=100,
            route_steps: 4,
            tracker: TrackerConfig::default(),
        }
    }
}

/// The SimWorld - a tracker wired to simulated collaborators.
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,
    
    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,
    
    pub router: Arc<ScriptedRouter>,
    pub speech: Arc<RecordingSpeech>,
    pub sink: Arc<RecordingSink>,
    pub tracker: SimTracker,
    
    pub local_id: EntityId,
    pub member_ids: Vec<EntityId>,
    pub home_zone: ZoneId,
    
    events: mpsc::UnboundedReceiver<TrackerEvent>,
    
    /// Every event published so far
    log: Vec<TrackerEvent>,
    
    /// Events not yet written into a frame
    unframed: Vec<TrackerEvent>,
    
    /// Current tick count
    tick_count: u64,
}

impl SimWorld {
    /// Creates a new SimWorld with the given configuration.
    pub fn new(config: SimConfig) -> Self {
        let context = SimContext::shared(config.seed);
        let router = Arc::new(ScriptedRouter::new(config.route_steps));
        let speech = Arc::new(RecordingSpeech::new());
        let sink = Arc::new(RecordingSink::new(true));
        
        let mut tracker = Tracker::new(
            Arc::clone(&context),
            Arc::clone(&router),
            Arc::clone(&speech),
            Arc::clone(&sink),
            config.tracker.clone(),
        );
        let events = tracker.subscribe();
        
        let local_id = EntityId::from_seed(0);
        tracker.admit_member(Entity::new(local_id, "You", config.home, 100).local());
        
        let mut member_ids = Vec::with_capacity(config.members);
        {
            let mut rng = ContextRng(context.as_ref());
            for i in 0..config.members {
                let id = EntityId::from_seed(i as u64 + 1);
                let name = MEMBER_NAMES[i % MEMBER_NAMES.len()];
                let coord = Coordinate::new(
                    config.home.lat + rng.gen_range(-config.scatter_deg..=config.scatter_deg),
                    config.home.lng + rng.gen_range(-config.scatter_deg..=config.scatter_deg),
                );
                let battery = rng.gen_range(config.battery.clone());
                tracker.admit_member(Entity::new(id, name, coord, battery));
                member_ids.push(id);
            }
        }
        
        let home_zone = tracker.add_zone("Home", config.home, config.zone_radius_m);
        debug!(seed = config.seed, members = config.members, "world created");
        
        let mut world = Self {
            config,
            context,
            router,
            speech,
            sink,
            tracker,
            local_id,
            member_ids,
            home_zone,
            events,
            log: Vec::new(),
            unframed: Vec::new(),
            tick_count: 0,
        };
        world.drain_events();
        world
    }
    
    /// Advances one motion interval and runs the motion simulator.
    pub async fn tick(&mut self) -> Vec<MotionStep> {
        self.context.advance_time(self.config.tracker.motion.interval);
        let steps = self.tracker.simulate_tick();
        self.settle().await;
        self.tick_count += 1;
        steps
    }
    
    /// Feeds a live fix for the local user and waits for route replies.
    pub async fn move_local(&mut self, coord: Coordinate) -> Result<SampleOutcome, TrackerError> {
        let outcome = self.tracker.on_local_position(coord);
        self.settle().await;
        outcome
    }
    
    /// Applies every outstanding route reply.
    pub async fn settle(&mut self) {
        self.tracker.settle().await;
        self.drain_events();
    }
    
    pub fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.unframed.push(event.clone());
            self.log.push(event);
        }
    }
    
    /// Every event published so far.
    pub fn events(&self) -> &[TrackerEvent] {
        &self.log
    }
    
    /// Number of logged events with the given label.
    pub fn count(&self, label: &str) -> usize {
        self.log.iter().filter(|e| e.label() == label).count()
    }
    
    /// Snapshot of the world for export.
    pub fn frame(&mut self) -> SimFrame {
        self.drain_events();
        let navigation = self.tracker.navigation();
        let nav_frame = navigation.target().map(|target| NavigationFrame {
            state: NavigationFrame::state_label(navigation.state()).to_string(),
            destination: Some(target.name().to_string()),
            step_index: navigation.step_index(),
            spoken: navigation.spoken_count(),
            remaining_m: navigation.route().map(|r| r.distance),
        });
        
        SimFrame {
            time_sec: self.time(),
            entities: self.tracker.roster().iter().map(EntityFrame::from).collect(),
            navigation: nav_frame,
            events: self.unframed.drain(..).map(|e| SimEvent::from(&e)).collect(),
        }
    }
    
    pub fn local(&self) -> Option<&Entity> {
        self.tracker.roster().local()
    }
    
    /// Returns the current simulation time in seconds.
    pub fn time(&self) -> f64 {
        self.context.now().as_secs_f64()
    }
    
    /// Returns the current tick count.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }
}
