//! Synthetic motion for entities without a live feed.
//!
//! Each tick nudges every remote, sharing entity by a small bounded random
//! step, occasionally drains its battery, and routes the new position
//! through the [`LocationSampler`] exactly as a real fix would be.
//! Local entities are never touched: their position belongs to the sensor.

use rand::Rng;
use std::time::Duration;
use tracing::trace;
use waypoint_env::{Coordinate, EntityId, Timestamp};

use crate::model::EntityRoster;
use crate::sampler::{LocationSampler, SampleOutcome};

/// Random-walk parameters.
#[derive(Debug, Clone)]
pub struct MotionConfig {
    /// Tick cadence (default: 5 s)
    pub interval: Duration,
    
    /// Maximum per-axis step in degrees (default: 0.00075)
    pub max_step_deg: f64,
    
    /// Chance per tick of losing one battery percent (default: 0.3)
    pub battery_drain_probability: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_step_deg: 0.00075,
            battery_drain_probability: 0.3,
        }
    }
}

/// Per-entity result of one simulator tick.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionStep {
    pub id: EntityId,
    pub coord: Coordinate,
    pub battery: u8,
    pub outcome: SampleOutcome,
}

/// Drives entities that have no real position source.
#[derive(Debug, Clone, Default)]
pub struct MotionSimulator {
    config: MotionConfig,
}

impl MotionSimulator {
    pub fn new(config: MotionConfig) -> Self {
        Self { config }
    }
    
    pub fn config(&self) -> &MotionConfig {
        &self.config
    }
    
    /// Advances every eligible entity by one step.
    ///
    /// Eligible means `!is_local && location_sharing`. The RNG is injected so
    /// that simulation runs are reproducible from a seed.
    pub fn tick<R: Rng + ?Sized>(
        &self,
        roster: &mut EntityRoster,
        sampler: &LocationSampler,
        rng: &mut R,
        now: Timestamp,
    ) -> Vec<MotionStep> {
        let max = self.config.max_step_deg;
        let mut steps = Vec::new();
        
        for entity in roster.iter_mut() {
            if entity.is_local || !entity.location_sharing {
                continue;
            }
            
            let d_lat = rng.gen_range(-max..=max);
            let d_lng = rng.gen_range(-max..=max);
            let next = Coordinate::new(entity.coord.lat + d_lat, entity.coord.lng + d_lng).clamped();
            
            if rng.gen_bool(self.config.battery_drain_probability.clamp(0.0, 1.0)) {
                entity.battery = entity.battery.saturating_sub(1);
            }
            
            let outcome = sampler.sample(entity, next, now);
            trace!(entity = %entity.id, lat = next.lat, lng = next.lng, battery = entity.battery, "simulated step");
            
            steps.push(MotionStep {
                id: entity.id,
                coord: next,
                battery: entity.battery,
                outcome,
            });
        }
        
        steps
    }
}
