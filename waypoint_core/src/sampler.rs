//! Adaptive history sampling.
//!
//! Every fix updates the live coordinate, but only some become durable
//! history points: large jumps are recorded immediately, small drifts only
//! once they have been sustained for a while. Jitter below both thresholds
//! never reaches the history.

use std::time::Duration;
use tracing::trace;
use waypoint_env::{Coordinate, Timestamp};

use crate::geo_math::distance_meters;
use crate::model::Entity;

/// Thresholds for recording a history point.
#[derive(Debug, Clone)]
pub struct SamplingPolicy {
    /// Movement that is always recorded (default: 100 m)
    pub large_move_m: f64,
    
    /// Movement recorded once `drift_interval` has passed (default: 25 m)
    pub drift_move_m: f64,
    
    /// Minimum age of the last point for a drift to count (default: 5 min)
    pub drift_interval: Duration,
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self {
            large_move_m: 100.0,
            drift_move_m: 25.0,
            drift_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// What a sample did to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// Live coordinate updated and a history point appended
    Recorded,
    
    /// Only the live coordinate changed
    LiveOnly,
}

/// Applies a [`SamplingPolicy`] to incoming fixes.
#[derive(Debug, Clone, Default)]
pub struct LocationSampler {
    policy: SamplingPolicy,
}

impl LocationSampler {
    pub fn new(policy: SamplingPolicy) -> Self {
        Self { policy }
    }
    
    pub fn policy(&self) -> &SamplingPolicy {
        &self.policy
    }
    
    /// Decides whether a move from `last` to `next` after `elapsed` is recorded.
    pub fn should_record(&self, last: Coordinate, next: Coordinate, elapsed: Duration) -> bool {
        let d = distance_meters(last, next);
        d > self.policy.large_move_m
            || (d > self.policy.drift_move_m && elapsed > self.policy.drift_interval)
    }
    
    /// Feeds a fix into `entity`.
    ///
    /// The live coordinate is always replaced; history grows only when the
    /// policy says so (or when it is empty).
    pub fn sample(&self, entity: &mut Entity, coord: Coordinate, now: Timestamp) -> SampleOutcome {
        let record = match entity.last_point() {
            None => true,
            Some(last) => self.should_record(last.coord, coord, now.elapsed_since(last.timestamp)),
        };
        
        entity.coord = coord;
        
        if record {
            entity.push_history(coord, now);
            trace!(entity = %entity.id, points = entity.history().len(), "history point recorded");
            SampleOutcome::Recorded
        } else {
            SampleOutcome::LiveOnly
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_math::offset_north;
    use waypoint_env::EntityId;
    
    const T0: i64 = 1_704_067_200_000;
    
    fn primed_entity() -> (Entity, Coordinate) {
        let start = Coordinate::new(34.0522, -118.2437);
        let mut entity = Entity::new(EntityId::from_seed(1), "Jane", start, 80);
        let sampler = LocationSampler::default();
        assert_eq!(sampler.sample(&mut entity, start, Timestamp::from_millis(T0)), SampleOutcome::Recorded);
        (entity, start)
    }
    
    #[test]
    fn test_first_fix_is_always_recorded() {
        let start = Coordinate::new(34.0522, -118.2437);
        let mut entity = Entity::new(EntityId::from_seed(1), "Jane", start, 80);
        let sampler = LocationSampler::default();
        
        let outcome = sampler.sample(&mut entity, start, Timestamp::from_millis(T0));
        assert_eq!(outcome, SampleOutcome::Recorded);
        assert_eq!(entity.history().len(), 1);
    }
    
    #[test]
    fn test_small_move_short_time_updates_live_only() {
        let (mut entity, start) = primed_entity();
        let sampler = LocationSampler::default();
        let next = offset_north(start, 30.0);
        
        let outcome = sampler.sample(&mut entity, next, Timestamp::from_millis(T0 + 2 * 60_000));
        
        assert_eq!(outcome, SampleOutcome::LiveOnly);
        assert_eq!(entity.history().len(), 1);
        assert_eq!(entity.coord, next);
    }
    
    #[test]
    fn test_large_move_is_recorded_immediately() {
        let (mut entity, start) = primed_entity();
        let sampler = LocationSampler::default();
        let next = offset_north(start, 150.0);
        
        let outcome = sampler.sample(&mut entity, next, Timestamp::from_millis(T0 + 1_000));
        
        assert_eq!(outcome, SampleOutcome::Recorded);
        assert_eq!(entity.history().len(), 2);
        assert_eq!(entity.last_point().unwrap().coord, next);
    }
    
    #[test]
    fn test_slow_drift_is_recorded_after_interval() {
        let (mut entity, start) = primed_entity();
        let sampler = LocationSampler::default();
        let next = offset_north(start, 30.0);
        
        let outcome = sampler.sample(&mut entity, next, Timestamp::from_millis(T0 + 6 * 60_000));
        
        assert_eq!(outcome, SampleOutcome::Recorded);
        assert_eq!(entity.history().len(), 2);
    }
    
    #[test]
    fn test_jitter_never_recorded() {
        let (mut entity, start) = primed_entity();
        let sampler = LocationSampler::default();
        let next = offset_north(start, 10.0);
        
        let outcome = sampler.sample(&mut entity, next, Timestamp::from_millis(T0 + 60 * 60_000));
        assert_eq!(outcome, SampleOutcome::LiveOnly);
    }
    
    #[test]
    fn test_drift_measured_from_last_point_not_live_coord() {
        let (mut entity, start) = primed_entity();
        let sampler = LocationSampler::default();
        
        // Three 60 m hops; each is < 100 m from the live coordinate
        // but the second already puts us > 100 m from the last point.
        assert_eq!(sampler.sample(&mut entity, offset_north(start, 60.0), Timestamp::from_millis(T0 + 1_000)), SampleOutcome::LiveOnly);
        assert_eq!(sampler.sample(&mut entity, offset_north(start, 120.0), Timestamp::from_millis(T0 + 2_000)), SampleOutcome::Recorded);
    }
}
