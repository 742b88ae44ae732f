//! "Find device": makes one member's phone play a sound for a fixed time.

use std::time::Duration;
use tracing::debug;
use waypoint_env::EntityId;

use crate::error::TrackerError;

pub const DEFAULT_RING_DURATION: Duration = Duration::from_secs(10);

/// Rings at most one device at a time.
#[derive(Debug, Clone)]
pub struct DeviceRinger {
    duration: Duration,
    ringing: Option<(EntityId, Duration)>,
}

impl Default for DeviceRinger {
    fn default() -> Self {
        Self::new(DEFAULT_RING_DURATION)
    }
}

impl DeviceRinger {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            ringing: None,
        }
    }
    
    /// Starts ringing `id` at monotonic time `now`.
    ///
    /// Fails while another (or the same) device is still ringing.
    pub fn ring(&mut self, id: EntityId, now: Duration) -> Result<(), TrackerError> {
        self.tick(now);
        if let Some((current, _)) = self.ringing {
            return Err(TrackerError::AlreadyRinging(current));
        }
        debug!(entity = %id, "ringing device");
        self.ringing = Some((id, now + self.duration));
        Ok(())
    }
    
    /// Stops the ring once its time is up; returns the device that went quiet.
    pub fn tick(&mut self, now: Duration) -> Option<EntityId> {
        match self.ringing {
            Some((id, until)) if now >= until => {
                self.ringing = None;
                Some(id)
            }
            _ => None,
        }
    }
    
    pub fn ringing(&self) -> Option<EntityId> {
        self.ringing.map(|(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_one_device_at_a_time() {
        let mut ringer = DeviceRinger::default();
        let jane = EntityId::from_seed(2);
        let leo = EntityId::from_seed(3);
        
        ringer.ring(jane, Duration::ZERO).unwrap();
        assert!(matches!(
            ringer.ring(leo, Duration::from_secs(4)),
            Err(TrackerError::AlreadyRinging(id)) if id == jane
        ));
        assert_eq!(ringer.ringing(), Some(jane));
    }
    
    #[test]
    fn test_ring_stops_after_duration() {
        let mut ringer = DeviceRinger::default();
        let jane = EntityId::from_seed(2);
        
        ringer.ring(jane, Duration::from_secs(1)).unwrap();
        assert_eq!(ringer.tick(Duration::from_secs(10)), None);
        assert_eq!(ringer.tick(Duration::from_secs(11)), Some(jane));
        assert_eq!(ringer.ringing(), None);
        
        ringer.ring(EntityId::from_seed(3), Duration::from_secs(12)).unwrap();
    }
    
    #[test]
    fn test_ring_again_after_expiry_without_tick() {
        let mut ringer = DeviceRinger::new(Duration::from_secs(2));
        let jane = EntityId::from_seed(2);
        ringer.ring(jane, Duration::ZERO).unwrap();
        assert!(ringer.ring(jane, Duration::from_secs(2)).is_ok());
    }
}
