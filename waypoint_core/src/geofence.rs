//! Edge-triggered geofence and battery detection.
//!
//! The detector compares two consecutive snapshot sets. An event fires only
//! on the tick where a condition flips; a condition that holds for many
//! ticks is reported once.
//!
//! The previous snapshot is replaced only after a full detection pass, so
//! every edge between two observed snapshot sets is reported exactly once no
//! matter how many raw updates were folded into the newer set.

use std::collections::HashMap;
use tracing::debug;
use waypoint_env::EntityId;

use crate::events::TrackerEvent;
use crate::model::{EntitySnapshot, SafeZone};

/// Thresholds for the vitals checks.
#[derive(Debug, Clone)]
pub struct VitalsConfig {
    /// Battery percent at or below which an entity is "low" (default: 20)
    pub low_battery_percent: u8,
}

impl Default for VitalsConfig {
    fn default() -> Self {
        Self {
            low_battery_percent: 20,
        }
    }
}

/// Diffs `previous` against `current` for every non-local entity present in both.
///
/// Pure; callers that want the detector to remember the last set use
/// [`VitalsDetector`].
pub fn detect_transitions(
    previous: &HashMap<EntityId, EntitySnapshot>,
    current: &[EntitySnapshot],
    zones: &[SafeZone],
    config: &VitalsConfig,
) -> Vec<TrackerEvent> {
    let mut events = Vec::new();
    
    for now in current {
        if now.is_local {
            continue;
        }
        let Some(before) = previous.get(&now.id) else {
            continue;
        };
        
        for zone in zones {
            let was_inside = zone.contains(before.coord);
            let is_inside = zone.contains(now.coord);
            
            match (was_inside, is_inside) {
                (false, true) => events.push(TrackerEvent::GeofenceEnter {
                    entity: now.id,
                    entity_name: now.name.clone(),
                    zone: zone.id,
                    zone_name: zone.name.clone(),
                }),
                (true, false) => events.push(TrackerEvent::GeofenceLeave {
                    entity: now.id,
                    entity_name: now.name.clone(),
                    zone: zone.id,
                    zone_name: zone.name.clone(),
                }),
                _ => {}
            }
        }
        
        let threshold = config.low_battery_percent;
        if before.battery > threshold && now.battery <= threshold {
            events.push(TrackerEvent::LowBattery {
                entity: now.id,
                entity_name: now.name.clone(),
                level: now.battery,
            });
        }
    }
    
    events
}

/// Detector that owns its last-seen snapshot map.
#[derive(Debug, Clone, Default)]
pub struct VitalsDetector {
    config: VitalsConfig,
    previous: HashMap<EntityId, EntitySnapshot>,
}

impl VitalsDetector {
    pub fn new(config: VitalsConfig) -> Self {
        Self {
            config,
            previous: HashMap::new(),
        }
    }
    
    /// Runs one detection pass and then adopts `current` as the new baseline.
    ///
    /// The first pass for an entity only primes the baseline. Entities
    /// missing from `current` drop out of the baseline.
    pub fn observe(&mut self, current: &[EntitySnapshot], zones: &[SafeZone]) -> Vec<TrackerEvent> {
        let events = detect_transitions(&self.previous, current, zones, &self.config);
        
        for event in &events {
            debug!(kind = event.label(), "vitals event");
        }
        
        self.previous = current.iter().map(|s| (s.id, s.clone())).collect();
        events
    }
    
    /// Forgets an entity so that its next appearance only primes the baseline.
    pub fn forget(&mut self, id: &EntityId) {
        self.previous.remove(id);
    }
    
    pub fn baseline(&self) -> &HashMap<EntityId, EntitySnapshot> {
        &self.previous
    }
}
