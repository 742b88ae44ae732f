//! Tracked entities, their location history, and the observing user's safe zones.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use waypoint_env::{Coordinate, EntityId, Timestamp};

use crate::geo_math::distance_meters;

// ============================================================================
// ENTITIES
// ============================================================================

/// A durable point in an entity's location history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub coord: Coordinate,
    pub timestamp: Timestamp,
}

/// A tracked person or device.
///
/// The tracker owns only the location and battery fields; the entity itself
/// is created and destroyed by membership changes outside the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    
    pub name: String,
    
    /// Live position, always the most recent fix
    pub coord: Coordinate,
    
    /// Battery percent (0-100)
    pub battery: u8,
    
    /// Append-only, ordered by insertion
    history: Vec<HistoryPoint>,
    
    /// Compass heading in degrees [0, 360)
    pub heading: Option<f64>,
    
    /// True only for the user whose position comes from a real sensor
    pub is_local: bool,
    
    /// Whether this entity currently shares its location
    pub location_sharing: bool,
}

impl Entity {
    /// Creates a remote (non-local) entity with sharing enabled and empty history.
    pub fn new(id: EntityId, name: impl Into<String>, coord: Coordinate, battery: u8) -> Self {
        Self {
            id,
            name: name.into(),
            coord,
            battery: battery.min(100),
            history: Vec::new(),
            heading: None,
            is_local: false,
            location_sharing: true,
        }
    }
    
    /// Marks this entity as the locally tracked user.
    pub fn local(mut self) -> Self {
        self.is_local = true;
        self
    }
    
    /// Restores previously persisted history.
    pub fn with_history(mut self, history: Vec<HistoryPoint>) -> Self {
        self.history = history;
        self
    }
    
    pub fn history(&self) -> &[HistoryPoint] {
        &self.history
    }
    
    pub fn last_point(&self) -> Option<&HistoryPoint> {
        self.history.last()
    }
    
    /// Appends a history point. Timestamps never go backwards: a point older
    /// than the current tail is stamped with the tail's timestamp.
    pub(crate) fn push_history(&mut self, coord: Coordinate, timestamp: Timestamp) {
        let timestamp = match self.history.last() {
            Some(last) if last.timestamp > timestamp => last.timestamp,
            _ => timestamp,
        };
        self.history.push(HistoryPoint { coord, timestamp });
    }
    
    /// Explicit, externally triggered wipe; the only way history shrinks.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }
    
    /// Sets the heading, normalized into [0, 360).
    pub fn set_heading(&mut self, degrees: f64) {
        if degrees.is_finite() {
            self.heading = Some(degrees.rem_euclid(360.0));
        }
    }
    
    pub fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            id: self.id,
            name: self.name.clone(),
            coord: self.coord,
            battery: self.battery,
            is_local: self.is_local,
        }
    }
}

/// Immutable per-tick projection of an entity, as seen by the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub name: String,
    pub coord: Coordinate,
    pub battery: u8,
    pub is_local: bool,
}

/// Owned collection of tracked entities, indexed by id.
///
/// BTreeMap keeps iteration order stable so seeded simulations replay exactly.
#[derive(Debug, Clone, Default)]
pub struct EntityRoster {
    entities: BTreeMap<EntityId, Entity>,
}

impl EntityRoster {
    pub fn new() -> Self {
        Self::default()
    }
    
    /// Adds an entity; returns false (and keeps the existing one) if the id is known.
    pub fn admit(&mut self, entity: Entity) -> bool {
        if self.entities.contains_key(&entity.id) {
            return false;
        }
        self.entities.insert(entity.id, entity);
        true
    }
    
    pub fn remove(&mut self, id: &EntityId) -> Option<Entity> {
        self.entities.remove(id)
    }
    
    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }
    
    pub fn get_mut(&mut self, id: &EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }
    
    /// The locally tracked user, if one is on the roster.
    pub fn local(&self) -> Option<&Entity> {
        self.entities.values().find(|e| e.is_local)
    }
    
    pub fn local_mut(&mut self) -> Option<&mut Entity> {
        self.entities.values_mut().find(|e| e.is_local)
    }
    
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }
    
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }
    
    pub fn len(&self) -> usize {
        self.entities.len()
    }
    
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
    
    pub fn snapshot(&self) -> Vec<EntitySnapshot> {
        self.entities.values().map(Entity::snapshot).collect()
    }
}

// ============================================================================
// SAFE ZONES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZoneId(pub Uuid);

impl ZoneId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "zone_{}", &self.0.simple().to_string()[..8])
    }
}

impl Default for ZoneId {
    fn default() -> Self {
        Self::new()
    }
}

/// A named circular region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafeZone {
    pub id: ZoneId,
    pub name: String,
    pub center: Coordinate,
    
    /// Meters
    pub radius: f64,
    
    /// CSS colour used when drawing the zone
    pub color: String,
}

impl SafeZone {
    /// True when `coord` is within (or exactly on) the zone boundary.
    pub fn contains(&self, coord: Coordinate) -> bool {
        distance_meters(coord, self.center) <= self.radius
    }
}

/// The observing user's safe zones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneBook {
    zones: Vec<SafeZone>,
}

impl ZoneBook {
    pub fn new() -> Self {
        Self::default()
    }
    
    pub fn from_zones(zones: Vec<SafeZone>) -> Self {
        Self { zones }
    }
    
    pub fn add(&mut self, zone: SafeZone) {
        self.zones.push(zone);
    }
    
    /// Creates a zone at `center` with a random translucent colour.
    pub fn add_at<R: Rng + ?Sized>(
        &mut self,
        name: impl Into<String>,
        center: Coordinate,
        radius: f64,
        rng: &mut R,
    ) -> ZoneId {
        let color = format!(
            "rgba({}, {}, {}, 0.3)",
            rng.gen_range(0..200),
            rng.gen_range(0..200),
            rng.gen_range(0..200)
        );
        let id = ZoneId(uuid::Builder::from_random_bytes(rng.gen()).into_uuid());
        let zone = SafeZone {
            id,
            name: name.into(),
            center,
            radius: radius.max(0.0),
            color,
        };
        self.zones.push(zone);
        id
    }
    
    /// Replaces the zone with the same id; false if none matched.
    pub fn update(&mut self, zone: SafeZone) -> bool {
        match self.zones.iter_mut().find(|z| z.id == zone.id) {
            Some(existing) => {
                *existing = zone;
                true
            }
            None => false,
        }
    }
    
    pub fn delete(&mut self, id: &ZoneId) -> Option<SafeZone> {
        let index = self.zones.iter().position(|z| z.id == *id)?;
        Some(self.zones.remove(index))
    }
    
    pub fn get(&self, id: &ZoneId) -> Option<&SafeZone> {
        self.zones.iter().find(|z| z.id == *id)
    }
    
    pub fn iter(&self) -> impl Iterator<Item = &SafeZone> {
        self.zones.iter()
    }
    
    pub fn as_slice(&self) -> &[SafeZone] {
        &self.zones
    }
    
    pub fn len(&self) -> usize {
        self.zones.len()
    }
    
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}
