//! Persistence of tracker state over an opaque key-value store.
//!
//! Two keys are used: `locations` holds every entity (live coordinate,
//! battery, heading and history) and `settings` holds the safe zones of
//! each user. Values are JSON.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::warn;
use waypoint_env::{EntityId, EnvError, KeyValueStore};

use crate::error::TrackerError;
use crate::model::{Entity, SafeZone};

pub const LOCATIONS_KEY: &str = "locations";
pub const SETTINGS_KEY: &str = "settings";

/// Per-user settings entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub user: EntityId,
    pub safe_zones: Vec<SafeZone>,
}

/// Typed JSON layer over a [`KeyValueStore`].
pub struct TrackerStore<S: KeyValueStore> {
    inner: S,
}

impl<S: KeyValueStore> TrackerStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
    
    /// Reads `key`, falling back to `default` when it is absent or unreadable.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.inner.get(key) {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => value,
                Err(e) => {
                    warn!(key, error = %e, "discarding unreadable stored value");
                    default
                }
            },
            Ok(None) => default,
            Err(e) => {
                warn!(key, error = %e, "store read failed");
                default
            }
        }
    }
    
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), TrackerError> {
        let bytes = serde_json::to_vec(value)?;
        self.inner.put(key, &bytes)?;
        Ok(())
    }
    
    pub fn load_locations(&self) -> Vec<Entity> {
        self.get_or(LOCATIONS_KEY, Vec::new())
    }
    
    pub fn save_locations<'a>(&self, entities: impl IntoIterator<Item = &'a Entity>) -> Result<(), TrackerError> {
        let entities: Vec<&Entity> = entities.into_iter().collect();
        self.put(LOCATIONS_KEY, &entities)
    }
    
    /// Safe zones stored for `user`, empty if none.
    pub fn load_zones(&self, user: &EntityId) -> Vec<SafeZone> {
        self.get_or::<Vec<UserSettings>>(SETTINGS_KEY, Vec::new())
            .into_iter()
            .find(|s| s.user == *user)
            .map(|s| s.safe_zones)
            .unwrap_or_default()
    }
    
    /// Replaces `user`'s safe zones, leaving other users untouched.
    pub fn save_zones(&self, user: EntityId, zones: &[SafeZone]) -> Result<(), TrackerError> {
        let mut settings: Vec<UserSettings> = self.get_or(SETTINGS_KEY, Vec::new());
        match settings.iter_mut().find(|s| s.user == user) {
            Some(entry) => entry.safe_zones = zones.to_vec(),
            None => settings.push(UserSettings {
                user,
                safe_zones: zones.to_vec(),
            }),
        }
        self.put(SETTINGS_KEY, &settings)
    }
}

/// Durable store on an embedded sled database.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TrackerError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }
    
    /// Temporary database removed on drop (for testing)
    pub fn open_temp() -> Result<Self, TrackerError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }
}

impl KeyValueStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, EnvError> {
        let value = self
            .db
            .get(key)
            .map_err(|e| EnvError::storage(format!("read failed: {e}")))?;
        Ok(value.map(|v| v.to_vec()))
    }
    
    fn put(&self, key: &str, value: &[u8]) -> Result<(), EnvError> {
        self.db
            .insert(key, value)
            .map_err(|e| EnvError::storage(format!("insert failed: {e}")))?;
        self.db
            .flush()
            .map_err(|e| EnvError::storage(format!("flush failed: {e}")))?;
        Ok(())
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, EnvError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| EnvError::storage("memory store poisoned"))?;
        Ok(entries.get(key).cloned())
    }
    
    fn put(&self, key: &str, value: &[u8]) -> Result<(), EnvError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| EnvError::storage("memory store poisoned"))?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HistoryPoint, ZoneId};
    use waypoint_env::{Coordinate, Timestamp};
    
    fn jane() -> Entity {
        let history = vec![
            HistoryPoint {
                coord: Coordinate::new(34.0522, -118.2437),
                timestamp: Timestamp::from_millis(1_704_067_200_123),
            },
            HistoryPoint {
                coord: Coordinate::new(34.0530, -118.2440),
                timestamp: Timestamp::from_millis(1_704_067_500_999),
            },
        ];
        Entity::new(EntityId::from_seed(2), "Jane", Coordinate::new(34.0530, -118.2440), 64).with_history(history)
    }
    
    #[test]
    fn test_locations_round_trip_exactly() {
        let store = TrackerStore::new(SledStore::open_temp().unwrap());
        let mut entity = jane();
        entity.set_heading(275.5);
        
        store.save_locations([&entity]).unwrap();
        let loaded = store.load_locations();
        
        assert_eq!(loaded, vec![entity.clone()]);
        assert_eq!(loaded[0].history()[0].timestamp.as_millis(), 1_704_067_200_123);
    }
    
    #[test]
    fn test_get_or_defaults() {
        let store = TrackerStore::new(MemoryStore::new());
        assert!(store.load_locations().is_empty());
        assert_eq!(store.get_or("missing", 7u32), 7);
        
        store.inner.put("garbage", b"{not json").unwrap();
        assert_eq!(store.get_or("garbage", 3u32), 3);
    }
    
    #[test]
    fn test_zones_are_per_user() {
        let store = TrackerStore::new(MemoryStore::new());
        let me = EntityId::from_seed(1);
        let other = EntityId::from_seed(9);
        let zone = SafeZone {
            id: ZoneId::new(),
            name: "Home".into(),
            center: Coordinate::new(34.0522, -118.2437),
            radius: 100.0,
            color: "rgba(10, 20, 30, 0.3)".into(),
        };
        
        store.save_zones(me, &[zone.clone()]).unwrap();
        store.save_zones(other, &[]).unwrap();
        
        assert_eq!(store.load_zones(&me), vec![zone]);
        assert!(store.load_zones(&other).is_empty());
        assert!(store.load_zones(&EntityId::from_seed(5)).is_empty());
    }
}
