//! JSON exporter for simulation runs.
//!
//! Exports per-tick frames (entity positions, navigation progress, events)
//! so a run can be replayed or plotted outside the simulator.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use waypoint_core::notify::NotificationDraft;
use waypoint_core::{Entity, NavState, TrackerEvent};

/// A single frame of simulation data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,
    
    pub entities: Vec<EntityFrame>,
    
    #[serde(skip_serializing_if = "Option::is_none")]
    pub navigation: Option<NavigationFrame>,
    
    /// Events published since the previous frame
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SimEvent>,
}

/// Position and vitals of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityFrame {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub battery: u8,
    pub history_len: usize,
    pub is_local: bool,
}

impl From<&Entity> for EntityFrame {
    fn from(entity: &Entity) -> Self {
        Self {
            id: entity.id.0.to_string(),
            name: entity.name.clone(),
            lat: entity.coord.lat,
            lng: entity.coord.lng,
            battery: entity.battery,
            history_len: entity.history().len(),
            is_local: entity.is_local,
        }
    }
}

/// Navigation progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationFrame {
    pub state: String,
    pub destination: Option<String>,
    pub step_index: usize,
    pub spoken: usize,
    
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_m: Option<f64>,
}

impl NavigationFrame {
    pub fn state_label(state: NavState) -> &'static str {
        match state {
            NavState::Idle => "idle",
            NavState::Requesting => "requesting",
            NavState::Active => "active",
        }
    }
}

/// Simulation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    pub kind: String,
    pub message: String,
}

impl From<&TrackerEvent> for SimEvent {
    fn from(event: &TrackerEvent) -> Self {
        Self {
            kind: event.label().to_string(),
            message: NotificationDraft::from(event).message,
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,
    
    /// Seed used
    pub seed: u64,
    
    /// Duration in seconds
    pub duration_sec: f64,
    
    /// All frames
    pub frames: Vec<SimFrame>,
    
    /// Final results
    pub passed: bool,
    
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }
    
    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }
    
    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }
    
    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_env::EntityId;
    
    #[test]
    fn test_event_message_uses_notification_text() {
        let event = TrackerEvent::LowBattery {
            entity: EntityId::from_seed(2),
            entity_name: "Jane".into(),
            level: 20,
        };
        let sim_event = SimEvent::from(&event);
        assert_eq!(sim_event.kind, "low-battery");
        assert_eq!(sim_event.message, "Jane's phone battery is at 20%.");
    }
    
    #[test]
    fn test_duration_tracks_last_frame() {
        let mut export = SimExport::new("wander", 7);
        for t in [5.0, 10.0] {
            export.add_frame(SimFrame {
                time_sec: t,
                entities: Vec::new(),
                navigation: None,
                events: Vec::new(),
            });
        }
        export.finalize(true, None);
        
        assert_eq!(export.duration_sec, 10.0);
        let json = serde_json::to_value(&export).unwrap();
        assert!(json.get("failure_reason").is_none());
        assert!(json["frames"][0].get("events").is_none());
    }
}
