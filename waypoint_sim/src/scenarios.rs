//! Simulation scenarios.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Members random-walk around home: sampling and geofence edges
    Wander,
    
    /// Members start just above the low-battery threshold and drain
    BatteryDrain,
    
    /// Local user drives a scripted route to a point of interest
    Commute,
    
    /// Navigation cancelled while route replies are held back
    StaleRoute,
    
    /// Routing provider down for the whole session
    Outage,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Wander,
            ScenarioId::BatteryDrain,
            ScenarioId::Commute,
            ScenarioId::StaleRoute,
            ScenarioId::Outage,
        ]
    }
    
    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Wander => "wander",
            ScenarioId::BatteryDrain => "battery_drain",
            ScenarioId::Commute => "commute",
            ScenarioId::StaleRoute => "stale_route",
            ScenarioId::Outage => "outage",
        }
    }
    
    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Wander => "Random walk around a home zone; history sampling and enter/leave edges",
            ScenarioId::BatteryDrain => "Batteries drain across 20%; one alert per crossing",
            ScenarioId::Commute => "Drive to a point of interest; every instruction spoken once, then arrival",
            ScenarioId::StaleRoute => "Cancel with route requests outstanding; late replies are dropped",
            ScenarioId::Outage => "Provider failure; a single error notification and an idle engine",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;
    
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "wander" => Ok(ScenarioId::Wander),
            "battery_drain" | "batterydrain" | "battery" => Ok(ScenarioId::BatteryDrain),
            "commute" => Ok(ScenarioId::Commute),
            "stale_route" | "staleroute" | "stale" => Ok(ScenarioId::StaleRoute),
            "outage" => Ok(ScenarioId::Outage),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
