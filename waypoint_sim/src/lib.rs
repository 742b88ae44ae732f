//! Waypoint Deterministic Simulation Testing (DST) Harness
//!
//! Runs the real `Tracker` against simulated collaborators so that every
//! scenario is reproducible from a single 64-bit seed.
//!
//! # Controlled Sources of Non-determinism
//!
//! - **Time**: virtual clock advanced explicitly by the harness
//! - **Randomness**: member placement, motion and battery drain all come from
//!   a ChaCha stream seeded by the master seed
//! - **Routing**: a scripted provider with injectable failures, outages and
//!   held replies
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │                     SimWorld                      │
//! │  ┌─────────────┐   ┌───────────────────────────┐  │
//! │  │ SimContext  │──►│         Tracker           │  │
//! │  │ (clock/rng) │   │ sampler ▸ detector ▸ nav  │  │
//! │  └─────────────┘   └──┬─────────┬─────────┬────┘  │
//! │              ┌────────▼──┐ ┌────▼────┐ ┌──▼─────┐ │
//! │              │ Scripted  │ │Recording│ │Recording│ │
//! │              │  Router   │ │ Speech  │ │  Sink  │ │
//! │              └───────────┘ └─────────┘ └────────┘ │
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use waypoint_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42, 4).run(ScenarioId::Commute);
//! assert!(result.passed);
//! ```

mod context;
mod exporter;
mod recorders;
mod routing;
mod runner;
mod world;
pub mod scenarios;

pub use context::SimContext;
pub use exporter::{EntityFrame, NavigationFrame, SimEvent, SimExport, SimFrame};
pub use recorders::{RecordingSink, RecordingSpeech};
pub use routing::ScriptedRouter;
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use world::{SimConfig, SimTracker, SimWorld};
