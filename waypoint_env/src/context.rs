//! Core environment context trait for Waypoint trackers.

use async_trait::async_trait;
use rand::RngCore;
use std::future::Future;
use std::time::{Duration, SystemTime};

use crate::types::Timestamp;

/// The central interface for Environment Interaction.
///
/// This trait abstracts the "real world" so that the Waypoint engines can run
/// both against a live device (tokio) and inside the deterministic simulator.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`, thread RNG
/// - **Simulation**: `SimContext` - virtual clock, `ChaCha8Rng(seed)`
///
/// # Determinism
///
/// Every source of non-determinism the engines touch (time, randomness)
/// goes through this trait, so a simulation run is fully described by its seed.
#[async_trait]
pub trait WaypointContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Used for timers (motion cadence, notification expiry).
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;
    
    /// Returns the wall-clock time used for history timestamps.
    ///
    /// In simulation, this is derived from virtual clock + epoch offset.
    fn system_time(&self) -> SystemTime;
    
    /// Returns the wall-clock time as Unix milliseconds.
    fn timestamp(&self) -> Timestamp {
        Timestamp::from_system_time(self.system_time())
    }
    
    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances virtual clock
    async fn sleep(&self, duration: Duration);
    
    /// Spawns a background task.
    ///
    /// Route fetches run through here so they can be in flight while the
    /// tracker keeps processing position updates.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
    
    /// Draws 64 uniformly random bits.
    ///
    /// The single injectable randomness source. Production draws from the
    /// thread RNG, simulation from the seeded stream.
    fn random_u64(&self) -> u64;
    
    /// Draws a uniformly distributed value in `[0, 1)`.
    fn random_unit(&self) -> f64 {
        // 53 high bits -> exact f64 mantissa
        (self.random_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }
    
    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    /// In simulation, returns the master seed.
    fn seed(&self) -> u64;
}

/// Adapts a context's randomness to [`rand::RngCore`], so engines can take
/// any `Rng` and still draw from the seeded stream in simulation.
pub struct ContextRng<'a, C>(pub &'a C);

impl<C: WaypointContext> RngCore for ContextRng<'_, C> {
    fn next_u32(&mut self) -> u32 {
        (self.0.random_u64() >> 32) as u32
    }
    
    fn next_u64(&mut self) -> u64 {
        self.0.random_u64()
    }
    
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.0.random_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
    
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
