//! Loop configuration.
//!
//! Tunables for the reactor itself. Embedding servers typically carry these
//! as a `[loop]` section in their TOML config file; the demo binary does.

use serde::Deserialize;

/// Reactor tunables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Capacity of the readiness event buffer handed to the OS multiplexer.
    pub event_capacity: usize,
    /// Floor applied to the poll timeout when a deadline has already passed,
    /// in milliseconds. Keeps an overdue timer from turning the wait into a
    /// busy spin.
    pub wait_floor_ms: i64,
    /// Upper bound on how long the loop sleeps with no timer pending, in
    /// milliseconds. Guarantees at least one wakeup per this interval even
    /// with zero timers registered.
    pub idle_ceiling_ms: i64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            event_capacity: 128,
            wait_floor_ms: 10,
            idle_ceiling_ms: 1000,
        }
    }
}
