//! Per-tick performance metrics.
//!
//! [`TickMetrics`] mixes wall-clock timings for the most recent tick
//! with cumulative event counters since engine construction.

/// Timing and event metrics collected by the engine.
///
/// Durations are in microseconds and describe the most recent tick;
/// counters are cumulative.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickMetrics {
    /// Wall-clock time for the entire tick.
    pub total_us: u64,
    /// Time spent applying drained commands.
    pub command_us: u64,
    /// Time spent in plan upkeep and the signaling pass.
    pub signaling_us: u64,
    /// Time spent advancing positions and committing transitions.
    pub movement_us: u64,
    /// Trains on the layout after the tick.
    pub active_trains: usize,
    /// Cumulative admission denials.
    pub denials: u64,
    /// Cumulative replans (grace expiry, closed edges, retargets).
    pub replans: u64,
    /// Cumulative transitions into `Stuck`.
    pub stuck_transitions: u64,
    /// Cumulative trains spawned onto the layout.
    pub spawned: u64,
    /// Cumulative trains fully despawned.
    pub despawned: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        let m = TickMetrics::default();
        assert_eq!(m.total_us, 0);
        assert_eq!(m.denials, 0);
        assert_eq!(m.spawned, 0);
        assert_eq!(m.active_trains, 0);
    }
}
