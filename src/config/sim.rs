//! Options controlling the simulation run

/// Access to the simulation schedule options of a config
pub trait SimOpt {
    /// Number of 40 MHz clock cycles to simulate
    fn cycles(&self) -> u64;
    /// Period between triggers in nanoseconds
    fn trigger_period_ns(&self) -> u64;
    /// Number of triggers to send
    fn num_triggers(&self) -> u64;
    /// Pixel hits injected per trigger
    fn hits_per_trigger(&self) -> usize;
}
