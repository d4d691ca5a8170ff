//! Statistics collection: event types, the collector, and the end-of-run report

pub mod alpide_stats;
pub mod stats_collector;
pub mod stats_report;

use std::borrow::Cow;

use crate::stats::alpide_stats::{ReadoutFlagStats, WordCountStats};

/// Statistics and status events sent from the simulation to the controller
/// through a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum StatType {
    /// A trigger arrived on the control channel (time in ns)
    TriggerReceived(u64),
    /// A trigger opened a new multi event buffer
    TriggerAccepted(u64),
    /// A trigger was rejected (strobe active, or no free buffer in triggered mode)
    TriggerRejected(u64),
    /// A trigger found no free multi event buffer
    BusyViolation(u64),
    /// Continuous mode force-dropped the oldest multi event buffer
    FlushedIncomplete(u64),
    /// A trigger extended the active strobe window
    StrobeExtended(u64),
    /// The chip asserted busy
    BusyOn(u64),
    /// The chip deasserted busy
    BusyOff(u64),
    /// The chip entered readout abort (data overrun)
    ReadoutAbort(u64),
    /// The chip left readout abort
    ReadoutAbortCleared(u64),
    /// The chip hit a frame FIFO overflow and latched fatal mode
    FatalMode(u64),
    /// The matrix readout of one frame completed
    FrameReadOut(u64),
    /// A recoverable error message
    Error(Cow<'static, str>),
    /// An unrecoverable error message; the run should stop
    Fatal(Cow<'static, str>),
    /// End-of-run multi event buffer histogram: `(buffers in use, total ns)`
    MebHistogram(Vec<(usize, u64)>),
    /// End-of-run count of hits latched into a multi event buffer
    LatchedPixelHits(u64),
    /// End-of-run count of hits discarded as in-buffer duplicates
    DuplicatePixelHits(u64),
    /// End-of-run pixel readout histogram: `(times read out, number of pixels)`
    PixelReadoutCounts(Vec<(u32, u64)>),
    /// Word counts observed on the serial stream
    AlpideWordStats(WordCountStats),
    /// Chip trailer readout flag counts observed on the serial stream
    AlpideReadoutFlagStats(ReadoutFlagStats),
    /// The cycle loop finished
    RunCompleted {
        /// Clock cycles simulated
        cycles: u64,
        /// Simulated time in ns
        sim_time_ns: u64,
    },
}
