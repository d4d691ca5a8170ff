//! Aggregation of the [StatType] events produced during a run

use serde::{Deserialize, Serialize};

use crate::stats::alpide_stats::{ReadoutFlagStats, WordCountStats};
use crate::stats::StatType;

/// Aggregated statistics of one simulation run
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsCollector {
    triggers_received: u64,
    triggers_accepted: u64,
    triggers_rejected: u64,
    busy_violations: u64,
    flushed_incomplete: u64,
    strobe_extensions: u64,
    busy_transitions: u64,
    readout_aborts: u64,
    fatal_mode: bool,
    frames_read_out: u64,
    errors: Vec<String>,
    fatal_error: Option<String>,
    meb_histogram: Vec<(usize, u64)>,
    latched_pixel_hits: u64,
    duplicate_pixel_hits: u64,
    pixel_readout_counts: Vec<(u32, u64)>,
    word_stats: Option<WordCountStats>,
    readout_flag_stats: Option<ReadoutFlagStats>,
    cycles: u64,
    sim_time_ns: u64,
    run_completed: bool,
}

impl StatsCollector {
    /// Fold one event into the aggregate
    pub fn collect(&mut self, stat: StatType) {
        match stat {
            StatType::TriggerReceived(_) => self.triggers_received += 1,
            StatType::TriggerAccepted(_) => self.triggers_accepted += 1,
            StatType::TriggerRejected(_) => self.triggers_rejected += 1,
            StatType::BusyViolation(_) => self.busy_violations += 1,
            StatType::FlushedIncomplete(_) => self.flushed_incomplete += 1,
            StatType::StrobeExtended(_) => self.strobe_extensions += 1,
            StatType::BusyOn(_) => self.busy_transitions += 1,
            StatType::BusyOff(_) => (),
            StatType::ReadoutAbort(_) => self.readout_aborts += 1,
            StatType::ReadoutAbortCleared(_) => (),
            StatType::FatalMode(_) => self.fatal_mode = true,
            StatType::FrameReadOut(_) => self.frames_read_out += 1,
            StatType::Error(msg) => self.errors.push(msg.into_owned()),
            StatType::Fatal(msg) => self.fatal_error = Some(msg.into_owned()),
            StatType::MebHistogram(histogram) => self.meb_histogram = histogram,
            StatType::LatchedPixelHits(count) => self.latched_pixel_hits = count,
            StatType::DuplicatePixelHits(count) => self.duplicate_pixel_hits = count,
            StatType::PixelReadoutCounts(counts) => self.pixel_readout_counts = counts,
            StatType::AlpideWordStats(stats) => self.word_stats = Some(stats),
            StatType::AlpideReadoutFlagStats(stats) => self.readout_flag_stats = Some(stats),
            StatType::RunCompleted {
                cycles,
                sim_time_ns,
            } => {
                self.cycles = cycles;
                self.sim_time_ns = sim_time_ns;
                self.run_completed = true;
            }
        }
    }

    /// Triggers received on the control channel
    pub fn triggers_received(&self) -> u64 {
        self.triggers_received
    }
    /// Triggers that opened a multi event buffer
    pub fn triggers_accepted(&self) -> u64 {
        self.triggers_accepted
    }
    /// Triggers rejected
    pub fn triggers_rejected(&self) -> u64 {
        self.triggers_rejected
    }
    /// Busy violations
    pub fn busy_violations(&self) -> u64 {
        self.busy_violations
    }
    /// Forced flushes of the oldest multi event buffer
    pub fn flushed_incomplete(&self) -> u64 {
        self.flushed_incomplete
    }
    /// Strobe extensions
    pub fn strobe_extensions(&self) -> u64 {
        self.strobe_extensions
    }
    /// Busy assertions
    pub fn busy_transitions(&self) -> u64 {
        self.busy_transitions
    }
    /// Times the chip entered readout abort
    pub fn readout_aborts(&self) -> u64 {
        self.readout_aborts
    }
    /// The chip latched fatal mode at some point
    pub fn is_fatal_mode(&self) -> bool {
        self.fatal_mode
    }
    /// Frames whose matrix readout completed
    pub fn frames_read_out(&self) -> u64 {
        self.frames_read_out
    }
    /// Recoverable errors reported during the run
    pub fn errors(&self) -> &[String] {
        &self.errors
    }
    /// Unrecoverable error, if one stopped the run
    pub fn fatal_error(&self) -> Option<&str> {
        self.fatal_error.as_deref()
    }
    /// Multi event buffer histogram `(buffers in use, total ns)`
    pub fn meb_histogram(&self) -> &[(usize, u64)] {
        &self.meb_histogram
    }
    /// Hits latched into a multi event buffer
    pub fn latched_pixel_hits(&self) -> u64 {
        self.latched_pixel_hits
    }
    /// Hits discarded as in-buffer duplicates
    pub fn duplicate_pixel_hits(&self) -> u64 {
        self.duplicate_pixel_hits
    }
    /// Pixel readout histogram `(times read out, pixels)`
    pub fn pixel_readout_counts(&self) -> &[(u32, u64)] {
        &self.pixel_readout_counts
    }
    /// Word counts observed on the stream, if the check mode ran
    pub fn word_stats(&self) -> Option<&WordCountStats> {
        self.word_stats.as_ref()
    }
    /// Readout flag counts observed on the stream, if the check mode ran
    pub fn readout_flag_stats(&self) -> Option<&ReadoutFlagStats> {
        self.readout_flag_stats.as_ref()
    }
    /// Clock cycles simulated
    pub fn cycles(&self) -> u64 {
        self.cycles
    }
    /// Simulated time in ns
    pub fn sim_time_ns(&self) -> u64 {
        self.sim_time_ns
    }
    /// The cycle loop ran to completion
    pub fn is_run_completed(&self) -> bool {
        self.run_completed
    }

    /// Fraction of destroyed pixels that were read out at least once, if the
    /// pixel readout histogram was reported
    pub fn pixel_readout_efficiency(&self) -> Option<f64> {
        if self.pixel_readout_counts.is_empty() {
            return None;
        }
        let total: u64 = self.pixel_readout_counts.iter().map(|(_, n)| n).sum();
        if total == 0 {
            return None;
        }
        let read_out: u64 = self
            .pixel_readout_counts
            .iter()
            .filter(|(count, _)| *count > 0)
            .map(|(_, n)| n)
            .sum();
        Some(read_out as f64 / total as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn collects_counters() {
        let mut collector = StatsCollector::default();
        collector.collect(StatType::TriggerReceived(0));
        collector.collect(StatType::TriggerAccepted(0));
        collector.collect(StatType::TriggerReceived(100));
        collector.collect(StatType::TriggerRejected(100));
        collector.collect(StatType::BusyOn(200));
        collector.collect(StatType::BusyOff(300));
        collector.collect(StatType::FrameReadOut(400));

        assert_eq!(collector.triggers_received(), 2);
        assert_eq!(collector.triggers_accepted(), 1);
        assert_eq!(collector.triggers_rejected(), 1);
        assert_eq!(collector.busy_transitions(), 1);
        assert_eq!(collector.frames_read_out(), 1);
    }

    #[test]
    fn readout_efficiency_ignores_missing_histogram() {
        let collector = StatsCollector::default();
        assert_eq!(collector.pixel_readout_efficiency(), None);
    }

    #[test]
    fn readout_efficiency_counts_lost_pixels() {
        let mut collector = StatsCollector::default();
        collector.collect(StatType::PixelReadoutCounts(vec![(0, 25), (1, 50), (2, 25)]));
        assert_eq!(collector.pixel_readout_efficiency(), Some(0.75));
    }
}
