//! The end-of-run report table printed by the controller

use itertools::Itertools;
use owo_colors::OwoColorize;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Panel, Style},
    Table, Tabled,
};

use crate::stats::stats_collector::StatsCollector;

/// One row of the report table
#[derive(Tabled)]
pub struct StatSummary {
    /// Name of the statistic
    pub statistic: String,
    /// Formatted value
    pub value: String,
    /// Free-form notes
    pub notes: String,
}

impl StatSummary {
    /// Build a row, with optional notes
    pub fn new(statistic: String, value: String, notes: Option<String>) -> Self {
        Self {
            statistic,
            value,
            notes: notes.unwrap_or_default(),
        }
    }
}

/// Structures the end-of-run statistics into printable tables
pub struct Report {
    stats: Vec<StatSummary>,
    meb_rows: Vec<StatSummary>,
    processing_time: std::time::Duration,
    fatal_error: Option<String>,
}

impl Report {
    /// Build the report from the collected statistics
    pub fn from_collector(collector: &StatsCollector, processing_time: std::time::Duration) -> Self {
        let mut stats = vec![
            StatSummary::new(
                "Cycles simulated".into(),
                format!(
                    "{cycles} ({ns} ns)",
                    cycles = collector.cycles(),
                    ns = collector.sim_time_ns()
                ),
                None,
            ),
            StatSummary::new(
                "Triggers".into(),
                collector.triggers_received().to_string(),
                Some(format!(
                    "{accepted} accepted, {rejected} rejected",
                    accepted = collector.triggers_accepted(),
                    rejected = collector.triggers_rejected()
                )),
            ),
            StatSummary::new(
                "Frames read out".into(),
                collector.frames_read_out().to_string(),
                None,
            ),
            StatSummary::new(
                "Busy violations".into(),
                collector.busy_violations().to_string(),
                None,
            ),
            StatSummary::new(
                "Flushed incomplete".into(),
                collector.flushed_incomplete().to_string(),
                None,
            ),
            StatSummary::new(
                "Strobe extensions".into(),
                collector.strobe_extensions().to_string(),
                None,
            ),
            StatSummary::new(
                "Busy transitions".into(),
                collector.busy_transitions().to_string(),
                None,
            ),
            StatSummary::new(
                "Readout aborts".into(),
                collector.readout_aborts().to_string(),
                if collector.is_fatal_mode() {
                    Some("chip ended the run in FATAL mode".to_string())
                } else {
                    None
                },
            ),
            StatSummary::new(
                "Pixel hits latched".into(),
                collector.latched_pixel_hits().to_string(),
                Some(format!(
                    "{duplicates} duplicates discarded",
                    duplicates = collector.duplicate_pixel_hits()
                )),
            ),
        ];
        if let Some(efficiency) = collector.pixel_readout_efficiency() {
            stats.push(StatSummary::new(
                "Pixel readout efficiency".into(),
                format!("{:.4}", efficiency),
                None,
            ));
        }
        if let Some(words) = collector.word_stats() {
            stats.push(StatSummary::new(
                "Data words on stream".into(),
                format!(
                    "{shorts} short, {longs} long",
                    shorts = words.data_shorts,
                    longs = words.data_longs
                ),
                Some(format!(
                    "{headers} headers, {empties} empty frames",
                    headers = words.chip_headers,
                    empties = words.chip_empty_frames
                )),
            ));
        }
        if let Some(flags) = collector.readout_flag_stats() {
            stats.push(StatSummary::new(
                "Trailer flags on stream".into(),
                format!(
                    "{violations} busy violation, {overruns} data overrun",
                    violations = flags.busy_violations(),
                    overruns = flags.data_overrun()
                ),
                Some(format!(
                    "{flushed} flushed, {extended} extended, {busy} busy",
                    flushed = flags.flushed_incomplete(),
                    extended = flags.strobe_extended(),
                    busy = flags.busy_transitions()
                )),
            ));
        }

        if !collector.errors().is_empty() {
            stats.push(StatSummary::new(
                "Errors".into(),
                collector.errors().len().to_string(),
                Some(collector.errors().iter().join("; ")),
            ));
        }

        let total_ns: u64 = collector.meb_histogram().iter().map(|(_, ns)| ns).sum();
        let meb_rows = collector
            .meb_histogram()
            .iter()
            .map(|&(mebs, ns)| {
                let share = if total_ns > 0 {
                    100.0 * ns as f64 / total_ns as f64
                } else {
                    0.0
                };
                StatSummary::new(
                    format!("{mebs} MEB in use"),
                    format!("{ns} ns"),
                    Some(format!("{share:.2} %")),
                )
            })
            .collect();

        Self {
            stats,
            meb_rows,
            processing_time,
            fatal_error: collector.fatal_error().map(str::to_owned),
        }
    }

    /// Render and print the report to stdout
    pub fn print(&self) {
        if let Some(error) = &self.fatal_error {
            println!("{label}: {error}", label = "FATAL ERROR".red().bold());
        }
        let mut global_table = Table::new(&self.stats);
        let _ = global_table
            .with(Style::rounded())
            .with(Panel::header(format!(
                "ALPIDE readout simulation summary ({time:.2?})",
                time = self.processing_time
            )))
            .with(Modify::new(Rows::first()).with(Alignment::center()));
        println!("{global_table}");

        if !self.meb_rows.is_empty() {
            let mut meb_table = Table::new(&self.meb_rows);
            let _ = meb_table
                .with(Style::rounded())
                .with(Panel::header("Multi event buffer occupancy"))
                .with(Modify::new(Rows::first()).with(Alignment::center()));
            println!("{meb_table}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::StatType;

    #[test]
    fn report_builds_from_collector() {
        let mut collector = StatsCollector::default();
        collector.collect(StatType::TriggerReceived(0));
        collector.collect(StatType::TriggerAccepted(0));
        collector.collect(StatType::MebHistogram(vec![(0, 750), (1, 250)]));
        collector.collect(StatType::RunCompleted {
            cycles: 40,
            sim_time_ns: 1000,
        });
        let report = Report::from_collector(&collector, std::time::Duration::from_millis(5));
        assert!(report.stats.iter().any(|row| row.statistic == "Triggers"));
        assert_eq!(report.meb_rows.len(), 2);
    }
}
