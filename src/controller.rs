//! Contains the [Controller] that collects stats and reports errors
//!
//! The controller runs on its own thread, drains the [StatType] channel, owns
//! the stop flag that signals the simulation loop to wind down on a fatal
//! error, and prints the summary report when the event loop breaks at the end
//! of execution.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{Builder, JoinHandle};
use std::time::Instant;

use indicatif::ProgressBar;

use crate::config::prelude::*;
use crate::stats::stats_collector::StatsCollector;
use crate::stats::stats_report::Report;
use crate::stats::StatType;

/// Spawn a thread with the [Controller] running; returns the thread handle, the
/// channel to send stats through, the stop flag and the any-errors flag.
pub fn init_controller<C: Config + 'static>(
    config: &'static C,
) -> (
    JoinHandle<()>,
    flume::Sender<StatType>,
    Arc<AtomicBool>,
    Arc<AtomicBool>,
) {
    log::trace!("Initializing stats controller");
    let mut controller = Controller::new(config);
    let stats_send_chan = controller.send_channel();
    let stop_flag = controller.end_processing_flag();
    let any_errors_flag = controller.any_errors_flag();

    let controller_thread = Builder::new()
        .name("stats_thread".to_string())
        .spawn(move || {
            controller.run();
        })
        .expect("Failed to spawn stats thread");
    (controller_thread, stats_send_chan, stop_flag, any_errors_flag)
}

/// Receives stats and builds the summary report printed at the end of execution
pub struct Controller<C: Config + 'static> {
    stats_collector: StatsCollector,
    processing_time: Instant,
    config: &'static C,
    stats_recv_chan: flume::Receiver<StatType>,
    // Kept so that a clone can be handed out before the event loop starts; set
    // to None when run() begins or the loop would never see a disconnect.
    stats_send_chan: Option<flume::Sender<StatType>>,
    end_processing_flag: Arc<AtomicBool>,
    any_errors_flag: Arc<AtomicBool>,
    spinner: Option<ProgressBar>,
}

impl<C: Config + 'static> Controller<C> {
    /// Create a controller for the given config
    pub fn new(config: &'static C) -> Self {
        let (send, recv) = flume::unbounded();
        Self {
            stats_collector: StatsCollector::default(),
            processing_time: Instant::now(),
            config,
            stats_recv_chan: recv,
            stats_send_chan: Some(send),
            end_processing_flag: Arc::new(AtomicBool::new(false)),
            any_errors_flag: Arc::new(AtomicBool::new(false)),
            spinner: None,
        }
    }

    /// A sender for the stats channel
    pub fn send_channel(&self) -> flume::Sender<StatType> {
        self.stats_send_chan
            .as_ref()
            .expect("send channel taken before run")
            .clone()
    }

    /// The flag that signals the simulation loop to stop
    pub fn end_processing_flag(&self) -> Arc<AtomicBool> {
        self.end_processing_flag.clone()
    }

    /// The flag raised when any error was reported
    pub fn any_errors_flag(&self) -> Arc<AtomicBool> {
        self.any_errors_flag.clone()
    }

    /// Drain the stats channel until every sender is dropped, then print the report
    pub fn run(&mut self) {
        // Drop our own sender or the loop never sees the disconnect
        self.stats_send_chan = None;
        if self.config.verbosity() == 0 {
            let spinner = ProgressBar::new_spinner();
            spinner.set_message("Simulating...");
            self.spinner = Some(spinner);
        }

        while let Ok(stat) = self.stats_recv_chan.recv() {
            self.process_stat(stat);
        }

        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
        let report = Report::from_collector(&self.stats_collector, self.processing_time.elapsed());
        report.print();
    }

    fn process_stat(&mut self, stat: StatType) {
        match &stat {
            StatType::Fatal(message) => {
                self.end_processing_flag.store(true, Ordering::SeqCst);
                self.any_errors_flag.store(true, Ordering::SeqCst);
                log::error!("FATAL: {message}");
            }
            StatType::Error(message) => {
                self.any_errors_flag.store(true, Ordering::SeqCst);
                log::error!("{message}");
            }
            StatType::FrameReadOut(time_ns) => {
                if let Some(spinner) = &self.spinner {
                    spinner.set_message(format!(
                        "Simulating... {frames} frames read out ({time_ns} ns)",
                        frames = self.stats_collector.frames_read_out() + 1
                    ));
                    spinner.tick();
                }
            }
            _ => (),
        }
        self.stats_collector.collect(stat);
    }

    /// The collected stats (for inspection in tests)
    pub fn stats_collector(&self) -> &StatsCollector {
        &self.stats_collector
    }
}
