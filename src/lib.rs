#![warn(unused_extern_crates)]
#![warn(missing_docs)]
#![warn(missing_copy_implementations)]
// Readability lints
#![warn(
    clippy::option_filter_map,
    clippy::manual_filter_map,
    clippy::if_not_else,
    clippy::nonminimal_bool,
    clippy::single_match_else,
    clippy::range_plus_one,
    clippy::int_plus_one,
    clippy::needless_range_loop,
    clippy::needless_continue,
    clippy::shadow_same,
    clippy::shadow_unrelated
)]
// Performance lints
#![warn(variant_size_differences)]
#![warn(
    clippy::needless_pass_by_value,
    clippy::unnecessary_wraps,
    clippy::mutex_integer,
    clippy::mem_forget,
    clippy::maybe_infinite_iter
)]
// Safety lints
#![warn(unused_results)]
#![warn(unused_import_braces)]
#![warn(trivial_casts, trivial_numeric_casts)]
// Unhandled results (allow unwrap and expect as there are many cases where the unwrap is totally safe)
#![warn(clippy::map_unwrap_or)]

//! Cycle-accurate behavioral simulator of the ALPIDE pixel chip readout data path
//!
//! The [chip] module holds the chip model itself: the pixel matrix with its
//! three multi event buffers, the 32 region readout units with clustering, the
//! top readout unit, the frame readout management unit, and the DMU/DTU output
//! stage. Driven one 40 MHz clock cycle at a time, it emits the same 24-bit
//! data word sequence a real chip would produce.
//!
//! # Usage
//!
//! ## Simulate the default trigger schedule and print the report
//! ```shell
//! $ alpidesim
//! ```
//!
//! ## Continuous mode at a high trigger rate, verifying the emitted stream
//! ```shell
//! $ alpidesim --continuous-mode --triggers 1000 --trigger-period 500 --check
//! ```
//!
//! ## Write the raw serial stream to a file
//! ```shell
//! $ alpidesim -o stream.raw
//! ```

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use analyze::event_builder::AlpideEventBuilder;
use chip::pixel::{PixelHit, PixelReadoutStats};
use chip::{Alpide, ControlRequest};
use config::chip::ChipConfig;
use config::prelude::*;
use stats::StatType;

pub mod analyze;
pub mod chip;
pub mod config;
pub mod controller;
pub mod stats;
pub mod util;
pub mod words;
pub mod write;

/// Words accumulated before a batch goes to the writer thread
const WRITER_BATCH_SIZE: usize = 256;
/// First trigger fires this many ns into the run
const FIRST_TRIGGER_TIME_NS: u64 = 100;

/// Run the simulation described by `config`: drive the chip through the trigger
/// schedule with deterministic pixel hits, stream the emitted words to the
/// writer and/or the stream checker, and report statistics through
/// `stat_send_channel`.
///
/// Returns when the configured number of cycles has been simulated or
/// `stop_flag` is raised.
pub fn run_simulation(
    config: &'static impl Config,
    stat_send_channel: flume::Sender<StatType>,
    stop_flag: Arc<AtomicBool>,
) -> std::io::Result<()> {
    let chip_cfg = config.chip_config();
    let mut chip = Alpide::new(&chip_cfg, stat_send_channel.clone());
    let readout_stats = Rc::new(RefCell::new(PixelReadoutStats::default()));

    let (writer_handle, data_send) = if config.output_mode() == DataOutputMode::None {
        (None, None)
    } else {
        let (send, recv) = crossbeam_channel::unbounded();
        (
            Some(write::spawn_writer(config, stop_flag.clone(), recv)),
            Some(send),
        )
    };

    let mut event_builder = if config.check_enabled() {
        Some(AlpideEventBuilder::new())
    } else {
        None
    };

    let mut next_trigger: u64 = 0;
    let mut word_batch: Vec<u32> = Vec::with_capacity(WRITER_BATCH_SIZE);

    for _ in 0..config.cycles() {
        if stop_flag.load(Ordering::SeqCst) {
            log::warn!("Stop flag raised, ending simulation early");
            break;
        }

        while next_trigger < config.num_triggers()
            && trigger_time(config, next_trigger) <= chip.time_ns()
        {
            inject_hit_pattern(
                &mut chip,
                &chip_cfg,
                config.hits_per_trigger(),
                next_trigger,
                trigger_time(config, next_trigger),
                &readout_stats,
            );
            chip.control_input(ControlRequest::trigger(chip_cfg.chip_id))
                .expect("trigger opcode is always supported");
            next_trigger += 1;
        }

        let word = chip.on_cycle();
        if let Some(builder) = event_builder.as_mut() {
            builder.input_word(word.to_bytes());
        }
        if let Some(send) = &data_send {
            word_batch.push(word.to_u32());
            if word_batch.len() >= WRITER_BATCH_SIZE {
                send.send(std::mem::take(&mut word_batch))
                    .expect("writer thread hung up");
            }
        }
        if chip.cycle() % 4096 == 0 {
            let cutoff = chip
                .time_ns()
                .saturating_sub(4 * chip_cfg.strobe_length_ns.max(chip::CLOCK_PERIOD_NS));
            chip.remove_inactive_hits(cutoff);
        }
    }

    chip.finalize_stats();
    let cycles = chip.cycle();
    let sim_time_ns = chip.time_ns();
    // Destroys the remaining hits, completing the per-pixel readout counts
    drop(chip);

    let pixel_counts: Vec<(u32, u64)> = readout_stats
        .borrow()
        .readout_count_histo()
        .iter()
        .map(|(&count, &pixels)| (count, pixels))
        .collect();
    let send_stat = |stat| {
        stat_send_channel
            .send(stat)
            .expect("stats receiver disconnected");
    };
    send_stat(StatType::PixelReadoutCounts(pixel_counts));
    if let Some(builder) = event_builder {
        send_stat(StatType::AlpideWordStats(builder.word_stats()));
        send_stat(StatType::AlpideReadoutFlagStats(builder.readout_flag_stats()));
        if builder.protocol_errors() > 0 {
            send_stat(StatType::Error(
                format!(
                    "{errors} protocol errors on the emitted stream",
                    errors = builder.protocol_errors()
                )
                .into(),
            ));
        }
    }
    send_stat(StatType::RunCompleted {
        cycles,
        sim_time_ns,
    });

    if let Some(send) = data_send {
        if !word_batch.is_empty() {
            send.send(word_batch).expect("writer thread hung up");
        }
        drop(send);
    }
    if let Some(handle) = writer_handle {
        handle.join().expect("Could not join writer thread");
    }
    Ok(())
}

fn trigger_time(config: &impl Config, trigger_index: u64) -> u64 {
    FIRST_TRIGGER_TIME_NS + trigger_index * config.trigger_period_ns()
}

/// Inject a deterministic pixel pattern for one trigger: `count` hits spread
/// over the matrix, active for the duration of the strobe window.
fn inject_hit_pattern(
    chip: &mut Alpide,
    chip_cfg: &ChipConfig,
    count: usize,
    trigger_index: u64,
    trigger_time_ns: u64,
    readout_stats: &Rc<RefCell<PixelReadoutStats>>,
) {
    for hit_index in 0..count as u64 {
        let col = ((trigger_index * 31 + hit_index * 67) % chip::N_PIXEL_COLS as u64) as u16;
        let row = ((trigger_index * 17 + hit_index * 41) % chip::N_PIXEL_ROWS as u64) as u16;
        let hit = PixelHit::with_readout_stats(
            chip_cfg.chip_id,
            col,
            row,
            trigger_time_ns,
            trigger_time_ns + chip_cfg.strobe_length_ns,
            readout_stats,
        );
        chip.pixel_input(Rc::new(hit));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_util::MockConfig;
    use pretty_assertions::assert_eq;
    use std::sync::OnceLock;

    static CFG_TEST_RUN_SIM: OnceLock<MockConfig> = OnceLock::new();

    #[test]
    fn test_run_simulation() {
        let mut mock_config = MockConfig::new();
        mock_config.check = true;
        CFG_TEST_RUN_SIM.set(mock_config).unwrap();

        let (sender, receiver): (flume::Sender<StatType>, flume::Receiver<StatType>) =
            flume::unbounded();
        let stop_flag = Arc::new(AtomicBool::new(false));

        run_simulation(CFG_TEST_RUN_SIM.get().unwrap(), sender, stop_flag.clone()).unwrap();

        let stats: Vec<StatType> = receiver.drain().collect();

        let accepted = stats
            .iter()
            .filter(|stat| matches!(stat, StatType::TriggerAccepted(_)))
            .count() as u64;
        let frames = stats
            .iter()
            .filter(|stat| matches!(stat, StatType::FrameReadOut(_)))
            .count() as u64;
        assert_eq!(accepted, CFG_TEST_RUN_SIM.get().unwrap().num_triggers);
        assert_eq!(frames, accepted);

        let word_stats = stats.iter().find_map(|stat| match stat {
            StatType::AlpideWordStats(words) => Some(*words),
            _ => None,
        });
        let word_stats = word_stats.expect("check mode reports word stats");
        assert_eq!(word_stats.chip_headers, accepted);
        assert_eq!(word_stats.chip_trailers, word_stats.chip_headers);
        assert!(word_stats.data_shorts + word_stats.data_longs > 0);
        assert!(stats
            .iter()
            .any(|stat| matches!(stat, StatType::RunCompleted { .. })));
        assert!(!stop_flag.load(Ordering::SeqCst));
    }
}
