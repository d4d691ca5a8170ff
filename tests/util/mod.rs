//! Shared helpers for the integration tests
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use alpidesim::chip::pixel::{PixelHit, PixelReadoutStats};
use alpidesim::chip::{Alpide, ControlRequest};
use alpidesim::config::chip::ChipConfig;
use alpidesim::stats::StatType;
use alpidesim::words::data_word::AlpideDataWord;

/// Build a chip with an attached stats channel (keep the receiver alive for the
/// lifetime of the chip)
pub fn test_chip(cfg: &ChipConfig) -> (Alpide, flume::Receiver<StatType>) {
    let (send, recv) = flume::unbounded();
    (Alpide::new(cfg, send), recv)
}

/// A hit on chip 0 active for `[start_ns, end_ns)`
pub fn hit(col: u16, row: u16, start_ns: u64, end_ns: u64) -> Rc<PixelHit> {
    Rc::new(PixelHit::new(0, col, row, start_ns, end_ns))
}

/// A hit reporting its readout count to `stats` on destruction
pub fn hit_with_stats(
    col: u16,
    row: u16,
    start_ns: u64,
    end_ns: u64,
    stats: &Rc<RefCell<PixelReadoutStats>>,
) -> Rc<PixelHit> {
    Rc::new(PixelHit::with_readout_stats(0, col, row, start_ns, end_ns, stats))
}

/// Send a trigger to the chip
pub fn trigger(chip: &mut Alpide) {
    chip.control_input(ControlRequest::trigger(chip.chip_id()))
        .expect("trigger is always supported");
}

/// Run `cycles` clock cycles, returning every emitted word including fillers
pub fn run_collect_serial(chip: &mut Alpide, cycles: u64) -> Vec<AlpideDataWord> {
    (0..cycles).map(|_| chip.on_cycle()).collect()
}

/// Run `cycles` clock cycles, returning the words that are neither COMMA nor IDLE
pub fn run_collect_frames(chip: &mut Alpide, cycles: u64) -> Vec<AlpideDataWord> {
    run_collect_serial(chip, cycles)
        .into_iter()
        .filter(|word| !matches!(word, AlpideDataWord::Comma | AlpideDataWord::Idle))
        .collect()
}
