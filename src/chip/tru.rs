//! The Top Readout Unit (TRU): region multiplexing and chip frame framing
//!
//! The TRU walks the frame start/end FIFOs filled by the FROMU, frames each
//! event with CHIP_HEADER/CHIP_TRAILER (or a lone CHIP_EMPTY_FRAME), and in
//! between drains the region FIFOs in ascending region order into the DMU FIFO.
//! Busy violation frames are emitted header-only and consume no frame end word.

use crate::chip::fifo::WordFifo;
use crate::chip::fromu::Fromu;
use crate::chip::rru::RegionReadoutUnit;
use crate::words::data_word::AlpideDataWord;
use crate::words::readout_flags::ReadoutFlags;

/// Chip framing FSM states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TruState {
    /// CHIP_EMPTY_FRAME issued, waiting to consume the frame records
    Empty,
    /// Waiting for the next frame start word
    Idle,
    /// Frame start seen, waiting for the regions to produce data
    WaitRegionData,
    /// Write the CHIP_HEADER (or CHIP_EMPTY_FRAME) word
    ChipHeader,
    /// Header-only frame for a trigger that found no free buffer
    BusyViolation,
    /// Stream region data words into the DMU FIFO
    RegionData,
    /// Stalled on a full DMU FIFO or a starved region
    Wait,
    /// Write the CHIP_TRAILER word and retire the frame records
    ChipTrailer,
}

/// The top readout unit
pub struct TopReadoutUnit {
    chip_id: u8,
    state: TruState,
    current_region: Option<usize>,
    previous_region: Option<usize>,
    region_event_start_out: bool,
    region_event_pop_out: bool,
}

impl TopReadoutUnit {
    /// Create the TRU for the given chip ID
    pub fn new(chip_id: u8) -> Self {
        Self {
            chip_id,
            state: TruState::Idle,
            current_region: None,
            previous_region: None,
            region_event_start_out: false,
            region_event_pop_out: false,
        }
    }

    /// Broadcast telling the RRU valid FSMs a new frame readout begins (latched
    /// by the RRUs next cycle)
    pub fn region_event_start_out(&self) -> bool {
        self.region_event_start_out
    }

    /// Broadcast telling the RRUs to retire their region trailer (latched by
    /// the RRUs next cycle)
    pub fn region_event_pop_out(&self) -> bool {
        self.region_event_pop_out
    }

    /// Advance the TRU by one clock cycle
    pub fn step(
        &mut self,
        rrus: &mut [RegionReadoutUnit],
        fromu: &mut Fromu,
        dmu_fifo: &mut WordFifo,
        time_now_ns: u64,
    ) {
        self.region_event_start_out = false;
        self.region_event_pop_out = false;
        let abort = fromu.readout_abort() || fromu.fatal();

        match self.state {
            TruState::Empty => {
                if fromu.frame_end_available() {
                    self.region_event_pop_out = true;
                    let _ = fromu.pop_frame_start();
                    let _ = fromu.pop_frame_end();
                    self.set_state(TruState::Idle, time_now_ns);
                }
            }
            TruState::Idle => {
                self.region_event_start_out = true;
                if fromu.peek_frame_start().is_some() {
                    self.set_state(TruState::WaitRegionData, time_now_ns);
                }
            }
            TruState::WaitRegionData => {
                let busy_violation = fromu
                    .peek_frame_start()
                    .is_some_and(|start| start.busy_violation);
                if abort || busy_violation || rrus.iter().any(|rru| !rru.fifo_empty()) {
                    self.set_state(TruState::ChipHeader, time_now_ns);
                }
            }
            TruState::ChipHeader => {
                if dmu_fifo.is_full() {
                    return;
                }
                let start = fromu
                    .peek_frame_start()
                    .expect("chip header state without frame start word");
                if start.busy_violation {
                    let put_ok = dmu_fifo.put(AlpideDataWord::ChipHeader {
                        chip_id: self.chip_id,
                        bunch_counter: start.bunch_counter,
                    });
                    debug_assert!(put_ok);
                    self.set_state(TruState::BusyViolation, time_now_ns);
                } else if abort {
                    let put_ok = dmu_fifo.put(AlpideDataWord::ChipHeader {
                        chip_id: self.chip_id,
                        bunch_counter: start.bunch_counter,
                    });
                    debug_assert!(put_ok);
                    self.set_state(TruState::ChipTrailer, time_now_ns);
                } else if let Some(region) = lowest_valid_region(rrus) {
                    let put_ok = dmu_fifo.put(AlpideDataWord::ChipHeader {
                        chip_id: self.chip_id,
                        bunch_counter: start.bunch_counter,
                    });
                    debug_assert!(put_ok);
                    self.switch_region(region);
                    self.set_state(TruState::RegionData, time_now_ns);
                } else if fromu.frame_end_available() {
                    // Every region finished without producing data
                    let put_ok = dmu_fifo.put(AlpideDataWord::ChipEmptyFrame {
                        chip_id: self.chip_id,
                        bunch_counter: start.bunch_counter,
                    });
                    debug_assert!(put_ok);
                    self.set_state(TruState::Empty, time_now_ns);
                }
                // Otherwise: regions are still reading out, hold the header
            }
            TruState::BusyViolation => {
                if dmu_fifo.is_full() {
                    return;
                }
                let _ = fromu.pop_frame_start();
                let flags = fromu.trailer_flags(ReadoutFlags::BUSY_VIOLATION);
                let put_ok = dmu_fifo.put(AlpideDataWord::ChipTrailer { flags });
                debug_assert!(put_ok);
                self.set_state(TruState::Idle, time_now_ns);
            }
            TruState::RegionData => {
                if abort {
                    self.set_state(TruState::ChipTrailer, time_now_ns);
                } else if dmu_fifo.is_full() {
                    self.set_state(TruState::Wait, time_now_ns);
                } else {
                    match lowest_valid_region(rrus) {
                        None => {
                            if fromu.frame_end_available() {
                                self.set_state(TruState::ChipTrailer, time_now_ns);
                            } else {
                                // All regions look done but the readout has not
                                // signalled completion yet
                                self.set_state(TruState::Wait, time_now_ns);
                            }
                        }
                        Some(region) => {
                            self.switch_region(region);
                            if rrus[region].has_readable_word() {
                                let word = rrus[region].read_data_word();
                                log::trace!(
                                    "TRU: region {region} data word {word} -> DMU FIFO"
                                );
                                let put_ok = dmu_fifo.put(word);
                                debug_assert!(put_ok);
                            } else {
                                self.set_state(TruState::Wait, time_now_ns);
                            }
                        }
                    }
                }
            }
            TruState::Wait => {
                if abort {
                    self.set_state(TruState::ChipTrailer, time_now_ns);
                } else {
                    match lowest_valid_region(rrus) {
                        None => {
                            if fromu.frame_end_available() {
                                self.set_state(TruState::ChipTrailer, time_now_ns);
                            }
                        }
                        Some(region) => {
                            if !dmu_fifo.is_full() && rrus[region].has_readable_word() {
                                self.set_state(TruState::RegionData, time_now_ns);
                            }
                        }
                    }
                }
            }
            TruState::ChipTrailer => {
                if dmu_fifo.is_full() || !fromu.frame_end_available() {
                    return;
                }
                let _ = fromu.pop_frame_start();
                let end = fromu.pop_frame_end().expect("frame end word disappeared");
                let flags = fromu.trailer_flags(ReadoutFlags {
                    busy_violation: false,
                    flushed_incomplete: end.flushed_incomplete,
                    strobe_extended: end.strobe_extended,
                    busy_transition: end.busy_transition,
                });
                let put_ok = dmu_fifo.put(AlpideDataWord::ChipTrailer { flags });
                debug_assert!(put_ok);
                self.region_event_pop_out = true;
                self.current_region = None;
                self.previous_region = None;
                self.set_state(TruState::Idle, time_now_ns);
            }
        }
    }

    fn switch_region(&mut self, region: usize) {
        if self.current_region != Some(region) {
            self.previous_region = self.current_region;
            self.current_region = Some(region);
            log::trace!(
                "TRU: reading region {region} (previous: {previous:?})",
                previous = self.previous_region
            );
        }
    }

    fn set_state(&mut self, next: TruState, time_now_ns: u64) {
        if next != self.state {
            log::trace!(
                "TRU: {current:?} -> {next:?} at {time_now_ns} ns",
                current = self.state
            );
            self.state = next;
        }
    }
}

/// The next region to read: the lowest-indexed region with its valid flag set
fn lowest_valid_region(rrus: &[RegionReadoutUnit]) -> Option<usize> {
    rrus.iter().position(RegionReadoutUnit::valid)
}
