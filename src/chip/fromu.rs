//! The Frame Readout Management Unit (FROMU)
//!
//! The FROMU owns trigger acceptance, strobe framing, the multi event buffer
//! allocation policy, the FRAME START/END FIFOs with their busy thresholds, and
//! the frame readout controller that walks the RRUs through one frame at a time.
#![allow(non_camel_case_types)]

use ringbuffer::{ConstGenericRingBuffer, RingBuffer};
use sm::sm;

use crate::chip::front_end::PixelFrontEnd;
use crate::chip::matrix::PixelMatrix;
use crate::chip::{
    FRAME_FIFO_ALMOST_FULL1, FRAME_FIFO_ALMOST_FULL2, LHC_ORBIT_BUNCH_COUNT, TRU_FRAME_FIFO_SIZE,
};
use crate::config::chip::ChipConfig;
use crate::stats::StatType;
use crate::words::data_word::AlpideDataWord;

use self::FrameReadout::WaitForEvents_;

sm! {
    // States carry a '_' suffix and events a '_' prefix so the generated
    // variants read as STATE_By_EVENT.
    FrameReadout {
        InitialStates { WaitForEvents_ }

        _EventsPending { WaitForEvents_ => RegionReadoutStart_ }
        _ReadoutStarted { RegionReadoutStart_ => WaitForRegionReadout_ }
        _RegionsDone { WaitForRegionReadout_ => RegionReadoutDone_ }
        _FrameDone { RegionReadoutDone_ => WaitForEvents_ }
    }
}

/// One entry of the FRAME START FIFO: pushed at the end of every strobe, one per
/// accounted trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStartWord {
    /// The trigger found no free multi event buffer; the frame is header-only
    pub busy_violation: bool,
    /// Bunch counter sampled at strobe start
    pub bunch_counter: u16,
}

/// One entry of the FRAME END FIFO: pushed when the matrix readout of a frame
/// completes. Busy violation frames never get one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEndWord {
    /// The strobe that accepted this frame force-flushed the oldest buffer
    pub flushed_incomplete: bool,
    /// This frame's strobe was extended by additional triggers
    pub strobe_extended: bool,
    /// The chip was busy when the frame readout completed
    pub busy_transition: bool,
}

/// Per-frame bookkeeping between strobe and frame readout completion
#[derive(Debug, Clone, Copy, Default)]
struct PendingFrameInfo {
    strobe_extended: bool,
    flushed_incomplete: bool,
}

/// The frame readout management unit
pub struct Fromu {
    continuous_mode: bool,
    strobe_extension_enabled: bool,
    strobe_length_ns: u64,

    strobe_active: bool,
    strobe_start_time_ns: u64,
    strobe_end_time_ns: u64,
    strobe_bunch_counter: u16,
    /// The current strobe opened a multi event buffer
    strobe_accepted: bool,
    /// The current strobe found no free multi event buffer
    strobe_busy_violation: bool,

    frame_start_fifo: ConstGenericRingBuffer<FrameStartWord, TRU_FRAME_FIFO_SIZE>,
    frame_end_fifo: ConstGenericRingBuffer<FrameEndWord, TRU_FRAME_FIFO_SIZE>,
    /// Flags for accepted frames awaiting their FRAME END word, oldest first
    pending_frame_infos: std::collections::VecDeque<PendingFrameInfo>,
    /// FRAME END word formed while waiting for the RRUs, pushed one state later
    pending_frame_end: Option<FrameEndWord>,

    busy: bool,
    readout_abort: bool,
    fatal: bool,
    /// BUSY_ON/BUSY_OFF words waiting to be injected into the DMU FIFO
    busy_word_queue: std::collections::VecDeque<AlpideDataWord>,

    bunch_counter: u16,
    readout_fsm: FrameReadout::Variant,
    frame_readout_start_pulse: bool,

    stats_send: flume::Sender<StatType>,
}

impl Fromu {
    /// Create a FROMU with the given chip configuration
    pub fn new(cfg: &ChipConfig, stats_send: flume::Sender<StatType>) -> Self {
        Self {
            continuous_mode: cfg.continuous_mode,
            strobe_extension_enabled: cfg.strobe_extension,
            strobe_length_ns: cfg.strobe_length_ns,
            strobe_active: false,
            strobe_start_time_ns: 0,
            strobe_end_time_ns: 0,
            strobe_bunch_counter: 0,
            strobe_accepted: false,
            strobe_busy_violation: false,
            frame_start_fifo: ConstGenericRingBuffer::new(),
            frame_end_fifo: ConstGenericRingBuffer::new(),
            pending_frame_infos: std::collections::VecDeque::new(),
            pending_frame_end: None,
            busy: false,
            readout_abort: false,
            fatal: false,
            busy_word_queue: std::collections::VecDeque::new(),
            bunch_counter: 0,
            readout_fsm: FrameReadout::Machine::new(WaitForEvents_).as_enum(),
            frame_readout_start_pulse: false,
            stats_send,
        }
    }

    /// Handle a trigger from the control channel.
    ///
    /// Outside an active strobe this starts a new strobe and applies the multi
    /// event buffer policy for the configured mode. During an active strobe the
    /// trigger either extends the strobe or is rejected, depending on the
    /// strobe extension setting.
    pub fn trigger(&mut self, matrix: &mut PixelMatrix, time_now_ns: u64) {
        self.send_stat(StatType::TriggerReceived(time_now_ns));

        if self.strobe_active {
            if self.strobe_extension_enabled {
                self.strobe_end_time_ns = time_now_ns + self.strobe_length_ns;
                if self.strobe_accepted {
                    if let Some(info) = self.pending_frame_infos.back_mut() {
                        info.strobe_extended = true;
                    }
                }
                self.send_stat(StatType::StrobeExtended(time_now_ns));
                log::debug!(
                    "trigger at {time_now_ns} ns extended strobe to {end} ns",
                    end = self.strobe_end_time_ns
                );
            } else {
                self.send_stat(StatType::TriggerRejected(time_now_ns));
                log::debug!("trigger at {time_now_ns} ns rejected: strobe active");
            }
            return;
        }

        self.strobe_active = true;
        self.strobe_start_time_ns = time_now_ns;
        self.strobe_end_time_ns = time_now_ns + self.strobe_length_ns;
        self.strobe_bunch_counter = self.bunch_counter;
        self.strobe_busy_violation = false;
        self.strobe_accepted = false;

        let mebs_in_use = matrix.num_events();
        let mut flushed = false;
        match (self.continuous_mode, mebs_in_use) {
            (_, 0..=1) => self.accept_strobe(matrix, time_now_ns, false),
            (false, 2) => self.accept_strobe(matrix, time_now_ns, false),
            (true, 2) => {
                // Continuous mode keeps a buffer free by dropping the oldest
                matrix.flush_oldest_event(time_now_ns);
                flushed = true;
                self.accept_strobe(matrix, time_now_ns, true);
            }
            (_, _) => {
                self.strobe_busy_violation = true;
                self.send_stat(StatType::BusyViolation(time_now_ns));
                log::warn!("trigger at {time_now_ns} ns: busy violation, no free MEB");
            }
        }
        if flushed {
            self.send_stat(StatType::FlushedIncomplete(time_now_ns));
        }
        if self.strobe_accepted {
            self.send_stat(StatType::TriggerAccepted(time_now_ns));
        } else {
            self.send_stat(StatType::TriggerRejected(time_now_ns));
        }
    }

    fn accept_strobe(&mut self, matrix: &mut PixelMatrix, time_now_ns: u64, flushed: bool) {
        matrix.new_event(time_now_ns);
        self.pending_frame_infos.push_back(PendingFrameInfo {
            strobe_extended: false,
            flushed_incomplete: flushed,
        });
        self.strobe_accepted = true;
    }

    /// Advance the FROMU by one clock cycle.
    ///
    /// `all_rrus_done` is the AND of the RRUs' frame readout done flags as of
    /// the end of the previous cycle.
    pub fn step(
        &mut self,
        matrix: &mut PixelMatrix,
        front_end: &PixelFrontEnd,
        all_rrus_done: bool,
        time_now_ns: u64,
    ) {
        self.bunch_counter = (self.bunch_counter + 1) % LHC_ORBIT_BUNCH_COUNT;

        if self.strobe_active && time_now_ns >= self.strobe_end_time_ns {
            self.end_strobe(matrix, front_end, time_now_ns);
        }

        self.step_frame_readout_fsm(matrix, all_rrus_done, time_now_ns);
        self.update_busy_state(time_now_ns);
    }

    /// Close the strobe window: latch overlapping hits and account the frame
    fn end_strobe(&mut self, matrix: &mut PixelMatrix, front_end: &PixelFrontEnd, time_now_ns: u64) {
        if self.strobe_accepted {
            let mut latched = 0_usize;
            for hit in
                front_end.hits_in_strobe_window(self.strobe_start_time_ns, self.strobe_end_time_ns)
            {
                matrix.set_pixel(hit.clone());
                latched += 1;
            }
            log::debug!(
                "strobe [{start}, {end}) ns closed: {latched} hits latched",
                start = self.strobe_start_time_ns,
                end = self.strobe_end_time_ns
            );
        }
        self.push_frame_start(
            FrameStartWord {
                busy_violation: self.strobe_busy_violation,
                bunch_counter: self.strobe_bunch_counter,
            },
            time_now_ns,
        );
        self.strobe_active = false;
    }

    fn step_frame_readout_fsm(
        &mut self,
        matrix: &mut PixelMatrix,
        all_rrus_done: bool,
        time_now_ns: u64,
    ) {
        use FrameReadout as event;
        use FrameReadout::Variant as state;

        self.frame_readout_start_pulse = false;

        let current = self.readout_fsm.clone();
        self.readout_fsm = match current {
            state::InitialWaitForEvents_(stm) => {
                if self.frame_readout_pending(matrix) {
                    stm.transition(event::_EventsPending).as_enum()
                } else {
                    stm.as_enum()
                }
            }
            state::WaitForEvents_By_FrameDone(stm) => {
                if self.frame_readout_pending(matrix) {
                    stm.transition(event::_EventsPending).as_enum()
                } else {
                    stm.as_enum()
                }
            }
            state::RegionReadoutStart_By_EventsPending(stm) => {
                self.frame_readout_start_pulse = true;
                stm.transition(event::_ReadoutStarted).as_enum()
            }
            state::WaitForRegionReadout_By_ReadoutStarted(stm) => {
                if self.readout_abort || all_rrus_done {
                    let info = self
                        .pending_frame_infos
                        .pop_front()
                        .expect("frame readout completed without pending frame info");
                    self.pending_frame_end = Some(FrameEndWord {
                        flushed_incomplete: info.flushed_incomplete,
                        strobe_extended: info.strobe_extended,
                        busy_transition: self.busy,
                    });
                    stm.transition(event::_RegionsDone).as_enum()
                } else {
                    stm.as_enum()
                }
            }
            state::RegionReadoutDone_By_RegionsDone(stm) => {
                let end_word = self
                    .pending_frame_end
                    .take()
                    .expect("no frame end word formed");
                self.push_frame_end(end_word, time_now_ns);
                matrix.delete_event(time_now_ns);
                self.send_stat(StatType::FrameReadOut(time_now_ns));
                stm.transition(event::_FrameDone).as_enum()
            }
        };
    }

    /// A complete (strobed) event is waiting in the multi event buffers
    fn frame_readout_pending(&self, matrix: &PixelMatrix) -> bool {
        let events = matrix.num_events();
        events > 1 || (events == 1 && !self.strobe_active)
    }

    fn push_frame_start(&mut self, word: FrameStartWord, time_now_ns: u64) {
        if self.frame_start_fifo.is_full() {
            self.enter_fatal(time_now_ns);
            return;
        }
        let _ = self.frame_start_fifo.enqueue(word);
    }

    fn push_frame_end(&mut self, word: FrameEndWord, time_now_ns: u64) {
        if self.frame_end_fifo.is_full() {
            self.enter_fatal(time_now_ns);
            return;
        }
        let _ = self.frame_end_fifo.enqueue(word);
    }

    fn enter_fatal(&mut self, time_now_ns: u64) {
        if !self.fatal {
            self.fatal = true;
            self.send_stat(StatType::FatalMode(time_now_ns));
            log::error!("frame FIFO overflow at {time_now_ns} ns: chip is in fatal mode");
        }
    }

    fn update_busy_state(&mut self, time_now_ns: u64) {
        let busy_now = self.frame_start_fifo.len() >= FRAME_FIFO_ALMOST_FULL1;
        if busy_now != self.busy {
            self.busy = busy_now;
            if busy_now {
                self.busy_word_queue.push_back(AlpideDataWord::BusyOn);
                self.send_stat(StatType::BusyOn(time_now_ns));
                log::debug!("busy asserted at {time_now_ns} ns");
            } else {
                self.busy_word_queue.push_back(AlpideDataWord::BusyOff);
                self.send_stat(StatType::BusyOff(time_now_ns));
                log::debug!("busy deasserted at {time_now_ns} ns");
            }
        }

        if self.frame_start_fifo.len() >= FRAME_FIFO_ALMOST_FULL2 {
            if !self.readout_abort {
                self.readout_abort = true;
                self.send_stat(StatType::ReadoutAbort(time_now_ns));
                log::warn!("data overrun at {time_now_ns} ns: entering readout abort");
            }
        } else if self.readout_abort
            && !self.fatal
            && self.frame_start_fifo.is_empty()
            && self.frame_end_fifo.is_empty()
        {
            self.readout_abort = false;
            self.send_stat(StatType::ReadoutAbortCleared(time_now_ns));
            log::info!("frame FIFOs drained at {time_now_ns} ns: leaving readout abort");
        }
    }

    /// Force the trailer flags for the chip-wide abort modes
    pub fn trailer_flags(
        &self,
        computed: crate::words::readout_flags::ReadoutFlags,
    ) -> crate::words::readout_flags::ReadoutFlags {
        use crate::words::readout_flags::ReadoutFlags;
        if self.fatal {
            ReadoutFlags::FATAL
        } else if self.readout_abort {
            ReadoutFlags::DATA_OVERRUN
        } else {
            computed
        }
    }

    /// The chip busy flag (frame start FIFO at or above the warning threshold)
    pub fn busy(&self) -> bool {
        self.busy
    }

    /// The chip is purging region FIFOs and short-cutting frames
    pub fn readout_abort(&self) -> bool {
        self.readout_abort
    }

    /// The chip hit an unrecoverable FIFO overflow; latched until reset
    pub fn fatal(&self) -> bool {
        self.fatal
    }

    /// The strobe window is currently open
    pub fn strobe_active(&self) -> bool {
        self.strobe_active
    }

    /// Pulse telling the RRUs to start reading the oldest event, this cycle only
    pub fn frame_readout_start_pulse(&self) -> bool {
        self.frame_readout_start_pulse
    }

    /// Current bunch counter value
    pub fn bunch_counter(&self) -> u16 {
        self.bunch_counter
    }

    /// Occupancy of the frame start FIFO
    pub fn frame_start_fifo_len(&self) -> usize {
        self.frame_start_fifo.len()
    }

    /// Peek the oldest frame start word
    pub fn peek_frame_start(&self) -> Option<FrameStartWord> {
        self.frame_start_fifo.peek().copied()
    }

    /// Pop the oldest frame start word
    pub fn pop_frame_start(&mut self) -> Option<FrameStartWord> {
        self.frame_start_fifo.dequeue()
    }

    /// A frame end word is available
    pub fn frame_end_available(&self) -> bool {
        !self.frame_end_fifo.is_empty()
    }

    /// Pop the oldest frame end word
    pub fn pop_frame_end(&mut self) -> Option<FrameEndWord> {
        self.frame_end_fifo.dequeue()
    }

    /// Next BUSY_ON/BUSY_OFF word waiting for injection into the DMU FIFO
    pub fn pop_busy_word(&mut self) -> Option<AlpideDataWord> {
        self.busy_word_queue.pop_front()
    }

    /// Put an unconsumed busy word back at the front of the injection queue
    pub fn push_back_busy_word(&mut self, word: AlpideDataWord) {
        self.busy_word_queue.push_front(word);
    }

    fn send_stat(&self, stat: StatType) {
        self.stats_send
            .send(stat)
            .expect("stats receiver disconnected");
    }
}
