//! The top level chip model wiring all the readout blocks together

use std::collections::VecDeque;
use std::rc::Rc;

use crate::chip::dtu::DataTransferUnit;
use crate::chip::front_end::PixelFrontEnd;
use crate::chip::fromu::Fromu;
use crate::chip::matrix::PixelMatrix;
use crate::chip::pixel::PixelHit;
use crate::chip::rru::RegionReadoutUnit;
use crate::chip::tru::TopReadoutUnit;
use crate::chip::{ControlRequest, CLOCK_PERIOD_NS, N_REGIONS, OPCODE_TRIGGER};
use crate::config::chip::ChipConfig;
use crate::stats::StatType;
use crate::words::data_word::AlpideDataWord;

/// The ALPIDE chip model.
///
/// Inputs are the control channel ([Self::control_input]) and the pixel front
/// end ([Self::pixel_input]); the output is one 24-bit word per call to
/// [Self::on_cycle]. All blocks advance on the same 40 MHz clock with a fixed
/// in-cycle order: FROMU first (strobe framing and frame readout control), then
/// the 32 RRUs, then the TRU, then the DMU/DTU output stage.
pub struct Alpide {
    chip_id: u8,
    matrix: PixelMatrix,
    front_end: PixelFrontEnd,
    fromu: Fromu,
    rrus: Vec<RegionReadoutUnit>,
    tru: TopReadoutUnit,
    dtu: DataTransferUnit,
    /// TRU broadcasts latched for the RRUs to consume next cycle
    region_event_start_latched: bool,
    region_event_pop_latched: bool,
    time_ns: u64,
    cycle: u64,
    stats_send: flume::Sender<StatType>,
}

impl Alpide {
    /// Build a chip from its configuration. Statistics events are reported
    /// through `stats_send`.
    pub fn new(cfg: &ChipConfig, stats_send: flume::Sender<StatType>) -> Self {
        let rrus = (0..N_REGIONS)
            .map(|region| {
                RegionReadoutUnit::new(
                    region as u8,
                    cfg.region_fifo_size,
                    cfg.matrix_readout_speed,
                    cfg.enable_clustering,
                )
            })
            .collect();
        Self {
            chip_id: cfg.chip_id,
            matrix: PixelMatrix::new(),
            front_end: PixelFrontEnd::new(),
            fromu: Fromu::new(cfg, stats_send.clone()),
            rrus,
            tru: TopReadoutUnit::new(cfg.chip_id),
            dtu: DataTransferUnit::new(cfg.dmu_fifo_size, cfg.dtu_delay_cycles),
            region_event_start_latched: false,
            region_event_pop_latched: false,
            time_ns: 0,
            cycle: 0,
            stats_send,
        }
    }

    /// The chip ID carried in headers and trailers
    pub fn chip_id(&self) -> u8 {
        self.chip_id
    }

    /// Current simulation time in nanoseconds (start of the next cycle)
    pub fn time_ns(&self) -> u64 {
        self.time_ns
    }

    /// Number of clock cycles processed so far
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Handle a request on the control channel. Only TRIGGER is implemented;
    /// every other opcode is a reserved error.
    pub fn control_input(&mut self, request: ControlRequest) -> Result<(), String> {
        match request.opcode {
            OPCODE_TRIGGER => {
                self.fromu.trigger(&mut self.matrix, self.time_ns);
                Ok(())
            }
            opcode => Err(format!(
                "unsupported opcode {opcode:#04X} on control channel"
            )),
        }
    }

    /// Queue a hit at the pixel front end
    pub fn pixel_input(&mut self, hit: Rc<PixelHit>) {
        self.front_end.pixel_input(hit);
    }

    /// Drop front end hits that can no longer be strobed
    pub fn remove_inactive_hits(&mut self, time_ns: u64) {
        self.front_end.remove_inactive_hits(time_ns);
    }

    /// Advance the chip by one 40 MHz clock cycle and return the 24-bit word
    /// leaving the serial port this cycle.
    pub fn on_cycle(&mut self) -> AlpideDataWord {
        let time_now = self.time_ns;

        // FROMU samples the RRU done flags as of the end of last cycle
        let all_rrus_done = self
            .rrus
            .iter()
            .all(RegionReadoutUnit::frame_readout_done);
        self.fromu
            .step(&mut self.matrix, &self.front_end, all_rrus_done, time_now);

        let frame_readout_start = self.fromu.frame_readout_start_pulse();
        let readout_abort = self.fromu.readout_abort() || self.fromu.fatal();
        for rru in &mut self.rrus {
            rru.step_matrix_readout(
                &mut self.matrix,
                frame_readout_start,
                readout_abort,
                time_now,
            );
            rru.step_readout_control(
                self.region_event_start_latched,
                self.region_event_pop_latched,
                readout_abort,
            );
        }

        // Busy transitions go onto the serial stream as soon as there is room
        while !self.dtu.dmu_fifo_mut().is_full() {
            match self.fromu.pop_busy_word() {
                Some(word) => {
                    let _ = self.dtu.dmu_fifo_mut().put(word);
                }
                None => break,
            }
        }

        self.tru
            .step(&mut self.rrus, &mut self.fromu, self.dtu.dmu_fifo_mut(), time_now);
        self.region_event_start_latched = self.tru.region_event_start_out();
        self.region_event_pop_latched = self.tru.region_event_pop_out();

        let word_out = self.dtu.step();

        self.time_ns += CLOCK_PERIOD_NS;
        self.cycle += 1;
        word_out
    }

    /// The pixel matrix (multi event buffers)
    pub fn matrix(&self) -> &PixelMatrix {
        &self.matrix
    }

    /// The frame readout management unit
    pub fn fromu(&self) -> &Fromu {
        &self.fromu
    }

    /// The region FIFOs hold no words at all
    pub fn all_region_fifos_empty(&self) -> bool {
        self.rrus.iter().all(RegionReadoutUnit::fifo_empty)
    }

    /// Report the end-of-run matrix statistics through the stats channel
    pub fn finalize_stats(&mut self) {
        self.matrix.update_histogram(self.time_ns);
        let histogram: Vec<(usize, u64)> = self
            .matrix
            .meb_histogram()
            .values()
            .iter()
            .map(|(&mebs, &ns)| (mebs, ns))
            .collect();
        let send = |stat| {
            self.stats_send
                .send(stat)
                .expect("stats receiver disconnected");
        };
        send(StatType::MebHistogram(histogram));
        send(StatType::LatchedPixelHits(self.matrix.latched_pixel_hit_count()));
        send(StatType::DuplicatePixelHits(
            self.matrix.duplicate_pixel_hit_count(),
        ));
    }
}

/// Drive `chip` for `cycles` clock cycles, collecting the words that are
/// neither COMMA nor IDLE. Intended for tests and short probes.
pub fn drain_frame_words(chip: &mut Alpide, cycles: u64) -> VecDeque<AlpideDataWord> {
    let mut words = VecDeque::new();
    for _ in 0..cycles {
        match chip.on_cycle() {
            AlpideDataWord::Comma | AlpideDataWord::Idle => (),
            word => words.push_back(word),
        }
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_chip(cfg: ChipConfig) -> (Alpide, flume::Receiver<StatType>) {
        let (send, recv) = flume::unbounded();
        (Alpide::new(&cfg, send), recv)
    }

    #[test]
    fn unknown_opcode_is_an_error() {
        let (mut chip, _recv) = test_chip(ChipConfig::default());
        assert!(chip.control_input(ControlRequest::trigger(0)).is_ok());
        let bad = ControlRequest {
            opcode: 0x13,
            chip_id: 0,
            address: 0,
            data: 0,
        };
        assert!(chip.control_input(bad).is_err());
    }

    #[test]
    fn trigger_without_hits_yields_empty_frame() {
        let cfg = ChipConfig {
            strobe_length_ns: 100,
            dtu_delay_cycles: 0,
            ..ChipConfig::default()
        };
        let (mut chip, _recv) = test_chip(cfg);
        chip.control_input(ControlRequest::trigger(0)).unwrap();
        let words = drain_frame_words(&mut chip, 200);
        assert_eq!(words.len(), 1);
        assert!(matches!(
            words[0],
            AlpideDataWord::ChipEmptyFrame { chip_id: 0, .. }
        ));
    }

    #[test]
    fn single_pixel_frame_has_header_region_data_trailer() {
        let cfg = ChipConfig {
            strobe_length_ns: 100,
            dtu_delay_cycles: 0,
            ..ChipConfig::default()
        };
        let (mut chip, _recv) = test_chip(cfg);
        chip.pixel_input(Rc::new(PixelHit::new(0, 100, 200, 0, 5_000)));

        // Two idle cycles, then the trigger at t = 50 ns
        let _ = chip.on_cycle();
        let _ = chip.on_cycle();
        chip.control_input(ControlRequest::trigger(0)).unwrap();

        let words: Vec<AlpideDataWord> = drain_frame_words(&mut chip, 400).into();
        assert_eq!(words.len(), 4, "got words: {words:?}");
        assert!(matches!(words[0], AlpideDataWord::ChipHeader { chip_id: 0, .. }));
        assert!(matches!(
            words[1],
            AlpideDataWord::RegionHeader { region_id: 3 }
        ));
        match &words[2] {
            AlpideDataWord::DataShort {
                encoder_id, addr, ..
            } => {
                assert_eq!(*encoder_id, 2);
                assert_eq!(*addr, 400);
            }
            other => panic!("expected DATA SHORT, got {other}"),
        }
        match &words[3] {
            AlpideDataWord::ChipTrailer { flags } => assert!(flags.is_clear()),
            other => panic!("expected CHIP TRAILER, got {other}"),
        }
    }

    #[test]
    fn frames_retire_their_multi_event_buffers() {
        let cfg = ChipConfig {
            strobe_length_ns: 100,
            dtu_delay_cycles: 0,
            ..ChipConfig::default()
        };
        let (mut chip, _recv) = test_chip(cfg);
        for trigger in 0..3_u16 {
            chip.pixel_input(Rc::new(PixelHit::new(
                0,
                4 * trigger,
                7,
                u64::from(trigger) * 2_000,
                u64::from(trigger) * 2_000 + 500,
            )));
        }
        for round in 0..3_u64 {
            chip.control_input(ControlRequest::trigger(0)).unwrap();
            for _ in 0..80 {
                let _ = chip.on_cycle();
            }
            assert_eq!(
                chip.matrix().num_events(),
                0,
                "MEB not retired after round {round}"
            );
        }
    }
}
