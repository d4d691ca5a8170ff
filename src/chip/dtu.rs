//! The output path: DMU FIFO and the DTU fixed-latency delay line
//!
//! The Data Management Unit FIFO decouples the TRU from the serial link. The
//! Data Transfer Unit is modeled as a whole-word delay: a FIFO pre-filled with
//! COMMA words, written and read once per clock. Bit-level 8b10b serialization
//! is out of scope.

use std::collections::VecDeque;

use crate::chip::fifo::WordFifo;
use crate::words::data_word::AlpideDataWord;

/// DMU FIFO plus the DTU delay line
pub struct DataTransferUnit {
    dmu_fifo: WordFifo,
    dtu_delay_fifo: VecDeque<AlpideDataWord>,
    dtu_delay_cycles: usize,
}

impl DataTransferUnit {
    /// Create the output path. The delay FIFO starts filled with
    /// `dtu_delay_cycles` COMMA words; a delay of 0 bypasses it entirely.
    pub fn new(dmu_fifo_size: usize, dtu_delay_cycles: usize) -> Self {
        let mut dtu_delay_fifo = VecDeque::with_capacity(dtu_delay_cycles);
        for _ in 0..dtu_delay_cycles {
            dtu_delay_fifo.push_back(AlpideDataWord::Comma);
        }
        Self {
            dmu_fifo: WordFifo::new(dmu_fifo_size),
            dtu_delay_fifo,
            dtu_delay_cycles,
        }
    }

    /// The DMU FIFO the TRU writes into
    pub fn dmu_fifo_mut(&mut self) -> &mut WordFifo {
        &mut self.dmu_fifo
    }

    /// Read-only view of the DMU FIFO
    pub fn dmu_fifo(&self) -> &WordFifo {
        &self.dmu_fifo
    }

    /// Advance one clock cycle: pop the word leaving the chip, feed the delay
    /// line from the DMU FIFO (or a COMMA when it is starved).
    pub fn step(&mut self) -> AlpideDataWord {
        let from_dmu = self.dmu_fifo.get().unwrap_or(AlpideDataWord::Comma);
        if self.dtu_delay_cycles == 0 {
            return from_dmu;
        }
        let out = self
            .dtu_delay_fifo
            .pop_front()
            .expect("DTU delay FIFO ran dry");
        self.dtu_delay_fifo.push_back(from_dmu);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn zero_delay_bypasses_the_delay_fifo() {
        let mut dtu = DataTransferUnit::new(8, 0);
        assert!(dtu.dmu_fifo_mut().put(AlpideDataWord::BusyOn));
        assert_eq!(dtu.step(), AlpideDataWord::BusyOn);
        assert_eq!(dtu.step(), AlpideDataWord::Comma);
    }

    #[test]
    fn words_appear_after_the_configured_delay() {
        let mut dtu = DataTransferUnit::new(8, 3);
        assert!(dtu.dmu_fifo_mut().put(AlpideDataWord::ChipHeader {
            chip_id: 0,
            bunch_counter: 0,
        }));
        // Three pre-filled commas drain first
        assert_eq!(dtu.step(), AlpideDataWord::Comma);
        assert_eq!(dtu.step(), AlpideDataWord::Comma);
        assert_eq!(dtu.step(), AlpideDataWord::Comma);
        assert!(matches!(dtu.step(), AlpideDataWord::ChipHeader { .. }));
        assert_eq!(dtu.step(), AlpideDataWord::Comma);
    }
}
