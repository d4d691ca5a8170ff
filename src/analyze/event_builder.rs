//! Rebuilds event frames from the emitted 24-bit word stream
//!
//! The builder consumes the serial stream word by word, identifies each word
//! from its ID byte, and reconstructs per-frame pixel sets. It is the
//! independent side of the round-trip check: the pixel coordinates recovered
//! here must match what was latched into the multi event buffers, modulo hits
//! dropped by busy, flush or abort.

use std::collections::BTreeSet;

use crate::stats::alpide_stats::{ReadoutFlagStats, WordCountStats};
use crate::words::data_word::{AlpideWordKind, DATA_LONG_HITMAP_SIZE};
use crate::words::readout_flags::ReadoutFlags;

/// One reconstructed frame from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlpideFrame {
    chip_id: u8,
    /// Bunch counter bits 10:3 as carried on the wire
    bunch_counter: u8,
    pixels: BTreeSet<(u16, u16)>,
    readout_flags: Option<ReadoutFlags>,
    is_empty_frame: bool,
    completed: bool,
}

impl AlpideFrame {
    fn new(chip_id: u8, bunch_counter: u8) -> Self {
        Self {
            chip_id,
            bunch_counter,
            pixels: BTreeSet::new(),
            readout_flags: None,
            is_empty_frame: false,
            completed: false,
        }
    }

    /// Chip ID from the header
    pub fn chip_id(&self) -> u8 {
        self.chip_id
    }

    /// Bunch counter bits 10:3 from the header
    pub fn bunch_counter(&self) -> u8 {
        self.bunch_counter
    }

    /// The reconstructed pixel coordinates, as `(col, row)`
    pub fn pixels(&self) -> &BTreeSet<(u16, u16)> {
        &self.pixels
    }

    /// Readout flags from the trailer, if the frame carried one
    pub fn readout_flags(&self) -> Option<ReadoutFlags> {
        self.readout_flags
    }

    /// The frame was a lone CHIP_EMPTY_FRAME word
    pub fn is_empty_frame(&self) -> bool {
        self.is_empty_frame
    }

    /// The frame saw its trailer (or was an empty frame)
    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

/// Reconstructs frames and gathers stream statistics from emitted words
#[derive(Debug, Default)]
pub struct AlpideEventBuilder {
    frames: Vec<AlpideFrame>,
    current_region: u8,
    word_stats: WordCountStats,
    readout_flag_stats: ReadoutFlagStats,
    protocol_errors: u64,
}

impl AlpideEventBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one word in transmission byte order `[byte2, byte1, byte0]`
    pub fn input_word(&mut self, bytes: [u8; 3]) {
        let id_byte = bytes[0];
        match AlpideWordKind::from_byte(id_byte) {
            Ok(AlpideWordKind::Comma) => self.word_stats.commas += 1,
            Ok(AlpideWordKind::Idle) => self.word_stats.idles += 1,
            Ok(AlpideWordKind::BusyOn) => self.word_stats.busy_on += 1,
            Ok(AlpideWordKind::BusyOff) => self.word_stats.busy_off += 1,
            Ok(AlpideWordKind::ChipHeader) => {
                self.word_stats.chip_headers += 1;
                self.frames.push(AlpideFrame::new(id_byte & 0x0F, bytes[1]));
                self.current_region = 0;
            }
            Ok(AlpideWordKind::ChipEmptyFrame) => {
                self.word_stats.chip_empty_frames += 1;
                let mut frame = AlpideFrame::new(id_byte & 0x0F, bytes[1]);
                frame.is_empty_frame = true;
                frame.completed = true;
                self.frames.push(frame);
            }
            Ok(AlpideWordKind::ChipTrailer) => {
                self.word_stats.chip_trailers += 1;
                self.readout_flag_stats.log(id_byte);
                if self.has_open_frame() {
                    let frame = self.frames.last_mut().unwrap();
                    frame.readout_flags = Some(ReadoutFlags::from_nibble(id_byte & 0x0F));
                    frame.completed = true;
                } else {
                    self.log_protocol_error("chip trailer without open frame");
                }
            }
            Ok(AlpideWordKind::RegionHeader) => {
                self.word_stats.region_headers += 1;
                self.current_region = id_byte & 0x1F;
                if !self.has_open_frame() {
                    self.log_protocol_error("region header without open frame");
                }
            }
            Ok(AlpideWordKind::DataShort) => {
                self.word_stats.data_shorts += 1;
                let (encoder_id, addr) = decode_data_word(bytes);
                self.add_pixel(encoder_id, addr);
            }
            Ok(AlpideWordKind::DataLong) => {
                self.word_stats.data_longs += 1;
                let (encoder_id, addr) = decode_data_word(bytes);
                self.add_pixel(encoder_id, addr);
                let hitmap = bytes[2] & 0x7F;
                for bit in 0..DATA_LONG_HITMAP_SIZE {
                    if hitmap & (1 << bit) != 0 {
                        self.add_pixel(encoder_id, addr + 1 + bit);
                    }
                }
            }
            Ok(AlpideWordKind::RegionTrailer) => {
                self.log_protocol_error("internal region trailer leaked onto the stream");
            }
            Err(()) => {
                self.word_stats.unknown += 1;
                log::warn!("unknown word ID byte {id_byte:#04X} on stream");
            }
        }
    }

    fn add_pixel(&mut self, encoder_id: u8, addr: u16) {
        if !self.has_open_frame() {
            self.log_protocol_error("data word without open frame");
            return;
        }
        let row = addr >> 1;
        let col_lsb = (addr & 1) ^ (row & 1);
        let col = u16::from(self.current_region) * 32 + u16::from(encoder_id) * 2 + col_lsb;
        let frame = self.frames.last_mut().unwrap();
        if !frame.pixels.insert((col, row)) {
            log::debug!("pixel ({col},{row}) appeared twice in one frame");
        }
    }

    fn has_open_frame(&self) -> bool {
        self.frames.last().is_some_and(|frame| !frame.completed)
    }

    fn log_protocol_error(&mut self, message: &str) {
        self.protocol_errors += 1;
        log::error!("stream protocol error: {message}");
    }

    /// All frames seen so far, in stream order
    pub fn frames(&self) -> &[AlpideFrame] {
        &self.frames
    }

    /// Number of completed frames
    pub fn num_completed_frames(&self) -> usize {
        self.frames.iter().filter(|frame| frame.completed).count()
    }

    /// Word counts observed so far
    pub fn word_stats(&self) -> WordCountStats {
        self.word_stats
    }

    /// Readout flag counts observed so far
    pub fn readout_flag_stats(&self) -> ReadoutFlagStats {
        self.readout_flag_stats
    }

    /// Words that violated the stream framing rules
    pub fn protocol_errors(&self) -> u64 {
        self.protocol_errors
    }
}

/// Decode encoder ID and address from a data word's first two bytes
fn decode_data_word(bytes: [u8; 3]) -> (u8, u16) {
    let encoder_id = (bytes[0] >> 2) & 0x0F;
    let addr = (u16::from(bytes[0] & 0x03) << 8) | u16::from(bytes[1]);
    (encoder_id, addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::words::data_word::AlpideDataWord;
    use pretty_assertions::assert_eq;

    fn feed(builder: &mut AlpideEventBuilder, words: &[AlpideDataWord]) {
        for word in words {
            builder.input_word(word.to_bytes());
        }
    }

    #[test]
    fn reconstructs_single_pixel_frame() {
        let mut builder = AlpideEventBuilder::new();
        feed(
            &mut builder,
            &[
                AlpideDataWord::ChipHeader {
                    chip_id: 0,
                    bunch_counter: 0,
                },
                AlpideDataWord::RegionHeader { region_id: 3 },
                AlpideDataWord::DataShort {
                    encoder_id: 2,
                    addr: 400,
                    pixels: Vec::new(),
                },
                AlpideDataWord::ChipTrailer {
                    flags: ReadoutFlags::default(),
                },
            ],
        );
        assert_eq!(builder.num_completed_frames(), 1);
        let frame = &builder.frames()[0];
        assert!(frame.is_completed());
        assert_eq!(frame.pixels().len(), 1);
        assert!(frame.pixels().contains(&(100, 200)));
        assert!(frame.readout_flags().unwrap().is_clear());
        assert_eq!(builder.protocol_errors(), 0);
    }

    #[test]
    fn expands_data_long_hitmap() {
        let mut builder = AlpideEventBuilder::new();
        feed(
            &mut builder,
            &[
                AlpideDataWord::ChipHeader {
                    chip_id: 1,
                    bunch_counter: 0,
                },
                AlpideDataWord::RegionHeader { region_id: 5 },
                AlpideDataWord::DataLong {
                    encoder_id: 7,
                    addr: 10,
                    hitmap: 0b000_0001,
                    pixels: Vec::new(),
                },
                AlpideDataWord::ChipTrailer {
                    flags: ReadoutFlags::default(),
                },
            ],
        );
        let frame = &builder.frames()[0];
        // addr 10 -> row 5, col 175; addr 11 -> row 5, col 174
        assert_eq!(frame.pixels().len(), 2);
        assert!(frame.pixels().contains(&(175, 5)));
        assert!(frame.pixels().contains(&(174, 5)));
    }

    #[test]
    fn empty_frame_word_stands_for_header_and_trailer() {
        let mut builder = AlpideEventBuilder::new();
        feed(
            &mut builder,
            &[
                AlpideDataWord::Comma,
                AlpideDataWord::ChipEmptyFrame {
                    chip_id: 2,
                    bunch_counter: 8,
                },
                AlpideDataWord::Comma,
            ],
        );
        assert_eq!(builder.num_completed_frames(), 1);
        let frame = &builder.frames()[0];
        assert!(frame.is_empty_frame());
        assert_eq!(frame.chip_id(), 2);
        assert_eq!(frame.bunch_counter(), 1);
        assert_eq!(builder.word_stats().commas, 2);
    }

    #[test]
    fn data_before_header_is_a_protocol_error() {
        let mut builder = AlpideEventBuilder::new();
        feed(
            &mut builder,
            &[AlpideDataWord::DataShort {
                encoder_id: 0,
                addr: 0,
                pixels: Vec::new(),
            }],
        );
        assert_eq!(builder.protocol_errors(), 1);
    }
}
