//! Stats gathered from the emitted ALPIDE word stream

use serde::{Deserialize, Serialize};

/// Counts of chip trailer readout flags seen on the stream.
///
/// The three abort encodings are exact nibble matches and exclude the
/// individual flag counts; for every other trailer the individual flag bits
/// are counted separately.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadoutFlagStats {
    chip_trailers_seen: u32,
    busy_violations: u32,       // 4'b1000
    data_overrun: u32,          // 4'b1100
    transmission_in_fatal: u32, // 4'b1110
    flushed_incomplete: u32,    // 4'bx1xx
    strobe_extended: u32,       // 4'bxx1x
    busy_transitions: u32,      // 4'bxxx1
}

impl ReadoutFlagStats {
    const CHIP_TRAILER_BUSY_VIOLATION: u8 = 0b1011_1000;
    const CHIP_TRAILER_DATA_OVERRUN: u8 = 0b1011_1100;
    const CHIP_TRAILER_TRANSMISSION_IN_FATAL: u8 = 0b1011_1110;

    /// Log the ID byte of one chip trailer
    pub fn log(&mut self, chip_trailer: u8) {
        self.chip_trailers_seen += 1;
        if chip_trailer == Self::CHIP_TRAILER_BUSY_VIOLATION {
            self.busy_violations += 1;
            return; // The other flags are not set in this case
        } else if chip_trailer == Self::CHIP_TRAILER_DATA_OVERRUN {
            self.data_overrun += 1;
            return;
        } else if chip_trailer == Self::CHIP_TRAILER_TRANSMISSION_IN_FATAL {
            self.transmission_in_fatal += 1;
            return;
        }
        if chip_trailer & 0b0000_0100 != 0 {
            self.flushed_incomplete += 1;
        }
        if chip_trailer & 0b0000_0010 != 0 {
            self.strobe_extended += 1;
        }
        if chip_trailer & 0b0000_0001 != 0 {
            self.busy_transitions += 1;
        }
    }

    /// Total chip trailers observed
    pub fn chip_trailers_seen(&self) -> u32 {
        self.chip_trailers_seen
    }
    /// Trailers with the plain busy violation encoding
    pub fn busy_violations(&self) -> u32 {
        self.busy_violations
    }
    /// Trailers with the forced data overrun encoding
    pub fn data_overrun(&self) -> u32 {
        self.data_overrun
    }
    /// Trailers with the forced fatal-mode encoding
    pub fn transmission_in_fatal(&self) -> u32 {
        self.transmission_in_fatal
    }
    /// Trailers with the flushed incomplete bit
    pub fn flushed_incomplete(&self) -> u32 {
        self.flushed_incomplete
    }
    /// Trailers with the strobe extended bit
    pub fn strobe_extended(&self) -> u32 {
        self.strobe_extended
    }
    /// Trailers with the busy transition bit
    pub fn busy_transitions(&self) -> u32 {
        self.busy_transitions
    }
}

/// Counts per word kind observed on the serial stream
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordCountStats {
    /// Inter-frame comma words
    pub commas: u64,
    /// Idle words
    pub idles: u64,
    /// Busy on words
    pub busy_on: u64,
    /// Busy off words
    pub busy_off: u64,
    /// Chip headers
    pub chip_headers: u64,
    /// Chip trailers
    pub chip_trailers: u64,
    /// Chip empty frames
    pub chip_empty_frames: u64,
    /// Region headers
    pub region_headers: u64,
    /// Data short words
    pub data_shorts: u64,
    /// Data long words
    pub data_longs: u64,
    /// Words with an undecodable ID byte
    pub unknown: u64,
}

impl WordCountStats {
    /// Number of pixel hits carried by the counted data words
    pub fn pixel_hits(&self, data_long_avg_hitmap_bits: f64) -> f64 {
        self.data_shorts as f64 + self.data_longs as f64 * (1.0 + data_long_avg_hitmap_bits)
    }
}
