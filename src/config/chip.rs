//! The chip instantiation options

use serde::{Deserialize, Serialize};

/// Options the [Alpide][crate::chip::Alpide] chip model is instantiated with.
///
/// Also loadable from a TOML file; missing keys take their default value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChipConfig {
    /// Chip ID carried in chip headers and trailers (0..=15)
    pub chip_id: u8,
    /// Depth of each per-region FIFO
    pub region_fifo_size: usize,
    /// Depth of the DMU output FIFO
    pub dmu_fifo_size: usize,
    /// Output latency of the DTU in whole 24-bit words (0 bypasses the delay)
    pub dtu_delay_cycles: usize,
    /// Strobe duration from each trigger, in nanoseconds
    pub strobe_length_ns: u64,
    /// Triggers during an active strobe extend it instead of being rejected
    pub strobe_extension: bool,
    /// Allow DATA LONG words (clusters); otherwise DATA SHORT only
    pub enable_clustering: bool,
    /// Continuous mode multi event buffer policy; false is triggered mode
    pub continuous_mode: bool,
    /// True: read one pixel every 2nd clock. False: every 3rd clock.
    pub matrix_readout_speed: bool,
}

impl Default for ChipConfig {
    fn default() -> Self {
        Self {
            chip_id: 0,
            region_fifo_size: 128,
            dmu_fifo_size: 64,
            dtu_delay_cycles: 2,
            strobe_length_ns: 100,
            strobe_extension: false,
            enable_clustering: true,
            continuous_mode: false,
            matrix_readout_speed: true,
        }
    }
}

/// Access to the chip options of a config
pub trait ChipOpt {
    /// The chip options to instantiate the model with
    fn chip_config(&self) -> ChipConfig;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_toml_fills_defaults() {
        let parsed: ChipConfig =
            toml::from_str("chip_id = 4\ncontinuous_mode = true\n").unwrap();
        assert_eq!(parsed.chip_id, 4);
        assert!(parsed.continuous_mode);
        assert_eq!(parsed.region_fifo_size, ChipConfig::default().region_fifo_size);
    }

    #[test]
    fn toml_round_trip() {
        let cfg = ChipConfig {
            strobe_length_ns: 5_000,
            strobe_extension: true,
            ..ChipConfig::default()
        };
        let serialized = toml::to_string(&cfg).unwrap();
        let parsed: ChipConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed, cfg);
    }
}
