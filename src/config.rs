//! Contains the [Cfg] struct that parses and stores the command line arguments
//!
//! [Cfg] uses procedural macros from the `clap` library to implement most of the
//! argument parsing and validation logic. Convenience access to the various parts
//! of the configuration goes through the option traits ([prelude]).

use clap::Parser;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::config::chip::{ChipConfig, ChipOpt};
use crate::config::inputoutput::{DataOutputMode, InputOutputOpt};
use crate::config::lib::Config;
use crate::config::sim::SimOpt;
use crate::config::util::UtilOpt;

pub mod chip;
pub mod inputoutput;
pub mod lib;
pub mod prelude;
pub mod sim;
pub mod test_util;
pub mod util;

/// The [CONFIG] static stores the [Cfg] created from the parsed command line arguments
pub static CONFIG: OnceLock<Cfg> = OnceLock::new();
/// Chip configuration loaded from a TOML file, when one was given on the command line
static CHIP_CONFIG_FILE: OnceLock<ChipConfig> = OnceLock::new();

/// Parse the command line arguments, validate them, and store the global [Cfg]
pub fn init_config() -> Result<(), String> {
    let cfg = Cfg::parse();
    if let Some(path) = &cfg.chip_config {
        let toml_str = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read chip config file: {e}"))?;
        let chip_cfg: ChipConfig = toml::from_str(&toml_str)
            .map_err(|e| format!("Failed to parse chip config file: {e}"))?;
        CHIP_CONFIG_FILE
            .set(chip_cfg)
            .expect("chip config file already loaded");
    }
    cfg.validate_args()?;
    CONFIG
        .set(cfg)
        .map_err(|_| "Config already initialized".to_string())?;
    Ok(())
}

/// The command line configuration of the simulator
#[derive(Parser, Debug)]
#[command(name = "alpidesim")]
#[command(bin_name = "alpidesim", version)]
#[command(about = "Cycle-accurate simulator of the ALPIDE chip readout data path")]
#[command(
    long_about = "\nalpidesim drives a behavioral model of the ALPIDE pixel chip\n\
with a configurable trigger schedule and deterministic pixel hits, and\n\
emits the 24-bit serial data stream a real chip would produce, along\n\
with utilization statistics of the readout data path."
)]
pub struct Cfg {
    /// Number of 40 MHz clock cycles to simulate
    #[arg(long, default_value_t = 400_000)]
    cycles: u64,

    /// Period between triggers in nanoseconds
    #[arg(long = "trigger-period", default_value_t = 10_000)]
    trigger_period_ns: u64,

    /// Number of triggers to send
    #[arg(long = "triggers", default_value_t = 32)]
    num_triggers: u64,

    /// Pixel hits injected per trigger (deterministic test pattern)
    #[arg(long = "hits-per-trigger", default_value_t = 16)]
    hits_per_trigger: usize,

    /// Chip ID carried in chip headers and trailers (0..=15)
    #[arg(long, default_value_t = 0)]
    chip_id: u8,

    /// Depth of each per-region FIFO
    #[arg(long, default_value_t = 128)]
    region_fifo_size: usize,

    /// Depth of the DMU output FIFO
    #[arg(long, default_value_t = 64)]
    dmu_fifo_size: usize,

    /// Output latency of the DTU in whole 24-bit words
    #[arg(long, default_value_t = 2)]
    dtu_delay_cycles: usize,

    /// Strobe duration from each trigger, in nanoseconds
    #[arg(long, default_value_t = 100)]
    strobe_length_ns: u64,

    /// Triggers during an active strobe extend it instead of being rejected
    #[arg(long)]
    strobe_extension: bool,

    /// Use the continuous mode multi event buffer policy
    #[arg(long)]
    continuous_mode: bool,

    /// Disable clustering (every hit is sent as DATA SHORT)
    #[arg(long)]
    no_clustering: bool,

    /// Read the pixel matrix at half speed
    #[arg(long)]
    slow_matrix_readout: bool,

    /// TOML file with the chip options (overrides the chip flags)
    #[arg(long)]
    chip_config: Option<PathBuf>,

    /// Write the raw 24-bit serial stream to this file ("stdout" for stdout)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Parse the emitted stream back and include stream stats in the report
    #[arg(long)]
    check: bool,

    /// Verbosity level (-v = warn, -vv = info, -vvv = debug, -vvvv = trace)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbosity: u8,
}

impl Cfg {
    /// The global config, initialized by [init_config]
    pub fn global() -> &'static Cfg {
        CONFIG.get().expect("Config not initialized")
    }
}

impl Config for Cfg {}

impl UtilOpt for Cfg {
    fn verbosity(&self) -> u8 {
        self.verbosity
    }
}

impl SimOpt for Cfg {
    fn cycles(&self) -> u64 {
        self.cycles
    }
    fn trigger_period_ns(&self) -> u64 {
        self.trigger_period_ns
    }
    fn num_triggers(&self) -> u64 {
        self.num_triggers
    }
    fn hits_per_trigger(&self) -> usize {
        self.hits_per_trigger
    }
}

impl InputOutputOpt for Cfg {
    fn output(&self) -> Option<&PathBuf> {
        self.output.as_ref()
    }
    fn output_mode(&self) -> DataOutputMode {
        match &self.output {
            Some(path) if path.to_str() == Some("stdout") => DataOutputMode::Stdout,
            Some(path) => DataOutputMode::File(path.clone()),
            None => DataOutputMode::None,
        }
    }
    fn check_enabled(&self) -> bool {
        self.check
    }
}

impl ChipOpt for Cfg {
    fn chip_config(&self) -> ChipConfig {
        if let Some(from_file) = CHIP_CONFIG_FILE.get() {
            return *from_file;
        }
        ChipConfig {
            chip_id: self.chip_id,
            region_fifo_size: self.region_fifo_size,
            dmu_fifo_size: self.dmu_fifo_size,
            dtu_delay_cycles: self.dtu_delay_cycles,
            strobe_length_ns: self.strobe_length_ns,
            strobe_extension: self.strobe_extension,
            enable_clustering: !self.no_clustering,
            continuous_mode: self.continuous_mode,
            matrix_readout_speed: !self.slow_matrix_readout,
        }
    }
}
