//! A mock config for tests

use std::path::PathBuf;

use crate::config::chip::{ChipConfig, ChipOpt};
use crate::config::inputoutput::{DataOutputMode, InputOutputOpt};
use crate::config::lib::Config;
use crate::config::sim::SimOpt;
use crate::config::util::UtilOpt;

/// Configuration double with public fields, for use in tests
#[derive(Debug, Clone, PartialEq)]
pub struct MockConfig {
    /// Chip options
    pub chip: ChipConfig,
    /// Clock cycles to simulate
    pub cycles: u64,
    /// Trigger period in ns
    pub trigger_period_ns: u64,
    /// Number of triggers to send
    pub num_triggers: u64,
    /// Hits injected per trigger
    pub hits_per_trigger: usize,
    /// Stream output destination
    pub output: Option<PathBuf>,
    /// Parse the stream back
    pub check: bool,
    /// Logger verbosity
    pub verbosity: u8,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            chip: ChipConfig::default(),
            cycles: 4_000,
            trigger_period_ns: 2_000,
            num_triggers: 4,
            hits_per_trigger: 4,
            output: None,
            check: false,
            verbosity: 0,
        }
    }
}

impl MockConfig {
    /// A default mock config
    pub fn new() -> Self {
        Self::default()
    }
}

impl Config for MockConfig {}

impl UtilOpt for MockConfig {
    fn verbosity(&self) -> u8 {
        self.verbosity
    }
}

impl SimOpt for MockConfig {
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

impl InputOutputOpt for MockConfig {
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

impl ChipOpt for MockConfig {
    fn chip_config(&self) -> ChipConfig {
        self.chip
    }
}
