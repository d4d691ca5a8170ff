//! Convenience re-exports of the config traits and types

pub use super::chip::{ChipConfig, ChipOpt};
pub use super::inputoutput::{DataOutputMode, InputOutputOpt};
pub use super::lib::Config;
pub use super::sim::SimOpt;
pub use super::util::UtilOpt;
