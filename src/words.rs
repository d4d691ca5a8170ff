//! Definitions of the 24-bit ALPIDE data words and the chip trailer readout flags

pub mod data_word;
pub mod readout_flags;
