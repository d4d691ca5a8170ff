//! Options controlling where the emitted data stream goes

use std::path::PathBuf;

/// Destination of the raw serial stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataOutputMode {
    /// Write to the given file
    File(PathBuf),
    /// Write to stdout
    Stdout,
    /// Suppress data output
    None,
}

/// Access to the input/output options of a config
pub trait InputOutputOpt {
    /// Output destination path, if one was given
    fn output(&self) -> Option<&PathBuf>;
    /// Resolved output mode
    fn output_mode(&self) -> DataOutputMode;
    /// The emitted stream should be parsed back and verified
    fn check_enabled(&self) -> bool;
}
