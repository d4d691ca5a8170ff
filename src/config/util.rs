//! Options not directly related to the simulation itself

/// Access to the utility options of a config
pub trait UtilOpt {
    /// Verbosity level of the logger
    fn verbosity(&self) -> u8;
}
