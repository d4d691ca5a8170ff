//! Contains the [Config] super trait required by the simulation entry points

use crate::chip::CLOCK_PERIOD_NS;
use crate::config::chip::ChipOpt;
use crate::config::inputoutput::InputOutputOpt;
use crate::config::sim::SimOpt;
use crate::config::util::UtilOpt;

/// Super trait for all the option traits a config struct has to implement
pub trait Config: Send + Sync + Sized
where
    Self: UtilOpt + ChipOpt + SimOpt + InputOutputOpt,
{
    /// Validate the combination of options
    fn validate_args(&self) -> Result<(), String> {
        let chip = self.chip_config();
        if chip.chip_id > 15 {
            return Err(format!(
                "Invalid config: chip ID must be 0..=15 (got: {id})",
                id = chip.chip_id
            ));
        }
        if chip.region_fifo_size < 2 {
            return Err(format!(
                "Invalid config: region FIFO needs room for data and trailer (got: {size})",
                size = chip.region_fifo_size
            ));
        }
        if chip.dmu_fifo_size == 0 {
            return Err("Invalid config: DMU FIFO size cannot be 0".to_string());
        }
        if chip.strobe_length_ns < CLOCK_PERIOD_NS {
            return Err(format!(
                "Invalid config: strobe length below one clock period ({CLOCK_PERIOD_NS} ns)"
            ));
        }
        if self.num_triggers() > 0 && self.trigger_period_ns() < CLOCK_PERIOD_NS {
            return Err(format!(
                "Invalid config: trigger period below one clock period ({CLOCK_PERIOD_NS} ns)"
            ));
        }
        Ok(())
    }
}
