//! Actuator rails switched from GPIO lines.

use embassy_stm32::gpio::Output;
use ois_core::power::{PowerError, PowerRail, PowerSequencer, PowerSetting};

pub struct GpioPowerSequencer<'d> {
    vana: Output<'d>,
    vdig: Output<'d>,
    vio: Output<'d>,
    vaf: Output<'d>,
    reset: Output<'d>,
    standby: Output<'d>,
}

impl<'d> GpioPowerSequencer<'d> {
    pub fn new(
        vana: Output<'d>,
        vdig: Output<'d>,
        vio: Output<'d>,
        vaf: Output<'d>,
        reset: Output<'d>,
        standby: Output<'d>,
    ) -> Self {
        Self {
            vana,
            vdig,
            vio,
            vaf,
            reset,
            standby,
        }
    }

    fn output_mut(&mut self, rail: PowerRail) -> Result<&mut Output<'d>, PowerError> {
        match rail {
            PowerRail::Vana => Ok(&mut self.vana),
            PowerRail::Vdig => Ok(&mut self.vdig),
            PowerRail::Vio => Ok(&mut self.vio),
            PowerRail::Vaf => Ok(&mut self.vaf),
            PowerRail::Reset => Ok(&mut self.reset),
            PowerRail::Standby => Ok(&mut self.standby),
            PowerRail::Mclk | PowerRail::Custom(_) => Err(PowerError::UnsupportedRail(rail)),
        }
    }

    /// Nonzero `config` drives the line high.
    fn run(&mut self, steps: &[PowerSetting]) -> Result<(), PowerError> {
        for step in steps {
            let output = self.output_mut(step.rail)?;
            if step.config == 0 {
                output.set_low();
            } else {
                output.set_high();
            }
            defmt::trace!("power: {} <- {}", step.rail, step.config);
            if step.delay_ms > 0 {
                super::spin(core::time::Duration::from_millis(u64::from(step.delay_ms)));
            }
        }
        Ok(())
    }
}

impl PowerSequencer for GpioPowerSequencer<'_> {
    fn power_up(&mut self, steps: &[PowerSetting]) -> Result<(), PowerError> {
        self.run(steps)
    }

    fn power_down(&mut self, steps: &[PowerSetting]) -> Result<(), PowerError> {
        self.run(steps)
    }
}
