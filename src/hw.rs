// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Hardware seams.
//!
//! The engine reads thermistors through [`AnalogInput`] and drives fans
//! through [`PwmOutput`]. Channel numbers are the same small integers the
//! engine uses everywhere else.

use std::sync::Arc;

/// Single-ended ADC access, one channel per thermistor.
pub trait AnalogInput: Send + Sync {
    /// Raw sample for `sensor`. Negative values signal a failed conversion.
    fn read_raw(&self, sensor: usize) -> i32;
}

/// PWM duty output, one channel per fan.
pub trait PwmOutput: Send + Sync {
    /// Drive `fan` at `duty` (0-255).
    fn set_duty(&self, fan: usize, duty: u8);
}

impl<T: AnalogInput + ?Sized> AnalogInput for Arc<T> {
    fn read_raw(&self, sensor: usize) -> i32 {
        (**self).read_raw(sensor)
    }
}

impl<T: PwmOutput + ?Sized> PwmOutput for Arc<T> {
    fn set_duty(&self, fan: usize, duty: u8) {
        (**self).set_duty(fan, duty)
    }
}
