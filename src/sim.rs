// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Simulated fan board.
//!
//! Stands in for the real peripherals: PWM writes set each fan's drive, fan
//! speed follows drive with first-order lag, and a lumped thermal model
//! settles between `ambient_c` (all fans flat out) and
//! `ambient_c + heat_load_c` (all fans stopped). Thermistor channels are
//! reported as the ADC counts the real divider would produce.

use crate::config::SimulationConfig;
use crate::hw::{AnalogInput, PwmOutput};
use crate::thermistor::ThermistorConfig;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

/// Fan spin-up/down time constant.
const FAN_TIME_CONSTANT_MS: f64 = 1500.0;

/// Coolant loop time constant.
const THERMAL_TIME_CONSTANT_MS: f64 = 20_000.0;

/// Each further sensor reads this much warmer than the previous one.
const SENSOR_SPREAD_C: f64 = 1.5;

pub struct SimBoard {
    params: SimulationConfig,
    thermistor: ThermistorConfig,
    pulses_per_revolution: u32,
    duties: Vec<AtomicU8>,
    rpm: Vec<AtomicU64>,
    coolant_c: AtomicU64,
    sensor_count: usize,
}

impl SimBoard {
    pub fn new(
        params: SimulationConfig,
        thermistor: ThermistorConfig,
        fan_count: usize,
        sensor_count: usize,
        pulses_per_revolution: u32,
    ) -> Self {
        let start_c = params.ambient_c + params.heat_load_c / 2.0;
        Self {
            params,
            thermistor,
            pulses_per_revolution: pulses_per_revolution.max(1),
            duties: (0..fan_count).map(|_| AtomicU8::new(0)).collect(),
            rpm: (0..fan_count).map(|_| AtomicU64::new(0f64.to_bits())).collect(),
            coolant_c: AtomicU64::new(start_c.to_bits()),
            sensor_count,
        }
    }

    pub fn rpm(&self, fan: usize) -> f64 {
        self.rpm
            .get(fan)
            .map_or(0.0, |r| f64::from_bits(r.load(Ordering::Relaxed)))
    }

    pub fn duty(&self, fan: usize) -> u8 {
        self.duties.get(fan).map_or(0, |d| d.load(Ordering::Relaxed))
    }

    pub fn sensor_temperature(&self, sensor: usize) -> f64 {
        f64::from_bits(self.coolant_c.load(Ordering::Relaxed)) + sensor as f64 * SENSOR_SPREAD_C
    }

    /// Time between tachometer edges at the fan's current speed, or `None`
    /// when the rotor is effectively still.
    pub fn tach_period(&self, fan: usize) -> Option<Duration> {
        if self.params.stalled_fans.contains(&fan) {
            return None;
        }
        let rpm = self.rpm(fan);
        if rpm < 1.0 {
            return None;
        }
        let edges_per_minute = rpm * f64::from(self.pulses_per_revolution);
        Some(Duration::from_secs_f64(60.0 / edges_per_minute))
    }

    /// Integrate the plant forward by `dt_ms`.
    pub fn step(&self, dt_ms: u64) {
        let dt = dt_ms as f64;
        let fan_alpha = 1.0 - (-dt / FAN_TIME_CONSTANT_MS).exp();
        let mut total_drive = 0.0;

        for (fan, (duty, rpm)) in self.duties.iter().zip(&self.rpm).enumerate() {
            let drive = if self.params.stalled_fans.contains(&fan) {
                0.0
            } else {
                f64::from(duty.load(Ordering::Relaxed)) / 255.0
            };
            total_drive += drive;

            let current = f64::from_bits(rpm.load(Ordering::Relaxed));
            let target = drive * f64::from(self.params.max_rpm);
            let next = current + (target - current) * fan_alpha;
            rpm.store(next.to_bits(), Ordering::Relaxed);
        }

        let mean_drive = if self.duties.is_empty() {
            0.0
        } else {
            total_drive / self.duties.len() as f64
        };
        let equilibrium = self.params.ambient_c + self.params.heat_load_c * (1.0 - mean_drive);
        let thermal_alpha = 1.0 - (-dt / THERMAL_TIME_CONSTANT_MS).exp();
        let current = f64::from_bits(self.coolant_c.load(Ordering::Relaxed));
        let next = current + (equilibrium - current) * thermal_alpha;
        self.coolant_c.store(next.to_bits(), Ordering::Relaxed);
    }
}

impl AnalogInput for SimBoard {
    fn read_raw(&self, sensor: usize) -> i32 {
        if sensor >= self.sensor_count {
            return -1;
        }
        self.thermistor
            .raw_from_celsius(self.sensor_temperature(sensor))
    }
}

impl PwmOutput for SimBoard {
    fn set_duty(&self, fan: usize, duty: u8) {
        if let Some(d) = self.duties.get(fan) {
            d.store(duty, Ordering::Relaxed);
        }
    }
}
