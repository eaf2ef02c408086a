// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! NTC thermistor readout.
//!
//! The thermistor is the low leg of a divider against a reference resistor
//! tied to the supply. A raw ADC count becomes a voltage, the voltage becomes
//! a resistance, and the Beta equation turns that into Kelvin:
//!
//! ```text
//! R      = R_ref * V / (V_supply - V)
//! 1 / T  = 1 / T_nominal + ln(R / R_nominal) / B
//! ```
//!
//! Invalid samples produce [`UNAVAILABLE_C`]. Anything at or below 0 °C is
//! treated as "no sensor" by consumers; the cooling loop this serves never
//! legitimately reaches that band.

use serde::{Deserialize, Serialize};

/// Sentinel returned when a sample cannot be converted.
pub const UNAVAILABLE_C: f64 = -1.0;

const KELVIN_OFFSET: f64 = 273.15;

/// Divider and thermistor constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermistorConfig {
    /// Fixed divider resistor, ohms
    pub reference_resistance_ohms: f64,
    /// Thermistor resistance at the nominal temperature, ohms
    pub nominal_resistance_ohms: f64,
    /// Nominal temperature, degrees Celsius
    pub nominal_temperature_c: f64,
    /// Beta coefficient, Kelvin
    pub beta: f64,
    /// Largest positive ADC count
    pub adc_full_scale: i32,
    /// Voltage represented by `adc_full_scale`
    pub adc_span_volts: f64,
    /// Divider supply voltage
    pub supply_volts: f64,
}

impl Default for ThermistorConfig {
    fn default() -> Self {
        Self {
            reference_resistance_ohms: 10_000.0,
            nominal_resistance_ohms: 10_000.0,
            nominal_temperature_c: 25.0,
            beta: 3950.0,
            adc_full_scale: 32_767,
            adc_span_volts: 6.144,
            supply_volts: 3.3,
        }
    }
}

impl ThermistorConfig {
    /// Convert a raw ADC count to degrees Celsius, or [`UNAVAILABLE_C`].
    pub fn celsius_from_raw(&self, raw: i32) -> f64 {
        if raw < 0 || self.adc_full_scale <= 0 {
            return UNAVAILABLE_C;
        }

        let volts = f64::from(raw) * self.adc_span_volts / f64::from(self.adc_full_scale);
        let resistance = self.reference_resistance_ohms * volts / (self.supply_volts - volts);
        if !resistance.is_finite() || resistance <= 0.0 {
            return UNAVAILABLE_C;
        }

        let inverse_kelvin = 1.0 / (self.nominal_temperature_c + KELVIN_OFFSET)
            + (resistance / self.nominal_resistance_ohms).ln() / self.beta;
        let celsius = 1.0 / inverse_kelvin - KELVIN_OFFSET;

        if celsius.is_finite() {
            celsius
        } else {
            UNAVAILABLE_C
        }
    }

    /// The ADC count a thermistor at `celsius` would produce. Used to feed
    /// simulated and scripted inputs.
    pub fn raw_from_celsius(&self, celsius: f64) -> i32 {
        let kelvin = celsius + KELVIN_OFFSET;
        let nominal_kelvin = self.nominal_temperature_c + KELVIN_OFFSET;
        let resistance =
            self.nominal_resistance_ohms * (self.beta * (1.0 / kelvin - 1.0 / nominal_kelvin)).exp();
        let volts = self.supply_volts * resistance / (self.reference_resistance_ohms + resistance);
        let raw = (volts * f64::from(self.adc_full_scale) / self.adc_span_volts).round();
        raw.clamp(0.0, f64::from(self.adc_full_scale)) as i32
    }
}

/// Whether a reading is a usable temperature rather than the sentinel band.
pub fn is_available(celsius: f64) -> bool {
    celsius.is_finite() && celsius > 0.0
}
