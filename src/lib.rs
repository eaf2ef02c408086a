// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Thermal and fan control engine.
//!
//! Captures tachometer edges, converts thermistor samples to Celsius, picks a
//! target duty from a stepped fan curve, ramps the PWM output toward it and
//! raises edge-triggered alarms. Hardware is reached only through the traits
//! in [`clock`] and [`hw`], so the same engine runs against real peripherals
//! or the simulated board in [`sim`].

pub mod alarm;
pub mod clock;
pub mod config;
pub mod curve;
pub mod engine;
pub mod error;
pub mod hw;
pub mod ramp;
pub mod sim;
pub mod status;
pub mod tach;
pub mod thermistor;

pub use engine::{Engine, EngineSettings};
pub use error::{CurveError, EngineError};
