// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Engine error types.
//!
//! Only configuration input can fail. Sensor loss and stalled fans are
//! reported as data (sentinel temperatures, zero RPM, alarm flags).

use thiserror::Error;

/// Reasons a fan curve is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CurveError {
    #[error("curve has no points")]
    Empty,
    #[error("thresholds must be strictly ascending (point {index})")]
    NotAscending { index: usize },
    #[error("threshold is not a finite number (point {index})")]
    NonFiniteThreshold { index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid curve: {0}")]
    InvalidCurve(#[from] CurveError),
    #[error("unknown fan channel {0}")]
    UnknownFan(usize),
    #[error("unknown sensor channel {0}")]
    UnknownSensor(usize),
}
