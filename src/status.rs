// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Best-effort status snapshot for reporting collaborators.
//!
//! Values are read without stopping the control task, so a snapshot may mix
//! readings from adjacent ticks. Snapshots are encoded as newline-delimited
//! JSON.

use crate::alarm::AlarmState;
use serde::{Deserialize, Serialize};

/// Live readings for a fan channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanStatus {
    pub id: usize,
    /// Temperature channel feeding this fan's curve
    pub sensor: usize,
    pub rpm: u32,
    /// Duty currently driven, 0-255
    pub duty: u8,
    /// Duty the ramp is heading for, 0-255
    pub target_duty: u8,
    pub ramping: bool,
}

/// Live reading for a temperature channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempStatus {
    pub id: usize,
    /// Degrees Celsius, `None` when the sensor is unavailable
    pub temp_c: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub fans: Vec<FanStatus>,
    pub temps: Vec<TempStatus>,
    pub alarms: AlarmState,
}

/// Encode a message as a newline-delimited JSON string.
pub fn encode<T: Serialize>(msg: &T) -> Result<String, serde_json::Error> {
    let mut s = serde_json::to_string(msg)?;
    s.push('\n');
    Ok(s)
}
