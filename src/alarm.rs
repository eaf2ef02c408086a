// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Temperature-high and RPM-low alarms.
//!
//! Both flags are recomputed from scratch every control cycle as the OR over
//! all fan channels, so they clear as soon as the condition does. Only a
//! false to true transition produces an [`AlarmEvent`].

use crate::thermistor;
use serde::{Deserialize, Serialize};

/// Per-channel alarm thresholds. `None` disables that alarm.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AlarmThresholds {
    /// Alarm when the bound sensor reads at or above this, degrees Celsius
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<f32>,
    /// Alarm when the fan spins slower than this
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpm: Option<u32>,
}

impl AlarmThresholds {
    /// Build from sentinel-style values: a non-positive temperature or a
    /// negative RPM disables the corresponding alarm.
    pub fn from_raw(temperature_c: f32, rpm: i32) -> Self {
        Self {
            temperature_c: (temperature_c > 0.0).then_some(temperature_c),
            rpm: u32::try_from(rpm).ok(),
        }
    }

    pub fn temperature_exceeded(&self, temperature_c: f64) -> bool {
        thermistor::is_available(temperature_c)
            && self
                .temperature_c
                .is_some_and(|limit| temperature_c >= f64::from(limit))
    }

    pub fn rpm_too_low(&self, rpm: u32) -> bool {
        self.rpm.is_some_and(|limit| rpm < limit)
    }
}

/// Process-wide alarm flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AlarmState {
    pub temp_alarm: bool,
    pub rpm_alarm: bool,
}

impl AlarmState {
    /// Buzzer pitch for the current state. The temperature alarm wins.
    pub fn buzzer_tone_hz(&self) -> Option<u32> {
        if self.temp_alarm {
            Some(1000)
        } else if self.rpm_alarm {
            Some(4000)
        } else {
            None
        }
    }
}

/// One fan channel's inputs for a single alarm evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelReading {
    pub fan: usize,
    pub sensor: usize,
    pub temperature_c: f64,
    pub rpm: u32,
    pub thresholds: AlarmThresholds,
}

/// Fired once when an alarm goes from inactive to active.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlarmEvent {
    TemperatureHigh {
        fan: usize,
        sensor: usize,
        temperature_c: f64,
    },
    RpmLow {
        fan: usize,
        rpm: u32,
    },
}

/// Edge-triggered latch over the per-cycle alarm levels.
#[derive(Debug, Default)]
pub struct AlarmMonitor {
    state: AlarmState,
}

impl AlarmMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    /// Re-derive both flags from `readings` and report rising edges.
    pub fn update(&mut self, readings: &[ChannelReading]) -> Vec<AlarmEvent> {
        let hot = readings
            .iter()
            .find(|r| r.thresholds.temperature_exceeded(r.temperature_c));
        let slow = readings.iter().find(|r| r.thresholds.rpm_too_low(r.rpm));

        let mut events = Vec::new();

        if let Some(r) = hot {
            if !self.state.temp_alarm {
                log::warn!(
                    "ALARM: temperature high on sensor {} for fan {} ({:.1}C)",
                    r.sensor,
                    r.fan,
                    r.temperature_c
                );
                events.push(AlarmEvent::TemperatureHigh {
                    fan: r.fan,
                    sensor: r.sensor,
                    temperature_c: r.temperature_c,
                });
            }
        } else if self.state.temp_alarm {
            log::info!("Temperature alarm cleared");
        }

        if let Some(r) = slow {
            if !self.state.rpm_alarm {
                log::warn!("ALARM: RPM low on fan {} ({} RPM)", r.fan, r.rpm);
                events.push(AlarmEvent::RpmLow {
                    fan: r.fan,
                    rpm: r.rpm,
                });
            }
        } else if self.state.rpm_alarm {
            log::info!("RPM alarm cleared");
        }

        self.state = AlarmState {
            temp_alarm: hot.is_some(),
            rpm_alarm: slow.is_some(),
        };
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(fan: usize, temperature_c: f64, rpm: u32, thresholds: AlarmThresholds) -> ChannelReading {
        ChannelReading {
            fan,
            sensor: 0,
            temperature_c,
            rpm,
            thresholds,
        }
    }

    fn limits() -> AlarmThresholds {
        AlarmThresholds {
            temperature_c: Some(40.0),
            rpm: Some(300),
        }
    }

    #[test]
    fn test_from_raw_sentinels() {
        assert_eq!(AlarmThresholds::from_raw(999.0, -1).rpm, None);
        assert_eq!(AlarmThresholds::from_raw(999.0, -1).temperature_c, Some(999.0));
        assert_eq!(AlarmThresholds::from_raw(0.0, 0).temperature_c, None);
        assert_eq!(AlarmThresholds::from_raw(0.0, 0).rpm, Some(0));
    }

    #[test]
    fn test_temperature_alarm_needs_valid_reading() {
        let t = limits();
        assert!(t.temperature_exceeded(40.0));
        assert!(!t.temperature_exceeded(39.9));
        assert!(!t.temperature_exceeded(thermistor::UNAVAILABLE_C));
        assert!(!AlarmThresholds::default().temperature_exceeded(120.0));
    }

    #[test]
    fn test_rpm_alarm_is_strictly_below() {
        let t = limits();
        assert!(t.rpm_too_low(0));
        assert!(t.rpm_too_low(299));
        assert!(!t.rpm_too_low(300));
        assert!(!AlarmThresholds::default().rpm_too_low(0));
    }

    #[test]
    fn test_fires_once_per_rising_edge() {
        let mut monitor = AlarmMonitor::new();
        let hot = [reading(0, 45.0, 1200, limits())];

        let events = monitor.update(&hot);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], AlarmEvent::TemperatureHigh { fan: 0, .. }));

        for _ in 0..10 {
            assert!(monitor.update(&hot).is_empty());
            assert!(monitor.state().temp_alarm);
        }
    }

    #[test]
    fn test_clears_and_refires() {
        let mut monitor = AlarmMonitor::new();
        let stalled = [reading(2, 30.0, 0, limits())];
        let spinning = [reading(2, 30.0, 900, limits())];

        assert_eq!(monitor.update(&stalled).len(), 1);
        assert!(monitor.update(&spinning).is_empty());
        assert_eq!(monitor.state(), AlarmState::default());
        assert_eq!(
            monitor.update(&stalled),
            vec![AlarmEvent::RpmLow { fan: 2, rpm: 0 }]
        );
    }

    #[test]
    fn test_flags_are_or_across_channels() {
        let mut monitor = AlarmMonitor::new();
        let readings = [
            reading(0, 30.0, 1000, limits()),
            reading(1, 30.0, 100, limits()),
            reading(2, 41.0, 1000, AlarmThresholds::default()),
        ];
        let events = monitor.update(&readings);
        assert_eq!(events, vec![AlarmEvent::RpmLow { fan: 1, rpm: 100 }]);
        assert_eq!(
            monitor.state(),
            AlarmState {
                temp_alarm: false,
                rpm_alarm: true
            }
        );
    }

    #[test]
    fn test_buzzer_prefers_temperature() {
        let both = AlarmState {
            temp_alarm: true,
            rpm_alarm: true,
        };
        assert_eq!(both.buzzer_tone_hz(), Some(1000));
        let rpm_only = AlarmState {
            temp_alarm: false,
            rpm_alarm: true,
        };
        assert_eq!(rpm_only.buzzer_tone_hz(), Some(4000));
        assert_eq!(AlarmState::default().buzzer_tone_hz(), None);
    }
}
