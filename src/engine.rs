// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! The control engine.
//!
//! Shared-state layout, by writer:
//!
//! - Tachometer edge pairs: written only by each channel's [`TachHandler`],
//!   read here through [`EdgeCell::snapshot`].
//! - Channel configuration: written by configuration callers, read by
//!   [`Engine::tick`]. Each channel holds an `Arc<ChannelConfig>` that is
//!   replaced whole, never edited in place; a tick clones the handle once
//!   and evaluates against that generation.
//! - Ramp and alarm state: written only by [`Engine::tick`] under a mutex
//!   nothing else writes through. Published copies live in atomics so
//!   reporting reads never wait on the control task.
//!
//! Channels are independent; a tick processes them in index order.

use crate::alarm::{AlarmEvent, AlarmMonitor, AlarmState, AlarmThresholds, ChannelReading};
use crate::clock::Clock;
use crate::curve::{self, CurvePoint, FanCurve};
use crate::error::EngineError;
use crate::hw::{AnalogInput, PwmOutput};
use crate::ramp::{self, Ramp, RampEvent};
use crate::status::{EngineStatus, FanStatus, TempStatus};
use crate::tach::{self, EdgeCell, TachHandler, TachSettings};
use crate::thermistor::{self, ThermistorConfig};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Fan channels on the reference board.
pub const DEFAULT_FAN_COUNT: usize = 4;

/// Thermistor channels on the reference board.
pub const DEFAULT_SENSOR_COUNT: usize = 2;

/// Duty used when a fan's sensor is unavailable, and before curves apply.
pub const DEFAULT_FALLBACK_DUTY_PERCENT: u8 = 25;

/// Fixed, build-time shape and timing of the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub fan_count: usize,
    pub sensor_count: usize,
    pub tach: TachSettings,
    pub step_period_ms: u64,
    pub fallback_duty: u8,
    pub thermistor: ThermistorConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            fan_count: DEFAULT_FAN_COUNT,
            sensor_count: DEFAULT_SENSOR_COUNT,
            tach: TachSettings::default(),
            step_period_ms: ramp::DEFAULT_STEP_PERIOD_MS,
            fallback_duty: curve::percent_to_duty(DEFAULT_FALLBACK_DUTY_PERCENT),
            thermistor: ThermistorConfig::default(),
        }
    }
}

/// Which sensor drives a fan, its alarm limits and its ramp granularity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorBinding {
    pub sensor: usize,
    pub thresholds: AlarmThresholds,
    /// Nominal ramp length in step periods
    pub step_duration_seconds: u8,
}

impl Default for SensorBinding {
    fn default() -> Self {
        Self {
            sensor: 0,
            thresholds: AlarmThresholds::default(),
            step_duration_seconds: 1,
        }
    }
}

/// Everything configurable about one fan channel. Replaced as a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    pub curve: FanCurve,
    pub binding: SensorBinding,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            curve: curve::default_curve(),
            binding: SensorBinding::default(),
        }
    }
}

/// Duty-side view of a channel as last published by the control task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampSnapshot {
    pub current_duty: u8,
    pub target_duty: u8,
    pub is_ramping: bool,
}

/// Outcome of one control tick.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TickReport {
    pub alarms: AlarmState,
    /// Alarms that went active this tick.
    pub raised: Vec<AlarmEvent>,
}

struct FanChannel {
    edges: Arc<EdgeCell>,
    config: RwLock<Arc<ChannelConfig>>,
    rpm: AtomicU32,
    duty: AtomicU8,
    target: AtomicU8,
    ramping: AtomicBool,
}

impl FanChannel {
    fn new(duty: u8) -> Self {
        Self {
            edges: Arc::new(EdgeCell::new()),
            config: RwLock::new(Arc::new(ChannelConfig::default())),
            rpm: AtomicU32::new(0),
            duty: AtomicU8::new(duty),
            target: AtomicU8::new(duty),
            ramping: AtomicBool::new(false),
        }
    }

    fn config(&self) -> Arc<ChannelConfig> {
        Arc::clone(&self.config.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn publish(&self, ramp: &Ramp) {
        self.duty.store(ramp.current(), Ordering::Relaxed);
        self.target.store(ramp.target(), Ordering::Relaxed);
        self.ramping.store(ramp.is_ramping(), Ordering::Relaxed);
    }
}

/// Control-task-owned state.
struct ControlState {
    ramps: Vec<Ramp>,
    alarms: AlarmMonitor,
    sensor_available: Vec<bool>,
}

pub struct Engine<C: Clock, A: AnalogInput, P: PwmOutput> {
    settings: EngineSettings,
    clock: Arc<C>,
    adc: A,
    pwm: P,
    fans: Vec<FanChannel>,
    temperatures: Vec<AtomicU64>,
    temp_alarm: AtomicBool,
    rpm_alarm: AtomicBool,
    control: Mutex<ControlState>,
}

impl<C: Clock, A: AnalogInput, P: PwmOutput> Engine<C, A, P> {
    /// Build an engine with every channel on the default curve. Nothing is
    /// written to the PWM outputs until [`Engine::prime`] or the first tick.
    pub fn new(settings: EngineSettings, clock: Arc<C>, adc: A, pwm: P) -> Self {
        let fallback = settings.fallback_duty;
        let fans = (0..settings.fan_count)
            .map(|_| FanChannel::new(fallback))
            .collect();
        let temperatures = (0..settings.sensor_count)
            .map(|_| AtomicU64::new(thermistor::UNAVAILABLE_C.to_bits()))
            .collect();
        let control = ControlState {
            ramps: vec![Ramp::new(fallback); settings.fan_count],
            alarms: AlarmMonitor::new(),
            sensor_available: vec![true; settings.sensor_count],
        };

        Self {
            settings,
            clock,
            adc,
            pwm,
            fans,
            temperatures,
            temp_alarm: AtomicBool::new(false),
            rpm_alarm: AtomicBool::new(false),
            control: Mutex::new(control),
        }
    }

    pub fn fan_count(&self) -> usize {
        self.fans.len()
    }

    pub fn sensor_count(&self) -> usize {
        self.temperatures.len()
    }

    // -----------------------------------------------------------------------
    // Edge capture
    // -----------------------------------------------------------------------

    /// The handler to bind to `fan`'s tachometer interrupt.
    pub fn tach_handler(&self, fan: usize) -> Result<TachHandler<C>, EngineError> {
        let channel = self.fan(fan)?;
        Ok(TachHandler::new(
            Arc::clone(&channel.edges),
            Arc::clone(&self.clock),
            self.settings.tach.debounce_ms,
        ))
    }

    // -----------------------------------------------------------------------
    // Control cycle
    // -----------------------------------------------------------------------

    /// Drive every fan to the fallback duty, then snap each straight to its
    /// curve duty for the current temperature. Call once before ticking.
    pub fn prime(&self) {
        let mut control = self.lock_control();
        let fallback = self.settings.fallback_duty;
        for id in 0..self.fans.len() {
            self.pwm.set_duty(id, fallback);
        }

        let temps = self.sample_temperatures(&mut control);
        for (id, channel) in self.fans.iter().enumerate() {
            let config = channel.config();
            let temperature_c = temps
                .get(config.binding.sensor)
                .copied()
                .unwrap_or(thermistor::UNAVAILABLE_C);
            let duty = self.target_duty(&config, temperature_c);

            let ramp = &mut control.ramps[id];
            ramp.snap(duty);
            channel.publish(ramp);
            self.pwm.set_duty(id, duty);
            log::info!("Fan {id}: starting at duty {duty}");
        }
    }

    /// Advance one control cycle: sample sensors and tachometers, step every
    /// ramp and re-derive the alarm flags.
    ///
    /// The caller invokes this at a fixed period.
    pub fn tick(&self) -> TickReport {
        let mut control = self.lock_control();
        let temps = self.sample_temperatures(&mut control);
        let now_ms = self.clock.now_ms();
        let mut readings = Vec::with_capacity(self.fans.len());

        for (id, channel) in self.fans.iter().enumerate() {
            let rpm = tach::estimate_rpm(channel.edges.snapshot(), now_ms, &self.settings.tach);
            channel.rpm.store(rpm, Ordering::Relaxed);

            let config = channel.config();
            let binding = config.binding;
            let temperature_c = temps
                .get(binding.sensor)
                .copied()
                .unwrap_or(thermistor::UNAVAILABLE_C);
            let target = self.target_duty(&config, temperature_c);

            let ramp = &mut control.ramps[id];
            let out = ramp.advance(
                target,
                binding.step_duration_seconds,
                self.settings.step_period_ms,
                now_ms,
            );
            if let Some(duty) = out.write {
                self.pwm.set_duty(id, duty);
            }
            match out.event {
                Some(RampEvent::Started { from, to, step }) => {
                    log::info!("Fan {id}: adjusting {from} -> {to} (step {step})");
                }
                Some(RampEvent::Reached { duty }) => {
                    log::info!("Fan {id}: reached target {duty}");
                }
                Some(RampEvent::Stepped { duty }) => {
                    log::debug!("Fan {id}: stepped to {duty}");
                }
                None => {}
            }
            channel.publish(ramp);

            log::debug!(
                "Fan {id}: {rpm} RPM, sensor {} at {temperature_c:.2}C, duty {} -> {}",
                binding.sensor,
                ramp.current(),
                ramp.target()
            );

            readings.push(ChannelReading {
                fan: id,
                sensor: binding.sensor,
                temperature_c,
                rpm,
                thresholds: binding.thresholds,
            });
        }

        let raised = control.alarms.update(&readings);
        let alarms = control.alarms.state();
        self.temp_alarm.store(alarms.temp_alarm, Ordering::Relaxed);
        self.rpm_alarm.store(alarms.rpm_alarm, Ordering::Relaxed);

        TickReport { alarms, raised }
    }

    // -----------------------------------------------------------------------
    // Readings
    // -----------------------------------------------------------------------

    /// Last RPM estimate for `fan`; 0 when stopped or stuck.
    pub fn current_rpm(&self, fan: usize) -> Result<u32, EngineError> {
        Ok(self.fan(fan)?.rpm.load(Ordering::Relaxed))
    }

    /// Last reading for `sensor` in Celsius, or the unavailable sentinel.
    pub fn current_temperature(&self, sensor: usize) -> Result<f64, EngineError> {
        self.temperatures
            .get(sensor)
            .map(|t| f64::from_bits(t.load(Ordering::Relaxed)))
            .ok_or(EngineError::UnknownSensor(sensor))
    }

    pub fn alarm_state(&self) -> AlarmState {
        AlarmState {
            temp_alarm: self.temp_alarm.load(Ordering::Relaxed),
            rpm_alarm: self.rpm_alarm.load(Ordering::Relaxed),
        }
    }

    pub fn ramp_snapshot(&self, fan: usize) -> Result<RampSnapshot, EngineError> {
        let channel = self.fan(fan)?;
        Ok(RampSnapshot {
            current_duty: channel.duty.load(Ordering::Relaxed),
            target_duty: channel.target.load(Ordering::Relaxed),
            is_ramping: channel.ramping.load(Ordering::Relaxed),
        })
    }

    pub fn status(&self) -> EngineStatus {
        let fans = self
            .fans
            .iter()
            .enumerate()
            .map(|(id, channel)| FanStatus {
                id,
                sensor: channel.config().binding.sensor,
                rpm: channel.rpm.load(Ordering::Relaxed),
                duty: channel.duty.load(Ordering::Relaxed),
                target_duty: channel.target.load(Ordering::Relaxed),
                ramping: channel.ramping.load(Ordering::Relaxed),
            })
            .collect();
        let temps = self
            .temperatures
            .iter()
            .enumerate()
            .map(|(id, t)| {
                let c = f64::from_bits(t.load(Ordering::Relaxed));
                TempStatus {
                    id,
                    temp_c: thermistor::is_available(c).then_some(c),
                }
            })
            .collect();

        EngineStatus {
            fans,
            temps,
            alarms: self.alarm_state(),
        }
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    pub fn channel_config(&self, fan: usize) -> Result<Arc<ChannelConfig>, EngineError> {
        Ok(self.fan(fan)?.config())
    }

    /// Replace `fan`'s curve. On error the previous curve stays in force.
    pub fn set_fan_curve(&self, fan: usize, points: Vec<CurvePoint>) -> Result<(), EngineError> {
        let channel = self.fan(fan)?;
        let curve = FanCurve::new(points)?;
        Self::replace_config(channel, |old| ChannelConfig {
            curve,
            binding: old.binding,
        });
        log::info!("Fan {fan}: curve replaced");
        Ok(())
    }

    pub fn set_alarm_thresholds(
        &self,
        fan: usize,
        thresholds: AlarmThresholds,
    ) -> Result<(), EngineError> {
        let channel = self.fan(fan)?;
        Self::replace_config(channel, |old| ChannelConfig {
            curve: old.curve.clone(),
            binding: SensorBinding {
                thresholds,
                ..old.binding
            },
        });
        log::info!("Fan {fan}: alarm thresholds set to {thresholds:?}");
        Ok(())
    }

    pub fn set_sensor_binding(&self, fan: usize, sensor: usize) -> Result<(), EngineError> {
        let channel = self.fan(fan)?;
        self.check_sensor(sensor)?;
        Self::replace_config(channel, |old| ChannelConfig {
            curve: old.curve.clone(),
            binding: SensorBinding {
                sensor,
                ..old.binding
            },
        });
        log::info!("Fan {fan}: now following sensor {sensor}");
        Ok(())
    }

    /// Swap in a complete channel configuration.
    pub fn set_channel_config(&self, fan: usize, config: ChannelConfig) -> Result<(), EngineError> {
        let channel = self.fan(fan)?;
        self.check_sensor(config.binding.sensor)?;
        Self::replace_config(channel, |_| config);
        log::info!("Fan {fan}: configuration replaced");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn fan(&self, fan: usize) -> Result<&FanChannel, EngineError> {
        self.fans.get(fan).ok_or(EngineError::UnknownFan(fan))
    }

    fn check_sensor(&self, sensor: usize) -> Result<(), EngineError> {
        if sensor < self.temperatures.len() {
            Ok(())
        } else {
            Err(EngineError::UnknownSensor(sensor))
        }
    }

    /// Build the next generation from the current one under the write lock,
    /// so concurrent partial updates cannot drop each other.
    fn replace_config(channel: &FanChannel, next: impl FnOnce(&ChannelConfig) -> ChannelConfig) {
        let mut slot = channel
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let updated = next(&slot);
        *slot = Arc::new(updated);
    }

    fn lock_control(&self) -> MutexGuard<'_, ControlState> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn target_duty(&self, config: &ChannelConfig, temperature_c: f64) -> u8 {
        if thermistor::is_available(temperature_c) {
            config.curve.evaluate(temperature_c)
        } else {
            self.settings.fallback_duty
        }
    }

    /// Read every thermistor once; the same values feed curves and alarms
    /// for the whole tick.
    fn sample_temperatures(&self, control: &mut ControlState) -> Vec<f64> {
        self.temperatures
            .iter()
            .enumerate()
            .map(|(id, slot)| {
                let raw = self.adc.read_raw(id);
                let c = self.settings.thermistor.celsius_from_raw(raw);
                slot.store(c.to_bits(), Ordering::Relaxed);

                let available = thermistor::is_available(c);
                if available != control.sensor_available[id] {
                    if available {
                        log::info!("Sensor {id}: back online ({c:.1}C)");
                    } else {
                        log::warn!("Sensor {id}: unavailable (raw {raw}), using fallback duty");
                    }
                    control.sensor_available[id] = available;
                }
                c
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::AtomicI32;

    struct FixedAdc(Vec<AtomicI32>);

    impl FixedAdc {
        fn new(raw: &[i32]) -> Self {
            Self(raw.iter().map(|&r| AtomicI32::new(r)).collect())
        }
    }

    impl AnalogInput for FixedAdc {
        fn read_raw(&self, sensor: usize) -> i32 {
            self.0[sensor].load(Ordering::Relaxed)
        }
    }

    #[derive(Default)]
    struct NullPwm;

    impl PwmOutput for NullPwm {
        fn set_duty(&self, _fan: usize, _duty: u8) {}
    }

    fn engine() -> Engine<ManualClock, FixedAdc, NullPwm> {
        let cfg = ThermistorConfig::default();
        let raw = cfg.raw_from_celsius(34.0);
        Engine::new(
            EngineSettings::default(),
            Arc::new(ManualClock::new(1000)),
            FixedAdc::new(&[raw, -1]),
            NullPwm,
        )
    }

    #[test]
    fn test_invalid_curve_keeps_previous() {
        let engine = engine();
        let before = engine.channel_config(0).unwrap();

        let err = engine.set_fan_curve(0, Vec::new()).unwrap_err();
        assert_eq!(err, EngineError::InvalidCurve(crate::CurveError::Empty));
        assert_eq!(*engine.channel_config(0).unwrap(), *before);
    }

    #[test]
    fn test_readers_keep_their_generation() {
        let engine = engine();
        let held = engine.channel_config(1).unwrap();
        engine
            .set_fan_curve(1, vec![CurvePoint::new(50.0, 10)])
            .unwrap();

        assert_eq!(held.curve, curve::default_curve());
        assert_eq!(engine.channel_config(1).unwrap().curve.points().len(), 1);
    }

    #[test]
    fn test_partial_updates_compose() {
        let engine = engine();
        engine
            .set_alarm_thresholds(2, AlarmThresholds::from_raw(45.0, 300))
            .unwrap();
        engine.set_sensor_binding(2, 1).unwrap();

        let cfg = engine.channel_config(2).unwrap();
        assert_eq!(cfg.binding.sensor, 1);
        assert_eq!(cfg.binding.thresholds.rpm, Some(300));
        assert_eq!(cfg.binding.thresholds.temperature_c, Some(45.0));
    }

    #[test]
    fn test_unknown_channels() {
        let engine = engine();
        assert_eq!(engine.current_rpm(9), Err(EngineError::UnknownFan(9)));
        assert_eq!(
            engine.current_temperature(2),
            Err(EngineError::UnknownSensor(2))
        );
        assert_eq!(
            engine.set_sensor_binding(0, 5),
            Err(EngineError::UnknownSensor(5))
        );
        assert!(engine.tach_handler(4).is_err());
    }

    #[test]
    fn test_tick_publishes_temperatures() {
        let engine = engine();
        assert_eq!(
            engine.current_temperature(0).unwrap(),
            thermistor::UNAVAILABLE_C
        );
        engine.tick();
        assert!((engine.current_temperature(0).unwrap() - 34.0).abs() < 0.1);
        assert_eq!(
            engine.current_temperature(1).unwrap(),
            thermistor::UNAVAILABLE_C
        );

        let status = engine.status();
        assert_eq!(status.temps[1].temp_c, None);
        assert!(status.temps[0].temp_c.is_some());
    }
}
