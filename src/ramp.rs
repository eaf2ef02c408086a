// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Bounded-rate duty ramp.
//!
//! Each fan channel moves from its current duty toward the curve target by a
//! fixed step once per step period, instead of snapping. A target that
//! changes mid-ramp is ignored until the ramp lands; the next tick then
//! starts a fresh ramp toward whatever the curve says at that point.

/// Time between ramp steps.
pub const DEFAULT_STEP_PERIOD_MS: u64 = 1000;

/// Per-channel ramp state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ramp {
    /// Holding a duty. Current and target are equal.
    Idle { duty: i32 },
    /// Moving `current` toward `target` by `step` whenever the step period
    /// has elapsed since `deadline_ms`.
    Ramping {
        current: i32,
        target: i32,
        step: i32,
        deadline_ms: u64,
    },
}

/// Something worth logging happened during [`Ramp::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampEvent {
    Started { from: u8, to: u8, step: i32 },
    Stepped { duty: u8 },
    Reached { duty: u8 },
}

/// Result of one control tick for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RampOutput {
    /// Duty to drive onto the PWM output this tick, if any.
    pub write: Option<u8>,
    pub event: Option<RampEvent>,
}

impl Ramp {
    pub fn new(duty: u8) -> Self {
        Ramp::Idle {
            duty: i32::from(duty),
        }
    }

    pub fn current(&self) -> u8 {
        match *self {
            Ramp::Idle { duty } => to_duty(duty),
            Ramp::Ramping { current, .. } => to_duty(current),
        }
    }

    pub fn target(&self) -> u8 {
        match *self {
            Ramp::Idle { duty } => to_duty(duty),
            Ramp::Ramping { target, .. } => to_duty(target),
        }
    }

    pub fn is_ramping(&self) -> bool {
        matches!(self, Ramp::Ramping { .. })
    }

    /// Jump straight to `duty`, abandoning any ramp. Used at boot.
    pub fn snap(&mut self, duty: u8) {
        *self = Ramp::new(duty);
    }

    /// Run one control tick against the freshly evaluated `target`.
    ///
    /// `step_duration_seconds` is the nominal number of steps a ramp takes;
    /// the step size is `round(delta / step_duration_seconds)`, at least one
    /// unit. The final step is clamped onto the target, so a ramp lands in
    /// `ceil(|delta| / |step|)` step periods.
    pub fn advance(
        &mut self,
        target: u8,
        step_duration_seconds: u8,
        step_period_ms: u64,
        now_ms: u64,
    ) -> RampOutput {
        let requested = i32::from(target);

        match *self {
            Ramp::Idle { duty } if duty == requested => RampOutput {
                write: Some(to_duty(duty)),
                event: None,
            },
            Ramp::Idle { duty } => {
                let step = step_size(duty, requested, step_duration_seconds);
                *self = Ramp::Ramping {
                    current: duty,
                    target: requested,
                    step,
                    deadline_ms: now_ms,
                };
                RampOutput {
                    write: None,
                    event: Some(RampEvent::Started {
                        from: to_duty(duty),
                        to: target,
                        step,
                    }),
                }
            }
            // Retargeting waits until this ramp lands.
            Ramp::Ramping {
                current,
                target,
                step,
                deadline_ms,
            } => {
                if now_ms.saturating_sub(deadline_ms) < step_period_ms {
                    return RampOutput::default();
                }

                let next = current + step;
                let next = if step > 0 {
                    next.min(target)
                } else {
                    next.max(target)
                };

                if next == target {
                    *self = Ramp::Idle { duty: target };
                    RampOutput {
                        write: Some(to_duty(target)),
                        event: Some(RampEvent::Reached {
                            duty: to_duty(target),
                        }),
                    }
                } else {
                    *self = Ramp::Ramping {
                        current: next,
                        target,
                        step,
                        deadline_ms: now_ms,
                    };
                    RampOutput {
                        write: Some(to_duty(next)),
                        event: Some(RampEvent::Stepped {
                            duty: to_duty(next),
                        }),
                    }
                }
            }
        }
    }
}

fn step_size(current: i32, target: i32, step_duration_seconds: u8) -> i32 {
    let delta = target - current;
    let steps = f64::from(step_duration_seconds.max(1));
    let step = (f64::from(delta) / steps).round() as i32;
    if step == 0 { delta.signum() } else { step }
}

fn to_duty(value: i32) -> u8 {
    value.clamp(0, i32::from(u8::MAX)) as u8
}
