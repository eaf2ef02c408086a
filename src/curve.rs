// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Fan curve definitions and evaluation.
//!
//! A curve maps temperature readings to PWM duty values (0-255). Evaluation
//! is a step function: the first point whose threshold is at or above the
//! temperature wins, and temperatures past the last threshold saturate at
//! the last duty. Smoothing between steps is the ramp controller's job.

use crate::error::CurveError;
use serde::{Deserialize, Serialize};

/// A single point on a fan curve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CurvePoint {
    /// Temperature threshold in degrees Celsius
    pub temp_c: f32,
    /// PWM duty value (0-255)
    pub duty: u8,
}

impl CurvePoint {
    pub const fn new(temp_c: f32, duty: u8) -> Self {
        Self { temp_c, duty }
    }
}

/// A validated, non-empty curve with strictly ascending thresholds.
///
/// Curves are immutable once built; reconfiguration swaps in a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CurvePoint>", into = "Vec<CurvePoint>")]
pub struct FanCurve {
    points: Vec<CurvePoint>,
}

impl FanCurve {
    /// Build a curve, rejecting empty or out-of-order point lists.
    pub fn new(points: Vec<CurvePoint>) -> Result<Self, CurveError> {
        if points.is_empty() {
            return Err(CurveError::Empty);
        }
        for (i, p) in points.iter().enumerate() {
            if !p.temp_c.is_finite() {
                return Err(CurveError::NonFiniteThreshold { index: i });
            }
            if i > 0 && p.temp_c <= points[i - 1].temp_c {
                return Err(CurveError::NotAscending { index: i });
            }
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }

    /// Duty of the first point whose threshold is `>= temp_c`, or the last
    /// point's duty when the temperature is above every threshold.
    pub fn evaluate(&self, temp_c: f64) -> u8 {
        self.points
            .iter()
            .find(|p| f64::from(p.temp_c) >= temp_c)
            .or_else(|| self.points.last())
            .map_or(0, |p| p.duty)
    }
}

impl TryFrom<Vec<CurvePoint>> for FanCurve {
    type Error = CurveError;

    fn try_from(points: Vec<CurvePoint>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<FanCurve> for Vec<CurvePoint> {
    fn from(curve: FanCurve) -> Self {
        curve.points
    }
}

/// Map a 0-100 percentage onto the 0-255 PWM range (integer, truncating).
pub fn percent_to_duty(percent: u8) -> u8 {
    (u32::from(percent.min(100)) * 255 / 100) as u8
}

/// The stock curve: 30 % at 30 °C rising to full speed at 41 °C.
pub fn default_curve() -> FanCurve {
    FanCurve {
        points: vec![
            CurvePoint::new(30.0, percent_to_duty(30)),
            CurvePoint::new(33.0, percent_to_duty(40)),
            CurvePoint::new(36.0, percent_to_duty(55)),
            CurvePoint::new(39.0, percent_to_duty(75)),
            CurvePoint::new(41.0, percent_to_duty(100)),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_step() -> FanCurve {
        FanCurve::new(vec![
            CurvePoint::new(30.0, 64),
            CurvePoint::new(36.0, 140),
            CurvePoint::new(41.0, 255),
        ])
        .unwrap()
    }

    #[test]
    fn test_first_threshold_at_or_above_wins() {
        let curve = three_step();
        assert_eq!(curve.evaluate(34.0), 140);
        assert_eq!(curve.evaluate(30.0), 64);
        assert_eq!(curve.evaluate(30.01), 140);
        assert_eq!(curve.evaluate(41.0), 255);
    }

    #[test]
    fn test_below_range_uses_first_point() {
        assert_eq!(three_step().evaluate(10.0), 64);
    }

    #[test]
    fn test_above_range_saturates() {
        assert_eq!(three_step().evaluate(50.0), 255);
    }

    #[test]
    fn test_single_point_curve() {
        let curve = FanCurve::new(vec![CurvePoint::new(40.0, 99)]).unwrap();
        assert_eq!(curve.evaluate(0.5), 99);
        assert_eq!(curve.evaluate(80.0), 99);
    }

    #[test]
    fn test_validation_empty() {
        assert_eq!(FanCurve::new(Vec::new()), Err(CurveError::Empty));
    }

    #[test]
    fn test_validation_not_ascending() {
        let err = FanCurve::new(vec![
            CurvePoint::new(30.0, 64),
            CurvePoint::new(30.0, 100),
        ])
        .unwrap_err();
        assert_eq!(err, CurveError::NotAscending { index: 1 });

        let err = FanCurve::new(vec![
            CurvePoint::new(30.0, 64),
            CurvePoint::new(40.0, 100),
            CurvePoint::new(35.0, 200),
        ])
        .unwrap_err();
        assert_eq!(err, CurveError::NotAscending { index: 2 });
    }

    #[test]
    fn test_validation_nan() {
        let err = FanCurve::new(vec![CurvePoint::new(f32::NAN, 64)]).unwrap_err();
        assert_eq!(err, CurveError::NonFiniteThreshold { index: 0 });
    }

    #[test]
    fn test_percent_mapping() {
        assert_eq!(percent_to_duty(0), 0);
        assert_eq!(percent_to_duty(25), 63);
        assert_eq!(percent_to_duty(30), 76);
        assert_eq!(percent_to_duty(100), 255);
        assert_eq!(percent_to_duty(180), 255);
    }

    #[test]
    fn test_default_curve_is_valid() {
        let curve = default_curve();
        assert!(FanCurve::new(curve.points().to_vec()).is_ok());
        assert_eq!(curve.evaluate(20.0), 76);
        assert_eq!(curve.evaluate(45.0), 255);
    }

    #[test]
    fn test_deserialize_rejects_unordered_curve() {
        let ok: Result<FanCurve, _> =
            serde_json::from_str(r#"[{"temp_c":30.0,"duty":64},{"temp_c":40.0,"duty":200}]"#);
        assert!(ok.is_ok());
        let bad: Result<FanCurve, _> =
            serde_json::from_str(r#"[{"temp_c":40.0,"duty":64},{"temp_c":30.0,"duty":200}]"#);
        assert!(bad.is_err());
    }

    /// Sweep many generated ascending curves against many temperatures and
    /// compare with a direct search for the minimal qualifying threshold.
    #[test]
    fn test_evaluate_matches_minimal_qualifying_threshold() {
        let mut seed: u32 = 0x2545_f491;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed
        };

        for _ in 0..500 {
            let len = (next() % 8 + 1) as usize;
            let mut t = (next() % 40) as f32;
            let mut points = Vec::with_capacity(len);
            for _ in 0..len {
                t += 0.5 + (next() % 60) as f32 / 10.0;
                points.push(CurvePoint::new(t, (next() % 256) as u8));
            }
            let curve = FanCurve::new(points.clone()).unwrap();

            for _ in 0..40 {
                let temp = f64::from(next() % 1000) / 10.0;
                let expected = points
                    .iter()
                    .filter(|p| f64::from(p.temp_c) >= temp)
                    .min_by(|a, b| a.temp_c.total_cmp(&b.temp_c))
                    .unwrap_or(points.last().unwrap())
                    .duty;
                assert_eq!(curve.evaluate(temp), expected, "curve {points:?} at {temp}");
            }
        }
    }
}
