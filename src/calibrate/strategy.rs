//! Pluggable timestamp calibration strategies.

use crate::buffer::TagValue;
use crate::error::{Error, Result};

/// Parameter tag: expected inter-buffer interval in microseconds.
pub const PARAM_FRAME_DURATION_US: &str = "frame-duration-us";
/// Parameter tag: fixed timestamp offset in microseconds.
pub const PARAM_OFFSET_US: &str = "offset-us";

/// Algorithm correcting raw presentation timestamps.
///
/// Strategies are stateful (they track drift and offsets across calls) and
/// owned exclusively by one [`BufferCalibration`](super::BufferCalibration).
///
/// # Contract
///
/// - Monotonic-preserving: two buffers arriving in order never leave in
///   reversed PTS order.
/// - A discontinuity (seek, source switch) rebaselines internal state
///   instead of extrapolating across the gap.
pub trait CalibrationStrategy: Send {
    /// Correct a raw PTS. `discontinuity` is true for the first buffer
    /// after a seek or source switch.
    fn correct(&mut self, raw_pts: i64, discontinuity: bool) -> i64;

    /// Clear accumulated state (drift estimate, baselines).
    fn reset(&mut self);

    /// Apply a typed parameter. Unsupported tags are rejected, never
    /// silently ignored.
    fn set_param(&mut self, tag: &str, value: &TagValue) -> Result<()> {
        let _ = value;
        Err(Error::InvalidParameter(format!(
            "unsupported calibration parameter '{tag}'"
        )))
    }

    /// Name for logging.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Fixed-offset calibration: adds a constant bias to every PTS.
///
/// Trivially monotonic-preserving; discontinuities need no rebaseline.
#[derive(Debug, Default)]
pub struct OffsetCalibration {
    offset_us: i64,
}

impl OffsetCalibration {
    /// Create with the given bias in microseconds.
    pub fn new(offset_us: i64) -> Self {
        Self { offset_us }
    }
}

impl CalibrationStrategy for OffsetCalibration {
    fn correct(&mut self, raw_pts: i64, _discontinuity: bool) -> i64 {
        raw_pts.saturating_add(self.offset_us)
    }

    fn reset(&mut self) {}

    fn set_param(&mut self, tag: &str, value: &TagValue) -> Result<()> {
        match (tag, value) {
            (PARAM_OFFSET_US, TagValue::Int(v)) => {
                self.offset_us = *v;
                Ok(())
            }
            (PARAM_OFFSET_US, other) => Err(Error::InvalidParameter(format!(
                "{PARAM_OFFSET_US} expects an integer, got {other:?}"
            ))),
            _ => Err(Error::InvalidParameter(format!(
                "unsupported calibration parameter '{tag}'"
            ))),
        }
    }

    fn name(&self) -> &str {
        "offset"
    }
}

/// Drift-tracking calibration.
///
/// Estimates clock drift as an exponentially weighted moving average of the
/// deviation between observed inter-buffer deltas and the expected frame
/// interval, and subtracts the estimate from each delta. Output timestamps
/// are clamped so in-order input stays in order.
#[derive(Debug)]
pub struct DriftCalibration {
    expected_interval_us: i64,
    /// EWMA weight in 1/1000 units applied to each new deviation sample.
    alpha_millis: i64,
    drift_us: i64,
    last_raw: Option<i64>,
    last_out: i64,
}

impl DriftCalibration {
    /// Create with the expected inter-buffer interval in microseconds.
    pub fn new(expected_interval_us: i64) -> Self {
        Self {
            expected_interval_us,
            alpha_millis: 125, // 1/8
            drift_us: 0,
            last_raw: None,
            last_out: 0,
        }
    }

    fn rebaseline(&mut self, raw_pts: i64) -> i64 {
        self.last_raw = Some(raw_pts);
        self.last_out = raw_pts;
        raw_pts
    }
}

impl CalibrationStrategy for DriftCalibration {
    fn correct(&mut self, raw_pts: i64, discontinuity: bool) -> i64 {
        let last_raw = match self.last_raw {
            Some(v) if !discontinuity => v,
            // First buffer, or first after a gap: new baseline, keep the
            // drift estimate from before the gap.
            _ => return self.rebaseline(raw_pts),
        };

        let delta = raw_pts.saturating_sub(last_raw);
        if self.expected_interval_us > 0 {
            let deviation = delta - self.expected_interval_us;
            self.drift_us += (deviation - self.drift_us) * self.alpha_millis / 1_000;
        }

        let mut corrected_delta = delta.saturating_sub(self.drift_us);
        // In-order input must stay in order.
        if delta >= 0 && corrected_delta < 0 {
            corrected_delta = 0;
        }

        self.last_raw = Some(raw_pts);
        self.last_out = self.last_out.saturating_add(corrected_delta);
        self.last_out
    }

    fn reset(&mut self) {
        self.drift_us = 0;
        self.last_raw = None;
        self.last_out = 0;
    }

    fn set_param(&mut self, tag: &str, value: &TagValue) -> Result<()> {
        match (tag, value) {
            (PARAM_FRAME_DURATION_US, TagValue::Int(v)) if *v > 0 => {
                self.expected_interval_us = *v;
                Ok(())
            }
            (PARAM_FRAME_DURATION_US, other) => Err(Error::InvalidParameter(format!(
                "{PARAM_FRAME_DURATION_US} expects a positive integer, got {other:?}"
            ))),
            _ => Err(Error::InvalidParameter(format!(
                "unsupported calibration parameter '{tag}'"
            ))),
        }
    }

    fn name(&self) -> &str {
        "drift"
    }
}
