//! Per-filter buffer timestamp calibration.
//!
//! A [`BufferCalibration`] sits on a filter's input side and corrects each
//! buffer's PTS through a pluggable [`CalibrationStrategy`] before the
//! filter consumes it. Calibration can be enabled, disabled and reset
//! independently per filter; the strategy is exclusively owned and resets
//! together with its owner.

mod strategy;

pub use strategy::{
    CalibrationStrategy, DriftCalibration, OffsetCalibration, PARAM_FRAME_DURATION_US,
    PARAM_OFFSET_US,
};

use crate::buffer::{Buffer, TagValue};
use crate::error::{Error, Result};

/// Per-filter PTS correction envelope around a pluggable strategy.
#[derive(Default)]
pub struct BufferCalibration {
    strategy: Option<Box<dyn CalibrationStrategy>>,
    enabled: bool,
    /// One-shot hint set by a seek or source switch; consumed by the next
    /// corrected buffer.
    pending_discontinuity: bool,
    corrected: u64,
}

impl BufferCalibration {
    /// Create a calibration with no strategy, disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an enabled calibration with the given strategy.
    pub fn with_strategy(strategy: Box<dyn CalibrationStrategy>) -> Self {
        Self {
            strategy: Some(strategy),
            enabled: true,
            pending_discontinuity: false,
            corrected: 0,
        }
    }

    /// Install a strategy, replacing any previous one.
    pub fn set_strategy(&mut self, strategy: Box<dyn CalibrationStrategy>) {
        self.strategy = Some(strategy);
    }

    /// Enable correction.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Disable correction. [`correct`](Self::correct) becomes a no-op.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Check whether correction is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Mark the next buffer as following a discontinuity (seek, source
    /// switch), so the strategy rebaselines instead of extrapolating.
    pub fn mark_discontinuity(&mut self) {
        self.pending_discontinuity = true;
    }

    /// Number of buffers corrected since construction or reset.
    pub fn corrected_count(&self) -> u64 {
        self.corrected
    }

    /// Reset the calibration.
    ///
    /// Ordering is fixed: correction is disabled first, then accumulated
    /// state is cleared, then the strategy resets. No buffer can be
    /// corrected by a strategy mid-reset.
    pub fn reset(&mut self) {
        self.enabled = false;
        self.pending_discontinuity = false;
        self.corrected = 0;
        if let Some(s) = self.strategy.as_mut() {
            s.reset();
        }
    }

    /// Correct a buffer's PTS in place.
    ///
    /// No-op (strategy state untouched) when correction is disabled, when
    /// the buffer carries no PTS, or when the buffer is an empty non-EOS
    /// unit.
    pub fn correct(&mut self, buffer: &mut Buffer) {
        if !self.enabled {
            return;
        }
        if buffer.is_empty() && !buffer.is_eos() {
            return;
        }
        let Some(raw) = buffer.pts() else {
            return;
        };
        let Some(strategy) = self.strategy.as_mut() else {
            return;
        };

        let discontinuity = std::mem::take(&mut self.pending_discontinuity);
        let corrected = strategy.correct(raw, discontinuity);
        if corrected != raw {
            tracing::trace!(raw, corrected, "calibrated pts");
        }
        buffer.set_pts(corrected);
        self.corrected += 1;
    }

    /// Forward a typed parameter to the active strategy.
    ///
    /// Fails with [`Error::InvalidOperation`] when no strategy is
    /// installed; unsupported tags propagate the strategy's
    /// [`Error::InvalidParameter`].
    pub fn set_param(&mut self, tag: &str, value: &TagValue) -> Result<()> {
        match self.strategy.as_mut() {
            Some(s) => s.set_param(tag, value),
            None => Err(Error::invalid_op("no calibration strategy installed")),
        }
    }
}

impl std::fmt::Debug for BufferCalibration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferCalibration")
            .field("enabled", &self.enabled)
            .field("strategy", &self.strategy.as_ref().map(|s| s.name()))
            .field("corrected", &self.corrected)
            .finish()
    }
}
