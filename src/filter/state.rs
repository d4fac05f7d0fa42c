//! Filter lifecycle states.
//!
//! Every filter is in exactly one [`FilterState`] at any instant. The
//! allowed transitions form a closed table ([`FilterState::can_transition`])
//! so lifecycle sequencing stays auditable as data. `Error` is reachable
//! from every state and terminal until an explicit reset.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a single filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum FilterState {
    /// Freshly constructed or fully reset.
    #[default]
    Init = 0,
    /// Prepare in progress (resource acquisition, negotiation).
    Preparing = 1,
    /// Prepared and ready to run.
    Ready = 2,
    /// Actively processing buffers.
    Running = 3,
    /// Processing suspended, resources retained.
    Paused = 4,
    /// Stopped; resources released, restartable via prepare.
    Stopped = 5,
    /// Failed; requires an explicit reset before reuse.
    Error = 6,
}

impl FilterState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => FilterState::Init,
            1 => FilterState::Preparing,
            2 => FilterState::Ready,
            3 => FilterState::Running,
            4 => FilterState::Paused,
            5 => FilterState::Stopped,
            _ => FilterState::Error,
        }
    }

    /// Check whether a transition from `self` to `to` is allowed.
    ///
    /// Identical-state transitions are always allowed (lifecycle operations
    /// are idempotent under repeated calls from the same state).
    pub fn can_transition(self, to: FilterState) -> bool {
        use FilterState::*;
        if self == to {
            return true;
        }
        match (self, to) {
            // Error is reachable from anywhere and only leaves via reset.
            (_, Error) => true,
            (Error, Init) => true,
            (Error, _) => false,

            (Init, Preparing) => true,
            (Preparing, Ready) => true,
            // Failed or abandoned prepare rolls back to Init.
            (Preparing, Init) => true,
            (Ready, Running) => true,
            // Re-negotiation (e.g. a seek that requires a new prepare).
            (Ready, Preparing) => true,
            (Ready, Stopped) => true,
            (Running, Paused) => true,
            (Running, Stopped) => true,
            // EOS settles a running filter back to ready.
            (Running, Ready) => true,
            (Paused, Running) => true,
            (Paused, Stopped) => true,
            // In-flight EOS may drain while paused.
            (Paused, Ready) => true,
            (Stopped, Init) => true,
            (Stopped, Preparing) => true,
            (_, Init) => true, // reset
            _ => false,
        }
    }
}

impl std::fmt::Display for FilterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FilterState::Init => "init",
            FilterState::Preparing => "preparing",
            FilterState::Ready => "ready",
            FilterState::Running => "running",
            FilterState::Paused => "paused",
            FilterState::Stopped => "stopped",
            FilterState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Shared, atomically updated filter state.
///
/// A `StateCell` is held by the pipeline node and cloned (via `Arc`) into
/// the filter's worker task, so a filter entering `Error` asynchronously is
/// visible to the pipeline owner without any out-of-band bookkeeping.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    /// Create a cell in the given state.
    pub fn new(state: FilterState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    /// Get the current state.
    pub fn get(&self) -> FilterState {
        FilterState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Set the state unconditionally.
    ///
    /// Used internally when the transition has already been validated or is
    /// forced (error marking).
    pub fn set(&self, state: FilterState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Validate and perform a transition.
    ///
    /// Returns [`Error::WrongState`] without mutating if the transition is
    /// not in the table.
    pub fn transition(&self, to: FilterState) -> Result<()> {
        let from = self.get();
        if !from.can_transition(to) {
            return Err(Error::wrong_state(to, from));
        }
        self.set(to);
        Ok(())
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new(FilterState::Init)
    }
}
