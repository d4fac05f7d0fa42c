//! Sync-info providers.
//!
//! A sync-info provider is a timing authority: it answers "where is
//! playback right now", "what time is it" and "should this buffer be
//! admitted yet". The filter that owns the reference clock (commonly the
//! audio sink) implements this trait and registers itself while Running.

use crate::error::Result;

/// Timing authority exposed by a filter.
///
/// All methods may fail when the underlying clock is not serviceable;
/// callers must never substitute defaults for a failed query.
///
/// # Priority Ranges
///
/// Registration priority decides which provider is authoritative when
/// several are registered:
/// - 0-99: software clocks (system monotonic fallback)
/// - 100-199: hardware clocks (audio devices)
/// - 200-299: network clocks (NTP)
/// - 300+: precision clocks (PTP)
pub trait SyncInfoProvider: Send + Sync {
    /// Check whether a buffer with the given PTS (microseconds) may be
    /// consumed now. `Ok(false)` means "not yet"; the caller re-asks.
    fn check_pts(&self, pts_us: i64) -> Result<bool>;

    /// Current playback position in stream-clock microseconds.
    fn current_position(&self) -> Result<i64>;

    /// Current wall-clock time in microseconds.
    fn current_time_us(&self) -> Result<i64>;

    /// Name for logging.
    fn name(&self) -> &str {
        "unknown"
    }
}
