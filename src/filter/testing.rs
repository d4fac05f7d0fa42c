//! Test filters.
//!
//! In-memory sources, sinks and transforms with observable side channels
//! (shared counters and logs), used by the crate's own tests and handy for
//! exercising pipelines without real media plugins.

use super::traits::{Sink, Source, Transform};
use crate::buffer::{Buffer, PTS_NONE};
use crate::error::Result;
use crate::sync::SyncInfoProvider;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Seekable source producing a fixed list of buffers.
pub struct VecSource {
    buffers: Vec<Buffer>,
    cursor: usize,
    seeks: Arc<Mutex<Vec<i64>>>,
    bound: Arc<Mutex<Option<String>>>,
}

impl VecSource {
    /// Create a source producing the given buffers in order.
    pub fn new(buffers: Vec<Buffer>) -> Self {
        Self {
            buffers,
            cursor: 0,
            seeks: Arc::new(Mutex::new(Vec::new())),
            bound: Arc::new(Mutex::new(None)),
        }
    }

    /// Shared log of seek positions, in call order.
    pub fn seek_log(&self) -> Arc<Mutex<Vec<i64>>> {
        Arc::clone(&self.seeks)
    }

    /// Shared cell holding the last bound URI.
    pub fn bound_uri(&self) -> Arc<Mutex<Option<String>>> {
        Arc::clone(&self.bound)
    }
}

impl Source for VecSource {
    fn pull(&mut self) -> Result<Option<Buffer>> {
        match self.buffers.get(self.cursor) {
            Some(buf) => {
                self.cursor += 1;
                Ok(Some(buf.clone()))
            }
            None => Ok(None),
        }
    }

    fn set_source(&mut self, uri: &str) -> Result<()> {
        *self.bound.lock().unwrap() = Some(uri.to_string());
        Ok(())
    }

    fn seek(&mut self, pos_us: i64) -> Result<()> {
        self.seeks.lock().unwrap().push(pos_us);
        self.cursor = if pos_us == 0 {
            0
        } else {
            self.buffers
                .iter()
                .position(|b| b.pts().is_some_and(|p| p >= pos_us))
                .unwrap_or(self.buffers.len())
        };
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }

    fn name(&self) -> &str {
        "vec-source"
    }
}

/// Sink counting rendered buffers and remembering the last PTS.
#[derive(Default)]
pub struct CountingSink {
    rendered: Arc<AtomicU64>,
    last_pts: Arc<AtomicI64>,
}

impl CountingSink {
    /// Create a sink with fresh counters.
    pub fn new() -> Self {
        Self {
            rendered: Arc::new(AtomicU64::new(0)),
            last_pts: Arc::new(AtomicI64::new(PTS_NONE)),
        }
    }

    /// Shared rendered-buffer counter.
    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.rendered)
    }

    /// Shared cell holding the last rendered PTS ([`PTS_NONE`] initially).
    pub fn last_pts(&self) -> Arc<AtomicI64> {
        Arc::clone(&self.last_pts)
    }
}

impl Sink for CountingSink {
    fn render(&mut self, buffer: Buffer) -> Result<()> {
        self.rendered.fetch_add(1, Ordering::SeqCst);
        if let Some(pts) = buffer.pts() {
            self.last_pts.store(pts, Ordering::SeqCst);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "counting-sink"
    }
}

/// Sink collecting every rendered buffer.
#[derive(Default)]
pub struct CollectSink {
    out: Arc<Mutex<Vec<Buffer>>>,
}

impl CollectSink {
    /// Create a sink with a fresh collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared collection of rendered buffers.
    pub fn collected(&self) -> Arc<Mutex<Vec<Buffer>>> {
        Arc::clone(&self.out)
    }
}

impl Sink for CollectSink {
    fn render(&mut self, buffer: Buffer) -> Result<()> {
        self.out.lock().unwrap().push(buffer);
        Ok(())
    }

    fn name(&self) -> &str {
        "collect-sink"
    }
}

/// Transform forwarding buffers unchanged.
#[derive(Default)]
pub struct PassThrough {
    seen: Arc<AtomicU64>,
}

impl PassThrough {
    /// Create a pass-through transform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared counter of forwarded buffers.
    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.seen)
    }
}

impl Transform for PassThrough {
    fn transform(&mut self, buffer: Buffer) -> Result<Option<Buffer>> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        Ok(Some(buffer))
    }

    fn name(&self) -> &str {
        "pass-through"
    }
}

/// Transform recording every lifecycle call into a shared log.
#[derive(Default)]
pub struct LifecycleProbe {
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl LifecycleProbe {
    /// Create a probe with a fresh log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared log of lifecycle calls, in order.
    pub fn log(&self) -> Arc<Mutex<Vec<&'static str>>> {
        Arc::clone(&self.log)
    }

    fn record(&self, op: &'static str) {
        self.log.lock().unwrap().push(op);
    }
}

impl Transform for LifecycleProbe {
    fn transform(&mut self, buffer: Buffer) -> Result<Option<Buffer>> {
        Ok(Some(buffer))
    }

    fn prepare(&mut self) -> Result<()> {
        self.record("prepare");
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.record("start");
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.record("pause");
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.record("resume");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.record("stop");
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.record("reset");
        Ok(())
    }

    fn name(&self) -> &str {
        "lifecycle-probe"
    }
}

/// Manually advanced sync-info provider.
///
/// Admits a PTS once it falls within `lookahead_us` of the clock position;
/// with the default lookahead of 0 a buffer is held until the clock
/// reaches its PTS exactly.
pub struct TestSyncProvider {
    name: &'static str,
    position_us: AtomicI64,
    lookahead_us: i64,
}

impl TestSyncProvider {
    /// Create a strict provider (lookahead 0) at position 0.
    pub fn new(name: &'static str) -> Arc<Self> {
        Self::with_lookahead(name, 0)
    }

    /// Create a provider admitting PTS up to `lookahead_us` ahead of the
    /// clock.
    pub fn with_lookahead(name: &'static str, lookahead_us: i64) -> Arc<Self> {
        Arc::new(Self {
            name,
            position_us: AtomicI64::new(0),
            lookahead_us,
        })
    }

    /// Move the clock to an absolute position.
    pub fn set_position(&self, pos_us: i64) {
        self.position_us.store(pos_us, Ordering::SeqCst);
    }
}

impl SyncInfoProvider for TestSyncProvider {
    fn check_pts(&self, pts_us: i64) -> Result<bool> {
        let horizon = self
            .position_us
            .load(Ordering::SeqCst)
            .saturating_add(self.lookahead_us);
        Ok(pts_us <= horizon)
    }

    fn current_position(&self) -> Result<i64> {
        Ok(self.position_us.load(Ordering::SeqCst))
    }

    fn current_time_us(&self) -> Result<i64> {
        Ok(self.position_us.load(Ordering::SeqCst))
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Counting sink that owns a reference clock.
///
/// The clock follows the rendered stream (each rendered buffer's PTS
/// becomes the reported position) and admits unconditionally, since the
/// clock cannot advance ahead of its own rendering.
pub struct ClockedSink {
    inner: CountingSink,
    provider: Arc<TestSyncProvider>,
    priority: u32,
}

impl ClockedSink {
    /// Create a sink whose provider registers at the given priority.
    pub fn new(priority: u32) -> Self {
        Self {
            inner: CountingSink::new(),
            provider: TestSyncProvider::with_lookahead("clocked-sink", i64::MAX / 2),
            priority,
        }
    }

    /// Shared rendered-buffer counter.
    pub fn counter(&self) -> Arc<AtomicU64> {
        self.inner.counter()
    }

    /// The sink's clock, for manual advancement in tests.
    pub fn clock(&self) -> Arc<TestSyncProvider> {
        Arc::clone(&self.provider)
    }
}

impl Sink for ClockedSink {
    fn render(&mut self, buffer: Buffer) -> Result<()> {
        if let Some(pts) = buffer.pts() {
            self.provider.set_position(pts);
        }
        self.inner.render(buffer)
    }

    fn sync_provider(&self) -> Option<(Arc<dyn SyncInfoProvider>, u32)> {
        Some((Arc::clone(&self.provider) as Arc<dyn SyncInfoProvider>, self.priority))
    }

    fn name(&self) -> &str {
        "clocked-sink"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_source_seek() {
        let mut src = VecSource::new(vec![
            Buffer::empty().with_pts(0),
            Buffer::empty().with_pts(1_000),
            Buffer::empty().with_pts(2_000),
        ]);
        let log = src.seek_log();

        assert_eq!(src.pull().unwrap().unwrap().pts(), Some(0));
        src.seek(2_000).unwrap();
        assert_eq!(src.pull().unwrap().unwrap().pts(), Some(2_000));
        assert!(src.pull().unwrap().is_none());

        src.seek(0).unwrap();
        assert_eq!(src.pull().unwrap().unwrap().pts(), Some(0));
        assert_eq!(*log.lock().unwrap(), vec![2_000, 0]);
    }

    #[test]
    fn test_counting_sink() {
        let mut sink = CountingSink::new();
        let count = sink.counter();
        let last = sink.last_pts();

        sink.render(Buffer::empty().with_pts(42)).unwrap();
        sink.render(Buffer::empty()).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(last.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_clocked_sink_tracks_rendered_stream() {
        let mut sink = ClockedSink::new(150);
        let clock = sink.clock();

        assert_eq!(clock.current_position().unwrap(), 0);
        sink.render(Buffer::empty().with_pts(10)).unwrap();
        assert_eq!(clock.current_position().unwrap(), 10);
        assert!(sink.sync_provider().is_some());
    }

    #[test]
    fn test_strict_provider_holds_future_pts() {
        let clock = TestSyncProvider::new("strict");
        assert!(clock.check_pts(0).unwrap());
        assert!(!clock.check_pts(100).unwrap());
        clock.set_position(100);
        assert!(clock.check_pts(100).unwrap());
    }

    #[test]
    fn test_lifecycle_probe_order() {
        let mut probe = LifecycleProbe::new();
        let log = probe.log();
        probe.prepare().unwrap();
        probe.start().unwrap();
        probe.stop().unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["prepare", "start", "stop"]);
    }
}
