//! End-to-end playback scenarios through the player facade.

use maestro::buffer::Buffer;
use maestro::calibrate::OffsetCalibration;
use maestro::error::Result;
use maestro::filter::testing::{ClockedSink, CollectSink, CountingSink, VecSource};
use maestro::filter::Source;
use maestro::pipeline::{Pipeline, PlayExecutor};
use maestro::player::{Action, Intent, Player, PlayerState};
use maestro::sync::SyncInfoManager;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn stream(n: i64, interval_us: i64) -> Vec<Buffer> {
    (0..n)
        .map(|i| Buffer::from_bytes(vec![i as u8]).with_pts(i * interval_us))
        .collect()
}

/// Source producing buffers forever, for pause scenarios.
struct Endless {
    next_pts: i64,
}

impl Source for Endless {
    fn pull(&mut self) -> Result<Option<Buffer>> {
        let buf = Buffer::empty().with_pts(self.next_pts);
        self.next_pts += 1_000;
        Ok(Some(buf))
    }

    fn name(&self) -> &str {
        "endless"
    }
}

#[tokio::test]
async fn full_playback_then_replay_from_zero() {
    init_tracing();
    let mut pipeline = Pipeline::new();
    let src = pipeline.add_source("src", VecSource::new(stream(3, 1_000)));
    let sink_filter = CollectSink::new();
    let collected = sink_filter.collected();
    let sink = pipeline.add_sink("sink", sink_filter);
    pipeline.link(src, sink).unwrap();

    let exec = PlayExecutor::new(pipeline, Arc::new(SyncInfoManager::new()));
    let mut player = Player::new(exec);

    // SetSource binds and immediately kicks off the async prepare.
    let action = player
        .execute(Intent::SetSource("mem://stream".into()))
        .await
        .unwrap();
    assert_eq!(action, Action::Pending);
    assert_eq!(player.state(), PlayerState::Preparing);
    player.execute(Intent::NotifyReady).await.unwrap();
    assert_eq!(player.state(), PlayerState::Ready);

    for _ in 0..2 {
        let mut events = player.events();
        player.execute(Intent::Play).await.unwrap();
        assert_eq!(player.state(), PlayerState::Playing);
        events.wait_eos().await.unwrap();
        player.execute(Intent::NotifyComplete).await.unwrap();
        assert_eq!(player.state(), PlayerState::Ready);
    }

    // Completion lands back at Ready and a second Play replays the whole
    // stream from position 0.
    let pts: Vec<_> = collected
        .lock()
        .unwrap()
        .iter()
        .map(|b| b.pts().unwrap())
        .collect();
    assert_eq!(pts, vec![0, 1_000, 2_000, 0, 1_000, 2_000]);
}

#[tokio::test]
async fn pause_resume_preserves_position_and_calibration() {
    init_tracing();
    let mut pipeline = Pipeline::new();
    let src = pipeline.add_source("src", Endless { next_pts: 0 });
    let sink_filter = CountingSink::new();
    let rendered = sink_filter.counter();
    let last_pts = sink_filter.last_pts();
    let sink = pipeline.add_sink("sink", sink_filter);
    pipeline.link(src, sink).unwrap();

    // Calibrate the sink with a fixed +500us bias.
    let calibration = pipeline.get_node(sink).unwrap().calibration();
    {
        let mut cal = calibration.lock().unwrap();
        cal.set_strategy(Box::new(OffsetCalibration::new(500)));
        cal.enable();
    }

    let exec = PlayExecutor::new(pipeline, Arc::new(SyncInfoManager::new()));
    let mut player = Player::new(exec);

    player.execute(Intent::Prepare).await.unwrap();
    player.execute(Intent::NotifyReady).await.unwrap();
    player.execute(Intent::Play).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    player.execute(Intent::Pause).await.unwrap();
    assert_eq!(player.state(), PlayerState::Pause);
    // Let in-flight buffers drain, then note where playback stopped.
    tokio::time::sleep(Duration::from_millis(30)).await;
    let paused_count = rendered.load(Ordering::SeqCst);
    let paused_pts = last_pts.load(Ordering::SeqCst);
    let corrected_at_pause = calibration.lock().unwrap().corrected_count();
    assert!(paused_count > 0);
    // The bias proves the calibration is active.
    assert_eq!(paused_pts % 1_000, 500);

    // Resume without re-preparing: flow continues forward and the
    // calibration keeps its accumulated state.
    player.execute(Intent::Resume).await.unwrap();
    assert_eq!(player.state(), PlayerState::Playing);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(rendered.load(Ordering::SeqCst) > paused_count);
    assert!(last_pts.load(Ordering::SeqCst) > paused_pts);
    {
        let cal = calibration.lock().unwrap();
        assert!(cal.is_enabled());
        assert!(cal.corrected_count() > corrected_at_pause);
    }

    player.execute(Intent::Stop).await.unwrap();
    assert_eq!(player.state(), PlayerState::Init);
}

#[tokio::test]
async fn seek_before_play_skips_ahead() {
    init_tracing();
    let mut pipeline = Pipeline::new();
    let src = pipeline.add_source("src", VecSource::new(stream(5, 1_000)));
    let sink_filter = CollectSink::new();
    let collected = sink_filter.collected();
    let sink = pipeline.add_sink("sink", sink_filter);
    pipeline.link(src, sink).unwrap();

    let exec = PlayExecutor::new(pipeline, Arc::new(SyncInfoManager::new()));
    let mut player = Player::new(exec);

    player.execute(Intent::Prepare).await.unwrap();
    player.execute(Intent::NotifyReady).await.unwrap();
    player.execute(Intent::Seek(3_000)).await.unwrap();

    let mut events = player.events();
    player.execute(Intent::Play).await.unwrap();
    events.wait_eos().await.unwrap();
    player.execute(Intent::NotifyComplete).await.unwrap();

    let pts: Vec<_> = collected
        .lock()
        .unwrap()
        .iter()
        .map(|b| b.pts().unwrap())
        .collect();
    assert_eq!(pts, vec![3_000, 4_000]);
}

#[tokio::test]
async fn clocked_sink_drives_position_queries() {
    init_tracing();
    let mut pipeline = Pipeline::new();
    let src = pipeline.add_source("src", VecSource::new(stream(8, 100)));
    let sink_filter = ClockedSink::new(150);
    let rendered = sink_filter.counter();
    let sink = pipeline.add_sink("sink", sink_filter);
    pipeline.link(src, sink).unwrap();

    let sync = Arc::new(SyncInfoManager::new());
    let exec = PlayExecutor::new(pipeline, Arc::clone(&sync));
    let mut player = Player::new(exec);

    // Without a registered provider the position is an explicit failure,
    // not a default value.
    assert!(player.position().is_err());

    player.execute(Intent::Prepare).await.unwrap();
    player.execute(Intent::NotifyReady).await.unwrap();

    let mut events = player.events();
    player.execute(Intent::Play).await.unwrap();
    assert!(sync.has_provider());
    events.wait_eos().await.unwrap();

    // The sink's clock followed the rendered stream.
    assert_eq!(player.position().unwrap(), 700);
    player.execute(Intent::NotifyComplete).await.unwrap();

    assert_eq!(rendered.load(Ordering::SeqCst), 8);
    assert!(player.position().is_err());
}
