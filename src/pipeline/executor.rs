//! Pipeline executor using Tokio tasks and ports.
//!
//! [`PlayExecutor`] owns a [`Pipeline`] and drives buffer flow: one Tokio
//! task per filter, connected by bounded ports. Source tasks observe a
//! pause gate, sink tasks consult the sync proxy for PTS admission and run
//! each buffer through the node's calibration before rendering.

use crate::calibrate::BufferCalibration;
use crate::error::{Error, Result};
use crate::filter::{Filter, FilterKind, FilterState, StateCell};
use crate::pipeline::{
    EventReceiver, EventSender, NodeId, Pipeline, PipelineEvent, PipelineState,
};
use crate::port::{port, PortMsg, PortReceiver, PortSender};
use crate::sync::{ProviderId, SyncInfoManager, SyncProxy};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Configuration for the pipeline executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Port queue depth between filters.
    pub channel_capacity: usize,
    /// How long `stop` waits for worker tasks before aborting them.
    pub stop_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 16,
            stop_timeout: Duration::from_secs(2),
        }
    }
}

/// Flow gate observed by worker tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Running,
    Paused,
    Stopped,
}

/// State of an active run: worker tasks behind a monitor, the flow gate,
/// port closers and the sync providers registered for the run.
struct RunState {
    monitor: JoinHandle<bool>,
    gate: watch::Sender<Gate>,
    port_closers: Vec<PortSender>,
    providers: Vec<ProviderId>,
}

/// Executor that runs a playback pipeline.
///
/// # Example
///
/// ```rust,ignore
/// use maestro::pipeline::{Pipeline, PlayExecutor};
/// use maestro::sync::SyncInfoManager;
/// use std::sync::Arc;
///
/// let mut exec = PlayExecutor::new(pipeline, Arc::new(SyncInfoManager::new()));
/// exec.prepare()?;
/// exec.start()?;
/// exec.events().wait_eos().await?;
/// exec.finish().await?;
/// ```
pub struct PlayExecutor {
    pipeline: Pipeline,
    sync: Arc<SyncInfoManager>,
    events: EventSender,
    config: ExecutorConfig,
    run: Option<RunState>,
}

impl PlayExecutor {
    /// Create an executor with default configuration.
    pub fn new(pipeline: Pipeline, sync: Arc<SyncInfoManager>) -> Self {
        Self::with_config(pipeline, sync, ExecutorConfig::default())
    }

    /// Create an executor with custom configuration.
    pub fn with_config(pipeline: Pipeline, sync: Arc<SyncInfoManager>, config: ExecutorConfig) -> Self {
        Self {
            pipeline,
            sync,
            events: EventSender::default(),
            config,
            run: None,
        }
    }

    /// Aggregate pipeline state.
    pub fn state(&self) -> PipelineState {
        self.pipeline.state()
    }

    /// Subscribe to pipeline events.
    pub fn events(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// The sync manager shared with the running filters.
    pub fn sync_manager(&self) -> Arc<SyncInfoManager> {
        Arc::clone(&self.sync)
    }

    /// Current playback position from the timing authority, microseconds.
    pub fn position(&self) -> Result<i64> {
        self.sync.proxy().current_position()
    }

    /// Access the underlying pipeline.
    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    /// Bind a media location to the pipeline's sources.
    pub fn bind_source(&mut self, uri: &str) -> Result<()> {
        self.pipeline.bind_source(uri)
    }

    /// Prepare the pipeline (validate and acquire resources).
    pub fn prepare(&mut self) -> Result<()> {
        let from = self.pipeline.state();
        self.pipeline.prepare()?;
        let to = self.pipeline.state();
        if from != to {
            self.events.send_state_changed(from, to);
        }
        Ok(())
    }

    /// Seek the pipeline's sources, microseconds.
    pub fn seek(&mut self, position_us: i64) -> Result<()> {
        self.pipeline.seek(position_us)
    }

    /// Start buffer flow.
    ///
    /// Spawns one task per filter; must be called from a Tokio runtime.
    /// Idempotent while a run is active. Filters exposing a sync provider
    /// are registered with the manager for the duration of the run.
    pub fn start(&mut self) -> Result<()> {
        if self.run.is_some() {
            return Ok(());
        }
        let from = self.pipeline.state();
        self.pipeline.start()?;
        self.events.send_state_changed(from, PipelineState::Running);
        self.events.send(PipelineEvent::Started);

        let providers = self.register_providers();
        let (gate, _) = watch::channel(Gate::Running);

        // One port per edge, wired along the dependency order.
        let mut inputs: HashMap<NodeId, PortReceiver> = HashMap::new();
        let mut outputs: HashMap<NodeId, Vec<PortSender>> = HashMap::new();
        let mut port_closers = Vec::new();
        for id in self.pipeline.topo_order() {
            for child in self.pipeline.children(id) {
                let (tx, rx) = port(self.config.channel_capacity);
                port_closers.push(tx.clone());
                outputs.entry(id).or_default().push(tx);
                // Fan-in is not supported; one input port per filter.
                inputs.insert(child, rx);
            }
        }

        let mut tasks = Vec::new();
        let mut sink_cells = Vec::new();
        for id in self.pipeline.topo_order() {
            let node = self.pipeline.get_node(id).unwrap();
            let name = node.name().to_string();
            let filter = node.filter();
            let cell = node.cell();
            let outs = outputs.remove(&id).unwrap_or_default();
            let events = self.events.clone();
            match node.kind() {
                FilterKind::Source => {
                    tasks.push(spawn_source_task(
                        name,
                        filter,
                        cell,
                        outs,
                        gate.subscribe(),
                        events,
                    ));
                }
                FilterKind::Transform => {
                    let input = inputs.remove(&id).ok_or_else(|| {
                        Error::invalid_op(format!("filter '{}' has no input link", node.name()))
                    })?;
                    tasks.push(spawn_transform_task(name, filter, cell, input, outs, events));
                }
                FilterKind::Sink => {
                    let input = inputs.remove(&id).ok_or_else(|| {
                        Error::invalid_op(format!("filter '{}' has no input link", node.name()))
                    })?;
                    sink_cells.push(Arc::clone(&cell));
                    tasks.push(spawn_sink_task(
                        name,
                        filter,
                        cell,
                        node.calibration(),
                        input,
                        self.sync.proxy(),
                        gate.subscribe(),
                        events,
                    ));
                }
            }
        }

        let monitor_events = self.events.clone();
        let monitor = tokio::spawn(async move {
            let mut clean = true;
            for task in tasks {
                match task.await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => clean = false,
                    Err(e) => {
                        monitor_events.send_error(format!("worker task panicked: {e}"), None);
                        clean = false;
                    }
                }
            }
            // EOS only when every sink settled cleanly; a stopped or failed
            // run never reports completion.
            let settled = sink_cells.iter().all(|c| c.get() == FilterState::Ready);
            if clean && settled {
                monitor_events.send_eos();
            }
            clean && settled
        });

        self.run = Some(RunState {
            monitor,
            gate,
            port_closers,
            providers,
        });
        Ok(())
    }

    /// Suspend buffer flow, retaining position and resources.
    pub fn pause(&mut self) -> Result<()> {
        let from = self.pipeline.state();
        self.pipeline.pause()?;
        if let Some(run) = &self.run {
            run.gate.send_replace(Gate::Paused);
        }
        if from != PipelineState::Paused {
            self.events.send_state_changed(from, PipelineState::Paused);
        }
        Ok(())
    }

    /// Resume buffer flow after a pause.
    pub fn resume(&mut self) -> Result<()> {
        let from = self.pipeline.state();
        self.pipeline.resume()?;
        if let Some(run) = &self.run {
            run.gate.send_replace(Gate::Running);
        }
        if from != PipelineState::Running {
            self.events.send_state_changed(from, PipelineState::Running);
        }
        Ok(())
    }

    /// Stop buffer flow and tear the run down.
    ///
    /// Ports are closed so every worker unblocks in bounded time; tasks
    /// still running past the stop timeout are aborted.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(run) = self.run.take() {
            run.gate.send_replace(Gate::Stopped);
            for closer in &run.port_closers {
                closer.close();
            }
            let mut monitor = run.monitor;
            if tokio::time::timeout(self.config.stop_timeout, &mut monitor)
                .await
                .is_err()
            {
                tracing::warn!("worker tasks did not stop in time, aborting");
                monitor.abort();
            }
            self.unregister_providers(run.providers);
        }

        let from = self.pipeline.state();
        let result = self.pipeline.stop();
        if from != PipelineState::Stopped {
            self.events.send_state_changed(from, self.pipeline.state());
        }
        self.events.send(PipelineEvent::Stopped);
        result
    }

    /// Settle a completed run.
    ///
    /// Called after EOS: joins the workers, releases the run's sync
    /// providers and rewinds the sources so a later `start` replays from
    /// position 0. Fails if the run did not complete cleanly.
    pub async fn finish(&mut self) -> Result<()> {
        let run = self
            .run
            .take()
            .ok_or_else(|| Error::invalid_op("no active run to finish"))?;
        let clean = run.monitor.await.unwrap_or(false);
        self.unregister_providers(run.providers);

        if !clean {
            return Err(Error::invalid_op("pipeline did not complete cleanly"));
        }
        let from = self.pipeline.state();
        self.pipeline.set_state(PipelineState::Ready);
        self.events.send_state_changed(from, PipelineState::Ready);
        self.pipeline.rewind()
    }

    /// Reset the executor and pipeline to `Init`, clearing errors.
    pub async fn reset(&mut self) -> Result<()> {
        if self.run.is_some() {
            self.stop().await?;
        }
        self.pipeline.reset()
    }

    fn register_providers(&self) -> Vec<ProviderId> {
        let mut ids = Vec::new();
        for id in self.pipeline.topo_order() {
            let node = self.pipeline.get_node(id).unwrap();
            if let Some((provider, priority)) = node.filter().lock().unwrap().sync_provider() {
                ids.push(self.sync.register(provider, priority));
            }
        }
        ids
    }

    fn unregister_providers(&self, ids: Vec<ProviderId>) {
        for id in ids {
            if let Err(e) = self.sync.unregister(id) {
                tracing::warn!(error = %e, "failed to unregister sync provider");
            }
        }
    }
}

/// Wait until the gate opens; returns the gate value that ended the wait.
async fn wait_running(gate: &mut watch::Receiver<Gate>) -> Gate {
    loop {
        // Copy the value out; the borrow guard must not live across the
        // await below.
        let current = *gate.borrow_and_update();
        match current {
            Gate::Running => return Gate::Running,
            Gate::Stopped => return Gate::Stopped,
            Gate::Paused => {
                if gate.changed().await.is_err() {
                    return Gate::Stopped;
                }
            }
        }
    }
}

fn spawn_source_task(
    name: String,
    filter: Arc<Mutex<Box<dyn Filter>>>,
    cell: Arc<StateCell>,
    outputs: Vec<PortSender>,
    mut gate: watch::Receiver<Gate>,
    events: EventSender,
) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        tracing::debug!(filter = %name, "source task started");
        events.send_filter_started(&name);
        let mut produced: u64 = 0;

        loop {
            if wait_running(&mut gate).await == Gate::Stopped {
                break;
            }
            let pulled = filter.lock().unwrap().process(None);
            match pulled {
                Ok(Some(buffer)) => {
                    produced += 1;
                    let mut closed = false;
                    for tx in &outputs {
                        if tx.send(PortMsg::Buffer(buffer.clone())).await.is_err() {
                            closed = true;
                        }
                    }
                    if closed {
                        // Downstream tore the ports down; the run is over.
                        break;
                    }
                }
                Ok(None) => {
                    tracing::debug!(filter = %name, "source reached EOS");
                    for tx in &outputs {
                        let _ = tx.send(PortMsg::Eos).await;
                    }
                    cell.transition(FilterState::Ready)?;
                    break;
                }
                Err(e) => {
                    tracing::error!(filter = %name, error = %e, "source failed");
                    cell.set(FilterState::Error);
                    events.send_error(e.to_string(), Some(name.clone()));
                    return Err(e);
                }
            }
        }

        events.send_filter_finished(&name, produced);
        Ok(())
    })
}

fn spawn_transform_task(
    name: String,
    filter: Arc<Mutex<Box<dyn Filter>>>,
    cell: Arc<StateCell>,
    input: PortReceiver,
    outputs: Vec<PortSender>,
    events: EventSender,
) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        tracing::debug!(filter = %name, "transform task started");
        events.send_filter_started(&name);
        let mut processed: u64 = 0;

        loop {
            match input.recv().await {
                Ok(PortMsg::Buffer(buffer)) => {
                    processed += 1;
                    let out = filter.lock().unwrap().process(Some(buffer));
                    match out {
                        Ok(Some(out_buffer)) => {
                            for tx in &outputs {
                                let _ = tx.send(PortMsg::Buffer(out_buffer.clone())).await;
                            }
                        }
                        Ok(None) => {
                            tracing::trace!(filter = %name, "buffer filtered out");
                        }
                        Err(e) => {
                            tracing::error!(filter = %name, error = %e, "transform failed");
                            cell.set(FilterState::Error);
                            events.send_error(e.to_string(), Some(name.clone()));
                            return Err(e);
                        }
                    }
                }
                Ok(PortMsg::Eos) => {
                    tracing::debug!(filter = %name, "transform received EOS");
                    for tx in &outputs {
                        let _ = tx.send(PortMsg::Eos).await;
                    }
                    cell.transition(FilterState::Ready)?;
                    break;
                }
                Err(_) => break, // port closed by stop
            }
        }

        events.send_filter_finished(&name, processed);
        Ok(())
    })
}

#[allow(clippy::too_many_arguments)]
fn spawn_sink_task(
    name: String,
    filter: Arc<Mutex<Box<dyn Filter>>>,
    cell: Arc<StateCell>,
    calibration: Arc<Mutex<BufferCalibration>>,
    input: PortReceiver,
    proxy: SyncProxy,
    gate: watch::Receiver<Gate>,
    events: EventSender,
) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        tracing::debug!(filter = %name, "sink task started");
        events.send_filter_started(&name);
        let mut rendered: u64 = 0;

        loop {
            match input.recv().await {
                Ok(PortMsg::Buffer(mut buffer)) => {
                    calibration.lock().unwrap().correct(&mut buffer);

                    if let Some(pts) = buffer.pts() {
                        // Hold the buffer until the timing authority admits
                        // its PTS. Without an authority the sink renders
                        // ungated.
                        loop {
                            match proxy.check_pts(pts) {
                                Ok(true) => break,
                                Ok(false) => {
                                    if *gate.borrow() == Gate::Stopped {
                                        return Ok(());
                                    }
                                    tokio::time::sleep(Duration::from_millis(1)).await;
                                }
                                Err(Error::InvalidOperation(_)) => break,
                                Err(e) => {
                                    tracing::error!(filter = %name, error = %e, "pts check failed");
                                    cell.set(FilterState::Error);
                                    events.send_error(e.to_string(), Some(name.clone()));
                                    return Err(e);
                                }
                            }
                        }
                        events.send(PipelineEvent::PositionUpdate { pts_us: pts });
                    }

                    let result = filter.lock().unwrap().process(Some(buffer));
                    if let Err(e) = result {
                        tracing::error!(filter = %name, error = %e, "render failed");
                        cell.set(FilterState::Error);
                        events.send_error(e.to_string(), Some(name.clone()));
                        return Err(e);
                    }
                    rendered += 1;
                }
                Ok(PortMsg::Eos) => {
                    tracing::debug!(filter = %name, "sink received EOS");
                    cell.transition(FilterState::Ready)?;
                    break;
                }
                Err(_) => break, // port closed by stop
            }
        }

        events.send_filter_finished(&name, rendered);
        Ok(())
    })
}
