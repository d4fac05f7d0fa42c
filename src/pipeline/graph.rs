//! Pipeline graph structure and lifecycle orchestration using daggy.

use crate::calibrate::BufferCalibration;
use crate::error::{Error, Result};
use crate::filter::{
    Filter, FilterKind, FilterState, Sink, SinkAdapter, Source, SourceAdapter, StateCell,
    Transform, TransformAdapter,
};
use daggy::petgraph::algo::toposort;
use daggy::{Dag, NodeIndex, Walker};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Unique identifier for a node in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) NodeIndex);

impl NodeId {
    /// Get the underlying index.
    pub fn index(&self) -> usize {
        self.0.index()
    }
}

/// Aggregate state of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipelineState {
    /// Pipeline is assembled but not prepared.
    #[default]
    Init,
    /// All filters prepared; resources acquired.
    Ready,
    /// Buffers are flowing.
    Running,
    /// Flow suspended; resources retained.
    Paused,
    /// Flow torn down; filters stopped.
    Stopped,
    /// At least one filter failed.
    Error,
}

/// A node in the pipeline graph.
///
/// The filter stays resident behind a shared lock for the node's whole
/// lifetime, so lifecycle operations reach it whether or not a worker task
/// is currently executing it, and a stopped pipeline can replay without
/// rebuilding the graph.
pub struct Node {
    name: String,
    filter: Arc<Mutex<Box<dyn Filter>>>,
    kind: FilterKind,
    /// Lifecycle cell shared with the worker task so asynchronous errors
    /// are visible to the pipeline owner.
    cell: Arc<StateCell>,
    calibration: Arc<Mutex<BufferCalibration>>,
}

impl Node {
    fn new(name: impl Into<String>, filter: Box<dyn Filter>) -> Self {
        let kind = filter.kind();
        Self {
            name: name.into(),
            filter: Arc::new(Mutex::new(filter)),
            kind,
            cell: Arc::new(StateCell::new(FilterState::Init)),
            calibration: Arc::new(Mutex::new(BufferCalibration::new())),
        }
    }

    /// Get the node's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the filter kind.
    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    /// Get the node's lifecycle state.
    pub fn state(&self) -> FilterState {
        self.cell.get()
    }

    /// Shared handle to the filter.
    pub fn filter(&self) -> Arc<Mutex<Box<dyn Filter>>> {
        Arc::clone(&self.filter)
    }

    /// Shared handle to the lifecycle cell.
    pub fn cell(&self) -> Arc<StateCell> {
        Arc::clone(&self.cell)
    }

    /// Shared handle to the node's calibration.
    pub fn calibration(&self) -> Arc<Mutex<BufferCalibration>> {
        Arc::clone(&self.calibration)
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("state", &self.cell.get())
            .finish()
    }
}

/// A link between two nodes in the pipeline.
#[derive(Debug, Clone)]
pub struct Link {
    /// Name of the upstream output pad.
    pub src_pad: String,
    /// Name of the downstream input pad.
    pub sink_pad: String,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            src_pad: "src".to_string(),
            sink_pad: "sink".to_string(),
        }
    }
}

/// A playback pipeline represented as a directed acyclic graph of filters.
///
/// Lifecycle operations iterate the members in dependency order
/// (topological for startup, reverse for suspension and teardown), stop at
/// the first failure and roll the already-transitioned subset back, so the
/// pipeline is never left half-started.
pub struct Pipeline {
    graph: Dag<Node, Link>,
    nodes_by_name: HashMap<String, NodeId>,
    state: PipelineState,
}

impl Pipeline {
    /// Create a new empty pipeline.
    pub fn new() -> Self {
        Self {
            graph: Dag::new(),
            nodes_by_name: HashMap::new(),
            state: PipelineState::Init,
        }
    }

    /// Add a source filter.
    pub fn add_source<S: Source + 'static>(&mut self, name: impl Into<String>, source: S) -> NodeId {
        self.add_filter(name, Box::new(SourceAdapter::new(source)))
    }

    /// Add a transform filter.
    pub fn add_transform<T: Transform + 'static>(
        &mut self,
        name: impl Into<String>,
        transform: T,
    ) -> NodeId {
        self.add_filter(name, Box::new(TransformAdapter::new(transform)))
    }

    /// Add a sink filter.
    pub fn add_sink<S: Sink + 'static>(&mut self, name: impl Into<String>, sink: S) -> NodeId {
        self.add_filter(name, Box::new(SinkAdapter::new(sink)))
    }

    /// Add an already type-erased filter.
    pub fn add_filter(&mut self, name: impl Into<String>, filter: Box<dyn Filter>) -> NodeId {
        let name = name.into();
        let node = Node::new(name.clone(), filter);
        let id = NodeId(self.graph.add_node(node));
        self.nodes_by_name.insert(name, id);
        id
    }

    /// Get a node by ID.
    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.graph.node_weight(id.0)
    }

    /// Get a node ID by name.
    pub fn get_node_id(&self, name: &str) -> Option<NodeId> {
        self.nodes_by_name.get(name).copied()
    }

    /// Link two nodes with default pad names.
    ///
    /// The edge carries buffers from `src` to `sink`; daggy rejects edges
    /// that would create a cycle.
    pub fn link(&mut self, src: NodeId, sink: NodeId) -> Result<()> {
        let src_node = self
            .graph
            .node_weight(src.0)
            .ok_or_else(|| Error::InvalidParameter("source node not found".into()))?;
        if src_node.kind == FilterKind::Sink {
            return Err(Error::invalid_op(format!(
                "filter '{}' is a sink and has no output",
                src_node.name
            )));
        }
        let sink_node = self
            .graph
            .node_weight(sink.0)
            .ok_or_else(|| Error::InvalidParameter("sink node not found".into()))?;
        if sink_node.kind == FilterKind::Source {
            return Err(Error::invalid_op(format!(
                "filter '{}' is a source and has no input",
                sink_node.name
            )));
        }

        self.graph
            .add_edge(src.0, sink.0, Link::default())
            .map_err(|_| Error::invalid_op("linking would create a cycle"))?;
        Ok(())
    }

    /// Get all source nodes (nodes with no incoming edges).
    pub fn sources(&self) -> Vec<NodeId> {
        self.boundary_nodes(daggy::petgraph::Direction::Incoming)
    }

    /// Get all sink nodes (nodes with no outgoing edges).
    pub fn sinks(&self) -> Vec<NodeId> {
        self.boundary_nodes(daggy::petgraph::Direction::Outgoing)
    }

    fn boundary_nodes(&self, dir: daggy::petgraph::Direction) -> Vec<NodeId> {
        self.graph
            .graph()
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .graph()
                    .neighbors_directed(idx, dir)
                    .count()
                    == 0
            })
            .map(NodeId)
            .collect()
    }

    /// Get the children (downstream nodes) of a node.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.graph
            .children(id.0)
            .iter(&self.graph)
            .map(|(_, node_idx)| NodeId(node_idx))
            .collect()
    }

    /// Get the parents (upstream nodes) of a node.
    pub fn parents(&self, id: NodeId) -> Vec<NodeId> {
        self.graph
            .parents(id.0)
            .iter(&self.graph)
            .map(|(_, node_idx)| NodeId(node_idx))
            .collect()
    }

    /// Get the number of nodes in the pipeline.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of links in the pipeline.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Check if the pipeline is empty.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Nodes in dependency (topological) order, sources first.
    pub fn topo_order(&self) -> Vec<NodeId> {
        // The DAG invariant is maintained on every add_edge, so a cycle
        // error here is unreachable.
        toposort(self.graph.graph(), None)
            .map(|order| order.into_iter().map(NodeId).collect())
            .unwrap_or_default()
    }

    /// Validate the pipeline structure.
    ///
    /// Checks that the graph is non-empty, that every boundary node has the
    /// matching filter kind, and that at least one source and one sink
    /// exist.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::invalid_op("pipeline is empty"));
        }

        let sources = self.sources();
        let sinks = self.sinks();
        if sources.is_empty() {
            return Err(Error::invalid_op("pipeline has no source filters"));
        }
        if sinks.is_empty() {
            return Err(Error::invalid_op("pipeline has no sink filters"));
        }

        for id in &sources {
            let node = self.get_node(*id).unwrap();
            if node.kind != FilterKind::Source {
                return Err(Error::invalid_op(format!(
                    "filter '{}' has no inputs but is not a source",
                    node.name()
                )));
            }
        }
        for id in &sinks {
            let node = self.get_node(*id).unwrap();
            if node.kind != FilterKind::Sink {
                return Err(Error::invalid_op(format!(
                    "filter '{}' has no outputs but is not a sink",
                    node.name()
                )));
            }
        }

        // One input per filter. Merging streams needs a dedicated muxing
        // filter, which this engine does not ship.
        for idx in self.graph.graph().node_indices() {
            let id = NodeId(idx);
            let inputs = self.parents(id).len();
            if inputs > 1 {
                let node = self.get_node(id).unwrap();
                return Err(Error::invalid_op(format!(
                    "filter '{}' has {inputs} input links, fan-in is not supported",
                    node.name()
                )));
            }
        }

        Ok(())
    }

    /// Aggregate pipeline state, derived from the stored state and every
    /// member's lifecycle cell.
    ///
    /// Any filter in `Error` degrades the whole pipeline to `Error` until
    /// reset. A running pipeline whose filters have all settled back to
    /// `Ready` (clean EOS) reports `Ready`.
    pub fn state(&self) -> PipelineState {
        let mut all_ready = !self.is_empty();
        for node in self.graph.graph().raw_nodes() {
            match node.weight.state() {
                FilterState::Error => return PipelineState::Error,
                FilterState::Ready => {}
                _ => all_ready = false,
            }
        }
        if self.state == PipelineState::Running && all_ready {
            return PipelineState::Ready;
        }
        self.state
    }

    pub(crate) fn set_state(&mut self, state: PipelineState) {
        self.state = state;
    }

    /// Prepare every filter, sources first.
    ///
    /// Idempotent from `Ready`. On failure the already-prepared prefix is
    /// reset back to `Init` and the failing filter's cell is left in
    /// `Error`.
    pub fn prepare(&mut self) -> Result<()> {
        match self.state() {
            PipelineState::Ready => return Ok(()),
            PipelineState::Init | PipelineState::Stopped => {}
            other => {
                return Err(Error::wrong_state(
                    "Init or Stopped",
                    format!("{other:?}"),
                ))
            }
        }
        self.validate()?;

        let order = self.topo_order();
        let mut prepared: Vec<NodeId> = Vec::new();
        for id in order {
            let node = self.get_node(id).unwrap();
            if node.state() == FilterState::Ready {
                continue;
            }
            if let Err(e) = Self::prepare_node(node) {
                tracing::error!(filter = node.name(), error = %e, "prepare failed");
                node.cell.set(FilterState::Error);
                self.rollback_prepared(&prepared);
                return Err(e);
            }
            tracing::debug!(filter = node.name(), "prepared");
            prepared.push(id);
        }

        self.state = PipelineState::Ready;
        Ok(())
    }

    fn prepare_node(node: &Node) -> Result<()> {
        node.cell.transition(FilterState::Preparing)?;
        node.filter.lock().unwrap().prepare()?;
        node.cell.transition(FilterState::Ready)
    }

    fn rollback_prepared(&self, prepared: &[NodeId]) {
        for id in prepared.iter().rev() {
            let node = self.get_node(*id).unwrap();
            if let Err(e) = node.filter.lock().unwrap().reset() {
                tracing::warn!(filter = node.name(), error = %e, "rollback reset failed");
            }
            node.cell.set(FilterState::Init);
        }
    }

    /// Start every filter, sources first.
    ///
    /// Idempotent from `Running`. On failure the already-started prefix is
    /// stopped back to `Ready`.
    pub fn start(&mut self) -> Result<()> {
        match self.state() {
            PipelineState::Running => return Ok(()),
            PipelineState::Ready => {}
            other => return Err(Error::wrong_state("Ready", format!("{other:?}"))),
        }

        let order = self.topo_order();
        let mut started: Vec<NodeId> = Vec::new();
        for id in order {
            let node = self.get_node(id).unwrap();
            let result = node
                .cell
                .transition(FilterState::Running)
                .and_then(|_| node.filter.lock().unwrap().start());
            if let Err(e) = result {
                tracing::error!(filter = node.name(), error = %e, "start failed");
                node.cell.set(FilterState::Error);
                for prev in started.iter().rev() {
                    let prev_node = self.get_node(*prev).unwrap();
                    if let Err(e) = prev_node.filter.lock().unwrap().stop() {
                        tracing::warn!(filter = prev_node.name(), error = %e, "rollback stop failed");
                    }
                    prev_node.cell.set(FilterState::Ready);
                }
                return Err(e);
            }
            started.push(id);
        }

        self.state = PipelineState::Running;
        Ok(())
    }

    /// Pause every filter, sinks first.
    ///
    /// Idempotent from `Paused`. On failure the already-paused suffix is
    /// resumed back to `Running`.
    pub fn pause(&mut self) -> Result<()> {
        match self.state() {
            PipelineState::Paused => return Ok(()),
            PipelineState::Running => {}
            other => return Err(Error::wrong_state("Running", format!("{other:?}"))),
        }

        let mut order = self.topo_order();
        order.reverse();
        let mut paused: Vec<NodeId> = Vec::new();
        for id in order {
            let node = self.get_node(id).unwrap();
            let result = node
                .cell
                .transition(FilterState::Paused)
                .and_then(|_| node.filter.lock().unwrap().pause());
            if let Err(e) = result {
                tracing::error!(filter = node.name(), error = %e, "pause failed");
                node.cell.set(FilterState::Error);
                for prev in paused.iter().rev() {
                    let prev_node = self.get_node(*prev).unwrap();
                    if let Err(e) = prev_node.filter.lock().unwrap().resume() {
                        tracing::warn!(filter = prev_node.name(), error = %e, "rollback resume failed");
                    }
                    prev_node.cell.set(FilterState::Running);
                }
                return Err(e);
            }
            paused.push(id);
        }

        self.state = PipelineState::Paused;
        Ok(())
    }

    /// Resume every paused filter, sources first.
    pub fn resume(&mut self) -> Result<()> {
        match self.state() {
            PipelineState::Running => return Ok(()),
            PipelineState::Paused => {}
            other => return Err(Error::wrong_state("Paused", format!("{other:?}"))),
        }

        for id in self.topo_order() {
            let node = self.get_node(id).unwrap();
            let result = node
                .cell
                .transition(FilterState::Running)
                .and_then(|_| node.filter.lock().unwrap().resume());
            if let Err(e) = result {
                tracing::error!(filter = node.name(), error = %e, "resume failed");
                node.cell.set(FilterState::Error);
                return Err(e);
            }
        }

        self.state = PipelineState::Running;
        Ok(())
    }

    /// Stop every filter, sinks first.
    ///
    /// Teardown is not abandoned mid-way: every filter is stopped even if
    /// an earlier one fails, and the first error is returned.
    pub fn stop(&mut self) -> Result<()> {
        match self.state() {
            PipelineState::Stopped | PipelineState::Init => return Ok(()),
            _ => {}
        }

        let mut order = self.topo_order();
        order.reverse();
        let mut first_err: Option<Error> = None;
        for id in order {
            let node = self.get_node(id).unwrap();
            if node.state() == FilterState::Error {
                continue;
            }
            match node.filter.lock().unwrap().stop() {
                Ok(()) => node.cell.set(FilterState::Stopped),
                Err(e) => {
                    tracing::error!(filter = node.name(), error = %e, "stop failed");
                    node.cell.set(FilterState::Error);
                    first_err.get_or_insert(e);
                }
            }
        }

        self.state = PipelineState::Stopped;
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Reset the whole pipeline to `Init`, clearing filter errors and
    /// calibration state.
    pub fn reset(&mut self) -> Result<()> {
        for node in self.graph.graph().raw_nodes() {
            let node = &node.weight;
            if let Err(e) = node.filter.lock().unwrap().reset() {
                tracing::warn!(filter = node.name(), error = %e, "reset failed");
            }
            node.cell.set(FilterState::Init);
            node.calibration.lock().unwrap().reset();
        }
        self.state = PipelineState::Init;
        Ok(())
    }

    /// Seek every source filter to the given position (microseconds).
    ///
    /// Valid while prepared but not flowing (`Ready` or `Paused`). Every
    /// calibration is handed a discontinuity hint so the first buffer after
    /// the jump rebaselines instead of extrapolating.
    pub fn seek(&mut self, position_us: i64) -> Result<()> {
        if position_us < 0 {
            return Err(Error::InvalidParameter(format!(
                "seek position must be non-negative, got {position_us}"
            )));
        }
        match self.state() {
            PipelineState::Ready | PipelineState::Paused => {}
            other => {
                return Err(Error::wrong_state(
                    "Ready or Paused",
                    format!("{other:?}"),
                ))
            }
        }

        for id in self.sources() {
            let node = self.get_node(id).unwrap();
            node.filter.lock().unwrap().seek(position_us)?;
        }
        for node in self.graph.graph().raw_nodes() {
            node.weight.calibration.lock().unwrap().mark_discontinuity();
        }
        tracing::debug!(position_us, "pipeline seeked");
        Ok(())
    }

    /// Rewind every source filter to position 0.
    ///
    /// Seekable sources seek; a source that refuses seeking falls back to
    /// a filter reset, which restores its initial read position. Valid in
    /// the same states as [`seek`](Self::seek).
    pub fn rewind(&mut self) -> Result<()> {
        match self.state() {
            PipelineState::Ready | PipelineState::Paused => {}
            other => {
                return Err(Error::wrong_state(
                    "Ready or Paused",
                    format!("{other:?}"),
                ))
            }
        }

        for id in self.sources() {
            let node = self.get_node(id).unwrap();
            let mut filter = node.filter.lock().unwrap();
            match filter.seek(0) {
                Ok(()) => {}
                Err(Error::InvalidOperation(_)) => filter.reset()?,
                Err(e) => return Err(e),
            }
        }
        for node in self.graph.graph().raw_nodes() {
            node.weight.calibration.lock().unwrap().mark_discontinuity();
        }
        tracing::debug!("pipeline rewound");
        Ok(())
    }

    /// Bind a media location to every source filter.
    ///
    /// Valid while flow is down (`Init`, `Ready` or `Stopped`).
    pub fn bind_source(&mut self, uri: &str) -> Result<()> {
        match self.state() {
            PipelineState::Init | PipelineState::Ready | PipelineState::Stopped => {}
            other => {
                return Err(Error::wrong_state(
                    "Init, Ready or Stopped",
                    format!("{other:?}"),
                ))
            }
        }
        for id in self.sources() {
            let node = self.get_node(id).unwrap();
            node.filter.lock().unwrap().set_source(uri)?;
        }
        Ok(())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("nodes", &self.node_count())
            .field("edges", &self.edge_count())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;
    use crate::filter::testing::{CountingSink, PassThrough, VecSource};

    /// Transform that fails a chosen lifecycle op.
    struct Faulty {
        fail_on: &'static str,
    }

    impl Transform for Faulty {
        fn transform(&mut self, buffer: Buffer) -> Result<Option<Buffer>> {
            Ok(Some(buffer))
        }

        fn prepare(&mut self) -> Result<()> {
            if self.fail_on == "prepare" {
                return Err(Error::Plugin("prepare blew up".into()));
            }
            Ok(())
        }

        fn start(&mut self) -> Result<()> {
            if self.fail_on == "start" {
                return Err(Error::Plugin("start blew up".into()));
            }
            Ok(())
        }
    }

    fn three_stage() -> (Pipeline, NodeId, NodeId, NodeId) {
        let mut p = Pipeline::new();
        let src = p.add_source("src", VecSource::new(vec![Buffer::empty().with_pts(0)]));
        let mid = p.add_transform("mid", PassThrough::new());
        let sink = p.add_sink("sink", CountingSink::new());
        p.link(src, mid).unwrap();
        p.link(mid, sink).unwrap();
        (p, src, mid, sink)
    }

    #[test]
    fn test_pipeline_creation() {
        let p = Pipeline::new();
        assert!(p.is_empty());
        assert_eq!(p.state(), PipelineState::Init);
    }

    #[test]
    fn test_add_and_link() {
        let (p, src, mid, sink) = three_stage();
        assert_eq!(p.node_count(), 3);
        assert_eq!(p.edge_count(), 2);
        assert_eq!(p.get_node_id("src"), Some(src));
        assert_eq!(p.children(src), vec![mid]);
        assert_eq!(p.parents(sink), vec![mid]);
    }

    #[test]
    fn test_cycle_rejected() {
        let mut p = Pipeline::new();
        let a = p.add_transform("a", PassThrough::new());
        let b = p.add_transform("b", PassThrough::new());
        p.link(a, b).unwrap();
        assert!(p.link(b, a).is_err());
    }

    #[test]
    fn test_link_kind_mismatch() {
        let mut p = Pipeline::new();
        let src = p.add_source("src", VecSource::new(vec![]));
        let sink = p.add_sink("sink", CountingSink::new());
        // Backwards: a sink has no output, a source no input.
        assert!(p.link(sink, src).is_err());
    }

    #[test]
    fn test_validate() {
        let mut p = Pipeline::new();
        assert!(p.validate().is_err());

        let a = p.add_transform("a", PassThrough::new());
        let b = p.add_transform("b", PassThrough::new());
        p.link(a, b).unwrap();
        // Boundary nodes are not source/sink filters.
        assert!(p.validate().is_err());

        let (p, _, _, _) = three_stage();
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_fan_in_rejected() {
        let mut p = Pipeline::new();
        let a = p.add_source("a", VecSource::new(vec![Buffer::empty().with_pts(0)]));
        let b = p.add_source("b", VecSource::new(vec![Buffer::empty().with_pts(0)]));
        let sink = p.add_sink("sink", CountingSink::new());
        p.link(a, sink).unwrap();
        p.link(b, sink).unwrap();

        // Two parents on one filter would silently interleave or drop one
        // stream; the pipeline refuses to prepare instead.
        let err = p.prepare().unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
        assert!(err.to_string().contains("fan-in"));
    }

    #[test]
    fn test_rewind_falls_back_for_non_seekable_source() {
        struct OneShot {
            fired: bool,
        }
        impl Source for OneShot {
            fn pull(&mut self) -> Result<Option<Buffer>> {
                if self.fired {
                    return Ok(None);
                }
                self.fired = true;
                Ok(Some(Buffer::empty().with_pts(0)))
            }
            fn reset(&mut self) -> Result<()> {
                self.fired = false;
                Ok(())
            }
            fn name(&self) -> &str {
                "one-shot"
            }
        }

        let mut p = Pipeline::new();
        let src = p.add_source("src", OneShot { fired: false });
        let sink = p.add_sink("sink", CountingSink::new());
        p.link(src, sink).unwrap();
        p.prepare().unwrap();

        let filter = p.get_node(src).unwrap().filter();
        {
            let mut f = filter.lock().unwrap();
            assert!(f.process(None).unwrap().is_some());
            assert!(f.process(None).unwrap().is_none());
        }

        // seek(0) is refused by the default Source::seek; rewind resets
        // the filter instead of failing.
        assert!(matches!(p.seek(0), Err(Error::InvalidOperation(_))));
        p.rewind().unwrap();
        assert!(filter.lock().unwrap().process(None).unwrap().is_some());
    }

    #[test]
    fn test_topo_order_sources_first() {
        let (p, src, mid, sink) = three_stage();
        let order = p.topo_order();
        let pos = |id| order.iter().position(|&n| n == id).unwrap();
        assert!(pos(src) < pos(mid));
        assert!(pos(mid) < pos(sink));
    }

    #[test]
    fn test_prepare_is_idempotent() {
        let (mut p, src, _, _) = three_stage();
        p.prepare().unwrap();
        assert_eq!(p.state(), PipelineState::Ready);
        assert_eq!(p.get_node(src).unwrap().state(), FilterState::Ready);

        // Repeating from Ready is a success no-op.
        p.prepare().unwrap();
        assert_eq!(p.state(), PipelineState::Ready);
    }

    #[test]
    fn test_prepare_failure_rolls_back() {
        let mut p = Pipeline::new();
        let src = p.add_source("src", VecSource::new(vec![]));
        let bad = p.add_transform("bad", Faulty { fail_on: "prepare" });
        let sink = p.add_sink("sink", CountingSink::new());
        p.link(src, bad).unwrap();
        p.link(bad, sink).unwrap();

        assert!(p.prepare().is_err());
        // The prepared prefix went back to Init, the failing filter is in
        // Error, untouched filters never left Init.
        assert_eq!(p.get_node(src).unwrap().state(), FilterState::Init);
        assert_eq!(p.get_node(bad).unwrap().state(), FilterState::Error);
        assert_eq!(p.get_node(sink).unwrap().state(), FilterState::Init);
        assert_eq!(p.state(), PipelineState::Error);
    }

    #[test]
    fn test_start_requires_ready() {
        let (mut p, _, _, _) = three_stage();
        assert!(matches!(p.start(), Err(Error::WrongState { .. })));
    }

    #[test]
    fn test_start_failure_stops_started_prefix() {
        let mut p = Pipeline::new();
        let src = p.add_source("src", VecSource::new(vec![]));
        let bad = p.add_transform("bad", Faulty { fail_on: "start" });
        let sink = p.add_sink("sink", CountingSink::new());
        p.link(src, bad).unwrap();
        p.link(bad, sink).unwrap();

        p.prepare().unwrap();
        assert!(p.start().is_err());
        assert_eq!(p.get_node(src).unwrap().state(), FilterState::Ready);
        assert_eq!(p.get_node(bad).unwrap().state(), FilterState::Error);
        assert_eq!(p.state(), PipelineState::Error);
    }

    #[test]
    fn test_full_lifecycle() {
        let (mut p, _, _, _) = three_stage();
        p.prepare().unwrap();
        p.start().unwrap();
        assert_eq!(p.state(), PipelineState::Running);
        p.pause().unwrap();
        assert_eq!(p.state(), PipelineState::Paused);
        p.resume().unwrap();
        assert_eq!(p.state(), PipelineState::Running);
        p.stop().unwrap();
        assert_eq!(p.state(), PipelineState::Stopped);
        // Stopped pipelines can be prepared again.
        p.prepare().unwrap();
        assert_eq!(p.state(), PipelineState::Ready);
    }

    #[test]
    fn test_reset_clears_error() {
        let mut p = Pipeline::new();
        let src = p.add_source("src", VecSource::new(vec![]));
        let bad = p.add_transform("bad", Faulty { fail_on: "prepare" });
        let sink = p.add_sink("sink", CountingSink::new());
        p.link(src, bad).unwrap();
        p.link(bad, sink).unwrap();

        assert!(p.prepare().is_err());
        assert_eq!(p.state(), PipelineState::Error);

        p.reset().unwrap();
        assert_eq!(p.state(), PipelineState::Init);
        assert_eq!(p.get_node(bad).unwrap().state(), FilterState::Init);
    }

    #[test]
    fn test_seek_forwards_to_sources() {
        let mut p = Pipeline::new();
        let src_filter = VecSource::new(vec![Buffer::empty().with_pts(0)]);
        let seeks = src_filter.seek_log();
        let src = p.add_source("src", src_filter);
        let sink = p.add_sink("sink", CountingSink::new());
        p.link(src, sink).unwrap();

        p.prepare().unwrap();
        p.seek(5_000).unwrap();
        assert_eq!(*seeks.lock().unwrap(), vec![5_000]);
    }

    #[test]
    fn test_seek_invalid_while_running() {
        let (mut p, _, _, _) = three_stage();
        p.prepare().unwrap();
        p.start().unwrap();
        assert!(matches!(p.seek(0), Err(Error::WrongState { .. })));
        assert!(matches!(p.seek(-1), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_bind_source() {
        let (mut p, _, _, _) = three_stage();
        p.bind_source("file:///tmp/a.raw").unwrap();
        p.prepare().unwrap();
        p.start().unwrap();
        assert!(matches!(
            p.bind_source("file:///tmp/b.raw"),
            Err(Error::WrongState { .. })
        ));
    }
}
