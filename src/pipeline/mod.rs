//! Pipeline construction and execution.
//!
//! This module provides the filter-graph infrastructure:
//!
//! - [`Pipeline`]: the DAG of filters and its lifecycle orchestration
//! - [`Node`]: a node in the graph (wraps a filter)
//! - [`PlayExecutor`]: spawns worker tasks and drives buffer flow
//! - [`PipelineEvent`]: async events emitted during execution
//!
//! # Example
//!
//! ```rust,ignore
//! use maestro::pipeline::{Pipeline, PlayExecutor};
//! use maestro::sync::SyncInfoManager;
//! use std::sync::Arc;
//!
//! let mut pipeline = Pipeline::new();
//! let src = pipeline.add_source("src", FileSource::new());
//! let sink = pipeline.add_sink("sink", AudioSink::new());
//! pipeline.link(src, sink)?;
//!
//! let mut exec = PlayExecutor::new(pipeline, Arc::new(SyncInfoManager::new()));
//! exec.prepare()?;
//! exec.start()?;
//! exec.events().wait_eos().await?;
//! ```

mod events;
mod executor;
mod graph;

pub use events::{EventReceiver, EventSender, PipelineEvent};
pub use executor::{ExecutorConfig, PlayExecutor};
pub use graph::{Link, Node, NodeId, Pipeline, PipelineState};
