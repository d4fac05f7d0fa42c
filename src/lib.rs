//! # Maestro
//!
//! A media playback orchestration engine: an intent-driven player state
//! machine on top of a filter-graph pipeline, with cross-filter timestamp
//! synchronization and per-filter buffer calibration.
//!
//! ## Features
//!
//! - **Intent-driven player**: a closed, auditable transition table maps
//!   commands onto pipeline operations, with pending transitions and a
//!   single canonical error-recovery path
//! - **Filter-graph pipelines**: sources, transforms and sinks in a DAG,
//!   lifecycle-driven in dependency order with rollback on failure
//! - **Backpressured buffer flow**: one Tokio task per filter connected by
//!   bounded ports; producers block, buffers are never silently dropped
//! - **Timestamp arbitration**: sinks owning a reference clock register as
//!   sync-info providers; the highest-priority provider drives PTS
//!   admission through a stable proxy
//! - **Buffer calibration**: pluggable per-filter PTS correction (fixed
//!   offset, drift tracking) with discontinuity handling
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use maestro::prelude::*;
//! use std::sync::Arc;
//!
//! let mut pipeline = Pipeline::new();
//! let src = pipeline.add_source("src", FileSource::new());
//! let sink = pipeline.add_sink("sink", AudioSink::new());
//! pipeline.link(src, sink)?;
//!
//! let exec = PlayExecutor::new(pipeline, Arc::new(SyncInfoManager::new()));
//! let mut player = Player::new(exec);
//! player.execute(Intent::SetSource("file:///media.raw".into())).await?;
//! player.execute(Intent::NotifyReady).await?;
//! player.execute(Intent::Play).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod calibrate;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod player;
pub mod port;
pub mod sync;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::buffer::Buffer;
    pub use crate::error::{Error, Result};
    pub use crate::filter::{Filter, Sink, Source, Transform};
    pub use crate::pipeline::{Pipeline, PlayExecutor};
    pub use crate::player::{Action, Intent, Player, PlayerState};
    pub use crate::sync::{SyncInfoManager, SyncInfoProvider};
}

pub use error::{Error, Result};
