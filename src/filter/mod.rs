//! Filters and their lifecycle.
//!
//! A filter is one processing stage in a playback pipeline. Implement one
//! of the role traits ([`Source`], [`Sink`], [`Transform`]) and hand it to
//! the pipeline; the pipeline wraps it in the matching adapter and drives
//! its lifecycle through the [`FilterState`] machine.
//!
//! # Example
//!
//! ```rust,ignore
//! use maestro::filter::{Source, Sink};
//! use maestro::pipeline::Pipeline;
//!
//! let mut pipeline = Pipeline::new();
//! let src = pipeline.add_source("src", MySource::new());
//! let sink = pipeline.add_sink("sink", MySink::new());
//! pipeline.link(src, sink)?;
//! ```

mod state;
pub mod testing;
mod traits;

pub use state::{FilterState, StateCell};
pub use traits::{
    Filter, FilterKind, Sink, SinkAdapter, Source, SourceAdapter, Transform, TransformAdapter,
};
