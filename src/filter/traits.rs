//! Core filter traits.
//!
//! Filters come in three roles: [`Source`] (produces buffers), [`Sink`]
//! (consumes buffers) and [`Transform`] (maps buffers). Each role trait has
//! lifecycle hooks with no-op defaults; the pipeline drives them in
//! dependency order and tracks the resulting [`FilterState`] per node.
//!
//! The pipeline itself handles filters uniformly through the type-erased
//! [`Filter`] trait; role implementations are wrapped by the adapter types
//! at `add_source`/`add_transform`/`add_sink` time.

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::sync::SyncInfoProvider;
use std::sync::Arc;

/// The role of a filter in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    /// Produces buffers (file reader, network receiver, test generator).
    Source,
    /// Consumes buffers (renderer, writer).
    Sink,
    /// Maps buffers (decoder, converter).
    Transform,
}

/// A source filter that produces buffers.
///
/// # Lifecycle
///
/// - `pull()` is called repeatedly by the executor while running.
/// - Return `Ok(Some(buffer))` to emit a buffer.
/// - Return `Ok(None)` to signal end-of-stream.
/// - Return `Err(...)` to put the filter into the `Error` state.
pub trait Source: Send {
    /// Produce the next buffer. `Ok(None)` means end of stream.
    fn pull(&mut self) -> Result<Option<Buffer>>;

    /// Bind a source location (URI, path). Plugins that need no binding
    /// accept anything.
    fn set_source(&mut self, uri: &str) -> Result<()> {
        let _ = uri;
        Ok(())
    }

    /// Seek to a stream position in microseconds.
    ///
    /// The default refuses: sources are non-seekable unless they say so.
    fn seek(&mut self, pos_us: i64) -> Result<()> {
        let _ = pos_us;
        Err(Error::invalid_op("source is not seekable"))
    }

    /// Acquire resources. Called once per prepare.
    fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    /// Begin producing.
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Suspend producing, retaining position.
    fn pause(&mut self) -> Result<()> {
        Ok(())
    }

    /// Resume after a pause.
    fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    /// Stop producing and release transient resources.
    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    /// Return to the initial state, clearing any error condition.
    fn reset(&mut self) -> Result<()> {
        Ok(())
    }

    /// Name for logging.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A sink filter that consumes buffers.
pub trait Sink: Send {
    /// Consume a buffer by ownership transfer.
    fn render(&mut self, buffer: Buffer) -> Result<()>;

    /// Sync-info provider exposed by this sink, if it owns a reference
    /// clock (commonly the audio sink). Returned together with its
    /// arbitration priority; registered while the filter is Running.
    fn sync_provider(&self) -> Option<(Arc<dyn SyncInfoProvider>, u32)> {
        None
    }

    /// Acquire resources. Called once per prepare.
    fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    /// Begin consuming.
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Suspend consuming.
    fn pause(&mut self) -> Result<()> {
        Ok(())
    }

    /// Resume after a pause.
    fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    /// Stop consuming and release transient resources.
    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    /// Return to the initial state, clearing any error condition.
    fn reset(&mut self) -> Result<()> {
        Ok(())
    }

    /// Name for logging.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A transform filter that maps buffers.
///
/// Return `Ok(None)` to drop (filter out) the input buffer.
pub trait Transform: Send {
    /// Transform one input buffer into at most one output buffer.
    fn transform(&mut self, buffer: Buffer) -> Result<Option<Buffer>>;

    /// Acquire resources.
    fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    /// Begin processing.
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Suspend processing.
    fn pause(&mut self) -> Result<()> {
        Ok(())
    }

    /// Resume after a pause.
    fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    /// Stop processing.
    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    /// Return to the initial state.
    fn reset(&mut self) -> Result<()> {
        Ok(())
    }

    /// Name for logging.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Type-erased filter, used internally by the pipeline.
///
/// Most users implement [`Source`], [`Sink`] or [`Transform`] instead.
pub trait Filter: Send {
    /// Name for logging.
    fn name(&self) -> &str;

    /// The filter's role.
    fn kind(&self) -> FilterKind;

    /// Process or produce a buffer.
    ///
    /// - Sources: `input` is `None`; `Ok(None)` means end of stream.
    /// - Sinks: `input` is `Some`; always returns `Ok(None)`.
    /// - Transforms: `input` is `Some`; `Ok(None)` drops the buffer.
    fn process(&mut self, input: Option<Buffer>) -> Result<Option<Buffer>>;

    /// Bind a source location. Only meaningful for sources.
    fn set_source(&mut self, uri: &str) -> Result<()>;

    /// Seek to a stream position in microseconds. Only sources move;
    /// other roles treat this as a flush point and succeed.
    fn seek(&mut self, pos_us: i64) -> Result<()>;

    /// Lifecycle: acquire resources.
    fn prepare(&mut self) -> Result<()>;
    /// Lifecycle: begin processing.
    fn start(&mut self) -> Result<()>;
    /// Lifecycle: suspend processing.
    fn pause(&mut self) -> Result<()>;
    /// Lifecycle: resume processing.
    fn resume(&mut self) -> Result<()>;
    /// Lifecycle: stop processing.
    fn stop(&mut self) -> Result<()>;
    /// Lifecycle: return to the initial state.
    fn reset(&mut self) -> Result<()>;

    /// Sync-info provider with its priority, if this filter owns one.
    fn sync_provider(&self) -> Option<(Arc<dyn SyncInfoProvider>, u32)> {
        None
    }
}

/// Wrapper adapting a [`Source`] to [`Filter`].
pub struct SourceAdapter<S: Source> {
    inner: S,
}

impl<S: Source> SourceAdapter<S> {
    /// Wrap a source.
    pub fn new(source: S) -> Self {
        Self { inner: source }
    }
}

impl<S: Source + 'static> Filter for SourceAdapter<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> FilterKind {
        FilterKind::Source
    }

    fn process(&mut self, _input: Option<Buffer>) -> Result<Option<Buffer>> {
        self.inner.pull()
    }

    fn set_source(&mut self, uri: &str) -> Result<()> {
        self.inner.set_source(uri)
    }

    fn seek(&mut self, pos_us: i64) -> Result<()> {
        self.inner.seek(pos_us)
    }

    fn prepare(&mut self) -> Result<()> {
        self.inner.prepare()
    }

    fn start(&mut self) -> Result<()> {
        self.inner.start()
    }

    fn pause(&mut self) -> Result<()> {
        self.inner.pause()
    }

    fn resume(&mut self) -> Result<()> {
        self.inner.resume()
    }

    fn stop(&mut self) -> Result<()> {
        self.inner.stop()
    }

    fn reset(&mut self) -> Result<()> {
        self.inner.reset()
    }
}

/// Wrapper adapting a [`Sink`] to [`Filter`].
pub struct SinkAdapter<S: Sink> {
    inner: S,
}

impl<S: Sink> SinkAdapter<S> {
    /// Wrap a sink.
    pub fn new(sink: S) -> Self {
        Self { inner: sink }
    }
}

impl<S: Sink + 'static> Filter for SinkAdapter<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> FilterKind {
        FilterKind::Sink
    }

    fn process(&mut self, input: Option<Buffer>) -> Result<Option<Buffer>> {
        if let Some(buffer) = input {
            self.inner.render(buffer)?;
        }
        Ok(None)
    }

    fn set_source(&mut self, _uri: &str) -> Result<()> {
        Err(Error::invalid_op("sink has no source to bind"))
    }

    fn seek(&mut self, _pos_us: i64) -> Result<()> {
        Ok(())
    }

    fn prepare(&mut self) -> Result<()> {
        self.inner.prepare()
    }

    fn start(&mut self) -> Result<()> {
        self.inner.start()
    }

    fn pause(&mut self) -> Result<()> {
        self.inner.pause()
    }

    fn resume(&mut self) -> Result<()> {
        self.inner.resume()
    }

    fn stop(&mut self) -> Result<()> {
        self.inner.stop()
    }

    fn reset(&mut self) -> Result<()> {
        self.inner.reset()
    }

    fn sync_provider(&self) -> Option<(Arc<dyn SyncInfoProvider>, u32)> {
        self.inner.sync_provider()
    }
}

/// Wrapper adapting a [`Transform`] to [`Filter`].
pub struct TransformAdapter<T: Transform> {
    inner: T,
}

impl<T: Transform> TransformAdapter<T> {
    /// Wrap a transform.
    pub fn new(transform: T) -> Self {
        Self { inner: transform }
    }
}

impl<T: Transform + 'static> Filter for TransformAdapter<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> FilterKind {
        FilterKind::Transform
    }

    fn process(&mut self, input: Option<Buffer>) -> Result<Option<Buffer>> {
        match input {
            Some(buffer) => self.inner.transform(buffer),
            None => Ok(None),
        }
    }

    fn set_source(&mut self, _uri: &str) -> Result<()> {
        Err(Error::invalid_op("transform has no source to bind"))
    }

    fn seek(&mut self, _pos_us: i64) -> Result<()> {
        Ok(())
    }

    fn prepare(&mut self) -> Result<()> {
        self.inner.prepare()
    }

    fn start(&mut self) -> Result<()> {
        self.inner.start()
    }

    fn pause(&mut self) -> Result<()> {
        self.inner.pause()
    }

    fn resume(&mut self) -> Result<()> {
        self.inner.resume()
    }

    fn stop(&mut self) -> Result<()> {
        self.inner.stop()
    }

    fn reset(&mut self) -> Result<()> {
        self.inner.reset()
    }
}
