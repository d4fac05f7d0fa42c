//! Pipeline event broadcasting.
//!
//! Worker tasks and lifecycle operations emit [`PipelineEvent`]s while a
//! run is active; any number of subscribers observe them asynchronously.
//! The player folds completion and error events back into intents. A slow
//! subscriber skips ahead past missed events rather than stalling the
//! emitter.

use std::fmt;
use tokio::sync::broadcast;

use super::PipelineState;

/// Events emitted by the pipeline during execution.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Pipeline state has changed.
    StateChanged {
        /// Previous state.
        from: PipelineState,
        /// New state.
        to: PipelineState,
    },

    /// End of stream reached (every sink consumed its final buffer).
    Eos,

    /// An error occurred in the pipeline.
    Error {
        /// The error message.
        message: String,
        /// The filter where the error occurred (if known).
        filter: Option<String>,
    },

    /// A filter's worker task started processing.
    FilterStarted {
        /// The filter that started.
        filter: String,
    },

    /// A filter's worker task finished (EOS reached for that filter).
    FilterFinished {
        /// The filter that finished.
        filter: String,
        /// Number of buffers it processed.
        buffers_processed: u64,
    },

    /// Pipeline execution started.
    Started,

    /// Pipeline execution stopped.
    Stopped,

    /// A sink consumed a buffer; reports playback progress.
    PositionUpdate {
        /// Presentation timestamp of the consumed buffer, microseconds.
        pts_us: i64,
    },
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineEvent::StateChanged { from, to } => {
                write!(f, "StateChanged: {from:?} -> {to:?}")
            }
            PipelineEvent::Eos => write!(f, "EOS"),
            PipelineEvent::Error { message, filter } => match filter {
                Some(n) => write!(f, "Error in {n}: {message}"),
                None => write!(f, "Error: {message}"),
            },
            PipelineEvent::FilterStarted { filter } => write!(f, "Filter {filter} started"),
            PipelineEvent::FilterFinished {
                filter,
                buffers_processed,
            } => {
                write!(f, "Filter {filter} finished ({buffers_processed} buffers)")
            }
            PipelineEvent::Started => write!(f, "Pipeline started"),
            PipelineEvent::Stopped => write!(f, "Pipeline stopped"),
            PipelineEvent::PositionUpdate { pts_us } => write!(f, "Position: {pts_us} us"),
        }
    }
}

/// Emitter half of the pipeline event channel.
///
/// Cloned into every worker task. Emitting is fire-and-forget: with no
/// subscribers the event is dropped.
#[derive(Clone)]
pub struct EventSender {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventSender {
    /// Create an emitter buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event.
    pub fn send(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }

    /// Emit an end-of-stream event.
    pub fn send_eos(&self) {
        self.send(PipelineEvent::Eos);
    }

    /// Emit an error event.
    pub fn send_error(&self, message: impl Into<String>, filter: Option<String>) {
        self.send(PipelineEvent::Error {
            message: message.into(),
            filter,
        });
    }

    /// Emit a state-change event.
    pub fn send_state_changed(&self, from: PipelineState, to: PipelineState) {
        self.send(PipelineEvent::StateChanged { from, to });
    }

    /// Emit a filter-started event.
    pub fn send_filter_started(&self, filter: impl Into<String>) {
        self.send(PipelineEvent::FilterStarted {
            filter: filter.into(),
        });
    }

    /// Emit a filter-finished event.
    pub fn send_filter_finished(&self, filter: impl Into<String>, buffers_processed: u64) {
        self.send(PipelineEvent::FilterFinished {
            filter: filter.into(),
            buffers_processed,
        });
    }

    /// Open a subscription. Only events emitted after this call are
    /// delivered to it.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for EventSender {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Subscriber half of the pipeline event channel.
pub struct EventReceiver {
    rx: broadcast::Receiver<PipelineEvent>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// `None` once every emitter handle is gone and the backlog is
    /// drained.
    pub async fn recv(&mut self) -> Option<PipelineEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Fell behind the buffer; resume from the oldest
                    // retained event.
                    tracing::warn!(skipped, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive without waiting. `None` when no event is queued.
    pub fn try_recv(&mut self) -> Option<PipelineEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }

    /// Wait for the run to settle.
    ///
    /// `Ok(())` on EOS; `Err(description)` on a pipeline error, or if the
    /// channel closes before either arrives.
    pub async fn wait_eos(&mut self) -> Result<(), String> {
        while let Some(event) = self.recv().await {
            match event {
                PipelineEvent::Eos => return Ok(()),
                PipelineEvent::Error { message, filter } => {
                    return Err(match filter {
                        Some(n) => format!("Error in {n}: {message}"),
                        None => message,
                    })
                }
                _ => {}
            }
        }
        Err("event channel closed before EOS".to_string())
    }
}
