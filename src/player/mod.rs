//! Player intent and state machine.
//!
//! [`Player`] is the top-level facade: callers express *intents* (play,
//! pause, seek) and the player maps them onto pipeline operations through a
//! closed transition table. The table is a single `match` over
//! `(state, intent)`, so every allowed transition is auditable in one
//! place; anything not listed is rejected with the player state unchanged.
//!
//! Asynchronous transitions (`SetSource` and `Prepare` both end in an
//! async prepare) leave the player in a pending state settled by a
//! completion notification. While a transition is pending,
//! further commands fail with [`Error::Busy`]; a pending transition that
//! outlives its deadline is failed through the same recovery path as any
//! other pipeline error.

use crate::error::{Error, Result};
use crate::pipeline::{EventReceiver, PlayExecutor};
use std::time::{Duration, Instant};

/// Observable state of the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlayerState {
    /// No prepared media; the only state reachable by recovery.
    #[default]
    Init,
    /// Prepare issued, completion pending.
    Preparing,
    /// Media prepared; playback can start (position 0 after completion).
    Ready,
    /// Playback suspended, position retained.
    Pause,
    /// Media playing.
    Playing,
}

/// A command or notification driving the player.
#[derive(Debug, Clone)]
pub enum Intent {
    /// Bind a media location and begin preparing it (async; settled by
    /// `NotifyReady`).
    SetSource(String),
    /// Prepare the pipeline without rebinding, for sources that need no
    /// location (async; settled by `NotifyReady`).
    Prepare,
    /// Start playback.
    Play,
    /// Suspend playback.
    Pause,
    /// Resume suspended playback.
    Resume,
    /// Tear playback down.
    Stop,
    /// Jump to a stream position in microseconds.
    Seek(i64),
    /// Pipeline finished preparing.
    NotifyReady,
    /// Pipeline consumed the whole stream.
    NotifyComplete,
    /// Pipeline failed asynchronously.
    NotifyError(String),
}

/// Outcome of an accepted intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// The transition completed synchronously.
    Complete,
    /// The transition is pending a completion notification.
    Pending,
}

/// Media player driving a [`PlayExecutor`] through intents.
///
/// # Example
///
/// ```rust,ignore
/// use maestro::player::{Intent, Player};
///
/// let mut player = Player::new(executor);
/// player.execute(Intent::SetSource("file:///media.raw".into())).await?;
/// player.execute(Intent::NotifyReady).await?;
/// player.execute(Intent::Play).await?;
/// ```
pub struct Player {
    exec: PlayExecutor,
    state: PlayerState,
    /// Deadline of the in-flight pending transition, if any.
    pending_deadline: Option<Instant>,
    pending_timeout: Duration,
}

impl Player {
    /// Default deadline for pending transitions.
    pub const DEFAULT_PENDING_TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a player around an executor.
    pub fn new(exec: PlayExecutor) -> Self {
        Self {
            exec,
            state: PlayerState::Init,
            pending_deadline: None,
            pending_timeout: Self::DEFAULT_PENDING_TIMEOUT,
        }
    }

    /// Override the pending-transition deadline.
    pub fn with_pending_timeout(mut self, timeout: Duration) -> Self {
        self.pending_timeout = timeout;
        self
    }

    /// Current player state.
    pub fn state(&self) -> PlayerState {
        self.state
    }

    /// Subscribe to the pipeline's events.
    pub fn events(&self) -> EventReceiver {
        self.exec.events()
    }

    /// Current playback position from the timing authority, microseconds.
    pub fn position(&self) -> Result<i64> {
        self.exec.position()
    }

    /// Access the underlying executor.
    pub fn executor_mut(&mut self) -> &mut PlayExecutor {
        &mut self.exec
    }

    /// Execute an intent against the transition table.
    ///
    /// Rejected intents leave the state untouched: an invalid combination
    /// fails with [`Error::InvalidOperation`], a command racing a pending
    /// transition with [`Error::Busy`].
    pub async fn execute(&mut self, intent: Intent) -> Result<Action> {
        if let Some(deadline) = self.pending_deadline {
            let settles = matches!(intent, Intent::NotifyReady | Intent::NotifyError(_));
            if !settles {
                if Instant::now() < deadline {
                    return Err(Error::Busy);
                }
                // The pending transition is dead; fail it through the
                // canonical recovery path, then evaluate the intent from
                // the recovered state.
                tracing::warn!(state = ?self.state, "pending transition expired");
                self.on_error("pending transition timed out").await;
            }
        }

        use PlayerState::*;
        match (self.state, intent) {
            (Init, Intent::SetSource(uri)) => {
                // Binding failure leaves the player in Init.
                self.exec.bind_source(&uri)?;
                self.begin_prepare().await
            }
            (Ready, Intent::SetSource(uri)) => {
                // Rebinding drops the prepared media and prepares the new
                // source.
                self.exec.reset().await?;
                self.exec.bind_source(&uri)?;
                self.begin_prepare().await
            }

            (Init, Intent::Prepare) => self.begin_prepare().await,
            (Preparing, Intent::NotifyReady) => {
                self.pending_deadline = None;
                self.state = Ready;
                tracing::debug!("player ready");
                Ok(Action::Complete)
            }

            (Ready, Intent::Play) => match self.exec.start() {
                Ok(()) => {
                    self.state = Playing;
                    Ok(Action::Complete)
                }
                Err(e) => {
                    self.on_error(&e.to_string()).await;
                    Err(e)
                }
            },
            (Playing, Intent::Pause) => match self.exec.pause() {
                Ok(()) => {
                    self.state = Pause;
                    Ok(Action::Complete)
                }
                Err(e) => {
                    self.on_error(&e.to_string()).await;
                    Err(e)
                }
            },
            (Pause, Intent::Resume) => match self.exec.resume() {
                Ok(()) => {
                    self.state = Playing;
                    Ok(Action::Complete)
                }
                Err(e) => {
                    self.on_error(&e.to_string()).await;
                    Err(e)
                }
            },

            (Ready | Pause, Intent::Seek(pos)) => {
                // Position jump; the state does not change.
                self.exec.seek(pos)?;
                Ok(Action::Complete)
            }

            (Init, Intent::Stop) => Ok(Action::Complete),
            (_, Intent::Stop) => {
                self.pending_deadline = None;
                let result = self.exec.stop().await;
                self.exec.reset().await?;
                self.state = Init;
                result?;
                Ok(Action::Complete)
            }

            (Playing, Intent::NotifyComplete) => match self.exec.finish().await {
                Ok(()) => {
                    self.state = Ready;
                    tracing::debug!("playback complete, ready to replay");
                    Ok(Action::Complete)
                }
                Err(e) => {
                    self.on_error(&e.to_string()).await;
                    Err(e)
                }
            },

            (_, Intent::NotifyError(message)) => {
                self.on_error(&message).await;
                Ok(Action::Complete)
            }

            (state, intent) => Err(Error::invalid_op(format!(
                "intent {intent:?} is not valid in state {state:?}"
            ))),
        }
    }

    /// Kick off the async prepare, entering `Preparing` with a deadline.
    async fn begin_prepare(&mut self) -> Result<Action> {
        match self.exec.prepare() {
            Ok(()) => {
                self.state = PlayerState::Preparing;
                self.pending_deadline = Some(Instant::now() + self.pending_timeout);
                Ok(Action::Pending)
            }
            Err(e) => {
                self.on_error(&e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Canonical recovery path, shared by every state.
    ///
    /// Tears the pipeline down and lands in `Init`; the error is reported
    /// once (by the caller or the pipeline event), never swallowed twice.
    async fn on_error(&mut self, message: &str) {
        tracing::error!(message, state = ?self.state, "player recovering");
        self.pending_deadline = None;
        if let Err(e) = self.exec.reset().await {
            tracing::warn!(error = %e, "pipeline reset during recovery failed");
        }
        self.state = PlayerState::Init;
    }
}
