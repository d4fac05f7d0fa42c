//! Cross-filter timestamp synchronization.
//!
//! Independently-clocked filters stay coherent by agreeing on a single
//! timing authority:
//!
//! - [`SyncInfoProvider`]: implemented by the filter that owns the
//!   reference clock (commonly the audio sink).
//! - [`SyncInfoManager`]: registry arbitrating among providers by
//!   priority.
//! - [`SyncProxy`]: stable handle callers keep across provider churn.

mod manager;
mod provider;

pub use manager::{ProviderId, SyncInfoManager, SyncProxy};
pub use provider::SyncInfoProvider;
