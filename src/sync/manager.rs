//! Provider registry and arbitration.
//!
//! [`SyncInfoManager`] is an explicitly constructed, explicitly shared
//! registry (dependency-injected into the executor, never a process-wide
//! singleton). It arbitrates among registered providers by priority and
//! exposes the winner through a stable [`SyncProxy`], so provider churn
//! (e.g. an audio sink restart during a format change) is invisible to
//! callers holding the proxy.

use super::provider::SyncInfoProvider;
use crate::error::{Error, Result};
use std::sync::{Arc, Mutex, RwLock};

/// Handle identifying a registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProviderId(u64);

struct Entry {
    id: ProviderId,
    priority: u32,
    /// Monotonic registration sequence; lower wins priority ties.
    seq: u64,
    provider: Arc<dyn SyncInfoProvider>,
}

#[derive(Default)]
struct Registry {
    entries: Vec<Entry>,
    next_id: u64,
}

/// Indirection cell the proxy reads through. Swapped atomically under the
/// write lock on every arbitration change; readers never observe a
/// half-updated reference.
type CurrentCell = Arc<RwLock<Option<Arc<dyn SyncInfoProvider>>>>;

/// Registry of sync-info providers with priority arbitration.
///
/// Exactly one provider is authoritative at a time: the registered
/// provider with the highest priority, ties broken by registration order
/// (first registered wins).
pub struct SyncInfoManager {
    registry: Mutex<Registry>,
    current: CurrentCell,
}

impl SyncInfoManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            current: Arc::new(RwLock::new(None)),
        }
    }

    /// Register a provider with the given arbitration priority.
    ///
    /// If it outranks the current authority it becomes authoritative
    /// immediately; proxies observe the change on their next call.
    pub fn register(&self, provider: Arc<dyn SyncInfoProvider>, priority: u32) -> ProviderId {
        let mut reg = self.registry.lock().unwrap();
        let id = ProviderId(reg.next_id);
        let seq = reg.next_id;
        reg.next_id += 1;
        tracing::debug!(
            provider = provider.name(),
            priority,
            "registering sync provider"
        );
        reg.entries.push(Entry {
            id,
            priority,
            seq,
            provider,
        });
        self.rearbitrate(&reg);
        id
    }

    /// Unregister a provider.
    ///
    /// If the authoritative provider is removed, the next-highest is
    /// promoted; if none remain, proxy calls fail until a new registration.
    pub fn unregister(&self, id: ProviderId) -> Result<()> {
        let mut reg = self.registry.lock().unwrap();
        let before = reg.entries.len();
        reg.entries.retain(|e| e.id != id);
        if reg.entries.len() == before {
            return Err(Error::InvalidParameter(format!(
                "unknown sync provider id {:?}",
                id
            )));
        }
        self.rearbitrate(&reg);
        Ok(())
    }

    /// Get a stable proxy to the authoritative provider.
    ///
    /// The proxy remains valid across provider changes; it always forwards
    /// to the current authority.
    pub fn proxy(&self) -> SyncProxy {
        SyncProxy {
            current: Arc::clone(&self.current),
        }
    }

    /// Check whether any provider is registered.
    pub fn has_provider(&self) -> bool {
        !self.registry.lock().unwrap().entries.is_empty()
    }

    /// Name of the authoritative provider, if any.
    pub fn current_name(&self) -> Option<String> {
        self.current
            .read()
            .unwrap()
            .as_ref()
            .map(|p| p.name().to_string())
    }

    /// Recompute the authoritative provider and swap the cell.
    fn rearbitrate(&self, reg: &Registry) {
        // Highest priority wins; equal priority resolves to the earliest
        // registration so arbitration is reproducible.
        let winner = reg
            .entries
            .iter()
            .max_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then(b.seq.cmp(&a.seq))
            })
            .map(|e| Arc::clone(&e.provider));
        if let Some(ref p) = winner {
            tracing::debug!(provider = p.name(), "sync authority changed");
        } else {
            tracing::debug!("no sync authority remaining");
        }
        *self.current.write().unwrap() = winner;
    }
}

impl Default for SyncInfoManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable handle forwarding timing queries to the authoritative provider.
///
/// Cheap to clone. Every call fails with [`Error::InvalidOperation`] when
/// no provider is registered: "no timing authority available" is an
/// explicit condition, never reported as position zero.
#[derive(Clone)]
pub struct SyncProxy {
    current: CurrentCell,
}

impl SyncProxy {
    fn with_provider<T>(
        &self,
        f: impl FnOnce(&Arc<dyn SyncInfoProvider>) -> Result<T>,
    ) -> Result<T> {
        let guard = self.current.read().unwrap();
        match guard.as_ref() {
            Some(p) => f(p),
            None => Err(Error::invalid_op("no sync provider registered")),
        }
    }

    /// Check whether a buffer with the given PTS may be consumed now.
    pub fn check_pts(&self, pts_us: i64) -> Result<bool> {
        self.with_provider(|p| p.check_pts(pts_us))
    }

    /// Current playback position in stream-clock microseconds.
    pub fn current_position(&self) -> Result<i64> {
        self.with_provider(|p| p.current_position())
    }

    /// Current wall-clock time in microseconds.
    pub fn current_time_us(&self) -> Result<i64> {
        self.with_provider(|p| p.current_time_us())
    }

    /// Check whether a timing authority is currently available.
    pub fn is_available(&self) -> bool {
        self.current.read().unwrap().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct FixedProvider {
        name: &'static str,
        position: AtomicI64,
    }

    impl FixedProvider {
        fn new(name: &'static str, position: i64) -> Arc<Self> {
            Arc::new(Self {
                name,
                position: AtomicI64::new(position),
            })
        }
    }

    impl SyncInfoProvider for FixedProvider {
        fn check_pts(&self, pts_us: i64) -> Result<bool> {
            Ok(pts_us <= self.position.load(Ordering::Relaxed))
        }

        fn current_position(&self) -> Result<i64> {
            Ok(self.position.load(Ordering::Relaxed))
        }

        fn current_time_us(&self) -> Result<i64> {
            Ok(0)
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    #[test]
    fn test_priority_arbitration() {
        let mgr = SyncInfoManager::new();
        let proxy = mgr.proxy();

        let p1 = FixedProvider::new("p1", 100);
        let p2 = FixedProvider::new("p2", 200);

        let _id1 = mgr.register(p1, 10);
        assert_eq!(proxy.current_position().unwrap(), 100);

        let id2 = mgr.register(p2, 20);
        assert_eq!(proxy.current_position().unwrap(), 200);
        assert_eq!(mgr.current_name().as_deref(), Some("p2"));

        // Unregistering the authority reverts to the lower-priority one.
        mgr.unregister(id2).unwrap();
        assert_eq!(proxy.current_position().unwrap(), 100);
    }

    #[test]
    fn test_tie_break_first_registered_wins() {
        let mgr = SyncInfoManager::new();
        mgr.register(FixedProvider::new("first", 1), 50);
        mgr.register(FixedProvider::new("second", 2), 50);
        assert_eq!(mgr.current_name().as_deref(), Some("first"));
    }

    #[test]
    fn test_no_provider_is_explicit_failure() {
        let mgr = SyncInfoManager::new();
        let proxy = mgr.proxy();

        assert!(!proxy.is_available());
        assert!(matches!(
            proxy.current_position(),
            Err(Error::InvalidOperation(_))
        ));
        assert!(matches!(proxy.check_pts(0), Err(Error::InvalidOperation(_))));
        assert!(matches!(
            proxy.current_time_us(),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_unregister_all_fails_proxy() {
        let mgr = SyncInfoManager::new();
        let proxy = mgr.proxy();

        let id = mgr.register(FixedProvider::new("only", 7), 10);
        assert_eq!(proxy.current_position().unwrap(), 7);

        mgr.unregister(id).unwrap();
        assert!(matches!(
            proxy.current_position(),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_unregister_unknown_id() {
        let mgr = SyncInfoManager::new();
        let id = mgr.register(FixedProvider::new("p", 0), 1);
        mgr.unregister(id).unwrap();
        assert!(mgr.unregister(id).is_err());
    }

    #[test]
    fn test_proxy_is_stable_across_churn() {
        let mgr = SyncInfoManager::new();
        let proxy = mgr.proxy();

        let id = mgr.register(FixedProvider::new("a", 1), 10);
        assert_eq!(proxy.current_position().unwrap(), 1);

        // Swap providers behind the same proxy handle.
        mgr.unregister(id).unwrap();
        mgr.register(FixedProvider::new("b", 2), 10);
        assert_eq!(proxy.current_position().unwrap(), 2);
    }
}
