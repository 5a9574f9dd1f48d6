//! Process-wide listener registration state.
//!
//! Listener attachment happens lazily, triggered by whichever request gets
//! there first, and must never happen twice for the same underlying
//! connection. The registry tracks attached connection identities for the
//! lifetime of the process; registration is an idempotent check-and-set, so
//! a race between two first-touch requests resolves to a single winner.

use std::collections::HashSet;

use parking_lot::Mutex;

/// Registry of data-source connections that already carry a listener.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    attached: Mutex<HashSet<String>>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `key` as registered.
    ///
    /// Returns `true` exactly once per key: the caller that wins the
    /// insertion performs the actual attach, every later caller skips it.
    pub fn register_once(&self, key: &str) -> bool {
        self.attached.lock().insert(key.to_string())
    }

    /// Whether `key` has been registered.
    pub fn is_registered(&self, key: &str) -> bool {
        self.attached.lock().contains(key)
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.attached.lock().len()
    }

    /// Whether nothing has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.attached.lock().is_empty()
    }
}

/// Registry key for a database source.
pub fn database_key(source: &str) -> String {
    format!("db/{}", source)
}

/// Registry key for one connection of a cache source.
pub fn cache_key(source: &str, connection: &str) -> String {
    format!("cache/{}/{}", source, connection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_register_once_is_idempotent() {
        let registry = ListenerRegistry::new();
        assert!(registry.register_once("db/default"));
        assert!(!registry.register_once("db/default"));
        assert!(registry.is_registered("db/default"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_distinct_keys_register_independently() {
        let registry = ListenerRegistry::new();
        assert!(registry.register_once(&database_key("default")));
        assert!(registry.register_once(&cache_key("redis", "default")));
        assert!(registry.register_once(&cache_key("redis", "sessions")));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_concurrent_first_touch_has_single_winner() {
        let registry = Arc::new(ListenerRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                registry.register_once("cache/redis/default")
            }));
        }
        let wins: usize = handles
            .into_iter()
            .map(|handle| handle.join().unwrap() as usize)
            .sum();
        assert_eq!(wins, 1);
        assert_eq!(registry.len(), 1);
    }
}
