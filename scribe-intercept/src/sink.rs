//! Outbound log channels.
//!
//! The interceptor hands the finished composite line to a [`LogChannel`] at
//! `info` or `error` severity. Hosts register named channels in a
//! [`ChannelRegistry`] and select one through configuration; unknown names
//! resolve to the tracing-backed default.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

/// Severity of a dispatched log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Normal request.
    Info,
    /// Request with a reported failure or a detected transaction leak.
    Error,
}

impl Severity {
    /// Lowercase name of the severity.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Error => "error",
        }
    }
}

/// Sink for finished composite log lines.
pub trait LogChannel: Send + Sync {
    /// Write one finished log line.
    fn log(&self, severity: Severity, message: &str);
}

/// A channel that can be shared across threads.
pub type SharedChannel = Arc<dyn LogChannel>;

/// Default channel: emits through `tracing` under the `scribe::request`
/// target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingChannel;

impl TracingChannel {
    /// Create the tracing channel.
    pub fn new() -> Self {
        Self
    }
}

impl LogChannel for TracingChannel {
    fn log(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info => tracing::info!(target: "scribe::request", "{message}"),
            Severity::Error => tracing::error!(target: "scribe::request", "{message}"),
        }
    }
}

/// In-memory channel collecting dispatched lines, for tests and inspection.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    entries: Mutex<Vec<(Severity, String)>>,
}

impl MemoryChannel {
    /// Create an empty memory channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far.
    pub fn entries(&self) -> Vec<(Severity, String)> {
        self.entries.lock().clone()
    }

    /// The most recently logged entry.
    pub fn last(&self) -> Option<(Severity, String)> {
        self.entries.lock().last().cloned()
    }

    /// Number of logged entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing has been logged.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop all collected entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl LogChannel for MemoryChannel {
    fn log(&self, severity: Severity, message: &str) {
        self.entries.lock().push((severity, message.to_string()));
    }
}

/// Named channels the configuration can select between.
pub struct ChannelRegistry {
    channels: RwLock<HashMap<String, SharedChannel>>,
    fallback: SharedChannel,
}

impl ChannelRegistry {
    /// Create a registry whose fallback is the tracing channel.
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            fallback: Arc::new(TracingChannel::new()),
        }
    }

    /// Register a channel under a name, replacing any previous one.
    pub fn register(&self, name: impl Into<String>, channel: SharedChannel) {
        self.channels.write().insert(name.into(), channel);
    }

    /// Resolve a configured channel name, falling back to the default for
    /// unknown names.
    pub fn resolve(&self, name: &str) -> SharedChannel {
        self.channels
            .read()
            .get(name)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_channel_collects_entries() {
        let channel = MemoryChannel::new();
        channel.log(Severity::Info, "first");
        channel.log(Severity::Error, "second");

        assert_eq!(channel.len(), 2);
        assert_eq!(
            channel.last(),
            Some((Severity::Error, "second".to_string()))
        );
        channel.clear();
        assert!(channel.is_empty());
    }

    #[test]
    fn test_registry_resolves_registered_channel() {
        let registry = ChannelRegistry::new();
        let memory = Arc::new(MemoryChannel::new());
        registry.register("audit", memory.clone());

        registry.resolve("audit").log(Severity::Info, "hello");
        assert_eq!(memory.len(), 1);
    }

    #[test]
    fn test_registry_falls_back_for_unknown_name() {
        let registry = ChannelRegistry::new();
        // Resolves to the tracing fallback without panicking.
        registry.resolve("missing").log(Severity::Info, "ignored");
    }

    #[test]
    fn test_severity_names() {
        assert_eq!(Severity::Info.as_str(), "info");
        assert_eq!(Severity::Error.as_str(), "error");
    }
}
