//! In-memory cache client with command instrumentation.
//!
//! A small TTL-aware key/value store exposing the same observation surface a
//! networked cache client would: named connections created lazily on first
//! use, and per-connection command listeners fired after every executed
//! command. Because connections appear lazily, a connection first used
//! during a request is only discovered by the interceptor's end-of-request
//! rescan; its commands show up from the following request on.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::error::AttachError;
use crate::source::{
    CacheConnection, CacheSource, CommandArg, CommandEvent, SharedCommandListener,
};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    stored_at: Instant,
    ttl: Option<Duration>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        match self.ttl {
            Some(ttl) => self.stored_at.elapsed() >= ttl,
            None => false,
        }
    }
}

/// A named in-memory cache client with lazily created connections.
pub struct MemoryCache {
    name: String,
    connections: RwLock<HashMap<String, Arc<MemoryCacheConnection>>>,
}

impl MemoryCache {
    /// Create a cache client with the given source name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Get or lazily create the connection with the given name.
    pub fn connection(&self, name: &str) -> Arc<MemoryCacheConnection> {
        if let Some(connection) = self.connections.read().get(name) {
            return Arc::clone(connection);
        }
        let mut connections = self.connections.write();
        Arc::clone(
            connections
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(MemoryCacheConnection::new(name))),
        )
    }

    /// Number of connections created so far.
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }
}

impl CacheSource for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn connections(&self) -> Vec<Arc<dyn CacheConnection>> {
        self.connections
            .read()
            .values()
            .map(|connection| Arc::clone(connection) as Arc<dyn CacheConnection>)
            .collect()
    }
}

/// One named connection of a [`MemoryCache`].
pub struct MemoryCacheConnection {
    name: String,
    entries: Mutex<HashMap<String, Entry>>,
    listeners: RwLock<Vec<SharedCommandListener>>,
}

impl MemoryCacheConnection {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    fn emit(&self, command: &str, args: Vec<CommandArg>, started: Instant) {
        let listeners = self.listeners.read().clone();
        if listeners.is_empty() {
            return;
        }
        let event = CommandEvent {
            connection: self.name.clone(),
            command: command.to_string(),
            args,
            duration: started.elapsed(),
        };
        for listener in listeners {
            listener.command_executed(&event);
        }
    }

    /// Read a key. Expired entries read as missing.
    pub fn get(&self, key: &str) -> Option<String> {
        let started = Instant::now();
        let value = {
            let mut entries = self.entries.lock();
            match entries.get(key) {
                Some(entry) if entry.is_expired() => {
                    entries.remove(key);
                    None
                }
                Some(entry) => Some(entry.value.clone()),
                None => None,
            }
        };
        self.emit("GET", vec![CommandArg::from(key)], started);
        value
    }

    /// Store a key without expiry.
    pub fn set(&self, key: &str, value: &str) {
        let started = Instant::now();
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                stored_at: Instant::now(),
                ttl: None,
            },
        );
        self.emit(
            "SET",
            vec![CommandArg::from(key), CommandArg::from(value)],
            started,
        );
    }

    /// Store a key with a time-to-live.
    pub fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) {
        let started = Instant::now();
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                stored_at: Instant::now(),
                ttl: Some(ttl),
            },
        );
        self.emit(
            "SETEX",
            vec![
                CommandArg::from(key),
                CommandArg::from(ttl.as_secs().to_string()),
                CommandArg::from(value),
            ],
            started,
        );
    }

    /// Delete keys, returning how many existed.
    pub fn delete(&self, keys: &[&str]) -> usize {
        let started = Instant::now();
        let removed = {
            let mut entries = self.entries.lock();
            keys.iter()
                .filter(|key| entries.remove(**key).is_some())
                .count()
        };
        let args = vec![CommandArg::List(
            keys.iter().map(|key| key.to_string()).collect(),
        )];
        self.emit("DEL", args, started);
        removed
    }

    /// Whether a key exists and has not expired.
    pub fn exists(&self, key: &str) -> bool {
        let started = Instant::now();
        let found = {
            let entries = self.entries.lock();
            entries.get(key).is_some_and(|entry| !entry.is_expired())
        };
        self.emit("EXISTS", vec![CommandArg::from(key)], started);
        found
    }
}

impl CacheConnection for MemoryCacheConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn listen(&self, listener: SharedCommandListener) -> Result<(), AttachError> {
        self.listeners.write().push(listener);
        Ok(())
    }
}
