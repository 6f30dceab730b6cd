use crate::config::ServerDescriptor;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Case-insensitive server name comparison used everywhere a name is a key.
pub fn same_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// The static roster of managed servers.
///
/// Built once from a validated configuration. Lookups are case-insensitive
/// exact matches; iteration follows configuration order.
#[derive(Debug, Clone)]
pub struct ServerRegistry {
    servers: Vec<Arc<ServerDescriptor>>,
    by_name: HashMap<String, usize>,
}

impl ServerRegistry {
    /// Builds a registry from the configured descriptors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] if a name is empty or appears twice.
    pub fn new(servers: Vec<ServerDescriptor>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(servers.len());
        for (index, server) in servers.iter().enumerate() {
            let key = name_key(&server.name);
            if key.is_empty() {
                return Err(Error::ConfigInvalid("A server is missing a name.".to_string()));
            }
            if by_name.insert(key, index).is_some() {
                return Err(Error::ConfigInvalid(format!(
                    "Duplicate server name found: '{}'",
                    server.name
                )));
            }
        }

        Ok(Self {
            servers: servers.into_iter().map(Arc::new).collect(),
            by_name,
        })
    }

    /// Finds a server by case-insensitive name.
    pub fn find(&self, name: &str) -> Option<Arc<ServerDescriptor>> {
        self.by_name
            .get(&name_key(name))
            .map(|&index| Arc::clone(&self.servers[index]))
    }

    /// Finds a server by name, failing with [`Error::ServerNotFound`].
    pub fn resolve(&self, name: &str) -> Result<Arc<ServerDescriptor>> {
        self.find(name)
            .ok_or_else(|| Error::ServerNotFound(name.trim().to_string()))
    }

    /// All servers in configuration order.
    pub fn servers(&self) -> &[Arc<ServerDescriptor>] {
        &self.servers
    }

    /// Number of servers in the roster.
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// Whether the roster is empty.
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

/// One mutual-exclusion lock per server.
///
/// Held for the whole of a stop, start, backup or update operation so that two
/// operations never interleave their process-control calls on the same server.
/// Status requests do not take these locks.
#[derive(Debug, Clone)]
pub struct ServerLocks {
    locks: Arc<HashMap<String, Arc<Mutex<()>>>>,
}

impl ServerLocks {
    /// Creates one lock for each server in the registry.
    pub fn for_registry(registry: &ServerRegistry) -> Self {
        let locks = registry
            .servers()
            .iter()
            .map(|s| (name_key(&s.name), Arc::new(Mutex::new(()))))
            .collect();
        Self {
            locks: Arc::new(locks),
        }
    }

    /// Waits for exclusive access to `name`.
    ///
    /// The guard releases the lock when dropped.
    pub async fn acquire(&self, name: &str) -> Result<OwnedMutexGuard<()>> {
        let lock = self
            .locks
            .get(&name_key(name))
            .ok_or_else(|| Error::ServerNotFound(name.to_string()))?;
        Ok(Arc::clone(lock).lock_owned().await)
    }

    /// Whether an operation currently holds the lock for `name`.
    pub fn is_busy(&self, name: &str) -> bool {
        self.locks
            .get(&name_key(name))
            .is_some_and(|lock| lock.try_lock().is_err())
    }
}
