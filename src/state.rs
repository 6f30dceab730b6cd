//! Persisted record of which servers the manager believes are running.
//!
//! The running-set reflects the last known intent, not live OS truth: it is
//! updated when the manager starts or stops a server and reconciled against
//! the process table when the manager boots. Every mutation is written through
//! to disk immediately, so at most the mutation in flight is lost on a crash.

use crate::error::{Error, Result};
use crate::server::same_name;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// File-backed set of running server names.
///
/// The file is a JSON array of names. All reads and writes go through one
/// lock, and the file is rewritten (atomically, via a temporary sibling file)
/// while that lock is held.
#[derive(Debug)]
pub struct RunningSetStore {
    path: PathBuf,
    names: Mutex<BTreeSet<String>>,
}

impl RunningSetStore {
    /// Opens the store at `path`, loading any names already persisted there.
    ///
    /// A missing file is an empty set.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let names = load_names(&path)?;
        tracing::info!(path = %path.display(), count = names.len(), "Running-set loaded");
        Ok(Self {
            path,
            names: Mutex::new(names),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeSet<String>>> {
        self.names
            .lock()
            .map_err(|_| Error::Other("Failed to lock running-set".to_string()))
    }

    /// Records that `name` was started and flushes the set.
    pub fn mark_started(&self, name: &str) -> Result<()> {
        let mut names = self.lock()?;
        tracing::info!(server = %name, "Marking server as started");
        names.retain(|n| !same_name(n, name));
        names.insert(name.to_string());
        write_names(&self.path, &names)
    }

    /// Records that `name` was stopped and flushes the set.
    pub fn mark_stopped(&self, name: &str) -> Result<()> {
        let mut names = self.lock()?;
        tracing::info!(server = %name, "Marking server as stopped");
        names.retain(|n| !same_name(n, name));
        write_names(&self.path, &names)
    }

    /// Whether `name` is in the set.
    pub fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.lock()?.iter().any(|n| same_name(n, name)))
    }

    /// A copy of the current set.
    pub fn snapshot(&self) -> Result<BTreeSet<String>> {
        Ok(self.lock()?.clone())
    }

    /// Writes the current set to disk.
    pub fn persist(&self) -> Result<()> {
        let names = self.lock()?;
        write_names(&self.path, &names)
    }

    /// Consumes the set loaded at boot.
    ///
    /// Returns the names and leaves an empty set behind, rewritten to disk, so
    /// the same boot set is never replayed twice.
    pub fn take_persisted(&self) -> Result<BTreeSet<String>> {
        let mut names = self.lock()?;
        let taken = std::mem::take(&mut *names);
        write_names(&self.path, &names)?;
        tracing::info!(count = taken.len(), "Consumed persisted running-set");
        Ok(taken)
    }
}

fn load_names(path: &Path) -> Result<BTreeSet<String>> {
    if !path.exists() {
        return Ok(BTreeSet::new());
    }
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Persistence(format!("Failed to read '{}': {}", path.display(), e))
    })?;
    if content.trim().is_empty() {
        return Ok(BTreeSet::new());
    }
    let names: Vec<String> = serde_json::from_str(&content).map_err(|e| {
        Error::Persistence(format!("Failed to parse '{}': {}", path.display(), e))
    })?;
    Ok(names.into_iter().collect())
}

fn write_names(path: &Path, names: &BTreeSet<String>) -> Result<()> {
    let json = serde_json::to_string(&names.iter().collect::<Vec<_>>())
        .map_err(|e| Error::Persistence(format!("Failed to serialize running-set: {}", e)))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::Persistence(format!("Failed to create '{}': {}", parent.display(), e))
        })?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, json)
        .and_then(|_| std::fs::rename(&tmp, path))
        .map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Failed to save running-set");
            Error::Persistence(format!("Failed to write '{}': {}", path.display(), e))
        })?;

    tracing::debug!(path = %path.display(), names = ?names, "Running-set saved");
    Ok(())
}
