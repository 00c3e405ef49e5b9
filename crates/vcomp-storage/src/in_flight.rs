//! Paths owned by a running job, which sweeps must leave alone.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared set of paths in use by the in-flight job.
///
/// Cloning shares the set. Paths are registered with [`InFlightPaths::track`]
/// and released when the returned guard drops.
#[derive(Debug, Clone, Default)]
pub struct InFlightPaths {
    paths: Arc<Mutex<HashSet<PathBuf>>>,
}

impl InFlightPaths {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `path` as in use until the guard drops.
    pub fn track(&self, path: impl Into<PathBuf>) -> InFlightGuard {
        let path = path.into();
        self.lock().insert(path.clone());
        InFlightGuard {
            paths: self.clone(),
            path,
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains(path)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        // The set stays consistent even if a holder panicked
        self.paths.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases one tracked path on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    paths: InFlightPaths,
    path: PathBuf,
}

impl InFlightGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.paths.lock().remove(&self.path);
    }
}
