//! Task concurrency coordinator.
//!
//! Admits at most one in-flight task per target key. Tasks for the same
//! key are serialized by rejection, not queuing: a duplicate submission
//! is refused synchronously and the caller retries later. The registry
//! holds keys, not data; release runs on every exit path through the
//! admission guard's `Drop`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, warn};

use crate::models::TargetKey;

/// Admission-time rejection, surfaced synchronously to the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdmitError {
    #[error("extraction already active for target {0}")]
    AlreadyActive(TargetKey),
}

/// Registry of active target keys.
#[derive(Debug, Clone, Default)]
pub struct TaskCoordinator {
    active: Arc<Mutex<HashSet<TargetKey>>>,
}

impl TaskCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve exclusive rights to operate on `key`.
    ///
    /// Atomic with respect to concurrent `admit`/`release` calls: of two
    /// racing admissions for the same key exactly one succeeds. The
    /// returned guard releases the key when dropped, whatever the exit
    /// path.
    pub fn admit(&self, key: &TargetKey) -> Result<AdmissionGuard, AdmitError> {
        let mut active = self.active.lock().expect("registry lock poisoned");
        if !active.insert(key.clone()) {
            warn!("rejecting duplicate extraction for target {key}");
            return Err(AdmitError::AlreadyActive(key.clone()));
        }
        debug!("admitted target {key} ({} active)", active.len());
        Ok(AdmissionGuard {
            key: key.clone(),
            active: Arc::clone(&self.active),
            released: false,
        })
    }

    /// Remove `key` from the registry. Idempotent; a key that is not
    /// present is ignored.
    pub fn release(&self, key: &TargetKey) {
        let mut active = self.active.lock().expect("registry lock poisoned");
        if active.remove(key) {
            debug!("released target {key} ({} active)", active.len());
        }
    }

    pub fn is_active(&self, key: &TargetKey) -> bool {
        self.active
            .lock()
            .expect("registry lock poisoned")
            .contains(key)
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().expect("registry lock poisoned").len()
    }
}

/// Scoped reservation of one target key. Dropping the guard releases the
/// key; `release` may also be called explicitly and is idempotent.
#[derive(Debug)]
pub struct AdmissionGuard {
    key: TargetKey,
    active: Arc<Mutex<HashSet<TargetKey>>>,
    released: bool,
}

impl AdmissionGuard {
    pub fn key(&self) -> &TargetKey {
        &self.key
    }

    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Ok(mut active) = self.active.lock() {
            active.remove(&self.key);
            debug!("released target {} ({} active)", self.key, active.len());
        }
    }
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        self.release();
    }
}
