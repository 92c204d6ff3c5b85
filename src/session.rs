//! Per-target session persistence.
//!
//! One directory per target key (`profile_<key>/session.json`) so
//! concurrent tasks for distinct targets never touch each other's state.
//! Load failure degrades to an empty state; save failure is surfaced as a
//! warning and must never fail a task that otherwise succeeded.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::TargetKey;

/// One cookie captured from an authenticated browser session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default)]
    pub path: String,
}

/// Serializable authentication state for one target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub cookies: Vec<SessionCookie>,
    /// Opaque extra storage the strategy layer may carry along.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub extra: serde_json::Value,
}

impl SessionState {
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.extra.is_null()
    }
}

/// Disk-backed store for one target's session state.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
    key: TargetKey,
}

impl SessionStore {
    pub fn new(root: &Path, key: &TargetKey) -> Self {
        Self {
            dir: root.join(format!("profile_{key}")),
            key: key.clone(),
        }
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join("session.json")
    }

    /// Load saved state. Absence or corruption is non-fatal and yields an
    /// empty state.
    pub fn load(&self) -> SessionState {
        let path = self.state_path();
        match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(state) => {
                    debug!("loaded session state for {} from {:?}", self.key, path);
                    state
                }
                Err(e) => {
                    warn!("corrupt session state for {} ({e}), starting empty", self.key);
                    SessionState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SessionState::default(),
            Err(e) => {
                warn!("failed to read session state for {} ({e}), starting empty", self.key);
                SessionState::default()
            }
        }
    }

    /// Persist state. The caller decides how to surface a failure; it is
    /// never fatal to the task.
    pub fn save(&self, state: &SessionState) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating session dir {:?}", self.dir))?;
        let json = serde_json::to_string_pretty(state)?;
        fs::write(self.state_path(), json)
            .with_context(|| format!("writing session state for {}", self.key))?;
        info!(
            "saved session state for {} ({} cookies)",
            self.key,
            state.cookies.len()
        );
        Ok(())
    }
}

/// A task's exclusively-owned session for the duration of one run.
///
/// Tracks whether the state changed so unchanged state is not rewritten.
#[derive(Debug)]
pub struct SessionHandle {
    store: SessionStore,
    state: SessionState,
    dirty: bool,
}

impl SessionHandle {
    pub fn load(store: SessionStore) -> Self {
        let state = store.load();
        Self {
            store,
            state,
            dirty: false,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Mutable access marks the session dirty.
    pub fn state_mut(&mut self) -> &mut SessionState {
        self.dirty = true;
        &mut self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Save if anything changed since load. Failure is returned for the
    /// caller to log and surface as a warning event.
    pub fn save_if_dirty(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.store.save(&self.state)?;
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie(name: &str) -> SessionCookie {
        SessionCookie {
            name: name.to_string(),
            value: "v".to_string(),
            domain: ".example.com".to_string(),
            path: "/".to_string(),
        }
    }

    #[test]
    fn missing_state_loads_empty() {
        let root = tempfile::tempdir().unwrap();
        let store = SessionStore::new(root.path(), &TargetKey::new("k1"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn state_round_trips() {
        let root = tempfile::tempdir().unwrap();
        let key = TargetKey::new("k1");
        let store = SessionStore::new(root.path(), &key);
        let state = SessionState {
            cookies: vec![cookie("sid")],
            extra: serde_json::Value::Null,
        };
        store.save(&state).unwrap();
        assert_eq!(SessionStore::new(root.path(), &key).load(), state);
    }

    #[test]
    fn corrupt_state_degrades_to_empty() {
        let root = tempfile::tempdir().unwrap();
        let key = TargetKey::new("k1");
        let store = SessionStore::new(root.path(), &key);
        store.save(&SessionState::default()).unwrap();
        fs::write(root.path().join("profile_k1/session.json"), "{nope").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn keys_get_isolated_directories() {
        let root = tempfile::tempdir().unwrap();
        let a = SessionStore::new(root.path(), &TargetKey::new("a"));
        let b = SessionStore::new(root.path(), &TargetKey::new("b"));
        a.save(&SessionState {
            cookies: vec![cookie("a")],
            extra: serde_json::Value::Null,
        })
        .unwrap();
        assert!(b.load().is_empty());
    }

    #[test]
    fn handle_saves_only_when_dirty() {
        let root = tempfile::tempdir().unwrap();
        let key = TargetKey::new("k1");
        let mut handle = SessionHandle::load(SessionStore::new(root.path(), &key));
        handle.save_if_dirty().unwrap();
        // Nothing written for a clean handle.
        assert!(!root.path().join("profile_k1/session.json").exists());

        handle.state_mut().cookies.push(cookie("sid"));
        assert!(handle.is_dirty());
        handle.save_if_dirty().unwrap();
        assert!(!handle.is_dirty());
        assert_eq!(
            SessionStore::new(root.path(), &key).load().cookies.len(),
            1
        );
    }
}
