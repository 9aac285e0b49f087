//! Durable session storage.
//!
//! The conversation only ever talks to [`KeyValueStore`]; the task, the turn
//! history and the architecture each live under their own key so a corrupt
//! slice never takes the others down with it.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;
use crate::{write_atomic, Architecture, TaskDescriptor, Turn};

pub const TASK_KEY: &str = "archie.task";
pub const TURNS_KEY: &str = "archie.turns";
pub const ARCHITECTURE_KEY: &str = "archie.architecture";

/// Minimal string key-value contract (think `localStorage`).
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
    /// Drop every key in one step.
    fn clear(&self) -> Result<(), StoreError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }

    fn clear(&self) -> Result<(), StoreError> {
        (**self).clear()
    }
}

// --- In-memory ---

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.entries().clear();
        Ok(())
    }
}

// --- Files ---

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        write_atomic(&path, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    /// The directory is renamed away before it is deleted, so a reader sees
    /// either the full session or nothing.
    fn clear(&self) -> Result<(), StoreError> {
        if !self.dir.exists() {
            return Ok(());
        }
        let name = self
            .dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "session".to_string());
        let trash = self
            .dir
            .with_file_name(format!(".{name}.cleared-{}", std::process::id()));
        fs::rename(&self.dir, &trash).map_err(|e| StoreError::io(&self.dir, e))?;
        fs::remove_dir_all(&trash).map_err(|e| StoreError::io(&trash, e))
    }
}

// --- Session slots ---

/// Whatever could be recovered from storage. Each slot is independent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredSession {
    pub task: Option<TaskDescriptor>,
    pub turns: Option<Vec<Turn>>,
    pub architecture: Option<Architecture>,
}

impl StoredSession {
    pub fn is_empty(&self) -> bool {
        self.task.is_none() && self.turns.is_none() && self.architecture.is_none()
    }
}

/// Typed view over a [`KeyValueStore`] for the three session slots.
#[derive(Debug, Clone)]
pub struct SessionStore<S> {
    store: S,
}

impl<S: KeyValueStore> SessionStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    pub fn save_task(&self, task: &TaskDescriptor) -> Result<(), StoreError> {
        self.put(TASK_KEY, task)
    }

    pub fn save_turns(&self, turns: &[Turn]) -> Result<(), StoreError> {
        self.put(TURNS_KEY, turns)
    }

    pub fn save_architecture(&self, architecture: &Architecture) -> Result<(), StoreError> {
        self.put(ARCHITECTURE_KEY, architecture)
    }

    pub fn save(
        &self,
        task: &TaskDescriptor,
        turns: &[Turn],
        architecture: &Architecture,
    ) -> Result<(), StoreError> {
        self.save_task(task)?;
        self.save_turns(turns)?;
        self.save_architecture(architecture)
    }

    /// Never fails: unreadable or malformed slots come back as `None`.
    pub fn load(&self) -> StoredSession {
        StoredSession {
            task: self.take(TASK_KEY),
            turns: self.take(TURNS_KEY),
            architecture: self.take(ARCHITECTURE_KEY),
        }
    }

    pub fn reset(&self) -> Result<(), StoreError> {
        self.store.clear()
    }

    fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string(value).map_err(|e| StoreError::Encode {
            key: key.to_string(),
            source: e,
        })?;
        self.store.set(key, &json)
    }

    fn take<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(key, error = %e, "could not read session slot");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding malformed session slot");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{tasks, Component};

    fn sample_architecture() -> Architecture {
        Architecture {
            components: vec![Component {
                id: "api".into(),
                name: "API".into(),
                tech: Some("Rust".into()),
                description: None,
            }],
            data_flows: vec![],
        }
    }

    #[test]
    fn empty_store_loads_nothing() {
        let sessions = SessionStore::new(MemoryStore::new());
        assert!(sessions.load().is_empty());
    }

    #[test]
    fn save_and_load_every_slot() {
        let sessions = SessionStore::new(MemoryStore::new());
        let task = tasks::blank();
        let turns = vec![Turn::user("hi"), Turn::assistant("hello")];
        let arch = sample_architecture();
        sessions.save(&task, &turns, &arch).unwrap();

        let loaded = sessions.load();
        assert_eq!(loaded.task, Some(task));
        assert_eq!(loaded.turns, Some(turns));
        assert_eq!(loaded.architecture, Some(arch));
    }

    #[test]
    fn corrupt_slot_does_not_poison_others() {
        let sessions = SessionStore::new(MemoryStore::new());
        sessions.save_turns(&[Turn::user("hi")]).unwrap();
        sessions.inner().set(ARCHITECTURE_KEY, "{\"components\": 12").unwrap();

        let loaded = sessions.load();
        assert_eq!(loaded.turns, Some(vec![Turn::user("hi")]));
        assert_eq!(loaded.architecture, None);
        assert_eq!(loaded.task, None);
    }

    #[test]
    fn reset_clears_all_slots() {
        let sessions = SessionStore::new(MemoryStore::new());
        sessions
            .save(&tasks::blank(), &[Turn::user("hi")], &sample_architecture())
            .unwrap();
        sessions.reset().unwrap();
        assert!(sessions.load().is_empty());
        assert!(sessions.inner().is_empty());
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("session"));
        assert_eq!(store.get(TURNS_KEY).unwrap(), None);

        store.set(TURNS_KEY, "[]").unwrap();
        assert_eq!(store.get(TURNS_KEY).unwrap().as_deref(), Some("[]"));

        store.remove(TURNS_KEY).unwrap();
        store.remove(TURNS_KEY).unwrap();
        assert_eq!(store.get(TURNS_KEY).unwrap(), None);
    }

    #[test]
    fn file_store_clear_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = SessionStore::new(FileStore::new(dir.path().join("session")));
        sessions
            .save(&tasks::blank(), &[Turn::user("hi")], &sample_architecture())
            .unwrap();
        assert!(!sessions.load().is_empty());

        sessions.reset().unwrap();
        assert!(!sessions.inner().dir().exists());
        assert!(sessions.load().is_empty());
        // clearing twice is fine
        sessions.reset().unwrap();
    }

    #[test]
    fn file_store_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        for key in ["", "../escape", ".hidden", "a/b"] {
            assert!(matches!(store.set(key, "x"), Err(StoreError::InvalidKey(_))));
        }
    }
}
