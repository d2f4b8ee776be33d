use crate::StorageError;
use mailminder_core::{StoredUser, USER_STORAGE_KEY};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Small persistent key-value store shared by every panel instance.
///
/// Values are JSON; the whole map is rewritten on each change.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: Option<PathBuf>,
    entries: Arc<Mutex<Map<String, Value>>>,
}

impl LocalStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                Map::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            Map::new()
        };

        Ok(Self {
            path: Some(path),
            entries: Arc::new(Mutex::new(entries)),
        })
    }

    /// Store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Arc::new(Mutex::new(Map::new())),
        }
    }

    pub fn get<T>(&self, key: &str) -> Result<Option<T>, StorageError>
    where
        T: DeserializeOwned,
    {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(Into::into)
    }

    pub fn set<T>(&self, key: &str, value: &T) -> Result<(), StorageError>
    where
        T: Serialize,
    {
        let value = serde_json::to_value(value)?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value);
        self.flush(&entries)
    }

    pub fn remove(&self, key: &str) -> Result<bool, StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let removed = entries.remove(key).is_some();
        if removed {
            self.flush(&entries)?;
        }
        Ok(removed)
    }

    pub fn user(&self) -> Result<Option<StoredUser>, StorageError> {
        self.get(USER_STORAGE_KEY)
    }

    pub fn save_user(&self, user: &StoredUser) -> Result<(), StorageError> {
        self.set(USER_STORAGE_KEY, user)?;
        tracing::debug!(user_id = %user.id, "persisted signed-in user");
        Ok(())
    }

    pub fn clear_user(&self) -> Result<bool, StorageError> {
        self.remove(USER_STORAGE_KEY)
    }

    fn flush(&self, entries: &Map<String, Value>) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
