//! Key/value persistence used for the session token and user settings.
//!
//! The data-access core treats this as an opaque collaborator behind
//! `get`/`set`/`remove`/`clear`.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use serde::{de::DeserializeOwned, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),
  #[error("invalid stored value: {0}")]
  Serde(#[from] serde_json::Error),
  #[error("store lock poisoned")]
  Poisoned,
}

pub trait KeyValueStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
  fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
  fn remove(&self, key: &str) -> Result<(), StorageError>;
  fn clear(&self) -> Result<(), StorageError>;
}

/// Typed helpers; values are stored as JSON text.
pub trait KeyValueStoreExt: KeyValueStore {
  fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
    match self.get(key)? {
      Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
      None => Ok(None),
    }
  }

  fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value)?;
    self.set(key, &raw)
  }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}
