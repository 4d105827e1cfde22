use std::collections::HashMap;
use std::sync::Mutex;

use super::{KeyValueStore, StorageError};

/// Process-local store; everything is lost on exit.
#[derive(Default)]
pub struct MemoryStore {
  values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StorageError> {
    self.values.lock().map_err(|_| StorageError::Poisoned)
  }
}

impl KeyValueStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    Ok(self.lock()?.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
    self.lock()?.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), StorageError> {
    self.lock()?.remove(key);
    Ok(())
  }

  fn clear(&self) -> Result<(), StorageError> {
    self.lock()?.clear();
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::storage::KeyValueStoreExt;

  #[test]
  fn test_set_get_remove_clear() {
    let store = MemoryStore::new();
    assert_eq!(store.get("theme").unwrap(), None);

    store.set("theme", "dark").unwrap();
    store.set("lang", "es").unwrap();
    assert_eq!(store.get("theme").unwrap().as_deref(), Some("dark"));

    store.remove("theme").unwrap();
    assert_eq!(store.get("theme").unwrap(), None);

    store.clear().unwrap();
    assert_eq!(store.get("lang").unwrap(), None);
  }

  #[test]
  fn test_json_helpers() {
    let store = MemoryStore::new();
    store.set_json("sizes", &vec![10, 25, 50]).unwrap();
    let sizes: Option<Vec<u32>> = store.get_json("sizes").unwrap();
    assert_eq!(sizes, Some(vec![10, 25, 50]));

    store.set("broken", "{not json").unwrap();
    assert!(store.get_json::<Vec<u32>>("broken").is_err());
  }
}
