//! Session collaborator for the request executor.

use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

use crate::storage::{KeyValueStore, KeyValueStoreExt, StorageError};

const TOKEN_KEY: &str = "auth.token";

/// What the executor needs from the hosting session.
pub trait SessionProvider: Send + Sync {
  /// Bearer token for authenticated requests, if signed in.
  fn token(&self) -> Option<String>;

  /// Called once when the server rejects our credentials (401). The session
  /// is expected to terminate itself.
  fn on_unauthorized(&self);
}

/// Token-holding session, optionally persisted in a key/value store.
pub struct Session {
  token: RwLock<Option<String>>,
  store: Option<Arc<dyn KeyValueStore>>,
}

impl Session {
  /// A session that never sends credentials.
  pub fn anonymous() -> Self {
    Self {
      token: RwLock::new(None),
      store: None,
    }
  }

  /// In-memory session with a fixed starting token.
  pub fn with_token(token: impl Into<String>) -> Self {
    Self {
      token: RwLock::new(Some(token.into())),
      store: None,
    }
  }

  /// Restore the token saved by a previous [`Session::login`].
  pub fn persistent(store: Arc<dyn KeyValueStore>) -> Result<Self, StorageError> {
    let token: Option<String> = store.get_json(TOKEN_KEY)?;
    Ok(Self {
      token: RwLock::new(token),
      store: Some(store),
    })
  }

  /// Session using `token` for this run only. The token is never saved, but a
  /// rejection still clears the one saved in `store`.
  pub fn with_override(token: impl Into<String>, store: Arc<dyn KeyValueStore>) -> Self {
    Self {
      token: RwLock::new(Some(token.into())),
      store: Some(store),
    }
  }

  pub fn login(&self, token: impl Into<String>) -> Result<(), StorageError> {
    let token = token.into();
    if let Some(store) = &self.store {
      store.set_json(TOKEN_KEY, &token)?;
    }
    *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
    info!("session started");
    Ok(())
  }

  pub fn logout(&self) -> Result<(), StorageError> {
    self
      .token
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .take();
    if let Some(store) = &self.store {
      store.remove(TOKEN_KEY)?;
    }
    info!("session ended");
    Ok(())
  }

  pub fn is_authenticated(&self) -> bool {
    self
      .token
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .is_some()
  }
}

impl SessionProvider for Session {
  fn token(&self) -> Option<String> {
    self
      .token
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  fn on_unauthorized(&self) {
    warn!("server rejected credentials, ending session");
    if let Err(e) = self.logout() {
      warn!(error = %e, "failed to clear stored token");
    }
  }
}
