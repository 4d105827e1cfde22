//! CRUD over one resource path, with a local mirror of what the server
//! returned.

use serde::Serialize;
use serde_json::Value;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use super::error::{ApiError, ErrorKind};
use super::executor::RequestExecutor;
use super::request::{QueryParams, RequestDescriptor};
use crate::models::Resource;

struct Mirror<T> {
  items: Vec<T>,
  selected: Option<T>,
}

impl<T> Default for Mirror<T> {
  fn default() -> Self {
    Self {
      items: Vec::new(),
      selected: None,
    }
  }
}

/// List/get/create/update/patch/remove/search over `path`.
///
/// The mirror is only written after the server confirms a change. Calls share
/// one executor, so a new call supersedes one still in flight and the
/// superseded call returns `Ok(None)` without touching the mirror.
pub struct CrudResource<T> {
  executor: RequestExecutor,
  path: String,
  mirror: Mutex<Mirror<T>>,
}

impl<T: Resource> CrudResource<T> {
  pub fn new(executor: RequestExecutor, path: impl Into<String>) -> Self {
    let path = path.into();
    Self {
      executor,
      path: format!("/{}", path.trim_matches('/')),
      mirror: Mutex::new(Mirror::default()),
    }
  }

  pub fn path(&self) -> &str {
    &self.path
  }

  pub fn executor(&self) -> &RequestExecutor {
    &self.executor
  }

  /// Snapshot of the mirrored collection.
  pub fn items(&self) -> Vec<T> {
    self.mirror().items.clone()
  }

  pub fn selected(&self) -> Option<T> {
    self.mirror().selected.clone()
  }

  pub fn select(&self, item: Option<T>) {
    self.mirror().selected = item;
  }

  pub fn find(&self, id: &str) -> Option<T> {
    self.mirror().items.iter().find(|item| item.id() == id).cloned()
  }

  /// Replace the mirror with the server's list.
  ///
  /// On failure the mirror is emptied and the error returned.
  pub async fn list(&self, params: &QueryParams) -> Result<Option<Vec<T>>, ApiError> {
    let descriptor = RequestDescriptor::get(self.path.as_str())
      .with_query(params)
      .quiet();

    let outcome = match self.executor.execute(&descriptor).await {
      Ok(Some(envelope)) => serde_json::from_value::<Vec<T>>(envelope.items())
        .map_err(|e| ApiError::decode(Some(envelope.status), e)),
      Ok(None) => return Ok(None),
      Err(e) => Err(e),
    };

    let mut mirror = self.mirror();
    match outcome {
      Ok(items) => {
        let items = dedup_by_id(items);
        debug!(path = %self.path, count = items.len(), "mirror replaced");
        mirror.items = items.clone();
        Ok(Some(items))
      }
      Err(e) => {
        mirror.items.clear();
        Err(e)
      }
    }
  }

  /// Fetch one item and make it the selection.
  pub async fn get_by_id(&self, id: &str) -> Result<Option<T>, ApiError> {
    let descriptor = RequestDescriptor::get(self.item_path(id)).quiet();
    let Some(envelope) = self.executor.execute(&descriptor).await? else {
      return Ok(None);
    };
    let item: T = envelope.decode()?;
    self.mirror().selected = Some(item.clone());
    Ok(Some(item))
  }

  pub async fn create<B: Serialize + ?Sized>(&self, item: &B) -> Result<Option<T>, ApiError> {
    let descriptor = RequestDescriptor::post(self.path.as_str(), to_body(item)?);
    let Some(envelope) = self.executor.execute(&descriptor).await? else {
      return Ok(None);
    };
    let created: T = envelope.decode()?;

    let mut mirror = self.mirror();
    match mirror.items.iter_mut().find(|i| i.id() == created.id()) {
      Some(existing) => *existing = created.clone(),
      None => mirror.items.push(created.clone()),
    }
    Ok(Some(created))
  }

  /// Full replacement of `id`.
  pub async fn update<B: Serialize + ?Sized>(&self, id: &str, item: &B) -> Result<Option<T>, ApiError> {
    let descriptor = RequestDescriptor::put(self.item_path(id), to_body(item)?);
    let Some(envelope) = self.executor.execute(&descriptor).await? else {
      return Ok(None);
    };
    let updated: T = envelope.decode()?;
    self.apply_update(id, updated.clone());
    Ok(Some(updated))
  }

  /// Partial update of `id`. The fields the server returns are merged over
  /// the mirrored item.
  pub async fn patch<B: Serialize + ?Sized>(&self, id: &str, partial: &B) -> Result<Option<T>, ApiError> {
    let descriptor = RequestDescriptor::patch(self.item_path(id), to_body(partial)?);
    let Some(envelope) = self.executor.execute(&descriptor).await? else {
      return Ok(None);
    };

    let base = self.find(id);
    let merged: T = match (base, envelope.data.clone()) {
      (Some(current), Value::Object(changes)) => {
        let mut fields = match serde_json::to_value(&current) {
          Ok(Value::Object(fields)) => fields,
          _ => serde_json::Map::new(),
        };
        fields.extend(changes);
        serde_json::from_value(Value::Object(fields))
          .map_err(|e| ApiError::decode(Some(envelope.status), e))?
      }
      _ => envelope.decode()?,
    };

    self.apply_update(id, merged.clone());
    Ok(Some(merged))
  }

  /// Delete `id` on the server, then from the mirror.
  pub async fn remove(&self, id: &str) -> Result<Option<String>, ApiError> {
    let descriptor = RequestDescriptor::delete(self.item_path(id));
    if self.executor.execute(&descriptor).await?.is_none() {
      return Ok(None);
    }

    let mut mirror = self.mirror();
    mirror.items.retain(|item| item.id() != id);
    if mirror.selected.as_ref().is_some_and(|s| s.id() == id) {
      mirror.selected = None;
    }
    Ok(Some(id.to_string()))
  }

  /// Server-side search. Results are returned, never mirrored.
  pub async fn search(&self, query: &str, params: &QueryParams) -> Result<Option<Vec<T>>, ApiError> {
    let descriptor = RequestDescriptor::get(format!("{}/search", self.path))
      .with_query(params)
      .query("q", query)
      .quiet();
    let Some(envelope) = self.executor.execute(&descriptor).await? else {
      return Ok(None);
    };
    serde_json::from_value(envelope.items())
      .map(Some)
      .map_err(|e| ApiError::decode(Some(envelope.status), e))
  }

  /// Replace `id` in place. The server may answer with a different id, in
  /// which case any other entry already holding that id is dropped.
  fn apply_update(&self, id: &str, updated: T) {
    let mut mirror = self.mirror();
    if let Some(pos) = mirror.items.iter().position(|i| i.id() == id) {
      mirror.items[pos] = updated.clone();
      let mut index = 0;
      mirror.items.retain(|item| {
        let keep = index == pos || item.id() != updated.id();
        index += 1;
        keep
      });
    }
    if mirror
      .selected
      .as_ref()
      .is_some_and(|s| s.id() == id || s.id() == updated.id())
    {
      mirror.selected = Some(updated);
    }
  }

  fn item_path(&self, id: &str) -> String {
    format!("{}/{}", self.path, id)
  }

  fn mirror(&self) -> MutexGuard<'_, Mirror<T>> {
    self.mirror.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

fn to_body<B: Serialize + ?Sized>(body: &B) -> Result<Value, ApiError> {
  serde_json::to_value(body).map_err(|e| {
    ApiError::new(ErrorKind::Unknown, "Request body could not be serialized").with_cause(e)
  })
}

/// Keep the last occurrence of each id, in first-seen order.
fn dedup_by_id<T: Resource>(items: Vec<T>) -> Vec<T> {
  let mut out: Vec<T> = Vec::with_capacity(items.len());
  for item in items {
    match out.iter_mut().find(|existing| existing.id() == item.id()) {
      Some(existing) => *existing = item,
      None => out.push(item),
    }
  }
  out
}
