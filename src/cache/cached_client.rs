//! GET requests memoized through a [`CacheLayer`].

use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::key::RequestKey;
use super::layer::CacheLayer;
use super::traits::{CacheOptions, CacheResult, QueryKey};
use crate::api::{ApiContext, ApiError, ErrorKind, QueryParams, RequestDescriptor, ResponseEnvelope};

/// Read-through cache over an [`ApiContext`].
///
/// Every flight gets its own executor, so cached reads never supersede each
/// other or a caller's in-flight request.
#[derive(Clone)]
pub struct CachedClient {
  context: ApiContext,
  cache: CacheLayer<ResponseEnvelope>,
}

impl CachedClient {
  pub fn new(context: ApiContext, ttl: Duration) -> Self {
    Self {
      context,
      cache: CacheLayer::new(ttl),
    }
  }

  pub fn context(&self) -> &ApiContext {
    &self.context
  }

  /// GET `endpoint` with `params`, served from cache when possible.
  pub async fn get(
    &self,
    endpoint: &str,
    params: &QueryParams,
    options: CacheOptions,
  ) -> Result<CacheResult<ResponseEnvelope>, ApiError> {
    let key = RequestKey::new(endpoint, params.clone());
    let executor = self.context.executor();
    let descriptor = RequestDescriptor::get(endpoint).with_query(params).quiet();

    debug!(query = %key.description(), "cached get");
    self
      .cache
      .get(
        &key.cache_hash(),
        move || async move {
          executor
            .execute(&descriptor)
            .await?
            .ok_or_else(|| ApiError::new(ErrorKind::Unknown, "Request was cancelled"))
        },
        options,
      )
      .await
  }

  /// Cached collection fetch decoded into `T`.
  pub async fn fetch_list<T: DeserializeOwned>(
    &self,
    endpoint: &str,
    params: &QueryParams,
    options: CacheOptions,
  ) -> Result<CacheResult<Vec<T>>, ApiError> {
    let result = self.get(endpoint, params, options).await?;
    let items = serde_json::from_value(result.data.items())
      .map_err(|e| ApiError::decode(Some(result.data.status), e))?;
    Ok(CacheResult {
      data: items,
      source: result.source,
      cached_at: result.cached_at,
    })
  }

  pub fn invalidate(&self, endpoint: &str, params: &QueryParams) {
    self
      .cache
      .invalidate(&RequestKey::new(endpoint, params.clone()).cache_hash());
  }

  pub fn invalidate_all(&self) {
    self.cache.invalidate_all();
  }

  pub fn contains(&self, endpoint: &str, params: &QueryParams) -> bool {
    self
      .cache
      .contains(&RequestKey::new(endpoint, params.clone()).cache_hash())
  }
}
