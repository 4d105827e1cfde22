//! Request keys for cached API calls.

use sha2::{Digest, Sha256};

use super::traits::QueryKey;
use crate::api::QueryParams;

/// A GET request identified by endpoint and query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestKey {
  pub endpoint: String,
  pub params: QueryParams,
}

impl RequestKey {
  pub fn new(endpoint: impl Into<String>, params: QueryParams) -> Self {
    Self {
      endpoint: endpoint.into(),
      params,
    }
  }
}

impl QueryKey for RequestKey {
  fn cache_hash(&self) -> String {
    // QueryParams is a BTreeMap, so iteration order is already sorted
    let query = self
      .params
      .iter()
      .map(|(k, v)| format!("{}={}", k, v))
      .collect::<Vec<_>>()
      .join("&");
    let input = format!("{}?{}", normalize_endpoint(&self.endpoint), query);

    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }

  fn description(&self) -> String {
    if self.params.is_empty() {
      self.endpoint.clone()
    } else {
      format!("{} {:?}", self.endpoint, self.params)
    }
  }
}

fn normalize_endpoint(endpoint: &str) -> String {
  format!("/{}", endpoint.trim_matches('/'))
}
