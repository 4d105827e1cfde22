//! Pluggable transports.
//!
//! The executor only sees the [`Transport`] trait. [`HttpTransport`] talks to
//! a real server; [`MockTransport`] answers from in-memory collections. Which
//! one is used is decided once, at construction time.

mod http;
mod mock;

pub use http::HttpTransport;
pub use mock::MockTransport;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::api::Method;
use crate::config::{ApiConfig, TransportKind};

/// A fully resolved outgoing request.
#[derive(Debug, Clone)]
pub struct TransportRequest {
  pub method: Method,
  /// Endpoint path as given by the caller, e.g. `/professors/3`
  pub path: String,
  pub url: Url,
  pub query: Vec<(String, String)>,
  pub headers: BTreeMap<String, String>,
  /// Serialized JSON, only for methods that carry a body
  pub body: Option<Vec<u8>>,
}

impl TransportRequest {
  pub fn query_value(&self, name: &str) -> Option<&str> {
    self
      .query
      .iter()
      .find(|(k, _)| k == name)
      .map(|(_, v)| v.as_str())
  }
}

/// A raw response. Non-success statuses are still responses; classifying
/// them is the executor's job.
#[derive(Debug, Clone)]
pub struct TransportResponse {
  pub status: u16,
  pub body: Vec<u8>,
}

impl TransportResponse {
  pub fn json(status: u16, body: &serde_json::Value) -> Self {
    Self {
      status,
      body: serde_json::to_vec(body).unwrap_or_default(),
    }
  }
}

/// Failures where no HTTP response was obtained.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
  #[error("connection failed: {0}")]
  Connect(String),
  #[error("request failed: {0}")]
  Request(String),
  #[error("transport timed out")]
  TimedOut,
  #[error("no response after {0:?}")]
  Elapsed(Duration),
}

#[async_trait]
pub trait Transport: Send + Sync {
  async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// Build the transport selected by configuration.
pub fn from_config(config: &ApiConfig) -> color_eyre::Result<Arc<dyn Transport>> {
  let transport: Arc<dyn Transport> = match config.transport {
    TransportKind::Http => Arc::new(HttpTransport::new()?),
    TransportKind::Mock => Arc::new(
      MockTransport::with_sample_data().with_latency(Duration::from_millis(config.mock_latency_ms)),
    ),
  };
  Ok(transport)
}
