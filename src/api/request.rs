//! Request descriptors and response envelopes.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use super::error::ApiError;

/// Query parameters, kept sorted so equal requests hash equally.
pub type QueryParams = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
  Get,
  Post,
  Put,
  Patch,
  Delete,
}

impl Method {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Get => "GET",
      Self::Post => "POST",
      Self::Put => "PUT",
      Self::Patch => "PATCH",
      Self::Delete => "DELETE",
    }
  }

  /// Methods whose body is serialized and sent.
  pub fn sends_body(self) -> bool {
    matches!(self, Self::Post | Self::Put | Self::Patch)
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Everything needed to issue one call. Built once, never mutated by the
/// executor.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
  pub endpoint: String,
  pub method: Method,
  pub body: Option<Value>,
  pub query: QueryParams,
  pub headers: BTreeMap<String, String>,
  pub auth_required: bool,
  /// Emit a success notification when the executor is configured to
  pub notify_success: bool,
}

impl RequestDescriptor {
  pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
    Self {
      endpoint: endpoint.into(),
      method,
      body: None,
      query: QueryParams::new(),
      headers: BTreeMap::new(),
      auth_required: true,
      notify_success: true,
    }
  }

  pub fn get(endpoint: impl Into<String>) -> Self {
    Self::new(Method::Get, endpoint)
  }

  pub fn post(endpoint: impl Into<String>, body: Value) -> Self {
    Self::new(Method::Post, endpoint).with_body(body)
  }

  pub fn put(endpoint: impl Into<String>, body: Value) -> Self {
    Self::new(Method::Put, endpoint).with_body(body)
  }

  pub fn patch(endpoint: impl Into<String>, body: Value) -> Self {
    Self::new(Method::Patch, endpoint).with_body(body)
  }

  pub fn delete(endpoint: impl Into<String>) -> Self {
    Self::new(Method::Delete, endpoint)
  }

  pub fn with_body(mut self, body: Value) -> Self {
    self.body = Some(body);
    self
  }

  pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
    self.query.insert(key.into(), value.to_string());
    self
  }

  /// Merge a parameter map; later keys win.
  pub fn with_query(mut self, params: &QueryParams) -> Self {
    self
      .query
      .extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
    self
  }

  pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.insert(name.into(), value.into());
    self
  }

  /// Do not attach the session token.
  pub fn without_auth(mut self) -> Self {
    self.auth_required = false;
    self
  }

  /// Suppress the success notification for this call.
  pub fn quiet(mut self) -> Self {
    self.notify_success = false;
    self
  }
}

const DEFAULT_SUCCESS_MESSAGE: &str = "Operation completed";

/// A successful response.
///
/// Servers may wrap payloads as `{data, message, ...}`. When they do, `data`
/// is unwrapped and every other top-level field lands in `meta`; otherwise
/// the whole body is `data`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
  pub data: Value,
  pub status: u16,
  pub message: String,
  pub meta: Map<String, Value>,
}

impl ResponseEnvelope {
  pub fn from_body(status: u16, body: Value) -> Self {
    match body {
      Value::Object(mut fields) if fields.get("data").is_some_and(|d| !d.is_null()) => {
        let data = fields.remove("data").unwrap_or(Value::Null);
        let message = match fields.remove("message") {
          Some(Value::String(m)) => m,
          _ => DEFAULT_SUCCESS_MESSAGE.to_string(),
        };
        Self {
          data,
          status,
          message,
          meta: fields,
        }
      }
      other => {
        let message = other
          .get("message")
          .and_then(Value::as_str)
          .unwrap_or(DEFAULT_SUCCESS_MESSAGE)
          .to_string();
        Self {
          data: other,
          status,
          message,
          meta: Map::new(),
        }
      }
    }
  }

  /// Deserialize `data` into a typed value.
  pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
    serde_json::from_value(self.data.clone()).map_err(|e| ApiError::decode(Some(self.status), e))
  }

  /// The item list of a collection response.
  ///
  /// Accepts a bare array, or an object carrying `items` or `data`.
  pub fn items(&self) -> Value {
    match &self.data {
      Value::Array(_) => self.data.clone(),
      Value::Object(fields) => fields
        .get("items")
        .or_else(|| fields.get("data"))
        .filter(|v| v.is_array())
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new())),
      _ => Value::Array(Vec::new()),
    }
  }

  /// Look up a numeric field in `data` first, then in the envelope siblings.
  pub fn count_field(&self, name: &str) -> Option<u64> {
    self
      .data
      .get(name)
      .and_then(Value::as_u64)
      .or_else(|| self.meta.get(name).and_then(Value::as_u64))
  }
}
