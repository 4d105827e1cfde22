//! Classified errors.
//!
//! The executor is the only place that turns transport failures and HTTP
//! statuses into an [`ApiError`]. Everything above it passes these through
//! unchanged.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::transport::TransportError;

/// Error taxonomy shared by every layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
  /// No response reached us
  NetworkError,
  Timeout,
  /// 401, also terminates the session
  Unauthorized,
  /// 403
  Forbidden,
  /// 404
  NotFound,
  /// 422
  ValidationError,
  /// Any 5xx
  ServerError,
  Unknown,
}

impl ErrorKind {
  /// Classify an HTTP status that is not a success.
  pub fn from_status(status: u16) -> Self {
    match status {
      401 => Self::Unauthorized,
      403 => Self::Forbidden,
      404 => Self::NotFound,
      422 => Self::ValidationError,
      500..=599 => Self::ServerError,
      _ => Self::Unknown,
    }
  }

  /// Only failures where the server never answered, or answered with a 5xx,
  /// are worth another attempt.
  pub fn is_retryable(self) -> bool {
    matches!(self, Self::NetworkError | Self::Timeout | Self::ServerError)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::NetworkError => "NETWORK_ERROR",
      Self::Timeout => "TIMEOUT",
      Self::Unauthorized => "UNAUTHORIZED",
      Self::Forbidden => "FORBIDDEN",
      Self::NotFound => "NOT_FOUND",
      Self::ValidationError => "VALIDATION_ERROR",
      Self::ServerError => "SERVER_ERROR",
      Self::Unknown => "UNKNOWN",
    }
  }

  fn default_message(self) -> &'static str {
    match self {
      Self::NetworkError => "Connection error. Check your network connection.",
      Self::Timeout => "The request took too long. Try again.",
      Self::Unauthorized => "Session expired. Please sign in again.",
      Self::Forbidden => "You do not have permission to perform this action.",
      Self::NotFound => "Resource not found.",
      Self::ValidationError => "Invalid data.",
      Self::ServerError => "Server error. Try again later.",
      Self::Unknown => "Unknown error",
    }
  }
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A normalized failure record. Never carries a raw transport error except
/// as its `cause`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
  pub kind: ErrorKind,
  /// Human-readable, suitable for a notification
  pub message: String,
  pub http_status: Option<u16>,
  /// Parsed error body, when the server sent one
  pub details: Option<Value>,
  #[source]
  pub cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl ApiError {
  pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
      http_status: None,
      details: None,
      cause: None,
    }
  }

  /// Classify a non-success response.
  ///
  /// Validation and unknown statuses prefer the server's own `message`;
  /// the rest use a fixed message per kind.
  pub fn from_status(status: u16, body: Value) -> Self {
    let kind = ErrorKind::from_status(status);
    let server_message = body
      .get("message")
      .and_then(Value::as_str)
      .map(String::from);

    let message = match kind {
      ErrorKind::ValidationError => {
        server_message.unwrap_or_else(|| kind.default_message().to_string())
      }
      ErrorKind::Unknown => server_message.unwrap_or_else(|| format!("HTTP {}", status)),
      _ => kind.default_message().to_string(),
    };

    Self {
      kind,
      message,
      http_status: Some(status),
      details: if body.is_null() { None } else { Some(body) },
      cause: None,
    }
  }

  /// A transport failure without any HTTP status is always network-class.
  pub fn from_transport(error: TransportError) -> Self {
    let kind = match error {
      TransportError::TimedOut => ErrorKind::Timeout,
      _ => ErrorKind::NetworkError,
    };
    Self::new(kind, kind.default_message()).with_cause(error)
  }

  pub fn timeout(after: Duration) -> Self {
    Self::new(ErrorKind::Timeout, ErrorKind::Timeout.default_message())
      .with_cause(TransportError::Elapsed(after))
  }

  /// The response arrived but could not be turned into the expected shape.
  pub fn decode(status: Option<u16>, error: serde_json::Error) -> Self {
    Self {
      kind: ErrorKind::Unknown,
      message: format!("Unexpected response format: {}", error),
      http_status: status,
      details: None,
      cause: Some(Arc::new(error)),
    }
  }

  pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
    self.cause = Some(Arc::new(cause));
    self
  }

  pub fn is(&self, kind: ErrorKind) -> bool {
    self.kind == kind
  }
}
