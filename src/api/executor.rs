//! Request executor: one HTTP-shaped call with timeout, retry and
//! cancellation.

use futures::future::{abortable, AbortHandle, Aborted};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::error::{ApiError, ErrorKind};
use super::notification::{Notification, NotificationSender};
use super::request::{QueryParams, RequestDescriptor, ResponseEnvelope};
use crate::session::SessionProvider;
use crate::transport::{Transport, TransportRequest};

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
  pub base_url: Url,
  pub timeout: Duration,
  pub max_retries: u32,
  /// Retry `n` waits `n * retry_delay`
  pub retry_delay: Duration,
  pub notify_success: bool,
}

/// Issues requests through a [`Transport`].
///
/// Each executor runs at most one call at a time: starting a new call aborts
/// the one in flight, which then resolves to `Ok(None)` without touching any
/// state. Independent callers should use independent executors.
pub struct RequestExecutor {
  config: ExecutorConfig,
  transport: Arc<dyn Transport>,
  session: Arc<dyn SessionProvider>,
  notifier: Option<NotificationSender>,
  in_flight: Mutex<Option<(u64, AbortHandle)>>,
  next_call: AtomicU64,
  last_retries: AtomicU32,
}

impl RequestExecutor {
  pub fn new(
    config: ExecutorConfig,
    transport: Arc<dyn Transport>,
    session: Arc<dyn SessionProvider>,
  ) -> Self {
    Self {
      config,
      transport,
      session,
      notifier: None,
      in_flight: Mutex::new(None),
      next_call: AtomicU64::new(0),
      last_retries: AtomicU32::new(0),
    }
  }

  pub fn with_notifier(mut self, notifier: NotificationSender) -> Self {
    self.notifier = Some(notifier);
    self
  }

  pub fn config(&self) -> &ExecutorConfig {
    &self.config
  }

  /// Retries spent by the most recent call.
  pub fn retry_count(&self) -> u32 {
    self.last_retries.load(Ordering::SeqCst)
  }

  /// Abort the call in flight, if any.
  pub fn cancel(&self) {
    if let Some((call, handle)) = self.slot().take() {
      debug!(call, "request cancelled");
      handle.abort();
    }
  }

  /// Run one request to completion.
  ///
  /// Returns `Ok(None)` when the call was superseded or cancelled.
  pub async fn execute(
    &self,
    descriptor: &RequestDescriptor,
  ) -> Result<Option<ResponseEnvelope>, ApiError> {
    let call = self.next_call.fetch_add(1, Ordering::SeqCst);
    let (task, handle) = abortable(self.run(descriptor));

    if let Some((previous, previous_handle)) = self.slot().replace((call, handle)) {
      debug!(previous, call, "aborting superseded request");
      previous_handle.abort();
    }

    let outcome = task.await;

    {
      let mut slot = self.slot();
      if slot.as_ref().is_some_and(|(id, _)| *id == call) {
        *slot = None;
      }
    }

    match outcome {
      Err(Aborted) => {
        debug!(call, endpoint = %descriptor.endpoint, "request aborted");
        Ok(None)
      }
      Ok(Ok(envelope)) => {
        if self.config.notify_success && descriptor.notify_success {
          self.notify(Notification::success(envelope.message.clone()));
        }
        Ok(Some(envelope))
      }
      Ok(Err(error)) => {
        if error.kind == ErrorKind::Unauthorized {
          self.session.on_unauthorized();
        }
        self.notify(Notification::error(error.kind, error.message.clone()));
        Err(error)
      }
    }
  }

  async fn run(&self, descriptor: &RequestDescriptor) -> Result<ResponseEnvelope, ApiError> {
    let request = self.build_request(descriptor)?;
    let mut retries = 0u32;
    self.last_retries.store(0, Ordering::SeqCst);

    loop {
      debug!(
        method = %descriptor.method,
        url = %request.url,
        attempt = retries + 1,
        "sending request"
      );

      match self.attempt(request.clone()).await {
        Ok(envelope) => return Ok(envelope),
        Err(error) if error.kind.is_retryable() && retries < self.config.max_retries => {
          retries += 1;
          self.last_retries.store(retries, Ordering::SeqCst);
          let delay = self.config.retry_delay * retries;
          warn!(
            kind = %error.kind,
            status = ?error.http_status,
            retries,
            delay_ms = delay.as_millis() as u64,
            "request failed, retrying"
          );
          tokio::time::sleep(delay).await;
        }
        Err(error) => return Err(error),
      }
    }
  }

  async fn attempt(&self, request: TransportRequest) -> Result<ResponseEnvelope, ApiError> {
    let sent = tokio::time::timeout(self.config.timeout, self.transport.send(request)).await;
    let response = match sent {
      Ok(Ok(response)) => response,
      Ok(Err(error)) => return Err(ApiError::from_transport(error)),
      Err(_) => return Err(ApiError::timeout(self.config.timeout)),
    };

    let status = response.status;
    if (200..300).contains(&status) {
      let body = if response.body.is_empty() {
        Value::Null
      } else {
        serde_json::from_slice(&response.body).map_err(|e| ApiError::decode(Some(status), e))?
      };
      Ok(ResponseEnvelope::from_body(status, body))
    } else {
      // Error bodies are best-effort
      let body = serde_json::from_slice(&response.body).unwrap_or(Value::Null);
      Err(ApiError::from_status(status, body))
    }
  }

  fn build_request(&self, descriptor: &RequestDescriptor) -> Result<TransportRequest, ApiError> {
    let mut headers = BTreeMap::new();
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    headers.insert("Accept".to_string(), "application/json".to_string());
    if descriptor.auth_required {
      if let Some(token) = self.session.token() {
        headers.insert("Authorization".to_string(), format!("Bearer {}", token));
      }
    }
    headers.extend(descriptor.headers.clone());

    let body = match &descriptor.body {
      Some(body) if descriptor.method.sends_body() => Some(serde_json::to_vec(body).map_err(|e| {
        ApiError::new(ErrorKind::Unknown, "Request body could not be serialized").with_cause(e)
      })?),
      _ => None,
    };

    Ok(TransportRequest {
      method: descriptor.method,
      path: descriptor.endpoint.clone(),
      url: resolve_url(&self.config.base_url, &descriptor.endpoint, &descriptor.query),
      query: descriptor
        .query
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect(),
      headers,
      body,
    })
  }

  fn notify(&self, notification: Notification) {
    if let Some(tx) = &self.notifier {
      // Nobody listening is fine
      let _ = tx.send(notification);
    }
  }

  fn slot(&self) -> MutexGuard<'_, Option<(u64, AbortHandle)>> {
    self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Append `endpoint` to the base path (rather than replacing it, as
/// `Url::join` would for absolute paths) and attach the query.
fn resolve_url(base: &Url, endpoint: &str, query: &QueryParams) -> Url {
  let mut url = base.clone();
  let path = format!(
    "{}/{}",
    base.path().trim_end_matches('/'),
    endpoint.trim_start_matches('/')
  );
  url.set_path(&path);
  if !query.is_empty() {
    url.query_pairs_mut().extend_pairs(query.iter());
  }
  url
}
