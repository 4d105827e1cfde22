//! Scripted transport for exercising the layers above it.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::api::{ApiContext, ExecutorConfig};
use crate::session::Session;
use crate::transport::{Transport, TransportError, TransportRequest, TransportResponse};

#[derive(Debug, Clone)]
pub enum Step {
  Respond(u16, Value),
  /// Respond after a delay, for timeout and cancellation tests
  Delayed(Duration, u16, Value),
  /// Connection failure, no status
  Unreachable,
}

/// Plays back `steps` in order; the last one repeats forever.
pub struct ScriptedTransport {
  steps: Mutex<VecDeque<Step>>,
  requests: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
  pub fn new(steps: Vec<Step>) -> Arc<Self> {
    Arc::new(Self {
      steps: Mutex::new(steps.into()),
      requests: Mutex::new(Vec::new()),
    })
  }

  pub fn always(status: u16, body: Value) -> Arc<Self> {
    Self::new(vec![Step::Respond(status, body)])
  }

  pub fn attempts(&self) -> usize {
    self.requests.lock().unwrap().len()
  }

  pub fn requests(&self) -> Vec<TransportRequest> {
    self.requests.lock().unwrap().clone()
  }

  pub fn last_request(&self) -> TransportRequest {
    self.requests.lock().unwrap().last().cloned().unwrap()
  }

  fn next_step(&self) -> Step {
    let mut steps = self.steps.lock().unwrap();
    if steps.len() > 1 {
      steps.pop_front().unwrap()
    } else {
      steps.front().cloned().unwrap()
    }
  }
}

#[async_trait]
impl Transport for ScriptedTransport {
  async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
    self.requests.lock().unwrap().push(request);
    match self.next_step() {
      Step::Respond(status, body) => Ok(TransportResponse::json(status, &body)),
      Step::Delayed(delay, status, body) => {
        tokio::time::sleep(delay).await;
        Ok(TransportResponse::json(status, &body))
      }
      Step::Unreachable => Err(TransportError::Connect("connection refused".to_string())),
    }
  }
}

/// Fast executor settings so retry tests do not wait on real backoff.
pub fn fast_config(max_retries: u32) -> ExecutorConfig {
  ExecutorConfig {
    base_url: url::Url::parse("http://test.local/api").unwrap(),
    timeout: Duration::from_secs(5),
    max_retries,
    retry_delay: Duration::from_millis(1),
    notify_success: false,
  }
}

pub fn context(transport: Arc<dyn Transport>, max_retries: u32) -> ApiContext {
  ApiContext::new(fast_config(max_retries), transport, Arc::new(Session::anonymous()))
}
