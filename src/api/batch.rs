//! Run several requests as one unit, in parallel or one after another.

use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use super::error::{ApiError, ErrorKind};
use super::request::{RequestDescriptor, ResponseEnvelope};
use super::ApiContext;

/// Several requests over one [`ApiContext`].
///
/// Every request gets its own executor and never raises notifications.
/// Results come back by index: `results[i]` belongs to `requests[i]`. A
/// sequential batch that stops on error returns fewer results than requests.
pub struct Batch {
  context: ApiContext,
  requests: Vec<RequestDescriptor>,
  parallel: bool,
  stop_on_error: bool,
  completed: AtomicUsize,
}

impl Batch {
  pub fn new(context: &ApiContext, requests: Vec<RequestDescriptor>) -> Self {
    Self {
      context: ApiContext {
        notifier: None,
        ..context.clone()
      },
      requests: requests.into_iter().map(RequestDescriptor::quiet).collect(),
      parallel: true,
      stop_on_error: false,
      completed: AtomicUsize::new(0),
    }
  }

  /// Run requests one at a time, in order.
  pub fn sequential(mut self) -> Self {
    self.parallel = false;
    self
  }

  /// Skip the remaining requests after the first failure. Only meaningful
  /// for sequential batches.
  pub fn stop_on_error(mut self) -> Self {
    self.stop_on_error = true;
    self
  }

  pub fn total(&self) -> usize {
    self.requests.len()
  }

  /// Requests finished so far in the current run, failed ones included.
  pub fn completed(&self) -> usize {
    self.completed.load(Ordering::SeqCst)
  }

  /// Percentage of requests finished, 0 for an empty batch.
  pub fn progress(&self) -> f64 {
    match self.total() {
      0 => 0.0,
      total => self.completed() as f64 * 100.0 / total as f64,
    }
  }

  pub fn all_completed(&self) -> bool {
    self.completed() == self.total()
  }

  pub async fn run(&self) -> Vec<Result<ResponseEnvelope, ApiError>> {
    self.completed.store(0, Ordering::SeqCst);
    debug!(
      total = self.total(),
      parallel = self.parallel,
      "running batch"
    );

    if self.parallel {
      return join_all(self.requests.iter().map(|descriptor| self.run_one(descriptor))).await;
    }

    let mut results = Vec::with_capacity(self.requests.len());
    for descriptor in &self.requests {
      let result = self.run_one(descriptor).await;
      let failed = result.is_err();
      results.push(result);
      if failed && self.stop_on_error {
        debug!(completed = self.completed(), "batch stopped on error");
        break;
      }
    }
    results
  }

  async fn run_one(&self, descriptor: &RequestDescriptor) -> Result<ResponseEnvelope, ApiError> {
    let outcome = self
      .context
      .executor()
      .execute(descriptor)
      .await
      .and_then(|envelope| {
        envelope.ok_or_else(|| ApiError::new(ErrorKind::Unknown, "Request was cancelled"))
      });
    self.completed.fetch_add(1, Ordering::SeqCst);
    outcome
  }
}

/// True when any result in `results` is an error.
pub fn has_errors(results: &[Result<ResponseEnvelope, ApiError>]) -> bool {
  results.iter().any(Result::is_err)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::notification;
  use crate::api::testing::{context, ScriptedTransport, Step};
  use crate::transport::MockTransport;
  use serde_json::json;
  use std::sync::Arc;
  use std::time::Duration;

  fn gets(paths: &[&str]) -> Vec<RequestDescriptor> {
    paths.iter().map(|p| RequestDescriptor::get(*p)).collect()
  }

  #[tokio::test]
  async fn test_parallel_results_keep_request_order() {
    let transport = Arc::new(MockTransport::with_sample_data());
    let batch = Batch::new(
      &context(transport.clone(), 0),
      gets(&["/professors", "/rooms", "/subjects"]),
    );

    let results = batch.run().await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().items().as_array().unwrap().len(), 2);
    assert_eq!(results[1].as_ref().unwrap_err().kind, ErrorKind::NotFound);
    assert!(results[2].is_ok());
    assert!(has_errors(&results));
    assert_eq!(batch.completed(), 3);
    assert!(batch.all_completed());
    assert_eq!(batch.progress(), 100.0);
    assert_eq!(transport.request_count(), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_parallel_requests_overlap() {
    let transport = ScriptedTransport::new(vec![Step::Delayed(
      Duration::from_millis(100),
      200,
      json!([]),
    )]);
    let batch = Batch::new(&context(transport.clone(), 0), gets(&["/a", "/b", "/c"]));

    let started = tokio::time::Instant::now();
    let results = batch.run().await;

    assert!(results.iter().all(Result::is_ok));
    assert!(started.elapsed() < Duration::from_millis(200));
    assert_eq!(transport.attempts(), 3);
  }

  #[tokio::test]
  async fn test_sequential_stops_on_error() {
    let transport = ScriptedTransport::new(vec![
      Step::Respond(200, json!([])),
      Step::Respond(500, json!({})),
      Step::Respond(200, json!([])),
    ]);
    let batch = Batch::new(&context(transport.clone(), 0), gets(&["/a", "/b", "/c"]))
      .sequential()
      .stop_on_error();

    let results = batch.run().await;

    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert_eq!(results[1].as_ref().unwrap_err().kind, ErrorKind::ServerError);
    assert_eq!(batch.completed(), 2);
    assert!(!batch.all_completed());
    assert_eq!(transport.attempts(), 2);
    let paths: Vec<String> = transport.requests().into_iter().map(|r| r.path).collect();
    assert_eq!(paths, vec!["/a", "/b"]);
  }

  #[tokio::test]
  async fn test_sequential_without_stop_runs_everything() {
    let transport = ScriptedTransport::new(vec![
      Step::Respond(404, json!({})),
      Step::Respond(200, json!([])),
    ]);
    let batch = Batch::new(&context(transport, 0), gets(&["/a", "/b", "/c"])).sequential();

    let results = batch.run().await;

    assert_eq!(results.len(), 3);
    assert!(results[0].is_err());
    assert!(results[1].is_ok() && results[2].is_ok());
    assert_eq!(batch.completed(), 3);
  }

  #[tokio::test]
  async fn test_empty_batch() {
    let transport = ScriptedTransport::always(200, json!([]));
    let batch = Batch::new(&context(transport, 0), Vec::new());

    assert!(batch.run().await.is_empty());
    assert_eq!(batch.progress(), 0.0);
    assert!(batch.all_completed());
  }

  #[tokio::test]
  async fn test_batch_raises_no_notifications() {
    let (tx, mut rx) = notification::channel();
    let transport = ScriptedTransport::always(404, json!({}));
    let ctx = context(transport, 0).with_notifier(tx);

    let results = Batch::new(&ctx, gets(&["/a"])).run().await;

    assert!(has_errors(&results));
    drop(ctx);
    assert!(rx.recv().await.is_none());
  }
}
