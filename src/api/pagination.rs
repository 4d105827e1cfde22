//! Page/limit windowing over a collection endpoint.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::error::ApiError;
use super::executor::RequestExecutor;
use super::request::{QueryParams, RequestDescriptor, ResponseEnvelope};

pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageState {
  pub page: u64,
  pub limit: u64,
  pub total: u64,
  pub total_pages: u64,
  pub has_next: bool,
  pub has_prev: bool,
}

impl PageState {
  /// Build a state with the navigation flags derived from `page` and
  /// `total_pages`.
  pub fn new(page: u64, limit: u64, total: u64, total_pages: u64) -> Self {
    Self {
      page,
      limit,
      total,
      total_pages,
      has_next: page < total_pages,
      has_prev: page > 1,
    }
  }

  /// Merge what the server reported with what was requested.
  ///
  /// Server values win where present; `total` falls back to the number of
  /// items received and `total_pages` to `ceil(total / limit)`.
  fn from_response(envelope: &ResponseEnvelope, page: u64, limit: u64, received: usize) -> Self {
    let page = envelope.count_field("page").filter(|p| *p >= 1).unwrap_or(page);
    let limit = envelope.count_field("limit").filter(|l| *l >= 1).unwrap_or(limit);
    let total = envelope.count_field("total").unwrap_or(received as u64);
    let total_pages = envelope
      .count_field("totalPages")
      .unwrap_or_else(|| total.div_ceil(limit));
    Self::new(page, limit, total, total_pages)
  }
}

impl Default for PageState {
  fn default() -> Self {
    Self::new(1, DEFAULT_PAGE_SIZE, 0, 0)
  }
}

/// Holds one page of `T` at a time.
///
/// State only changes after a successful fetch; each fetch replaces the
/// items wholesale.
pub struct Paginator<T> {
  executor: RequestExecutor,
  endpoint: String,
  params: QueryParams,
  state: PageState,
  items: Vec<T>,
}

impl<T: DeserializeOwned> Paginator<T> {
  pub fn new(executor: RequestExecutor, endpoint: impl Into<String>) -> Self {
    Self {
      executor,
      endpoint: endpoint.into(),
      params: QueryParams::new(),
      state: PageState::default(),
      items: Vec::new(),
    }
  }

  /// Extra query parameters sent with every page request.
  pub fn with_params(mut self, params: QueryParams) -> Self {
    self.params = params;
    self
  }

  pub fn with_limit(mut self, limit: u64) -> Self {
    self.state = PageState::new(1, clamp_limit(limit), 0, 0);
    self
  }

  pub fn state(&self) -> &PageState {
    &self.state
  }

  pub fn items(&self) -> &[T] {
    &self.items
  }

  /// Fetch `page` with `limit` items per page.
  ///
  /// Returns `Ok(None)` if the request was superseded.
  pub async fn fetch_page(&mut self, page: u64, limit: u64) -> Result<Option<PageState>, ApiError> {
    let page = page.max(1);
    let limit = clamp_limit(limit);

    let descriptor = RequestDescriptor::get(self.endpoint.as_str())
      .with_query(&self.params)
      .query("page", page)
      .query("limit", limit)
      .quiet();

    let Some(envelope) = self.executor.execute(&descriptor).await? else {
      return Ok(None);
    };

    let items: Vec<T> = serde_json::from_value(envelope.items())
      .map_err(|e| ApiError::decode(Some(envelope.status), e))?;
    let state = PageState::from_response(&envelope, page, limit, items.len());
    debug!(endpoint = %self.endpoint, page = state.page, total = state.total, "page loaded");

    self.items = items;
    self.state = state;
    Ok(Some(state))
  }

  /// No request when there is no next page.
  pub async fn next_page(&mut self) -> Result<Option<PageState>, ApiError> {
    if !self.state.has_next {
      return Ok(None);
    }
    self.fetch_page(self.state.page + 1, self.state.limit).await
  }

  /// No request when there is no previous page.
  pub async fn prev_page(&mut self) -> Result<Option<PageState>, ApiError> {
    if !self.state.has_prev {
      return Ok(None);
    }
    self.fetch_page(self.state.page - 1, self.state.limit).await
  }

  /// Silently ignored when `page` is outside `1..=total_pages`.
  pub async fn go_to_page(&mut self, page: u64) -> Result<Option<PageState>, ApiError> {
    if page < 1 || page > self.state.total_pages {
      return Ok(None);
    }
    self.fetch_page(page, self.state.limit).await
  }

  /// Re-fetch the current page.
  pub async fn refresh(&mut self) -> Result<Option<PageState>, ApiError> {
    self.fetch_page(self.state.page, self.state.limit).await
  }
}

fn clamp_limit(limit: u64) -> u64 {
  limit.clamp(1, MAX_PAGE_SIZE)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::testing::{context, ScriptedTransport, Step};
  use crate::api::ErrorKind;
  use crate::models::Record;
  use crate::transport::MockTransport;
  use serde_json::json;
  use std::sync::Arc;

  #[tokio::test]
  async fn test_first_page_from_envelope() {
    let transport = ScriptedTransport::always(
      200,
      json!({"data": [{"id": "1"}, {"id": "2"}], "total": 2}),
    );
    let mut pager: Paginator<Record> = context(transport.clone(), 0).paginator("/professors");

    let state = pager.fetch_page(1, 10).await.unwrap().unwrap();

    assert_eq!(state, PageState::new(1, 10, 2, 1));
    assert!(!state.has_next);
    assert!(!state.has_prev);
    let ids: Vec<&str> = pager.items().iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);

    let sent = transport.last_request();
    assert_eq!(sent.query_value("page"), Some("1"));
    assert_eq!(sent.query_value("limit"), Some("10"));
  }

  #[tokio::test]
  async fn test_total_pages_derived_when_missing() {
    let transport = ScriptedTransport::always(200, json!({"data": [{"id": "a"}], "total": 25}));
    let mut pager: Paginator<Record> = context(transport, 0).paginator("/hours");

    let state = pager.fetch_page(2, 10).await.unwrap().unwrap();

    assert_eq!(state.total_pages, 3);
    assert!(state.has_next);
    assert!(state.has_prev);
  }

  #[tokio::test]
  async fn test_bare_array_counts_items() {
    let transport = ScriptedTransport::always(200, json!([{"id": "a"}, {"id": "b"}, {"id": "c"}]));
    let mut pager: Paginator<Record> = context(transport, 0).paginator("/subjects");

    let state = pager.fetch_page(1, 2).await.unwrap().unwrap();

    assert_eq!(state.total, 3);
    assert_eq!(state.total_pages, 2);
    assert!(state.has_next);
  }

  #[tokio::test]
  async fn test_navigation_over_mock_server() {
    let rows: Vec<_> = (1..=5).map(|i| json!({"id": i.to_string()})).collect();
    let transport = Arc::new(MockTransport::new().with_collection("rooms", rows));
    let mut pager: Paginator<Record> = context(transport.clone(), 0)
      .paginator("/rooms")
      .with_limit(2);

    pager.fetch_page(1, 2).await.unwrap();
    assert_eq!(pager.state().total_pages, 3);

    assert_eq!(pager.next_page().await.unwrap().unwrap().page, 2);
    assert_eq!(pager.next_page().await.unwrap().unwrap().page, 3);
    assert_eq!(pager.items().len(), 1);

    let requests = transport.request_count();
    assert!(pager.next_page().await.unwrap().is_none());
    assert_eq!(transport.request_count(), requests);

    assert_eq!(pager.prev_page().await.unwrap().unwrap().page, 2);
    assert_eq!(pager.go_to_page(1).await.unwrap().unwrap().page, 1);
    assert!(pager.prev_page().await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_out_of_range_goto_does_nothing() {
    let transport = ScriptedTransport::always(200, json!({"data": [{"id": "1"}], "total": 15}));
    let mut pager: Paginator<Record> = context(transport.clone(), 0).paginator("/professors");
    pager.fetch_page(1, 10).await.unwrap();
    let before = *pager.state();

    assert!(pager.go_to_page(0).await.unwrap().is_none());
    assert!(pager.go_to_page(3).await.unwrap().is_none());

    assert_eq!(*pager.state(), before);
    assert_eq!(transport.attempts(), 1);
  }

  #[tokio::test]
  async fn test_failure_keeps_previous_page() {
    let transport = ScriptedTransport::new(vec![
      Step::Respond(200, json!({"data": [{"id": "1"}], "total": 30})),
      Step::Respond(403, json!({})),
    ]);
    let mut pager: Paginator<Record> = context(transport, 0).paginator("/hours");
    pager.fetch_page(1, 10).await.unwrap();

    let err = pager.next_page().await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Forbidden);
    assert_eq!(pager.state().page, 1);
    assert_eq!(pager.items().len(), 1);
  }

  #[test]
  fn test_flags_follow_page_and_total_pages() {
    for (page, total_pages) in [(1, 0), (1, 1), (1, 4), (3, 4), (4, 4), (6, 4)] {
      let state = PageState::new(page, 10, 0, total_pages);
      assert_eq!(state.has_next, page < total_pages);
      assert_eq!(state.has_prev, page > 1);
    }
  }
}
