//! In-memory fake server.
//!
//! Routes:
//! - `GET /{res}` (optionally `page`/`limit`)
//! - `GET /{res}/search?q=`
//! - `GET|PUT|PATCH|DELETE /{res}/{id}`
//! - `POST /{res}`

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::{Transport, TransportError, TransportRequest, TransportResponse};
use crate::api::Method;

pub struct MockTransport {
  collections: Mutex<BTreeMap<String, Vec<Value>>>,
  next_id: AtomicU64,
  latency: Duration,
  requests: AtomicUsize,
}

impl Default for MockTransport {
  fn default() -> Self {
    Self::new()
  }
}

impl MockTransport {
  /// Empty server with no collections.
  pub fn new() -> Self {
    Self {
      collections: Mutex::new(BTreeMap::new()),
      next_id: AtomicU64::new(1000),
      latency: Duration::ZERO,
      requests: AtomicUsize::new(0),
    }
  }

  /// Server seeded with a couple of professors, subjects, schedules and
  /// hour assignments.
  pub fn with_sample_data() -> Self {
    Self::new()
      .with_collection("professors", sample_professors())
      .with_collection("subjects", sample_subjects())
      .with_collection("schedules", sample_schedules())
      .with_collection("hours", sample_hours())
  }

  pub fn with_collection(self, name: &str, items: Vec<Value>) -> Self {
    self
      .collections
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(name.to_string(), items);
    self
  }

  pub fn with_latency(mut self, latency: Duration) -> Self {
    self.latency = latency;
    self
  }

  /// Number of requests served so far.
  pub fn request_count(&self) -> usize {
    self.requests.load(Ordering::SeqCst)
  }

  fn route(&self, request: &TransportRequest) -> TransportResponse {
    let segments: Vec<&str> = request
      .path
      .split('/')
      .filter(|s| !s.is_empty())
      .collect();

    let body: Option<Value> = request
      .body
      .as_deref()
      .and_then(|b| serde_json::from_slice(b).ok());

    let mut collections = self
      .collections
      .lock()
      .unwrap_or_else(PoisonError::into_inner);

    let (resource, rest) = match segments.split_first() {
      Some((resource, rest)) => (*resource, rest),
      None => return not_found("Route not found"),
    };
    let items = match collections.get_mut(resource) {
      Some(items) => items,
      None => return not_found(&format!("Unknown resource '{}'", resource)),
    };

    match (request.method, rest) {
      (Method::Get, []) => list(items, request),
      (Method::Get, ["search"]) => search(items, request.query_value("q").unwrap_or_default()),
      (Method::Post, []) => {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        create(items, body, id)
      }
      (Method::Get, [id]) => match items.iter().find(|item| has_id(item, id)) {
        Some(item) => ok(200, item.clone(), "Record found"),
        None => not_found("Record not found"),
      },
      (Method::Put, [id]) => replace(items, id, body, false),
      (Method::Patch, [id]) => replace(items, id, body, true),
      (Method::Delete, [id]) => {
        let before = items.len();
        items.retain(|item| !has_id(item, id));
        if items.len() == before {
          not_found("Record not found")
        } else {
          ok(200, json!({ "id": id }), "Record deleted")
        }
      }
      _ => not_found("Route not found"),
    }
  }
}

#[async_trait]
impl Transport for MockTransport {
  async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
    self.requests.fetch_add(1, Ordering::SeqCst);
    if !self.latency.is_zero() {
      tokio::time::sleep(self.latency).await;
    }
    Ok(self.route(&request))
  }
}

fn has_id(item: &Value, id: &str) -> bool {
  match item.get("id") {
    Some(Value::String(s)) => s == id,
    Some(Value::Number(n)) => n.to_string() == id,
    _ => false,
  }
}

fn ok(status: u16, data: Value, message: &str) -> TransportResponse {
  TransportResponse::json(status, &json!({ "data": data, "message": message }))
}

fn not_found(message: &str) -> TransportResponse {
  TransportResponse::json(404, &json!({ "message": message }))
}

fn invalid(message: &str) -> TransportResponse {
  TransportResponse::json(422, &json!({ "message": message }))
}

fn list(items: &[Value], request: &TransportRequest) -> TransportResponse {
  let total = items.len() as u64;
  let page = request.query_value("page").and_then(|p| p.parse::<u64>().ok());
  let limit = request.query_value("limit").and_then(|l| l.parse::<u64>().ok());

  match (page, limit) {
    (Some(page), Some(limit)) if page >= 1 && limit >= 1 => {
      let start = usize::try_from((page - 1).saturating_mul(limit)).unwrap_or(usize::MAX);
      let take = usize::try_from(limit).unwrap_or(usize::MAX);
      let window: Vec<Value> = items.iter().skip(start).take(take).cloned().collect();
      TransportResponse::json(
        200,
        &json!({
          "data": window,
          "total": total,
          "page": page,
          "limit": limit,
          "totalPages": total.div_ceil(limit),
          "message": "Records listed",
        }),
      )
    }
    _ => TransportResponse::json(
      200,
      &json!({ "data": items, "total": total, "message": "Records listed" }),
    ),
  }
}

fn search(items: &[Value], query: &str) -> TransportResponse {
  let needle = query.to_lowercase();
  let matches: Vec<Value> = items
    .iter()
    .filter(|item| {
      item
        .as_object()
        .map(|fields| {
          fields
            .values()
            .filter_map(Value::as_str)
            .any(|s| s.to_lowercase().contains(&needle))
        })
        .unwrap_or(false)
    })
    .cloned()
    .collect();
  TransportResponse::json(200, &json!({ "data": matches, "total": matches.len() }))
}

fn create(items: &mut Vec<Value>, body: Option<Value>, generated_id: String) -> TransportResponse {
  let mut fields = match body {
    Some(Value::Object(fields)) => fields,
    _ => return invalid("Request body must be a JSON object"),
  };
  let id = match fields.get("id") {
    Some(Value::String(id)) => id.clone(),
    _ => generated_id,
  };
  if items.iter().any(|item| has_id(item, &id)) {
    return TransportResponse::json(409, &json!({ "message": format!("Record {} already exists", id) }));
  }
  fields.insert("id".to_string(), Value::String(id));
  let item = Value::Object(fields);
  items.push(item.clone());
  ok(201, item, "Record created")
}

fn replace(items: &mut [Value], id: &str, body: Option<Value>, merge: bool) -> TransportResponse {
  let changes = match body {
    Some(Value::Object(fields)) => fields,
    _ => return invalid("Request body must be a JSON object"),
  };
  let Some(existing) = items.iter_mut().find(|item| has_id(item, id)) else {
    return not_found("Record not found");
  };

  let mut updated = if merge {
    existing.as_object().cloned().unwrap_or_default()
  } else {
    Map::new()
  };
  updated.extend(changes);
  updated.insert("id".to_string(), Value::String(id.to_string()));
  *existing = Value::Object(updated);

  ok(200, existing.clone(), "Record updated")
}

fn sample_professors() -> Vec<Value> {
  vec![
    json!({
      "id": "1",
      "firstName": "Juan",
      "lastName": "Pérez",
      "email": "juan.perez@universidad.edu",
      "department": "Matemáticas",
      "specialization": "Cálculo",
      "phone": "+54 280 123-4567",
      "totalScore": 95,
      "isActive": true,
    }),
    json!({
      "id": "2",
      "firstName": "María",
      "lastName": "González",
      "email": "maria.gonzalez@universidad.edu",
      "department": "Física",
      "specialization": "Mecánica Cuántica",
      "phone": "+54 280 123-4568",
      "totalScore": 87,
      "isActive": true,
    }),
  ]
}

fn sample_subjects() -> Vec<Value> {
  vec![
    json!({
      "id": "1",
      "name": "Cálculo I",
      "code": "MAT101",
      "description": "Introducción al cálculo diferencial e integral",
      "credits": 6,
      "department": "Matemáticas",
      "isActive": true,
    }),
    json!({
      "id": "2",
      "name": "Física General",
      "code": "FIS101",
      "description": "Conceptos fundamentales de la física clásica",
      "credits": 8,
      "department": "Física",
      "isActive": true,
    }),
  ]
}

fn sample_schedules() -> Vec<Value> {
  vec![json!({
    "id": "1",
    "professorId": "1",
    "subjectId": "1",
    "dayOfWeek": 1,
    "startTime": "08:00",
    "endTime": "10:00",
    "room": "Aula 101",
  })]
}

fn sample_hours() -> Vec<Value> {
  vec![json!({
    "id": "1",
    "professorId": "1",
    "subjectId": "1",
    "semester": "2024-2",
    "year": 2024,
    "assignedHours": 6,
    "scoreValue": 25,
    "status": "active",
    "schedule": {
      "dayOfWeek": 1,
      "startTime": "08:00",
      "endTime": "10:00",
      "room": "Aula 101",
    },
  })]
}
