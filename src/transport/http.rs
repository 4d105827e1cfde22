use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use tracing::debug;

use super::{Transport, TransportError, TransportRequest, TransportResponse};
use crate::api::Method;

/// Transport backed by a shared reqwest client.
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
}

impl HttpTransport {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("horas/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

fn to_reqwest(method: Method) -> reqwest::Method {
  match method {
    Method::Get => reqwest::Method::GET,
    Method::Post => reqwest::Method::POST,
    Method::Put => reqwest::Method::PUT,
    Method::Patch => reqwest::Method::PATCH,
    Method::Delete => reqwest::Method::DELETE,
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
    let mut builder = self
      .client
      .request(to_reqwest(request.method), request.url.clone());

    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = request.body {
      builder = builder.body(body);
    }

    let response = builder.send().await.map_err(classify)?;
    let status = response.status().as_u16();
    let body = response.bytes().await.map_err(classify)?;
    debug!(url = %request.url, status, bytes = body.len(), "http response");

    Ok(TransportResponse {
      status,
      body: body.to_vec(),
    })
  }
}

fn classify(error: reqwest::Error) -> TransportError {
  if error.is_timeout() {
    TransportError::TimedOut
  } else if error.is_connect() {
    TransportError::Connect(error.to_string())
  } else {
    TransportError::Request(error.to_string())
  }
}
