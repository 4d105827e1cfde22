//! Remote data access: executor, pagination and CRUD over resource paths.

mod batch;
mod crud;
mod error;
mod executor;
pub mod notification;
mod pagination;
mod request;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::{has_errors, Batch};
pub use crud::CrudResource;
pub use error::{ApiError, ErrorKind};
pub use executor::{ExecutorConfig, RequestExecutor};
pub use notification::{Notification, NotificationLevel};
pub use pagination::{PageState, Paginator, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use request::{Method, QueryParams, RequestDescriptor, ResponseEnvelope};

use color_eyre::Result;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::config::ApiConfig;
use crate::models::Resource;
use crate::session::SessionProvider;
use crate::transport::{self, Transport};
use notification::NotificationSender;

/// Shared wiring for building executors.
///
/// Every executor, paginator and resource created from one context talks to
/// the same transport and session but keeps its own in-flight slot.
#[derive(Clone)]
pub struct ApiContext {
  config: ExecutorConfig,
  transport: Arc<dyn Transport>,
  session: Arc<dyn SessionProvider>,
  notifier: Option<NotificationSender>,
}

impl ApiContext {
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
    }
  }

  /// Build the context described by configuration, transport included.
  pub fn from_config(config: &ApiConfig, session: Arc<dyn SessionProvider>) -> Result<Self> {
    let executor_config = ExecutorConfig {
      base_url: config.base_url()?,
      timeout: config.timeout(),
      max_retries: config.retries,
      retry_delay: config.retry_delay(),
      notify_success: config.notify_success,
    };
    let transport = transport::from_config(config)?;
    Ok(Self::new(executor_config, transport, session))
  }

  pub fn with_notifier(mut self, notifier: NotificationSender) -> Self {
    self.notifier = Some(notifier);
    self
  }

  pub fn executor(&self) -> RequestExecutor {
    let executor = RequestExecutor::new(
      self.config.clone(),
      Arc::clone(&self.transport),
      Arc::clone(&self.session),
    );
    match &self.notifier {
      Some(tx) => executor.with_notifier(tx.clone()),
      None => executor,
    }
  }

  pub fn resource<T: Resource>(&self, path: impl Into<String>) -> CrudResource<T> {
    CrudResource::new(self.executor(), path)
  }

  pub fn batch(&self, requests: Vec<RequestDescriptor>) -> Batch {
    Batch::new(self, requests)
  }

  pub fn paginator<T: DeserializeOwned>(&self, endpoint: impl Into<String>) -> Paginator<T> {
    Paginator::new(self.executor(), endpoint)
  }
}
