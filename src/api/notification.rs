use serde::Serialize;
use tokio::sync::mpsc;

use super::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
  Success,
  Error,
  Warning,
  Info,
}

/// A user-facing message for the hosting UI (toast, status bar, stderr).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
  pub level: NotificationLevel,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub kind: Option<ErrorKind>,
}

impl Notification {
  pub fn success(message: impl Into<String>) -> Self {
    Self {
      level: NotificationLevel::Success,
      message: message.into(),
      kind: None,
    }
  }

  pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
    Self {
      level: NotificationLevel::Error,
      message: message.into(),
      kind: Some(kind),
    }
  }
}

pub type NotificationSender = mpsc::UnboundedSender<Notification>;
pub type NotificationReceiver = mpsc::UnboundedReceiver<Notification>;

pub fn channel() -> (NotificationSender, NotificationReceiver) {
  mpsc::unbounded_channel()
}
