//! App-wide state: UI preferences, notifications and the loaded collections.
//!
//! State only changes through [`reduce`]; [`Store`] wraps it with a watch
//! channel so views can follow updates, and persists preferences when given
//! a key/value store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

use crate::api::NotificationLevel;
use crate::models::{HourAssignment, Professor, Resource, Schedule, Subject};
use crate::storage::{KeyValueStore, KeyValueStoreExt, StorageError};

const THEME_KEY: &str = "app.theme";
const SETTINGS_KEY: &str = "app.settings";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
  #[default]
  Dark,
  Light,
}

impl Theme {
  pub fn toggled(self) -> Self {
    match self {
      Self::Dark => Self::Light,
      Self::Light => Self::Dark,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationChannels {
  pub email: bool,
  pub push: bool,
  pub desktop: bool,
}

impl Default for NotificationChannels {
  fn default() -> Self {
    Self {
      email: true,
      push: true,
      desktop: true,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
  pub language: String,
  pub time_format: String,
  pub notifications: NotificationChannels,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      language: "es".to_string(),
      time_format: "24h".to_string(),
      notifications: NotificationChannels::default(),
    }
  }
}

/// Fields left `None` keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
  pub language: Option<String>,
  pub time_format: Option<String>,
  pub notifications: Option<NotificationChannels>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppNotification {
  pub id: u64,
  pub level: NotificationLevel,
  pub title: Option<String>,
  pub message: String,
  pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
  pub total_professors: usize,
  pub total_subjects: usize,
  pub total_hours: f64,
  /// Mean `scoreValue` per hour assignment, two decimals
  pub average_score: f64,
}

impl Stats {
  pub fn compute(data: &AppData) -> Self {
    let total_hours = data.hours.iter().map(|h| h.assigned_hours).sum();
    let total_score: f64 = data.hours.iter().map(|h| h.score_value.unwrap_or(0.0)).sum();
    let average = if data.hours.is_empty() {
      0.0
    } else {
      total_score / data.hours.len() as f64
    };

    Self {
      total_professors: data.professors.len(),
      total_subjects: data.subjects.len(),
      total_hours,
      average_score: (average * 100.0).round() / 100.0,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AppData {
  pub professors: Vec<Professor>,
  pub subjects: Vec<Subject>,
  pub schedules: Vec<Schedule>,
  pub hours: Vec<HourAssignment>,
  pub stats: Stats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
  pub theme: Theme,
  pub sidebar_open: bool,
  pub notifications: Vec<AppNotification>,
  pub settings: Settings,
  pub app_data: AppData,
  #[serde(skip)]
  next_notification_id: u64,
}

impl Default for AppState {
  fn default() -> Self {
    Self {
      theme: Theme::default(),
      sidebar_open: true,
      notifications: Vec::new(),
      settings: Settings::default(),
      app_data: AppData::default(),
      next_notification_id: 1,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
  SetTheme(Theme),
  ToggleTheme,
  ToggleSidebar,
  SetSidebar(bool),
  AddNotification {
    level: NotificationLevel,
    title: Option<String>,
    message: String,
    at: DateTime<Utc>,
  },
  RemoveNotification(u64),
  ClearNotifications,
  UpdateSettings(SettingsUpdate),
  SetProfessors(Vec<Professor>),
  AddProfessor(Professor),
  /// JSON fields merged over the professor with the same `id`
  UpdateProfessor(Value),
  DeleteProfessor(String),
  SetSubjects(Vec<Subject>),
  AddSubject(Subject),
  UpdateSubject(Value),
  DeleteSubject(String),
  SetSchedules(Vec<Schedule>),
  AddSchedule(Schedule),
  UpdateSchedule(Value),
  DeleteSchedule(String),
  SetHours(Vec<HourAssignment>),
  AddHourAssignment(HourAssignment),
  UpdateHourAssignment(Value),
  DeleteHourAssignment(String),
  RecomputeStats,
}

impl Action {
  fn touches_collections(&self) -> bool {
    !matches!(
      self,
      Self::SetTheme(_)
        | Self::ToggleTheme
        | Self::ToggleSidebar
        | Self::SetSidebar(_)
        | Self::AddNotification { .. }
        | Self::RemoveNotification(_)
        | Self::ClearNotifications
        | Self::UpdateSettings(_)
    )
  }
}

/// Compute the next state. Stats follow every collection change.
pub fn reduce(state: &AppState, action: Action) -> AppState {
  let mut next = state.clone();
  let recompute = action.touches_collections();
  let data = &mut next.app_data;

  match action {
    Action::SetTheme(theme) => next.theme = theme,
    Action::ToggleTheme => next.theme = next.theme.toggled(),
    Action::ToggleSidebar => next.sidebar_open = !next.sidebar_open,
    Action::SetSidebar(open) => next.sidebar_open = open,
    Action::AddNotification {
      level,
      title,
      message,
      at,
    } => {
      next.notifications.push(AppNotification {
        id: next.next_notification_id,
        level,
        title,
        message,
        timestamp: at,
      });
      next.next_notification_id += 1;
    }
    Action::RemoveNotification(id) => next.notifications.retain(|n| n.id != id),
    Action::ClearNotifications => next.notifications.clear(),
    Action::UpdateSettings(update) => {
      let settings = &mut next.settings;
      if let Some(language) = update.language {
        settings.language = language;
      }
      if let Some(time_format) = update.time_format {
        settings.time_format = time_format;
      }
      if let Some(channels) = update.notifications {
        settings.notifications = channels;
      }
    }
    Action::SetProfessors(items) => data.professors = items,
    Action::AddProfessor(item) => data.professors.push(item),
    Action::UpdateProfessor(patch) => merge_by_id(&mut data.professors, patch),
    Action::DeleteProfessor(id) => data.professors.retain(|p| p.id != id),
    Action::SetSubjects(items) => data.subjects = items,
    Action::AddSubject(item) => data.subjects.push(item),
    Action::UpdateSubject(patch) => merge_by_id(&mut data.subjects, patch),
    Action::DeleteSubject(id) => data.subjects.retain(|s| s.id != id),
    Action::SetSchedules(items) => data.schedules = items,
    Action::AddSchedule(item) => data.schedules.push(item),
    Action::UpdateSchedule(patch) => merge_by_id(&mut data.schedules, patch),
    Action::DeleteSchedule(id) => data.schedules.retain(|s| s.id != id),
    Action::SetHours(items) => data.hours = items,
    Action::AddHourAssignment(item) => data.hours.push(item),
    Action::UpdateHourAssignment(patch) => merge_by_id(&mut data.hours, patch),
    Action::DeleteHourAssignment(id) => data.hours.retain(|h| h.id != id),
    Action::RecomputeStats => {}
  }

  if recompute {
    next.app_data.stats = Stats::compute(&next.app_data);
  }
  next
}

/// Merge the fields of `patch` over the item whose id matches `patch.id`.
/// A patch that would not deserialize back into `T` is dropped.
fn merge_by_id<T: Resource>(items: &mut [T], patch: Value) {
  let Value::Object(changes) = patch else {
    warn!("ignoring non-object update");
    return;
  };
  let Some(id) = changes.get("id").and_then(Value::as_str).map(String::from) else {
    warn!("ignoring update without id");
    return;
  };
  let Some(item) = items.iter_mut().find(|item| item.id() == id.as_str()) else {
    return;
  };

  let mut fields = match serde_json::to_value(&*item) {
    Ok(Value::Object(fields)) => fields,
    _ => return,
  };
  fields.extend(changes);
  match serde_json::from_value(Value::Object(fields)) {
    Ok(merged) => *item = merged,
    Err(e) => warn!(id = %id, error = %e, "ignoring update that does not fit the record"),
  }
}

/// Owner of the current [`AppState`].
pub struct Store {
  state: watch::Sender<AppState>,
  persistence: Option<Arc<dyn KeyValueStore>>,
}

impl Default for Store {
  fn default() -> Self {
    Self::new(AppState::default())
  }
}

impl Store {
  pub fn new(initial: AppState) -> Self {
    let (state, _) = watch::channel(initial);
    Self {
      state,
      persistence: None,
    }
  }

  /// Store whose theme and settings survive restarts.
  pub fn persistent(kv: Arc<dyn KeyValueStore>) -> Result<Self, StorageError> {
    let mut initial = AppState::default();
    if let Some(theme) = kv.get_json::<Theme>(THEME_KEY)? {
      initial.theme = theme;
    }
    if let Some(settings) = kv.get_json::<Settings>(SETTINGS_KEY)? {
      initial.settings = settings;
    }
    let mut store = Self::new(initial);
    store.persistence = Some(kv);
    Ok(store)
  }

  pub fn state(&self) -> AppState {
    self.state.borrow().clone()
  }

  pub fn subscribe(&self) -> watch::Receiver<AppState> {
    self.state.subscribe()
  }

  pub fn dispatch(&self, action: Action) {
    let persist = matches!(
      action,
      Action::SetTheme(_) | Action::ToggleTheme | Action::UpdateSettings(_)
    );
    self.state.send_modify(|state| *state = reduce(state, action));

    if persist {
      if let Err(e) = self.persist() {
        warn!(error = %e, "failed to save preferences");
      }
    }
  }

  /// Queue a user-facing notification stamped with the current time.
  pub fn notify(&self, level: NotificationLevel, title: Option<String>, message: impl Into<String>) {
    self.dispatch(Action::AddNotification {
      level,
      title,
      message: message.into(),
      at: Utc::now(),
    });
  }

  pub fn stats(&self) -> Stats {
    self.state.borrow().app_data.stats
  }

  fn persist(&self) -> Result<(), StorageError> {
    let Some(kv) = &self.persistence else {
      return Ok(());
    };
    let (theme, settings) = {
      let state = self.state.borrow();
      (state.theme, state.settings.clone())
    };
    kv.set_json(THEME_KEY, &theme)?;
    kv.set_json(SETTINGS_KEY, &settings)
  }
}
