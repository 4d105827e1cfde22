//! Loads the four dashboard collections into the [`Store`].

use std::sync::Arc;
use tracing::{debug, info};

use crate::api::notification::NotificationReceiver;
use crate::api::{ApiError, QueryParams};
use crate::cache::{CacheOptions, CachedClient};
use crate::models::{paths, HourAssignment, Professor, Schedule, Subject};
use crate::store::{Action, Stats, Store};

/// Fetch professors, subjects, schedules and hours concurrently and replace
/// them in `store`. Nothing is dispatched unless all four succeed.
pub async fn load(client: &CachedClient, store: &Store, force: bool) -> Result<Stats, ApiError> {
  let params = QueryParams::new();
  let options = if force {
    CacheOptions::forced()
  } else {
    CacheOptions::default()
  };

  let (professors, subjects, schedules, hours) = futures::try_join!(
    client.fetch_list::<Professor>(paths::PROFESSORS, &params, options),
    client.fetch_list::<Subject>(paths::SUBJECTS, &params, options),
    client.fetch_list::<Schedule>(paths::SCHEDULES, &params, options),
    client.fetch_list::<HourAssignment>(paths::HOURS, &params, options),
  )?;

  debug!(
    professors = ?professors.source,
    subjects = ?subjects.source,
    schedules = ?schedules.source,
    hours = ?hours.source,
    "dashboard sources"
  );

  store.dispatch(Action::SetProfessors(professors.data));
  store.dispatch(Action::SetSubjects(subjects.data));
  store.dispatch(Action::SetSchedules(schedules.data));
  store.dispatch(Action::SetHours(hours.data));

  let stats = store.stats();
  info!(
    professors = stats.total_professors,
    subjects = stats.total_subjects,
    "dashboard loaded"
  );
  Ok(stats)
}

/// Copy executor notifications into the store until every sender is gone.
pub async fn forward_notifications(mut rx: NotificationReceiver, store: Arc<Store>) {
  while let Some(notification) = rx.recv().await {
    store.notify(notification.level, None, notification.message);
  }
}
