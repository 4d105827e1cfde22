//! Domain records exchanged with the hours-management API.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

/// A record that lives in a remote collection and is identified by `id`.
pub trait Resource: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  fn id(&self) -> &str;
}

/// Collection paths used by the dashboard.
pub mod paths {
  pub const PROFESSORS: &str = "/professors";
  pub const SUBJECTS: &str = "/subjects";
  pub const SCHEDULES: &str = "/schedules";
  pub const HOURS: &str = "/hours";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Professor {
  pub id: String,
  pub first_name: String,
  pub last_name: String,
  pub email: String,
  pub department: String,
  #[serde(default)]
  pub specialization: Option<String>,
  #[serde(default)]
  pub phone: Option<String>,
  #[serde(default)]
  pub total_score: Option<f64>,
  #[serde(default = "active")]
  pub is_active: bool,
}

impl Professor {
  pub fn full_name(&self) -> String {
    format!("{} {}", self.first_name, self.last_name)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
  pub id: String,
  pub name: String,
  pub code: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub credits: u32,
  #[serde(default)]
  pub department: Option<String>,
  #[serde(default = "active")]
  pub is_active: bool,
}

/// A weekly time slot. `day_of_week` is 1 = Monday through 6 = Saturday.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
  pub day_of_week: u8,
  pub start_time: String,
  pub end_time: String,
  #[serde(default)]
  pub room: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
  pub id: String,
  #[serde(default)]
  pub professor_id: Option<String>,
  #[serde(default)]
  pub subject_id: Option<String>,
  #[serde(flatten)]
  pub slot: TimeSlot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourAssignment {
  pub id: String,
  pub professor_id: String,
  pub subject_id: String,
  #[serde(default)]
  pub semester: Option<String>,
  #[serde(default)]
  pub year: Option<i32>,
  pub assigned_hours: f64,
  #[serde(default)]
  pub score_value: Option<f64>,
  #[serde(default)]
  pub status: Option<String>,
  #[serde(default)]
  pub schedule: Option<TimeSlot>,
}

/// Untyped record for resources without a dedicated struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
  pub id: String,
  #[serde(flatten)]
  pub fields: Map<String, Value>,
}

impl Record {
  pub fn get(&self, field: &str) -> Option<&Value> {
    self.fields.get(field)
  }
}

fn active() -> bool {
  true
}

macro_rules! impl_resource {
  ($($ty:ty),*) => {
    $(
      impl Resource for $ty {
        fn id(&self) -> &str {
          &self.id
        }
      }
    )*
  };
}

impl_resource!(Professor, Subject, Schedule, HourAssignment, Record);

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_professor_from_api_shape() {
    let professor: Professor = serde_json::from_value(json!({
      "id": "1",
      "firstName": "Juan",
      "lastName": "Pérez",
      "email": "juan.perez@universidad.edu",
      "department": "Matemáticas",
      "totalScore": 95
    }))
    .unwrap();
    assert_eq!(professor.full_name(), "Juan Pérez");
    assert_eq!(professor.total_score, Some(95.0));
    assert!(professor.is_active);
  }

  #[test]
  fn test_schedule_flattens_slot() {
    let schedule: Schedule = serde_json::from_value(json!({
      "id": "4",
      "dayOfWeek": 2,
      "startTime": "10:00",
      "endTime": "12:00",
      "room": "Aula 3"
    }))
    .unwrap();
    assert_eq!(schedule.slot.day_of_week, 2);
    assert_eq!(schedule.id(), "4");
  }

  #[test]
  fn test_record_keeps_unknown_fields() {
    let record: Record = serde_json::from_value(json!({"id": "9", "room": "B2"})).unwrap();
    assert_eq!(record.get("room"), Some(&json!("B2")));
    assert_eq!(serde_json::to_value(&record).unwrap(), json!({"id": "9", "room": "B2"}));
  }
}
