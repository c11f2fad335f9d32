use bson::Bson;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::data::user::UserSummary;
use crate::data::Id;

pub mod db;

pub const CLASS_COLLECTION_NAME: &str = "classes";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ClassStatus {
    Active,
    Cancelled,
    Completed,
}

impl ClassStatus {
    pub const ALL: [ClassStatus; 3] = [
        ClassStatus::Active,
        ClassStatus::Cancelled,
        ClassStatus::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ClassStatus::Active => "active",
            ClassStatus::Cancelled => "cancelled",
            ClassStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for ClassStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ClassStatus> for Bson {
    fn from(status: ClassStatus) -> Self {
        Bson::String(status.as_str().to_string())
    }
}

/// Stored class document.
///
/// `enrolled` and `enrolled_count` are written together by every roster
/// mutation so that `enrolled_count == enrolled.len() <= capacity` holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSection {
    #[serde(rename = "_id")]
    pub id: Id,
    pub name: String,
    pub faculty_id: Id,
    pub schedule: String,
    pub capacity: u32,
    pub status: ClassStatus,
    #[serde(default)]
    pub enrolled: Vec<Id>,
    #[serde(default)]
    pub enrolled_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClassSection {
    pub fn new(
        name: impl ToString,
        faculty_id: Id,
        schedule: impl ToString,
        capacity: u32,
    ) -> ClassSection {
        let now = Utc::now();
        ClassSection {
            id: Id::new(),
            name: name.to_string(),
            faculty_id,
            schedule: schedule.to_string(),
            capacity,
            status: ClassStatus::Active,
            enrolled: Vec::new(),
            enrolled_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_enrolled(&self, student: Id) -> bool {
        self.enrolled.contains(&student)
    }

    pub fn has_open_seat(&self) -> bool {
        self.enrolled_count < self.capacity
    }

    /// The predicate the store evaluates atomically before adding `student`.
    pub fn admits(&self, student: Id) -> bool {
        self.status == ClassStatus::Active && self.has_open_seat() && !self.is_enrolled(student)
    }

    pub fn is_consistent(&self) -> bool {
        self.enrolled_count as usize == self.enrolled.len() && self.enrolled_count <= self.capacity
    }

    pub fn roster(&self) -> RosterSnapshot {
        RosterSnapshot {
            class_id: self.id,
            capacity: self.capacity,
            enrolled: self.enrolled.clone(),
            enrolled_count: self.enrolled_count,
        }
    }
}

/// Partial class update. A capacity change only applies while the current
/// enrollment still fits.
#[derive(Debug, Clone, Default)]
pub struct ClassUpdate {
    pub name: Option<String>,
    pub faculty_id: Option<Id>,
    pub schedule: Option<String>,
    pub capacity: Option<u32>,
    pub status: Option<ClassStatus>,
}

impl ClassUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.faculty_id.is_none()
            && self.schedule.is_none()
            && self.capacity.is_none()
            && self.status.is_none()
    }

    pub fn fits(&self, class: &ClassSection) -> bool {
        self.capacity
            .map_or(true, |capacity| class.enrolled_count <= capacity)
    }

    pub fn apply(&self, class: &mut ClassSection) {
        if let Some(name) = &self.name {
            class.name = name.clone();
        }
        if let Some(faculty_id) = self.faculty_id {
            class.faculty_id = faculty_id;
        }
        if let Some(schedule) = &self.schedule {
            class.schedule = schedule.clone();
        }
        if let Some(capacity) = self.capacity {
            class.capacity = capacity;
        }
        if let Some(status) = self.status {
            class.status = status;
        }
        class.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RosterSnapshot {
    pub class_id: Id,
    pub capacity: u32,
    pub enrolled: Vec<Id>,
    pub enrolled_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Enrolled,
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EnrollmentResponse {
    pub status: EnrollmentStatus,
    pub roster: RosterSnapshot,
}

/// Class projection with the owning faculty joined in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassResponse {
    pub id: Id,
    pub name: String,
    pub faculty_id: Id,
    pub faculty: Option<UserSummary>,
    pub schedule: String,
    pub capacity: u32,
    pub status: ClassStatus,
    pub enrolled: Vec<Id>,
    pub enrolled_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClassResponse {
    pub fn new(class: ClassSection, faculty: Option<UserSummary>) -> ClassResponse {
        ClassResponse {
            id: class.id,
            name: class.name,
            faculty_id: class.faculty_id,
            faculty,
            schedule: class.schedule,
            capacity: class.capacity,
            status: class.status,
            enrolled: class.enrolled,
            enrolled_count: class.enrolled_count,
            created_at: class.created_at,
            updated_at: class.updated_at,
        }
    }
}

/// Short class reference used inside record views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ClassSummary {
    pub id: Id,
    pub name: String,
    pub schedule: String,
}

impl From<&ClassSection> for ClassSummary {
    fn from(class: &ClassSection) -> Self {
        ClassSummary {
            id: class.id,
            name: class.name.clone(),
            schedule: class.schedule.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_only_active_classes_with_room() {
        let student = Id::new();
        let mut class = ClassSection::new("Algebra", Id::new(), "Mon 09:00", 1);
        assert!(class.admits(student));

        class.enrolled.push(Id::new());
        class.enrolled_count = 1;
        assert!(!class.admits(student), "class is full");
        assert!(class.is_consistent());

        class.capacity = 2;
        class.status = ClassStatus::Cancelled;
        assert!(!class.admits(student), "class isn't active");
    }

    #[test]
    fn capacity_update_must_fit_enrollment() {
        let mut class = ClassSection::new("Algebra", Id::new(), "Mon 09:00", 3);
        class.enrolled = vec![Id::new(), Id::new()];
        class.enrolled_count = 2;

        let shrink = ClassUpdate {
            capacity: Some(1),
            ..Default::default()
        };
        assert!(!shrink.fits(&class));

        let exact = ClassUpdate {
            capacity: Some(2),
            ..Default::default()
        };
        assert!(exact.fits(&class));
    }

    #[test]
    fn stored_shape_keeps_roster_fields() {
        let class = ClassSection::new("Algebra", Id::new(), "Mon 09:00", 3);
        let doc = bson::to_document(&class).unwrap();

        assert!(doc.contains_key("_id"));
        assert!(doc.contains_key("enrolled"));
        assert!(matches!(
            doc.get("enrolledCount"),
            Some(Bson::Int32(0)) | Some(Bson::Int64(0))
        ));
        assert_eq!(doc.get_str("status").ok(), Some("active"));
    }
}
