//! Storage seam.
//!
//! Every component receives a [`SharedStore`] at construction. Roster
//! mutations are single conditional operations on the backing store so the
//! capacity invariant holds across any number of server processes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::data::class::{ClassSection, ClassStatus, ClassUpdate};
use crate::data::record::{
    AttendanceRecord, Holiday, PerformanceRecord, Remark, ScheduleChange,
};
use crate::data::user::{User, UserUpdate};
use crate::data::Id;
use crate::resp::problem::{problems, Problem};
use crate::role::Role;

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("store is unavailable: {0}")]
    Unavailable(String),
    #[error("duplicate value for '{0}'")]
    Duplicate(String),
    #[error("stored document is corrupt: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for Problem {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(field) => problems::duplicate(field),
            StoreError::Corrupt(detail) => {
                tracing::error!("corrupt document: {}", detail);
                problems::internal("Stored data couldn't be read.")
            }
            other => {
                tracing::warn!("store failure: {}", other);
                problems::store_unavailable(other)
            }
        }
    }
}

/// Bounds `fut` by `timeout`. An expired deadline says nothing about whether
/// the operation took effect, callers only get [`StoreError::Timeout`].
pub async fn with_deadline<T, F>(timeout: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(timeout)),
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClassFilter {
    pub faculty_id: Option<Id>,
    pub student_id: Option<Id>,
    pub status: Option<ClassStatus>,
    pub open_seats_only: bool,
}

impl ClassFilter {
    pub fn all() -> ClassFilter {
        ClassFilter::default()
    }

    pub fn taught_by(mut self, faculty: Id) -> ClassFilter {
        self.faculty_id = Some(faculty);
        self
    }

    pub fn attended_by(mut self, student: Id) -> ClassFilter {
        self.student_id = Some(student);
        self
    }

    pub fn with_status(mut self, status: ClassStatus) -> ClassFilter {
        self.status = Some(status);
        self
    }

    pub fn with_open_seats(mut self) -> ClassFilter {
        self.open_seats_only = true;
        self
    }

    pub fn matches(&self, class: &ClassSection) -> bool {
        self.faculty_id.map_or(true, |it| class.faculty_id == it)
            && self.student_id.map_or(true, |it| class.is_enrolled(it))
            && self.status.map_or(true, |it| class.status == it)
            && (!self.open_seats_only || class.has_open_seat())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub class_ids: Option<Vec<Id>>,
    pub student_id: Option<Id>,
}

impl RecordFilter {
    pub fn for_class(class: Id) -> RecordFilter {
        RecordFilter {
            class_ids: Some(vec![class]),
            student_id: None,
        }
    }

    pub fn for_classes(classes: Vec<Id>) -> RecordFilter {
        RecordFilter {
            class_ids: Some(classes),
            student_id: None,
        }
    }

    pub fn for_student(student: Id) -> RecordFilter {
        RecordFilter {
            class_ids: None,
            student_id: Some(student),
        }
    }

    pub fn in_class(mut self, class: Id) -> RecordFilter {
        self.class_ids = Some(vec![class]);
        self
    }

    pub fn matches_class(&self, class: Id) -> bool {
        self.class_ids
            .as_ref()
            .map_or(true, |ids| ids.contains(&class))
    }
}

#[rocket::async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] on a taken username or email.
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    async fn get_user(&self, id: Id) -> StoreResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn list_users(&self, role: Option<Role>) -> StoreResult<Vec<User>>;
    async fn users_by_ids(&self, ids: &[Id]) -> StoreResult<Vec<User>>;
    async fn update_user(&self, id: Id, update: &UserUpdate) -> StoreResult<Option<User>>;
    async fn delete_user(&self, id: Id) -> StoreResult<Option<User>>;
}

#[rocket::async_trait]
pub trait ClassStore: Send + Sync {
    async fn insert_class(&self, class: &ClassSection) -> StoreResult<()>;
    async fn get_class(&self, id: Id) -> StoreResult<Option<ClassSection>>;
    /// Newest classes first.
    async fn find_classes(&self, filter: &ClassFilter) -> StoreResult<Vec<ClassSection>>;
    /// `Ok(None)` when the class is missing or a capacity change wouldn't
    /// fit the current enrollment.
    async fn update_class(&self, id: Id, update: &ClassUpdate)
        -> StoreResult<Option<ClassSection>>;
    async fn delete_class(&self, id: Id) -> StoreResult<Option<ClassSection>>;

    /// Adds `student` only if the class is active, has an open seat and
    /// doesn't list the student yet, all in one atomic step. `Ok(None)`
    /// means the predicate didn't hold and nothing changed.
    async fn add_to_roster(&self, class: Id, student: Id) -> StoreResult<Option<ClassSection>>;
    /// Removes `student` only if currently enrolled. `Ok(None)` means
    /// nothing changed.
    async fn remove_from_roster(
        &self,
        class: Id,
        student: Id,
    ) -> StoreResult<Option<ClassSection>>;
    /// Removes `student` from every roster listing them. Returns the number
    /// of classes changed. Safe to repeat.
    async fn remove_from_all_rosters(&self, student: Id) -> StoreResult<u64>;
}

#[rocket::async_trait]
pub trait RecordStore: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] when the class already has a
    /// record for that date.
    async fn insert_attendance(&self, record: &AttendanceRecord) -> StoreResult<()>;
    async fn find_attendance(&self, filter: &RecordFilter) -> StoreResult<Vec<AttendanceRecord>>;

    async fn insert_performance(&self, record: &PerformanceRecord) -> StoreResult<()>;
    async fn find_performance(&self, filter: &RecordFilter)
        -> StoreResult<Vec<PerformanceRecord>>;

    async fn insert_remark(&self, remark: &Remark) -> StoreResult<()>;
    async fn find_remarks(&self, filter: &RecordFilter) -> StoreResult<Vec<Remark>>;

    async fn insert_schedule_change(&self, change: &ScheduleChange) -> StoreResult<()>;
    async fn find_schedule_changes(&self, filter: &RecordFilter)
        -> StoreResult<Vec<ScheduleChange>>;

    async fn insert_holiday(&self, holiday: &Holiday) -> StoreResult<()>;
    async fn list_holidays(&self) -> StoreResult<Vec<Holiday>>;
    async fn delete_holiday(&self, id: Id) -> StoreResult<bool>;
}

pub trait Store: UserStore + ClassStore + RecordStore {}

impl<T: UserStore + ClassStore + RecordStore> Store for T {}

pub type SharedStore = Arc<dyn Store>;

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::http::Status;

    #[tokio::test]
    async fn deadline_turns_into_timeout() {
        let result: StoreResult<()> = with_deadline(
            Duration::from_millis(10),
            std::future::pending::<StoreResult<()>>(),
        )
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(_)));

        let problem = Problem::from(err);
        assert_eq!(problem.status, Status::ServiceUnavailable);
        assert_eq!(problem.code, "store_unavailable");
        assert!(problem.is_retryable());
    }

    #[test]
    fn duplicates_are_conflicts() {
        let problem = Problem::from(StoreError::Duplicate("email".to_string()));
        assert_eq!(problem.status, Status::Conflict);
        assert_eq!(problem.code, "duplicate");
    }

    #[test]
    fn class_filter_combines_conditions() {
        let faculty = Id::new();
        let student = Id::new();
        let mut class = ClassSection::new("Chemistry", faculty, "Wednesday 08:00-09:00", 2);
        class.enrolled = vec![student];
        class.enrolled_count = 1;

        assert!(ClassFilter::all().matches(&class));
        assert!(ClassFilter::all()
            .taught_by(faculty)
            .attended_by(student)
            .with_status(ClassStatus::Active)
            .with_open_seats()
            .matches(&class));
        assert!(!ClassFilter::all().taught_by(Id::new()).matches(&class));
        assert!(!ClassFilter::all().attended_by(Id::new()).matches(&class));

        class.enrolled.push(Id::new());
        class.enrolled_count = 2;
        assert!(!ClassFilter::all().with_open_seats().matches(&class));
    }
}
