//! Roster ownership.
//!
//! Capacity checks never happen in process memory. `join` and `leave` are a
//! single conditional store operation each, and the follow-up read only
//! explains a refusal, it never decides one.

use rocket::http::Status;
use thiserror::Error;

use crate::data::class::{ClassSection, ClassStatus, ClassUpdate, RosterSnapshot};
use crate::data::user::User;
use crate::data::Id;
use crate::resp::problem::{problems, Problem};
use crate::role::Role;
use crate::store::{ClassFilter, ClassStore, SharedStore, StoreError, UserStore};

/// Conditional roster updates refused for no visible reason are retried this
/// many times before giving up.
const JOIN_ATTEMPTS: usize = 3;
const CASCADE_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum EnrollmentError {
    #[error("class {0} isn't open for enrollment")]
    ClassUnavailable(Id),
    #[error("class {0} is full")]
    ClassFull(Id),
    #[error("student {student} is already enrolled in class {class}")]
    AlreadyEnrolled { class: Id, student: Id },
    #[error("student {student} isn't enrolled in class {class}")]
    NotEnrolled { class: Id, student: Id },
    #[error("class {0} doesn't exist")]
    ClassNotFound(Id),
    #[error("user {0} doesn't exist")]
    UserNotFound(Id),
    #[error("faculty {faculty} still owns {count} active class(es)")]
    HasActiveClasses { faculty: Id, count: usize },
    #[error("class {class} has {enrolled} students, more than capacity {capacity}")]
    CapacityBelowEnrollment {
        class: Id,
        enrolled: u32,
        capacity: u32,
    },
    #[error("user {user} was deleted but roster cleanup failed: {source}")]
    CascadeFailed {
        user: Id,
        #[source]
        source: StoreError,
    },
    #[error("{0}")]
    InvalidInput(String),
    #[error("roster of class {0} kept changing, try again")]
    Contended(Id),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<EnrollmentError> for Problem {
    fn from(err: EnrollmentError) -> Self {
        match err {
            EnrollmentError::ClassUnavailable(class) => Problem::new(
                Status::NotFound,
                "class_unavailable",
                "Class isn't available for enrollment.",
            )
            .insert_str("classId", class)
            .to_owned(),
            EnrollmentError::ClassFull(class) => {
                Problem::new(Status::BadRequest, "class_full", "Class is full.")
                    .insert_str("classId", class)
                    .to_owned()
            }
            EnrollmentError::AlreadyEnrolled { class, .. } => Problem::new(
                Status::BadRequest,
                "already_enrolled",
                "Already enrolled in this class.",
            )
            .insert_str("classId", class)
            .to_owned(),
            EnrollmentError::NotEnrolled { class, .. } => Problem::new(
                Status::NotFound,
                "not_enrolled",
                "Not enrolled in this class.",
            )
            .insert_str("classId", class)
            .to_owned(),
            EnrollmentError::ClassNotFound(class) => problems::not_found("Class", class),
            EnrollmentError::UserNotFound(user) => problems::not_found("User", user),
            EnrollmentError::HasActiveClasses { faculty, count } => problems::conflict(
                "has_active_classes",
                "Faculty still owns active classes.",
            )
            .insert_str("userId", faculty)
            .insert("activeClasses", count)
            .to_owned(),
            EnrollmentError::CapacityBelowEnrollment {
                class,
                enrolled,
                capacity,
            } => problems::conflict(
                "capacity_below_enrollment",
                "Capacity can't drop below the current enrollment.",
            )
            .insert_str("classId", class)
            .insert("enrolledCount", enrolled)
            .insert("capacity", capacity)
            .to_owned(),
            EnrollmentError::CascadeFailed { user, source } => {
                tracing::error!("roster cleanup for deleted user {} failed: {}", user, source);
                Problem::new(
                    Status::InternalServerError,
                    "cascade_failed",
                    "User was deleted but couldn't be removed from every class roster.",
                )
                .insert_str("userId", user)
                .detail(source)
                .to_owned()
            }
            EnrollmentError::InvalidInput(detail) => problems::invalid_input(detail),
            EnrollmentError::Contended(class) => {
                problems::store_unavailable("The class roster is changing rapidly.")
                    .insert_str("classId", class)
                    .to_owned()
            }
            EnrollmentError::Store(e) => e.into(),
        }
    }
}

pub type EnrollmentResult<T> = Result<T, EnrollmentError>;

/// Owns the capacity invariant of every class.
#[derive(Clone)]
pub struct EnrollmentManager {
    store: SharedStore,
}

impl EnrollmentManager {
    pub fn new(store: SharedStore) -> EnrollmentManager {
        EnrollmentManager { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn join(&self, class: Id, student: Id) -> EnrollmentResult<RosterSnapshot> {
        let current = self
            .store
            .get_class(class)
            .await?
            .filter(|it| it.status == ClassStatus::Active)
            .ok_or(EnrollmentError::ClassUnavailable(class))?;
        if current.is_enrolled(student) {
            return Err(EnrollmentError::AlreadyEnrolled { class, student });
        }

        for attempt in 1..=JOIN_ATTEMPTS {
            if let Some(updated) = self.store.add_to_roster(class, student).await? {
                tracing::info!(
                    "student {} joined class {} ({}/{})",
                    student,
                    class,
                    updated.enrolled_count,
                    updated.capacity
                );
                return Ok(updated.roster());
            }

            match self.store.get_class(class).await? {
                Some(it) if it.is_enrolled(student) => {
                    return Err(EnrollmentError::AlreadyEnrolled { class, student })
                }
                Some(it) if it.status != ClassStatus::Active => {
                    return Err(EnrollmentError::ClassUnavailable(class))
                }
                None => return Err(EnrollmentError::ClassUnavailable(class)),
                Some(it) if !it.has_open_seat() => return Err(EnrollmentError::ClassFull(class)),
                Some(_) => {
                    tracing::debug!("join of class {} lost a race, attempt {}", class, attempt);
                }
            }
        }

        Err(EnrollmentError::Contended(class))
    }

    #[tracing::instrument(skip(self))]
    pub async fn leave(&self, class: Id, student: Id) -> EnrollmentResult<RosterSnapshot> {
        match self.store.remove_from_roster(class, student).await? {
            Some(updated) => {
                tracing::info!(
                    "student {} dropped class {} ({}/{})",
                    student,
                    class,
                    updated.enrolled_count,
                    updated.capacity
                );
                Ok(updated.roster())
            }
            None => Err(EnrollmentError::NotEnrolled { class, student }),
        }
    }

    pub async fn is_enrolled(&self, class: Id, student: Id) -> EnrollmentResult<bool> {
        Ok(self
            .store
            .get_class(class)
            .await?
            .map_or(false, |it| it.is_enrolled(student)))
    }

    async fn require_faculty(&self, faculty: Id) -> EnrollmentResult<User> {
        match self.store.get_user(faculty).await? {
            Some(user) if user.role == Role::Faculty => Ok(user),
            Some(_) => Err(EnrollmentError::InvalidInput(format!(
                "User {} isn't a faculty member.",
                faculty
            ))),
            None => Err(EnrollmentError::UserNotFound(faculty)),
        }
    }

    #[tracing::instrument(skip(self, name, schedule))]
    pub async fn create_class(
        &self,
        name: String,
        faculty: Id,
        schedule: String,
        capacity: u32,
    ) -> EnrollmentResult<ClassSection> {
        if capacity < 1 {
            return Err(EnrollmentError::InvalidInput(
                "Capacity must be at least 1.".to_string(),
            ));
        }
        self.require_faculty(faculty).await?;

        let class = ClassSection::new(name, faculty, schedule, capacity);
        self.store.insert_class(&class).await?;

        // Pairs with the re-check in `delete_user`: whichever write lands
        // second sees the other one and backs out.
        if self.store.get_user(faculty).await?.is_none() {
            tracing::debug!("faculty {} was deleted while creating class {}", faculty, class.id);
            self.store.delete_class(class.id).await?;
            return Err(EnrollmentError::UserNotFound(faculty));
        }

        tracing::info!("created class {} for faculty {}", class.id, faculty);
        Ok(class)
    }

    /// Applies `update`; a capacity change is conditional on the enrollment
    /// at the moment of the write.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_class(
        &self,
        class: Id,
        update: &ClassUpdate,
    ) -> EnrollmentResult<ClassSection> {
        if update.capacity == Some(0) {
            return Err(EnrollmentError::InvalidInput(
                "Capacity must be at least 1.".to_string(),
            ));
        }
        if let Some(faculty) = update.faculty_id {
            self.require_faculty(faculty).await?;
        }

        if let Some(updated) = self.store.update_class(class, update).await? {
            return Ok(updated);
        }

        match self.store.get_class(class).await? {
            None => Err(EnrollmentError::ClassNotFound(class)),
            Some(current) => Err(EnrollmentError::CapacityBelowEnrollment {
                class,
                enrolled: current.enrolled_count,
                capacity: update.capacity.unwrap_or(current.capacity),
            }),
        }
    }

    /// Deletes a user, refusing faculty with active classes and removing
    /// students from every roster afterwards.
    #[tracing::instrument(skip(self))]
    pub async fn delete_user(&self, user: Id) -> EnrollmentResult<User> {
        let existing = self
            .store
            .get_user(user)
            .await?
            .ok_or(EnrollmentError::UserNotFound(user))?;

        if existing.role == Role::Faculty {
            self.refuse_active_classes(user).await?;
        }

        let deleted = self
            .store
            .delete_user(user)
            .await?
            .ok_or(EnrollmentError::UserNotFound(user))?;

        // A class created for this faculty between the check and the delete
        // would be left without an owner.
        if deleted.role == Role::Faculty {
            if let Err(refused) = self.refuse_active_classes(user).await {
                tracing::warn!("faculty {} gained a class while being deleted, restoring", user);
                self.store.insert_user(&deleted).await?;
                return Err(refused);
            }
        }

        if deleted.role == Role::Student {
            self.cascade_student(user).await?;
        }

        tracing::info!("deleted {} {}", deleted.role, user);
        Ok(deleted)
    }

    async fn refuse_active_classes(&self, faculty: Id) -> EnrollmentResult<()> {
        let active = self
            .store
            .find_classes(
                &ClassFilter::all()
                    .taught_by(faculty)
                    .with_status(ClassStatus::Active),
            )
            .await?;
        if active.is_empty() {
            Ok(())
        } else {
            Err(EnrollmentError::HasActiveClasses {
                faculty,
                count: active.len(),
            })
        }
    }

    async fn cascade_student(&self, student: Id) -> EnrollmentResult<u64> {
        let mut last = None;
        for attempt in 1..=CASCADE_ATTEMPTS {
            match self.store.remove_from_all_rosters(student).await {
                Ok(changed) => {
                    tracing::debug!("removed student {} from {} roster(s)", student, changed);
                    return Ok(changed);
                }
                Err(e) => {
                    tracing::warn!(
                        "roster cleanup for student {} failed (attempt {}): {}",
                        student,
                        attempt,
                        e
                    );
                    last = Some(e);
                }
            }
        }

        Err(EnrollmentError::CascadeFailed {
            user: student,
            source: last.unwrap_or_else(|| StoreError::Unavailable("no attempt made".into())),
        })
    }
}
