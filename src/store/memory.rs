//! In-process store for local runs and tests.
//!
//! One Tokio mutex guards all collections. Every trait method takes the lock
//! once, so conditional roster updates are as atomic as their MongoDB
//! counterparts.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    ClassFilter, ClassStore, RecordFilter, RecordStore, StoreError, StoreResult, UserStore,
};
use crate::data::class::{ClassSection, ClassUpdate};
use crate::data::record::{
    AttendanceRecord, Holiday, PerformanceRecord, Record, Remark, ScheduleChange,
};
use crate::data::user::{User, UserUpdate};
use crate::data::Id;
use crate::role::Role;

#[derive(Debug, Default)]
struct Collections {
    users: Vec<User>,
    classes: Vec<ClassSection>,
    attendance: Vec<AttendanceRecord>,
    performance: Vec<PerformanceRecord>,
    remarks: Vec<Remark>,
    schedule_changes: Vec<ScheduleChange>,
    holidays: Vec<Holiday>,
}

impl Collections {
    fn user_conflict(&self, id: Id, username: Option<&str>, email: Option<&str>) -> StoreResult<()> {
        for other in self.users.iter().filter(|it| it.id != id) {
            if username.map_or(false, |it| it == other.username) {
                return Err(StoreError::Duplicate("username".to_string()));
            }
            if email.map_or(false, |it| it == other.email) {
                return Err(StoreError::Duplicate("email".to_string()));
            }
        }
        Ok(())
    }

    fn class_mut(&mut self, id: Id) -> Option<&mut ClassSection> {
        self.classes.iter_mut().find(|it| it.id == id)
    }
}

fn select<R: Record + Clone>(records: &[R], filter: &RecordFilter) -> Vec<R> {
    records
        .iter()
        .filter(|it| filter.matches_class(it.class_id()))
        .filter(|it| filter.student_id.map_or(true, |s| it.involves(s)))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[rocket::async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.user_conflict(user.id, Some(&user.username), Some(&user.email))?;
        state.users.push(user.clone());
        Ok(())
    }

    async fn get_user(&self, id: Id) -> StoreResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|it| it.id == id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .iter()
            .find(|it| it.username == username)
            .cloned())
    }

    async fn list_users(&self, role: Option<Role>) -> StoreResult<Vec<User>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .iter()
            .filter(|it| role.map_or(true, |r| it.role == r))
            .cloned()
            .collect())
    }

    async fn users_by_ids(&self, ids: &[Id]) -> StoreResult<Vec<User>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .iter()
            .filter(|it| ids.contains(&it.id))
            .cloned()
            .collect())
    }

    async fn update_user(&self, id: Id, update: &UserUpdate) -> StoreResult<Option<User>> {
        let mut state = self.state.lock().await;
        state.user_conflict(id, update.username.as_deref(), update.email.as_deref())?;

        Ok(state.users.iter_mut().find(|it| it.id == id).map(|user| {
            update.apply(user);
            user.clone()
        }))
    }

    async fn delete_user(&self, id: Id) -> StoreResult<Option<User>> {
        let mut state = self.state.lock().await;
        let index = state.users.iter().position(|it| it.id == id);
        Ok(index.map(|i| state.users.remove(i)))
    }
}

#[rocket::async_trait]
impl ClassStore for MemoryStore {
    async fn insert_class(&self, class: &ClassSection) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.classes.push(class.clone());
        Ok(())
    }

    async fn get_class(&self, id: Id) -> StoreResult<Option<ClassSection>> {
        let state = self.state.lock().await;
        Ok(state.classes.iter().find(|it| it.id == id).cloned())
    }

    async fn find_classes(&self, filter: &ClassFilter) -> StoreResult<Vec<ClassSection>> {
        let state = self.state.lock().await;
        let mut found: Vec<ClassSection> = state
            .classes
            .iter()
            .filter(|it| filter.matches(it))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn update_class(
        &self,
        id: Id,
        update: &ClassUpdate,
    ) -> StoreResult<Option<ClassSection>> {
        let mut state = self.state.lock().await;
        Ok(match state.class_mut(id) {
            Some(class) if update.fits(class) => {
                update.apply(class);
                Some(class.clone())
            }
            _ => None,
        })
    }

    async fn delete_class(&self, id: Id) -> StoreResult<Option<ClassSection>> {
        let mut state = self.state.lock().await;
        let index = state.classes.iter().position(|it| it.id == id);
        Ok(index.map(|i| state.classes.remove(i)))
    }

    async fn add_to_roster(&self, class: Id, student: Id) -> StoreResult<Option<ClassSection>> {
        let mut state = self.state.lock().await;
        Ok(match state.class_mut(class) {
            Some(section) if section.admits(student) => {
                section.enrolled.push(student);
                section.enrolled_count += 1;
                section.updated_at = Utc::now();
                debug!(class = %class, count = section.enrolled_count, "roster grew");
                Some(section.clone())
            }
            _ => None,
        })
    }

    async fn remove_from_roster(
        &self,
        class: Id,
        student: Id,
    ) -> StoreResult<Option<ClassSection>> {
        let mut state = self.state.lock().await;
        Ok(match state.class_mut(class) {
            Some(section) if section.is_enrolled(student) => {
                section.enrolled.retain(|it| *it != student);
                section.enrolled_count -= 1;
                section.updated_at = Utc::now();
                debug!(class = %class, count = section.enrolled_count, "roster shrank");
                Some(section.clone())
            }
            _ => None,
        })
    }

    async fn remove_from_all_rosters(&self, student: Id) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut changed = 0;
        for section in state.classes.iter_mut().filter(|it| it.is_enrolled(student)) {
            section.enrolled.retain(|it| *it != student);
            section.enrolled_count -= 1;
            section.updated_at = now;
            changed += 1;
        }
        Ok(changed)
    }
}

#[rocket::async_trait]
impl RecordStore for MemoryStore {
    async fn insert_attendance(&self, record: &AttendanceRecord) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state
            .attendance
            .iter()
            .any(|it| it.class_id == record.class_id && it.date == record.date)
        {
            return Err(StoreError::Duplicate("date".to_string()));
        }
        state.attendance.push(record.clone());
        Ok(())
    }

    async fn find_attendance(&self, filter: &RecordFilter) -> StoreResult<Vec<AttendanceRecord>> {
        let state = self.state.lock().await;
        Ok(select(&state.attendance, filter))
    }

    async fn insert_performance(&self, record: &PerformanceRecord) -> StoreResult<()> {
        self.state.lock().await.performance.push(record.clone());
        Ok(())
    }

    async fn find_performance(
        &self,
        filter: &RecordFilter,
    ) -> StoreResult<Vec<PerformanceRecord>> {
        let state = self.state.lock().await;
        Ok(select(&state.performance, filter))
    }

    async fn insert_remark(&self, remark: &Remark) -> StoreResult<()> {
        self.state.lock().await.remarks.push(remark.clone());
        Ok(())
    }

    async fn find_remarks(&self, filter: &RecordFilter) -> StoreResult<Vec<Remark>> {
        let state = self.state.lock().await;
        Ok(select(&state.remarks, filter))
    }

    async fn insert_schedule_change(&self, change: &ScheduleChange) -> StoreResult<()> {
        self.state.lock().await.schedule_changes.push(change.clone());
        Ok(())
    }

    async fn find_schedule_changes(
        &self,
        filter: &RecordFilter,
    ) -> StoreResult<Vec<ScheduleChange>> {
        let state = self.state.lock().await;
        Ok(select(&state.schedule_changes, filter))
    }

    async fn insert_holiday(&self, holiday: &Holiday) -> StoreResult<()> {
        self.state.lock().await.holidays.push(holiday.clone());
        Ok(())
    }

    async fn list_holidays(&self) -> StoreResult<Vec<Holiday>> {
        Ok(self.state.lock().await.holidays.clone())
    }

    async fn delete_holiday(&self, id: Id) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.holidays.len();
        state.holidays.retain(|it| it.id != id);
        Ok(state.holidays.len() != before)
    }
}
