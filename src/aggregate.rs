//! Read-only views joining classes, users and records.
//!
//! Every view is a typed projection. User data only ever enters a view as a
//! [`UserSummary`], so credential hashes can't leak through here.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rocket::http::Status;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::data::class::{ClassResponse, ClassSection, ClassStatus, ClassSummary};
use crate::data::record::{
    newest_first, AttendanceEntry, AttendanceStatus, HolidayResponse, PerformanceEntry,
    PerformanceRecord, Record, RemarkEntry, ScheduleChangeEntry, StudentAttendanceEntry,
};
use crate::data::user::UserSummary;
use crate::data::Id;
use crate::resp::problem::{problems, Problem};
use crate::role::Role;
use crate::store::{
    ClassFilter, ClassStore, RecordFilter, RecordStore, SharedStore, StoreError, UserStore,
};
use crate::util::parse_date;

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("invalid date range: {0}")]
    InvalidDateRange(String),
    #[error("class {0} doesn't exist")]
    ClassNotFound(Id),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AggregateError> for Problem {
    fn from(err: AggregateError) -> Self {
        match err {
            AggregateError::InvalidDateRange(detail) => Problem::new(
                Status::BadRequest,
                "invalid_date_range",
                "Invalid date range.",
            )
            .detail(detail)
            .to_owned(),
            AggregateError::ClassNotFound(class) => problems::not_found("Class", class),
            AggregateError::Store(e) => e.into(),
        }
    }
}

pub type AggregateResult<T> = Result<T, AggregateError>;

/// Inclusive `[start, end]` filter on record dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// `None` when neither bound is given. A single bound, an unparsable
    /// bound or a reversed range is an error, never an ignored filter.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> AggregateResult<Option<DateRange>> {
        let (start, end) = match (start, end) {
            (None, None) => return Ok(None),
            (Some(start), Some(end)) => (start, end),
            _ => {
                return Err(AggregateError::InvalidDateRange(
                    "Both startDate and endDate are required.".to_string(),
                ))
            }
        };

        let parsed_start = parse_date(start, false).ok_or_else(|| {
            AggregateError::InvalidDateRange(format!("'{}' isn't a valid startDate.", start))
        })?;
        let parsed_end = parse_date(end, true).ok_or_else(|| {
            AggregateError::InvalidDateRange(format!("'{}' isn't a valid endDate.", end))
        })?;

        if parsed_start > parsed_end {
            return Err(AggregateError::InvalidDateRange(
                "startDate is after endDate.".to_string(),
            ));
        }

        Ok(Some(DateRange {
            start: parsed_start,
            end: parsed_end,
        }))
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

fn within<R: Record>(records: Vec<R>, range: Option<DateRange>) -> Vec<R> {
    let mut records: Vec<R> = records
        .into_iter()
        .filter(|it| range.map_or(true, |r| r.contains(it.date())))
        .collect();
    newest_first(&mut records);
    records
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceStats {
    pub average_score: f64,
    /// Total score over total possible marks, times 100.
    pub average_percentage: f64,
    pub assessment_count: usize,
}

impl PerformanceStats {
    pub fn of<'a>(records: impl IntoIterator<Item = &'a PerformanceRecord>) -> PerformanceStats {
        let (mut score, mut possible, mut count) = (0.0, 0.0, 0usize);
        for record in records {
            score += record.score;
            possible += record.total_marks;
            count += 1;
        }

        PerformanceStats {
            average_score: if count == 0 { 0.0 } else { score / count as f64 },
            average_percentage: if possible > 0.0 {
                score / possible * 100.0
            } else {
                0.0
            },
            assessment_count: count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ClassPerformance {
    pub records: Vec<PerformanceEntry>,
    pub statistics: PerformanceStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StudentPerformance {
    pub records: Vec<PerformanceEntry>,
    /// Keyed by class id.
    #[schema(value_type = Object)]
    pub statistics: BTreeMap<Id, PerformanceStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassEnrollment {
    pub id: Id,
    pub name: String,
    pub enrolled: u32,
    pub capacity: u32,
}

/// Admin dashboard counters. With a range, only users and classes created
/// inside it are counted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    #[schema(value_type = Object)]
    pub users_by_role: BTreeMap<String, usize>,
    #[schema(value_type = Object)]
    pub classes_by_status: BTreeMap<String, usize>,
    pub total_users: usize,
    /// Students plus faculty.
    pub active_users: usize,
    pub total_classes: usize,
    pub total_enrollments: u64,
    pub total_capacity: u64,
    /// Mean roster size over active classes.
    pub average_class_size: f64,
    /// Active classes only.
    pub class_enrollment: Vec<ClassEnrollment>,
}

#[derive(Clone)]
pub struct Aggregator {
    store: SharedStore,
}

impl Aggregator {
    pub fn new(store: SharedStore) -> Aggregator {
        Aggregator { store }
    }

    async fn summaries(&self, ids: &[Id]) -> AggregateResult<HashMap<Id, UserSummary>> {
        let mut unique = ids.to_vec();
        unique.sort();
        unique.dedup();

        Ok(self
            .store
            .users_by_ids(&unique)
            .await?
            .iter()
            .map(|it| (it.id, UserSummary::from(it)))
            .collect())
    }

    async fn class_map(&self, filter: &ClassFilter) -> AggregateResult<HashMap<Id, ClassSection>> {
        Ok(self
            .store
            .find_classes(filter)
            .await?
            .into_iter()
            .map(|it| (it.id, it))
            .collect())
    }

    async fn require_class(&self, class: Id) -> AggregateResult<ClassSection> {
        self.store
            .get_class(class)
            .await?
            .ok_or(AggregateError::ClassNotFound(class))
    }

    pub async fn class_view(&self, class: Id) -> AggregateResult<ClassResponse> {
        let class = self.require_class(class).await?;
        let faculty = self
            .store
            .get_user(class.faculty_id)
            .await?
            .map(|it| UserSummary::from(&it));
        Ok(ClassResponse::new(class, faculty))
    }

    /// Classes with their faculty joined in, newest first.
    pub async fn class_views(&self, filter: &ClassFilter) -> AggregateResult<Vec<ClassResponse>> {
        let classes = self.store.find_classes(filter).await?;
        let faculty_ids: Vec<Id> = classes.iter().map(|it| it.faculty_id).collect();
        let faculty = self.summaries(&faculty_ids).await?;

        Ok(classes
            .into_iter()
            .map(|it| {
                let owner = faculty.get(&it.faculty_id).cloned();
                ClassResponse::new(it, owner)
            })
            .collect())
    }

    /// Every class the faculty owns, newest first.
    pub async fn faculty_classes(&self, faculty: Id) -> AggregateResult<Vec<ClassResponse>> {
        self.class_views(&ClassFilter::all().taught_by(faculty)).await
    }

    /// Active classes the faculty teaches.
    pub async fn faculty_schedule(&self, faculty: Id) -> AggregateResult<Vec<ClassSummary>> {
        self.schedule(
            &ClassFilter::all()
                .taught_by(faculty)
                .with_status(ClassStatus::Active),
        )
        .await
    }

    /// Active classes the student is enrolled in.
    pub async fn student_schedule(&self, student: Id) -> AggregateResult<Vec<ClassSummary>> {
        self.schedule(
            &ClassFilter::all()
                .attended_by(student)
                .with_status(ClassStatus::Active),
        )
        .await
    }

    async fn schedule(&self, filter: &ClassFilter) -> AggregateResult<Vec<ClassSummary>> {
        Ok(self
            .store
            .find_classes(filter)
            .await?
            .iter()
            .map(ClassSummary::from)
            .collect())
    }

    /// Every class listing the student, whatever its status.
    pub async fn student_enrollments(&self, student: Id) -> AggregateResult<Vec<ClassResponse>> {
        self.class_views(&ClassFilter::all().attended_by(student))
            .await
    }

    pub async fn class_attendance(
        &self,
        class: Id,
        range: Option<DateRange>,
    ) -> AggregateResult<Vec<AttendanceEntry>> {
        self.require_class(class).await?;
        let records = within(
            self.store
                .find_attendance(&RecordFilter::for_class(class))
                .await?,
            range,
        );

        let ids: Vec<Id> = records
            .iter()
            .flat_map(|it| it.present.iter().chain(it.absent.iter()).copied())
            .collect();
        let users = self.summaries(&ids).await?;
        let resolve = |ids: &[Id]| -> Vec<UserSummary> {
            ids.iter().filter_map(|it| users.get(it).cloned()).collect()
        };

        Ok(records
            .into_iter()
            .map(|it| AttendanceEntry {
                id: it.id,
                class_id: it.class_id,
                date: it.date,
                present: resolve(&it.present),
                absent: resolve(&it.absent),
            })
            .collect())
    }

    pub async fn student_attendance(
        &self,
        student: Id,
        class: Option<Id>,
        range: Option<DateRange>,
    ) -> AggregateResult<Vec<StudentAttendanceEntry>> {
        let mut filter = RecordFilter::for_student(student);
        if let Some(class) = class {
            filter = filter.in_class(class);
        }
        let records = within(self.store.find_attendance(&filter).await?, range);
        let classes = self.class_map(&ClassFilter::all()).await?;

        Ok(records
            .into_iter()
            .filter_map(|it| {
                let class = classes.get(&it.class_id)?;
                let status = if it.present.contains(&student) {
                    AttendanceStatus::Present
                } else {
                    AttendanceStatus::Absent
                };
                Some(StudentAttendanceEntry {
                    id: it.id,
                    class: ClassSummary::from(class),
                    date: it.date,
                    status,
                })
            })
            .collect())
    }

    pub async fn class_performance(
        &self,
        class: Id,
        range: Option<DateRange>,
    ) -> AggregateResult<ClassPerformance> {
        self.require_class(class).await?;
        let records = within(
            self.store
                .find_performance(&RecordFilter::for_class(class))
                .await?,
            range,
        );

        let statistics = PerformanceStats::of(&records);
        let ids: Vec<Id> = records.iter().map(|it| it.student_id).collect();
        let students = self.summaries(&ids).await?;

        Ok(ClassPerformance {
            records: records
                .into_iter()
                .map(|it| {
                    let student = students.get(&it.student_id).cloned();
                    PerformanceEntry::new(it, student)
                })
                .collect(),
            statistics,
        })
    }

    pub async fn student_performance(
        &self,
        student: Id,
        class: Option<Id>,
        range: Option<DateRange>,
    ) -> AggregateResult<StudentPerformance> {
        let mut filter = RecordFilter::for_student(student);
        if let Some(class) = class {
            filter = filter.in_class(class);
        }
        let classes = self.class_map(&ClassFilter::all()).await?;
        let records: Vec<PerformanceRecord> = within(
            self.store.find_performance(&filter).await?,
            range,
        )
        .into_iter()
        .filter(|it| classes.contains_key(&it.class_id))
        .collect();

        let mut grouped: BTreeMap<Id, Vec<&PerformanceRecord>> = BTreeMap::new();
        for record in &records {
            grouped.entry(record.class_id).or_default().push(record);
        }
        let statistics = grouped
            .into_iter()
            .map(|(class, records)| (class, PerformanceStats::of(records)))
            .collect();

        Ok(StudentPerformance {
            records: records
                .into_iter()
                .map(|it| PerformanceEntry::new(it, None))
                .collect(),
            statistics,
        })
    }

    pub async fn student_remarks(&self, student: Id) -> AggregateResult<Vec<RemarkEntry>> {
        let remarks = within(
            self.store
                .find_remarks(&RecordFilter::for_student(student))
                .await?,
            None,
        );
        let classes = self.class_map(&ClassFilter::all()).await?;
        let faculty_ids: Vec<Id> = remarks.iter().map(|it| it.faculty_id).collect();
        let faculty = self.summaries(&faculty_ids).await?;

        Ok(remarks
            .into_iter()
            .filter_map(|it| {
                let class = classes.get(&it.class_id)?;
                Some(RemarkEntry {
                    id: it.id,
                    class: ClassSummary::from(class),
                    faculty: faculty.get(&it.faculty_id).cloned(),
                    content: it.content,
                    created_at: it.created_at,
                })
            })
            .collect())
    }

    /// Schedule changes of every class the faculty owns.
    pub async fn schedule_changes(&self, faculty: Id) -> AggregateResult<Vec<ScheduleChangeEntry>> {
        let classes = self.class_map(&ClassFilter::all().taught_by(faculty)).await?;
        if classes.is_empty() {
            return Ok(Vec::new());
        }

        let filter = RecordFilter::for_classes(classes.keys().copied().collect());
        let changes = within(self.store.find_schedule_changes(&filter).await?, None);

        Ok(changes
            .into_iter()
            .filter_map(|it| {
                let class = ClassSummary::from(classes.get(&it.class_id)?);
                Some(ScheduleChangeEntry::new(it, class))
            })
            .collect())
    }

    pub async fn holidays(&self, range: Option<DateRange>) -> AggregateResult<Vec<HolidayResponse>> {
        let mut holidays: Vec<_> = self
            .store
            .list_holidays()
            .await?
            .into_iter()
            .filter(|it| range.map_or(true, |r| r.contains(it.date)))
            .collect();
        holidays.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(holidays.into_iter().map(HolidayResponse::from).collect())
    }

    pub async fn statistics(&self, range: Option<DateRange>) -> AggregateResult<Statistics> {
        let created = |at: DateTime<Utc>| range.map_or(true, |r: DateRange| r.contains(at));
        let users: Vec<_> = self
            .store
            .list_users(None)
            .await?
            .into_iter()
            .filter(|it| created(it.created_at))
            .collect();
        let mut classes: Vec<_> = self
            .store
            .find_classes(&ClassFilter::all())
            .await?
            .into_iter()
            .filter(|it| created(it.created_at))
            .collect();
        classes.sort_by(|a, b| a.name.cmp(&b.name));

        let mut stats = Statistics {
            total_users: users.len(),
            total_classes: classes.len(),
            ..Default::default()
        };
        for role in Role::ALL {
            stats.users_by_role.insert(role.to_string(), 0);
        }
        for status in ClassStatus::ALL {
            stats.classes_by_status.insert(status.to_string(), 0);
        }

        for user in &users {
            *stats.users_by_role.entry(user.role.to_string()).or_default() += 1;
            if user.role != Role::Admin {
                stats.active_users += 1;
            }
        }
        for class in &classes {
            *stats
                .classes_by_status
                .entry(class.status.to_string())
                .or_default() += 1;
            stats.total_enrollments += u64::from(class.enrolled_count);
            stats.total_capacity += u64::from(class.capacity);

            if class.status == ClassStatus::Active {
                stats.class_enrollment.push(ClassEnrollment {
                    id: class.id,
                    name: class.name.clone(),
                    enrolled: class.enrolled_count,
                    capacity: class.capacity,
                });
            }
        }

        if !stats.class_enrollment.is_empty() {
            let enrolled: u64 = stats
                .class_enrollment
                .iter()
                .map(|it| u64::from(it.enrolled))
                .sum();
            stats.average_class_size = enrolled as f64 / stats.class_enrollment.len() as f64;
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::data::record::{AttendanceRecord, Remark};
    use crate::enrollment::EnrollmentManager;
    use crate::testing::{add_user, memory_store};

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, d, 9, 0, 0).unwrap()
    }

    fn score(class: Id, student: Id, name: &str, score: f64, total: f64, d: u32) -> PerformanceRecord {
        PerformanceRecord {
            id: Id::new(),
            class_id: class,
            student_id: student,
            assessment_name: name.to_string(),
            score,
            total_marks: total,
            date: day(d),
            created_at: day(d),
        }
    }

    #[test]
    fn date_ranges_need_both_valid_ordered_bounds() {
        assert_eq!(DateRange::parse(None, None).unwrap(), None);

        let range = DateRange::parse(Some("2024-04-01"), Some("2024-04-01"))
            .unwrap()
            .unwrap();
        assert!(range.contains(day(1)));
        assert!(!range.contains(day(2)));

        for (start, end) in [
            (Some("2024-04-01"), None),
            (None, Some("2024-04-01")),
            (Some("yesterday"), Some("2024-04-01")),
            (Some("2024-04-03"), Some("2024-04-01")),
        ] {
            let err = DateRange::parse(start, end).unwrap_err();
            assert_eq!(Problem::from(err).code, "invalid_date_range");
        }
    }

    #[test]
    fn stats_use_total_marks_for_percentage() {
        let class = Id::new();
        let student = Id::new();
        let records = [
            score(class, student, "quiz", 5.0, 10.0, 1),
            score(class, student, "exam", 45.0, 90.0, 2),
        ];

        let stats = PerformanceStats::of(&records);
        assert_eq!(stats.assessment_count, 2);
        assert!((stats.average_score - 25.0).abs() < 1e-9);
        assert!((stats.average_percentage - 50.0).abs() < 1e-9);

        let empty = PerformanceStats::of(&[]);
        assert_eq!(empty.assessment_count, 0);
        assert_eq!(empty.average_percentage, 0.0);
    }

    #[tokio::test]
    async fn class_views_join_faculty_without_hash() {
        let store = memory_store();
        let faculty = add_user(&store, "prof", Role::Faculty).await;
        let manager = EnrollmentManager::new(store.clone());
        let class = manager
            .create_class("Ethics".into(), faculty.id, "Monday 10:00-11:00".into(), 2)
            .await
            .unwrap();

        let view = Aggregator::new(store).class_view(class.id).await.unwrap();
        assert_eq!(view.faculty.as_ref().map(|it| it.id), Some(faculty.id));

        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains(&faculty.pw_hash.to_string()));
        assert!(!json.contains("pwHash"));
    }

    #[tokio::test]
    async fn schedules_follow_roster_and_status() {
        let store = memory_store();
        let faculty = add_user(&store, "prof", Role::Faculty).await;
        let student = add_user(&store, "pupil", Role::Student).await;
        let manager = EnrollmentManager::new(store.clone());
        let aggregator = Aggregator::new(store.clone());

        let mut ids = Vec::new();
        for name in ["One", "Two"] {
            let class = manager
                .create_class(name.into(), faculty.id, "Tuesday 08:00-09:00".into(), 5)
                .await
                .unwrap();
            manager.join(class.id, student.id).await.unwrap();
            ids.push(class.id);
        }
        manager
            .update_class(
                ids[0],
                &crate::data::class::ClassUpdate {
                    status: Some(ClassStatus::Completed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(aggregator.student_schedule(student.id).await.unwrap().len(), 1);
        assert_eq!(aggregator.student_enrollments(student.id).await.unwrap().len(), 2);
        assert_eq!(aggregator.faculty_schedule(faculty.id).await.unwrap().len(), 1);
        assert_eq!(aggregator.faculty_classes(faculty.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn attendance_is_filtered_and_newest_first() {
        let store = memory_store();
        let faculty = add_user(&store, "prof", Role::Faculty).await;
        let student = add_user(&store, "pupil", Role::Student).await;
        let class = EnrollmentManager::new(store.clone())
            .create_class("Art".into(), faculty.id, "Friday 15:00-16:00".into(), 5)
            .await
            .unwrap();

        for d in [1, 3, 2] {
            store
                .insert_attendance(&AttendanceRecord {
                    id: Id::new(),
                    class_id: class.id,
                    date: day(d),
                    present: if d == 2 { vec![] } else { vec![student.id] },
                    absent: if d == 2 { vec![student.id] } else { vec![] },
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let aggregator = Aggregator::new(store);
        let all = aggregator.class_attendance(class.id, None).await.unwrap();
        let dates: Vec<_> = all.iter().map(|it| it.date).collect();
        assert_eq!(dates, vec![day(3), day(2), day(1)]);
        assert_eq!(all[0].present[0].username, "pupil");

        let range = DateRange::parse(Some("2024-04-02"), Some("2024-04-03")).unwrap();
        let mine = aggregator
            .student_attendance(student.id, None, range)
            .await
            .unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].status, AttendanceStatus::Present);
        assert_eq!(mine[1].status, AttendanceStatus::Absent);
    }

    #[tokio::test]
    async fn performance_is_grouped_per_class() {
        let store = memory_store();
        let faculty = add_user(&store, "prof", Role::Faculty).await;
        let student = add_user(&store, "pupil", Role::Student).await;
        let manager = EnrollmentManager::new(store.clone());
        let a = manager
            .create_class("A".into(), faculty.id, "Monday".into(), 5)
            .await
            .unwrap()
            .id;
        let b = manager
            .create_class("B".into(), faculty.id, "Tuesday".into(), 5)
            .await
            .unwrap()
            .id;

        for record in [
            score(a, student.id, "a1", 8.0, 10.0, 1),
            score(a, student.id, "a2", 6.0, 10.0, 2),
            score(b, student.id, "b1", 30.0, 40.0, 3),
            score(b, Id::new(), "other", 1.0, 40.0, 3),
        ] {
            store.insert_performance(&record).await.unwrap();
        }

        let aggregator = Aggregator::new(store);
        let mine = aggregator.student_performance(student.id, None, None).await.unwrap();
        assert_eq!(mine.records.len(), 3);
        assert_eq!(mine.records[0].assessment_name, "b1");
        assert_eq!(mine.statistics[&a].assessment_count, 2);
        assert!((mine.statistics[&a].average_percentage - 70.0).abs() < 1e-9);
        assert!((mine.statistics[&b].average_percentage - 75.0).abs() < 1e-9);

        let range = DateRange::parse(Some("2024-04-02"), Some("2024-04-03")).unwrap();
        let recent = aggregator
            .student_performance(student.id, None, range)
            .await
            .unwrap();
        assert_eq!(recent.records.len(), 2);
        assert_eq!(recent.statistics[&a].assessment_count, 1);

        let class = aggregator.class_performance(b, None).await.unwrap();
        assert_eq!(class.statistics.assessment_count, 2);
        assert!(class.records.iter().any(|it| it.student.is_none()));
    }

    #[tokio::test]
    async fn orphaned_records_drop_out_of_views() {
        let store = memory_store();
        let faculty = add_user(&store, "prof", Role::Faculty).await;
        let student = add_user(&store, "pupil", Role::Student).await;
        let class = EnrollmentManager::new(store.clone())
            .create_class("Gone".into(), faculty.id, "Monday".into(), 5)
            .await
            .unwrap();

        store
            .insert_remark(&Remark {
                id: Id::new(),
                class_id: class.id,
                student_id: student.id,
                faculty_id: faculty.id,
                content: "Good work".to_string(),
                created_at: Utc::now() - Duration::days(1),
            })
            .await
            .unwrap();

        let aggregator = Aggregator::new(store.clone());
        assert_eq!(aggregator.student_remarks(student.id).await.unwrap().len(), 1);

        store.delete_class(class.id).await.unwrap();
        assert!(aggregator.student_remarks(student.id).await.unwrap().is_empty());
        assert!(matches!(
            aggregator.class_performance(class.id, None).await,
            Err(AggregateError::ClassNotFound(_))
        ));
    }

    #[tokio::test]
    async fn statistics_count_roles_and_seats() {
        let store = memory_store();
        let faculty = add_user(&store, "prof", Role::Faculty).await;
        let student = add_user(&store, "pupil", Role::Student).await;
        let manager = EnrollmentManager::new(store.clone());
        let class = manager
            .create_class("Stats".into(), faculty.id, "Monday".into(), 4)
            .await
            .unwrap();
        manager.join(class.id, student.id).await.unwrap();

        manager
            .create_class("Empty".into(), faculty.id, "Friday".into(), 6)
            .await
            .unwrap();

        let aggregator = Aggregator::new(store);
        let stats = aggregator.statistics(None).await.unwrap();
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.active_users, 2);
        assert_eq!(stats.users_by_role["admin"], 0);
        assert_eq!(stats.users_by_role["student"], 1);
        assert_eq!(stats.classes_by_status["active"], 2);
        assert_eq!(stats.total_enrollments, 1);
        assert_eq!(stats.total_capacity, 10);
        assert!((stats.average_class_size - 0.5).abs() < 1e-9);
        assert_eq!(stats.class_enrollment.len(), 2);
        assert_eq!(stats.class_enrollment[0].name, "Empty");
        assert_eq!(stats.class_enrollment[1].enrolled, 1);
    }

    #[tokio::test]
    async fn statistics_respect_creation_range() {
        let store = memory_store();
        add_user(&store, "prof", Role::Faculty).await;

        let aggregator = Aggregator::new(store);
        let past = DateRange::parse(Some("2001-01-01"), Some("2001-12-31")).unwrap();
        let stats = aggregator.statistics(past).await.unwrap();
        assert_eq!(stats.total_users, 0);
        assert_eq!(stats.users_by_role["faculty"], 0);
        assert_eq!(stats.average_class_size, 0.0);
        assert!(stats.class_enrollment.is_empty());
    }
}
