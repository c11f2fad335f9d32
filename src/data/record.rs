//! Append-only records hanging off a class: attendance, performance,
//! remarks, the schedule change log and the holiday calendar.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::data::class::ClassSummary;
use crate::data::user::UserSummary;
use crate::data::Id;
use crate::resp::problem::{problems, Problem};
use crate::util::parse_date;

pub const ATTENDANCE_COLLECTION_NAME: &str = "attendance";
pub const PERFORMANCE_COLLECTION_NAME: &str = "performance";
pub const REMARK_COLLECTION_NAME: &str = "remarks";
pub const SCHEDULE_CHANGE_COLLECTION_NAME: &str = "schedule_changes";
pub const HOLIDAY_COLLECTION_NAME: &str = "holidays";

/// Anything that belongs to a class and sorts by a date.
pub trait Record {
    fn class_id(&self) -> Id;
    fn date(&self) -> DateTime<Utc>;

    /// Whether the record concerns `student` at all.
    fn involves(&self, student: Id) -> bool;
}

/// Sorts most recent first. Equal dates keep their incoming order.
pub fn newest_first<R: Record>(records: &mut [R]) {
    records.sort_by(|a, b| b.date().cmp(&a.date()));
}

pub(crate) fn parse_record_date(field: &str, value: &str) -> Result<DateTime<Utc>, Problem> {
    parse_date(value, false).ok_or_else(|| {
        problems::invalid_input(format!(
            "'{}' must be an RFC 3339 timestamp or a YYYY-MM-DD date.",
            field
        ))
        .insert_str("field", field)
        .to_owned()
    })
}

fn parse_student(value: &str) -> Result<Id, Problem> {
    value.parse().map_err(|_| problems::invalid_id("student", value))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    #[serde(rename = "_id")]
    pub id: Id,
    pub class_id: Id,
    pub date: DateTime<Utc>,
    pub present: Vec<Id>,
    pub absent: Vec<Id>,
    pub created_at: DateTime<Utc>,
}

impl Record for AttendanceRecord {
    fn class_id(&self) -> Id {
        self.class_id
    }

    fn date(&self) -> DateTime<Utc> {
        self.date
    }

    fn involves(&self, student: Id) -> bool {
        self.present.contains(&student) || self.absent.contains(&student)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRecord {
    #[serde(rename = "_id")]
    pub id: Id,
    pub class_id: Id,
    pub student_id: Id,
    pub assessment_name: String,
    pub score: f64,
    pub total_marks: f64,
    pub date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Record for PerformanceRecord {
    fn class_id(&self) -> Id {
        self.class_id
    }

    fn date(&self) -> DateTime<Utc> {
        self.date
    }

    fn involves(&self, student: Id) -> bool {
        self.student_id == student
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Remark {
    #[serde(rename = "_id")]
    pub id: Id,
    pub class_id: Id,
    pub student_id: Id,
    pub faculty_id: Id,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Record for Remark {
    fn class_id(&self) -> Id {
        self.class_id
    }

    fn date(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn involves(&self, student: Id) -> bool {
        self.student_id == student
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleChangeKind {
    Cancellation,
    Reschedule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleChange {
    #[serde(rename = "_id")]
    pub id: Id,
    pub class_id: Id,
    #[serde(rename = "type")]
    pub kind: ScheduleChangeKind,
    pub original_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_time: Option<String>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl ScheduleChange {
    pub fn cancellation(class_id: Id, date: DateTime<Utc>, reason: String) -> ScheduleChange {
        ScheduleChange {
            id: Id::new(),
            class_id,
            kind: ScheduleChangeKind::Cancellation,
            original_date: date,
            new_date: None,
            new_time: None,
            reason,
            created_at: Utc::now(),
        }
    }

    pub fn reschedule(
        class_id: Id,
        original_date: DateTime<Utc>,
        new_date: DateTime<Utc>,
        new_time: Option<String>,
        reason: String,
    ) -> ScheduleChange {
        ScheduleChange {
            id: Id::new(),
            class_id,
            kind: ScheduleChangeKind::Reschedule,
            original_date,
            new_date: Some(new_date),
            new_time: new_time.filter(|it| !it.trim().is_empty()),
            reason,
            created_at: Utc::now(),
        }
    }
}

impl Record for ScheduleChange {
    fn class_id(&self) -> Id {
        self.class_id
    }

    fn date(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn involves(&self, _: Id) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holiday {
    #[serde(rename = "_id")]
    pub id: Id,
    pub name: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
}

// Request payloads

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AttendanceData {
    pub date: String,
    #[serde(default)]
    pub present: Vec<String>,
    #[serde(default)]
    pub absent: Vec<String>,
}

impl AttendanceData {
    /// Builds the record, refusing ids listed as both present and absent.
    pub fn into_record(self, class_id: Id) -> Result<AttendanceRecord, Problem> {
        let date = parse_record_date("date", &self.date)?;
        let present = dedup(self.present.iter().map(|it| parse_student(it)))?;
        let absent = dedup(self.absent.iter().map(|it| parse_student(it)))?;

        let present_set: HashSet<&Id> = present.iter().collect();
        if let Some(both) = absent.iter().find(|it| present_set.contains(it)) {
            return Err(problems::invalid_input(
                "A student can't be both present and absent.",
            )
            .insert_str("studentId", both)
            .to_owned());
        }

        Ok(AttendanceRecord {
            id: Id::new(),
            class_id,
            date,
            present,
            absent,
            created_at: Utc::now(),
        })
    }
}

fn dedup(ids: impl Iterator<Item = Result<Id, Problem>>) -> Result<Vec<Id>, Problem> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for id in ids {
        let id = id?;
        if seen.insert(id) {
            out.push(id);
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceData {
    pub student_id: String,
    pub assessment_name: String,
    pub score: f64,
    pub total_marks: f64,
    pub date: String,
}

impl PerformanceData {
    pub fn into_record(self, class_id: Id) -> Result<PerformanceRecord, Problem> {
        let student_id = parse_student(&self.student_id)?;
        if self.assessment_name.trim().is_empty() {
            return Err(problems::invalid_input("'assessmentName' can't be empty."));
        }
        if !self.score.is_finite() || !self.total_marks.is_finite() || self.total_marks < 0.0 {
            return Err(problems::invalid_input(
                "'score' and 'totalMarks' must be finite and marks non-negative.",
            ));
        }
        let date = parse_record_date("date", &self.date)?;

        Ok(PerformanceRecord {
            id: Id::new(),
            class_id,
            student_id,
            assessment_name: self.assessment_name,
            score: self.score,
            total_marks: self.total_marks,
            date,
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemarkData {
    pub student_id: String,
    pub content: String,
}

impl RemarkData {
    pub fn into_remark(self, class_id: Id, faculty_id: Id) -> Result<Remark, Problem> {
        let student_id = parse_student(&self.student_id)?;
        if self.content.trim().is_empty() {
            return Err(problems::invalid_input("Remark content can't be empty."));
        }

        Ok(Remark {
            id: Id::new(),
            class_id,
            student_id,
            faculty_id,
            content: self.content,
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct HolidayData {
    pub name: String,
    pub date: String,
    #[serde(default)]
    pub description: String,
}

impl HolidayData {
    pub fn into_holiday(self) -> Result<Holiday, Problem> {
        if self.name.trim().is_empty() {
            return Err(problems::invalid_input("Holiday name can't be empty."));
        }
        let date = chrono::NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d")
            .ok()
            .and_then(|it| it.and_hms_opt(0, 0, 0))
            .map(|it| it.and_utc())
            .ok_or_else(|| problems::invalid_input("Holiday date must be YYYY-MM-DD."))?;

        Ok(Holiday {
            id: Id::new(),
            name: self.name,
            date,
            description: self.description,
            created_at: Utc::now(),
        })
    }
}

// Views

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEntry {
    pub id: Id,
    pub class_id: Id,
    pub date: DateTime<Utc>,
    pub present: Vec<UserSummary>,
    pub absent: Vec<UserSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudentAttendanceEntry {
    pub id: Id,
    pub class: ClassSummary,
    pub date: DateTime<Utc>,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceEntry {
    pub id: Id,
    pub class_id: Id,
    pub student: Option<UserSummary>,
    pub assessment_name: String,
    pub score: f64,
    pub total_marks: f64,
    pub date: DateTime<Utc>,
}

impl PerformanceEntry {
    pub fn new(record: PerformanceRecord, student: Option<UserSummary>) -> PerformanceEntry {
        PerformanceEntry {
            id: record.id,
            class_id: record.class_id,
            student,
            assessment_name: record.assessment_name,
            score: record.score,
            total_marks: record.total_marks,
            date: record.date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemarkEntry {
    pub id: Id,
    pub class: ClassSummary,
    pub faculty: Option<UserSummary>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleChangeEntry {
    pub id: Id,
    pub class: ClassSummary,
    #[serde(rename = "type")]
    pub kind: ScheduleChangeKind,
    pub original_date: DateTime<Utc>,
    pub new_date: Option<DateTime<Utc>>,
    pub new_time: Option<String>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl ScheduleChangeEntry {
    pub fn new(change: ScheduleChange, class: ClassSummary) -> ScheduleChangeEntry {
        ScheduleChangeEntry {
            id: change.id,
            class,
            kind: change.kind,
            original_date: change.original_date,
            new_date: change.new_date,
            new_time: change.new_time,
            reason: change.reason,
            created_at: change.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HolidayResponse {
    pub id: Id,
    pub name: String,
    pub date: String,
    pub description: String,
}

impl From<Holiday> for HolidayResponse {
    fn from(holiday: Holiday) -> Self {
        HolidayResponse {
            id: holiday.id,
            name: holiday.name,
            date: holiday.date.format("%Y-%m-%d").to_string(),
            description: holiday.description,
        }
    }
}
