use serde::Deserialize;
use utoipa::ToSchema;

use super::{ClassStatus, ClassUpdate};
use crate::data::Id;
use crate::resp::problem::{problems, Problem};

const WEEKDAYS: [&str; 5] = ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday"];

fn require_text(field: &str, value: &str) -> Result<(), Problem> {
    if value.trim().is_empty() {
        return Err(problems::invalid_input(format!("'{}' can't be empty.", field))
            .insert_str("field", field)
            .to_owned());
    }
    Ok(())
}

fn require_capacity(capacity: u32) -> Result<(), Problem> {
    if capacity < 1 {
        return Err(problems::invalid_input("Capacity must be at least 1.")
            .insert_str("field", "capacity")
            .to_owned());
    }
    Ok(())
}

fn parse_id(what: &str, value: &str) -> Result<Id, Problem> {
    value.parse().map_err(|_| problems::invalid_id(what, value))
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassCreateData {
    pub name: String,
    pub faculty_id: String,
    pub schedule: String,
    pub capacity: u32,
}

impl ClassCreateData {
    pub fn validate(&self) -> Result<Id, Problem> {
        require_text("name", &self.name)?;
        require_text("schedule", &self.schedule)?;
        require_capacity(self.capacity)?;
        parse_id("faculty", &self.faculty_id)
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassUpdateData {
    pub name: Option<String>,
    pub faculty_id: Option<String>,
    pub schedule: Option<String>,
    pub capacity: Option<u32>,
    pub status: Option<ClassStatus>,
}

impl ClassUpdateData {
    pub fn into_update(self) -> Result<ClassUpdate, Problem> {
        if let Some(name) = &self.name {
            require_text("name", name)?;
        }
        if let Some(schedule) = &self.schedule {
            require_text("schedule", schedule)?;
        }
        if let Some(capacity) = self.capacity {
            require_capacity(capacity)?;
        }
        let faculty_id = match &self.faculty_id {
            Some(it) => Some(parse_id("faculty", it)?),
            None => None,
        };

        Ok(ClassUpdate {
            name: self.name,
            faculty_id,
            schedule: self.schedule,
            capacity: self.capacity,
            status: self.status,
        })
    }
}

/// Rewrites a class's schedule descriptor from a weekly slot.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimetableData {
    pub class_id: String,
    pub day: String,
    pub start_time: String,
    pub end_time: String,
}

impl TimetableData {
    pub fn validate(&self) -> Result<Id, Problem> {
        if !WEEKDAYS.contains(&self.day.as_str()) {
            return Err(problems::invalid_input(format!(
                "Day must be one of {}.",
                WEEKDAYS.join(", ")
            )));
        }
        require_text("startTime", &self.start_time)?;
        require_text("endTime", &self.end_time)?;
        parse_id("class", &self.class_id)
    }

    pub fn schedule(&self) -> String {
        format!("{} {}-{}", self.day, self.start_time, self.end_time)
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelClassData {
    pub class_id: String,
    pub date: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleClassData {
    pub class_id: String,
    pub original_date: String,
    pub new_date: String,
    #[serde(default)]
    pub new_time: Option<String>,
    #[serde(default)]
    pub reason: String,
}
