use std::time::Duration;

use bson::{doc, Bson, Document};
use chrono::{SecondsFormat, Utc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOneAndUpdateOptions, IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, Cursor, Database, IndexModel};
use serde::de::DeserializeOwned;

use super::{
    with_deadline, ClassFilter, ClassStore, RecordFilter, RecordStore, StoreError, StoreResult,
    UserStore,
};
use crate::data::class::{ClassSection, ClassUpdate, CLASS_COLLECTION_NAME};
use crate::data::record::{
    AttendanceRecord, Holiday, PerformanceRecord, Remark, ScheduleChange,
    ATTENDANCE_COLLECTION_NAME, HOLIDAY_COLLECTION_NAME, PERFORMANCE_COLLECTION_NAME,
    REMARK_COLLECTION_NAME, SCHEDULE_CHANGE_COLLECTION_NAME,
};
use crate::data::user::db::USER_COLLECTION_NAME;
use crate::data::user::{User, UserUpdate};
use crate::data::Id;
use crate::role::Role;

const DUPLICATE_KEY: i32 = 11000;

fn duplicate_field(message: &str) -> String {
    ["username", "email", "date"]
        .into_iter()
        .find(|field| message.contains(field))
        .unwrap_or("key")
        .to_string()
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        match err.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY => {
                StoreError::Duplicate(duplicate_field(&e.message))
            }
            ErrorKind::Command(e) if e.code == DUPLICATE_KEY => {
                StoreError::Duplicate(duplicate_field(&e.message))
            }
            ErrorKind::BsonDeserialization(e) => StoreError::Corrupt(e.to_string()),
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

fn now_bson() -> Bson {
    Bson::String(Utc::now().to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn ids_bson(ids: &[Id]) -> Vec<Bson> {
    ids.iter().copied().map(Bson::from).collect()
}

fn after() -> Option<FindOneAndUpdateOptions> {
    Some(
        FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build(),
    )
}

async fn collect<T>(mut cursor: Cursor<T>) -> StoreResult<Vec<T>>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    let mut out = Vec::new();
    while cursor.advance().await? {
        out.push(
            cursor
                .deserialize_current()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        );
    }
    Ok(out)
}

fn class_filter(filter: &ClassFilter) -> Document {
    let mut query = Document::new();
    if let Some(faculty) = filter.faculty_id {
        query.insert("facultyId", faculty);
    }
    if let Some(student) = filter.student_id {
        query.insert("enrolled", student);
    }
    if let Some(status) = filter.status {
        query.insert("status", status);
    }
    if filter.open_seats_only {
        query.insert("$expr", doc! { "$lt": ["$enrolledCount", "$capacity"] });
    }
    query
}

/// Translates a [`RecordFilter`]. `student` builds the per-collection
/// student condition; `None` means the collection has no student field.
fn record_filter(filter: &RecordFilter, student: Option<fn(Id) -> Document>) -> Option<Document> {
    let mut query = Document::new();
    if let Some(classes) = &filter.class_ids {
        query.insert("classId", doc! { "$in": ids_bson(classes) });
    }
    if let Some(id) = filter.student_id {
        for (key, value) in student?(id) {
            query.insert(key, value);
        }
    }
    Some(query)
}

fn index(key: &str, unique: bool) -> IndexModel {
    let mut keys = Document::new();
    keys.insert(key, 1);
    if unique {
        IndexModel::builder()
            .keys(keys)
            .options(IndexOptions::builder().unique(true).build())
            .build()
    } else {
        IndexModel::builder().keys(keys).build()
    }
}

fn attendance_of(student: Id) -> Document {
    doc! { "$or": [ { "present": student }, { "absent": student } ] }
}

fn student_field(student: Id) -> Document {
    doc! { "studentId": student }
}

#[derive(Debug, Clone)]
pub struct MongoStore {
    db: Database,
    timeout: Duration,
}

impl MongoStore {
    pub async fn connect(uri: &str, db: &str, timeout: Duration) -> StoreResult<MongoStore> {
        tracing::info!("Connecting to MongoDB: {}", uri);
        let client = with_deadline(timeout, async {
            Client::with_uri_str(uri).await.map_err(StoreError::from)
        })
        .await?;

        tracing::info!("Using MongoDB database: {}", db);
        let store = MongoStore {
            db: client.database(db),
            timeout,
        };

        store
            .bounded(async {
                store.db.run_command(doc! { "ping": 1 }, None).await?;
                Ok(())
            })
            .await?;

        Ok(store)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn bounded<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: std::future::Future<Output = StoreResult<T>>,
    {
        with_deadline(self.timeout, fut).await
    }

    fn users(&self) -> Collection<User> {
        self.db.collection(USER_COLLECTION_NAME)
    }

    fn classes(&self) -> Collection<ClassSection> {
        self.db.collection(CLASS_COLLECTION_NAME)
    }

    fn attendance(&self) -> Collection<AttendanceRecord> {
        self.db.collection(ATTENDANCE_COLLECTION_NAME)
    }

    fn performance(&self) -> Collection<PerformanceRecord> {
        self.db.collection(PERFORMANCE_COLLECTION_NAME)
    }

    fn remarks(&self) -> Collection<Remark> {
        self.db.collection(REMARK_COLLECTION_NAME)
    }

    fn schedule_changes(&self) -> Collection<ScheduleChange> {
        self.db.collection(SCHEDULE_CHANGE_COLLECTION_NAME)
    }

    fn holidays(&self) -> Collection<Holiday> {
        self.db.collection(HOLIDAY_COLLECTION_NAME)
    }

    pub async fn ensure_indexes(&self) -> StoreResult<()> {
        self.bounded(async {
            let users = self.users();
            users.create_index(index("username", true), None).await?;
            users.create_index(index("email", true), None).await?;

            let classes = self.classes();
            for key in ["facultyId", "enrolled", "status"] {
                classes.create_index(index(key, false), None).await?;
            }

            let by_class_and_date = IndexModel::builder()
                .keys(doc! { "classId": 1, "date": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build();
            self.attendance()
                .create_index(by_class_and_date, None)
                .await?;

            for key in ["classId", "studentId"] {
                self.performance().create_index(index(key, false), None).await?;
                self.remarks().create_index(index(key, false), None).await?;
            }
            self.schedule_changes()
                .create_index(index("classId", false), None)
                .await?;
            Ok(())
        })
        .await?;

        tracing::info!("MongoDB indexes are in place.");
        Ok(())
    }

    async fn find_records<T>(
        &self,
        collection: Collection<T>,
        filter: &RecordFilter,
        student: Option<fn(Id) -> Document>,
    ) -> StoreResult<Vec<T>>
    where
        T: DeserializeOwned + Unpin + Send + Sync,
    {
        let query = match record_filter(filter, student) {
            Some(it) => it,
            None => return Ok(Vec::new()),
        };
        self.bounded(async { collect(collection.find(query, None).await?).await })
            .await
    }
}

#[rocket::async_trait]
impl UserStore for MongoStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        self.bounded(async {
            self.users().insert_one(user, None).await?;
            Ok(())
        })
        .await
    }

    async fn get_user(&self, id: Id) -> StoreResult<Option<User>> {
        self.bounded(async { Ok(self.users().find_one(doc! { "_id": id }, None).await?) })
            .await
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.bounded(async {
            Ok(self
                .users()
                .find_one(doc! { "username": username }, None)
                .await?)
        })
        .await
    }

    async fn list_users(&self, role: Option<Role>) -> StoreResult<Vec<User>> {
        let query = match role {
            Some(role) => doc! { "role": role },
            None => Document::new(),
        };
        self.bounded(async { collect(self.users().find(query, None).await?).await })
            .await
    }

    async fn users_by_ids(&self, ids: &[Id]) -> StoreResult<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = doc! { "_id": { "$in": ids_bson(ids) } };
        self.bounded(async { collect(self.users().find(query, None).await?).await })
            .await
    }

    async fn update_user(&self, id: Id, update: &UserUpdate) -> StoreResult<Option<User>> {
        let mut set = doc! { "updatedAt": now_bson() };
        if let Some(username) = &update.username {
            set.insert("username", username.as_str());
        }
        if let Some(email) = &update.email {
            set.insert("email", email.as_str());
        }
        if let Some(pw_hash) = &update.pw_hash {
            set.insert("pwHash", pw_hash.to_string());
        }
        if let Some(role) = update.role {
            set.insert("role", role);
        }

        self.bounded(async {
            Ok(self
                .users()
                .find_one_and_update(doc! { "_id": id }, doc! { "$set": set }, after())
                .await?)
        })
        .await
    }

    async fn delete_user(&self, id: Id) -> StoreResult<Option<User>> {
        self.bounded(async {
            Ok(self
                .users()
                .find_one_and_delete(doc! { "_id": id }, None)
                .await?)
        })
        .await
    }
}

#[rocket::async_trait]
impl ClassStore for MongoStore {
    async fn insert_class(&self, class: &ClassSection) -> StoreResult<()> {
        self.bounded(async {
            self.classes().insert_one(class, None).await?;
            Ok(())
        })
        .await
    }

    async fn get_class(&self, id: Id) -> StoreResult<Option<ClassSection>> {
        self.bounded(async { Ok(self.classes().find_one(doc! { "_id": id }, None).await?) })
            .await
    }

    async fn find_classes(&self, filter: &ClassFilter) -> StoreResult<Vec<ClassSection>> {
        let query = class_filter(filter);
        let mut found = self
            .bounded(async { collect(self.classes().find(query, None).await?).await })
            .await?;
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn update_class(
        &self,
        id: Id,
        update: &ClassUpdate,
    ) -> StoreResult<Option<ClassSection>> {
        let mut query = doc! { "_id": id };
        let mut set = doc! { "updatedAt": now_bson() };
        if let Some(name) = &update.name {
            set.insert("name", name.as_str());
        }
        if let Some(faculty) = update.faculty_id {
            set.insert("facultyId", faculty);
        }
        if let Some(schedule) = &update.schedule {
            set.insert("schedule", schedule.as_str());
        }
        if let Some(capacity) = update.capacity {
            query.insert("enrolledCount", doc! { "$lte": i64::from(capacity) });
            set.insert("capacity", i64::from(capacity));
        }
        if let Some(status) = update.status {
            set.insert("status", status);
        }

        self.bounded(async {
            Ok(self
                .classes()
                .find_one_and_update(query, doc! { "$set": set }, after())
                .await?)
        })
        .await
    }

    async fn delete_class(&self, id: Id) -> StoreResult<Option<ClassSection>> {
        self.bounded(async {
            Ok(self
                .classes()
                .find_one_and_delete(doc! { "_id": id }, None)
                .await?)
        })
        .await
    }

    async fn add_to_roster(&self, class: Id, student: Id) -> StoreResult<Option<ClassSection>> {
        let query = doc! {
            "_id": class,
            "status": "active",
            "enrolled": { "$ne": student },
            "$expr": { "$lt": ["$enrolledCount", "$capacity"] },
        };
        let update = doc! {
            "$push": { "enrolled": student },
            "$inc": { "enrolledCount": 1 },
            "$set": { "updatedAt": now_bson() },
        };

        self.bounded(async {
            Ok(self
                .classes()
                .find_one_and_update(query, update, after())
                .await?)
        })
        .await
    }

    async fn remove_from_roster(
        &self,
        class: Id,
        student: Id,
    ) -> StoreResult<Option<ClassSection>> {
        let query = doc! { "_id": class, "enrolled": student };
        let update = doc! {
            "$pull": { "enrolled": student },
            "$inc": { "enrolledCount": -1 },
            "$set": { "updatedAt": now_bson() },
        };

        self.bounded(async {
            Ok(self
                .classes()
                .find_one_and_update(query, update, after())
                .await?)
        })
        .await
    }

    async fn remove_from_all_rosters(&self, student: Id) -> StoreResult<u64> {
        let query = doc! { "enrolled": student };
        let update = doc! {
            "$pull": { "enrolled": student },
            "$inc": { "enrolledCount": -1 },
            "$set": { "updatedAt": now_bson() },
        };

        self.bounded(async {
            let result = self.classes().update_many(query, update, None).await?;
            Ok(result.modified_count)
        })
        .await
    }
}

#[rocket::async_trait]
impl RecordStore for MongoStore {
    async fn insert_attendance(&self, record: &AttendanceRecord) -> StoreResult<()> {
        self.bounded(async {
            self.attendance().insert_one(record, None).await?;
            Ok(())
        })
        .await
    }

    async fn find_attendance(&self, filter: &RecordFilter) -> StoreResult<Vec<AttendanceRecord>> {
        self.find_records(self.attendance(), filter, Some(attendance_of))
            .await
    }

    async fn insert_performance(&self, record: &PerformanceRecord) -> StoreResult<()> {
        self.bounded(async {
            self.performance().insert_one(record, None).await?;
            Ok(())
        })
        .await
    }

    async fn find_performance(
        &self,
        filter: &RecordFilter,
    ) -> StoreResult<Vec<PerformanceRecord>> {
        self.find_records(self.performance(), filter, Some(student_field))
            .await
    }

    async fn insert_remark(&self, remark: &Remark) -> StoreResult<()> {
        self.bounded(async {
            self.remarks().insert_one(remark, None).await?;
            Ok(())
        })
        .await
    }

    async fn find_remarks(&self, filter: &RecordFilter) -> StoreResult<Vec<Remark>> {
        self.find_records(self.remarks(), filter, Some(student_field))
            .await
    }

    async fn insert_schedule_change(&self, change: &ScheduleChange) -> StoreResult<()> {
        self.bounded(async {
            self.schedule_changes().insert_one(change, None).await?;
            Ok(())
        })
        .await
    }

    async fn find_schedule_changes(
        &self,
        filter: &RecordFilter,
    ) -> StoreResult<Vec<ScheduleChange>> {
        self.find_records(self.schedule_changes(), filter, None)
            .await
    }

    async fn insert_holiday(&self, holiday: &Holiday) -> StoreResult<()> {
        self.bounded(async {
            self.holidays().insert_one(holiday, None).await?;
            Ok(())
        })
        .await
    }

    async fn list_holidays(&self) -> StoreResult<Vec<Holiday>> {
        self.bounded(async { collect(self.holidays().find(None, None).await?).await })
            .await
    }

    async fn delete_holiday(&self, id: Id) -> StoreResult<bool> {
        self.bounded(async {
            let result = self.holidays().delete_one(doc! { "_id": id }, None).await?;
            Ok(result.deleted_count > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_messages_name_the_field() {
        assert_eq!(
            duplicate_field("E11000 duplicate key error index: users.$email_1"),
            "email"
        );
        assert_eq!(
            duplicate_field("E11000 duplicate key error index: attendance.$classId_1_date_1"),
            "date"
        );
        assert_eq!(duplicate_field("E11000"), "key");
    }

    #[test]
    fn open_seat_filter_compares_fields() {
        let faculty = Id::new();
        let query = class_filter(&ClassFilter::all().taught_by(faculty).with_open_seats());

        assert_eq!(query.get("facultyId"), Some(&Bson::from(faculty)));
        assert!(query.contains_key("$expr"));
    }

    #[test]
    fn schedule_changes_have_no_student_field() {
        let filter = RecordFilter::for_student(Id::new());
        assert!(record_filter(&filter, None).is_none());
        assert!(record_filter(&filter, Some(student_field)).is_some());
    }
}
