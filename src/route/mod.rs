use std::collections::BTreeMap;

use rocket::{Build, Rocket, Route};

pub mod admin;
pub mod auth;
pub mod class;
pub mod records;
pub mod users;

use admin::*;
use auth::*;
use class::*;
use records::*;
use users::*;

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    aggregate::{
        ClassEnrollment, ClassPerformance, PerformanceStats, Statistics, StudentPerformance,
    },
    credential::PasswordHash,
    data::{
        class::db::{
            CancelClassData, ClassCreateData, ClassUpdateData, RescheduleClassData, TimetableData,
        },
        class::{
            ClassResponse, ClassSection, ClassStatus, ClassSummary, EnrollmentResponse,
            EnrollmentStatus, RosterSnapshot,
        },
        record::{
            AttendanceData, AttendanceEntry, AttendanceStatus, HolidayData, HolidayResponse,
            PerformanceData, PerformanceEntry, RemarkData, RemarkEntry, ScheduleChangeEntry,
            ScheduleChangeKind, StudentAttendanceEntry,
        },
        user::db::{AuthResponse, UserCreateData, UserLoginData, UserSignupData, UserUpdateData},
        user::{UserResponse, UserSummary},
        Id,
    },
    resp::{
        jwt::{doc::JWTAuth, UserRoleToken},
        problem::{problem_catcher, problems, Problem},
    },
    role::Role,
    security::Security,
    store::{ClassStore, SharedStore},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        signup,
        login,
        user_list,
        user_get,
        user_create,
        user_update,
        user_delete,
        class_list,
        class_available,
        class_get,
        class_create,
        class_update,
        class_delete,
        class_enroll,
        class_drop,
        student_enrollments,
        student_schedule,
        faculty_classes,
        faculty_schedule,
        class_cancel,
        class_reschedule,
        schedule_changes,
        attendance_mark,
        attendance_list,
        student_attendance,
        performance_add,
        performance_list,
        student_performance,
        remark_add,
        student_remarks,
        statistics,
        holiday_list,
        holiday_create,
        holiday_delete,
        timetable_set
    ),
    components(schemas(
        Role,
        Problem,
        UserResponse,
        UserSummary,
        UserSignupData,
        UserLoginData,
        UserCreateData,
        UserUpdateData,
        AuthResponse,
        ClassStatus,
        ClassResponse,
        ClassSummary,
        ClassCreateData,
        ClassUpdateData,
        RosterSnapshot,
        EnrollmentStatus,
        EnrollmentResponse,
        TimetableData,
        CancelClassData,
        RescheduleClassData,
        AttendanceData,
        AttendanceEntry,
        AttendanceStatus,
        StudentAttendanceEntry,
        PerformanceData,
        PerformanceEntry,
        PerformanceStats,
        ClassPerformance,
        StudentPerformance,
        RemarkData,
        RemarkEntry,
        ScheduleChangeKind,
        ScheduleChangeEntry,
        HolidayData,
        HolidayResponse,
        ClassEnrollment,
        Statistics
    )),
    modifiers(&JWTAuth, &API_PREFIX)
)]
pub struct ApiDoc;

pub struct PathPrefix(pub &'static str);
static API_PREFIX: PathPrefix = PathPrefix("/api");

impl utoipa::Modify for PathPrefix {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let mut new_paths = BTreeMap::new();

        for (path, item) in std::mem::take(&mut openapi.paths.paths) {
            new_paths.insert(self.0.to_string() + path.as_ref(), item);
        }

        openapi.paths.paths = new_paths;
    }
}

pub fn api() -> Vec<Route> {
    routes![
        signup,
        login,
        user_list,
        user_get,
        user_create,
        user_update,
        user_delete,
        class_list,
        class_available,
        class_get,
        class_create,
        class_update,
        class_delete,
        class_enroll,
        class_drop,
        student_enrollments,
        student_schedule,
        faculty_classes,
        faculty_schedule,
        class_cancel,
        class_reschedule,
        schedule_changes,
        attendance_mark,
        attendance_list,
        student_attendance,
        performance_add,
        performance_list,
        student_performance,
        remark_add,
        student_remarks,
        statistics,
        holiday_list,
        holiday_create,
        holiday_delete,
        timetable_set
    ]
}

pub fn mount_api(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .mount("/api", api())
        .mount(
            "/",
            SwaggerUi::new("/swagger/<_..>").url("/api/openapi.json", ApiDoc::openapi()),
        )
        .register("/", catchers![problem_catcher])
}

/// Path ids are parsed inside handlers so request guards (authentication
/// first) always run before id validation.
pub(crate) fn parse_id(what: &str, value: &str) -> Result<Id, Problem> {
    value.parse().map_err(|_| problems::invalid_id(what, value))
}

pub(crate) async fn load_class(store: &SharedStore, id: Id) -> Result<ClassSection, Problem> {
    store
        .get_class(id)
        .await?
        .ok_or_else(|| problems::not_found("Class", id))
}

/// Faculty may only act on classes they teach.
pub(crate) fn require_owner(class: &ClassSection, auth: &UserRoleToken) -> Result<(), Problem> {
    if class.faculty_id == auth.user_id() {
        return Ok(());
    }
    tracing::debug!(
        "user {} doesn't own class {} (owner {})",
        auth.sub,
        class.id,
        class.faculty_id
    );
    Err(problems::forbidden())
}

/// Bcrypt is CPU bound; keep it off the async workers.
pub(crate) async fn hash_password(
    security: &Security,
    password: String,
) -> Result<PasswordHash, Problem> {
    let security = security.clone();
    tokio::task::spawn_blocking(move || security.hash_password(password))
        .await
        .map_err(|e| {
            tracing::error!("password hashing task failed: {}", e);
            problems::internal("Unable to hash password.")
        })?
        .map_err(|e| {
            tracing::error!("unable to hash password: {}", e);
            problems::internal("Unable to hash password.")
        })
}

pub(crate) async fn verify_password(hash: PasswordHash, password: String) -> Result<bool, Problem> {
    tokio::task::spawn_blocking(move || hash.verify(password))
        .await
        .map_err(|e| {
            tracing::error!("password verification task failed: {}", e);
            problems::internal("Unable to verify password.")
        })
}

#[cfg(test)]
mod tests {
    use rocket::http::{ContentType, Status};

    use super::*;
    use crate::testing::{add_user, bearer, client, memory_store};

    #[rocket::async_test]
    async fn openapi_document_is_served() {
        let client = client(memory_store()).await;

        let response = client.get("/api/openapi.json").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let doc: serde_json::Value = response.into_json().await.expect("openapi json");
        assert!(doc["paths"].get("/api/classes/{id}/enroll").is_some());
        assert!(doc["components"]["securitySchemes"].get("jwt").is_some());

        for route in api() {
            let path = format!("/api{}", route.uri.path())
                .replace('<', "{")
                .replace('>', "}");
            let method = route.method.as_str().to_lowercase();
            assert!(
                doc["paths"][&path].get(&method).is_some(),
                "{} {} isn't documented",
                method,
                path
            );
        }
    }

    #[rocket::async_test]
    async fn unknown_routes_render_problems() {
        let client = client(memory_store()).await;

        let response = client.get("/api/nothing-here").dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
        assert_eq!(
            response.content_type(),
            Some(ContentType::new("application", "problem+json"))
        );
    }

    #[rocket::async_test]
    async fn malformed_path_ids_are_invalid_input() {
        let store = memory_store();
        let student = add_user(&store, "pupil", Role::Student).await;
        let client = client(store).await;

        let response = client
            .post("/api/classes/not-a-uuid/enroll")
            .header(bearer(&client, &student))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);

        let body: serde_json::Value = response.into_json().await.unwrap();
        assert_eq!(body["code"], "invalid_input");
    }
}
