use rocket::response::status::Created;
use rocket::serde::json::Json;
use rocket::State;

use crate::aggregate::Aggregator;
use crate::data::class::db::{
    CancelClassData, ClassCreateData, ClassUpdateData, RescheduleClassData,
};
use crate::data::class::{
    ClassResponse, ClassStatus, ClassSummary, EnrollmentResponse, EnrollmentStatus,
};
use crate::data::record::{parse_record_date, ScheduleChange, ScheduleChangeEntry};
use crate::enrollment::EnrollmentManager;
use crate::resp::jwt::{Authorized, UserRoleToken};
use crate::resp::problem::{problems, Problem};
use crate::role::policy::{AdminOnly, FacultyOnly, Staff, StudentOnly};
use crate::role::Role;
use crate::route::{load_class, parse_id, require_owner};
use crate::store::{ClassFilter, ClassStore, RecordStore, SharedStore};

#[utoipa::path(
    responses((status = 200, body = [ClassResponse]), (status = 401, body = Problem)),
    security(("jwt" = []))
)]
#[get("/classes")]
#[tracing::instrument(skip_all)]
pub async fn class_list(
    _auth: UserRoleToken,
    aggregator: &State<Aggregator>,
) -> Result<Json<Vec<ClassResponse>>, Problem> {
    Ok(Json(aggregator.class_views(&ClassFilter::all()).await?))
}

/// Active classes with at least one open seat.
#[utoipa::path(
    responses((status = 200, body = [ClassResponse]), (status = 401, body = Problem)),
    security(("jwt" = []))
)]
#[get("/classes/available")]
#[tracing::instrument(skip_all)]
pub async fn class_available(
    _auth: UserRoleToken,
    aggregator: &State<Aggregator>,
) -> Result<Json<Vec<ClassResponse>>, Problem> {
    let filter = ClassFilter::all()
        .with_status(ClassStatus::Active)
        .with_open_seats();
    Ok(Json(aggregator.class_views(&filter).await?))
}

#[utoipa::path(
    responses((status = 200, body = ClassResponse), (status = 404, body = Problem)),
    security(("jwt" = []))
)]
#[get("/classes/<id>")]
#[tracing::instrument(skip(_auth, aggregator))]
pub async fn class_get(
    id: &str,
    _auth: UserRoleToken,
    aggregator: &State<Aggregator>,
) -> Result<Json<ClassResponse>, Problem> {
    let id = parse_id("class", id)?;
    Ok(Json(aggregator.class_view(id).await?))
}

#[utoipa::path(
    request_body = ClassCreateData,
    responses(
        (status = 201, body = ClassResponse),
        (status = 400, body = Problem),
        (status = 403, body = Problem)
    ),
    security(("jwt" = []))
)]
#[post("/classes", data = "<class>")]
#[tracing::instrument(skip(_auth, enrollment, aggregator))]
pub async fn class_create(
    _auth: Authorized<AdminOnly>,
    class: Json<ClassCreateData>,
    enrollment: &State<EnrollmentManager>,
    aggregator: &State<Aggregator>,
) -> Result<Created<Json<ClassResponse>>, Problem> {
    let class = class.into_inner();
    let faculty = class.validate()?;

    let created = enrollment
        .create_class(class.name, faculty, class.schedule, class.capacity)
        .await?;
    let view = aggregator.class_view(created.id).await?;

    let location = format!("/api/classes/{}", created.id);
    Ok(Created::new(location).body(Json(view)))
}

/// Admins may edit any class. Faculty may edit classes they teach but can't
/// hand them to somebody else.
#[utoipa::path(
    request_body = ClassUpdateData,
    responses(
        (status = 200, body = ClassResponse),
        (status = 403, body = Problem),
        (status = 409, body = Problem)
    ),
    security(("jwt" = []))
)]
#[put("/classes/<id>", data = "<update>")]
#[tracing::instrument(skip(auth, store, enrollment, aggregator))]
pub async fn class_update(
    id: &str,
    auth: Authorized<Staff>,
    update: Json<ClassUpdateData>,
    store: &State<SharedStore>,
    enrollment: &State<EnrollmentManager>,
    aggregator: &State<Aggregator>,
) -> Result<Json<ClassResponse>, Problem> {
    let id = parse_id("class", id)?;
    let update = update.into_inner().into_update()?;
    if update.is_empty() {
        return Err(problems::invalid_input("Nothing to update."));
    }

    if auth.role == Role::Faculty {
        let class = load_class(store, id).await?;
        require_owner(&class, &auth)?;
        if update.faculty_id.is_some() {
            return Err(problems::forbidden());
        }
    }

    enrollment.update_class(id, &update).await?;
    Ok(Json(aggregator.class_view(id).await?))
}

#[utoipa::path(
    responses((status = 200, body = ClassResponse), (status = 404, body = Problem)),
    security(("jwt" = []))
)]
#[delete("/classes/<id>")]
#[tracing::instrument(skip(auth, store))]
pub async fn class_delete(
    id: &str,
    auth: Authorized<AdminOnly>,
    store: &State<SharedStore>,
) -> Result<Json<ClassResponse>, Problem> {
    let id = parse_id("class", id)?;
    let removed = store
        .delete_class(id)
        .await?
        .ok_or_else(|| problems::not_found("Class", id))?;
    tracing::info!("admin {} deleted class {}", auth.sub, id);

    Ok(Json(ClassResponse::new(removed, None)))
}

#[utoipa::path(
    responses(
        (status = 200, body = EnrollmentResponse),
        (status = 400, body = Problem),
        (status = 404, body = Problem)
    ),
    security(("jwt" = []))
)]
#[post("/classes/<id>/enroll")]
#[tracing::instrument(skip(auth, enrollment))]
pub async fn class_enroll(
    id: &str,
    auth: Authorized<StudentOnly>,
    enrollment: &State<EnrollmentManager>,
) -> Result<Json<EnrollmentResponse>, Problem> {
    let id = parse_id("class", id)?;
    let roster = enrollment.join(id, auth.user_id()).await?;

    Ok(Json(EnrollmentResponse {
        status: EnrollmentStatus::Enrolled,
        roster,
    }))
}

#[utoipa::path(
    responses((status = 200, body = EnrollmentResponse), (status = 404, body = Problem)),
    security(("jwt" = []))
)]
#[post("/classes/<id>/drop")]
#[tracing::instrument(skip(auth, enrollment))]
pub async fn class_drop(
    id: &str,
    auth: Authorized<StudentOnly>,
    enrollment: &State<EnrollmentManager>,
) -> Result<Json<EnrollmentResponse>, Problem> {
    let id = parse_id("class", id)?;
    let roster = enrollment.leave(id, auth.user_id()).await?;

    Ok(Json(EnrollmentResponse {
        status: EnrollmentStatus::Dropped,
        roster,
    }))
}

#[utoipa::path(
    responses((status = 200, body = [ClassResponse]), (status = 403, body = Problem)),
    security(("jwt" = []))
)]
#[get("/student/enrollments")]
#[tracing::instrument(skip_all)]
pub async fn student_enrollments(
    auth: Authorized<StudentOnly>,
    aggregator: &State<Aggregator>,
) -> Result<Json<Vec<ClassResponse>>, Problem> {
    Ok(Json(aggregator.student_enrollments(auth.user_id()).await?))
}

#[utoipa::path(
    responses((status = 200, body = [ClassSummary]), (status = 403, body = Problem)),
    security(("jwt" = []))
)]
#[get("/student/schedule")]
#[tracing::instrument(skip_all)]
pub async fn student_schedule(
    auth: Authorized<StudentOnly>,
    aggregator: &State<Aggregator>,
) -> Result<Json<Vec<ClassSummary>>, Problem> {
    Ok(Json(aggregator.student_schedule(auth.user_id()).await?))
}

#[utoipa::path(
    responses((status = 200, body = [ClassResponse]), (status = 403, body = Problem)),
    security(("jwt" = []))
)]
#[get("/faculty/classes")]
#[tracing::instrument(skip_all)]
pub async fn faculty_classes(
    auth: Authorized<FacultyOnly>,
    aggregator: &State<Aggregator>,
) -> Result<Json<Vec<ClassResponse>>, Problem> {
    Ok(Json(aggregator.faculty_classes(auth.user_id()).await?))
}

#[utoipa::path(
    responses((status = 200, body = [ClassSummary]), (status = 403, body = Problem)),
    security(("jwt" = []))
)]
#[get("/faculty/schedule")]
#[tracing::instrument(skip_all)]
pub async fn faculty_schedule(
    auth: Authorized<FacultyOnly>,
    aggregator: &State<Aggregator>,
) -> Result<Json<Vec<ClassSummary>>, Problem> {
    Ok(Json(aggregator.faculty_schedule(auth.user_id()).await?))
}

#[utoipa::path(
    request_body = CancelClassData,
    responses(
        (status = 201, body = ScheduleChangeEntry),
        (status = 400, body = Problem),
        (status = 403, body = Problem),
        (status = 404, body = Problem)
    ),
    security(("jwt" = []))
)]
#[post("/faculty/class/cancel", data = "<cancel>")]
#[tracing::instrument(skip(auth, store))]
pub async fn class_cancel(
    auth: Authorized<FacultyOnly>,
    cancel: Json<CancelClassData>,
    store: &State<SharedStore>,
) -> Result<Created<Json<ScheduleChangeEntry>>, Problem> {
    let cancel = cancel.into_inner();
    let class = load_class(store, parse_id("class", &cancel.class_id)?).await?;
    require_owner(&class, &auth)?;

    let date = parse_record_date("date", &cancel.date)?;
    let change = ScheduleChange::cancellation(class.id, date, cancel.reason);
    store.insert_schedule_change(&change).await?;
    tracing::info!("faculty {} cancelled class {} on {}", auth.sub, class.id, date);

    let location = format!("/api/faculty/schedule-changes#{}", change.id);
    Ok(Created::new(location).body(Json(ScheduleChangeEntry::new(
        change,
        ClassSummary::from(&class),
    ))))
}

#[utoipa::path(
    request_body = RescheduleClassData,
    responses(
        (status = 201, body = ScheduleChangeEntry),
        (status = 400, body = Problem),
        (status = 403, body = Problem),
        (status = 404, body = Problem)
    ),
    security(("jwt" = []))
)]
#[post("/faculty/class/reschedule", data = "<reschedule>")]
#[tracing::instrument(skip(auth, store))]
pub async fn class_reschedule(
    auth: Authorized<FacultyOnly>,
    reschedule: Json<RescheduleClassData>,
    store: &State<SharedStore>,
) -> Result<Created<Json<ScheduleChangeEntry>>, Problem> {
    let reschedule = reschedule.into_inner();
    let class = load_class(store, parse_id("class", &reschedule.class_id)?).await?;
    require_owner(&class, &auth)?;

    let original = parse_record_date("originalDate", &reschedule.original_date)?;
    let moved_to = parse_record_date("newDate", &reschedule.new_date)?;
    let change = ScheduleChange::reschedule(
        class.id,
        original,
        moved_to,
        reschedule.new_time,
        reschedule.reason,
    );
    store.insert_schedule_change(&change).await?;
    tracing::info!(
        "faculty {} moved class {} from {} to {}",
        auth.sub,
        class.id,
        original,
        moved_to
    );

    let location = format!("/api/faculty/schedule-changes#{}", change.id);
    Ok(Created::new(location).body(Json(ScheduleChangeEntry::new(
        change,
        ClassSummary::from(&class),
    ))))
}

#[utoipa::path(
    responses((status = 200, body = [ScheduleChangeEntry]), (status = 403, body = Problem)),
    security(("jwt" = []))
)]
#[get("/faculty/schedule-changes")]
#[tracing::instrument(skip_all)]
pub async fn schedule_changes(
    auth: Authorized<FacultyOnly>,
    aggregator: &State<Aggregator>,
) -> Result<Json<Vec<ScheduleChangeEntry>>, Problem> {
    Ok(Json(aggregator.schedule_changes(auth.user_id()).await?))
}

///////////////////////
//       TESTS
///////////////////////
