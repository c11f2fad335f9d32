use rocket::response::status::Created;
use rocket::serde::json::Json;
use rocket::State;
use utoipa::IntoParams;

use crate::aggregate::{Aggregator, ClassPerformance, DateRange, StudentPerformance};
use crate::data::record::{
    AttendanceData, AttendanceEntry, PerformanceData, PerformanceEntry, RemarkData, RemarkEntry,
    StudentAttendanceEntry,
};
use crate::data::user::UserSummary;
use crate::data::Id;
use crate::resp::jwt::{Authorized, UserRoleToken};
use crate::resp::problem::{problems, Problem};
use crate::role::policy::{FacultyOnly, StudentOnly};
use crate::route::{load_class, parse_id, require_owner};
use crate::store::{RecordStore, SharedStore, StoreError, UserStore};

/// Optional `classId` plus a `startDate`/`endDate` pair, both or neither.
#[derive(Debug, Default, FromForm, IntoParams)]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct RecordQuery {
    #[field(name = "classId")]
    class_id: Option<String>,
    #[field(name = "startDate")]
    start_date: Option<String>,
    #[field(name = "endDate")]
    end_date: Option<String>,
}

impl RecordQuery {
    fn range(&self) -> Result<Option<DateRange>, Problem> {
        Ok(DateRange::parse(
            self.start_date.as_deref(),
            self.end_date.as_deref(),
        )?)
    }

    fn class(&self) -> Result<Option<Id>, Problem> {
        self.class_id
            .as_deref()
            .map(|it| parse_id("class", it))
            .transpose()
    }
}

#[utoipa::path(
    request_body = AttendanceData,
    responses(
        (status = 201, body = AttendanceEntry),
        (status = 403, body = Problem),
        (status = 409, body = Problem)
    ),
    security(("jwt" = []))
)]
#[post("/classes/<id>/attendance", data = "<attendance>")]
#[tracing::instrument(skip(auth, store))]
pub async fn attendance_mark(
    id: &str,
    auth: Authorized<FacultyOnly>,
    attendance: Json<AttendanceData>,
    store: &State<SharedStore>,
) -> Result<Created<Json<AttendanceEntry>>, Problem> {
    let class = load_class(store, parse_id("class", id)?).await?;
    require_owner(&class, &auth)?;

    let record = attendance.into_inner().into_record(class.id)?;
    match store.insert_attendance(&record).await {
        Ok(()) => {}
        Err(StoreError::Duplicate(_)) => {
            return Err(problems::duplicate("date")
                .detail("Attendance for this class and date is already recorded.")
                .to_owned())
        }
        Err(e) => return Err(e.into()),
    }
    tracing::info!(
        "faculty {} marked attendance for class {} on {}",
        auth.sub,
        class.id,
        record.date
    );

    let mut ids = record.present.clone();
    ids.extend(record.absent.iter().copied());
    let users = store.users_by_ids(&ids).await?;
    let resolve = |ids: &[Id]| -> Vec<UserSummary> {
        ids.iter()
            .filter_map(|id| users.iter().find(|it| it.id == *id))
            .map(UserSummary::from)
            .collect()
    };

    let entry = AttendanceEntry {
        id: record.id,
        class_id: record.class_id,
        date: record.date,
        present: resolve(&record.present),
        absent: resolve(&record.absent),
    };
    let location = format!("/api/classes/{}/attendance", class.id);
    Ok(Created::new(location).body(Json(entry)))
}

#[utoipa::path(
    responses(
        (status = 200, body = [AttendanceEntry]),
        (status = 400, body = Problem),
        (status = 404, body = Problem)
    ),
    security(("jwt" = []))
)]
#[get("/classes/<id>/attendance?<query..>")]
#[tracing::instrument(skip(_auth, aggregator))]
pub async fn attendance_list(
    id: &str,
    query: RecordQuery,
    _auth: UserRoleToken,
    aggregator: &State<Aggregator>,
) -> Result<Json<Vec<AttendanceEntry>>, Problem> {
    let id = parse_id("class", id)?;
    let range = query.range()?;
    Ok(Json(aggregator.class_attendance(id, range).await?))
}

#[utoipa::path(
    responses(
        (status = 200, body = [StudentAttendanceEntry]),
        (status = 400, body = Problem),
        (status = 403, body = Problem)
    ),
    security(("jwt" = []))
)]
#[get("/student/attendance?<query..>")]
#[tracing::instrument(skip(auth, aggregator))]
pub async fn student_attendance(
    query: RecordQuery,
    auth: Authorized<StudentOnly>,
    aggregator: &State<Aggregator>,
) -> Result<Json<Vec<StudentAttendanceEntry>>, Problem> {
    let class = query.class()?;
    let range = query.range()?;
    Ok(Json(
        aggregator
            .student_attendance(auth.user_id(), class, range)
            .await?,
    ))
}

#[utoipa::path(
    request_body = PerformanceData,
    responses(
        (status = 201, body = PerformanceEntry),
        (status = 403, body = Problem),
        (status = 404, body = Problem)
    ),
    security(("jwt" = []))
)]
#[post("/faculty/class/<id>/performance", data = "<performance>")]
#[tracing::instrument(skip(auth, store))]
pub async fn performance_add(
    id: &str,
    auth: Authorized<FacultyOnly>,
    performance: Json<PerformanceData>,
    store: &State<SharedStore>,
) -> Result<Created<Json<PerformanceEntry>>, Problem> {
    let class = load_class(store, parse_id("class", id)?).await?;
    require_owner(&class, &auth)?;

    let record = performance.into_inner().into_record(class.id)?;
    if !class.is_enrolled(record.student_id) {
        return Err(not_enrolled(class.id, record.student_id));
    }
    store.insert_performance(&record).await?;

    let student = store
        .get_user(record.student_id)
        .await?
        .map(|it| UserSummary::from(&it));
    let location = format!("/api/classes/{}/performance", class.id);
    Ok(Created::new(location).body(Json(PerformanceEntry::new(record, student))))
}

#[utoipa::path(
    responses(
        (status = 200, body = ClassPerformance),
        (status = 400, body = Problem),
        (status = 404, body = Problem)
    ),
    security(("jwt" = []))
)]
#[get("/classes/<id>/performance?<query..>")]
#[tracing::instrument(skip(_auth, aggregator))]
pub async fn performance_list(
    id: &str,
    query: RecordQuery,
    _auth: UserRoleToken,
    aggregator: &State<Aggregator>,
) -> Result<Json<ClassPerformance>, Problem> {
    let id = parse_id("class", id)?;
    let range = query.range()?;
    Ok(Json(aggregator.class_performance(id, range).await?))
}

#[utoipa::path(
    responses(
        (status = 200, body = StudentPerformance),
        (status = 400, body = Problem),
        (status = 403, body = Problem)
    ),
    security(("jwt" = []))
)]
#[get("/student/performance?<query..>")]
#[tracing::instrument(skip(auth, aggregator))]
pub async fn student_performance(
    query: RecordQuery,
    auth: Authorized<StudentOnly>,
    aggregator: &State<Aggregator>,
) -> Result<Json<StudentPerformance>, Problem> {
    let class = query.class()?;
    let range = query.range()?;
    Ok(Json(
        aggregator
            .student_performance(auth.user_id(), class, range)
            .await?,
    ))
}

#[utoipa::path(
    request_body = RemarkData,
    responses(
        (status = 201, body = RemarkEntry),
        (status = 403, body = Problem),
        (status = 404, body = Problem)
    ),
    security(("jwt" = []))
)]
#[post("/faculty/class/<id>/remarks", data = "<remark>")]
#[tracing::instrument(skip(auth, store))]
pub async fn remark_add(
    id: &str,
    auth: Authorized<FacultyOnly>,
    remark: Json<RemarkData>,
    store: &State<SharedStore>,
) -> Result<Created<Json<RemarkEntry>>, Problem> {
    let class = load_class(store, parse_id("class", id)?).await?;
    require_owner(&class, &auth)?;

    let remark = remark.into_inner().into_remark(class.id, auth.user_id())?;
    if !class.is_enrolled(remark.student_id) {
        return Err(not_enrolled(class.id, remark.student_id));
    }
    store.insert_remark(&remark).await?;

    let faculty = store
        .get_user(auth.user_id())
        .await?
        .map(|it| UserSummary::from(&it));
    let location = format!("/api/classes/{}", class.id);
    Ok(Created::new(location).body(Json(RemarkEntry {
        id: remark.id,
        class: (&class).into(),
        faculty,
        content: remark.content,
        created_at: remark.created_at,
    })))
}

#[utoipa::path(
    responses((status = 200, body = [RemarkEntry]), (status = 403, body = Problem)),
    security(("jwt" = []))
)]
#[get("/student/remarks")]
#[tracing::instrument(skip_all)]
pub async fn student_remarks(
    auth: Authorized<StudentOnly>,
    aggregator: &State<Aggregator>,
) -> Result<Json<Vec<RemarkEntry>>, Problem> {
    Ok(Json(aggregator.student_remarks(auth.user_id()).await?))
}

fn not_enrolled(class: Id, student: Id) -> Problem {
    crate::enrollment::EnrollmentError::NotEnrolled { class, student }.into()
}

///////////////////////
//       TESTS
///////////////////////

#[cfg(test)]
mod record_endpoints {
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::json;

    use crate::data::user::User;
    use crate::data::Id;
    use crate::enrollment::EnrollmentManager;
    use crate::role::Role;
    use crate::store::SharedStore;
    use crate::testing::{add_user, bearer, client, memory_store};

    struct Fixture {
        client: Client,
        owner: User,
        student: User,
        outsider: User,
        rival: User,
        class: Id,
    }

    async fn fixture() -> Fixture {
        let store: SharedStore = memory_store();
        let owner = add_user(&store, "prof", Role::Faculty).await;
        let student = add_user(&store, "pupil", Role::Student).await;
        let outsider = add_user(&store, "guest", Role::Student).await;
        let rival = add_user(&store, "rival", Role::Faculty).await;
        let manager = EnrollmentManager::new(store.clone());
        let class = manager
            .create_class("Physics".into(), owner.id, "Monday 08:00-09:30".into(), 10)
            .await
            .unwrap()
            .id;
        manager.join(class, student.id).await.unwrap();

        Fixture {
            client: client(store).await,
            owner,
            student,
            outsider,
            rival,
            class,
        }
    }

    async fn post_json(
        client: &Client,
        user: &User,
        uri: String,
        body: serde_json::Value,
    ) -> (Status, serde_json::Value) {
        let response = client
            .post(uri)
            .header(ContentType::JSON)
            .header(bearer(client, user))
            .body(body.to_string())
            .dispatch()
            .await;
        let status = response.status();
        (status, response.into_json().await.unwrap_or_default())
    }

    async fn get_json(client: &Client, user: &User, uri: String) -> (Status, serde_json::Value) {
        let response = client
            .get(uri)
            .header(bearer(client, user))
            .dispatch()
            .await;
        let status = response.status();
        (status, response.into_json().await.unwrap_or_default())
    }

    #[rocket::async_test]
    async fn attendance_once_per_day_and_filterable() {
        let f = fixture().await;
        let uri = format!("/api/classes/{}/attendance", f.class);

        for (day, present) in [("2024-04-01", true), ("2024-04-02", false)] {
            let (ids_present, ids_absent) = if present {
                (vec![f.student.id.to_string()], vec![])
            } else {
                (vec![], vec![f.student.id.to_string()])
            };
            let (status, body) = post_json(
                &f.client,
                &f.owner,
                uri.clone(),
                json!({"date": day, "present": ids_present, "absent": ids_absent}),
            )
            .await;
            assert_eq!(status, Status::Created, "{}", body);
        }

        let (status, body) = post_json(
            &f.client,
            &f.owner,
            uri.clone(),
            json!({"date": "2024-04-01", "present": [], "absent": []}),
        )
        .await;
        assert_eq!(status, Status::Conflict);
        assert_eq!(body["code"], "duplicate");

        let (status, body) = get_json(
            &f.client,
            &f.student,
            format!("{}?startDate=2024-04-02&endDate=2024-04-02", uri),
        )
        .await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body.as_array().map(Vec::len), Some(1));
        assert_eq!(body[0]["absent"][0]["username"], "pupil");

        let (status, body) = get_json(
            &f.client,
            &f.student,
            "/api/student/attendance?startDate=2024-04-01&endDate=2024-04-30".to_string(),
        )
        .await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body[0]["status"], "absent");
        assert_eq!(body[1]["status"], "present");
    }

    #[rocket::async_test]
    async fn broken_date_ranges_fail_loudly() {
        let f = fixture().await;
        let paths = [
            format!("/api/classes/{}/attendance", f.class),
            format!("/api/classes/{}/performance", f.class),
            "/api/student/attendance".to_string(),
            "/api/student/performance".to_string(),
        ];

        for path in &paths {
            for query in [
                "startDate=2024-04-01",
                "endDate=2024-04-01",
                "startDate=garbage&endDate=nope",
                "startDate=someday&endDate=2024-04-02",
                "startDate=2024-05-01&endDate=2024-04-01",
            ] {
                let (status, body) =
                    get_json(&f.client, &f.student, format!("{}?{}", path, query)).await;
                assert_eq!(status, Status::BadRequest, "{}?{}", path, query);
                assert_eq!(body["code"], "invalid_date_range");
            }
        }
    }

    #[rocket::async_test]
    async fn performance_views_filter_by_date() {
        let f = fixture().await;
        let uri = format!("/api/faculty/class/{}/performance", f.class);

        for (name, date) in [("Quiz 1", "2024-04-03"), ("Quiz 2", "2024-05-03")] {
            let (status, _) = post_json(
                &f.client,
                &f.owner,
                uri.clone(),
                json!({
                    "studentId": f.student.id.to_string(),
                    "assessmentName": name,
                    "score": 5.0,
                    "totalMarks": 10.0,
                    "date": date
                }),
            )
            .await;
            assert_eq!(status, Status::Created);
        }

        let april = "startDate=2024-04-01&endDate=2024-04-30";
        let (status, body) = get_json(
            &f.client,
            &f.student,
            format!("/api/student/performance?{}", april),
        )
        .await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body["records"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["records"][0]["assessmentName"], "Quiz 1");

        let (status, body) = get_json(
            &f.client,
            &f.owner,
            format!("/api/classes/{}/performance?{}", f.class, april),
        )
        .await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body["statistics"]["assessmentCount"], 1);
    }

    #[rocket::async_test]
    async fn overlapping_attendance_is_rejected() {
        let f = fixture().await;
        let id = f.student.id.to_string();

        let (status, body) = post_json(
            &f.client,
            &f.owner,
            format!("/api/classes/{}/attendance", f.class),
            json!({"date": "2024-04-01", "present": [id], "absent": [id]}),
        )
        .await;
        assert_eq!(status, Status::BadRequest);
        assert_eq!(body["code"], "invalid_input");
    }

    #[rocket::async_test]
    async fn performance_needs_enrolled_student() {
        let f = fixture().await;
        let uri = format!("/api/faculty/class/{}/performance", f.class);

        let (status, body) = post_json(
            &f.client,
            &f.owner,
            uri.clone(),
            json!({
                "studentId": f.outsider.id.to_string(),
                "assessmentName": "Quiz 1",
                "score": 7.0,
                "totalMarks": 10.0,
                "date": "2024-04-03"
            }),
        )
        .await;
        assert_eq!(status, Status::NotFound);
        assert_eq!(body["code"], "not_enrolled");

        let (status, body) = post_json(
            &f.client,
            &f.owner,
            uri,
            json!({
                "studentId": f.student.id.to_string(),
                "assessmentName": "Quiz 1",
                "score": 7.0,
                "totalMarks": 10.0,
                "date": "2024-04-03"
            }),
        )
        .await;
        assert_eq!(status, Status::Created);
        assert_eq!(body["student"]["username"], "pupil");

        let (_, body) = get_json(
            &f.client,
            &f.owner,
            format!("/api/classes/{}/performance", f.class),
        )
        .await;
        assert_eq!(body["statistics"]["assessmentCount"], 1);
        assert_eq!(body["statistics"]["averagePercentage"], 70.0);

        let (_, body) = get_json(
            &f.client,
            &f.student,
            format!("/api/student/performance?classId={}", f.class),
        )
        .await;
        assert_eq!(body["records"].as_array().map(Vec::len), Some(1));
        assert_eq!(
            body["statistics"][f.class.to_string()]["assessmentCount"],
            1
        );
    }

    #[rocket::async_test]
    async fn remarks_reach_the_student() {
        let f = fixture().await;

        let (status, _) = post_json(
            &f.client,
            &f.student,
            format!("/api/faculty/class/{}/remarks", f.class),
            json!({"studentId": f.student.id.to_string(), "content": "Self praise"}),
        )
        .await;
        assert_eq!(status, Status::Forbidden);

        let (status, body) = post_json(
            &f.client,
            &f.owner,
            format!("/api/faculty/class/{}/remarks", f.class),
            json!({"studentId": f.student.id.to_string(), "content": "Great lab report"}),
        )
        .await;
        assert_eq!(status, Status::Created);
        assert_eq!(body["faculty"]["username"], "prof");

        let (status, body) =
            get_json(&f.client, &f.student, "/api/student/remarks".to_string()).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body[0]["content"], "Great lab report");
        assert_eq!(body[0]["class"]["name"], "Physics");
    }

    #[rocket::async_test]
    async fn foreign_faculty_cannot_mark_attendance() {
        let f = fixture().await;

        let (status, body) = post_json(
            &f.client,
            &f.rival,
            format!("/api/classes/{}/attendance", f.class),
            json!({"date": "2024-04-01", "present": [], "absent": []}),
        )
        .await;
        assert_eq!(status, Status::Forbidden);
        assert_eq!(body["code"], "forbidden");
    }
}
