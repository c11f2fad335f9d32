use rocket::response::status::Created;
use rocket::serde::json::Json;
use rocket::State;
use utoipa::IntoParams;

use crate::aggregate::{Aggregator, DateRange, Statistics};
use crate::data::class::db::TimetableData;
use crate::data::class::{ClassResponse, ClassUpdate};
use crate::data::record::{HolidayData, HolidayResponse};
use crate::enrollment::EnrollmentManager;
use crate::resp::jwt::Authorized;
use crate::resp::problem::{problems, Problem};
use crate::role::policy::AdminOnly;
use crate::route::parse_id;
use crate::store::{RecordStore, SharedStore};

/// Optional `startDate`/`endDate` pair, both or neither.
#[derive(Debug, Default, FromForm, IntoParams)]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct RangeQuery {
    #[field(name = "startDate")]
    start_date: Option<String>,
    #[field(name = "endDate")]
    end_date: Option<String>,
}

impl RangeQuery {
    fn range(&self) -> Result<Option<DateRange>, Problem> {
        Ok(DateRange::parse(
            self.start_date.as_deref(),
            self.end_date.as_deref(),
        )?)
    }
}

/// Counters over users and classes created within the optional range.
#[utoipa::path(
    responses(
        (status = 200, body = Statistics),
        (status = 400, body = Problem),
        (status = 403, body = Problem)
    ),
    security(("jwt" = []))
)]
#[get("/admin/statistics?<query..>")]
#[tracing::instrument(skip(_auth, aggregator))]
pub async fn statistics(
    query: RangeQuery,
    _auth: Authorized<AdminOnly>,
    aggregator: &State<Aggregator>,
) -> Result<Json<Statistics>, Problem> {
    let range = query.range()?;
    Ok(Json(aggregator.statistics(range).await?))
}

#[utoipa::path(
    responses((status = 200, body = [HolidayResponse]), (status = 400, body = Problem)),
    security(("jwt" = []))
)]
#[get("/admin/holidays?<query..>")]
#[tracing::instrument(skip(_auth, aggregator))]
pub async fn holiday_list(
    query: RangeQuery,
    _auth: Authorized<AdminOnly>,
    aggregator: &State<Aggregator>,
) -> Result<Json<Vec<HolidayResponse>>, Problem> {
    let range = query.range()?;
    Ok(Json(aggregator.holidays(range).await?))
}

#[utoipa::path(
    request_body = HolidayData,
    responses((status = 201, body = HolidayResponse), (status = 400, body = Problem)),
    security(("jwt" = []))
)]
#[post("/admin/holidays", data = "<holiday>")]
#[tracing::instrument(skip(auth, store))]
pub async fn holiday_create(
    auth: Authorized<AdminOnly>,
    holiday: Json<HolidayData>,
    store: &State<SharedStore>,
) -> Result<Created<Json<HolidayResponse>>, Problem> {
    let holiday = holiday.into_inner().into_holiday()?;
    store.insert_holiday(&holiday).await?;
    tracing::info!("admin {} added holiday {} ({})", auth.sub, holiday.name, holiday.id);

    let location = format!("/api/admin/holidays/{}", holiday.id);
    Ok(Created::new(location).body(Json(HolidayResponse::from(holiday))))
}

#[utoipa::path(
    responses((status = 204), (status = 404, body = Problem)),
    security(("jwt" = []))
)]
#[delete("/admin/holidays/<id>")]
#[tracing::instrument(skip(auth, store))]
pub async fn holiday_delete(
    id: &str,
    auth: Authorized<AdminOnly>,
    store: &State<SharedStore>,
) -> Result<rocket::http::Status, Problem> {
    let id = parse_id("holiday", id)?;
    if !store.delete_holiday(id).await? {
        return Err(problems::not_found("Holiday", id));
    }
    tracing::info!("admin {} removed holiday {}", auth.sub, id);

    Ok(rocket::http::Status::NoContent)
}

/// Rewrites a class's schedule descriptor from a weekday slot.
#[utoipa::path(
    request_body = TimetableData,
    responses((status = 200, body = ClassResponse), (status = 404, body = Problem)),
    security(("jwt" = []))
)]
#[post("/admin/timetable", data = "<slot>")]
#[tracing::instrument(skip(_auth, enrollment, aggregator))]
pub async fn timetable_set(
    _auth: Authorized<AdminOnly>,
    slot: Json<TimetableData>,
    enrollment: &State<EnrollmentManager>,
    aggregator: &State<Aggregator>,
) -> Result<Json<ClassResponse>, Problem> {
    let class = slot.validate()?;
    let update = ClassUpdate {
        schedule: Some(slot.schedule()),
        ..Default::default()
    };

    enrollment.update_class(class, &update).await?;
    Ok(Json(aggregator.class_view(class).await?))
}

///////////////////////
//       TESTS
///////////////////////

#[cfg(test)]
mod admin_endpoints {
    use rocket::http::{ContentType, Status};
    use serde_json::json;

    use crate::enrollment::EnrollmentManager;
    use crate::role::Role;
    use crate::testing::{add_user, bearer, client, memory_store};

    #[rocket::async_test]
    async fn statistics_are_admin_only() {
        let store = memory_store();
        let admin = add_user(&store, "boss", Role::Admin).await;
        let faculty = add_user(&store, "prof", Role::Faculty).await;
        EnrollmentManager::new(store.clone())
            .create_class("Algebra".into(), faculty.id, "Monday".into(), 12)
            .await
            .unwrap();
        let client = client(store).await;

        let denied = client
            .get("/api/admin/statistics")
            .header(bearer(&client, &faculty))
            .dispatch()
            .await;
        assert_eq!(denied.status(), Status::Forbidden);

        let response = client
            .get("/api/admin/statistics")
            .header(bearer(&client, &admin))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let stats: serde_json::Value = response.into_json().await.unwrap();
        assert_eq!(stats["totalUsers"], 2);
        assert_eq!(stats["usersByRole"]["faculty"], 1);
        assert_eq!(stats["classesByStatus"]["active"], 1);
        assert_eq!(stats["totalCapacity"], 12);
        assert_eq!(stats["averageClassSize"], 0.0);
        assert_eq!(stats["classEnrollment"][0]["name"], "Algebra");
        assert_eq!(stats["classEnrollment"][0]["capacity"], 12);

        let before = client
            .get("/api/admin/statistics?startDate=2001-01-01&endDate=2001-12-31")
            .header(bearer(&client, &admin))
            .dispatch()
            .await;
        assert_eq!(before.status(), Status::Ok);
        let stats: serde_json::Value = before.into_json().await.unwrap();
        assert_eq!(stats["totalUsers"], 0);
        assert_eq!(stats["classEnrollment"].as_array().map(Vec::len), Some(0));

        let half = client
            .get("/api/admin/statistics?endDate=2024-01-01")
            .header(bearer(&client, &admin))
            .dispatch()
            .await;
        assert_eq!(half.status(), Status::BadRequest);
    }

    #[rocket::async_test]
    async fn holidays_round_trip_through_the_calendar() {
        let store = memory_store();
        let admin = add_user(&store, "boss", Role::Admin).await;
        let client = client(store).await;

        let mut ids = Vec::new();
        for (name, date) in [("Labour Day", "2024-05-01"), ("New Year", "2024-01-01")] {
            let response = client
                .post("/api/admin/holidays")
                .header(ContentType::JSON)
                .header(bearer(&client, &admin))
                .body(json!({"name": name, "date": date}).to_string())
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::Created);
            let body: serde_json::Value = response.into_json().await.unwrap();
            assert_eq!(body["date"], date);
            ids.push(body["id"].as_str().unwrap().to_string());
        }

        let listed = client
            .get("/api/admin/holidays")
            .header(bearer(&client, &admin))
            .dispatch()
            .await;
        let holidays: Vec<serde_json::Value> = listed.into_json().await.unwrap();
        assert_eq!(holidays[0]["name"], "Labour Day");
        assert_eq!(holidays[1]["name"], "New Year");

        let spring = client
            .get("/api/admin/holidays?startDate=2024-04-01&endDate=2024-06-30")
            .header(bearer(&client, &admin))
            .dispatch()
            .await;
        let holidays: Vec<serde_json::Value> = spring.into_json().await.unwrap();
        assert_eq!(holidays.len(), 1);

        let half = client
            .get("/api/admin/holidays?startDate=2024-04-01")
            .header(bearer(&client, &admin))
            .dispatch()
            .await;
        assert_eq!(half.status(), Status::BadRequest);

        let removed = client
            .delete(format!("/api/admin/holidays/{}", ids[0]))
            .header(bearer(&client, &admin))
            .dispatch()
            .await;
        assert_eq!(removed.status(), Status::NoContent);

        let again = client
            .delete(format!("/api/admin/holidays/{}", ids[0]))
            .header(bearer(&client, &admin))
            .dispatch()
            .await;
        assert_eq!(again.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn timetable_rewrites_schedule() {
        let store = memory_store();
        let admin = add_user(&store, "boss", Role::Admin).await;
        let faculty = add_user(&store, "prof", Role::Faculty).await;
        let class = EnrollmentManager::new(store.clone())
            .create_class("Biology".into(), faculty.id, "TBD".into(), 10)
            .await
            .unwrap();
        let client = client(store).await;

        let weekend = client
            .post("/api/admin/timetable")
            .header(ContentType::JSON)
            .header(bearer(&client, &admin))
            .body(
                json!({
                    "classId": class.id.to_string(),
                    "day": "Saturday",
                    "startTime": "09:00",
                    "endTime": "10:00"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(weekend.status(), Status::BadRequest);

        let response = client
            .post("/api/admin/timetable")
            .header(ContentType::JSON)
            .header(bearer(&client, &admin))
            .body(
                json!({
                    "classId": class.id.to_string(),
                    "day": "Tuesday",
                    "startTime": "09:00",
                    "endTime": "10:30"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let view: serde_json::Value = response.into_json().await.unwrap();
        assert_eq!(view["schedule"], "Tuesday 09:00-10:30");
    }
}
