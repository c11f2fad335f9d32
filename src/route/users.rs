use std::str::FromStr;

use rocket::response::status::Created;
use rocket::serde::json::Json;
use rocket::State;

use crate::data::user::db::problem as user_problem;
use crate::data::user::db::{UserCreateData, UserUpdateData};
use crate::data::user::{User, UserResponse, UserUpdate};
use crate::enrollment::EnrollmentManager;
use crate::resp::jwt::Authorized;
use crate::resp::problem::{problems, Problem};
use crate::role::policy::{AdminOnly, AnyRole};
use crate::role::Role;
use crate::route::{hash_password, parse_id};
use crate::security::Security;
use crate::store::{SharedStore, UserStore};

#[utoipa::path(
    responses((status = 200, body = [UserResponse]), (status = 403, body = Problem)),
    security(("jwt" = []))
)]
#[get("/users?<role>")]
#[tracing::instrument(skip(_auth, store))]
pub async fn user_list(
    role: Option<&str>,
    _auth: Authorized<AdminOnly>,
    store: &State<SharedStore>,
) -> Result<Json<Vec<UserResponse>>, Problem> {
    let role = match role {
        Some(it) => Some(Role::from_str(it).map_err(user_problem::bad_role)?),
        None => None,
    };

    let users = store.list_users(role).await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

#[utoipa::path(
    responses(
        (status = 200, body = UserResponse),
        (status = 403, body = Problem),
        (status = 404, body = Problem)
    ),
    security(("jwt" = []))
)]
#[get("/users/<id>")]
#[tracing::instrument(skip(auth, store))]
pub async fn user_get(
    id: &str,
    auth: Authorized<AnyRole>,
    store: &State<SharedStore>,
) -> Result<Json<UserResponse>, Problem> {
    let id = parse_id("user", id)?;
    if !auth.is(id) && auth.role != Role::Admin {
        return Err(problems::forbidden());
    }

    store
        .get_user(id)
        .await?
        .map(|it| Json(UserResponse::from(it)))
        .ok_or_else(|| problems::not_found("User", id))
}

#[utoipa::path(
    request_body = UserCreateData,
    responses(
        (status = 201, body = UserResponse),
        (status = 403, body = Problem),
        (status = 409, body = Problem)
    ),
    security(("jwt" = []))
)]
#[post("/users", data = "<create>")]
#[tracing::instrument(skip(auth, store, security))]
pub async fn user_create(
    auth: Authorized<AdminOnly>,
    create: Json<UserCreateData>,
    store: &State<SharedStore>,
    security: &State<Security>,
) -> Result<Created<Json<UserResponse>>, Problem> {
    let create = create.into_inner();
    create.validate()?;

    let pw_hash = hash_password(security, create.password).await?;
    let roll_number = match create.role {
        Role::Student => create.roll_number,
        _ => None,
    };
    let user = User::new(create.username, create.email, pw_hash, create.role)
        .with_roll_number(roll_number);
    store.insert_user(&user).await?;
    tracing::info!("admin {} created user {}", auth.sub, user.id);

    let location = format!("/api/users/{}", user.id);
    Ok(Created::new(location).body(Json(UserResponse::from(user))))
}

#[utoipa::path(
    request_body = UserUpdateData,
    responses(
        (status = 200, body = UserResponse),
        (status = 403, body = Problem),
        (status = 404, body = Problem)
    ),
    security(("jwt" = []))
)]
#[put("/users/<id>", data = "<update>")]
#[tracing::instrument(skip(auth, store, security))]
pub async fn user_update(
    id: &str,
    auth: Authorized<AnyRole>,
    update: Json<UserUpdateData>,
    store: &State<SharedStore>,
    security: &State<Security>,
) -> Result<Json<UserResponse>, Problem> {
    let id = parse_id("user", id)?;
    let is_admin = auth.role == Role::Admin;
    if !auth.is(id) && !is_admin {
        return Err(problems::forbidden());
    }

    let update = update.into_inner();
    update.validate()?;
    if update.role.is_some() && !is_admin {
        tracing::debug!("user {} tried to change their own role", auth.sub);
        return Err(problems::forbidden());
    }

    let pw_hash = match update.password {
        Some(password) => Some(hash_password(security, password).await?),
        None => None,
    };
    let changes = UserUpdate {
        username: update.username,
        email: update.email,
        pw_hash,
        role: update.role,
    };
    if changes.is_empty() {
        return Err(problems::invalid_input("Nothing to update."));
    }

    store
        .update_user(id, &changes)
        .await?
        .map(|it| Json(UserResponse::from(it)))
        .ok_or_else(|| problems::not_found("User", id))
}

#[utoipa::path(
    responses(
        (status = 200, body = UserResponse),
        (status = 403, body = Problem),
        (status = 404, body = Problem),
        (status = 409, body = Problem)
    ),
    security(("jwt" = []))
)]
#[delete("/users/<id>")]
#[tracing::instrument(skip(auth, enrollment))]
pub async fn user_delete(
    id: &str,
    auth: Authorized<AdminOnly>,
    enrollment: &State<EnrollmentManager>,
) -> Result<Json<UserResponse>, Problem> {
    let id = parse_id("user", id)?;
    let removed = enrollment.delete_user(id).await?;
    tracing::info!("admin {} deleted user {}", auth.sub, id);

    Ok(Json(UserResponse::from(removed)))
}

///////////////////////
//       TESTS
///////////////////////
