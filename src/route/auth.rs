use rocket::response::status::Created;
use rocket::serde::json::Json;
use rocket::State;

use crate::config::Config;
use crate::data::user::db::problem as user_problem;
use crate::data::user::db::{AuthResponse, UserLoginData, UserSignupData};
use crate::data::user::{User, UserResponse};
use crate::resp::jwt::TokenService;
use crate::resp::problem::Problem;
use crate::role::Role;
use crate::route::{hash_password, verify_password};
use crate::security::Security;
use crate::store::{SharedStore, UserStore};

#[utoipa::path(
    request_body = UserSignupData,
    responses(
        (status = 201, body = AuthResponse),
        (status = 400, body = Problem),
        (status = 409, body = Problem)
    )
)]
#[post("/auth/signup", data = "<signup>")]
#[tracing::instrument(skip(store, tokens, security, config))]
pub async fn signup(
    signup: Json<UserSignupData>,
    store: &State<SharedStore>,
    tokens: &State<TokenService>,
    security: &State<Security>,
    config: &State<Config>,
) -> Result<Created<Json<AuthResponse>>, Problem> {
    let signup = signup.into_inner();
    let bootstrap_admin = config.is_admin_username(&signup.username);
    signup.validate(bootstrap_admin)?;

    let role = if bootstrap_admin {
        tracing::info!("Signing up configured admin: {}", signup.username);
        Role::Admin
    } else {
        signup.role
    };
    let roll_number = match role {
        Role::Student => signup.roll_number_value().map(str::to_string),
        _ => None,
    };

    let pw_hash = hash_password(security, signup.password).await?;
    let user = User::new(signup.username, signup.email, pw_hash, role).with_roll_number(roll_number);
    store.insert_user(&user).await?;

    let token = tokens.issue(&user)?;
    let location = format!("/api/users/{}", user.id);
    Ok(Created::new(location).body(Json(AuthResponse {
        token,
        user: UserResponse::from(user),
    })))
}

#[utoipa::path(
    request_body = UserLoginData,
    responses(
        (status = 200, body = AuthResponse),
        (status = 401, body = Problem)
    )
)]
#[post("/auth/login", data = "<login>")]
#[tracing::instrument(skip(store, tokens))]
pub async fn login(
    login: Json<UserLoginData>,
    store: &State<SharedStore>,
    tokens: &State<TokenService>,
) -> Result<Json<AuthResponse>, Problem> {
    let login = login.into_inner();
    login.validate()?;

    let user = store
        .find_user_by_username(&login.username)
        .await?
        .filter(|it| it.role == login.role)
        .ok_or_else(user_problem::bad_login)?;

    if !verify_password(user.pw_hash.clone(), login.password).await? {
        tracing::debug!("wrong password for user {}", user.id);
        return Err(user_problem::bad_login());
    }

    let token = tokens.issue(&user)?;
    Ok(Json(AuthResponse {
        token,
        user: UserResponse::from(user),
    }))
}

#[cfg(test)]
mod auth_endpoints {
    use rocket::http::{ContentType, Status};
    use serde_json::json;

    use crate::resp::jwt::TokenService;
    use crate::role::Role;
    use crate::testing::{add_user, client, memory_store, password_of};

    #[rocket::async_test]
    async fn signup_issues_token_for_new_student() {
        let client = client(memory_store()).await;

        let response = client
            .post("/api/auth/signup")
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": "newbie",
                    "email": "newbie@example.com",
                    "password": "hunter22",
                    "role": "student",
                    "rollNumber": "R-1"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);

        let body: serde_json::Value = response.into_json().await.expect("auth json");
        assert_eq!(body["user"]["role"], "student");
        assert_eq!(body["user"]["rollNumber"], "R-1");
        assert!(body["user"].get("pwHash").is_none());

        let tokens: &TokenService = client.rocket().state().unwrap();
        let claims = tokens
            .verify(body["token"].as_str().expect("token string"))
            .expect("issued token verifies");
        assert_eq!(claims.name, "newbie");
        assert_eq!(claims.role, Role::Student);
    }

    #[rocket::async_test]
    async fn signup_refuses_admins_and_duplicates() {
        let store = memory_store();
        add_user(&store, "taken", Role::Faculty).await;
        let client = client(store).await;

        let admin = client
            .post("/api/auth/signup")
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": "sneaky",
                    "email": "sneaky@example.com",
                    "password": "hunter22",
                    "role": "admin"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(admin.status(), Status::BadRequest);

        let duplicate = client
            .post("/api/auth/signup")
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": "taken",
                    "email": "other@example.com",
                    "password": "hunter22",
                    "role": "faculty"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(duplicate.status(), Status::Conflict);
        let body: serde_json::Value = duplicate.into_json().await.unwrap();
        assert_eq!(body["code"], "duplicate");
    }

    #[rocket::async_test]
    async fn configured_usernames_bootstrap_as_admin() {
        let client = client(memory_store()).await;

        let response = client
            .post("/api/auth/signup")
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": "root",
                    "email": "root@example.com",
                    "password": "hunter22",
                    "role": "student"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);

        let body: serde_json::Value = response.into_json().await.unwrap();
        assert_eq!(body["user"]["role"], "admin");
    }

    #[rocket::async_test]
    async fn login_failures_look_the_same() {
        let store = memory_store();
        add_user(&store, "prof", Role::Faculty).await;
        let client = client(store).await;

        let ok = client
            .post("/api/auth/login")
            .header(ContentType::JSON)
            .body(
                json!({"username": "prof", "password": password_of("prof"), "role": "faculty"})
                    .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(ok.status(), Status::Ok);

        for body in [
            json!({"username": "prof", "password": "wrong-pw", "role": "faculty"}),
            json!({"username": "prof", "password": password_of("prof"), "role": "student"}),
            json!({"username": "ghost", "password": "whatever", "role": "faculty"}),
        ] {
            let response = client
                .post("/api/auth/login")
                .header(ContentType::JSON)
                .body(body.to_string())
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::Unauthorized);

            let problem: serde_json::Value = response.into_json().await.unwrap();
            assert_eq!(problem["code"], "invalid_credentials");
        }
    }
}
