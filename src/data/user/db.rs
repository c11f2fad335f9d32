use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::data::user::UserResponse;
use crate::resp::problem::Problem;
use crate::role::Role;

pub static USER_COLLECTION_NAME: &str = "users";

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 32;
const PASSWORD_MIN: usize = 6;
const PASSWORD_MAX: usize = 1024;

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;

    #[inline]
    pub fn bad_email(email: impl ToString, detail: impl ToString) -> Problem {
        Problem::new(Status::BadRequest, "invalid_input", "Bad email.")
            .insert_str("email", email)
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn bad_username(username: impl ToString, detail: impl ToString) -> Problem {
        Problem::new(Status::BadRequest, "invalid_input", "Bad username.")
            .insert_str("username", username)
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn bad_password(detail: impl ToString) -> Problem {
        Problem::new(Status::BadRequest, "invalid_input", "Bad password.")
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn bad_role(detail: impl ToString) -> Problem {
        Problem::new(Status::BadRequest, "invalid_input", "Bad role.")
            .detail(detail)
            .to_owned()
    }

    /// Same answer for unknown users, wrong roles and wrong passwords.
    #[inline]
    pub fn bad_login() -> Problem {
        Problem::new(
            Status::Unauthorized,
            "invalid_credentials",
            "Bad username, role or password.",
        )
    }
}

fn validate_username(username: &str) -> Result<(), Problem> {
    if username.len() < USERNAME_MIN {
        return Err(problem::bad_username(
            username,
            format!(
                "Username must be at least {} characters (bytes) long.",
                USERNAME_MIN
            ),
        ));
    }

    if username.len() > USERNAME_MAX {
        return Err(problem::bad_username(
            username,
            format!(
                "Username can't be longer than {} (bytes) characters.",
                USERNAME_MAX
            ),
        ));
    }

    Ok(())
}

fn validate_email(email: &str) -> Result<(), Problem> {
    if !email.contains('@') {
        return Err(problem::bad_email(email, "Not a valid e-mail address."));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), Problem> {
    if password.len() < PASSWORD_MIN {
        return Err(problem::bad_password(format!(
            "Password must be at least {} characters (bytes) long.",
            PASSWORD_MIN
        )));
    }

    if password.len() > PASSWORD_MAX {
        return Err(problem::bad_password(format!(
            "Passwords longer than {} characters aren't supported.",
            PASSWORD_MAX
        )));
    }

    Ok(())
}

#[derive(Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSignupData {
    pub username: String,
    #[schema(format = "email")]
    pub email: String,
    #[schema(format = "password")]
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub roll_number: Option<String>,
}

impl std::fmt::Debug for UserSignupData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UserSignupInfo:{}", self.username)
    }
}

impl UserSignupData {
    /// Checks the payload shape. `bootstrap_admin` allows the admin role for
    /// usernames configured to become administrators.
    pub fn validate(&self, bootstrap_admin: bool) -> Result<(), Problem> {
        validate_username(&self.username)?;
        validate_email(&self.email)?;
        validate_password(&self.password)?;

        match self.role {
            _ if bootstrap_admin => {}
            Role::Admin => {
                return Err(problem::bad_role(
                    "Admin accounts can't be created through signup.",
                ))
            }
            Role::Student if self.roll_number_value().is_none() => {
                return Err(problem::bad_role("Students must provide a roll number."))
            }
            _ => {}
        }

        Ok(())
    }

    pub fn roll_number_value(&self) -> Option<&str> {
        self.roll_number
            .as_deref()
            .map(str::trim)
            .filter(|it| !it.is_empty())
    }
}

#[derive(Clone, Deserialize, ToSchema)]
pub struct UserLoginData {
    pub username: String,
    #[schema(format = "password")]
    pub password: String,
    pub role: Role,
}

impl std::fmt::Debug for UserLoginData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UserLoginInfo:{}", self.username)
    }
}

impl UserLoginData {
    pub fn validate(&self) -> Result<(), Problem> {
        if self.username.len() > USERNAME_MAX || self.password.len() > PASSWORD_MAX {
            return Err(problem::bad_login());
        }
        Ok(())
    }
}

/// Admin creation of an account with any role.
#[derive(Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserCreateData {
    pub username: String,
    #[schema(format = "email")]
    pub email: String,
    #[schema(format = "password")]
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub roll_number: Option<String>,
}

impl std::fmt::Debug for UserCreateData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UserCreateInfo:{}:{}", self.username, self.role)
    }
}

impl UserCreateData {
    pub fn validate(&self) -> Result<(), Problem> {
        validate_username(&self.username)?;
        validate_email(&self.email)?;
        validate_password(&self.password)
    }
}

#[derive(Clone, Default, Deserialize, ToSchema)]
pub struct UserUpdateData {
    pub username: Option<String>,
    #[schema(format = "email")]
    pub email: Option<String>,
    #[schema(format = "password")]
    pub password: Option<String>,
    pub role: Option<Role>,
}

impl std::fmt::Debug for UserUpdateData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserUpdateData")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| ".."))
            .field("role", &self.role)
            .finish()
    }
}

impl UserUpdateData {
    pub fn validate(&self) -> Result<(), Problem> {
        if let Some(username) = &self.username {
            validate_username(username)?;
        }
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        if let Some(password) = &self.password {
            validate_password(password)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(role: Role, roll_number: Option<&str>) -> UserSignupData {
        UserSignupData {
            username: "student1".to_string(),
            email: "s1@example.com".to_string(),
            password: "secret-pw".to_string(),
            role,
            roll_number: roll_number.map(str::to_string),
        }
    }

    #[test]
    fn signup_requires_roll_number_for_students() {
        assert!(signup(Role::Student, Some("R-17")).validate(false).is_ok());
        assert!(signup(Role::Student, Some(" ")).validate(false).is_err());
        assert!(signup(Role::Student, None).validate(false).is_err());
        assert!(signup(Role::Faculty, None).validate(false).is_ok());
    }

    #[test]
    fn signup_admin_only_when_bootstrapped() {
        assert!(signup(Role::Admin, None).validate(false).is_err());
        assert!(signup(Role::Admin, None).validate(true).is_ok());
    }

    #[test]
    fn signup_checks_field_shapes() {
        let mut data = signup(Role::Faculty, None);
        data.email = "no-at-sign".to_string();
        assert_eq!(data.validate(false).unwrap_err().code, "invalid_input");

        let mut data = signup(Role::Faculty, None);
        data.username = "ab".to_string();
        assert!(data.validate(false).is_err());

        let mut data = signup(Role::Faculty, None);
        data.password = "12345".to_string();
        assert!(data.validate(false).is_err());
    }

    #[test]
    fn debug_output_hides_passwords() {
        let data = signup(Role::Faculty, None);
        assert!(!format!("{:?}", data).contains("secret-pw"));

        let update = UserUpdateData {
            password: Some("secret-pw".to_string()),
            ..Default::default()
        };
        assert!(!format!("{:?}", update).contains("secret-pw"));
    }
}
