use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::credential::PasswordHash;
use crate::data::Id;
use crate::role::Role;

pub mod db;

/// Stored principal. Only ever leaves the store through [`UserResponse`] or
/// [`UserSummary`], which carry no credential material.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Id,
    pub username: String,
    pub email: String,
    pub pw_hash: PasswordHash,
    pub role: Role,
    #[serde(default)]
    pub roll_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        username: impl ToString,
        email: impl ToString,
        pw_hash: PasswordHash,
        role: Role,
    ) -> User {
        let id = Id::new();
        tracing::info!("Creating a new {} with ID: {}", role, id);

        let now = Utc::now();
        User {
            id,
            username: username.to_string(),
            email: email.to_string(),
            pw_hash,
            role,
            roll_number: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_roll_number(mut self, roll_number: Option<String>) -> User {
        self.roll_number = roll_number.filter(|it| !it.trim().is_empty());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Id,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub roll_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        UserResponse {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            roll_number: user.roll_number.clone(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse::from(&user)
    }
}

/// Identity projection used when a user is joined into another view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserSummary {
    pub id: Id,
    pub username: String,
    pub email: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        UserSummary {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
        }
    }
}

/// Partial update applied by the store in one write.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub pw_hash: Option<PasswordHash>,
    pub role: Option<Role>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.pw_hash.is_none()
            && self.role.is_none()
    }

    pub fn apply(&self, user: &mut User) {
        if let Some(username) = &self.username {
            user.username = username.clone();
        }
        if let Some(email) = &self.email {
            user.email = email.clone();
        }
        if let Some(pw_hash) = &self.pw_hash {
            user.pw_hash = pw_hash.clone();
        }
        if let Some(role) = self.role {
            user.role = role;
        }
        user.updated_at = Utc::now();
    }
}
