use std::str::FromStr;

use bson::Bson;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Faculty,
    Student,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Faculty, Role::Student];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Faculty => "faculty",
            Role::Student => "student",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl std::fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown role '{}'", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

impl From<Role> for Bson {
    fn from(role: Role) -> Self {
        Bson::String(role.as_str().to_string())
    }
}

/// Role sets accepted by the [`Authorized`](crate::resp::jwt::Authorized) guard.
///
/// Each operation names exactly one policy. Ownership checks come after it.
pub mod policy {
    use super::Role;

    pub trait Policy: Send + Sync + 'static {
        const ALLOWED: &'static [Role];
    }

    #[derive(Debug)]
    pub struct AdminOnly;
    impl Policy for AdminOnly {
        const ALLOWED: &'static [Role] = &[Role::Admin];
    }

    #[derive(Debug)]
    pub struct FacultyOnly;
    impl Policy for FacultyOnly {
        const ALLOWED: &'static [Role] = &[Role::Faculty];
    }

    #[derive(Debug)]
    pub struct StudentOnly;
    impl Policy for StudentOnly {
        const ALLOWED: &'static [Role] = &[Role::Student];
    }

    /// Admins and faculty.
    #[derive(Debug)]
    pub struct Staff;
    impl Policy for Staff {
        const ALLOWED: &'static [Role] = &[Role::Admin, Role::Faculty];
    }

    #[derive(Debug)]
    pub struct AnyRole;
    impl Policy for AnyRole {
        const ALLOWED: &'static [Role] = &Role::ALL;
    }
}
