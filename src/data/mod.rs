use std::fmt::{Display, Formatter};
use std::str::FromStr;

use bson::Bson;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use utoipa::ToSchema;
use uuid::Uuid;

pub mod class;
pub mod record;
pub mod user;

/// Identifier shared by every stored document.
///
/// Always serialized as a hyphenated UUID string, both in BSON and in JSON, so
/// filters built from an `Id` match exactly what was written.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, ToSchema)]
#[schema(value_type = String, format = Uuid)]
pub struct Id(Uuid);

impl Id {
    pub fn new() -> Id {
        Id(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for Id {
    fn default() -> Self {
        Id::new()
    }
}

impl From<Uuid> for Id {
    fn from(value: Uuid) -> Self {
        Id(value)
    }
}

impl FromStr for Id {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Id)
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Id::from_str(&value).map_err(D::Error::custom)
    }
}

impl From<Id> for Bson {
    fn from(id: Id) -> Self {
        Bson::String(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_serializes_as_plain_string() {
        let id = Id::new();

        let json = serde_json::to_value(id).expect("id is serializable");
        assert_eq!(json, serde_json::Value::String(id.to_string()));

        let bson = bson::to_bson(&id).expect("id is serializable");
        assert_eq!(bson, Bson::from(id));
    }

    #[test]
    fn id_rejects_garbage() {
        assert!(Id::from_str("not-a-uuid").is_err());
        assert!(serde_json::from_str::<Id>("\"42\"").is_err());
    }
}
