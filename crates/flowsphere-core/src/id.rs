use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, num::ParseIntError, str::FromStr};
use uuid::Uuid;

/// Identifier of an authenticated user (opaque UUID issued by the auth service).
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct UserId(pub Uuid);

impl UserId {
    #[must_use]
    /// Generate a fresh user identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Serialize for UserId {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.trim().parse()?))
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

row_id!(
    /// Identifier of a task row (assigned by the remote service).
    TaskId
);

row_id!(
    /// Identifier of a project row (assigned by the remote service).
    ProjectId
);

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;

    #[test]
    fn user_id_uses_uuid_v7() {
        let id = UserId::new();
        assert_eq!(id.0.get_version_num(), 7);
    }

    #[test]
    fn user_id_serializes_as_string() {
        let uuid = Uuid::now_v7();
        let json = serde_json::to_string(&UserId(uuid)).expect("serialize user id");
        assert_eq!(json, format!("\"{uuid}\""));
        let parsed: UserId = serde_json::from_str(&json).expect("deserialize user id");
        assert_eq!(parsed.0, uuid);
    }

    #[test]
    fn row_ids_are_plain_numbers_on_the_wire() {
        let json = serde_json::to_string(&TaskId(42)).expect("serialize task id");
        assert_eq!(json, "42");
        let parsed: ProjectId = serde_json::from_str("7").expect("deserialize project id");
        assert_eq!(parsed, ProjectId(7));
    }

    #[test]
    fn row_ids_parse_from_cli_text() {
        assert_eq!(" 12 ".parse::<TaskId>().expect("parse task id"), TaskId(12));
        assert!("abc".parse::<ProjectId>().is_err());
    }
}
