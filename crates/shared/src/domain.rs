use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(RoomId);
id_newtype!(MessageId);
id_newtype!(NotificationId);

/// Separator between the sorted participant ids in a direct room id.
///
/// Part of the wire contract: the server derives the same id with the same
/// sort order and separator, so both sides must agree bit-for-bit.
pub const ROOM_ID_SEPARATOR: char = '_';

impl RoomId {
    /// Room id for a 1:1 conversation: the two participant ids sorted
    /// lexicographically and joined with [`ROOM_ID_SEPARATOR`]. Symmetric in
    /// its arguments.
    pub fn direct(a: &UserId, b: &UserId) -> Self {
        let mut pair = [a.as_str(), b.as_str()];
        pair.sort_unstable();
        Self(format!("{}{}{}", pair[0], ROOM_ID_SEPARATOR, pair[1]))
    }

    /// Room id for a well-known broadcast channel, used unchanged.
    pub fn broadcast(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Message,
    Request,
}
