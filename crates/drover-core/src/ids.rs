//! Branded ID newtypes and the composite thread key.
//!
//! Every backend entity has a distinct ID type implemented as a newtype
//! wrapper around `String`, so a run ID can never be passed where a thread
//! ID is expected. Generated IDs are UUID v7 (time-ordered).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Generate a new UUID v7 string (time-ordered).
fn new_v7() -> String {
    Uuid::now_v7().to_string()
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(new_v7())
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Identifies one backend instance (deployment).
    ServerId
}

branded_id! {
    /// Identifies a room on a backend instance.
    RoomId
}

branded_id! {
    /// Identifies a persistent conversation thread within a room.
    ThreadId
}

branded_id! {
    /// Identifies one backend-tracked run within a thread.
    RunId
}

/// Uniquely identifies one logical conversation across backend instances.
///
/// Structural equality — two keys with the same components are the same
/// conversation, regardless of where the values came from. Used as the
/// coordinator's map key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadKey {
    /// Backend instance.
    pub server_id: ServerId,
    /// Room on that instance.
    pub room_id: RoomId,
    /// Thread within the room.
    pub thread_id: ThreadId,
}

impl ThreadKey {
    /// Build a key from its components.
    #[must_use]
    pub fn new(server_id: ServerId, room_id: RoomId, thread_id: ThreadId) -> Self {
        Self {
            server_id,
            room_id,
            thread_id,
        }
    }
}

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.server_id, self.room_id, self.thread_id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
