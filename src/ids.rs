//! Typed identifiers.
//!
//! Node ids key the per-task status map while task ids key the per-group
//! status map. Keeping them as distinct types stops one from being used where
//! the other is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;


macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

macro_rules! uuid_id {
    ($name:ident) => {
        impl $name {
            /// Fresh random v4 identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn is_uuid(&self) -> bool {
                Uuid::parse_str(&self.0).is_ok()
            }
        }
    };
}

string_id!(
    /// A target execution host.
    NodeId
);
string_id!(TaskId);
string_id!(GroupId);
string_id!(TempId);

uuid_id!(TaskId);
uuid_id!(GroupId);
uuid_id!(TempId);
