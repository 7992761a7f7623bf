use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A label or group key.
///
/// `Name` keys collide on equal text, which is what labeled deduplication
/// wants. `Unique` keys never collide with anything but their own clones;
/// they cover call sites that need a guaranteed-fresh scope (the drag
/// composite generates one per gesture).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Key {
    Name(String),
    Unique(Uuid),
}

impl Key {
    /// A fresh key equal only to its own clones.
    pub fn unique() -> Self {
        Self::Unique(Uuid::new_v4())
    }

    /// The textual name, if this is a named key.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name.as_str()),
            Self::Unique(_) => None,
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{name}"),
            Self::Unique(id) => write!(f, "#{}", &id.to_string()[..8]),
        }
    }
}
