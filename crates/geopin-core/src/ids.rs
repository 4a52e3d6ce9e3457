use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($name:ident, $prefix:expr) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

// One per GeoSession instance; a reopened dialog gets a fresh id.
branded_id!(SessionId, "geo");

/// Which dialog a session serves.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Add,
    Edit,
}

impl SessionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Edit => "edit",
        }
    }

    /// Anchor the host page provides for this session's map.
    pub fn default_anchor(self) -> &'static str {
        match self {
            Self::Add => "addMapContainer",
            Self::Edit => "editMapContainer",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// GeoSession lifecycle: `Uninitialized -> Initializing -> Ready -> Destroyed`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Uninitialized,
    Initializing,
    Ready,
    Destroyed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Destroyed => "destroyed",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_has_prefix() {
        let id = SessionId::new();
        assert!(id.as_str().starts_with("geo_"));
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn kind_serde() {
        let json = serde_json::to_string(&SessionKind::Edit).unwrap();
        assert_eq!(json, "\"edit\"");
        let back: SessionKind = serde_json::from_str("\"add\"").unwrap();
        assert_eq!(back, SessionKind::Add);
    }

    #[test]
    fn anchors_differ_per_kind() {
        assert_eq!(SessionKind::Add.default_anchor(), "addMapContainer");
        assert_eq!(SessionKind::Edit.default_anchor(), "editMapContainer");
    }

    #[test]
    fn status_display() {
        assert_eq!(SessionStatus::Ready.to_string(), "ready");
        assert_eq!(SessionStatus::Uninitialized.to_string(), "uninitialized");
    }
}
