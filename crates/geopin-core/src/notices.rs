use serde::{Deserialize, Serialize};

use crate::ids::SessionKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// User-facing messages emitted by map sessions.
/// Each failure path produces exactly one of these.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MapNotice {
    #[serde(rename = "map_ready")]
    MapReady { session: SessionKind },

    #[serde(rename = "map_load_failed")]
    MapLoadFailed { session: SessionKind, reason: String },

    #[serde(rename = "city_not_found")]
    CityNotFound { session: SessionKind, city: String },

    #[serde(rename = "location_not_found")]
    LocationNotFound {
        session: SessionKind,
        keyword: String,
    },
}

impl MapNotice {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MapReady { .. } => "map_ready",
            Self::MapLoadFailed { .. } => "map_load_failed",
            Self::CityNotFound { .. } => "city_not_found",
            Self::LocationNotFound { .. } => "location_not_found",
        }
    }

    pub fn level(&self) -> NoticeLevel {
        match self {
            Self::MapReady { .. } => NoticeLevel::Info,
            Self::MapLoadFailed { .. } => NoticeLevel::Error,
            Self::CityNotFound { .. } | Self::LocationNotFound { .. } => NoticeLevel::Warning,
        }
    }

    pub fn session(&self) -> SessionKind {
        match self {
            Self::MapReady { session }
            | Self::MapLoadFailed { session, .. }
            | Self::CityNotFound { session, .. }
            | Self::LocationNotFound { session, .. } => *session,
        }
    }
}
