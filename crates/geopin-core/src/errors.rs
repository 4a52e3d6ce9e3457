use crate::ids::{SessionKind, SessionStatus};

/// Failures reported by a mapping provider (SDK call, script fetch, web service).
#[derive(Clone, Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),
    #[error("http {status}: {body}")]
    Status { status: u16, body: String },
    #[error("service error {code}: {info}")]
    Service { code: String, info: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("script error: {0}")]
    Script(String),
}

impl ProviderError {
    pub fn from_status(status: u16, body: String) -> Self {
        Self::Status { status, body }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Status { .. } => "status",
            Self::Service { .. } => "service",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Script(_) => "script",
        }
    }
}

/// Error taxonomy for the map-session core.
///
/// An unknown city or a search without hits is not an error: the session
/// falls back and emits a warning notice instead.
///
/// `Clone` because one script-load failure is handed to every waiter.
#[derive(Clone, Debug, thiserror::Error)]
pub enum MapError {
    #[error("map provider credentials are not configured")]
    ConfigMissing,
    #[error("failed to load map script: {0}")]
    ScriptLoad(String),
    #[error("map container not found: {0}")]
    ContainerNotFound(String),
    #[error("{session} session is not ready (status: {status})")]
    SessionNotReady {
        session: SessionKind,
        status: SessionStatus,
    },
    #[error("{0} session was destroyed")]
    SessionDestroyed(SessionKind),
    #[error("{0} session is already initialized")]
    AlreadyInitialized(SessionKind),
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}

impl MapError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::ConfigMissing => "config_missing",
            Self::ScriptLoad(_) => "script_load",
            Self::ContainerNotFound(_) => "container_not_found",
            Self::SessionNotReady { .. } => "session_not_ready",
            Self::SessionDestroyed(_) => "session_destroyed",
            Self::AlreadyInitialized(_) => "already_initialized",
            Self::Provider(_) => "provider",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds() {
        assert_eq!(MapError::ConfigMissing.error_kind(), "config_missing");
        assert_eq!(MapError::ScriptLoad("boom".into()).error_kind(), "script_load");
        assert_eq!(
            MapError::ContainerNotFound("a".into()).error_kind(),
            "container_not_found"
        );
    }

    #[test]
    fn provider_error_converts() {
        let err: MapError = ProviderError::Network("reset".into()).into();
        assert!(matches!(err, MapError::Provider(ProviderError::Network(_))));
        assert_eq!(err.error_kind(), "provider");
    }

    #[test]
    fn not_ready_message_names_session() {
        let err = MapError::SessionNotReady {
            session: SessionKind::Edit,
            status: SessionStatus::Initializing,
        };
        assert_eq!(
            err.to_string(),
            "edit session is not ready (status: initializing)"
        );
    }

    #[test]
    fn from_status_keeps_body() {
        let err = ProviderError::from_status(503, "busy".into());
        assert_eq!(err.error_kind(), "status");
        assert_eq!(err.to_string(), "http 503: busy");
    }
}
