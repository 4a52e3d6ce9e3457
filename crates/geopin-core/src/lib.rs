pub mod errors;
pub mod geo;
pub mod ids;
pub mod notices;
pub mod position;
pub mod provider;
pub mod settings;

pub use errors::{MapError, ProviderError, SettingsError};
pub use geo::{Coordinate, PlaceResult};
pub use ids::{SessionId, SessionKind, SessionStatus};
pub use notices::{MapNotice, NoticeLevel};
pub use position::{PositionDraft, PositionSubmission};
pub use settings::{GeopinSettings, ProviderCredentials};
